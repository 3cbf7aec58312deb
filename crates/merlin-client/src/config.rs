//! TOML 配置
//!
//! ```toml
//! [connection]
//! host = "127.0.0.1"
//! command_port = 6341
//! data_port = 6342
//! read_timeout_ms = 5000
//! settle_delay_ms = 10
//! simulated = false
//!
//! [acquisition]
//! hvbias = 120
//! threshold0 = 0.0
//! threshold1 = 511.0
//! ```
//!
//! 缺省的字段使用默认值。

use crate::acquisition::AcquisitionSettings;
use merlin_net::{ConnectionConfig, TcpConfig};
use merlin_protocol::{DEFAULT_COMMAND_PORT, DEFAULT_DATA_PORT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 配置加载/保存错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// 顶层配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerlinConfig {
    pub connection: ConnectionSettings,
    pub acquisition: AcquisitionSettings,
}

impl MerlinConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

/// 连接参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// 探测器软件所在主机
    pub host: String,
    /// 命令端口
    pub command_port: u16,
    /// 数据流端口
    pub data_port: u16,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// 单次读取的缓冲区容量（字节）
    pub recv_capacity: usize,
    /// 单个响应的最大字节数
    pub max_response_len: usize,
    /// 每次请求完成后的等待时间（探测器软件需要）
    pub settle_delay_ms: u64,
    /// 模拟模式：不连接 socket，所有请求直接成功
    pub simulated: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let connection = ConnectionConfig::default();
        Self {
            host: "127.0.0.1".to_string(),
            command_port: DEFAULT_COMMAND_PORT,
            data_port: DEFAULT_DATA_PORT,
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            recv_capacity: connection.recv_capacity,
            max_response_len: connection.max_response_len,
            settle_delay_ms: 10,
            simulated: false,
        }
    }
}

impl ConnectionSettings {
    /// 命令端口的 TCP 参数
    pub fn command_tcp_config(&self) -> TcpConfig {
        self.tcp_config(self.command_port)
    }

    /// 数据端口的 TCP 参数
    pub fn data_tcp_config(&self) -> TcpConfig {
        self.tcp_config(self.data_port)
    }

    fn tcp_config(&self, port: u16) -> TcpConfig {
        TcpConfig {
            host: self.host.clone(),
            port,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            recv_capacity: self.recv_capacity,
            max_response_len: self.max_response_len,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
