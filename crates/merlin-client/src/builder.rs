//! Builder 模式实现
//!
//! 提供链式构造 `CommandClient` 的便捷方式。

use crate::client::CommandClient;
use crate::config::{ConnectionSettings, MerlinConfig};
use crate::error::ClientError;
use merlin_net::{Connection, SimulatedTransport, TcpTransport, Transport};
use merlin_protocol::ResponseInterpreter;
use std::time::Duration;
use tracing::info;

/// CommandClient Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use merlin_client::ClientBuilder;
/// use std::time::Duration;
///
/// let client = ClientBuilder::new()
///     .host("192.168.0.10")
///     .read_timeout(Duration::from_secs(2))
///     .build()
///     .unwrap();
/// ```
pub struct ClientBuilder {
    settings: ConnectionSettings,
    interpreter: Option<Box<dyn ResponseInterpreter>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            settings: ConnectionSettings::default(),
            interpreter: None,
        }
    }

    /// 从配置文件的 `[connection]` 段初始化
    pub fn from_config(config: &MerlinConfig) -> Self {
        Self::from_settings(config.connection.clone())
    }

    pub fn from_settings(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            interpreter: None,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.settings.host = host.into();
        self
    }

    /// 命令端口（默认 6341）
    pub fn port(mut self, port: u16) -> Self {
        self.settings.command_port = port;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.settings.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.settings.write_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// 单次读取的缓冲区容量（默认 1000 字节）
    pub fn recv_capacity(mut self, capacity: usize) -> Self {
        self.settings.recv_capacity = capacity;
        self
    }

    pub fn max_response_len(mut self, len: usize) -> Self {
        self.settings.max_response_len = len;
        self
    }

    /// 每次请求完成后的等待时间（默认 10ms）
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settings.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    /// 模拟模式：不打开 socket，所有请求回显并返回成功
    pub fn simulated(mut self, simulated: bool) -> Self {
        self.settings.simulated = simulated;
        self
    }

    pub fn interpreter(mut self, interpreter: impl ResponseInterpreter + 'static) -> Self {
        self.interpreter = Some(Box::new(interpreter));
        self
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// 构造客户端（不立即连接，首次请求时连接）
    pub fn build(self) -> Result<CommandClient, ClientError> {
        let tcp = self.settings.command_tcp_config();
        let peer = tcp.addr();
        let transport: Box<dyn Transport> = if self.settings.simulated {
            Box::new(SimulatedTransport::new())
        } else {
            Box::new(TcpTransport::new(tcp))
        };

        let connection = Connection::with_config(transport, self.settings.connection_config());
        let mut client = CommandClient::with_connection(connection)
            .with_settle_delay(self.settings.settle_delay())
            .with_peer(peer);
        if let Some(interpreter) = self.interpreter {
            client = client.with_boxed_interpreter(interpreter);
        }

        info!("Created {}", client);
        Ok(client)
    }

    /// 构造客户端并立即连接
    pub fn connect(self) -> Result<CommandClient, ClientError> {
        let client = self.build()?;
        client.connect()?;
        Ok(client)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
