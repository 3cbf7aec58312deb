//! # Merlin Net Layer
//!
//! 传输层抽象与连接管理。
//!
//! - [`Transport`]: 字节流传输抽象（TCP、模拟模式、测试替身）
//! - [`Connection`]: 按需连接、发送超时后重连一次、按声明长度重组响应
//! - `mock` feature: 本地回显端点和模拟数据流服务器

use std::io;
use thiserror::Error;

pub mod connection;
pub mod simulated;
pub mod tcp;

#[cfg(feature = "mock")]
pub mod mock;

pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use simulated::SimulatedTransport;
pub use tcp::{TcpConfig, TcpTransport};

#[cfg(feature = "mock")]
pub use mock::{MockAcquisitionServer, MockEndpoint, acquisition_stream};

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum NetError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("Operation timed out")]
    Timeout,
    #[error("Connection closed by peer")]
    Closed,
    #[error("Not connected")]
    NotConnected,
    /// 连接失败（包括重连一次之后仍然失败）
    #[error("Connection to {addr} failed: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: Box<NetError>,
    },
    #[error("Response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },
}

impl NetError {
    /// 将 IO 错误转换为传输错误，读写超时统一映射为 `Timeout`
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => NetError::Timeout,
            _ => NetError::Io(err),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, NetError::Timeout)
    }

    pub fn connection_failed(addr: impl Into<String>, source: NetError) -> Self {
        NetError::ConnectionFailed {
            addr: addr.into(),
            source: Box::new(source),
        }
    }
}

/// 字节流传输
///
/// 实现者负责建立/关闭底层连接和原始读写；帧重组、重连策略由 [`Connection`] 负责。
pub trait Transport: Send {
    /// 建立连接（已连接时可以直接返回）
    fn connect(&mut self) -> Result<(), NetError>;

    /// 关闭连接（未连接时无操作）
    fn disconnect(&mut self);

    /// 写入全部字节
    ///
    /// # 错误
    /// - `NetError::Timeout`: 写超时
    /// - `NetError::NotConnected`: 尚未连接
    fn send(&mut self, data: &[u8]) -> Result<(), NetError>;

    /// 读取一次，返回读到的字节数（大于 0）
    ///
    /// # 错误
    /// - `NetError::Timeout`: 读超时
    /// - `NetError::Closed`: 对端已关闭
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, NetError>;

    /// 对端地址描述（用于日志和错误信息）
    fn peer(&self) -> String;

    /// 是否为模拟传输
    fn is_simulated(&self) -> bool {
        false
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> Result<(), NetError> {
        (**self).connect()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn send(&mut self, data: &[u8]) -> Result<(), NetError> {
        (**self).send(data)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        (**self).receive(buf)
    }

    fn peer(&self) -> String {
        (**self).peer()
    }

    fn is_simulated(&self) -> bool {
        (**self).is_simulated()
    }
}
