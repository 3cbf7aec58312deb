//! 客户端错误类型定义

use crate::config::ConfigError;
use merlin_net::NetError;
use merlin_protocol::{ProtocolError, StatusError};
use thiserror::Error;

/// 客户端错误类型
#[derive(Error, Debug)]
pub enum ClientError {
    /// 编码、失步或帧格式错误
    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),

    /// 探测器返回非成功状态
    #[error("Detector status: {0}")]
    Status(StatusError),

    /// 传输错误（超时、对端关闭；重连一次后仍失败时为 `NetError::ConnectionFailed`）
    #[error("Transport error: {0}")]
    Net(#[from] NetError),

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Property {0} is read-only")]
    ReadOnlyProperty(&'static str),

    #[error("Invalid value for {property}: {reason}")]
    InvalidValue { property: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ProtocolError> for ClientError {
    /// 状态错误单独提升，调用方无需再解一层 `Protocol`
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Status(status) => ClientError::Status(status),
            other => ClientError::Protocol(other),
        }
    }
}

impl From<StatusError> for ClientError {
    fn from(err: StatusError) -> Self {
        ClientError::Status(err)
    }
}

impl ClientError {
    /// 探测器返回的非成功状态（如果是）
    pub fn status(&self) -> Option<StatusError> {
        match self {
            ClientError::Status(status) => Some(*status),
            _ => None,
        }
    }

    /// 探测器忙，调用方可退避后重试
    pub fn is_busy(&self) -> bool {
        matches!(self, ClientError::Status(StatusError::Busy))
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            ClientError::Net(NetError::Timeout) => true,
            ClientError::Net(NetError::ConnectionFailed { source, .. }) => source.is_timeout(),
            _ => false,
        }
    }

    /// 连接失败（首次连接失败，或重连一次后仍失败）
    pub fn is_connection_failed(&self) -> bool {
        matches!(self, ClientError::Net(NetError::ConnectionFailed { .. }))
    }
}
