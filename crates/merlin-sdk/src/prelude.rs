//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use merlin_sdk::prelude::*;
//! ```

// 客户端层
pub use crate::client::{
    AcquisitionSettings, ClientBuilder, CommandClient, MerlinConfig, StreamReader,
};

// 协议层
pub use crate::protocol::{
    Action, AcquisitionPreamble, ByteOrder, CommandKind, ImageFrame, ImageHeader, PixelEncoding,
    Pixels, PropertyValue, StatusCode,
};

// 传输层（常用 Trait）
pub use crate::net::Transport;

// 错误类型
pub use crate::client::{ClientError, StreamError};
pub use crate::net::NetError;
pub use crate::protocol::{ProtocolError, StatusError};
