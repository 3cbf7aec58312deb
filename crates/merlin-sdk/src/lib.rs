//! Merlin SDK - Merlin (Medipix3) 探测器 Rust SDK
//!
//! 通过 Merlin 读出软件的 TCP 接口控制探测器并接收图像流。
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 命令帧、状态码、图像帧头、前导信息块的编码/解码
//! - **传输层** (`net`): TCP 传输、连接管理（按需连接、超时重连一次）
//! - **客户端层** (`client`): 命令客户端、图像流读取器、配置
//!
//! # 快速开始
//!
//! ```no_run
//! use merlin_sdk::prelude::*;
//!
//! merlin_sdk::init_logging().ok();
//!
//! let config = MerlinConfig::load_from_file("merlin.toml")?;
//! let client = ClientBuilder::from_config(&config).build()?;
//! client.start_acquisition_with(&config.acquisition)?;
//!
//! let mut stream = StreamReader::connect(&config.connection.host, config.connection.data_port)?;
//! for frame in stream.by_ref().take(10) {
//!     let frame = frame?;
//!     println!("frame {} {:?}", frame.sequence(), frame.dimensions());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod logging;
pub mod prelude;

pub use merlin_client as client;
pub use merlin_net as net;
pub use merlin_protocol as protocol;

// 协议层
pub use protocol::{CommandKind, ProtocolError, StatusCode, StatusError};

// 传输层
pub use net::{NetError, Transport};

// 客户端层（推荐入口）
pub use client::{
    AcquisitionSettings, ClientBuilder, ClientError, CommandClient, MerlinConfig, StreamError,
    StreamReader,
};

pub use logging::{LoggingError, init_logging, init_logging_with_filter};
