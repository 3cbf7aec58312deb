//! # Merlin Client
//!
//! Merlin 探测器的命令客户端和图像流读取器。
//!
//! - [`CommandClient`]: 命令端口（默认 6341）上的同步请求/响应，
//!   编码 → 发送 → 接收 → 解码 → 状态分类
//! - [`StreamReader`]: 数据端口（默认 6342）上的前导信息块 + 图像帧惰性序列
//! - [`MerlinConfig`]: TOML 配置（连接参数和采集设置）
//!
//! 两个连接相互独立，可以在不同线程中同时使用。
//!
//! # Example
//!
//! ```no_run
//! use merlin_client::ClientBuilder;
//!
//! let client = ClientBuilder::new().host("192.168.0.10").build()?;
//! client.set_property("HVBIAS", 120)?;
//! client.start_acquisition()?;
//! # Ok::<(), merlin_client::ClientError>(())
//! ```

pub mod acquisition;
pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod stream;

pub use acquisition::AcquisitionSettings;
pub use builder::ClientBuilder;
pub use client::CommandClient;
pub use config::{ConfigError, ConnectionSettings, MerlinConfig};
pub use error::ClientError;
pub use stream::{StreamEnd, StreamError, StreamReader, StreamState};
