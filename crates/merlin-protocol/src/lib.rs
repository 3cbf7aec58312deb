//! # Merlin Protocol
//!
//! Merlin 探测器 TCP 接口协议定义（无 IO 依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量定义
//! - `command`: 命令帧编码/解码、响应帧
//! - `status`: 状态码解释（响应分类）
//! - `image`: 图像流帧头与像素数据
//! - `preamble`: 采集前导信息块
//! - `property`: 可读写属性表
//!
//! ## 帧格式
//!
//! 两种协议共用同一个外层前缀 `MPX,<LEN10>,`，其中 `LEN10` 为 10 位补零的十进制长度。
//!
//! ```text
//! 命令帧: MPX,0000000011,GET,HVBIAS
//! 图像帧: MPX,0000066920,MQ1,000001,00384,01,0256,0256,U08,000...<pixels>
//! ```

pub mod command;
pub mod constants;
pub mod image;
pub mod preamble;
pub mod property;
pub mod status;

// 重新导出常用类型
pub use command::*;
pub use constants::*;
pub use image::*;
pub use preamble::AcquisitionPreamble;
pub use property::*;
pub use status::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// 字段中出现分隔符（会破坏帧结构）
    #[error("Separator ',' is not allowed in {field}: {value:?}")]
    SeparatorInField { field: &'static str, value: String },

    /// 字段超出固定宽度
    #[error("Field {field} does not fit in {width} characters: {value}")]
    FieldOverflow {
        field: &'static str,
        width: usize,
        value: String,
    },

    /// 响应中找不到请求的命令名（请求/响应失步）
    #[error("Command name {name} not found in response: {response}")]
    NameMismatch { name: String, response: String },

    /// 探测器返回了非成功状态
    #[error("Status error: {0}")]
    Status(#[from] StatusError),

    /// 声明长度与实际字节数不一致
    #[error("Frame length mismatch: declared {declared}, actual {actual}")]
    FrameLengthMismatch { declared: usize, actual: usize },

    /// 帧长度超出上限
    #[error("Frame length {len} exceeds limit {limit}")]
    FrameTooLarge { len: usize, limit: usize },

    #[error("Invalid frame prefix: {0}")]
    InvalidPrefix(String),

    #[error("Invalid image header: {0}")]
    InvalidHeader(String),

    #[error("Unknown pixel encoding: {0}")]
    UnknownPixelEncoding(String),

    #[error("Invalid preamble: {0}")]
    InvalidPreamble(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl ProtocolError {
    /// 是否为编码阶段的错误（参数非法，未产生任何网络交互）
    pub fn is_encoding_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::SeparatorInField { .. } | ProtocolError::FieldOverflow { .. }
        )
    }
}

/// 将字节串转换为可读文本（非 UTF-8 字节用替换字符表示）
///
/// 仅用于错误信息和日志输出。
pub(crate) fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::FrameLengthMismatch {
            declared: 66920,
            actual: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Frame length mismatch: declared 66920, actual 1024"
        );

        let err = ProtocolError::NameMismatch {
            name: "HVBIAS".to_string(),
            response: "MPX,0000000011,GET,GAIN,0".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("HVBIAS") && msg.contains("GET,GAIN"));
    }

    #[test]
    fn test_from_status_error() {
        let err: ProtocolError = StatusError::OutOfRange.into();
        assert_eq!(err, ProtocolError::Status(StatusError::OutOfRange));
    }

    #[test]
    fn test_is_encoding_error() {
        let err = ProtocolError::SeparatorInField {
            field: "argument",
            value: "1,2".to_string(),
        };
        assert!(err.is_encoding_error());
        assert!(!ProtocolError::Status(StatusError::Busy).is_encoding_error());
    }
}
