//! 状态码解释
//!
//! 响应的最后一个字符是单个数字状态码。协议没有请求 ID，
//! "响应中包含请求的命令名"是唯一的请求/响应对应检查。
//! 这一检查封装在 [`ResponseInterpreter`] 之后，调用方不直接依赖它。

use crate::command::{CommandFrame, ResponseFrame};
use crate::{ProtocolError, lossy};
use num_enum::TryFromPrimitive;
use thiserror::Error;

/// 探测器返回的状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StatusCode {
    /// 成功
    Success = 0,
    /// 系统忙（可由调用方退避后重试）
    Busy = 1,
    /// 命令无法识别（通常是客户端与软件版本不匹配）
    Unrecognized = 2,
    /// 参数超出范围（不应自动重试）
    OutOfRange = 3,
}

impl StatusCode {
    /// 从状态字符解析（`'0'..='3'`）
    pub fn from_status_byte(byte: u8) -> Result<Self, StatusError> {
        if !byte.is_ascii_digit() {
            return Err(StatusError::Unknown(byte as char));
        }
        StatusCode::try_from(byte - b'0').map_err(|_| StatusError::Unknown(byte as char))
    }

    /// 转换为结果：只有 `Success` 为 `Ok`
    pub fn into_result(self) -> Result<(), StatusError> {
        match self {
            StatusCode::Success => Ok(()),
            StatusCode::Busy => Err(StatusError::Busy),
            StatusCode::Unrecognized => Err(StatusError::Unrecognized),
            StatusCode::OutOfRange => Err(StatusError::OutOfRange),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Success)
    }
}

/// 非成功状态
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusError {
    #[error("Detector is busy")]
    Busy,
    #[error("Command not recognised by the detector software")]
    Unrecognized,
    #[error("Input parameter is out of range")]
    OutOfRange,
    /// 协议未定义的状态字符，不能当作成功处理
    #[error("Unknown status {0:?}")]
    Unknown(char),
}

impl StatusError {
    /// 是否为暂时性状态
    ///
    /// 只有 `Busy` 是暂时的；SDK 本身不做重试，由调用方决定。
    pub fn is_transient(&self) -> bool {
        matches!(self, StatusError::Busy)
    }
}

/// 解析响应，返回原始状态码（不把非成功状态当作错误）
///
/// # Errors
/// - `NameMismatch`: 响应中不包含 `command_name`
/// - `Status(Unknown)`: 结尾字符不是已定义的状态码
pub fn interpret(command_name: &str, response: &[u8]) -> Result<StatusCode, ProtocolError> {
    let needle = command_name.as_bytes();
    let found = !needle.is_empty() && response.windows(needle.len()).any(|w| w == needle);
    if !found {
        return Err(ProtocolError::NameMismatch {
            name: command_name.to_string(),
            response: lossy(response),
        });
    }
    // 名称非空且已找到，响应至少有一个字节
    let last = response[response.len() - 1];
    Ok(StatusCode::from_status_byte(last)?)
}

/// 对响应进行分类
///
/// 返回 `Ok(StatusCode::Success)` 当且仅当响应包含命令名且结尾为 `'0'`；
/// 其他状态均以 `ProtocolError::Status` 返回。
pub fn classify(command_name: &str, response: &[u8]) -> Result<StatusCode, ProtocolError> {
    let code = interpret(command_name, response)?;
    code.into_result()?;
    Ok(code)
}

/// 响应解释器
///
/// 将"响应是否对应请求"与"状态是否成功"的判断集中在一处。
/// 当前协议只能通过命令名子串匹配来对应请求；若将来协议提供请求 ID，
/// 实现新的解释器即可，无需修改调用方。
pub trait ResponseInterpreter: Send + Sync {
    fn classify(
        &self,
        request: &CommandFrame,
        response: &ResponseFrame,
    ) -> Result<StatusCode, ProtocolError>;
}

/// 基于命令名子串匹配的解释器（当前协议）
#[derive(Debug, Clone, Copy, Default)]
pub struct NameMatchInterpreter;

impl ResponseInterpreter for NameMatchInterpreter {
    fn classify(
        &self,
        request: &CommandFrame,
        response: &ResponseFrame,
    ) -> Result<StatusCode, ProtocolError> {
        classify(request.name(), response.raw())
    }
}
