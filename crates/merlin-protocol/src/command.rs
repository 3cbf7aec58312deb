//! 命令帧编码/解码
//!
//! 命令帧格式：
//!
//! ```text
//! MPX,<LEN10>,<KIND>,<NAME>[,<ARG>...]
//! ```
//!
//! `LEN10` 为 `<KIND>,<NAME>[,<ARG>...]` 的字节长度加一（即长度字段之后的全部字节，
//! 包含紧随其后的分隔符），补零到 10 位。长度总是由编码器计算，调用方不能指定。

use crate::constants::*;
use crate::{ProtocolError, lossy};
use bytes::Bytes;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// 命令类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandKind {
    /// 读取属性
    Get,
    /// 写入属性
    Set,
    /// 执行动作（开始/停止采集等）
    Cmd,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Get => "GET",
            CommandKind::Set => "SET",
            CommandKind::Cmd => "CMD",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(CommandKind::Get),
            "SET" => Ok(CommandKind::Set),
            "CMD" => Ok(CommandKind::Cmd),
            other => Err(ProtocolError::ParseError(format!(
                "unknown command kind: {other}"
            ))),
        }
    }
}

/// 命令帧
///
/// # Example
///
/// ```
/// use merlin_protocol::{CommandFrame, CommandKind};
///
/// let frame = CommandFrame::new(CommandKind::Set, "HVBIAS").with_arg(120);
/// assert_eq!(frame.encode().unwrap(), b"MPX,0000000015,SET,HVBIAS,120");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    kind: CommandKind,
    name: String,
    args: Vec<String>,
}

impl CommandFrame {
    pub fn new(kind: CommandKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// 追加一个参数（任意可格式化的值）
    pub fn with_arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// 追加多个参数（保持顺序）
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: ToString,
    {
        self.args.extend(args.into_iter().map(|a| a.to_string()));
        self
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// 帧体：`<KIND>,<NAME>[,<ARG>...]`
    fn body(&self) -> String {
        let mut body = String::with_capacity(
            4 + self.name.len() + self.args.iter().map(|a| a.len() + 1).sum::<usize>(),
        );
        body.push_str(self.kind.as_str());
        body.push(SEPARATOR as char);
        body.push_str(&self.name);
        for arg in &self.args {
            body.push(SEPARATOR as char);
            body.push_str(arg);
        }
        body
    }

    /// 长度字段的值（帧体字节数 + 1）
    pub fn declared_len(&self) -> usize {
        self.body().len() + 1
    }

    /// 检查命令名和参数
    ///
    /// 名称不能为空，名称和参数都不能包含分隔符。
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.name.is_empty() {
            return Err(ProtocolError::ParseError("empty command name".to_string()));
        }
        if self.name.as_bytes().contains(&SEPARATOR) {
            return Err(ProtocolError::SeparatorInField {
                field: "command name",
                value: self.name.clone(),
            });
        }
        if let Some(arg) = self.args.iter().find(|a| a.as_bytes().contains(&SEPARATOR)) {
            return Err(ProtocolError::SeparatorInField {
                field: "argument",
                value: arg.clone(),
            });
        }
        Ok(())
    }

    /// 编码为线上字节
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        self.validate()?;
        let body = self.body();
        let prefix = encode_length_field(body.len() + 1)?;

        let mut out = Vec::with_capacity(prefix.len() + 1 + body.len());
        out.extend_from_slice(&prefix);
        out.push(SEPARATOR);
        out.extend_from_slice(body.as_bytes());
        Ok(out)
    }

    /// 从线上字节解码（`encode` 的逆操作）
    ///
    /// 长度字段必须与实际帧体长度严格一致。
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < OUTER_PREFIX_LEN {
            return Err(ProtocolError::InvalidPrefix(format!(
                "frame too short: {} bytes",
                bytes.len()
            )));
        }
        let declared = parse_outer_prefix(&bytes[..OUTER_PREFIX_LEN])?;
        let body = &bytes[OUTER_PREFIX_LEN..];
        if declared != body.len() + 1 {
            return Err(ProtocolError::FrameLengthMismatch {
                declared,
                actual: body.len() + 1,
            });
        }

        let body = std::str::from_utf8(body)
            .map_err(|e| ProtocolError::ParseError(format!("command body is not UTF-8: {e}")))?;
        let mut fields = body.split(SEPARATOR as char);
        let kind = fields
            .next()
            .ok_or_else(|| ProtocolError::ParseError("missing command kind".to_string()))?
            .parse::<CommandKind>()?;
        let name = fields
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProtocolError::ParseError("missing command name".to_string()))?;

        Ok(Self {
            kind,
            name: name.to_string(),
            args: fields.map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body())
    }
}

/// 编码命令帧
///
/// 等价于 `CommandFrame::new(kind, name).with_args(args).encode()`。
pub fn encode_command<A: fmt::Display>(
    kind: CommandKind,
    name: &str,
    args: &[A],
) -> Result<Vec<u8>, ProtocolError> {
    CommandFrame::new(kind, name).with_args(args).encode()
}

/// 解码命令帧
pub fn decode_command(bytes: &[u8]) -> Result<CommandFrame, ProtocolError> {
    CommandFrame::decode(bytes)
}

// ============================================================================
// 外层前缀
// ============================================================================

/// 编码 `MPX,<LEN10>`（不含结尾分隔符）
pub fn encode_length_field(len: usize) -> Result<Vec<u8>, ProtocolError> {
    if len as u64 > MAX_LENGTH_FIELD {
        return Err(ProtocolError::FieldOverflow {
            field: "length",
            width: LENGTH_FIELD_WIDTH,
            value: len.to_string(),
        });
    }
    let mut out = Vec::with_capacity(LENGTH_FIELD_END);
    out.extend_from_slice(PREAMBLE);
    out.push(SEPARATOR);
    out.extend_from_slice(format!("{:0width$}", len, width = LENGTH_FIELD_WIDTH).as_bytes());
    Ok(out)
}

/// 编码完整外层前缀 `MPX,<LEN10>,`
pub fn encode_outer_prefix(len: usize) -> Result<Vec<u8>, ProtocolError> {
    let mut out = encode_length_field(len)?;
    out.push(SEPARATOR);
    Ok(out)
}

/// 解析外层前缀 `MPX,<LEN10>,`，返回长度字段的值
pub fn parse_outer_prefix(prefix: &[u8]) -> Result<usize, ProtocolError> {
    if prefix.len() < OUTER_PREFIX_LEN {
        return Err(ProtocolError::InvalidPrefix(format!(
            "expected {} bytes, got {}",
            OUTER_PREFIX_LEN,
            prefix.len()
        )));
    }
    if prefix_mismatch(prefix).is_some() {
        return Err(ProtocolError::InvalidPrefix(lossy(&prefix[..OUTER_PREFIX_LEN])));
    }
    let digits = &prefix[PREAMBLE.len() + 1..LENGTH_FIELD_END];
    // 前面已校验全部为 ASCII 数字
    Ok(digits
        .iter()
        .fold(0usize, |acc, d| acc * 10 + (d - b'0') as usize))
}

/// 返回第一个不符合 `MPX,<10 位数字>,` 模式的字节位置
fn prefix_mismatch(bytes: &[u8]) -> Option<usize> {
    bytes
        .iter()
        .take(OUTER_PREFIX_LEN)
        .enumerate()
        .find(|&(i, &b)| match i {
            0..=2 => b != PREAMBLE[i],
            3 | LENGTH_FIELD_END => b != SEPARATOR,
            _ => !b.is_ascii_digit(),
        })
        .map(|(i, _)| i)
}

/// 响应帧接收进度
///
/// 用于接收端按声明长度重组响应：单次 `read` 不保证得到完整帧。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameProgress {
    /// 前缀尚未收全
    NeedPrefix,
    /// 已知声明长度，还差 `missing` 字节
    Incomplete { missing: usize },
    /// 已收到声明长度要求的全部字节（可能更多）
    Complete,
    /// 不是带长度前缀的帧，按已收到的内容处理
    Unframed,
}

/// 根据已接收的字节判断响应是否完整
///
/// 响应帧与命令帧使用相同的长度约定：帧总长度为 `LENGTH_FIELD_END + LEN`。
pub fn response_progress(buf: &[u8]) -> FrameProgress {
    if prefix_mismatch(buf).is_some() {
        return FrameProgress::Unframed;
    }
    if buf.len() < OUTER_PREFIX_LEN {
        return FrameProgress::NeedPrefix;
    }
    match parse_outer_prefix(buf) {
        Ok(declared) => {
            let total = LENGTH_FIELD_END + declared;
            if buf.len() >= total {
                FrameProgress::Complete
            } else {
                FrameProgress::Incomplete {
                    missing: total - buf.len(),
                }
            }
        },
        Err(_) => FrameProgress::Unframed,
    }
}

/// 根据请求和已接收的字节判断回复是否完整
///
/// 回显式回复（请求原样返回后追加 `,<状态>`）的声明长度只覆盖请求本身，
/// 收满声明长度时状态字段可能还在路上：此时回复以请求开头，
/// 必须再收到分隔符和状态字符才算完整。
/// `request` 为空时等价于 [`response_progress`]。
pub fn reply_progress(request: &[u8], buf: &[u8]) -> FrameProgress {
    let progress = response_progress(buf);
    if progress != FrameProgress::Complete || request.is_empty() || !buf.starts_with(request) {
        return progress;
    }
    let echo_len = request.len() + 2;
    if buf.len() < echo_len {
        return FrameProgress::Incomplete {
            missing: echo_len - buf.len(),
        };
    }
    FrameProgress::Complete
}

// ============================================================================
// 响应帧
// ============================================================================

/// 响应帧
///
/// 协议只保证响应中包含请求的命令名，且最后一个字符是状态码。
/// 这里只暴露原始字节和结尾状态字符，不做更多解析。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    raw: Bytes,
}

impl ResponseFrame {
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// 响应文本（非 UTF-8 字节用替换字符表示）
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }

    /// 结尾状态字符
    pub fn status_byte(&self) -> Option<u8> {
        self.raw.last().copied()
    }

    /// 响应中是否包含给定命令名
    pub fn contains_name(&self, name: &str) -> bool {
        let needle = name.as_bytes();
        !needle.is_empty() && self.raw.windows(needle.len()).any(|w| w == needle)
    }

    /// 命令名之后、状态码之前的返回字段
    ///
    /// 例如 `MPX,0000000024,GET,HVBIAS,120.000000,0` 对 `HVBIAS` 返回 `["120.000000"]`。
    /// 找不到命令名字段时返回空列表。
    pub fn reply_fields(&self, name: &str) -> Vec<String> {
        let text = self.text();
        let fields: Vec<&str> = text.split(SEPARATOR as char).collect();
        match fields.iter().position(|f| *f == name) {
            Some(idx) if idx + 1 < fields.len() => fields[idx + 1..fields.len() - 1]
                .iter()
                .map(|f| f.to_string())
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for ResponseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// 解码响应帧
pub fn decode_response(bytes: &[u8]) -> ResponseFrame {
    ResponseFrame::new(Bytes::copy_from_slice(bytes))
}
