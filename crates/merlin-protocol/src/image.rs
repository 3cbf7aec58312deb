//! 图像流帧
//!
//! 每一帧由外层前缀、定长文本帧头和原始像素数据组成：
//!
//! ```text
//! MPX,<LEN10>,<SET>,<SEQ6>,<HDRLEN5>,<CHIPS2>,<H4>,<W4>,<ENC>,<fill...><pixels>
//! ```
//!
//! - `LEN10` = 帧头长度 + 像素字节数
//! - 数字字段左侧补零，帧头整体用填充字符补齐到 `HDRLEN` 字节
//! - 像素按行优先排列，共 `H * W * bytes_per_pixel` 字节

use crate::command::encode_outer_prefix;
use crate::constants::*;
use crate::{ProtocolError, lossy};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// 像素编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelEncoding {
    /// 8 位无符号整数（`U08`）
    U8,
    /// 16 位无符号整数（`U16`）
    U16,
    /// 32 位无符号整数（`U32`）
    U32,
    /// 32 位浮点（`F`）
    F32,
}

impl PixelEncoding {
    /// 线上标签
    pub fn tag(&self) -> &'static str {
        match self {
            PixelEncoding::U8 => "U08",
            PixelEncoding::U16 => "U16",
            PixelEncoding::U32 => "U32",
            PixelEncoding::F32 => "F",
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelEncoding::U8 => 1,
            PixelEncoding::U16 => 2,
            PixelEncoding::U32 | PixelEncoding::F32 => 4,
        }
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for PixelEncoding {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "U08" => Ok(PixelEncoding::U8),
            "U16" => Ok(PixelEncoding::U16),
            "U32" => Ok(PixelEncoding::U32),
            "F" => Ok(PixelEncoding::F32),
            other => Err(ProtocolError::UnknownPixelEncoding(other.to_string())),
        }
    }
}

/// 图像帧头
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageHeader {
    /// 帧组标识（如 `MQ1`）
    pub frame_set: String,
    /// 本次采集内的帧序号
    pub sequence: u32,
    /// 帧头总长度（字节，含填充）
    pub header_len: usize,
    /// 芯片数量
    pub chip_count: u8,
    /// 图像高度（行）
    pub height: u16,
    /// 图像宽度（列）
    pub width: u16,
    /// 像素编码
    pub encoding: PixelEncoding,
}

impl ImageHeader {
    /// 使用默认帧组、帧头长度和芯片数创建帧头
    pub fn new(sequence: u32, height: u16, width: u16, encoding: PixelEncoding) -> Self {
        Self {
            frame_set: DEFAULT_FRAME_SET.to_string(),
            sequence,
            header_len: DEFAULT_HEADER_LEN,
            chip_count: 1,
            height,
            width,
            encoding,
        }
    }

    /// 像素数据字节数
    pub fn pixel_len(&self) -> usize {
        self.height as usize * self.width as usize * self.encoding.bytes_per_pixel()
    }

    /// 外层长度字段应有的值（帧头 + 像素）
    pub fn frame_len(&self) -> usize {
        self.header_len + self.pixel_len()
    }

    /// 编码帧头（默认填充字符 `'0'`）
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        self.encode_with_fill(HEADER_FILL)
    }

    /// 编码帧头，结果恰好为 `header_len` 字节
    pub fn encode_with_fill(&self, fill: u8) -> Result<Vec<u8>, ProtocolError> {
        if fill == SEPARATOR {
            return Err(ProtocolError::SeparatorInField {
                field: "header fill",
                value: (fill as char).to_string(),
            });
        }
        if self.frame_set.is_empty() || self.frame_set.as_bytes().contains(&SEPARATOR) {
            return Err(ProtocolError::SeparatorInField {
                field: "frame set",
                value: self.frame_set.clone(),
            });
        }

        let text = format!(
            "{},{},{},{},{},{},{},",
            self.frame_set,
            fixed_width("sequence", self.sequence as u64, SEQUENCE_WIDTH)?,
            fixed_width("header length", self.header_len as u64, HEADER_LEN_WIDTH)?,
            fixed_width("chip count", self.chip_count as u64, CHIP_COUNT_WIDTH)?,
            fixed_width("height", self.height as u64, DIMENSION_WIDTH)?,
            fixed_width("width", self.width as u64, DIMENSION_WIDTH)?,
            self.encoding.tag(),
        );
        if text.len() > self.header_len {
            return Err(ProtocolError::FieldOverflow {
                field: "header",
                width: self.header_len,
                value: text,
            });
        }

        let mut out = Vec::with_capacity(self.header_len);
        out.extend_from_slice(text.as_bytes());
        out.resize(self.header_len, fill);
        Ok(out)
    }

    /// 解码帧头
    ///
    /// 只解析前 7 个字段，之后的填充内容忽略。
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ProtocolError::InvalidHeader(lossy(bytes)))?;
        let fields: Vec<&str> = text.splitn(8, SEPARATOR as char).collect();
        if fields.len() < 8 {
            return Err(ProtocolError::InvalidHeader(format!(
                "expected 7 fields, got {}: {}",
                fields.len().saturating_sub(1),
                text
            )));
        }

        Ok(Self {
            frame_set: fields[0].to_string(),
            sequence: parse_field("sequence", fields[1])?,
            header_len: parse_field("header length", fields[2])?,
            chip_count: parse_field("chip count", fields[3])?,
            height: parse_field("height", fields[4])?,
            width: parse_field("width", fields[5])?,
            encoding: fields[6].parse()?,
        })
    }
}

/// 从帧头开头的若干字节中读取帧头长度字段
///
/// 返回 `Ok(None)` 表示字节不足以包含前三个字段。
pub fn peek_header_len(bytes: &[u8]) -> Result<Option<usize>, ProtocolError> {
    let mut fields = bytes.split(|b| *b == SEPARATOR);
    let (Some(_set), Some(_seq), Some(len)) = (fields.next(), fields.next(), fields.next()) else {
        return Ok(None);
    };
    // 第三个字段后面必须还有分隔符，否则字段可能被截断
    if fields.next().is_none() {
        return Ok(None);
    }
    let len = std::str::from_utf8(len).map_err(|_| ProtocolError::InvalidHeader(lossy(bytes)))?;
    parse_field("header length", len).map(Some)
}

fn fixed_width(field: &'static str, value: u64, width: usize) -> Result<String, ProtocolError> {
    let text = format!("{:0width$}", value, width = width);
    if text.len() > width {
        return Err(ProtocolError::FieldOverflow {
            field,
            width,
            value: text,
        });
    }
    Ok(text)
}

fn parse_field<T: FromStr>(field: &'static str, value: &str) -> Result<T, ProtocolError> {
    value
        .trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidHeader(format!("invalid {field}: {value:?}")))
}

/// 编码完整图像帧（外层前缀 + 帧头 + 像素）
///
/// 像素字节数必须与帧头描述一致。
pub fn encode_image_frame(header: &ImageHeader, pixels: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if pixels.len() != header.pixel_len() {
        return Err(ProtocolError::FrameLengthMismatch {
            declared: header.frame_len(),
            actual: header.header_len + pixels.len(),
        });
    }
    let head = header.encode()?;
    let mut out = encode_outer_prefix(header.frame_len())?;
    out.reserve(head.len() + pixels.len());
    out.extend_from_slice(&head);
    out.extend_from_slice(pixels);
    Ok(out)
}

/// 像素字节序
///
/// Merlin 软件输出大端数据；测试服务器通常直接输出本机字节序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// 解码后的像素数据
#[derive(Debug, Clone, PartialEq)]
pub enum Pixels {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl Pixels {
    pub fn len(&self) -> usize {
        match self {
            Pixels::U8(v) => v.len(),
            Pixels::U16(v) => v.len(),
            Pixels::U32(v) => v.len(),
            Pixels::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 图像帧（帧头 + 原始像素）
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    header: ImageHeader,
    payload: Bytes,
}

impl ImageFrame {
    /// 创建图像帧，像素字节数必须与帧头一致
    pub fn new(header: ImageHeader, payload: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        let payload = payload.into();
        if payload.len() != header.pixel_len() {
            return Err(ProtocolError::FrameLengthMismatch {
                declared: header.frame_len(),
                actual: header.header_len + payload.len(),
            });
        }
        Ok(Self { header, payload })
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    /// 原始像素字节（行优先）
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    pub fn dimensions(&self) -> (u16, u16) {
        (self.header.height, self.header.width)
    }

    /// 按给定字节序解码像素
    pub fn pixels(&self, order: ByteOrder) -> Pixels {
        let data = &self.payload[..];
        match self.header.encoding {
            PixelEncoding::U8 => Pixels::U8(data.to_vec()),
            PixelEncoding::U16 => Pixels::U16(
                data.chunks_exact(2)
                    .map(|c| {
                        let b = [c[0], c[1]];
                        match order {
                            ByteOrder::Big => u16::from_be_bytes(b),
                            ByteOrder::Little => u16::from_le_bytes(b),
                        }
                    })
                    .collect(),
            ),
            PixelEncoding::U32 => Pixels::U32(data.chunks_exact(4).map(|c| word(c, order)).collect()),
            PixelEncoding::F32 => Pixels::F32(
                data.chunks_exact(4)
                    .map(|c| f32::from_bits(word(c, order)))
                    .collect(),
            ),
        }
    }

    pub fn into_parts(self) -> (ImageHeader, Bytes) {
        (self.header, self.payload)
    }
}

fn word(c: &[u8], order: ByteOrder) -> u32 {
    let b = [c[0], c[1], c[2], c[3]];
    match order {
        ByteOrder::Big => u32::from_be_bytes(b),
        ByteOrder::Little => u32::from_le_bytes(b),
    }
}
