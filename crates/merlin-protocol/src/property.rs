//! 探测器属性表
//!
//! Merlin 软件的可读写设置全部通过 `GET`/`SET` 访问，动作通过 `CMD` 触发。
//! 这里用一张静态表描述每个属性的命令名、访问权限和值类型，
//! 用于在发送前校验 `SET` 参数、在收到回复后解析 `GET` 结果。

use crate::ProtocolError;
use std::fmt;

/// 访问权限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// 属性值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
    /// `0` / `1`
    Boolean,
    Text,
}

/// 属性值
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PropertyValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl PropertyValue {
    /// 作为命令参数的文本形式
    pub fn to_arg(&self) -> String {
        self.to_string()
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(v) => Some(*v),
            PropertyValue::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Integer(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Integer(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Boolean(b) => f.write_str(if *b { "1" } else { "0" }),
            PropertyValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Integer(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Integer(v as i64)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        PropertyValue::Integer(v as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Boolean(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

impl ValueKind {
    /// 解析 `GET` 回复字段
    ///
    /// 整数属性也接受 `120.000000` 这种没有小数部分的浮点写法。
    pub fn parse(&self, text: &str) -> Result<PropertyValue, ProtocolError> {
        let text = text.trim();
        let invalid = || ProtocolError::ParseError(format!("expected {self:?} value, got {text:?}"));
        match self {
            ValueKind::Integer => text
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    text.parse::<f64>()
                        .ok()
                        .filter(|v| v.fract() == 0.0 && v.is_finite())
                        .map(|v| v as i64)
                })
                .map(PropertyValue::Integer)
                .ok_or_else(invalid),
            ValueKind::Float => text
                .parse::<f64>()
                .map(PropertyValue::Float)
                .map_err(|_| invalid()),
            ValueKind::Boolean => match text {
                "0" => Ok(PropertyValue::Boolean(false)),
                "1" => Ok(PropertyValue::Boolean(true)),
                _ => Err(invalid()),
            },
            ValueKind::Text => Ok(PropertyValue::Text(text.to_string())),
        }
    }

    /// 将值转换为该类型（用于 `SET` 前校验）
    ///
    /// 允许整数写入浮点属性、`0`/`1` 写入布尔属性，其余类型不匹配均报错。
    pub fn coerce(&self, value: PropertyValue) -> Result<PropertyValue, ProtocolError> {
        match (self, value) {
            (ValueKind::Integer, v @ PropertyValue::Integer(_)) => Ok(v),
            (ValueKind::Float, v @ PropertyValue::Float(_)) => Ok(v),
            (ValueKind::Float, PropertyValue::Integer(i)) => Ok(PropertyValue::Float(i as f64)),
            (ValueKind::Boolean, v @ PropertyValue::Boolean(_)) => Ok(v),
            (ValueKind::Boolean, PropertyValue::Integer(i @ (0 | 1))) => {
                Ok(PropertyValue::Boolean(i == 1))
            },
            (ValueKind::Text, v @ PropertyValue::Text(_)) => Ok(v),
            (kind, other) => Err(ProtocolError::ParseError(format!(
                "expected {kind:?} value, got {other:?}"
            ))),
        }
    }
}

/// 属性描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property {
    /// 线上命令名
    pub command: &'static str,
    pub access: Access,
    pub kind: ValueKind,
    pub description: &'static str,
}

impl Property {
    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command)
    }
}

const fn rw(command: &'static str, kind: ValueKind, description: &'static str) -> Property {
    Property {
        command,
        access: Access::ReadWrite,
        kind,
        description,
    }
}

const fn ro(command: &'static str, kind: ValueKind, description: &'static str) -> Property {
    Property {
        command,
        access: Access::ReadOnly,
        kind,
        description,
    }
}

use ValueKind::{Boolean, Float, Integer, Text};

/// 全部已知属性
pub static PROPERTIES: &[Property] = &[
    ro("SOFTWAREVERSION", Text, "Merlin software version"),
    // 探测器模式
    rw("COLOURMODE", Boolean, "0: monochrome, 1: colour"),
    rw("CHARGESUMMING", Boolean, "0: off, 1: on"),
    rw("GAIN", Integer, "0: SLGM, 1: LGM, 2: HGM, 3: SHGM"),
    rw("CONTINUOUSRW", Boolean, "continuous read/write between counters"),
    rw("ENABLECOUNTER1", Integer, "0: counter 0, 1: counter 1, 2: both"),
    rw("THRESHOLD0", Float, "threshold 0 (keV)"),
    rw("THRESHOLD1", Float, "threshold 1 (keV)"),
    rw("THRESHOLD2", Float, "threshold 2 (keV)"),
    rw("THRESHOLD3", Float, "threshold 3 (keV)"),
    rw("THRESHOLD4", Float, "threshold 4 (keV)"),
    rw("THRESHOLD5", Float, "threshold 5 (keV)"),
    rw("THRESHOLD6", Float, "threshold 6 (keV)"),
    rw("THRESHOLD7", Float, "threshold 7 (keV)"),
    rw("COUNTERDEPTH", Integer, "counter bit depth: 1, 6, 12 or 24"),
    rw("TEMPERATURE", Float, "board temperature (C)"),
    rw("HVBIAS", Integer, "sensor bias voltage (V)"),
    // 采集与触发
    rw("RUNHEADLESS", Boolean, "suppress live display in the Merlin GUI"),
    rw("FILEFORMAT", Integer, "0: binary, 1: binary + TIFF, 2: TIFF"),
    rw("NUMFRAMESTOACQUIRE", Integer, "frames per acquisition"),
    rw("ACQUISITIONTIME", Float, "exposure time (ms)"),
    rw("ACQUISITIONPERIOD", Float, "frame period (ms)"),
    rw("TRIGGERSTART", Integer, "start trigger source, 0..=9"),
    rw("TRIGGERSTOP", Integer, "stop trigger source, 0..=9"),
    rw("NUMFRAMESPERTRIGGER", Integer, "frames per trigger"),
    rw("TriggerOutTTL", Integer, "TTL trigger output source"),
    rw("TriggerOutLVDS", Integer, "LVDS trigger output source"),
    rw("TriggerOutTTLInvert", Boolean, "invert TTL trigger output"),
    rw("TriggerOutLVDSInvert", Boolean, "invert LVDS trigger output"),
    rw("TriggerOutTTLDelay", Integer, "TTL trigger output delay (ns)"),
    rw("TriggerOutLVDSDelay", Integer, "LVDS trigger output delay (ns)"),
    rw("TriggerUseDelay", Boolean, "apply trigger output delays"),
    // 阈值扫描
    rw("THSCAN", Integer, "threshold to scan"),
    rw("THSTART", Float, "scan start (keV)"),
    rw("THSTOP", Float, "scan stop (keV)"),
    rw("THSTEP", Float, "scan step (keV)"),
    rw("THNUMSTEPS", Integer, "number of scan steps"),
    // 文件保存
    rw("FILEDIRECTORY", Text, "output directory"),
    rw("FILENAME", Text, "output file name"),
    rw("FILEENABLE", Boolean, "save frames to disk"),
    ro("DETECTORSTATUS", Integer, "0: idle, 1: busy, 2: standby"),
];

/// 按命令名查找属性（大小写不敏感）
pub fn lookup(name: &str) -> Option<&'static Property> {
    PROPERTIES
        .iter()
        .find(|p| p.command.eq_ignore_ascii_case(name))
}

/// 动作命令（`CMD`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    StartAcquisition,
    StopAcquisition,
    SoftTrigger,
    Reset,
}

impl Action {
    pub fn command_name(&self) -> &'static str {
        match self {
            Action::StartAcquisition => "STARTACQUISITION",
            Action::StopAcquisition => "STOPACQUISITION",
            Action::SoftTrigger => "SOFTTRIGGER",
            Action::Reset => "RESET",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_name())
    }
}
