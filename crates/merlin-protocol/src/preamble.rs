//! 采集前导信息块
//!
//! 数据流连接建立后，探测器先发送一个文本信息块，然后才是图像帧：
//!
//! ```text
//! MPX,<LEN10>,,HDR,\t\r\n
//! Chip ID:\tW509_L5, - , - , - \r\n
//! Counter Depth (number):\t1\r\n
//! ...
//! End\t
//! ```
//!
//! 每行是 `<键>:<值>`，键中可能带有括号说明（如 `Sensor Bias (V)`）。

use crate::command::encode_outer_prefix;
use crate::constants::*;
use crate::{ProtocolError, lossy};
use std::fmt;

/// 前导信息块（按出现顺序保存的键值对）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AcquisitionPreamble {
    entries: Vec<(String, String)>,
}

impl AcquisitionPreamble {
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// 解析信息块文本（不含外层前缀）
    ///
    /// 行分隔符可以是 `\r\n` 或 `\n`；缺少 `End` 行视为截断。
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let mut entries = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == PREAMBLE_END {
                return Ok(Self { entries });
            }
            if line.trim_matches(SEPARATOR as char) == PREAMBLE_MARKER {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(ProtocolError::InvalidPreamble(format!(
                    "line without key separator: {line:?}"
                )));
            };
            entries.push((key.trim().to_string(), value.trim().to_string()));
        }

        Err(ProtocolError::InvalidPreamble(format!(
            "missing {PREAMBLE_END:?} marker after {} entries",
            entries.len()
        )))
    }

    /// 从信息块字节解析
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ProtocolError::InvalidPreamble(lossy(bytes)))?;
        Self::parse(text)
    }

    /// 编码为信息块文本（与探测器输出格式一致）
    pub fn encode(&self) -> String {
        let mut out = format!(",{PREAMBLE_MARKER},\t\r\n");
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push_str(":\t");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str(PREAMBLE_END);
        out.push('\t');
        out
    }

    /// 编码为带外层前缀的完整数据流开头
    pub fn to_frame(&self) -> Result<Vec<u8>, ProtocolError> {
        let body = self.encode();
        let mut out = encode_outer_prefix(body.len())?;
        out.extend_from_slice(body.as_bytes());
        Ok(out)
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按键查找
    ///
    /// 键可以是完整写法（`Sensor Bias (V)`），也可以省略括号说明（`Sensor Bias`），
    /// 大小写不敏感。
    pub fn get(&self, key: &str) -> Option<&str> {
        let wanted = short_key(key);
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key) || short_key(k).eq_ignore_ascii_case(wanted))
            .map(|(_, v)| v.as_str())
    }

    // ------------------------------------------------------------------------
    // 常用字段
    // ------------------------------------------------------------------------

    /// 芯片 ID（去掉未使用芯片位置的 ` - ` 占位）
    pub fn chip_id(&self) -> Option<&str> {
        self.get("Chip ID")
            .and_then(|v| v.split(SEPARATOR as char).next())
            .map(str::trim)
    }

    pub fn chip_mode(&self) -> Option<&str> {
        self.get("Chip Mode")
    }

    pub fn counter_depth(&self) -> Option<u32> {
        self.get("Counter Depth").and_then(leading_number)
    }

    /// 各阈值（keV）
    pub fn thresholds_kev(&self) -> Option<Vec<f64>> {
        self.get("Thresholds").and_then(|v| {
            v.split(SEPARATOR as char)
                .map(|t| t.trim().parse::<f64>().ok())
                .collect()
        })
    }

    /// 传感器偏压（V）
    pub fn bias_voltage(&self) -> Option<f64> {
        self.get("Sensor Bias").and_then(leading_number)
    }

    pub fn trigger_start(&self) -> Option<&str> {
        self.get("Trigger Start")
    }

    pub fn trigger_stop(&self) -> Option<&str> {
        self.get("Trigger Stop")
    }

    pub fn frame_count(&self) -> Option<u32> {
        self.get("Frames in Acquisition").and_then(leading_number)
    }

    pub fn frames_per_trigger(&self) -> Option<u32> {
        self.get("Frames per Trigger").and_then(leading_number)
    }

    pub fn software_version(&self) -> Option<&str> {
        self.get("Software Version")
    }
}

impl fmt::Display for AcquisitionPreamble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}

/// 去掉括号说明后的键
fn short_key(key: &str) -> &str {
    key.split('(').next().unwrap_or(key).trim()
}

/// 解析值开头的数字（`120 V` -> 120）
fn leading_number<T: std::str::FromStr>(value: &str) -> Option<T> {
    value.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::parse_outer_prefix;

    // 测试服务器发送的实际信息块（节选）
    const SAMPLE: &str = ",HDR,\t\r\n\
        Time and Date Stamp (day, mnth, yr, hr, min, s):\t13/08/2021 14:10:17\r\n\
        Chip ID:\tW509_L5, - , - , - \r\n\
        Chip Type (Medipix 3.0, Medipix 3.1, Medipix 3RX):\tMedipix 3RX\r\n\
        Chip Mode  (SPM, CSM, CM, CSCM):\tSPM\r\n\
        Counter Depth (number):\t1\r\n\
        Thresholds (keV):\t0.000000E+0,5.110000E+2,0.000000E+0,0.000000E+0,0.000000E+0,0.000000E+0,0.000000E+0,0.000000E+0\r\n\
        bpc File:\tc:\\Merlin_Quad_Config\\W509_L5\\W509_L5_SPM.bpc,,,\r\n\
        Frames in Acquisition (Number):\t1\r\n\
        Frames per Trigger (Number):\t1\r\n\
        Trigger Start (Positive, Negative, Internal):\tInternal\r\n\
        Trigger Stop (Positive, Negative, Internal):\tInternal\r\n\
        Sensor Bias (V):\t120 V\r\n\
        Software Version:\t0.77.0.16\r\n\
        End\t";

    #[test]
    fn test_parse_sample() {
        let preamble = AcquisitionPreamble::parse(SAMPLE).unwrap();
        assert_eq!(preamble.len(), 13);
        assert_eq!(preamble.chip_id(), Some("W509_L5"));
        assert_eq!(preamble.chip_mode(), Some("SPM"));
        assert_eq!(preamble.counter_depth(), Some(1));
        assert_eq!(preamble.bias_voltage(), Some(120.0));
        assert_eq!(preamble.trigger_start(), Some("Internal"));
        assert_eq!(preamble.trigger_stop(), Some("Internal"));
        assert_eq!(preamble.frame_count(), Some(1));
        assert_eq!(preamble.frames_per_trigger(), Some(1));
        assert_eq!(preamble.software_version(), Some("0.77.0.16"));

        let thresholds = preamble.thresholds_kev().unwrap();
        assert_eq!(thresholds.len(), 8);
        assert_eq!(thresholds[1], 511.0);
    }

    #[test]
    fn test_value_keeps_colons() {
        let preamble = AcquisitionPreamble::parse(SAMPLE).unwrap();
        assert_eq!(
            preamble.get("bpc File"),
            Some("c:\\Merlin_Quad_Config\\W509_L5\\W509_L5_SPM.bpc,,,")
        );
        assert_eq!(
            preamble.get("Time and Date Stamp (day, mnth, yr, hr, min, s)"),
            Some("13/08/2021 14:10:17")
        );
    }

    #[test]
    fn test_get_ignores_description_and_case() {
        let preamble = AcquisitionPreamble::parse(SAMPLE).unwrap();
        assert_eq!(preamble.get("sensor bias"), Some("120 V"));
        assert_eq!(preamble.get("Sensor Bias (V)"), Some("120 V"));
        assert_eq!(preamble.get("Humidity"), None);
    }

    #[test]
    fn test_parse_lf_only() {
        let preamble = AcquisitionPreamble::parse(",HDR,\nChip ID:\tA\nEnd\n").unwrap();
        assert_eq!(preamble.chip_id(), Some("A"));
    }

    #[test]
    fn test_parse_truncated() {
        let err = AcquisitionPreamble::parse(",HDR,\t\r\nChip ID:\tA\r\n").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPreamble(_)));
    }

    #[test]
    fn test_parse_rejects_garbage_line() {
        assert!(AcquisitionPreamble::parse(",HDR,\nnot a pair\nEnd").is_err());
    }

    #[test]
    fn test_encode_parse() {
        let preamble = AcquisitionPreamble::from_entries([
            ("Chip ID", "W509_L5"),
            ("Counter Depth (number)", "12"),
        ]);
        let text = preamble.encode();
        assert!(text.starts_with(",HDR,\t\r\n"));
        assert!(text.ends_with("End\t"));
        assert_eq!(AcquisitionPreamble::parse(&text).unwrap(), preamble);
    }

    #[test]
    fn test_to_frame_length() {
        let preamble = AcquisitionPreamble::parse(SAMPLE).unwrap();
        let frame = preamble.to_frame().unwrap();
        let declared = parse_outer_prefix(&frame).unwrap();
        assert_eq!(declared, frame.len() - OUTER_PREFIX_LEN);
        let decoded = AcquisitionPreamble::decode(&frame[OUTER_PREFIX_LEN..]).unwrap();
        assert_eq!(decoded, preamble);
    }
}
