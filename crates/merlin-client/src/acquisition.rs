//! 采集设置
//!
//! 开始采集前需要依次写入的一组探测器设置。[`AcquisitionSettings::commands`]
//! 给出按写入顺序排列的 `(属性, 值)` 列表，
//! [`CommandClient::start_acquisition_with`](crate::CommandClient::start_acquisition_with)
//! 逐项 `SET` 后发送 `STARTACQUISITION`。

use merlin_protocol::PropertyValue;
use serde::{Deserialize, Serialize};

/// 采集设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// 传感器偏压（V）
    pub hvbias: i64,
    /// 阈值 0（keV）
    pub threshold0: f64,
    /// 阈值 1（keV）
    pub threshold1: f64,
    pub continuous_rw: bool,
    /// 计数器位深：1、6、12 或 24
    pub counter_depth: i64,
    /// 曝光时间（ms）
    pub acquisition_time_ms: f64,
    /// 帧周期（ms）
    pub acquisition_period_ms: f64,
    pub frame_count: i64,
    pub file_enable: bool,
    /// 开始触发源（0: 内部）
    pub trigger_start: i64,
    pub run_headless: bool,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            hvbias: 120,
            threshold0: 0.0,
            threshold1: 511.0,
            continuous_rw: true,
            counter_depth: 1,
            acquisition_time_ms: 75.0,
            acquisition_period_ms: 75.0,
            frame_count: 1,
            file_enable: false,
            trigger_start: 0,
            run_headless: false,
        }
    }
}

impl AcquisitionSettings {
    /// 按写入顺序排列的设置
    pub fn commands(&self) -> Vec<(&'static str, PropertyValue)> {
        vec![
            ("HVBIAS", self.hvbias.into()),
            ("THRESHOLD0", self.threshold0.into()),
            ("THRESHOLD1", self.threshold1.into()),
            ("CONTINUOUSRW", self.continuous_rw.into()),
            ("COUNTERDEPTH", self.counter_depth.into()),
            ("ACQUISITIONTIME", self.acquisition_time_ms.into()),
            ("ACQUISITIONPERIOD", self.acquisition_period_ms.into()),
            ("NUMFRAMESTOACQUIRE", self.frame_count.into()),
            ("FILEENABLE", self.file_enable.into()),
            ("TRIGGERSTART", self.trigger_start.into()),
            ("RUNHEADLESS", self.run_headless.into()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merlin_protocol::property;

    #[test]
    fn test_commands_order_and_values() {
        let settings = AcquisitionSettings {
            threshold0: 200.0,
            frame_count: 65792,
            trigger_start: 1,
            ..Default::default()
        };
        let commands = settings.commands();
        assert_eq!(commands[0], ("HVBIAS", PropertyValue::Integer(120)));
        assert_eq!(commands[1], ("THRESHOLD0", PropertyValue::Float(200.0)));
        assert_eq!(commands[3], ("CONTINUOUSRW", PropertyValue::Boolean(true)));
        assert_eq!(commands[7], ("NUMFRAMESTOACQUIRE", PropertyValue::Integer(65792)));
        assert_eq!(commands.last().unwrap().0, "RUNHEADLESS");
    }

    #[test]
    fn test_commands_match_property_table() {
        for (name, value) in AcquisitionSettings::default().commands() {
            let p = property::lookup(name).unwrap();
            assert!(p.is_writable(), "{name}");
            assert!(p.kind.coerce(value).is_ok(), "{name}");
        }
    }
}
