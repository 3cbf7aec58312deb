//! 协议常量定义

// ============================================================================
// 外层帧
// ============================================================================

/// 帧前导标识
pub const PREAMBLE: &[u8; 3] = b"MPX";
/// 字段分隔符
pub const SEPARATOR: u8 = b',';
/// 长度字段宽度（十进制，补零）
pub const LENGTH_FIELD_WIDTH: usize = 10;
/// 长度字段的最大可表示值
pub const MAX_LENGTH_FIELD: u64 = 9_999_999_999;
/// `MPX,<LEN10>` 的字节数（不含长度字段后的分隔符）
pub const LENGTH_FIELD_END: usize = PREAMBLE.len() + 1 + LENGTH_FIELD_WIDTH;
/// 外层前缀 `MPX,<LEN10>,` 的字节数
pub const OUTER_PREFIX_LEN: usize = LENGTH_FIELD_END + 1;

// ============================================================================
// 默认端口
// ============================================================================

/// 命令接口默认端口
pub const DEFAULT_COMMAND_PORT: u16 = 6341;
/// 数据流接口默认端口
pub const DEFAULT_DATA_PORT: u16 = 6342;

// ============================================================================
// 图像帧头
// ============================================================================

/// 默认帧组标识（单芯片 Merlin）
pub const DEFAULT_FRAME_SET: &str = "MQ1";
/// 默认帧头总长度（字节）
pub const DEFAULT_HEADER_LEN: usize = 384;
/// 帧头填充字符
pub const HEADER_FILL: u8 = b'0';

pub const SEQUENCE_WIDTH: usize = 6;
pub const HEADER_LEN_WIDTH: usize = 5;
pub const CHIP_COUNT_WIDTH: usize = 2;
pub const DIMENSION_WIDTH: usize = 4;

// ============================================================================
// 前导信息块
// ============================================================================

/// 前导信息块起始标记
pub const PREAMBLE_MARKER: &str = "HDR";
/// 前导信息块结束标记
pub const PREAMBLE_END: &str = "End";
