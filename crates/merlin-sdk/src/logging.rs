//! 日志初始化
//!
//! 使用 `tracing-subscriber` 的 fmt 输出，过滤规则优先取 `RUST_LOG`，
//! 并通过 `tracing-log` 把 `log` crate 的记录转发到 tracing。

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// 默认过滤规则
pub const DEFAULT_FILTER: &str = "info";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("Global subscriber already set: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
    #[error("log bridge already set: {0}")]
    LogBridge(#[from] tracing_log::log_tracer::SetLoggerError),
}

/// 以默认规则（`info`）初始化日志
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_filter(DEFAULT_FILTER)
}

/// 初始化日志
///
/// 设置了 `RUST_LOG` 时使用环境变量，否则使用 `directives`
/// （如 `"merlin_net=debug,info"`）。只能调用一次，重复调用返回错误。
pub fn init_logging_with_filter(directives: &str) -> Result<(), LoggingError> {
    let filter = env_filter(directives)?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

/// 构造过滤器：`RUST_LOG` 优先
pub fn env_filter(directives: &str) -> Result<EnvFilter, LoggingError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(env) if !env.trim().is_empty() => Ok(EnvFilter::try_new(env)?),
        _ => Ok(EnvFilter::try_new(directives)?),
    }
}
