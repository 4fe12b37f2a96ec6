//! 错误上报
//!
//! 上报端是外部协作方，这里只定义能力接口和几个简单实现。
//! 未配置 `SENTRY_DSN` 时上报关闭，普通日志不受影响。

use std::error::Error as StdError;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;

/// 错误上报能力
pub trait ErrorReporter: Send + Sync {
    /// `context` 标明出错的环节，例如 `authenticate.acquire_token`
    fn capture(&self, context: &str, error: &(dyn StdError + 'static));
}

/// 拼接错误及其来源链
pub fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// 上报关闭时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ErrorReporter for NoopReporter {
    fn capture(&self, _context: &str, _error: &(dyn StdError + 'static)) {}
}

/// 以独立的 `telemetry` target 输出结构化事件，交给采集端转发
#[derive(Debug, Clone)]
pub struct LogReporter {
    environment: String,
}

impl LogReporter {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }
}

impl ErrorReporter for LogReporter {
    fn capture(&self, context: &str, error: &(dyn StdError + 'static)) {
        tracing::error!(
            target: "telemetry",
            environment = %self.environment,
            context = %context,
            error = %error_chain(error),
            "captured error"
        );
    }
}

/// 一次上报的快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedError {
    pub context: String,
    pub message: String,
}

/// 把上报内容留在内存里，供测试断言
#[derive(Debug, Default, Clone)]
pub struct MemoryReporter {
    events: Arc<Mutex<Vec<CapturedError>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CapturedError> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl ErrorReporter for MemoryReporter {
    fn capture(&self, context: &str, error: &(dyn StdError + 'static)) {
        self.events.lock().push(CapturedError {
            context: context.to_string(),
            message: error_chain(error),
        });
    }
}

/// 有 DSN 时开启上报
pub fn reporter_from_config(config: &Config) -> Arc<dyn ErrorReporter> {
    match &config.sentry_dsn {
        Some(_) => {
            tracing::info!(environment = %config.environment, "error telemetry enabled");
            Arc::new(LogReporter::new(config.environment.clone()))
        }
        None => {
            tracing::info!("SENTRY_DSN not set, error telemetry disabled");
            Arc::new(NoopReporter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn test_error_chain_includes_sources() {
        let err = Outer(std::io::Error::other("disk on fire"));
        assert_eq!(error_chain(&err), "outer failure: disk on fire");
    }

    #[test]
    fn test_memory_reporter_records_context() {
        let reporter = MemoryReporter::new();
        reporter.capture("healthz", &std::io::Error::other("down"));

        assert_eq!(
            reporter.events(),
            vec![CapturedError {
                context: "healthz".to_string(),
                message: "down".to_string(),
            }]
        );
    }

    #[test]
    fn test_reporter_selection() {
        let config = Config::default();
        // 未配置 DSN 时不应 panic，也不产生事件
        reporter_from_config(&config).capture("noop", &std::io::Error::other("ignored"));

        let config = Config {
            sentry_dsn: Some("https://key@sentry.example/1".to_string()),
            ..Config::default()
        };
        reporter_from_config(&config).capture("log", &std::io::Error::other("logged"));
    }
}
