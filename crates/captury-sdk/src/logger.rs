//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 安装全局 `tracing` 订阅者（读取 `RUST_LOG`，默认 `info`），
/// 并把 `log` crate 的记录桥接到 `tracing`
///
/// 已经安装过订阅者时返回 `false`，不会覆盖。
pub fn init_logger() -> bool {
    init_logger_with("info")
}

/// 同 [`init_logger`]，`RUST_LOG` 未设置时使用 `default_directives`
pub fn init_logger_with(default_directives: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }

    // 可能已被其他组件安装
    let _ = tracing_log::LogTracer::init();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        // 同一进程中其他测试可能已经安装，这里只检查第二次一定失败
        init_logger_with("captury=debug");
        assert!(!init_logger());
    }
}
