//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over the configured level when it is set.

use tracing_subscriber::EnvFilter;

/// 初始化日志系统
///
/// Installs a global `fmt` subscriber on stderr, plain or JSON. Calling it
/// again is a no-op, so tests and binaries can both reach it.
pub fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr);

    // 已有全局 subscriber 时忽略
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
