//! 可观测性：tracing 订阅者初始化
//!
//! 默认 info 级别，可通过 RUST_LOG 覆盖。每次工具调用另有一行 JSON 审计日志（见 tools::executor）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 测试或嵌入场景下可能已有全局订阅者
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
