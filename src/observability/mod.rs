//! 可观测性：tracing 订阅器初始化
//!
//! 默认级别来自配置 `app.log_level`；设置了 RUST_LOG 时以其为准。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // 测试或重复调用时订阅器可能已安装
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
