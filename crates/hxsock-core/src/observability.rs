//! `tracing` 订阅器安装入口。
//!
//! # 教案式说明
//! - **意图（Why）**：库代码只调用 `tracing` 宏，不关心输出目的地；可执行程序或测试在启动时
//!   调用一次 [`install_tracing`]，即可按 `RUST_LOG` 过滤并输出到标准错误；
//! - **逻辑（How）**：组合 `EnvFilter`（环境变量优先，缺省回落到给定指令）与 `fmt` 层，
//!   注册为全局默认订阅器；`OnceLock` 记录安装状态，防止重复安装；
//! - **契约（What）**：重复调用返回 [`TracingError::AlreadyInstalled`]；外部已设置全局订阅器时返回
//!   [`TracingError::Subscriber`]，均不会 panic。

use std::sync::OnceLock;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// 默认日志过滤指令。
pub const DEFAULT_DIRECTIVE: &str = "info";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("tracing subscriber already installed by hxsock")]
    AlreadyInstalled,
    #[error("invalid log filter directive: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("failed to install global tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// 以默认指令安装订阅器。
pub fn install_tracing() -> Result<(), TracingError> {
    install_tracing_with(DEFAULT_DIRECTIVE)
}

/// 以指定的缺省过滤指令安装订阅器，`RUST_LOG` 存在时优先生效。
pub fn install_tracing_with(default_directive: &str) -> Result<(), TracingError> {
    if INSTALLED.get().is_some() {
        return Err(TracingError::AlreadyInstalled);
    }
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;
    INSTALLED
        .set(())
        .map_err(|_| TracingError::AlreadyInstalled)
}
