//! `hxsock-core` 汇集 hxsock 各层共享的基础契约。
//!
//! # 模块定位（Why）
//! - 缓冲池、连接引擎、传输适配三层都需要同一套错误码、锁原语与配置结构；
//!   将它们下沉到独立 crate，可避免上层 crate 之间互相依赖。
//! - 锁原语以 [`sync::RawLock`] 为统一抽象，由调用方在构造共享资源时按策略选择，
//!   而非在每个调用点手工挑选自旋锁或互斥锁。
//!
//! # 结构概要（How）
//! - [`error`]：稳定错误码、关闭原因 [`CloseCode`] 与操作阶段 [`SocketOperation`]；
//! - [`sync`]：临界区、自旋锁、可重入自旋锁、空锁，以及作用域守卫与 [`sync::Locked`] 容器；
//! - [`config`]：引擎配置面，支持 TOML 解析、构建器与启动期校验；
//! - [`observability`]：`tracing` 订阅器的一次性安装入口。

pub mod config;
pub mod error;
pub mod observability;
pub mod sync;

pub use config::{
    DeliveryModel, EngineConfig, HeaderLayout, OverflowPolicy, PackConfig, PackDelivery,
    PoolConfig, SendPolicy,
};
pub use error::{CloseCode, ConfigError, SocketOperation};
pub use sync::{LockPolicy, RawLock};
