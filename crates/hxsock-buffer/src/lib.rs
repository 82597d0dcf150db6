//! `hxsock-buffer` 提供连接收发路径使用的池化缓冲。
//!
//! # 模块定位（Why）
//! - 高连接数、高消息率下，每次收包都向全局分配器申请内存会造成严重的分配抖动；
//!   本 crate 以定长缓冲块为复用单位，由对象池循环使用，稳态下收发路径不触发新分配。
//! - 连接的待处理字节以“缓冲块链”表示，链可跨块呈现一条逻辑字节流，
//!   按需从池中追加新块、在块被完全消费后立即归还。
//!
//! # 设计概要（How）
//! - [`Arena`]：为缓冲块提供带预算的后备存储，并统计在用块数与字节数；
//! - [`BufferChunk`]：定长容器，维护有效窗口 `[head, cursor)`，所有操作均不重新分配；
//! - [`ObjectPool`]：通用自由链表回收器，受 `pool_size`/`hold`/`lock_time` 三个参数约束，
//!   自由链表由调用方选定的 [`RawLock`](hxsock_core::RawLock) 保护；
//! - [`ChunkChain`]：一条连接独占的缓冲块序列，`total_size` 增量维护为 O(1)。

mod arena;
mod chain;
mod chunk;
mod error;
mod pool;

pub use arena::{Arena, ArenaBlock, ArenaStats};
pub use chain::ChunkChain;
pub use chunk::BufferChunk;
pub use error::BufferError;
pub use pool::{ChunkPool, ObjectPool, PoolStats, Poolable};
