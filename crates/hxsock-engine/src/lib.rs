//! `hxsock-engine`：面向连接的字节流拆包与交付引擎。
//!
//! # 模块定位（Why）
//! - 传输层（IOCP、epoll、Tokio 任务……）只负责把“收到的原始字节”交给引擎；
//!   引擎负责把字节挂到连接的缓冲块链上，按交付模型拆包并回调监听器，
//!   同时维护连接状态机与资源回收时机。
//! - 三种交付模型共用同一套字节存储：
//!   - PUSH：收到即回调 `on_receive(bytes)`；
//!   - PULL：只回调 `on_receive_len(n)`，调用方随后 `fetch`/`peek`；
//!   - PACK：按“标志 + 长度”包头拆包，只交付完整数据包。
//!
//! # 结构概要（How）
//! - [`SocketEngine`]：引擎本体，持有配置、监听器、缓冲块池、连接记录池与连接表；
//! - [`framing`]：包头编解码与逐连接拆包器；
//! - [`state`]：连接状态机与服务状态；
//! - [`Listener`] / [`TransportHandle`]：引擎与上层回调、下层传输的两条协作边界；
//! - [`capability`]：按配置暴露 PUSH/PULL/PACK 能力的 trait。
//!
//! # 并发约定（What）
//! - 同一连接的接收处理（拆包 + 回调）由连接级可重入锁串行化，不同连接可在不同工作线程上并行；
//! - 回调期间不持有连接数据锁，监听器可以在回调内调用 `fetch`、`send`、`disconnect`；
//! - 关闭连接立即进入 `Closing`，缓冲与连接记录的最终回收推迟到所有在途 I/O 结束。

pub mod capability;
mod engine;
mod error;
pub mod framing;
mod id;
mod listener;
mod record;
mod slot;
pub mod state;
mod transport;

pub use capability::{PackCapable, PullCapable, PushCapable};
pub use engine::{EngineStats, LastError, ReceiveOutcome, SocketEngine};
pub use error::{EngineError, FetchResult};
pub use framing::{FrameError, FrameStep, Framer, FramingPolicy, PackHeader};
pub use id::ConnId;
pub use listener::{HandleResult, Listener};
pub use slot::IoGuard;
pub use state::{ConnState, PauseReason, ServiceState};
pub use transport::{DetachedHandle, Origin, TransportHandle};
