#![doc = r#"
# hxsock-transport-tcp

## 设计动机（Why）
- **定位**：把 Tokio 的 TCP 套接字接到 `hxsock-engine` 上，提供服务端、多连接代理与单连接客户端；
- **架构角色**：引擎只认识“收到的字节”和 [`TransportHandle`](hxsock_engine::TransportHandle)，
  本 crate 是该句柄的 Tokio 实现，同时负责把套接字错误映射为关闭原因。

## 核心契约（What）
- 每条连接一个读任务、一个写任务，运行在 [`build_runtime`] 构建的固定工作线程池上；
- 读任务在引擎返回 `Paused` 时停止读取，直到引擎通过句柄通知恢复；
- I/O 失败以 `CloseCode::Transport(raw_os_error)` 上报，并携带失败的 `SocketOperation`。

## 实现策略（How）
- 唤醒通过 `tokio::sync::Notify` 完成，引擎回调句柄时不会阻塞；
- 写任务持有 `IoGuard`，保证非强制关闭时剩余数据写完后才回收连接资源。

## 风险与考量（Trade-offs）
- 读缓冲按 `chunk_capacity` 分配，单次读取最多交给引擎一个块的字节；
- 安全层握手不在本 crate 范围内，`secure` 配置下需由上层调用 `handshake_completed`。
"#]

mod error;

#[cfg(feature = "runtime-tokio")]
mod agent;
#[cfg(feature = "runtime-tokio")]
mod connection;
#[cfg(feature = "runtime-tokio")]
mod handle;
#[cfg(feature = "runtime-tokio")]
mod runtime;
#[cfg(feature = "runtime-tokio")]
mod server;

pub use error::TcpError;

#[cfg(feature = "runtime-tokio")]
pub use agent::{TcpAgent, TcpClient};
#[cfg(feature = "runtime-tokio")]
pub use runtime::build_runtime;
#[cfg(feature = "runtime-tokio")]
pub use server::TcpServer;
