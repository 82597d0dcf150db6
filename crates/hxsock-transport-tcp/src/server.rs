use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use hxsock_engine::{Origin, SocketEngine};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connection;
use crate::error::TcpError;

const BACKLOG: i32 = 1024;
/// `accept` 失败（例如文件描述符耗尽）后的退避时间。
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// TCP 服务端：接受入站连接并交给引擎。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 把“监听 → 接受 → 登记 → 启动读写任务”收敛到一个类型，调用方只需实现 `Listener`；
///
/// ## 逻辑 (How)
/// - `bind`：通过 `socket2` 创建监听套接字（地址复用、显式 backlog），再交给 Tokio；
/// - `serve`：循环 `accept`，直到 [`shutdown`](Self::shutdown) 发出停止信号；
///   引擎拒绝的连接（数量上限、`on_accept` 返回 `Error`）直接丢弃套接字；
///
/// ## 契约 (What)
/// - 引擎必须已 `start`；`shutdown` 会停止引擎，从而以 `Shutdown` 关闭全部连接；
/// - `serve` 可在独立任务中运行，`shutdown` 可从任意任务调用。
#[derive(Debug)]
pub struct TcpServer {
    engine: SocketEngine,
    listener: TokioTcpListener,
    local_addr: SocketAddr,
    stop: watch::Sender<bool>,
}

impl TcpServer {
    /// 绑定到指定地址；端口为 0 时由系统分配，实际地址见 [`local_addr`](Self::local_addr)。
    pub async fn bind(engine: SocketEngine, addr: SocketAddr) -> Result<Self, TcpError> {
        let listener = listen(addr).map_err(|source| TcpError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TcpError::Bind { addr, source })?;
        info!(%local_addr, "tcp server listening");
        let (stop, _) = watch::channel(false);
        Ok(Self {
            engine,
            listener,
            local_addr,
            stop,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn engine(&self) -> &SocketEngine {
        &self.engine
    }

    /// 接受循环；收到停止信号后返回。
    pub async fn serve(&self) -> Result<(), TcpError> {
        let mut stop = self.stop.subscribe();
        loop {
            if *stop.borrow_and_update() {
                break;
            }
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };
            match accepted {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(err) => {
                    let err = TcpError::Accept(err);
                    warn!(code = err.code(), error = %err, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
        debug!(local_addr = %self.local_addr, "accept loop stopped");
        Ok(())
    }

    /// 停止接受新连接并停止引擎。
    pub fn shutdown(&self) -> Result<(), TcpError> {
        self.stop.send_replace(true);
        self.engine.stop()?;
        Ok(())
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        let admitted = connection::register(&self.engine, Origin::Inbound)
            .and_then(|pending| connection::spawn(&self.engine, pending, stream));
        match admitted {
            Ok(id) => debug!(conn_id = %id, %peer, "connection accepted"),
            Err(err) => debug!(%peer, code = err.code(), error = %err, "connection dropped"),
        }
    }
}

fn listen(addr: SocketAddr) -> io::Result<TokioTcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    TokioTcpListener::from_std(socket.into())
}
