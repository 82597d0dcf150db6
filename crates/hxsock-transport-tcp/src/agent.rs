use std::net::SocketAddr;

use hxsock_core::SocketOperation;
use hxsock_engine::{ConnId, FetchResult, Origin, SocketEngine};
use tokio::net::TcpStream;
use tracing::debug;

use crate::connection;
use crate::error::{TcpError, close_code};

/// 多连接代理：向任意地址发起出站连接，全部连接共享同一个引擎。
///
/// 建连顺序：`on_prepare_connect` → TCP 握手 → 启动读写任务 → `on_connect` → `Active`。
/// TCP 握手失败时连接以 `(Connect, Transport)` 关闭，`on_close` 照常送达。
#[derive(Clone, Debug)]
pub struct TcpAgent {
    engine: SocketEngine,
}

impl TcpAgent {
    pub fn new(engine: SocketEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SocketEngine {
        &self.engine
    }

    pub async fn connect(&self, addr: SocketAddr) -> Result<ConnId, TcpError> {
        let pending = connection::register(&self.engine, Origin::Outbound)?;
        let id = pending.id;
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(source) => {
                let _ = self
                    .engine
                    .on_io_error(id, SocketOperation::Connect, close_code(&source));
                return Err(TcpError::Connect { addr, source });
            }
        };
        connection::spawn(&self.engine, pending, stream)?;
        self.engine.connected(id)?;
        debug!(conn_id = %id, %addr, "outbound connection established");
        Ok(id)
    }
}

/// 单连接客户端：在 [`TcpAgent`] 之上固定一个连接标识。
#[derive(Clone, Debug)]
pub struct TcpClient {
    engine: SocketEngine,
    id: ConnId,
}

impl TcpClient {
    pub async fn connect(engine: SocketEngine, addr: SocketAddr) -> Result<Self, TcpError> {
        let id = TcpAgent::new(engine.clone()).connect(addr).await?;
        Ok(Self { engine, id })
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn engine(&self) -> &SocketEngine {
        &self.engine
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected(self.id)
    }

    pub fn send(&self, data: &[u8]) -> Result<(), TcpError> {
        Ok(self.engine.send(self.id, data)?)
    }

    pub fn fetch(&self, dest: &mut [u8]) -> FetchResult {
        self.engine.fetch(self.id, dest)
    }

    pub fn peek(&self, dest: &mut [u8]) -> FetchResult {
        self.engine.peek(self.id, dest)
    }

    /// 非强制断开：已排队的数据写出后再关闭写半部。
    pub fn disconnect(&self) -> Result<(), TcpError> {
        Ok(self.engine.disconnect(self.id, false)?)
    }
}
