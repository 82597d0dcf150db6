//! 单条 TCP 连接的读写任务。
//!
//! # 教案式说明
//! - **意图 (Why)**：引擎只处理字节与状态，本模块负责把套接字事件喂给引擎，
//!   并在引擎要求时暂停读取、写出发送队列；
//! - **逻辑 (How)**：
//!   - 读任务：`read_buf` → `on_received`；返回 `Paused` 时等待句柄的恢复通知，
//!     随后以空事件重新驱动排空；对端关闭报告 `(Receive, Normal)`；
//!   - 写任务：持有一个 [`IoGuard`] 直到退出，收到 flush 通知后循环 `take_send` 并写出；
//!     非强制关闭时先写完剩余数据再半关闭；
//! - **契约 (What)**：写任务的守卫保证连接记录在最后一次写出之前不会被回收。

use std::sync::Arc;

use bytes::BytesMut;
use hxsock_core::{CloseCode, SocketOperation};
use hxsock_engine::{ConnId, IoGuard, Origin, ReceiveOutcome, SocketEngine};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, trace};

use crate::error::{TcpError, close_code};
use crate::handle::TokioHandle;

/// 已登记到引擎、尚未启动读写任务的连接。
pub(crate) struct Pending {
    pub(crate) id: ConnId,
    handle: Arc<TokioHandle>,
}

/// 向引擎登记一条连接：入站连接在此完成激活，出站连接停留在 `Connecting`。
pub(crate) fn register(engine: &SocketEngine, origin: Origin) -> Result<Pending, TcpError> {
    let handle = Arc::new(TokioHandle::new());
    let id = engine.attach(handle.clone(), origin)?;
    Ok(Pending { id, handle })
}

/// 拆分套接字并启动读写任务。
pub(crate) fn spawn(
    engine: &SocketEngine,
    pending: Pending,
    stream: TcpStream,
) -> Result<ConnId, TcpError> {
    let Pending { id, handle } = pending;
    let guard = engine.begin_io(id)?;
    if let Err(err) = stream.set_nodelay(true) {
        debug!(conn_id = %id, error = %err, "failed to disable nagle");
    }
    let chunk = engine.config().chunk_capacity;
    let (reader, writer) = stream.into_split();
    tokio::spawn(write_loop(
        engine.clone(),
        guard,
        handle.clone(),
        writer,
        chunk,
    ));
    tokio::spawn(read_loop(engine.clone(), id, handle, reader, chunk));
    Ok(id)
}

async fn read_loop(
    engine: SocketEngine,
    id: ConnId,
    handle: Arc<TokioHandle>,
    mut reader: OwnedReadHalf,
    chunk: usize,
) {
    let mut buf = BytesMut::with_capacity(chunk);
    loop {
        buf.clear();
        let read = tokio::select! {
            read = reader.read_buf(&mut buf) => read,
            () = handle.closed() => return,
        };
        let mut outcome = match read {
            Ok(0) => {
                trace!(conn_id = %id, "peer closed");
                let _ = engine.on_io_error(id, SocketOperation::Receive, CloseCode::Normal);
                return;
            }
            Ok(_) => engine.on_received(id, &buf),
            Err(err) => {
                let _ = engine.on_io_error(id, SocketOperation::Receive, close_code(&err));
                return;
            }
        };
        loop {
            match outcome {
                Ok(ReceiveOutcome::Continue) => break,
                Ok(ReceiveOutcome::Paused) => {
                    tokio::select! {
                        () = handle.resumed() => {}
                        () = handle.closed() => return,
                    }
                    outcome = engine.on_received(id, &[]);
                }
                Ok(ReceiveOutcome::Closed) | Err(_) => return,
            }
        }
    }
}

async fn write_loop(
    engine: SocketEngine,
    guard: IoGuard,
    handle: Arc<TokioHandle>,
    mut writer: OwnedWriteHalf,
    chunk: usize,
) {
    let id = guard.id();
    let mut buf = vec![0u8; chunk];
    loop {
        if !drain(&engine, &guard, &mut writer, &mut buf).await {
            return;
        }
        if handle.is_closed() {
            break;
        }
        tokio::select! {
            () = handle.flushed() => {}
            () = handle.closed() => {}
        }
    }
    if !handle.is_forced() && !drain(&engine, &guard, &mut writer, &mut buf).await {
        return;
    }
    if let Err(err) = writer.shutdown().await {
        trace!(conn_id = %id, error = %err, "shutdown after close failed");
    }
}

/// 写出发送队列中的全部数据；写失败时关闭连接并返回 `false`。
async fn drain(
    engine: &SocketEngine,
    guard: &IoGuard,
    writer: &mut OwnedWriteHalf,
    buf: &mut [u8],
) -> bool {
    let id = guard.id();
    loop {
        let n = match guard.take_send(buf) {
            Ok(0) | Err(_) => return true,
            Ok(n) => n,
        };
        if let Err(err) = writer.write_all(&buf[..n]).await {
            let _ = engine.on_io_error(id, SocketOperation::Send, close_code(&err));
            return false;
        }
        let _ = engine.on_send_complete(id, n);
    }
}
