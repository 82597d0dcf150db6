use std::io;
use std::net::SocketAddr;

use hxsock_core::CloseCode;
use hxsock_core::error::codes;
use hxsock_engine::EngineError;
use thiserror::Error;

/// TCP 传输层错误。
#[derive(Debug, Error)]
pub enum TcpError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to build tokio runtime: {0}")]
    Runtime(#[source] io::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl TcpError {
    pub fn code(&self) -> &'static str {
        match self {
            TcpError::Bind { .. } => codes::TCP_BIND,
            TcpError::Accept(_) => codes::TCP_ACCEPT,
            TcpError::Connect { .. } => codes::TCP_CONNECT,
            TcpError::Runtime(_) => codes::TCP_RUNTIME,
            TcpError::Engine(err) => err.code(),
        }
    }
}

/// 把套接字错误映射为关闭原因，保留 OS 错误码。
#[cfg_attr(not(feature = "runtime-tokio"), allow(dead_code))]
pub(crate) fn close_code(err: &io::Error) -> CloseCode {
    CloseCode::Transport(err.raw_os_error())
}
