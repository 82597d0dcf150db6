//! 引擎回调传输层的句柄：把 `resume_receive`/`flush`/`close` 转成任务唤醒。

use std::sync::atomic::{AtomicBool, Ordering};

use hxsock_engine::TransportHandle;
use tokio::sync::Notify;

/// 每条 TCP 连接一个，由读任务、写任务与引擎共享。
///
/// - `resume`/`flush` 使用 `notify_one`，任务尚未等待时许可会被保留，唤醒不会丢失；
/// - `closed` 先置位再 `notify_waiters`，等待方先登记再检查标志。
#[derive(Debug, Default)]
pub(crate) struct TokioHandle {
    resume: Notify,
    flush: Notify,
    close: Notify,
    closed: AtomicBool,
    forced: AtomicBool,
}

impl TokioHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn is_forced(&self) -> bool {
        self.forced.load(Ordering::Acquire)
    }

    pub(crate) async fn resumed(&self) {
        self.resume.notified().await;
    }

    pub(crate) async fn flushed(&self) {
        self.flush.notified().await;
    }

    pub(crate) async fn closed(&self) {
        let notified = self.close.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }
}

impl TransportHandle for TokioHandle {
    fn resume_receive(&self) {
        self.resume.notify_one();
    }

    fn flush(&self) {
        self.flush.notify_one();
    }

    fn close(&self, force: bool) {
        self.forced.store(force, Ordering::Release);
        self.closed.store(true, Ordering::Release);
        self.close.notify_waiters();
        self.flush.notify_one();
    }
}
