//! 引擎与下层传输的协作边界。

use std::fmt;

/// 连接来源。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Origin {
    /// 由监听套接字接入。
    Inbound,
    /// 由本端主动发起。
    Outbound,
}

/// 传输层为每条连接提供的控制句柄。
///
/// - **意图 (Why)**：引擎不拥有套接字，只在特定时机通知传输层动作：
///   暂停的连接恢复时重新投递读、有待发数据时触发写、连接关闭时释放套接字；
/// - **契约 (What)**：方法可能在任意工作线程上、在引擎持有连接串行锁时被调用，
///   实现必须是非阻塞的（通常只是唤醒传输任务）。
pub trait TransportHandle: Send + Sync + 'static {
    /// 暂停的接收已恢复，传输层应继续读取。
    fn resume_receive(&self) {}

    /// 发送队列有新数据，传输层应调用 `take_send` 取出并写出。
    fn flush(&self) {}

    /// 连接已进入关闭流程；`force` 为真时应立即丢弃未写出的数据。
    fn close(&self, force: bool) {
        let _ = force;
    }
}

/// 不绑定任何套接字的句柄，用于测试或由调用方自行驱动收发的场景。
#[derive(Clone, Copy, Default)]
pub struct DetachedHandle;

impl TransportHandle for DetachedHandle {}

impl fmt::Debug for DetachedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DetachedHandle")
    }
}
