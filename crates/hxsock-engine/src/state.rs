//! 连接状态机与服务状态。

use core::fmt;

/// 连接状态。
///
/// # 教案式说明
/// - **意图 (Why)**：状态决定拆包器是否工作：只有 `Active` 时才拆包与交付，
///   握手完成前到达的字节只缓存不解码，`Paused` 时暂停交付，`Closing` 之后拒绝一切新工作；
/// - **契约 (What)**：合法跃迁由 [`ConnState::can_transition_to`] 给出，`Closed` 为终态；
/// - **执行 (How)**：
///   `Connecting → HandshakeStarting → Active ⇄ Paused → Closing → Closed`，
///   未启用安全层时 `Connecting` 直接进入 `Active`，任何未终止状态都可进入 `Closing`。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ConnState {
    Connecting,
    HandshakeStarting,
    Active,
    Paused,
    Closing,
    Closed,
}

impl ConnState {
    /// 判断状态是否允许跃迁至 `target`。
    pub fn can_transition_to(self, target: ConnState) -> bool {
        use ConnState::*;
        matches!(
            (self, target),
            (Connecting, HandshakeStarting)
                | (Connecting, Active)
                | (Connecting, Closing)
                | (HandshakeStarting, Active)
                | (HandshakeStarting, Closing)
                | (Active, Paused)
                | (Active, Closing)
                | (Paused, Active)
                | (Paused, Closing)
                | (Closing, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnState::Closed)
    }

    /// 是否已进入关闭流程。
    pub fn is_closing(self) -> bool {
        matches!(self, ConnState::Closing | ConnState::Closed)
    }

    /// 握手尚未完成。
    pub fn is_pre_active(self) -> bool {
        matches!(self, ConnState::Connecting | ConnState::HandshakeStarting)
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 暂停接收的来源。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PauseReason {
    /// 调用方显式 `pause_receive(id, true)`，只能由调用方恢复。
    User,
    /// 缓冲达到上限触发的背压，缓冲被取走后自动恢复。
    Backpressure,
}

/// 引擎服务状态。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ServiceState {
    Starting,
    Started,
    Stopping,
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_is_terminal() {
        for target in [
            ConnState::Connecting,
            ConnState::HandshakeStarting,
            ConnState::Active,
            ConnState::Paused,
            ConnState::Closing,
            ConnState::Closed,
        ] {
            assert!(!ConnState::Closed.can_transition_to(target));
        }
        assert!(ConnState::Closed.is_terminal());
    }

    #[test]
    fn pause_only_from_active() {
        assert!(ConnState::Active.can_transition_to(ConnState::Paused));
        assert!(!ConnState::Connecting.can_transition_to(ConnState::Paused));
        assert!(!ConnState::HandshakeStarting.can_transition_to(ConnState::Paused));
        assert!(ConnState::Paused.can_transition_to(ConnState::Active));
    }

    #[test]
    fn closing_only_leads_to_closed() {
        assert!(ConnState::Closing.can_transition_to(ConnState::Closed));
        assert!(!ConnState::Closing.can_transition_to(ConnState::Active));
    }
}
