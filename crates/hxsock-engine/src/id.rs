use core::fmt;

/// 连接标识。
///
/// 由引擎按单调递增分配且永不复用：连接记录被回收并分配给新连接后，新连接获得新标识，
/// 持有旧标识的调用方只会得到 `InvalidConnection`，不会误操作新连接。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ConnId(u64);

impl ConnId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}
