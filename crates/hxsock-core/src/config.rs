//! 引擎配置面。
//!
//! # 教案式导览
//! - **意图 (Why)**：池参数、锁策略、PACK 参数等都是启动期决定的结构性配置，
//!   错误的取值必须在引擎构造时被拒绝，而不是在高负载下以随机失败的形式出现；
//! - **逻辑 (How)**：[`EngineConfig`] 派生 serde，支持从 TOML 文本解析
//!   （[`EngineConfig::from_toml_str`]），也支持 `with_*` 构建器链式设置；
//!   [`EngineConfig::validate`] 集中校验字段范围与字段间约束；
//! - **契约 (What)**：所有字段都有默认值，空文档即得到默认配置；未知字段视为错误。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::sync::LockPolicy;

/// PACK 包体长度的硬上限（4 MiB − 1）。
pub const MAX_PACK_SIZE_LIMIT: u32 = 0x3F_FFFF;
/// PACK 包体长度默认上限（256 KiB）。
pub const DEFAULT_MAX_PACK_SIZE: u32 = 0x4_0000;
/// 紧凑包头中标志位可用的最大值（10 bit）。
pub const COMPACT_FLAG_LIMIT: u16 = 0x3FF;
/// 缓冲块默认容量。
pub const DEFAULT_CHUNK_CAPACITY: usize = 4096;
/// 单连接接收缓冲默认上限。
pub const DEFAULT_RECEIVE_LIMIT: usize = 8 * 1024 * 1024;
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// 数据交付模型。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryModel {
    /// 收到即推送给监听器。
    #[default]
    Push,
    /// 仅通知到达字节数，由调用方 `fetch`/`peek`。
    Pull,
    /// 按包头拆包，只交付完整数据包。
    Pack,
}

impl DeliveryModel {
    /// 该模型是否会在连接上保留已解码字节供调用方拉取。
    pub fn retains_bytes(self, pack_delivery: PackDelivery) -> bool {
        match self {
            DeliveryModel::Push => false,
            DeliveryModel::Pull => true,
            DeliveryModel::Pack => pack_delivery == PackDelivery::Pull,
        }
    }
}

/// PACK 模型下完整数据包的交付方式。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackDelivery {
    /// 每个完整包触发一次 `on_receive(bytes)`。
    #[default]
    Push,
    /// 完整包进入就绪队列，每包触发一次 `on_receive_len(len)`。
    Pull,
}

/// PACK 包头布局。
///
/// - `Compact`：4 字节小端字，低 22 位为包体长度，高 10 位为标志；
/// - `Wide`：2 字节小端标志 + 4 字节小端包体长度，标志可取完整 16 位。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderLayout {
    #[default]
    Compact,
    Wide,
}

impl HeaderLayout {
    /// 包头字节数。
    pub const fn header_len(self) -> usize {
        match self {
            HeaderLayout::Compact => 4,
            HeaderLayout::Wide => 6,
        }
    }

    /// 标志位可表示的最大值。
    pub const fn max_flag(self) -> u16 {
        match self {
            HeaderLayout::Compact => COMPACT_FLAG_LIMIT,
            HeaderLayout::Wide => u16::MAX,
        }
    }
}

/// 发送策略。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicy {
    /// 合并排队中的多次发送，一次写出。
    #[default]
    Pack,
    /// 每次写出一条排队的发送，保持发送边界。
    Safe,
    /// 与 `Safe` 相同的边界语义，入队后立即唤醒写路径。
    Direct,
}

/// 接收缓冲超过上限时的处理方式。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 暂停接收，待缓冲被取走后自动恢复。
    #[default]
    Backpressure,
    /// 以 `ReceiveOverflow` 关闭连接。
    Close,
}

/// PACK 参数。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackConfig {
    pub max_pack_size: u32,
    /// 0 表示不校验标志。
    pub header_flag: u16,
    pub layout: HeaderLayout,
    pub delivery: PackDelivery,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            max_pack_size: DEFAULT_MAX_PACK_SIZE,
            header_flag: 0,
            layout: HeaderLayout::default(),
            delivery: PackDelivery::default(),
        }
    }
}

/// 对象池参数。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `pool_size`：启动时预建并常备的对象数；
///   - `hold`：自由链表长度上限，超出部分归还竞技场；必须不小于 `pool_size`；
///   - `lock_time_ms`：对象归还后多久才允许再次出借，用于隔离仍在途的异步完成。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub pool_size: usize,
    pub hold: usize,
    pub lock_time_ms: u64,
}

impl PoolConfig {
    pub const fn new(pool_size: usize, hold: usize, lock_time: Duration) -> Self {
        Self {
            pool_size,
            hold,
            lock_time_ms: lock_time.as_millis() as u64,
        }
    }

    /// 缓冲块池默认值：常备 300，上限 1200，不设冷却期。
    pub const fn buffer_defaults() -> Self {
        Self {
            pool_size: 300,
            hold: 1200,
            lock_time_ms: 0,
        }
    }

    /// 连接记录池默认值：常备 150，上限 600，冷却 10 秒。
    pub const fn connection_defaults() -> Self {
        Self {
            pool_size: 150,
            hold: 600,
            lock_time_ms: 10_000,
        }
    }

    pub const fn lock_time(&self) -> Duration {
        Duration::from_millis(self.lock_time_ms)
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.hold < self.pool_size {
            return Err(ConfigError::invalid(
                field,
                format!(
                    "hold threshold {} is smaller than pool size {}",
                    self.hold, self.pool_size
                ),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::buffer_defaults()
    }
}

fn default_worker_threads() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1);
    cpus * 2 + 2
}

/// 引擎配置。
///
/// # 教案式说明
/// - **意图 (Why)**：汇总交付模型、PACK 参数、两类对象池、发送策略与背压策略，
///   作为 `SocketEngine::new` 的唯一输入；
/// - **逻辑 (How)**：`#[serde(default)]` 使 TOML 中缺省的字段回落到默认值；
///   构建器方法按值消费并返回 `Self`，便于在测试中内联构造；
/// - **契约 (What)**：使用前必须通过 [`validate`](Self::validate)，引擎构造函数会自动调用。
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub delivery: DeliveryModel,
    pub chunk_capacity: usize,
    pub pool_lock: LockPolicy,
    pub worker_threads: usize,
    pub send_policy: SendPolicy,
    pub max_connections: usize,
    pub receive_limit: usize,
    pub overflow_policy: OverflowPolicy,
    pub secure: bool,
    pub mark_silence: bool,
    pub arena_limit: Option<usize>,
    // 表类型字段置于末尾，保证序列化出的 TOML 中标量先于子表。
    pub pack: PackConfig,
    pub buffer_pool: PoolConfig,
    pub connection_pool: PoolConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryModel::default(),
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            pool_lock: LockPolicy::default(),
            worker_threads: default_worker_threads(),
            send_policy: SendPolicy::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            receive_limit: DEFAULT_RECEIVE_LIMIT,
            overflow_policy: OverflowPolicy::default(),
            secure: false,
            mark_silence: true,
            arena_limit: None,
            pack: PackConfig::default(),
            buffer_pool: PoolConfig::buffer_defaults(),
            connection_pool: PoolConfig::connection_defaults(),
        }
    }
}

impl EngineConfig {
    /// 解析 TOML 文本并校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 序列化为 TOML 文本。
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// 校验字段范围与字段间约束；拒绝时以稳定错误码记录一条 `warn` 日志。
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check().inspect_err(|err| {
            warn!(code = err.code(), error = %err, "engine configuration rejected");
        })
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.chunk_capacity == 0 {
            return Err(ConfigError::invalid("chunk_capacity", "must be positive"));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::invalid("worker_threads", "must be positive"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::invalid("max_connections", "must be positive"));
        }
        if self.receive_limit == 0 {
            return Err(ConfigError::invalid("receive_limit", "must be positive"));
        }
        if let Some(limit) = self.arena_limit
            && limit < self.chunk_capacity
        {
            return Err(ConfigError::invalid(
                "arena_limit",
                format!(
                    "arena limit {limit} cannot hold a single chunk of {} bytes",
                    self.chunk_capacity
                ),
            ));
        }
        self.buffer_pool.validate("buffer_pool.hold")?;
        self.connection_pool.validate("connection_pool.hold")?;

        let pack = &self.pack;
        if pack.max_pack_size == 0 || pack.max_pack_size > MAX_PACK_SIZE_LIMIT {
            return Err(ConfigError::invalid(
                "pack.max_pack_size",
                format!(
                    "{} is outside 1..={MAX_PACK_SIZE_LIMIT:#x}",
                    pack.max_pack_size
                ),
            ));
        }
        if pack.header_flag > pack.layout.max_flag() {
            return Err(ConfigError::invalid(
                "pack.header_flag",
                format!(
                    "flag {:#x} does not fit the {:?} header (max {:#x})",
                    pack.header_flag,
                    pack.layout,
                    pack.layout.max_flag()
                ),
            ));
        }
        if self.delivery == DeliveryModel::Pack {
            let frame = pack.layout.header_len() + pack.max_pack_size as usize;
            if self.receive_limit < frame {
                return Err(ConfigError::invalid(
                    "receive_limit",
                    format!(
                        "{} is smaller than the largest frame ({frame} bytes)",
                        self.receive_limit
                    ),
                ));
            }
        }
        Ok(())
    }

    pub fn with_delivery(mut self, delivery: DeliveryModel) -> Self {
        self.delivery = delivery;
        self
    }

    /// 切换到 PACK 模型并设置包体上限与标志。
    pub fn with_pack(mut self, max_pack_size: u32, header_flag: u16) -> Self {
        self.delivery = DeliveryModel::Pack;
        self.pack.max_pack_size = max_pack_size;
        self.pack.header_flag = header_flag;
        self
    }

    pub fn with_header_layout(mut self, layout: HeaderLayout) -> Self {
        self.pack.layout = layout;
        self
    }

    pub fn with_pack_delivery(mut self, delivery: PackDelivery) -> Self {
        self.pack.delivery = delivery;
        self
    }

    pub fn with_chunk_capacity(mut self, capacity: usize) -> Self {
        self.chunk_capacity = capacity;
        self
    }

    pub fn with_buffer_pool(mut self, pool: PoolConfig) -> Self {
        self.buffer_pool = pool;
        self
    }

    pub fn with_connection_pool(mut self, pool: PoolConfig) -> Self {
        self.connection_pool = pool;
        self
    }

    pub fn with_pool_lock(mut self, policy: LockPolicy) -> Self {
        self.pool_lock = policy;
        self
    }

    pub fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers;
        self
    }

    pub fn with_send_policy(mut self, policy: SendPolicy) -> Self {
        self.send_policy = policy;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_receive_limit(mut self, limit: usize) -> Self {
        self.receive_limit = limit;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_mark_silence(mut self, mark: bool) -> Self {
        self.mark_silence = mark;
        self
    }

    pub fn with_arena_limit(mut self, limit: Option<usize>) -> Self {
        self.arena_limit = limit;
        self
    }

    /// 当前配置下连接是否保留可拉取的字节。
    pub fn retains_bytes(&self) -> bool {
        self.delivery.retains_bytes(self.pack.delivery)
    }
}
