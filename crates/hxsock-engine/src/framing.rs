//! PACK 拆包。
//!
//! # 教案式导览
//! - **意图 (Why)**：TCP 只保证字节流有序，不保留消息边界；PACK 模型在每个数据包前加固定宽度包头，
//!   引擎据此把任意碎片化的字节流还原为完整数据包；
//! - **逻辑 (How)**：
//!   - [`PackHeader`] 负责两种包头布局的编解码；
//!   - [`FramingPolicy`] 持有包体上限、期望标志与布局，负责校验与构造发送包头；
//!   - [`Framer`] 是每连接一个的拆包器：包头字节齐全后先校验标志、再校验长度，
//!     通过后立即从链上剥离包头并记住包体长度，后续事件只需比较链长即可；
//! - **契约 (What)**：
//!   - 违例（`BadHeader` / `PacketTooLarge`）在交付任何包体字节之前报告；
//!   - 声明长度为 0 的包合法，交付空负载；
//!   - 拆包器只在 `poll` 返回 `Ready` 时把包体留在链首，由调用方决定复制交付还是转移到就绪队列。

use hxsock_buffer::{BufferChunk, BufferError, ChunkChain, ObjectPool};
use hxsock_core::config::{COMPACT_FLAG_LIMIT, MAX_PACK_SIZE_LIMIT};
use hxsock_core::error::codes;
use hxsock_core::{CloseCode, HeaderLayout, PackConfig, RawLock};
use thiserror::Error;

/// 紧凑布局中长度字段所占位数。
const COMPACT_LEN_BITS: u32 = 22;
const COMPACT_LEN_MASK: u32 = (1 << COMPACT_LEN_BITS) - 1;
/// 最宽包头的字节数。
pub const MAX_HEADER_LEN: usize = 6;

/// 拆包错误。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum FrameError {
    #[error("bad pack header: expected flag {expected:#x}, found {found:#x}")]
    BadHeader { expected: u16, found: u16 },
    #[error("packet too large: declared {declared} bytes, limit {max}")]
    PacketTooLarge { declared: usize, max: u32 },
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

impl FrameError {
    pub fn code(&self) -> &'static str {
        match self {
            FrameError::BadHeader { .. } => codes::FRAME_BAD_HEADER,
            FrameError::PacketTooLarge { .. } => codes::FRAME_PACKET_TOO_LARGE,
            FrameError::Buffer(err) => err.code(),
        }
    }

    /// 对应的连接关闭原因。
    pub fn close_code(&self) -> CloseCode {
        match self {
            FrameError::BadHeader { .. } => CloseCode::BadHeader,
            FrameError::PacketTooLarge { .. } => CloseCode::PacketTooLarge,
            FrameError::Buffer(_) => CloseCode::ResourceExhausted,
        }
    }
}

/// 包头。
///
/// - `Compact`：4 字节小端字，`flag << 22 | len`，标志 10 位、长度 22 位；
/// - `Wide`：2 字节小端标志后跟 4 字节小端长度。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PackHeader {
    pub flag: u16,
    pub len: u32,
}

impl PackHeader {
    pub const fn new(flag: u16, len: u32) -> Self {
        Self { flag, len }
    }

    /// 编码到 `out` 前部，返回写入字节数。`out` 至少需要 [`MAX_HEADER_LEN`] 字节。
    pub fn encode(&self, layout: HeaderLayout, out: &mut [u8; MAX_HEADER_LEN]) -> usize {
        match layout {
            HeaderLayout::Compact => {
                let word = (u32::from(self.flag & COMPACT_FLAG_LIMIT) << COMPACT_LEN_BITS)
                    | (self.len & COMPACT_LEN_MASK);
                out[..4].copy_from_slice(&word.to_le_bytes());
                4
            }
            HeaderLayout::Wide => {
                out[..2].copy_from_slice(&self.flag.to_le_bytes());
                out[2..6].copy_from_slice(&self.len.to_le_bytes());
                6
            }
        }
    }

    /// 从 `raw` 解码；`raw` 长度必须等于布局的包头长度。
    pub fn decode(layout: HeaderLayout, raw: &[u8; MAX_HEADER_LEN]) -> Self {
        match layout {
            HeaderLayout::Compact => {
                let word = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                Self {
                    flag: (word >> COMPACT_LEN_BITS) as u16,
                    len: word & COMPACT_LEN_MASK,
                }
            }
            HeaderLayout::Wide => Self {
                flag: u16::from_le_bytes([raw[0], raw[1]]),
                len: u32::from_le_bytes([raw[2], raw[3], raw[4], raw[5]]),
            },
        }
    }
}

/// 拆包参数。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FramingPolicy {
    layout: HeaderLayout,
    max_pack_size: u32,
    header_flag: u16,
}

impl FramingPolicy {
    pub fn new(layout: HeaderLayout, max_pack_size: u32, header_flag: u16) -> Self {
        Self {
            layout,
            max_pack_size: max_pack_size.min(MAX_PACK_SIZE_LIMIT),
            header_flag,
        }
    }

    pub fn from_config(pack: &PackConfig) -> Self {
        Self::new(pack.layout, pack.max_pack_size, pack.header_flag)
    }

    pub fn layout(&self) -> HeaderLayout {
        self.layout
    }

    pub fn header_len(&self) -> usize {
        self.layout.header_len()
    }

    pub fn max_pack_size(&self) -> u32 {
        self.max_pack_size
    }

    pub fn header_flag(&self) -> u16 {
        self.header_flag
    }

    /// 校验收到的包头：先比对标志（为 0 时跳过），再比对长度。
    pub fn validate(&self, header: &PackHeader) -> Result<(), FrameError> {
        if self.header_flag != 0 && header.flag != self.header_flag {
            return Err(FrameError::BadHeader {
                expected: self.header_flag,
                found: header.flag,
            });
        }
        if header.len > self.max_pack_size {
            return Err(FrameError::PacketTooLarge {
                declared: header.len as usize,
                max: self.max_pack_size,
            });
        }
        Ok(())
    }

    /// 为长度 `len` 的待发送包体构造包头。
    pub fn header_for(&self, len: usize) -> Result<PackHeader, FrameError> {
        match u32::try_from(len) {
            Ok(len32) if len32 <= self.max_pack_size => Ok(PackHeader::new(self.header_flag, len32)),
            _ => Err(FrameError::PacketTooLarge {
                declared: len,
                max: self.max_pack_size,
            }),
        }
    }
}

/// 一次 `poll` 的结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameStep {
    /// 链首已有一个完整包体（包头已剥离）。
    Ready { body_len: usize },
    /// 还需更多字节：`buffered` 为链中现有字节，`required` 为当前阶段所需字节。
    NeedMore { buffered: usize, required: usize },
}

/// 逐连接拆包器。
#[derive(Clone, Debug)]
pub struct Framer {
    policy: FramingPolicy,
    pending_body: Option<usize>,
}

impl Framer {
    pub fn new(policy: FramingPolicy) -> Self {
        Self {
            policy,
            pending_body: None,
        }
    }

    pub fn policy(&self) -> &FramingPolicy {
        &self.policy
    }

    /// 已解析包头、仍在等待包体的长度。
    pub fn pending_body(&self) -> Option<usize> {
        self.pending_body
    }

    pub fn reset(&mut self) {
        self.pending_body = None;
    }

    /// 检查链首能否凑出一个完整包。
    pub fn poll<L: RawLock>(
        &mut self,
        chain: &mut ChunkChain,
        pool: &ObjectPool<BufferChunk, L>,
    ) -> Result<FrameStep, FrameError> {
        let body_len = match self.pending_body {
            Some(len) => len,
            None => {
                let header_len = self.policy.header_len();
                if chain.total_size() < header_len {
                    return Ok(FrameStep::NeedMore {
                        buffered: chain.total_size(),
                        required: header_len,
                    });
                }
                let mut raw = [0u8; MAX_HEADER_LEN];
                chain.peek_into(&mut raw[..header_len])?;
                let header = PackHeader::decode(self.policy.layout, &raw);
                self.policy.validate(&header)?;
                chain.skip(pool, header_len)?;
                let len = header.len as usize;
                self.pending_body = Some(len);
                len
            }
        };
        if chain.total_size() < body_len {
            return Ok(FrameStep::NeedMore {
                buffered: chain.total_size(),
                required: body_len,
            });
        }
        self.pending_body = None;
        Ok(FrameStep::Ready { body_len })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hxsock_buffer::{Arena, ChunkPool};
    use hxsock_core::PoolConfig;
    use hxsock_core::sync::SpinLock;

    use super::*;

    fn pool() -> ChunkPool {
        ChunkPool::for_chunks(
            Arena::unbounded(),
            16,
            PoolConfig::new(0, 8, Duration::ZERO),
            SpinLock::new(),
        )
    }

    fn frame(policy: &FramingPolicy, flag: u16, body: &[u8]) -> Vec<u8> {
        let mut raw = [0u8; MAX_HEADER_LEN];
        let n = PackHeader::new(flag, body.len() as u32).encode(policy.layout(), &mut raw);
        let mut out = raw[..n].to_vec();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn compact_header_packs_flag_into_high_bits() {
        let mut raw = [0u8; MAX_HEADER_LEN];
        let header = PackHeader::new(0x155, 0x3F_FFFF);
        assert_eq!(header.encode(HeaderLayout::Compact, &mut raw), 4);
        let word = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        assert_eq!(word, (0x155 << 22) | 0x3F_FFFF);
        assert_eq!(PackHeader::decode(HeaderLayout::Compact, &raw), header);
    }

    #[test]
    fn wide_header_carries_sixteen_bit_flag() {
        let mut raw = [0u8; MAX_HEADER_LEN];
        let header = PackHeader::new(0x1A2B, 2000);
        assert_eq!(header.encode(HeaderLayout::Wide, &mut raw), 6);
        assert_eq!(&raw[..2], &[0x2B, 0x1A]);
        assert_eq!(PackHeader::decode(HeaderLayout::Wide, &raw), header);
    }

    #[test]
    fn fragmented_frame_completes_after_body_arrives() {
        let pool = pool();
        let policy = FramingPolicy::new(HeaderLayout::Compact, 64, 0x2A);
        let mut framer = Framer::new(policy);
        let mut chain = ChunkChain::new();
        let bytes = frame(&policy, 0x2A, b"fragmented payload");

        chain.append(&pool, &bytes[..3]).expect("追加失败");
        assert_eq!(
            framer.poll(&mut chain, &pool).expect("拆包失败"),
            FrameStep::NeedMore {
                buffered: 3,
                required: 4
            }
        );
        chain.append(&pool, &bytes[3..10]).expect("追加失败");
        assert!(matches!(
            framer.poll(&mut chain, &pool),
            Ok(FrameStep::NeedMore { required: 18, .. })
        ));
        assert_eq!(framer.pending_body(), Some(18));
        chain.append(&pool, &bytes[10..]).expect("追加失败");
        assert_eq!(
            framer.poll(&mut chain, &pool).expect("拆包失败"),
            FrameStep::Ready { body_len: 18 }
        );
        let mut body = vec![0u8; 18];
        chain.fetch_into(&pool, &mut body).expect("取数失败");
        assert_eq!(body, b"fragmented payload");
    }

    #[test]
    fn flag_is_checked_before_length() {
        let pool = pool();
        let policy = FramingPolicy::new(HeaderLayout::Wide, 8, 0x1A2B);
        let mut framer = Framer::new(policy);
        let mut chain = ChunkChain::new();
        let mut raw = [0u8; MAX_HEADER_LEN];
        PackHeader::new(0x0001, 2000).encode(HeaderLayout::Wide, &mut raw);
        chain.append(&pool, &raw).expect("追加失败");
        assert_eq!(
            framer.poll(&mut chain, &pool),
            Err(FrameError::BadHeader {
                expected: 0x1A2B,
                found: 0x0001
            })
        );
    }

    #[test]
    fn zero_flag_disables_validation_and_zero_length_is_valid() {
        let pool = pool();
        let policy = FramingPolicy::new(HeaderLayout::Compact, 8, 0);
        let mut framer = Framer::new(policy);
        let mut chain = ChunkChain::new();
        chain
            .append(&pool, &frame(&policy, 0x3FF, b""))
            .expect("追加失败");
        assert_eq!(
            framer.poll(&mut chain, &pool).expect("拆包失败"),
            FrameStep::Ready { body_len: 0 }
        );
        assert!(chain.is_empty());
    }

    #[test]
    fn outbound_header_rejects_oversized_body() {
        let policy = FramingPolicy::new(HeaderLayout::Compact, 16, 0);
        assert!(policy.header_for(16).is_ok());
        assert_eq!(
            policy.header_for(17),
            Err(FrameError::PacketTooLarge {
                declared: 17,
                max: 16
            })
        );
    }
}
