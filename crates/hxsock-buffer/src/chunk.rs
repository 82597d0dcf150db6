use std::fmt;

use crate::arena::ArenaBlock;
use crate::error::BufferError;
use crate::pool::Poolable;

/// 定长缓冲块。
///
/// # 教案式说明
/// - **意图 (Why)**：缓冲块是池化复用的最小单位，容量在生命周期内固定，
///   回收时只复位偏移量，不重新申请存储；
/// - **逻辑 (How)**：存储起点（origin）固定为 0，有效窗口为 `[head, cursor)`：
///   - `append` 在 `cursor` 处写入，剩余空间 = `capacity - cursor`；
///   - `consume` 前移 `head`，`shrink` 回退 `cursor`；
///   - 窗口被完全消费时两个偏移一并归零，整块空间重新可写；
/// - **契约 (What)**：任何时刻 `0 <= head <= cursor <= capacity`，`len() == cursor - head`；
///   除 `append`/`peek` 按拷贝字节数计费外，其余操作均为 O(1)。
pub struct BufferChunk {
    block: ArenaBlock,
    head: usize,
    cursor: usize,
}

impl BufferChunk {
    pub fn new(block: ArenaBlock) -> Self {
        Self {
            block,
            head: 0,
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.block.len()
    }

    pub fn len(&self) -> usize {
        self.cursor - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.cursor
    }

    /// 尾部剩余可写空间。
    pub fn remaining(&self) -> usize {
        self.capacity() - self.cursor
    }

    pub fn is_full(&self) -> bool {
        self.cursor == self.capacity()
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// 有效窗口内容。
    pub fn as_slice(&self) -> &[u8] {
        &self.block.as_slice()[self.head..self.cursor]
    }

    /// 整体写入；空间不足时不写入任何字节并返回 `CapacityExceeded`。
    pub fn append(&mut self, data: &[u8]) -> Result<(), BufferError> {
        let remaining = self.remaining();
        if data.len() > remaining {
            return Err(BufferError::CapacityExceeded {
                requested: data.len(),
                remaining,
            });
        }
        self.write_at_cursor(data);
        Ok(())
    }

    /// 尽量写入，返回实际写入的字节数。
    pub fn append_partial(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.remaining());
        self.write_at_cursor(&data[..take]);
        take
    }

    fn write_at_cursor(&mut self, data: &[u8]) {
        let end = self.cursor + data.len();
        self.block.as_mut_slice()[self.cursor..end].copy_from_slice(data);
        self.cursor = end;
    }

    /// 前移 `head`，丢弃窗口前部 `n` 字节。
    pub fn consume(&mut self, n: usize) -> Result<(), BufferError> {
        self.ensure_available(n)?;
        self.head += n;
        if self.head == self.cursor {
            self.head = 0;
            self.cursor = 0;
        }
        Ok(())
    }

    /// 复制窗口前部 `dest.len()` 字节，不移动 `head`。
    pub fn peek(&self, dest: &mut [u8]) -> Result<(), BufferError> {
        self.ensure_available(dest.len())?;
        dest.copy_from_slice(&self.as_slice()[..dest.len()]);
        Ok(())
    }

    /// `peek` 后 `consume`。
    pub fn fetch(&mut self, dest: &mut [u8]) -> Result<(), BufferError> {
        self.peek(dest)?;
        self.consume(dest.len())
    }

    /// 从尾部截去 `n` 字节，用于撤销一次试探性写入。
    pub fn shrink(&mut self, n: usize) -> Result<(), BufferError> {
        self.ensure_available(n)?;
        self.cursor -= n;
        if self.head == self.cursor {
            self.head = 0;
            self.cursor = 0;
        }
        Ok(())
    }

    /// 清空窗口，存储保持不变。
    pub fn reset(&mut self) {
        self.head = 0;
        self.cursor = 0;
    }

    fn ensure_available(&self, requested: usize) -> Result<(), BufferError> {
        let available = self.len();
        if requested > available {
            return Err(BufferError::InsufficientData {
                requested,
                available,
            });
        }
        Ok(())
    }
}

impl Poolable for BufferChunk {
    fn reset(&mut self) {
        BufferChunk::reset(self);
    }
}

impl fmt::Debug for BufferChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferChunk")
            .field("capacity", &self.capacity())
            .field("head", &self.head)
            .field("cursor", &self.cursor)
            .finish()
    }
}
