use std::collections::VecDeque;

use hxsock_core::RawLock;

use crate::chunk::BufferChunk;
use crate::error::BufferError;
use crate::pool::ObjectPool;

/// 一条连接独占的缓冲块序列。
///
/// # 教案式说明
/// - **意图 (Why)**：接收与发送缓冲的长度无法预知，用多个定长块拼接出一条逻辑字节流，
///   既避免大块重分配，也让每个块都能回到池中被其他连接复用；
/// - **逻辑 (How)**：
///   - `append` 先填满尾块，再按需从池中取新块挂到尾部；
///   - `fetch_into`/`skip` 从首块开始消费，块一旦被完全消费立即归还池；
///   - `peek_into` 走相同路径但只读；
///   - `total` 随每次写入/消费增量更新，`total_size` 为 O(1)；
/// - **契约 (What)**：
///   - 所有块有效窗口按序拼接即为尚未消费的字节流；
///   - 调用间隙链中不存在空块；
///   - 链不持有池引用，涉及取块/还块的方法显式接收池参数，同一条链必须始终搭配同一个池。
#[derive(Debug, Default)]
pub struct ChunkChain {
    chunks: VecDeque<BufferChunk>,
    total: usize,
}

impl ChunkChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_size(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// 按顺序遍历各块的有效窗口。
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.chunks.iter().map(BufferChunk::as_slice)
    }

    /// 追加字节；尾块写满后从池中取新块。
    ///
    /// 取块失败时已写入的前缀保留在链中，错误原样返回。
    pub fn append<L: RawLock>(
        &mut self,
        pool: &ObjectPool<BufferChunk, L>,
        mut data: &[u8],
    ) -> Result<(), BufferError> {
        if let Some(tail) = self.chunks.back_mut() {
            let written = tail.append_partial(data);
            self.total += written;
            data = &data[written..];
        }
        while !data.is_empty() {
            let mut chunk = pool.acquire()?;
            let written = chunk.append_partial(data);
            if written == 0 {
                let remaining = chunk.remaining();
                pool.release(chunk);
                return Err(BufferError::CapacityExceeded {
                    requested: data.len(),
                    remaining,
                });
            }
            self.total += written;
            data = &data[written..];
            self.chunks.push_back(chunk);
        }
        Ok(())
    }

    /// 取出 `dest.len()` 字节并归还被耗尽的块；缓冲不足时不做任何修改。
    pub fn fetch_into<L: RawLock>(
        &mut self,
        pool: &ObjectPool<BufferChunk, L>,
        dest: &mut [u8],
    ) -> Result<(), BufferError> {
        self.ensure_buffered(dest.len())?;
        let mut offset = 0;
        while offset < dest.len() {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            let take = front.len().min(dest.len() - offset);
            front.fetch(&mut dest[offset..offset + take])?;
            offset += take;
            self.retire_front_if_drained(pool);
        }
        self.total -= offset;
        Ok(())
    }

    /// 复制前 `dest.len()` 字节，不改变链状态。
    pub fn peek_into(&self, dest: &mut [u8]) -> Result<(), BufferError> {
        self.ensure_buffered(dest.len())?;
        let mut offset = 0;
        for chunk in &self.chunks {
            if offset == dest.len() {
                break;
            }
            let take = chunk.len().min(dest.len() - offset);
            chunk.peek(&mut dest[offset..offset + take])?;
            offset += take;
        }
        Ok(())
    }

    /// 丢弃前 `n` 字节。
    pub fn skip<L: RawLock>(
        &mut self,
        pool: &ObjectPool<BufferChunk, L>,
        n: usize,
    ) -> Result<(), BufferError> {
        self.ensure_buffered(n)?;
        let mut left = n;
        while left > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            let take = front.len().min(left);
            front.consume(take)?;
            left -= take;
            self.retire_front_if_drained(pool);
        }
        self.total -= n - left;
        Ok(())
    }

    /// 把 `other` 的前 `n` 字节移入本链尾部。
    ///
    /// 取块失败后两条链的内容不再保证一致，调用方应放弃这两条链所属的连接。
    pub fn transfer_from<L: RawLock>(
        &mut self,
        pool: &ObjectPool<BufferChunk, L>,
        other: &mut ChunkChain,
        n: usize,
    ) -> Result<(), BufferError> {
        other.ensure_buffered(n)?;
        let mut left = n;
        while left > 0 {
            let Some(front) = other.chunks.front_mut() else {
                break;
            };
            let take = front.len().min(left);
            self.append(pool, &front.as_slice()[..take])?;
            front.consume(take)?;
            other.total -= take;
            left -= take;
            other.retire_front_if_drained(pool);
        }
        Ok(())
    }

    /// 归还全部块。
    pub fn release_all<L: RawLock>(&mut self, pool: &ObjectPool<BufferChunk, L>) {
        for chunk in self.chunks.drain(..) {
            pool.release(chunk);
        }
        self.total = 0;
    }

    fn retire_front_if_drained<L: RawLock>(&mut self, pool: &ObjectPool<BufferChunk, L>) {
        if self.chunks.front().is_some_and(BufferChunk::is_empty)
            && let Some(drained) = self.chunks.pop_front()
        {
            pool.release(drained);
        }
    }

    fn ensure_buffered(&self, requested: usize) -> Result<(), BufferError> {
        if requested > self.total {
            return Err(BufferError::Underrun {
                requested,
                available: self.total,
            });
        }
        Ok(())
    }
}
