//! 图形内存跟踪
//!
//! 记录每帧的临时上传分配（顶点、常量），在帧提交后用该帧的 fence 标记，
//! GPU 完成后回收。帧周期在每次呈现之后调用一次 [`GraphicsMemory::commit`]。

use std::collections::VecDeque;

use tracing::trace;

use super::sync::FenceValue;

/// 一帧提交的临时分配
#[derive(Debug, Clone, Copy)]
struct FencedBlock {
    fence: FenceValue,
    bytes: u64,
    allocations: u32,
}

/// 内存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// 仍在 GPU 上使用的字节数
    pub bytes_in_flight: u64,
    /// 当前帧尚未提交的字节数
    pub bytes_pending: u64,
    /// 历史峰值
    pub peak_bytes: u64,
    /// 累计回收的字节数
    pub bytes_retired: u64,
}

/// 图形内存跟踪器
#[derive(Debug, Default)]
pub struct GraphicsMemory {
    pending_bytes: u64,
    pending_allocations: u32,
    in_flight: VecDeque<FencedBlock>,
    stats: MemoryStats,
}

impl GraphicsMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录当前帧的一次临时分配
    pub fn allocate(&mut self, bytes: u64) {
        self.pending_bytes += bytes;
        self.pending_allocations += 1;
        self.stats.bytes_pending = self.pending_bytes;
        self.update_peak();
    }

    /// 用 `fence` 标记当前帧的分配，并回收 `completed` 之前的分配
    pub fn commit(&mut self, fence: FenceValue, completed: FenceValue) {
        if self.pending_allocations > 0 {
            self.in_flight.push_back(FencedBlock {
                fence,
                bytes: self.pending_bytes,
                allocations: self.pending_allocations,
            });
            self.pending_bytes = 0;
            self.pending_allocations = 0;
        }

        while let Some(front) = self.in_flight.front() {
            if front.fence > completed {
                break;
            }
            trace!(fence = %front.fence, bytes = front.bytes, allocations = front.allocations, "Retired transient memory");
            self.stats.bytes_retired += front.bytes;
            self.in_flight.pop_front();
        }

        self.stats.bytes_pending = 0;
        self.stats.bytes_in_flight = self.in_flight.iter().map(|b| b.bytes).sum();
    }

    /// 丢弃全部记录（设备丢失）
    pub fn release(&mut self) {
        self.pending_bytes = 0;
        self.pending_allocations = 0;
        self.in_flight.clear();
        self.stats.bytes_pending = 0;
        self.stats.bytes_in_flight = 0;
    }

    pub fn stats(&self) -> MemoryStats {
        self.stats
    }

    fn update_peak(&mut self) {
        let total = self.pending_bytes + self.in_flight.iter().map(|b| b.bytes).sum::<u64>();
        self.stats.peak_bytes = self.stats.peak_bytes.max(total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_retires_completed_blocks() {
        let mut memory = GraphicsMemory::new();

        memory.allocate(256);
        memory.allocate(256);
        memory.commit(FenceValue::new(1), FenceValue::ZERO);
        assert_eq!(memory.stats().bytes_in_flight, 512);

        memory.allocate(100);
        memory.commit(FenceValue::new(2), FenceValue::new(1));
        assert_eq!(memory.stats().bytes_in_flight, 100);
        assert_eq!(memory.stats().bytes_retired, 512);
        assert_eq!(memory.stats().peak_bytes, 612);
    }

    #[test]
    fn test_empty_frame_commit() {
        let mut memory = GraphicsMemory::new();
        memory.commit(FenceValue::new(1), FenceValue::new(1));
        assert_eq!(memory.stats(), MemoryStats::default());
    }

    #[test]
    fn test_release() {
        let mut memory = GraphicsMemory::new();
        memory.allocate(64);
        memory.commit(FenceValue::new(1), FenceValue::ZERO);
        memory.allocate(64);

        memory.release();
        assert_eq!(memory.stats().bytes_in_flight, 0);
        assert_eq!(memory.stats().bytes_pending, 0);
    }
}
