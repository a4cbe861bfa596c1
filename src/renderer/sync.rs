//! GPU 同步机制模块
//!
//! 提供 CPU 与 GPU 之间的 fence 同步原语。
//!
//! # 设计原则
//!
//! - **单调递增**：每次提交 signal 一个新的 fence 值，GPU 按提交顺序完成
//! - **后端无关**：等待操作通过 [`GpuTimeline`] 交给具体后端实现
//! - **只在加载和环形槽复用时阻塞**：稳态渲染中其他路径只读取已完成值

use crate::core::error::Result;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fence 值
///
/// 单调递增的提交计数，0 表示"从未提交"，总是视为已完成。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 从未 signal 过的初始值
    pub const ZERO: FenceValue = FenceValue(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 下一个Fence值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for FenceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// GPU 时间线
///
/// 由后端实现：报告 GPU 已完成的最大 fence 值，并提供阻塞等待。
pub trait GpuTimeline {
    /// GPU 已完成的最大 fence 值
    fn completed_value(&self) -> FenceValue;

    /// 阻塞调用线程直到 `value` 已完成
    ///
    /// 设备丢失时返回 `GraphicsError::DeviceLost`。
    fn wait_for_value(&self, value: FenceValue) -> Result<()>;

    /// 检查特定Fence值是否已完成
    fn is_completed(&self, value: FenceValue) -> bool {
        self.completed_value() >= value
    }
}

/// Fence 管理器
///
/// 负责分配单调递增的 fence 值（CPU 侧），完成情况由 [`GpuTimeline`] 报告。
///
/// ```
/// use emte::renderer::sync::FenceManager;
///
/// let fences = FenceManager::new();
/// let first = fences.next_value();
/// let second = fences.next_value();
/// assert!(first < second);
/// assert_eq!(fences.current_value(), second);
/// ```
#[derive(Debug, Default)]
pub struct FenceManager {
    /// 最近一次分配的 fence 值
    current_value: AtomicU64,
}

impl FenceManager {
    pub fn new() -> Self {
        Self {
            current_value: AtomicU64::new(0),
        }
    }

    /// 从已有的值继续计数（重建后沿用后端时间线）
    pub fn starting_at(value: FenceValue) -> Self {
        Self {
            current_value: AtomicU64::new(value.value()),
        }
    }

    /// 最近一次分配的Fence值
    pub fn current_value(&self) -> FenceValue {
        FenceValue::new(self.current_value.load(Ordering::Acquire))
    }

    /// 获取下一个Fence值并递增计数器
    pub fn next_value(&self) -> FenceValue {
        let value = self.current_value.fetch_add(1, Ordering::AcqRel);
        FenceValue::new(value + 1)
    }

    /// 等待所有已分配的 fence 完成
    pub fn flush<T: GpuTimeline + ?Sized>(&self, timeline: &T) -> Result<()> {
        let current = self.current_value();
        if timeline.is_completed(current) {
            return Ok(());
        }
        timeline.wait_for_value(current)
    }

    /// 重置计数器
    pub fn reset(&self) {
        self.current_value.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct ImmediateTimeline {
        completed: Cell<u64>,
        waits: Cell<u32>,
    }

    impl GpuTimeline for ImmediateTimeline {
        fn completed_value(&self) -> FenceValue {
            FenceValue::new(self.completed.get())
        }

        fn wait_for_value(&self, value: FenceValue) -> Result<()> {
            self.waits.set(self.waits.get() + 1);
            self.completed.set(self.completed.get().max(value.value()));
            Ok(())
        }
    }

    #[test]
    fn test_fence_value() {
        let fence = FenceValue::new(1);
        assert_eq!(fence.next().value(), 2);
        assert_eq!(fence.value(), 1);
        assert!(FenceValue::ZERO < fence);
    }

    #[test]
    fn test_fence_manager() {
        let manager = FenceManager::new();
        assert_eq!(manager.current_value(), FenceValue::ZERO);

        let v1 = manager.next_value();
        let v2 = manager.next_value();
        assert_eq!(v1.value(), 1);
        assert_eq!(v2.value(), 2);
        assert_eq!(manager.current_value(), v2);

        manager.reset();
        assert_eq!(manager.current_value(), FenceValue::ZERO);

        let resumed = FenceManager::starting_at(FenceValue::new(41));
        assert_eq!(resumed.next_value().value(), 42);
    }

    #[test]
    fn test_flush_waits_only_when_needed() {
        let timeline = ImmediateTimeline {
            completed: Cell::new(0),
            waits: Cell::new(0),
        };
        let manager = FenceManager::new();

        manager.flush(&timeline).unwrap();
        assert_eq!(timeline.waits.get(), 0);

        manager.next_value();
        manager.next_value();
        manager.flush(&timeline).unwrap();
        assert_eq!(timeline.waits.get(), 1);
        assert!(timeline.is_completed(FenceValue::new(2)));
    }
}
