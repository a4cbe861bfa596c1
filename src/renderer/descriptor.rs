//! 描述符管理模块
//!
//! 纹理注册表从一段预留的、着色器可见的描述符区间中按顺序分配槽位。
//!
//! # 设计原则
//!
//! - **有界**：区间在创建时确定，`[base, base + capacity)`
//! - **单调分配**：槽位按递增顺序发放，句柄存活期间从不复用
//! - **整体释放**：只在设备丢失 / 关闭时通过 `release()` 一次性归还
//!
//! 帧周期只读取槽位（绑定时使用），从不分配或释放。

use crate::core::error::{GraphicsError, Result};

/// 描述符槽位
///
/// 描述符表中的稳定索引，在纹理的整个生命周期内不变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DescriptorSlot(u32);

impl DescriptorSlot {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// 描述符表中的绝对索引
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DescriptorSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 预留的描述符区间
#[derive(Debug)]
pub struct DescriptorRange {
    base: u32,
    capacity: u32,
    /// 下一个待分配的相对偏移
    next: u32,
}

impl DescriptorRange {
    /// 创建新的描述符区间
    ///
    /// # 参数
    ///
    /// * `base` - 区间在描述符表中的起始索引
    /// * `capacity` - 区间内的槽位数量
    pub fn new(base: u32, capacity: u32) -> Self {
        Self {
            base,
            capacity,
            next: 0,
        }
    }

    /// 分配下一个槽位
    ///
    /// 区间耗尽时返回 `GraphicsError::ResourceCreation`。
    pub fn allocate(&mut self) -> Result<DescriptorSlot> {
        if self.next >= self.capacity {
            return Err(GraphicsError::ResourceCreation(format!(
                "Descriptor range out of budget: {}/{} slots in use",
                self.next, self.capacity
            ))
            .into());
        }

        let slot = DescriptorSlot(self.base + self.next);
        self.next += 1;
        Ok(slot)
    }

    /// 撤销最近一次分配（该槽位上的资源创建失败）
    ///
    /// 只有最后分配的槽位可以撤销，其他槽位返回 `false`。
    pub fn rollback(&mut self, slot: DescriptorSlot) -> bool {
        if self.next > 0 && slot.0 == self.base + self.next - 1 {
            self.next -= 1;
            true
        } else {
            false
        }
    }

    /// 撤销 `count` 之后分配的所有槽位（整个上传批次失败）
    pub fn truncate(&mut self, count: u32) {
        self.next = self.next.min(count);
    }

    /// 归还全部槽位
    pub fn release(&mut self) {
        self.next = 0;
    }

    /// 槽位是否属于本区间且已分配
    pub fn contains(&self, slot: DescriptorSlot) -> bool {
        slot.0 >= self.base && slot.0 < self.base + self.next
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// 已分配数量
    pub fn allocated_count(&self) -> u32 {
        self.next
    }

    /// 是否已满
    pub fn is_full(&self) -> bool {
        self.next >= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_allocation() {
        let mut range = DescriptorRange::new(4, 3);

        let a = range.allocate().unwrap();
        let b = range.allocate().unwrap();
        let c = range.allocate().unwrap();

        assert_eq!((a.index(), b.index(), c.index()), (4, 5, 6));
        assert!(range.is_full());
        assert!(range.contains(b));
        assert!(!range.contains(DescriptorSlot::new(3)));
    }

    #[test]
    fn test_exhaustion_is_resource_creation_error() {
        let mut range = DescriptorRange::new(0, 1);
        range.allocate().unwrap();

        let err = range.allocate().unwrap_err();
        assert!(err.is_resource_creation());
    }

    #[test]
    fn test_rollback_only_last_slot() {
        let mut range = DescriptorRange::new(0, 4);
        let a = range.allocate().unwrap();
        let b = range.allocate().unwrap();

        assert!(!range.rollback(a));
        assert!(range.rollback(b));
        assert_eq!(range.allocated_count(), 1);

        // 撤销后重新分配得到同一个槽位
        assert_eq!(range.allocate().unwrap(), b);
    }

    #[test]
    fn test_release_returns_all_slots() {
        let mut range = DescriptorRange::new(0, 2);
        range.allocate().unwrap();
        range.allocate().unwrap();

        range.release();
        assert_eq!(range.allocated_count(), 0);
        assert_eq!(range.allocate().unwrap().index(), 0);
    }
}
