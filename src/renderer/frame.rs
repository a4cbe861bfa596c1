//! 帧周期控制器
//!
//! 每帧按固定顺序记录 GPU 命令、提交、呈现，并用一个固定大小的环跟踪在途的帧。
//!
//! # 设计原则
//!
//! - **环形复用**：第 `i` 帧使用槽位 `i % R`，命令缓冲和 fence 在帧之间复用
//! - **唯一的背压**：第 `i` 帧开始记录前，必须确认第 `i - R` 帧的 fence 已完成
//! - **惰性回收**：`Submitted → Idle` 只在槽位再次被选中时识别
//! - **依赖注入**：GPU 队列和内存跟踪器在构造时传入
//!
//! 槽位状态：`Idle → Recording → Submitted → Idle`

use tracing::{debug, error, trace, warn};

use super::memory::GraphicsMemory;
use super::pass::{FramePass, FrameRecorder, FrameTargets};
use super::sync::{FenceManager, FenceValue, GpuTimeline};
use crate::core::error::{GraphicsError, Result};

/// GPU 命令队列
///
/// 由图形后端实现，提供命令缓冲、提交和呈现。
pub trait GpuQueue: GpuTimeline {
    /// 后端的命令缓冲（一帧的全部命令）
    type Commands;

    /// 为环形槽位 `slot` 开始一个命令缓冲
    ///
    /// 调用时该槽位上一次提交的工作已确认完成，后端可以复用其分配器。
    fn begin_commands(&mut self, slot: usize) -> Result<Self::Commands>;

    /// 提交命令缓冲，完成后 signal `signal`
    ///
    /// `passes` 是这一帧按顺序记录的 pass。设备丢失时返回 `GraphicsError::DeviceLost`。
    fn submit(&mut self, commands: Self::Commands, passes: &[FramePass], signal: FenceValue) -> Result<()>;

    /// 呈现交换链后备缓冲
    fn present(&mut self) -> Result<()>;
}

/// 环形槽位的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// 可以开始记录
    Idle,
    /// CPU 正在记录
    Recording,
    /// 已提交，GPU 可能仍在执行
    Submitted,
}

/// 环形槽位
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot {
    pub state: SlotState,
    /// 最近一次提交 signal 的 fence 值
    pub fence: FenceValue,
}

impl FrameSlot {
    fn idle() -> Self {
        Self {
            state: SlotState::Idle,
            fence: FenceValue::ZERO,
        }
    }
}

/// 帧统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// 已提交的帧数
    pub frames_submitted: u64,
    /// 最近一次 signal 的 fence
    pub last_signaled: FenceValue,
    /// 最近观察到的已完成 fence
    pub last_completed: FenceValue,
    /// `begin_frame` 因槽位未完成而阻塞的次数
    pub ring_waits: u64,
}

/// 正在记录的一帧
///
/// 由 [`FrameCycle::begin_frame`] 创建，交给 [`FrameCycle::submit`] 消费。
#[derive(Debug)]
pub struct ActiveFrame<C> {
    number: u64,
    slot: usize,
    recorder: FrameRecorder,
    commands: C,
}

impl<C> ActiveFrame<C> {
    /// 帧号（从 0 开始）
    pub fn number(&self) -> u64 {
        self.number
    }

    /// 环形槽位
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn targets(&self) -> FrameTargets {
        self.recorder.targets()
    }

    /// 已记录的 pass
    pub fn recorded(&self) -> &[FramePass] {
        self.recorder.recorded()
    }
}

/// 帧周期控制器
pub struct FrameCycle<Q: GpuQueue> {
    queue: Q,
    slots: Vec<FrameSlot>,
    fences: FenceManager,
    memory: GraphicsMemory,
    targets: FrameTargets,
    frame_number: u64,
    recording: bool,
    device_lost: bool,
    stats: FrameStats,
}

impl<Q: GpuQueue> FrameCycle<Q> {
    /// 创建帧周期控制器
    ///
    /// # 参数
    ///
    /// * `queue` - GPU 命令队列
    /// * `memory` - 图形内存跟踪器，每帧呈现后 commit 一次
    /// * `ring_size` - 在途帧数，至少为 2
    /// * `targets` - 渲染目标配置
    pub fn new(queue: Q, memory: GraphicsMemory, ring_size: usize, targets: FrameTargets) -> Result<Self> {
        if ring_size < 2 {
            return Err(GraphicsError::ResourceCreation(format!(
                "Frame ring needs at least 2 slots, got {}",
                ring_size
            ))
            .into());
        }

        // 沿用队列已有的时间线，新 fence 不会被误判为已完成
        let fences = FenceManager::starting_at(queue.completed_value());

        debug!(ring_size, msaa = targets.msaa_samples, offscreen = targets.offscreen, "Frame cycle created");

        Ok(Self {
            queue,
            slots: vec![FrameSlot::idle(); ring_size],
            fences,
            memory,
            targets,
            frame_number: 0,
            recording: false,
            device_lost: false,
            stats: FrameStats::default(),
        })
    }

    /// 开始一帧
    ///
    /// 选择槽位 `frame_number % R`；如果该槽位上一次提交的工作尚未完成，
    /// 阻塞等待其 fence。这是稳态渲染中唯一的阻塞点。
    pub fn begin_frame(&mut self) -> Result<ActiveFrame<Q::Commands>> {
        if self.device_lost {
            return Err(GraphicsError::DeviceLost("frame cycle must be released and rebuilt".to_string()).into());
        }
        if self.recording {
            return Err(GraphicsError::CommandExecution(format!(
                "frame {} is still recording",
                self.frame_number
            ))
            .into());
        }

        let index = (self.frame_number % self.slots.len() as u64) as usize;
        let slot = self.slots[index];

        if slot.state == SlotState::Submitted {
            if !self.queue.is_completed(slot.fence) {
                self.stats.ring_waits += 1;
                trace!(frame = self.frame_number, slot = index, fence = %slot.fence, "Waiting for ring slot");
                if let Err(e) = self.queue.wait_for_value(slot.fence) {
                    self.note_error(&e);
                    return Err(e);
                }
            }
            self.slots[index].state = SlotState::Idle;
        }

        let commands = match self.queue.begin_commands(index) {
            Ok(commands) => commands,
            Err(e) => {
                self.note_error(&e);
                return Err(e);
            }
        };

        self.slots[index].state = SlotState::Recording;
        self.recording = true;

        Ok(ActiveFrame {
            number: self.frame_number,
            slot: index,
            recorder: FrameRecorder::new(self.targets),
            commands,
        })
    }

    /// 在 `frame` 中记录一个 pass
    ///
    /// 顺序不对的 pass 被拒绝，`f` 不会执行。
    pub fn record<T, F>(&self, frame: &mut ActiveFrame<Q::Commands>, pass: FramePass, f: F) -> Result<T>
    where
        F: FnOnce(&mut Q::Commands) -> T,
    {
        frame.recorder.begin_pass(pass)?;
        trace!(frame = frame.number, pass = pass.name(), "Recording pass");
        Ok(f(&mut frame.commands))
    }

    /// 提交一帧并呈现
    ///
    /// 提交命令缓冲、signal 新的 fence、呈现，然后 commit 图形内存。
    ///
    /// # 返回值
    ///
    /// 本帧 signal 的 fence 值
    pub fn submit(&mut self, frame: ActiveFrame<Q::Commands>) -> Result<FenceValue> {
        let ActiveFrame {
            number,
            slot,
            recorder,
            commands,
        } = frame;
        self.recording = false;

        let passes = match recorder.finish() {
            Ok(passes) => passes,
            Err(e) => {
                self.slots[slot].state = SlotState::Idle;
                return Err(e);
            }
        };

        let fence = self.fences.next_value();
        if let Err(e) = self.queue.submit(commands, &passes, fence) {
            self.slots[slot].state = SlotState::Idle;
            self.note_error(&e);
            return Err(e);
        }

        self.slots[slot] = FrameSlot {
            state: SlotState::Submitted,
            fence,
        };
        self.frame_number = number + 1;
        self.stats.frames_submitted += 1;
        self.stats.last_signaled = fence;

        if let Err(e) = self.queue.present() {
            self.note_error(&e);
            return Err(e);
        }

        let completed = self.queue.completed_value();
        self.stats.last_completed = completed;
        self.memory.commit(fence, completed);

        Ok(fence)
    }

    /// 放弃一帧，不提交
    pub fn abandon(&mut self, frame: ActiveFrame<Q::Commands>) {
        warn!(frame = frame.number, "Abandoning frame without submitting");
        self.slots[frame.slot].state = SlotState::Idle;
        self.recording = false;
    }

    /// 等待所有在途的帧完成（关闭、改变大小）
    pub fn wait_for_gpu(&mut self) -> Result<()> {
        if self.device_lost {
            return Ok(());
        }
        if let Err(e) = self.fences.flush(&self.queue) {
            self.note_error(&e);
            return Err(e);
        }
        for slot in &mut self.slots {
            if slot.state == SlotState::Submitted {
                slot.state = SlotState::Idle;
            }
        }
        self.stats.last_completed = self.queue.completed_value();
        Ok(())
    }

    /// 丢弃所有环形槽位状态和在途 fence（设备丢失）
    ///
    /// 丢失前在途的帧不可恢复。帧号和统计一并清零，fence 从当前完成值继续。
    pub fn release(&mut self) {
        debug!(frame = self.frame_number, "Releasing frame cycle");
        for slot in &mut self.slots {
            *slot = FrameSlot::idle();
        }
        let completed = self.queue.completed_value();
        self.fences = FenceManager::starting_at(completed);
        self.frame_number = 0;
        self.stats = FrameStats {
            last_signaled: completed,
            last_completed: completed,
            ..FrameStats::default()
        };
        self.memory.release();
        self.recording = false;
        self.device_lost = false;
    }

    /// 更换渲染目标配置，调用前应先 `wait_for_gpu`
    pub fn set_targets(&mut self, targets: FrameTargets) {
        self.targets = targets;
    }

    pub fn targets(&self) -> FrameTargets {
        self.targets
    }

    /// 下一帧的帧号
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn ring_size(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    pub fn memory(&self) -> &GraphicsMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut GraphicsMemory {
        &mut self.memory
    }

    fn note_error(&mut self, error: &crate::core::error::EmteError) {
        if error.is_device_lost() {
            error!(frame = self.frame_number, error = %error, "GPU device lost");
            self.device_lost = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::HeadlessQueue;

    fn cycle(ring: usize, targets: FrameTargets) -> FrameCycle<HeadlessQueue> {
        FrameCycle::new(HeadlessQueue::manual(), GraphicsMemory::new(), ring, targets).unwrap()
    }

    fn run_frame(cycle: &mut FrameCycle<HeadlessQueue>) -> Result<FenceValue> {
        let mut frame = cycle.begin_frame()?;
        cycle.record(&mut frame, FramePass::Clear, |_| ())?;
        if cycle.targets().is_multisampled() {
            cycle.record(&mut frame, FramePass::Resolve, |_| ())?;
        }
        cycle.submit(frame)
    }

    #[test]
    fn test_ring_size_validated() {
        let result = FrameCycle::new(HeadlessQueue::manual(), GraphicsMemory::new(), 1, FrameTargets::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_slot_states() {
        let mut cycle = cycle(2, FrameTargets::default());

        let mut frame = cycle.begin_frame().unwrap();
        assert_eq!(frame.slot(), 0);
        assert_eq!(cycle.slot(0).unwrap().state, SlotState::Recording);

        cycle.record(&mut frame, FramePass::Clear, |_| ()).unwrap();
        let fence = cycle.submit(frame).unwrap();

        let slot = cycle.slot(0).unwrap();
        assert_eq!(slot.state, SlotState::Submitted);
        assert_eq!(slot.fence, fence);
        assert_eq!(cycle.frame_number(), 1);
    }

    #[test]
    fn test_fences_increase_per_frame() {
        let mut cycle = cycle(3, FrameTargets::default());
        let a = run_frame(&mut cycle).unwrap();
        let b = run_frame(&mut cycle).unwrap();
        assert!(b > a);
        assert_eq!(cycle.stats().frames_submitted, 2);
        assert_eq!(cycle.stats().last_signaled, b);
    }

    #[test]
    fn test_begin_twice_rejected() {
        let mut cycle = cycle(2, FrameTargets::default());
        let frame = cycle.begin_frame().unwrap();
        assert!(cycle.begin_frame().is_err());

        cycle.abandon(frame);
        assert_eq!(cycle.slot(0).unwrap().state, SlotState::Idle);
        assert!(cycle.begin_frame().is_ok());
    }

    #[test]
    fn test_missing_resolve_rejected_on_submit() {
        let mut cycle = cycle(2, FrameTargets::new(4, false));
        let mut frame = cycle.begin_frame().unwrap();
        cycle.record(&mut frame, FramePass::Clear, |_| ()).unwrap();
        cycle.record(&mut frame, FramePass::Sprites, |_| ()).unwrap();

        assert!(cycle.submit(frame).is_err());
        assert_eq!(cycle.slot(0).unwrap().state, SlotState::Idle);
        assert_eq!(cycle.stats().frames_submitted, 0);
    }

    #[test]
    fn test_out_of_order_record_skips_closure() {
        let mut cycle = cycle(2, FrameTargets::default());
        let mut frame = cycle.begin_frame().unwrap();
        cycle.record(&mut frame, FramePass::Clear, |_| ()).unwrap();
        cycle.record(&mut frame, FramePass::Gui, |_| ()).unwrap();

        let mut ran = false;
        assert!(cycle.record(&mut frame, FramePass::Sprites, |_| ran = true).is_err());
        assert!(!ran);
    }

    #[test]
    fn test_memory_committed_once_per_frame() {
        let mut cycle = cycle(2, FrameTargets::default());
        cycle.memory_mut().allocate(1024);
        run_frame(&mut cycle).unwrap();
        assert_eq!(cycle.memory().stats().bytes_in_flight, 1024);

        cycle.queue().complete_all();
        run_frame(&mut cycle).unwrap();
        assert_eq!(cycle.memory().stats().bytes_in_flight, 0);
        assert_eq!(cycle.memory().stats().bytes_retired, 1024);
    }

    #[test]
    fn test_release_resets_counters() {
        let mut cycle = cycle(2, FrameTargets::default());
        run_frame(&mut cycle).unwrap();
        cycle.queue().complete_all();
        run_frame(&mut cycle).unwrap();
        let signaled = run_frame(&mut cycle).unwrap();
        assert_eq!(cycle.stats().frames_submitted, 3);

        cycle.queue().complete_all();
        cycle.release();

        assert_eq!(cycle.frame_number(), 0);
        let stats = cycle.stats();
        assert_eq!(stats.frames_submitted, 0);
        assert_eq!(stats.ring_waits, 0);
        assert_eq!(stats.last_signaled, signaled);
        assert_eq!(stats.last_completed, signaled);

        // 重建后从槽位 0 开始，fence 继续递增
        let frame = cycle.begin_frame().unwrap();
        assert_eq!(frame.slot(), 0);
        cycle.abandon(frame);
        let next = run_frame(&mut cycle).unwrap();
        assert!(next > signaled);
        assert_eq!(cycle.stats().frames_submitted, 1);
    }
}
