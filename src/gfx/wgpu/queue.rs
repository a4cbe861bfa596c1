//! wgpu 命令队列
//!
//! 把帧周期需要的 fence 语义映射到 wgpu：
//!
//! - signal：`queue.submit` 返回的 `SubmissionIndex` 与 fence 值一一对应，
//!   同时注册 `on_submitted_work_done` 回调推进完成值
//! - wait：`device.poll(Maintain::WaitForSubmissionIndex)` 阻塞到该提交完成
//! - 命令缓冲：每帧一个 `CommandEncoder`，开始时获取交换链图像

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::core::error::{GraphicsError, Result};
use crate::renderer::frame::GpuQueue;
use crate::renderer::pass::FramePass;
use crate::renderer::sync::{FenceValue, GpuTimeline};

/// 一帧的命令
pub struct WgpuCommands {
    pub encoder: wgpu::CommandEncoder,
    /// 交换链图像的视图
    pub view: wgpu::TextureView,
    frame: wgpu::SurfaceTexture,
}

/// 帧周期使用的 wgpu 队列
pub struct WgpuQueue {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    surface: Arc<wgpu::Surface<'static>>,
    /// 尚未确认完成的提交
    submissions: Mutex<SubmissionLog<wgpu::SubmissionIndex>>,
    completed: Arc<AtomicU64>,
    device_lost: Arc<AtomicBool>,
    /// 已提交、等待呈现的交换链图像
    pending_present: Option<wgpu::SurfaceTexture>,
}

impl WgpuQueue {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        surface: Arc<wgpu::Surface<'static>>,
        device_lost: Arc<AtomicBool>,
    ) -> Self {
        Self {
            device,
            queue,
            surface,
            submissions: Mutex::new(SubmissionLog::new()),
            completed: Arc::new(AtomicU64::new(0)),
            device_lost,
            pending_present: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn check_lost(&self) -> Result<()> {
        if self.device_lost.load(Ordering::SeqCst) {
            Err(GraphicsError::DeviceLost("wgpu device lost".to_string()).into())
        } else {
            Ok(())
        }
    }

    fn lock_submissions(&self) -> MutexGuard<'_, SubmissionLog<wgpu::SubmissionIndex>> {
        self.submissions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 已提交、尚未确认完成的工作，按 fence 递增排列
///
/// GPU 跟得上时帧周期从不调用 `wait_for_value`，
/// 所以每次读取完成值和每次提交都要丢弃已完成的记录。
#[derive(Debug)]
struct SubmissionLog<I> {
    entries: VecDeque<(FenceValue, I)>,
}

impl<I> SubmissionLog<I> {
    fn new() -> Self {
        Self { entries: VecDeque::new() }
    }

    fn push(&mut self, fence: FenceValue, index: I) {
        self.entries.push_back((fence, index));
    }

    /// 丢弃 `completed` 及之前的记录，返回丢弃的数量
    fn retire(&mut self, completed: FenceValue) -> usize {
        let before = self.entries.len();
        while self.entries.front().is_some_and(|(fence, _)| *fence <= completed) {
            self.entries.pop_front();
        }
        before - self.entries.len()
    }

    /// 取出 `value` 及之前的记录，只返回最后一个（等待它即可）
    fn take_through(&mut self, value: FenceValue) -> Option<(FenceValue, I)> {
        let mut last = None;
        while self.entries.front().is_some_and(|(fence, _)| *fence <= value) {
            last = self.entries.pop_front();
        }
        last
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl GpuTimeline for WgpuQueue {
    fn completed_value(&self) -> FenceValue {
        // 触发已完成提交的回调
        self.device.poll(wgpu::Maintain::Poll);
        let completed = FenceValue::new(self.completed.load(Ordering::Acquire));
        self.lock_submissions().retire(completed);
        completed
    }

    fn wait_for_value(&self, value: FenceValue) -> Result<()> {
        self.check_lost()?;
        if self.completed.load(Ordering::Acquire) >= value.value() {
            return Ok(());
        }

        let target = self.lock_submissions().take_through(value);

        let Some((fence, index)) = target else {
            return Err(GraphicsError::CommandExecution(format!(
                "waiting for fence {} which was never signaled",
                value
            ))
            .into());
        };

        debug!(fence = %fence, "Waiting for GPU");
        self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        self.check_lost()?;
        self.completed.fetch_max(fence.value(), Ordering::AcqRel);
        Ok(())
    }
}

impl GpuQueue for WgpuQueue {
    type Commands = WgpuCommands;

    fn begin_commands(&mut self, slot: usize) -> Result<WgpuCommands> {
        self.check_lost()?;

        let frame = self.surface.get_current_texture().map_err(|e| match e {
            wgpu::SurfaceError::OutOfMemory => GraphicsError::DeviceLost(format!("Surface out of memory: {}", e)),
            other => GraphicsError::SwapchainError(format!("Failed to acquire next image: {}", other)),
        })?;
        if frame.suboptimal {
            warn!("Swapchain image is suboptimal");
        }

        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&format!("Frame Encoder {}", slot)),
        });

        Ok(WgpuCommands { encoder, view, frame })
    }

    fn submit(&mut self, commands: WgpuCommands, passes: &[FramePass], signal: FenceValue) -> Result<()> {
        self.check_lost()?;

        let WgpuCommands { encoder, view, frame } = commands;
        drop(view);

        let index = self.queue.submit(std::iter::once(encoder.finish()));
        {
            let completed = Arc::clone(&self.completed);
            self.queue.on_submitted_work_done(move || {
                completed.fetch_max(signal.value(), Ordering::AcqRel);
            });
        }
        let pending = {
            let completed = FenceValue::new(self.completed.load(Ordering::Acquire));
            let mut submissions = self.lock_submissions();
            submissions.retire(completed);
            submissions.push(signal, index);
            submissions.len()
        };
        self.pending_present = Some(frame);

        debug!(fence = %signal, passes = passes.len(), pending, "Frame submitted");
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.check_lost()?;
        if let Some(frame) = self.pending_present.take() {
            frame.present();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fence(value: u64) -> FenceValue {
        FenceValue::new(value)
    }

    #[test]
    fn test_log_stays_bounded_when_gpu_keeps_pace() {
        let mut log = SubmissionLog::new();

        // GPU 落后一帧完成，CPU 从不阻塞等待
        for frame in 1..=1000u64 {
            log.retire(fence(frame.saturating_sub(1)));
            log.push(fence(frame), frame as u32);
        }
        assert_eq!(log.len(), 1);

        log.retire(fence(1000));
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn test_retire_keeps_pending_work() {
        let mut log = SubmissionLog::new();
        for value in 1..=4 {
            log.push(fence(value), value as u32);
        }

        assert_eq!(log.retire(fence(2)), 2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.retire(fence(2)), 0);
    }

    #[test]
    fn test_take_through_returns_last_covered_submission() {
        let mut log = SubmissionLog::new();
        for value in 1..=5 {
            log.push(fence(value), value as u32 * 10);
        }

        assert_eq!(log.take_through(fence(3)), Some((fence(3), 30)));
        assert_eq!(log.len(), 2);
        assert_eq!(log.take_through(fence(3)), None);
    }
}
