//! Headless 图形后端
//!
//! 进程内模拟的 GPU：fence 完成时机可控（立即 / 延迟 N 帧 / 手动），
//! 记录每帧提交的 pass 和绘制，支持模拟设备丢失。
//!
//! 用于单元测试和 `--headless` 运行模式，渲染流程与 wgpu 后端一致。

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::error::{GraphicsError, Result, TextureError};
use crate::core::timer::StepTimer;
use crate::renderer::descriptor::{DescriptorRange, DescriptorSlot};
use crate::renderer::frame::{FrameCycle, FrameStats, GpuQueue};
use crate::renderer::memory::GraphicsMemory;
use crate::renderer::pass::{FramePass, FrameTargets};
use crate::renderer::sync::{FenceValue, GpuTimeline};
use crate::renderer::texture::{TextureRegistry, TextureSource, TextureUploader};
use crate::renderer::vertex::{LineVertex, LitVertex, SpriteVertex};
use crate::scene::Scene;

/// 模拟 GPU 完成 fence 的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// 提交即完成
    Immediate,
    /// 落后 N 个 fence 完成；CPU 等待时 GPU 追上
    Lagged(u64),
    /// 只通过 [`HeadlessTimeline::complete_up_to`] 完成
    Manual,
}

#[derive(Debug, Default)]
struct TimelineState {
    completed: u64,
    signaled: u64,
    lost: bool,
    waits: Vec<FenceValue>,
}

/// 模拟的 GPU 时间线
///
/// 可以在线程之间共享，测试中由另一个线程推进完成值。
#[derive(Debug, Default)]
pub struct HeadlessTimeline {
    state: Mutex<TimelineState>,
    cond: Condvar,
}

impl HeadlessTimeline {
    fn lock(&self) -> MutexGuard<'_, TimelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 完成 `value` 及之前的所有 fence（不超过已 signal 的值）
    pub fn complete_up_to(&self, value: FenceValue) {
        let mut state = self.lock();
        let target = value.value().min(state.signaled);
        if target > state.completed {
            state.completed = target;
            self.cond.notify_all();
        }
    }

    /// 完成所有已 signal 的 fence
    pub fn complete_all(&self) {
        let signaled = self.signaled();
        self.complete_up_to(signaled);
    }

    pub fn completed(&self) -> FenceValue {
        FenceValue::new(self.lock().completed)
    }

    pub fn signaled(&self) -> FenceValue {
        FenceValue::new(self.lock().signaled)
    }

    /// 模拟设备丢失，唤醒所有等待者
    pub fn lose_device(&self) {
        self.lock().lost = true;
        self.cond.notify_all();
    }

    pub fn is_lost(&self) -> bool {
        self.lock().lost
    }

    /// CPU 发起过的阻塞等待（按顺序）
    pub fn waits(&self) -> Vec<FenceValue> {
        self.lock().waits.clone()
    }

    fn signal(&self, value: FenceValue) {
        let mut state = self.lock();
        state.signaled = state.signaled.max(value.value());
    }

    fn wait(&self, value: FenceValue, completion: Completion) -> Result<()> {
        let mut state = self.lock();
        state.waits.push(value);

        loop {
            if state.lost {
                return Err(GraphicsError::DeviceLost("simulated device removal".to_string()).into());
            }
            if state.completed >= value.value() {
                return Ok(());
            }
            if value.value() > state.signaled {
                return Err(GraphicsError::CommandExecution(format!(
                    "waiting for fence {} which was never signaled",
                    value
                ))
                .into());
            }

            match completion {
                Completion::Manual => {
                    state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                // GPU 在 CPU 等待期间追上
                Completion::Immediate | Completion::Lagged(_) => {
                    state.completed = value.value();
                }
            }
        }
    }
}

/// 一帧的模拟命令缓冲
#[derive(Debug, Clone, Default)]
pub struct HeadlessCommands {
    pub slot: usize,
    /// 按记录顺序的绘制描述
    pub draws: Vec<String>,
}

impl HeadlessCommands {
    pub fn draw(&mut self, description: impl Into<String>) {
        self.draws.push(description.into());
    }
}

/// 已提交的一帧
#[derive(Debug, Clone)]
pub struct SubmittedFrame {
    pub slot: usize,
    pub fence: FenceValue,
    pub passes: Vec<FramePass>,
    pub draws: Vec<String>,
}

/// 模拟的 GPU 命令队列
#[derive(Debug)]
pub struct HeadlessQueue {
    timeline: Arc<HeadlessTimeline>,
    completion: Completion,
    submissions: Vec<SubmittedFrame>,
    presents: u64,
}

impl HeadlessQueue {
    pub fn new(completion: Completion) -> Self {
        Self {
            timeline: Arc::new(HeadlessTimeline::default()),
            completion,
            submissions: Vec::new(),
            presents: 0,
        }
    }

    pub fn immediate() -> Self {
        Self::new(Completion::Immediate)
    }

    pub fn manual() -> Self {
        Self::new(Completion::Manual)
    }

    /// 共享的时间线句柄
    pub fn timeline(&self) -> Arc<HeadlessTimeline> {
        Arc::clone(&self.timeline)
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    pub fn complete_all(&self) {
        self.timeline.complete_all();
    }

    pub fn submissions(&self) -> &[SubmittedFrame] {
        &self.submissions
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }

    fn check_lost(&self) -> Result<()> {
        if self.timeline.is_lost() {
            Err(GraphicsError::DeviceLost("simulated device removal".to_string()).into())
        } else {
            Ok(())
        }
    }
}

impl GpuTimeline for HeadlessQueue {
    fn completed_value(&self) -> FenceValue {
        self.timeline.completed()
    }

    fn wait_for_value(&self, value: FenceValue) -> Result<()> {
        self.timeline.wait(value, self.completion)
    }
}

impl GpuQueue for HeadlessQueue {
    type Commands = HeadlessCommands;

    fn begin_commands(&mut self, slot: usize) -> Result<HeadlessCommands> {
        self.check_lost()?;
        Ok(HeadlessCommands {
            slot,
            draws: Vec::new(),
        })
    }

    fn submit(&mut self, commands: HeadlessCommands, passes: &[FramePass], signal: FenceValue) -> Result<()> {
        self.check_lost()?;

        self.timeline.signal(signal);
        self.submissions.push(SubmittedFrame {
            slot: commands.slot,
            fence: signal,
            passes: passes.to_vec(),
            draws: commands.draws,
        });

        match self.completion {
            Completion::Immediate => self.timeline.complete_up_to(signal),
            Completion::Lagged(lag) => {
                self.timeline
                    .complete_up_to(FenceValue::new(signal.value().saturating_sub(lag)))
            }
            Completion::Manual => {}
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.check_lost()?;
        self.presents += 1;
        Ok(())
    }
}

/// 模拟的纹理资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessTexture {
    pub width: u32,
    pub height: u32,
    pub slot: DescriptorSlot,
}

/// 进行中的上传批次
#[derive(Debug, Default)]
pub struct HeadlessBatch {
    uploads: Vec<(String, DescriptorSlot)>,
    bytes: usize,
}

/// 模拟的纹理上传器
///
/// 真实解码文件，可注入创建失败和批次失败。
#[derive(Debug, Default)]
pub struct HeadlessUploader {
    batches_ended: u32,
    bytes_uploaded: usize,
    fail_names: HashSet<String>,
    fail_next_batch: bool,
    /// 描述符表：槽位 → 纹理名
    table: Vec<Option<String>>,
}

impl HeadlessUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让名为 `name` 的纹理创建失败
    pub fn fail_on(&mut self, name: impl Into<String>) {
        self.fail_names.insert(name.into());
    }

    /// 让下一次 `end_batch` 失败
    pub fn fail_next_batch(&mut self) {
        self.fail_next_batch = true;
    }

    pub fn batches_ended(&self) -> u32 {
        self.batches_ended
    }

    pub fn bytes_uploaded(&self) -> usize {
        self.bytes_uploaded
    }

    /// 描述符表中 `slot` 处的纹理名
    pub fn descriptor(&self, slot: DescriptorSlot) -> Option<&str> {
        self.table.get(slot.index() as usize)?.as_deref()
    }

    /// 清空描述符表（设备丢失）
    pub fn clear_table(&mut self) {
        self.table.clear();
    }
}

impl TextureUploader for HeadlessUploader {
    type Resource = HeadlessTexture;
    type Batch = HeadlessBatch;

    fn begin_batch(&mut self) -> Result<HeadlessBatch> {
        Ok(HeadlessBatch::default())
    }

    fn create_texture(
        &mut self,
        batch: &mut HeadlessBatch,
        name: &str,
        source: &TextureSource,
        slot: DescriptorSlot,
    ) -> Result<HeadlessTexture> {
        if self.fail_names.contains(name) {
            return Err(TextureError::Upload {
                name: name.to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }

        let data = source.load()?;

        let index = slot.index() as usize;
        if self.table.len() <= index {
            self.table.resize(index + 1, None);
        }
        self.table[index] = Some(name.to_string());

        batch.uploads.push((name.to_string(), slot));
        batch.bytes += data.rgba.len();

        Ok(HeadlessTexture {
            width: data.width,
            height: data.height,
            slot,
        })
    }

    fn end_batch(&mut self, batch: HeadlessBatch) -> Result<()> {
        if std::mem::take(&mut self.fail_next_batch) {
            for (_, slot) in &batch.uploads {
                if let Some(entry) = self.table.get_mut(slot.index() as usize) {
                    *entry = None;
                }
            }
            return Err(TextureError::Upload {
                name: format!("batch of {}", batch.uploads.len()),
                reason: "injected batch failure".to_string(),
            }
            .into());
        }

        self.batches_ended += 1;
        self.bytes_uploaded += batch.bytes;
        debug!(textures = batch.uploads.len(), bytes = batch.bytes, "Headless upload batch resident");
        Ok(())
    }
}

/// Headless 渲染器
///
/// 与窗口渲染器使用同一套纹理注册表、帧周期和场景，命令只记录不执行。
pub struct HeadlessRenderer {
    config: Config,
    completion: Completion,
    registry: TextureRegistry<HeadlessTexture>,
    uploader: HeadlessUploader,
    frames: FrameCycle<HeadlessQueue>,
    scene: Scene,
    timer: StepTimer,
    reconstructions: u32,
}

impl HeadlessRenderer {
    /// 创建渲染器
    ///
    /// 模拟适配器支持着色器模型 5 和所有 MSAA 采样数。
    pub fn new(config: &Config, completion: Completion) -> Result<Self> {
        config.validate()?;

        let scene = Scene::from_config(&config.scene, config.window.width, config.window.height);
        let (registry, uploader, frames) = Self::create_device_objects(config, &scene, completion)?;

        info!(
            frames_in_flight = config.graphics.frame_count,
            msaa = config.graphics.msaa_samples,
            offscreen = config.graphics.offscreen,
            "Headless renderer initialized"
        );

        Ok(Self {
            config: config.clone(),
            completion,
            registry,
            uploader,
            frames,
            scene,
            timer: StepTimer::new(),
            reconstructions: 0,
        })
    }

    /// 启动和设备重建共用的构造序列
    fn create_device_objects(
        config: &Config,
        scene: &Scene,
        completion: Completion,
    ) -> Result<(TextureRegistry<HeadlessTexture>, HeadlessUploader, FrameCycle<HeadlessQueue>)> {
        let mut uploader = HeadlessUploader::new();
        let mut registry = TextureRegistry::new(
            DescriptorRange::new(0, config.textures.descriptor_capacity),
            config.textures.fallback.clone(),
        );

        super::queue_texture_manifest(&mut registry, config, scene);
        registry.flush_all_loads(&mut uploader)?;
        registry.ensure_fallback()?;

        let targets = FrameTargets::new(config.graphics.msaa_samples, config.graphics.offscreen);
        let frames = FrameCycle::new(
            HeadlessQueue::new(completion),
            GraphicsMemory::new(),
            config.graphics.frame_count,
            targets,
        )?;

        Ok((registry, uploader, frames))
    }

    /// 推进一个固定步长并渲染一帧
    ///
    /// 设备丢失时执行 `reconstruct()`，丢失的这一帧不会重试。
    pub fn run_frame(&mut self) -> Result<()> {
        let scene = &mut self.scene;
        self.timer
            .advance(Duration::from_secs(1) / crate::core::timer::TICKS_PER_SECOND, |t| {
                scene.update(t.total_seconds())
            });

        match self.render() {
            Err(e) if e.is_device_lost() => {
                warn!(error = %e, "Device lost, reconstructing");
                self.reconstruct()
            }
            other => other.map(|_| ()),
        }
    }

    /// 渲染指定帧数后等待 GPU 空闲
    pub fn run(&mut self, frames: u64) -> Result<FrameStats> {
        for _ in 0..frames {
            self.run_frame()?;
        }
        self.frames.wait_for_gpu()?;

        let stats = self.frames.stats();
        info!(
            frames = stats.frames_submitted,
            last_fence = %stats.last_signaled,
            ring_waits = stats.ring_waits,
            textures = self.registry.len(),
            "Headless run finished"
        );
        Ok(stats)
    }

    fn render(&mut self) -> Result<FenceValue> {
        let mut frame = self.frames.begin_frame()?;
        let targets = frame.targets();
        let registry = &self.registry;
        let scene = &self.scene;

        self.frames.record(&mut frame, FramePass::Clear, |cmds| {
            cmds.draw(format!("clear {:?} samples={}", scene.clear_color.to_array(), targets.msaa_samples));
        })?;

        self.frames.record(&mut frame, FramePass::Opaque, |cmds| match scene.lit_material(registry) {
            Some(material) => {
                let maps = format!(
                    "diffuse={}@{} normal={}@{}",
                    material.diffuse.name(),
                    material.diffuse.slot(),
                    material.normal.name(),
                    material.normal.slot()
                );
                cmds.draw(format!("triangle {}", maps));
                cmds.draw(format!("sphere indices={} {}", scene.sphere.indices.len(), maps));
            }
            None => cmds.draw("lit geometry skipped"),
        })?;

        self.frames.record(&mut frame, FramePass::Wireframe, |cmds| {
            cmds.draw(format!("grid lines={}", scene.grid.len() / 2));
        })?;

        self.frames.record(&mut frame, FramePass::Sprites, |cmds| {
            for sprite in scene.sprite_draw_list() {
                match registry.lookup(&sprite.texture) {
                    Some(handle) => cmds.draw(format!(
                        "sprite {} -> {} slot={}",
                        sprite.texture,
                        handle.name(),
                        handle.slot()
                    )),
                    None => cmds.draw(format!("sprite {} skipped", sprite.texture)),
                }
            }
        })?;

        if targets.is_multisampled() {
            self.frames.record(&mut frame, FramePass::Resolve, |cmds| {
                cmds.draw(format!("resolve {}x", targets.msaa_samples));
            })?;
        }

        if targets.offscreen {
            self.frames.record(&mut frame, FramePass::Composite, |cmds| cmds.draw("composite"))?;
        }

        self.frames.record(&mut frame, FramePass::Gui, |cmds| cmds.draw("gui"))?;

        let transient = std::mem::size_of::<LitVertex>() * scene.triangle.len()
            + std::mem::size_of::<LineVertex>() * scene.grid.len()
            + std::mem::size_of::<SpriteVertex>() * 6 * scene.sprite_draw_list().count();
        self.frames.memory_mut().allocate(transient as u64);

        self.frames.submit(frame)
    }

    /// 设备丢失后的完整重建
    ///
    /// 先成组释放所有依赖设备的对象，再重新执行启动时的构造序列。
    pub fn reconstruct(&mut self) -> Result<()> {
        self.registry.release();
        self.frames.release();
        self.uploader.clear_table();

        let (registry, uploader, frames) = Self::create_device_objects(&self.config, &self.scene, self.completion)?;
        self.registry = registry;
        self.uploader = uploader;
        self.frames = frames;
        self.reconstructions += 1;

        info!(reconstructions = self.reconstructions, "Device objects recreated");
        Ok(())
    }

    /// 模拟设备丢失
    pub fn simulate_device_lost(&self) {
        self.frames.queue().timeline().lose_device();
    }

    pub fn registry(&self) -> &TextureRegistry<HeadlessTexture> {
        &self.registry
    }

    pub fn frames(&self) -> &FrameCycle<HeadlessQueue> {
        &self.frames
    }

    pub fn uploader(&self) -> &HeadlessUploader {
        &self.uploader
    }

    pub fn reconstructions(&self) -> u32 {
        self.reconstructions
    }
}
