//! wgpu 渲染器
//!
//! 把纹理注册表、帧周期和示例场景组合到真实设备上。
//! 每帧按固定顺序记录：清屏 → 光照三角形和球 → 线框网格 → 精灵 →
//! （MSAA）resolve → （离屏）合成 → GUI。
//!
//! 所有依赖设备的对象放在 `DeviceObjects` 里，设备丢失时整体释放后
//! 重新执行启动时的构造序列。

use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::core::config::Config;
use crate::core::error::{EmteError, GraphicsError, Result};
use crate::core::math::matrix;
use crate::core::timer::StepTimer;
use crate::gui::{GuiManager, GuiState};
use crate::renderer::descriptor::{DescriptorRange, DescriptorSlot};
use crate::renderer::frame::{ActiveFrame, FrameCycle};
use crate::renderer::memory::GraphicsMemory;
use crate::renderer::pass::{FramePass, FrameTargets};
use crate::renderer::texture::TextureRegistry;
use crate::renderer::vertex::SpriteVertex;
use crate::scene::{InputSystem, Scene};

use super::context::WgpuContext;
use super::pipelines::{Pipelines, SceneUniforms};
use super::queue::{WgpuCommands, WgpuQueue};
use super::targets::RenderTargets;
use super::upload::{GpuTexture, WgpuUploader};

/// 背景精灵的深度，只填充没有被几何体覆盖的像素
const BACKGROUND_DEPTH: f32 = 0.9999;

/// 场景几何体的顶点缓冲
struct Geometry {
    triangle: wgpu::Buffer,
    sphere_vertices: wgpu::Buffer,
    sphere_indices: wgpu::Buffer,
    sphere_index_count: u32,
    grid: wgpu::Buffer,
    grid_vertices: u32,
    sprites: wgpu::Buffer,
    /// 精灵缓冲的容量（顶点数）
    sprite_capacity: usize,
}

impl Geometry {
    fn new(device: &wgpu::Device, scene: &Scene) -> Self {
        let triangle = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Triangle Vertex Buffer"),
            contents: bytemuck::cast_slice(&scene.triangle),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let sphere_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Vertex Buffer"),
            contents: bytemuck::cast_slice(&scene.sphere.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let sphere_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Index Buffer"),
            contents: bytemuck::cast_slice(&scene.sphere.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let grid = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Grid Vertex Buffer"),
            contents: bytemuck::cast_slice(&scene.grid),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let sprite_capacity = 64;

        Self {
            triangle,
            sphere_vertices,
            sphere_indices,
            sphere_index_count: scene.sphere.indices.len() as u32,
            grid,
            grid_vertices: scene.grid.len() as u32,
            sprites: Self::sprite_buffer(device, sprite_capacity),
            sprite_capacity,
        }
    }

    fn sprite_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sprite Vertex Buffer"),
            size: (capacity * std::mem::size_of::<SpriteVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// 写入本帧的精灵顶点，容量不足时扩容
    fn write_sprites(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, vertices: &[SpriteVertex]) {
        if vertices.len() > self.sprite_capacity {
            self.sprite_capacity = vertices.len().next_power_of_two();
            self.sprites = Self::sprite_buffer(device, self.sprite_capacity);
            debug!(capacity = self.sprite_capacity, "Sprite vertex buffer grown");
        }
        if !vertices.is_empty() {
            queue.write_buffer(&self.sprites, 0, bytemuck::cast_slice(vertices));
        }
    }
}

/// 精灵 pass 中的一次绘制
struct SpriteDraw {
    slot: DescriptorSlot,
    vertices: Range<u32>,
    depth: f32,
}

/// 所有依赖设备的对象
struct DeviceObjects {
    context: WgpuContext,
    uploader: WgpuUploader,
    registry: TextureRegistry<GpuTexture>,
    frames: FrameCycle<WgpuQueue>,
    pipelines: Pipelines,
    targets: RenderTargets,
    geometry: Geometry,
    gui: GuiManager,
}

impl DeviceObjects {
    /// 启动和设备重建共用的构造序列
    fn create(window: &Arc<Window>, config: &Config, scene: &Scene, gui_state: GuiState) -> Result<Self> {
        let context = WgpuContext::new(Arc::clone(window), config)?;
        let device = &context.device;

        let mut uploader = WgpuUploader::new(
            Arc::clone(&context.device),
            Arc::clone(&context.queue),
            context.device_lost_flag(),
        );
        let mut registry = TextureRegistry::new(
            DescriptorRange::new(0, config.textures.descriptor_capacity),
            config.textures.fallback.clone(),
        );
        crate::gfx::queue_texture_manifest(&mut registry, config, scene);
        let report = registry.flush_all_loads(&mut uploader)?;
        registry.ensure_fallback()?;
        info!(loaded = report.loaded, failed = report.failures.len(), "Textures loaded");

        let pipelines = Pipelines::new(device, context.surface_format(), context.msaa_samples, uploader.layout())?;

        let frame_targets = FrameTargets::new(context.msaa_samples, config.graphics.offscreen);
        let targets = RenderTargets::new(
            device,
            context.surface_format(),
            context.size(),
            frame_targets,
            &pipelines.composite_layout,
            &pipelines.composite_sampler,
        );

        let frames = FrameCycle::new(
            WgpuQueue::new(
                Arc::clone(&context.device),
                Arc::clone(&context.queue),
                Arc::clone(&context.surface),
                context.device_lost_flag(),
            ),
            GraphicsMemory::new(),
            config.graphics.frame_count,
            frame_targets,
        )?;

        let geometry = Geometry::new(device, scene);

        let mut gui = GuiManager::new(device, context.surface_format(), window, gui_state);
        {
            let state = gui.state_mut();
            state.adapter = context.adapter.get_info().name;
            state.msaa_samples = context.msaa_samples;
            state.update_textures(&registry, GpuTexture::size);
        }

        Ok(Self {
            context,
            uploader,
            registry,
            frames,
            pipelines,
            targets,
            geometry,
            gui,
        })
    }

    /// 成组释放
    fn release(mut self) -> GuiState {
        self.registry.release();
        self.frames.release();
        self.gui.state().clone()
    }
}

/// wgpu 渲染器
pub struct WgpuRenderer {
    window: Arc<Window>,
    config: Config,
    scene: Scene,
    objects: Option<DeviceObjects>,
    reconstructions: u32,
}

impl WgpuRenderer {
    /// 创建渲染器
    ///
    /// 适配器不满足最低要求、回退纹理无法创建等都是致命错误。
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let size = window.inner_size();
        let scene = Scene::from_config(&config.scene, size.width.max(1), size.height.max(1));
        let objects = DeviceObjects::create(&window, config, &scene, GuiState::new(config))?;

        info!(
            frames_in_flight = config.graphics.frame_count,
            msaa = objects.context.msaa_samples,
            offscreen = config.graphics.offscreen,
            "wgpu renderer created"
        );

        Ok(Self {
            window,
            config: config.clone(),
            scene,
            objects: Some(objects),
            reconstructions: 0,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn reconstructions(&self) -> u32 {
        self.reconstructions
    }

    fn objects(&mut self) -> Result<&mut DeviceObjects> {
        self.objects
            .as_mut()
            .ok_or_else(|| EmteError::Initialization("device objects were not recreated".to_string()))
    }

    /// 处理 GUI 事件，返回 GUI 是否消费了该事件
    pub fn handle_gui_event(&mut self, event: &WindowEvent) -> bool {
        match &mut self.objects {
            Some(objects) => objects.gui.handle_event(&self.window, event),
            None => false,
        }
    }

    /// 固定步长更新：应用 GUI 参数、移动相机、推进场景
    pub fn update(&mut self, input: &mut InputSystem, timer: &StepTimer) {
        if let Some(objects) = &self.objects {
            let state = objects.gui.state();
            self.scene.clear_color = state.clear_color.into();
            input.set_move_speed(state.camera_speed);
        }
        input.update_camera(&mut self.scene.camera, timer.elapsed_seconds());
        self.scene.update(timer.total_seconds());
    }

    /// 渲染一帧
    ///
    /// 交换链过期时重新配置并跳过这一帧；设备丢失时重建。
    pub fn render(&mut self) -> Result<()> {
        if self.objects()?.context.is_device_lost() {
            return self.reconstruct();
        }

        match self.draw() {
            Err(e) if e.is_device_lost() => {
                warn!(error = %e, "Device lost, reconstructing");
                self.reconstruct()
            }
            Err(EmteError::Graphics(GraphicsError::SwapchainError(reason))) => {
                debug!(%reason, "Swapchain out of date, reconfiguring");
                let size = self.window.inner_size();
                self.resize(size.width, size.height)
            }
            other => other,
        }
    }

    fn draw(&mut self) -> Result<()> {
        let window = Arc::clone(&self.window);
        let scene = &self.scene;
        let objects = self
            .objects
            .as_mut()
            .ok_or_else(|| EmteError::Initialization("device objects were not recreated".to_string()))?;

        let (width, height) = objects.targets.size();
        let uniforms = SceneUniforms::new(
            &scene.world,
            &scene.camera.view_proj(),
            &matrix::screen_orthographic(width as f32, height as f32),
            scene.light_dir.into(),
            scene.camera.position().into(),
        );
        objects
            .context
            .queue
            .write_buffer(&objects.pipelines.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let (sprite_vertices, sprite_draws) = collect_sprites(scene, &objects.registry);
        objects
            .geometry
            .write_sprites(&objects.context.device, &objects.context.queue, &sprite_vertices);

        objects.gui.update(&window);

        let mut frame = objects.frames.begin_frame()?;
        objects.frames.memory_mut().allocate(
            (std::mem::size_of::<SceneUniforms>() + std::mem::size_of_val(sprite_vertices.as_slice())) as u64,
        );

        if let Err(e) = record_passes(objects, scene, &window, &sprite_draws, &mut frame) {
            objects.frames.abandon(frame);
            return Err(e);
        }
        objects.frames.submit(frame)?;

        let frames = &objects.frames;
        objects
            .gui
            .state_mut()
            .update_frames(frames.frame_number(), &frames.stats(), frames.memory().stats());
        Ok(())
    }

    /// 窗口大小改变
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }

        let objects = self.objects()?;
        objects.frames.wait_for_gpu()?;
        objects.context.reconfigure_surface(width, height);
        objects.targets = RenderTargets::new(
            &objects.context.device,
            objects.context.surface_format(),
            objects.context.size(),
            objects.targets.frame_targets(),
            &objects.pipelines.composite_layout,
            &objects.pipelines.composite_sampler,
        );
        self.scene.resize(width, height);
        debug!(width, height, "Renderer resized");
        Ok(())
    }

    /// 等待 GPU 完成所有在途帧（退出前调用）
    pub fn wait_for_gpu(&mut self) -> Result<()> {
        match &mut self.objects {
            Some(objects) => objects.frames.wait_for_gpu(),
            None => Ok(()),
        }
    }

    /// 设备丢失后的完整重建
    pub fn reconstruct(&mut self) -> Result<()> {
        let gui_state = match self.objects.take() {
            Some(objects) => objects.release(),
            None => GuiState::new(&self.config),
        };

        let mut objects = DeviceObjects::create(&self.window, &self.config, &self.scene, gui_state)?;
        self.reconstructions += 1;
        objects.gui.state_mut().reconstructions = self.reconstructions;
        self.objects = Some(objects);

        info!(reconstructions = self.reconstructions, "Device objects recreated");
        Ok(())
    }
}

/// 按绘制顺序解析精灵纹理，生成顶点和绘制列表
///
/// 纹理缺失时使用回退纹理；连回退纹理都没有的精灵不绘制。
fn collect_sprites(scene: &Scene, registry: &TextureRegistry<GpuTexture>) -> (Vec<SpriteVertex>, Vec<SpriteDraw>) {
    let mut vertices = Vec::new();
    let mut draws = Vec::new();

    let background = scene.background.iter().map(|s| (s, BACKGROUND_DEPTH));
    let sprites = scene.sprites.iter().map(|s| (s, 0.0));

    for (sprite, depth) in background.chain(sprites) {
        let Some(handle) = registry.lookup(&sprite.texture) else {
            continue;
        };
        let start = vertices.len() as u32;
        vertices.extend_from_slice(&sprite.vertices(handle.resource().size()));
        draws.push(SpriteDraw {
            slot: handle.slot(),
            vertices: start..vertices.len() as u32,
            depth,
        });
    }
    (vertices, draws)
}

fn color_attachment<'a>(
    view: &'a wgpu::TextureView,
    resolve_target: Option<&'a wgpu::TextureView>,
    load: wgpu::LoadOp<wgpu::Color>,
    store: wgpu::StoreOp,
) -> Option<wgpu::RenderPassColorAttachment<'a>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target,
        ops: wgpu::Operations { load, store },
    })
}

fn depth_attachment(view: &wgpu::TextureView, load: wgpu::LoadOp<f32>) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
    Some(wgpu::RenderPassDepthStencilAttachment {
        view,
        depth_ops: Some(wgpu::Operations {
            load,
            store: wgpu::StoreOp::Store,
        }),
        stencil_ops: None,
    })
}

/// 按固定顺序记录一帧的全部 pass
fn record_passes(
    objects: &mut DeviceObjects,
    scene: &Scene,
    window: &Window,
    sprite_draws: &[SpriteDraw],
    frame: &mut ActiveFrame<WgpuCommands>,
) -> Result<()> {
    let DeviceObjects {
        context,
        uploader,
        registry,
        frames,
        pipelines,
        targets,
        geometry,
        gui,
    } = objects;
    let frame_targets = frame.targets();
    let (width, height) = targets.size();

    frames.record(frame, FramePass::Clear, |cmds| {
        let c = scene.clear_color;
        let clear = wgpu::Color {
            r: c.r as f64,
            g: c.g as f64,
            b: c.b as f64,
            a: c.a as f64,
        };
        let view = targets.scene_view(&cmds.view);
        cmds.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Pass"),
            color_attachments: &[color_attachment(view, None, wgpu::LoadOp::Clear(clear), wgpu::StoreOp::Store)],
            depth_stencil_attachment: depth_attachment(targets.depth_view(), wgpu::LoadOp::Clear(1.0)),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    })?;

    frames.record(frame, FramePass::Opaque, |cmds| {
        let material = scene.lit_material(registry).and_then(|material| {
            Some((
                uploader.bind_group(material.diffuse.slot())?,
                uploader.bind_group(material.normal.slot())?,
            ))
        });
        let view = targets.scene_view(&cmds.view);
        let mut pass = cmds.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Opaque Pass"),
            color_attachments: &[color_attachment(view, None, wgpu::LoadOp::Load, wgpu::StoreOp::Store)],
            depth_stencil_attachment: depth_attachment(targets.depth_view(), wgpu::LoadOp::Load),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        if let Some((diffuse, normal)) = material {
            pass.set_pipeline(&pipelines.lit);
            pass.set_bind_group(0, &pipelines.uniform_bind_group, &[]);
            pass.set_bind_group(1, diffuse, &[]);
            pass.set_bind_group(2, normal, &[]);

            pass.set_vertex_buffer(0, geometry.triangle.slice(..));
            pass.draw(0..scene.triangle.len() as u32, 0..1);

            pass.set_vertex_buffer(0, geometry.sphere_vertices.slice(..));
            pass.set_index_buffer(geometry.sphere_indices.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..geometry.sphere_index_count, 0, 0..1);
        }
    })?;

    frames.record(frame, FramePass::Wireframe, |cmds| {
        let view = targets.scene_view(&cmds.view);
        let mut pass = cmds.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Wireframe Pass"),
            color_attachments: &[color_attachment(view, None, wgpu::LoadOp::Load, wgpu::StoreOp::Store)],
            depth_stencil_attachment: depth_attachment(targets.depth_view(), wgpu::LoadOp::Load),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&pipelines.line);
        pass.set_bind_group(0, &pipelines.uniform_bind_group, &[]);
        pass.set_vertex_buffer(0, geometry.grid.slice(..));
        pass.draw(0..geometry.grid_vertices, 0..1);
    })?;

    frames.record(frame, FramePass::Sprites, |cmds| {
        let view = targets.scene_view(&cmds.view);
        let mut pass = cmds.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Sprite Pass"),
            color_attachments: &[color_attachment(view, None, wgpu::LoadOp::Load, wgpu::StoreOp::Store)],
            depth_stencil_attachment: depth_attachment(targets.depth_view(), wgpu::LoadOp::Load),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&pipelines.sprite);
        pass.set_bind_group(0, &pipelines.uniform_bind_group, &[]);
        pass.set_vertex_buffer(0, geometry.sprites.slice(..));
        for draw in sprite_draws {
            let Some(bind_group) = uploader.bind_group(draw.slot) else {
                continue;
            };
            pass.set_viewport(0.0, 0.0, width as f32, height as f32, draw.depth, draw.depth);
            pass.set_bind_group(1, bind_group, &[]);
            pass.draw(draw.vertices.clone(), 0..1);
        }
    })?;

    if frame_targets.is_multisampled() {
        frames.record(frame, FramePass::Resolve, |cmds| {
            let view = targets.scene_view(&cmds.view);
            let resolve = targets.resolve_view(&cmds.view);
            cmds.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Resolve Pass"),
                color_attachments: &[color_attachment(view, Some(resolve), wgpu::LoadOp::Load, wgpu::StoreOp::Discard)],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        })?;
    }

    if frame_targets.offscreen {
        frames.record(frame, FramePass::Composite, |cmds| {
            let mut pass = cmds.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Composite Pass"),
                color_attachments: &[color_attachment(
                    &cmds.view,
                    None,
                    wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    wgpu::StoreOp::Store,
                )],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if let Some(bind_group) = targets.composite_bind_group() {
                pass.set_pipeline(&pipelines.composite);
                pass.set_bind_group(0, bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        })?;
    }

    frames.record(frame, FramePass::Gui, |cmds| {
        gui.render(&context.device, &context.queue, &mut cmds.encoder, &cmds.view, window);
    })?;

    Ok(())
}

