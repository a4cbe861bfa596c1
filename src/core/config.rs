//! 配置管理模块
//!
//! 提供引擎配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 800
//! height = 600
//! title = "EMTE"
//!
//! [graphics]
//! backend = "auto"     # auto, dx12, vulkan, metal, gl, headless
//! vsync = true
//! msaa_samples = 4
//! offscreen = false
//! frame_count = 3
//!
//! [textures]
//! fallback = "default"
//! descriptor_capacity = 64
//! files = ["textures/cat.dds", "textures/sunset.jpg"]
//!
//! [[scene.sprites]]
//! texture = "textures/cat.dds"
//! position = [50.0, 50.0]
//!
//! [logging]
//! level = "info"       # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};

/// 引擎配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 纹理配置
    #[serde(default)]
    pub textures: TextureConfig,

    /// 场景配置
    #[serde(default)]
    pub scene: SceneConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,

    /// 运行指定帧数后退出（主要用于 headless 模式）
    #[serde(default)]
    pub max_frames: Option<u64>,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 窗口宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 窗口高度
    #[serde(default = "default_height")]
    pub height: u32,

    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,

    /// 是否可调整大小
    #[serde(default = "default_resizable")]
    pub resizable: bool,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: GraphicsBackend,

    /// 垂直同步
    #[serde(default = "default_vsync")]
    pub vsync: bool,

    /// MSAA 采样数（1 表示关闭）
    #[serde(default = "default_msaa")]
    pub msaa_samples: u32,

    /// 是否先渲染到离屏目标，再合成到交换链
    #[serde(default)]
    pub offscreen: bool,

    /// 在途帧数（帧环大小）
    #[serde(default = "default_frame_count")]
    pub frame_count: usize,

    /// 最低着色器模型（2、4 或 5）
    #[serde(default = "default_min_shader_model")]
    pub min_shader_model: u32,

    /// 使用软件光栅化适配器
    #[serde(default)]
    pub warp: bool,
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsBackend {
    /// 由 wgpu 自动选择
    Auto,
    /// DirectX 12 后端
    Dx12,
    /// Vulkan 后端
    Vulkan,
    /// Metal 后端
    Metal,
    /// OpenGL / GLES 后端
    Gl,
    /// 进程内模拟 GPU，无窗口
    Headless,
}

/// 纹理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureConfig {
    /// 回退纹理的名称（查找未命中时返回）
    #[serde(default = "default_fallback_texture")]
    pub fallback: String,

    /// 为纹理预留的描述符数量
    #[serde(default = "default_descriptor_capacity")]
    pub descriptor_capacity: u32,

    /// 启动时加载的纹理文件
    #[serde(default = "default_texture_files")]
    pub files: Vec<String>,
}

/// 场景配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// 清屏颜色
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],

    /// 全屏背景纹理
    #[serde(default = "default_background")]
    pub background: Option<String>,

    /// 精灵列表
    #[serde(default = "default_sprites")]
    pub sprites: Vec<SpriteConfig>,

    /// 光照几何体的漫反射纹理
    #[serde(default = "default_diffuse_texture")]
    pub diffuse_texture: String,

    /// 光照几何体的法线贴图
    #[serde(default = "default_normal_texture")]
    pub normal_texture: String,

    /// 线框网格的分段数
    #[serde(default = "default_grid_divisions")]
    pub grid_divisions: u32,

    /// 相机
    #[serde(default)]
    pub camera: CameraConfig,
}

/// 精灵配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteConfig {
    /// 纹理名称（即文件路径）
    pub texture: String,

    /// 屏幕坐标（像素，左上角为原点）
    #[serde(default)]
    pub position: [f32; 2],

    /// 着色
    #[serde(default = "default_tint")]
    pub tint: [f32; 4],
}

/// 相机配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// 位置
    #[serde(default = "default_camera_position")]
    pub position: [f32; 3],

    /// 观察目标
    #[serde(default)]
    pub target: [f32; 3],

    /// 垂直视场角（度）
    #[serde(default = "default_fov")]
    pub fov: f32,

    /// 近裁剪面
    #[serde(default = "default_near")]
    pub near: f32,

    /// 远裁剪面
    #[serde(default = "default_far")]
    pub far: f32,

    /// 移动速度（单位/秒）
    #[serde(default = "default_move_speed")]
    pub move_speed: f32,

    /// 鼠标灵敏度（度/像素）
    #[serde(default = "default_mouse_sensitivity")]
    pub mouse_sensitivity: f32,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }
fn default_title() -> String { "EMTE".to_string() }
fn default_resizable() -> bool { true }
fn default_backend() -> GraphicsBackend { GraphicsBackend::Auto }
fn default_vsync() -> bool { true }
fn default_msaa() -> u32 { 4 }
fn default_frame_count() -> usize { 3 }
fn default_min_shader_model() -> u32 { 5 }
fn default_fallback_texture() -> String { "default".to_string() }
fn default_descriptor_capacity() -> u32 { 64 }
fn default_clear_color() -> [f32; 4] { [0.392, 0.584, 0.929, 1.0] } // CornflowerBlue
fn default_background() -> Option<String> { Some("textures/sunset.jpg".to_string()) }
fn default_diffuse_texture() -> String { "textures/rocks_diff.dds".to_string() }
fn default_normal_texture() -> String { "textures/rocks_norm.dds".to_string() }
fn default_grid_divisions() -> u32 { 20 }
fn default_tint() -> [f32; 4] { [1.0, 1.0, 1.0, 1.0] }
fn default_camera_position() -> [f32; 3] { [0.0, 2.0, 2.0] }
fn default_fov() -> f32 { 45.0 }
fn default_near() -> f32 { 0.1 }
fn default_far() -> f32 { 10.0 }
fn default_move_speed() -> f32 { 2.0 }
fn default_mouse_sensitivity() -> f32 { 0.25 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_file() -> String { "emte.log".to_string() }

fn default_texture_files() -> Vec<String> {
    vec![
        "textures/cat.dds".to_string(),
        "textures/sunset.jpg".to_string(),
        "textures/rocks_diff.dds".to_string(),
        "textures/rocks_norm.dds".to_string(),
    ]
}

fn default_sprites() -> Vec<SpriteConfig> {
    vec![SpriteConfig {
        texture: "textures/cat.dds".to_string(),
        position: [50.0, 50.0],
        tint: default_tint(),
    }]
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            resizable: default_resizable(),
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            vsync: default_vsync(),
            msaa_samples: default_msaa(),
            offscreen: false,
            frame_count: default_frame_count(),
            min_shader_model: default_min_shader_model(),
            warp: false,
        }
    }
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            fallback: default_fallback_texture(),
            descriptor_capacity: default_descriptor_capacity(),
            files: default_texture_files(),
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            clear_color: default_clear_color(),
            background: default_background(),
            sprites: default_sprites(),
            diffuse_texture: default_diffuse_texture(),
            normal_texture: default_normal_texture(),
            grid_divisions: default_grid_divisions(),
            camera: CameraConfig::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: default_camera_position(),
            target: [0.0, 0.0, 0.0],
            fov: default_fov(),
            near: default_near(),
            far: default_far(),
            move_speed: default_move_speed(),
            mouse_sensitivity: default_mouse_sensitivity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// ```no_run
    /// use emte::core::Config;
    ///
    /// let config = Config::from_file("config.toml")?;
    /// # Ok::<(), emte::core::EmteError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `-w`, `--width <value>`: 设置窗口宽度
    /// - `-h`, `--height <value>`: 设置窗口高度
    /// - `--warp`: 使用软件光栅化适配器
    /// - `--dx12` / `--vulkan` / `--metal` / `--gl` / `--headless`: 选择后端
    /// - `--msaa <value>`: 设置 MSAA 采样数
    /// - `--offscreen`: 启用离屏渲染 + 合成
    /// - `--frames <value>`: 渲染指定帧数后退出
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        for (flag, backend) in [
            ("--dx12", GraphicsBackend::Dx12),
            ("--vulkan", GraphicsBackend::Vulkan),
            ("--metal", GraphicsBackend::Metal),
            ("--gl", GraphicsBackend::Gl),
            ("--headless", GraphicsBackend::Headless),
        ] {
            if args.iter().any(|a| a == flag) {
                self.graphics.backend = backend;
            }
        }

        if args.iter().any(|a| a == "-warp" || a == "--warp") {
            self.graphics.warp = true;
        }

        if args.iter().any(|a| a == "--offscreen") {
            self.graphics.offscreen = true;
        }

        if let Some(width) = value_after(&args, &["-w", "--width"]) {
            self.window.width = width;
        }

        if let Some(height) = value_after(&args, &["-h", "--height"]) {
            self.window.height = height;
        }

        if let Some(samples) = value_after(&args, &["--msaa"]) {
            self.graphics.msaa_samples = samples;
        }

        if let Some(frames) = value_after(&args, &["--frames"]) {
            self.max_frames = Some(frames);
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(invalid("window.width/height", "Window dimensions must be greater than 0"));
        }

        if !matches!(self.graphics.msaa_samples, 1 | 2 | 4 | 8 | 16) {
            return Err(invalid("graphics.msaa_samples", "MSAA samples must be 1, 2, 4, 8, or 16"));
        }

        // flip 呈现模型至少需要两个后备缓冲
        if self.graphics.frame_count < 2 {
            return Err(invalid("graphics.frame_count", "At least 2 frames in flight are required"));
        }

        if !matches!(self.graphics.min_shader_model, 2 | 4 | 5) {
            return Err(invalid("graphics.min_shader_model", "Shader model must be 2, 4, or 5"));
        }

        if self.textures.descriptor_capacity == 0 {
            return Err(invalid("textures.descriptor_capacity", "Descriptor capacity must be greater than 0"));
        }

        if self.textures.fallback.is_empty() {
            return Err(invalid("textures.fallback", "Fallback texture name must not be empty"));
        }

        // 回退纹理本身也占用一个描述符
        let required = self.textures.files.len() as u64 + 1;
        if required > self.textures.descriptor_capacity as u64 {
            return Err(invalid(
                "textures.descriptor_capacity",
                &format!("{} descriptors required, capacity is {}", required, self.textures.descriptor_capacity),
            ));
        }

        Ok(())
    }
}

fn value_after<T: std::str::FromStr>(args: &[String], flags: &[&str]) -> Option<T> {
    let idx = args.iter().position(|a| flags.contains(&a.as_str()))?;
    args.get(idx + 1)?.parse().ok()
}

fn invalid(field: &str, reason: &str) -> super::error::EmteError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

impl GraphicsBackend {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsBackend::Auto => "auto",
            GraphicsBackend::Dx12 => "DirectX 12",
            GraphicsBackend::Vulkan => "Vulkan",
            GraphicsBackend::Metal => "Metal",
            GraphicsBackend::Gl => "OpenGL",
            GraphicsBackend::Headless => "headless",
        }
    }

    /// 是否为无窗口的模拟后端
    pub fn is_headless(&self) -> bool {
        matches!(self, GraphicsBackend::Headless)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.graphics.backend, GraphicsBackend::Auto);
        assert_eq!(config.graphics.msaa_samples, 4);
        assert_eq!(config.graphics.frame_count, 3);
        assert_eq!(config.textures.files.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.window.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.msaa_samples = 3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.frame_count = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.textures.descriptor_capacity = 4;
        // 4 个文件 + 回退纹理 = 5
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [graphics]
            backend = "vulkan"
            msaa_samples = 1

            [textures]
            files = ["a.dds", "b.dds"]
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.backend, GraphicsBackend::Vulkan);
        assert_eq!(config.graphics.msaa_samples, 1);
        assert_eq!(config.graphics.frame_count, 3);
        assert_eq!(config.textures.fallback, "default");
        assert_eq!(config.textures.files, vec!["a.dds", "b.dds"]);
        assert_eq!(config.window.title, "EMTE");
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args(["emte", "-w", "1280", "--height", "720", "--warp", "--headless", "--frames", "10"]);

        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert!(config.graphics.warp);
        assert!(config.graphics.backend.is_headless());
        assert_eq!(config.max_frames, Some(10));
    }

    #[test]
    fn test_apply_args_ignores_bad_values() {
        let mut config = Config::default();
        config.apply_args(["emte", "--width", "wide", "--msaa"]);
        assert_eq!(config.window.width, 800);
        assert_eq!(config.graphics.msaa_samples, 4);
    }

    #[test]
    fn test_sample_config_file() {
        let config = Config::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml")).unwrap();
        config.validate().unwrap();

        assert_eq!(config.scene.sprites.len(), 1);
        assert_eq!(config.scene.background.as_deref(), Some("textures/sunset.jpg"));
        assert_eq!(config.scene.normal_texture, "textures/rocks_norm.dds");
        assert_eq!(config.textures.files.len(), 4);
    }
}
