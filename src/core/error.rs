//! 错误处理模块
//!
//! 定义了引擎中使用的统一错误类型，使用 `thiserror` 提供友好的错误消息。
//!
//! # 错误分类
//!
//! - **初始化错误**（设备创建失败、特性等级不足）：致命，直接终止启动
//! - **资源创建错误**（单个纹理解码/上传失败）：中止当前批次，已提交的纹理保持有效
//! - **设备丢失**：由提交/呈现路径报告，恢复方式是完整的拆除并重建
//!
//! 查找未命中不是错误，由纹理注册表解析为回退纹理。

use std::path::PathBuf;
use thiserror::Error;

/// 引擎统一的 Result 类型
pub type Result<T> = std::result::Result<T, EmteError>;

/// EMTE 引擎的错误类型
#[derive(Debug, Error)]
pub enum EmteError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 图形 API 错误
    #[error("Graphics error: {0}")]
    Graphics(#[from] GraphicsError),

    /// 纹理加载错误
    #[error("Texture error: {0}")]
    Texture(#[from] TextureError),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 初始化错误
    #[error("Initialization error: {0}")]
    Initialization(String),
}

/// 配置相关的错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// 配置值无效
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
#[derive(Debug, Error)]
pub enum GraphicsError {
    /// 设备创建失败
    #[error("Device creation failed: {0}")]
    DeviceCreation(String),

    /// 适配器不满足最低特性要求（着色器模型等）
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// 交换链错误
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// 着色器编译失败
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// 资源创建失败
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// 渲染命令执行失败
    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    /// 设备丢失，需要完整重建
    #[error("Device lost: {0}")]
    DeviceLost(String),
}

/// 纹理加载相关的错误
#[derive(Debug, Error)]
pub enum TextureError {
    /// 文件不存在
    #[error("Texture file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// 解码失败（格式不支持、文件损坏）
    #[error("Failed to decode '{name}': {reason}")]
    Decode { name: String, reason: String },

    /// 上传到 GPU 失败
    #[error("Failed to upload '{name}': {reason}")]
    Upload { name: String, reason: String },
}

impl EmteError {
    /// 是否为设备丢失错误
    ///
    /// 渲染循环据此决定是重建设备还是退出。
    pub fn is_device_lost(&self) -> bool {
        matches!(self, EmteError::Graphics(GraphicsError::DeviceLost(_)))
    }

    /// 是否为资源创建类错误（纹理解码、上传、描述符耗尽）
    pub fn is_resource_creation(&self) -> bool {
        matches!(
            self,
            EmteError::Texture(_) | EmteError::Graphics(GraphicsError::ResourceCreation(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let lost: EmteError = GraphicsError::DeviceLost("removed".into()).into();
        assert!(lost.is_device_lost());
        assert!(!lost.is_resource_creation());

        let decode: EmteError = TextureError::Decode {
            name: "a.dds".into(),
            reason: "bad header".into(),
        }
        .into();
        assert!(decode.is_resource_creation());
        assert!(!decode.is_device_lost());
    }

    #[test]
    fn test_error_messages() {
        let err: EmteError = ConfigError::InvalidValue {
            field: "graphics.frame_count".into(),
            reason: "must be at least 2".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid value for 'graphics.frame_count': must be at least 2"
        );

        let err = TextureError::NotFound(PathBuf::from("textures/cat.dds"));
        assert_eq!(err.to_string(), "Texture file not found: textures/cat.dds");
    }
}
