//! 帧内 pass 顺序
//!
//! 一帧内的绘制顺序是固定的，后面的 pass（resolve、合成、GUI）依赖前面 pass 在
//! 同一个命令缓冲中已经写入的颜色 / 深度：
//!
//! `Clear → Opaque → Wireframe → Sprites → Resolve → Composite → Gui`
//!
//! 顺序由同一队列上的提交顺序保证，不需要 pass 之间的显式同步。
//! [`FrameRecorder`] 在记录时检查这个顺序。

use crate::core::error::{GraphicsError, Result};

/// 帧内的一个 pass
///
/// 枚举的声明顺序就是记录顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FramePass {
    /// 清除颜色和深度目标
    Clear,
    /// 不透明 / 光照几何体
    Opaque,
    /// 线框 / 调试几何体
    Wireframe,
    /// 2D 精灵
    Sprites,
    /// 多重采样目标解析到单采样目标
    Resolve,
    /// 离屏目标合成到交换链后备缓冲
    Composite,
    /// GUI 绘制命令
    Gui,
}

impl FramePass {
    /// 按记录顺序排列的全部 pass
    pub const ALL: [FramePass; 7] = [
        FramePass::Clear,
        FramePass::Opaque,
        FramePass::Wireframe,
        FramePass::Sprites,
        FramePass::Resolve,
        FramePass::Composite,
        FramePass::Gui,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FramePass::Clear => "clear",
            FramePass::Opaque => "opaque",
            FramePass::Wireframe => "wireframe",
            FramePass::Sprites => "sprites",
            FramePass::Resolve => "resolve",
            FramePass::Composite => "composite",
            FramePass::Gui => "gui",
        }
    }

    /// 是否写入多重采样的场景目标
    pub fn targets_scene(&self) -> bool {
        matches!(
            self,
            FramePass::Clear | FramePass::Opaque | FramePass::Wireframe | FramePass::Sprites
        )
    }
}

/// 一帧的渲染目标配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTargets {
    /// 场景目标的采样数，1 表示不使用 MSAA
    pub msaa_samples: u32,
    /// 场景是否先渲染到离屏目标
    pub offscreen: bool,
}

impl FrameTargets {
    pub fn new(msaa_samples: u32, offscreen: bool) -> Self {
        Self {
            msaa_samples: msaa_samples.max(1),
            offscreen,
        }
    }

    /// 是否需要 resolve
    pub fn is_multisampled(&self) -> bool {
        self.msaa_samples > 1
    }

    /// 本配置下一帧必须包含的 pass
    pub fn required_passes(&self) -> Vec<FramePass> {
        let mut passes = vec![FramePass::Clear];
        if self.is_multisampled() {
            passes.push(FramePass::Resolve);
        }
        if self.offscreen {
            passes.push(FramePass::Composite);
        }
        passes
    }
}

impl Default for FrameTargets {
    fn default() -> Self {
        Self::new(1, false)
    }
}

/// 帧内 pass 记录器
///
/// 拒绝乱序、重复的 pass，拒绝没有 MSAA 时的 Resolve 和没有离屏目标时的 Composite。
#[derive(Debug)]
pub struct FrameRecorder {
    targets: FrameTargets,
    recorded: Vec<FramePass>,
}

impl FrameRecorder {
    pub fn new(targets: FrameTargets) -> Self {
        Self {
            targets,
            recorded: Vec::with_capacity(FramePass::ALL.len()),
        }
    }

    /// 开始记录 `pass`
    pub fn begin_pass(&mut self, pass: FramePass) -> Result<()> {
        match self.recorded.last() {
            None if pass != FramePass::Clear => {
                return Err(order_error(format!("frame must begin with clear, got {}", pass.name())));
            }
            Some(last) if pass <= *last => {
                return Err(order_error(format!(
                    "{} recorded after {}",
                    pass.name(),
                    last.name()
                )));
            }
            _ => {}
        }

        if pass == FramePass::Resolve && !self.targets.is_multisampled() {
            return Err(order_error("resolve recorded without a multisampled target".to_string()));
        }
        if pass == FramePass::Composite && !self.targets.offscreen {
            return Err(order_error("composite recorded without an off-screen target".to_string()));
        }

        self.recorded.push(pass);
        Ok(())
    }

    /// 结束记录，检查必需的 pass 都已记录
    ///
    /// # 返回值
    ///
    /// 按顺序记录的 pass 列表
    pub fn finish(self) -> Result<Vec<FramePass>> {
        for required in self.targets.required_passes() {
            if !self.recorded.contains(&required) {
                return Err(order_error(format!("frame is missing the {} pass", required.name())));
            }
        }
        Ok(self.recorded)
    }

    pub fn recorded(&self) -> &[FramePass] {
        &self.recorded
    }

    pub fn targets(&self) -> FrameTargets {
        self.targets
    }
}

fn order_error(message: String) -> crate::core::error::EmteError {
    GraphicsError::CommandExecution(format!("Invalid pass order: {}", message)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_order_matches_declaration() {
        let mut sorted = FramePass::ALL;
        sorted.sort();
        assert_eq!(sorted, FramePass::ALL);
        assert!(FramePass::Sprites < FramePass::Resolve);
        assert!(FramePass::Sprites.targets_scene());
        assert!(!FramePass::Resolve.targets_scene());
    }

    #[test]
    fn test_full_frame() {
        let mut recorder = FrameRecorder::new(FrameTargets::new(4, true));
        for pass in FramePass::ALL {
            recorder.begin_pass(pass).unwrap();
        }
        assert_eq!(recorder.finish().unwrap(), FramePass::ALL.to_vec());
    }

    #[test]
    fn test_passes_may_be_skipped() {
        let mut recorder = FrameRecorder::new(FrameTargets::new(1, false));
        recorder.begin_pass(FramePass::Clear).unwrap();
        recorder.begin_pass(FramePass::Sprites).unwrap();
        recorder.begin_pass(FramePass::Gui).unwrap();
        assert!(recorder.finish().is_ok());
    }

    #[test]
    fn test_resolve_before_sprites_rejected() {
        let mut recorder = FrameRecorder::new(FrameTargets::new(4, false));
        recorder.begin_pass(FramePass::Clear).unwrap();
        recorder.begin_pass(FramePass::Resolve).unwrap();
        assert!(recorder.begin_pass(FramePass::Sprites).is_err());
        assert!(recorder.begin_pass(FramePass::Wireframe).is_err());
    }

    #[test]
    fn test_repeated_pass_rejected() {
        let mut recorder = FrameRecorder::new(FrameTargets::default());
        recorder.begin_pass(FramePass::Clear).unwrap();
        recorder.begin_pass(FramePass::Opaque).unwrap();
        assert!(recorder.begin_pass(FramePass::Opaque).is_err());
    }

    #[test]
    fn test_must_begin_with_clear() {
        let mut recorder = FrameRecorder::new(FrameTargets::default());
        assert!(recorder.begin_pass(FramePass::Opaque).is_err());
    }

    #[test]
    fn test_target_dependent_passes() {
        let mut recorder = FrameRecorder::new(FrameTargets::new(1, false));
        recorder.begin_pass(FramePass::Clear).unwrap();
        assert!(recorder.begin_pass(FramePass::Resolve).is_err());
        assert!(recorder.begin_pass(FramePass::Composite).is_err());

        let mut recorder = FrameRecorder::new(FrameTargets::new(4, true));
        recorder.begin_pass(FramePass::Clear).unwrap();
        recorder.begin_pass(FramePass::Sprites).unwrap();
        let err = recorder.finish().unwrap_err();
        assert!(err.to_string().contains("resolve"));
    }
}
