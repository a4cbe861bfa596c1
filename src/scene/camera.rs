//! 第一人称自由相机
//!
//! 右手坐标系，投影深度范围 [0, 1]。

use nalgebra::Unit;

use crate::core::config::CameraConfig;
use crate::core::math::{matrix, Matrix4, Vector3};

/// 相机位置和朝向
#[derive(Debug, Clone, Copy)]
struct Pose {
    position: Vector3,
    right: Vector3,
    up: Vector3,
    look: Vector3,
}

/// 自由相机
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vector3,

    /// 相机坐标系：右向量
    right: Vector3,

    /// 相机坐标系：上向量
    up: Vector3,

    /// 相机坐标系：前向量（Look）
    look: Vector3,

    near_z: f32,
    far_z: f32,
    aspect: f32,

    /// 垂直视场角（弧度）
    fov_y: f32,

    /// `reset` 恢复到的姿态
    home: Pose,
}

impl Camera {
    /// 创建相机
    ///
    /// # 参数
    ///
    /// * `fov_y` - 垂直视场角（弧度）
    /// * `aspect` - 宽高比
    pub fn new(fov_y: f32, aspect: f32, near_z: f32, far_z: f32) -> Self {
        let home = Pose {
            position: Vector3::zeros(),
            right: Vector3::x(),
            up: Vector3::y(),
            look: -Vector3::z(),
        };
        Self {
            position: home.position,
            right: home.right,
            up: home.up,
            look: home.look,
            near_z,
            far_z,
            aspect,
            fov_y,
            home,
        }
    }

    /// 从配置创建并朝向配置的目标点
    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        let mut camera = Self::new(config.fov.to_radians(), aspect, config.near, config.far);
        camera.look_at(
            Vector3::from(config.position),
            Vector3::from(config.target),
            Vector3::y(),
        );
        camera.home = camera.pose();
        camera
    }

    fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            right: self.right,
            up: self.up,
            look: self.look,
        }
    }

    /// 回到创建时的位置和朝向
    pub fn reset(&mut self) {
        let home = self.home;
        self.position = home.position;
        self.right = home.right;
        self.up = home.up;
        self.look = home.look;
    }

    pub fn position(&self) -> Vector3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vector3) {
        self.position = position;
    }

    pub fn look(&self) -> Vector3 {
        self.look
    }

    pub fn right(&self) -> Vector3 {
        self.right
    }

    pub fn up(&self) -> Vector3 {
        self.up
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// 设置宽高比（窗口大小改变）
    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    /// 设置相机朝向目标点
    ///
    /// # 参数
    ///
    /// * `position` - 相机位置
    /// * `target` - 目标位置
    /// * `world_up` - 世界上向量（通常是 (0, 1, 0)）
    pub fn look_at(&mut self, position: Vector3, target: Vector3, world_up: Vector3) {
        let look = (target - position).normalize();
        let right = look.cross(&world_up).normalize();
        let up = right.cross(&look);

        self.position = position;
        self.look = look;
        self.right = right;
        self.up = up;
    }

    /// 左右平移（正值向右）
    pub fn strafe(&mut self, distance: f32) {
        self.position += self.right * distance;
    }

    /// 前后移动（正值向前）
    pub fn walk(&mut self, distance: f32) {
        self.position += self.look * distance;
    }

    /// 沿世界 Y 轴升降（正值向上）
    pub fn rise(&mut self, distance: f32) {
        self.position.y += distance;
    }

    /// 绕相机右向量俯仰（弧度）
    pub fn pitch(&mut self, angle: f32) {
        let axis = Unit::new_normalize(self.right);
        let rotation = Matrix4::from_axis_angle(&axis, angle);

        self.up = rotation.transform_vector(&self.up).normalize();
        self.look = rotation.transform_vector(&self.look).normalize();
    }

    /// 绕世界 Y 轴旋转（弧度）
    pub fn rotate_y(&mut self, angle: f32) {
        let rotation = matrix::rotation_y(angle);

        self.right = rotation.transform_vector(&self.right).normalize();
        self.up = rotation.transform_vector(&self.up).normalize();
        self.look = rotation.transform_vector(&self.look).normalize();
    }

    /// 视图矩阵
    pub fn view_matrix(&self) -> Matrix4 {
        let target = self.position + self.look;
        matrix::look_at(&self.position, &target, &self.up)
    }

    /// 投影矩阵
    pub fn proj_matrix(&self) -> Matrix4 {
        matrix::perspective(self.fov_y, self.aspect, self.near_z, self.far_z)
    }

    /// 视图投影矩阵
    pub fn view_proj(&self) -> Matrix4 {
        self.proj_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::Vector4;

    fn approx(a: Vector3, b: Vector3) -> bool {
        (a - b).norm() < 1e-4
    }

    #[test]
    fn test_look_at_basis() {
        let camera = Camera::from_config(&CameraConfig::default(), 4.0 / 3.0);

        assert!(approx(camera.position(), Vector3::new(0.0, 2.0, 2.0)));
        assert!(approx(camera.look(), Vector3::new(0.0, -1.0, -1.0).normalize()));
        assert!(approx(camera.right(), Vector3::x()));
        assert!(camera.up().y > 0.0);
    }

    #[test]
    fn test_target_projects_to_center() {
        let camera = Camera::from_config(&CameraConfig::default(), 1.0);
        let clip = camera.view_proj() * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.xyz() / clip.w;

        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_walk_and_strafe() {
        let mut camera = Camera::new(1.0, 1.0, 0.1, 10.0);
        camera.walk(2.0);
        assert!(approx(camera.position(), Vector3::new(0.0, 0.0, -2.0)));

        camera.strafe(1.0);
        assert!(approx(camera.position(), Vector3::new(1.0, 0.0, -2.0)));
    }

    #[test]
    fn test_reset_restores_configured_pose() {
        let mut camera = Camera::from_config(&CameraConfig::default(), 1.0);
        let position = camera.position();
        let look = camera.look();

        camera.walk(3.0);
        camera.rise(-1.0);
        camera.rotate_y(1.2);
        camera.pitch(0.4);
        camera.reset();

        assert!(approx(camera.position(), position));
        assert!(approx(camera.look(), look));
        assert!(approx(camera.right(), Vector3::x()));
    }

    #[test]
    fn test_rise_ignores_pitch() {
        let mut camera = Camera::from_config(&CameraConfig::default(), 1.0);
        let start = camera.position();
        camera.rise(0.5);
        assert!(approx(camera.position(), start + Vector3::new(0.0, 0.5, 0.0)));
    }

    #[test]
    fn test_rotation_keeps_basis_orthonormal() {
        let mut camera = Camera::new(1.0, 1.0, 0.1, 10.0);
        camera.rotate_y(0.7);
        camera.pitch(-0.3);

        assert!((camera.look().norm() - 1.0).abs() < 1e-4);
        assert!(camera.look().dot(&camera.right()).abs() < 1e-4);
        assert!(camera.look().dot(&camera.up()).abs() < 1e-4);
    }
}
