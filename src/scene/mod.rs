//! 示例场景
//!
//! 全屏背景、若干精灵、法线贴图照明的三角形和球、XZ 平面线框网格，
//! 以及一个第一人称自由相机。场景只引用纹理名，不持有 GPU 资源。

pub mod camera;
pub mod grid;
pub mod input;
pub mod sphere;
pub mod sprite;

pub use camera::Camera;
pub use input::InputSystem;
pub use sphere::LitMesh;
pub use sprite::Sprite;

use nalgebra::Unit;

use crate::core::config::SceneConfig;
use crate::core::math::{matrix, Color, Matrix4, UnitQuaternion, Vector3};
use crate::renderer::texture::{TextureHandle, TextureRegistry};
use crate::renderer::vertex::{lit_triangle, LineVertex, LitVertex};

/// 球的直径
const SPHERE_DIAMETER: f32 = 1.5;

/// 球的细分数
const SPHERE_TESSELLATION: u32 = 16;

/// 光照几何体的材质
#[derive(Debug)]
pub struct LitMaterial<'a, R> {
    pub diffuse: &'a TextureHandle<R>,
    pub normal: &'a TextureHandle<R>,
}

/// 示例场景
#[derive(Debug, Clone)]
pub struct Scene {
    pub clear_color: Color,
    /// 全屏背景
    pub background: Option<Sprite>,
    pub sprites: Vec<Sprite>,
    /// 光照几何体的漫反射纹理名
    pub diffuse_texture: String,
    /// 光照几何体的法线贴图名
    pub normal_texture: String,
    pub triangle: [LitVertex; 3],
    pub sphere: LitMesh,
    pub grid: Vec<LineVertex>,
    pub camera: Camera,
    /// 三角形和球共用的世界矩阵
    pub world: Matrix4,
    /// 指向光源的方向
    pub light_dir: Vector3,
    /// 模拟时间（秒）
    pub time: f32,
}

impl Scene {
    pub fn from_config(config: &SceneConfig, width: u32, height: u32) -> Self {
        let aspect = width as f32 / height.max(1) as f32;

        let mut scene = Self {
            clear_color: Color::from(config.clear_color),
            background: config
                .background
                .as_ref()
                .map(|name| Sprite::fullscreen(name.clone(), width, height)),
            sprites: config.sprites.iter().map(Sprite::from).collect(),
            diffuse_texture: config.diffuse_texture.clone(),
            normal_texture: config.normal_texture.clone(),
            triangle: lit_triangle(),
            sphere: sphere::uv_sphere(SPHERE_DIAMETER, SPHERE_TESSELLATION),
            grid: grid::floor_grid(config.grid_divisions),
            camera: Camera::from_config(&config.camera, aspect),
            world: Matrix4::identity(),
            light_dir: Vector3::new(1.0, 1.0, 1.0),
            time: 0.0,
        };
        scene.update(0.0);
        scene
    }

    /// 固定步长更新
    ///
    /// 光源方向绕 Y 轴旋转，三角形按 `sin(t)` 来回摆动。
    pub fn update(&mut self, total_seconds: f32) {
        self.time = total_seconds;

        let rotation = UnitQuaternion::from_axis_angle(&Unit::new_normalize(Vector3::y()), total_seconds);
        self.light_dir = (rotation * Vector3::new(1.0, 1.0, 1.0)).normalize();
        self.world = matrix::rotation_y(total_seconds.sin());
    }

    /// 窗口大小改变
    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.set_aspect(width as f32 / height.max(1) as f32);
        if let Some(background) = &mut self.background {
            *background = Sprite::fullscreen(background.texture.clone(), width, height);
        }
    }

    /// 场景引用的全部纹理名（按首次出现的顺序，不去重）
    pub fn texture_names(&self) -> Vec<String> {
        self.background
            .iter()
            .chain(self.sprites.iter())
            .map(|s| s.texture.clone())
            .chain([self.diffuse_texture.clone(), self.normal_texture.clone()])
            .collect()
    }

    /// 通过注册表解析光照几何体的两张贴图
    ///
    /// 未加载的名字解析为回退纹理；回退纹理也不在时返回 `None`。
    pub fn lit_material<'r, R>(&self, registry: &'r TextureRegistry<R>) -> Option<LitMaterial<'r, R>> {
        Some(LitMaterial {
            diffuse: registry.lookup(&self.diffuse_texture)?,
            normal: registry.lookup(&self.normal_texture)?,
        })
    }

    /// 精灵 pass 的绘制顺序：先背景，后精灵
    pub fn sprite_draw_list(&self) -> impl Iterator<Item = &Sprite> {
        self.background.iter().chain(self.sprites.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_from_default_config() {
        let scene = Scene::from_config(&SceneConfig::default(), 800, 600);

        assert_eq!(scene.grid.len(), 84);
        assert_eq!(
            scene.texture_names(),
            vec![
                "textures/sunset.jpg",
                "textures/cat.dds",
                "textures/rocks_diff.dds",
                "textures/rocks_norm.dds"
            ]
        );
        assert_eq!(scene.sprite_draw_list().count(), 2);
        assert!(!scene.sphere.indices.is_empty());
    }

    #[test]
    fn test_lit_material_resolves_both_maps() {
        use crate::gfx::headless::HeadlessUploader;
        use crate::renderer::descriptor::DescriptorRange;
        use crate::renderer::texture::TextureData;

        let scene = Scene::from_config(&SceneConfig::default(), 800, 600);
        let mut uploader = HeadlessUploader::new();
        let mut registry = TextureRegistry::new(DescriptorRange::new(0, 8), "default");
        assert!(scene.lit_material(&registry).is_none());

        registry.queue_pixels("default", TextureData::solid(1, 1, [255; 4]));
        registry.queue_pixels(scene.normal_texture.clone(), TextureData::solid(1, 1, [128, 128, 255, 255]));
        registry.flush_loads(&mut uploader).unwrap();

        let material = scene.lit_material(&registry).unwrap();
        assert_eq!(material.diffuse.name(), "default");
        assert_eq!(material.normal.name(), "textures/rocks_norm.dds");
        assert_ne!(material.diffuse.slot(), material.normal.slot());
    }

    #[test]
    fn test_update_rotates_light() {
        let mut scene = Scene::from_config(&SceneConfig::default(), 800, 600);
        let initial = scene.light_dir;

        scene.update(std::f32::consts::FRAC_PI_2);
        assert!((scene.light_dir - initial).norm() > 0.1);
        assert!((scene.light_dir.y - initial.y).abs() < 1e-5);
        assert!((scene.light_dir.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_resize_updates_background() {
        let mut scene = Scene::from_config(&SceneConfig::default(), 800, 600);
        scene.resize(1024, 768);

        let background = scene.background.as_ref().unwrap();
        assert_eq!(background.resolved_size((1, 1)).x, 1024.0);
    }
}
