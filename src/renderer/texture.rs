//! 纹理注册表
//!
//! 维护"逻辑名 → GPU 纹理 + 描述符槽位"的映射，按批次加载，并为未命中的查找
//! 提供回退纹理。
//!
//! # 设计原则
//!
//! - **去重**：同一个名字最多对应一个 [`TextureHandle`]，重复请求在 flush 时折叠
//! - **槽位稳定**：槽位按首次出现的顺序单调分配，句柄存活期间不变
//! - **一次等待**：一次 flush 内的所有上传合并为一个批次，只在批次结束时阻塞
//! - **依赖注入**：上传器由调用方传入，注册表本身不持有设备
//!
//! `flush_loads` 只应在启动和设备重建阶段调用，稳态渲染中不应出现。

use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, info, info_span, warn};

use super::descriptor::{DescriptorRange, DescriptorSlot};
use crate::core::error::{EmteError, Result, TextureError};

/// 纹理像素数据（RGBA8）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    /// 从 RGBA8 像素创建，长度必须等于 `width * height * 4`
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(TextureError::Decode {
                name: format!("{}x{} pixels", width, height),
                reason: format!("expected {} bytes of RGBA8, got {}", expected, rgba.len()),
            }
            .into());
        }
        Ok(Self { width, height, rgba })
    }

    /// 单色纹理
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let rgba = color.repeat(width as usize * height as usize);
        Self { width, height, rgba }
    }

    /// 棋盘格纹理（内置的回退纹理）
    ///
    /// # 参数
    ///
    /// * `size` - 边长（像素）
    /// * `cell` - 每个格子的边长（像素）
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut rgba = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let color = if ((x / cell) + (y / cell)) % 2 == 0 { a } else { b };
                rgba.extend_from_slice(&color);
            }
        }
        Self {
            width: size,
            height: size,
            rgba,
        }
    }

    /// 每行字节数
    pub fn bytes_per_row(&self) -> u32 {
        self.width * 4
    }
}

/// 从磁盘解码纹理文件（DDS、PNG、JPEG、BMP、TGA）
pub fn decode_texture_file(path: &Path) -> Result<TextureData> {
    if !path.is_file() {
        return Err(TextureError::NotFound(path.to_path_buf()).into());
    }

    let image = image::open(path).map_err(|e| TextureError::Decode {
        name: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    TextureData::new(width, height, rgba.into_raw())
}

/// 纹理数据来源
#[derive(Debug, Clone)]
pub enum TextureSource {
    /// 磁盘上的图像文件
    File(PathBuf),
    /// 内存中的 RGBA8 像素
    Pixels(TextureData),
}

impl TextureSource {
    /// 取得像素数据，文件来源在这里解码
    pub fn load(&self) -> Result<Cow<'_, TextureData>> {
        match self {
            TextureSource::File(path) => decode_texture_file(path).map(Cow::Owned),
            TextureSource::Pixels(data) => Ok(Cow::Borrowed(data)),
        }
    }
}

/// 纹理上传器
///
/// 由图形后端实现。一次 flush 对应一个批次：
/// `begin_batch` → 若干次 `create_texture` → `end_batch`。
pub trait TextureUploader {
    /// 后端的纹理资源
    type Resource;
    /// 进行中的上传批次
    type Batch;

    /// 开始一个上传批次
    fn begin_batch(&mut self) -> Result<Self::Batch>;

    /// 创建纹理、记录上传并在 `slot` 处建立着色器可见的视图
    ///
    /// 解码失败、格式不支持或设备拒绝创建时返回错误。
    fn create_texture(
        &mut self,
        batch: &mut Self::Batch,
        name: &str,
        source: &TextureSource,
        slot: DescriptorSlot,
    ) -> Result<Self::Resource>;

    /// 提交批次并阻塞调用线程，直到 GPU 侧的拷贝全部完成
    ///
    /// 只能在加载 / 重建阶段调用，不能在每帧渲染中调用。
    fn end_batch(&mut self, batch: Self::Batch) -> Result<()>;
}

/// 已加载的纹理
///
/// 由注册表独占持有，调用方只拿到引用。
#[derive(Debug)]
pub struct TextureHandle<R> {
    name: String,
    slot: DescriptorSlot,
    resource: R,
}

impl<R> TextureHandle<R> {
    /// 加载时使用的逻辑名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 描述符槽位
    pub fn slot(&self) -> DescriptorSlot {
        self.slot
    }

    /// 后端资源
    pub fn resource(&self) -> &R {
        &self.resource
    }
}

/// `flush_all_loads` 的结果
#[derive(Debug, Default)]
pub struct FlushReport {
    /// 新加载的纹理数量
    pub loaded: usize,
    /// 被跳过的纹理的错误
    pub failures: Vec<EmteError>,
}

#[derive(Debug)]
struct PendingLoad {
    name: String,
    source: TextureSource,
}

/// 纹理注册表
pub struct TextureRegistry<R> {
    entries: HashMap<String, TextureHandle<R>>,
    pending: VecDeque<PendingLoad>,
    range: DescriptorRange,
    fallback: String,
}

impl<R> TextureRegistry<R> {
    /// 创建注册表
    ///
    /// # 参数
    ///
    /// * `range` - 预留给纹理的描述符区间，其他组件不得从中分配
    /// * `fallback` - 回退纹理的名字，查找未命中时返回该纹理
    pub fn new(range: DescriptorRange, fallback: impl Into<String>) -> Self {
        Self {
            entries: HashMap::new(),
            pending: VecDeque::new(),
            range,
            fallback: fallback.into(),
        }
    }

    /// 将一个纹理文件加入待加载队列，名字即文件路径
    ///
    /// 不会触碰 GPU 状态，重复的名字在 flush 时折叠。
    pub fn queue_load(&mut self, name: impl Into<String>) {
        let name = name.into();
        let source = TextureSource::File(PathBuf::from(&name));
        self.pending.push_back(PendingLoad { name, source });
    }

    /// 将内存中的像素以 `name` 加入待加载队列
    pub fn queue_pixels(&mut self, name: impl Into<String>, data: TextureData) {
        self.pending.push_back(PendingLoad {
            name: name.into(),
            source: TextureSource::Pixels(data),
        });
    }

    /// 上传所有待加载的纹理
    ///
    /// 按队列顺序处理尚未加载的名字：分配槽位、创建纹理、插入注册表。
    /// 所有上传合并为一个批次，返回前阻塞直到上传完成。
    ///
    /// 某个纹理创建失败时：撤销它的槽位，仍然结束批次使之前的纹理生效，
    /// 返回该错误；失败名字之后的请求留在队列中等待下一次 flush。
    ///
    /// 结束批次失败时：本次创建的纹理全部撤销，按原顺序放回队首。
    ///
    /// # 返回值
    ///
    /// 本次新加载的纹理数量
    pub fn flush_loads<U>(&mut self, uploader: &mut U) -> Result<usize>
    where
        U: TextureUploader<Resource = R>,
    {
        let span = info_span!("flush_loads", pending = self.pending.len());
        let _guard = span.enter();

        // 全部已加载时不开启批次
        self.pending.retain(|load| !self.entries.contains_key(&load.name));
        if self.pending.is_empty() {
            return Ok(0);
        }

        let mark = self.range.allocated_count();
        let mut created: Vec<PendingLoad> = Vec::new();
        let mut failure: Option<EmteError> = None;

        let mut batch = uploader.begin_batch()?;

        while let Some(load) = self.pending.pop_front() {
            if self.entries.contains_key(&load.name) {
                debug!(name = %load.name, "Duplicate texture request collapsed");
                continue;
            }

            let slot = match self.range.allocate() {
                Ok(slot) => slot,
                Err(e) => {
                    warn!(name = %load.name, "No descriptor slot left for texture");
                    failure = Some(e);
                    break;
                }
            };

            match uploader.create_texture(&mut batch, &load.name, &load.source, slot) {
                Ok(resource) => {
                    debug!(name = %load.name, %slot, "Texture created");
                    self.entries.insert(
                        load.name.clone(),
                        TextureHandle {
                            name: load.name.clone(),
                            slot,
                            resource,
                        },
                    );
                    created.push(load);
                }
                Err(e) => {
                    self.range.rollback(slot);
                    warn!(name = %load.name, error = %e, "Texture creation failed, aborting batch");
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Err(e) = uploader.end_batch(batch) {
            // 批次未完成，本次创建的纹理都不可用
            for load in &created {
                self.entries.remove(&load.name);
            }
            self.range.truncate(mark);
            warn!(requeued = created.len(), error = %e, "Texture batch failed");
            for load in created.into_iter().rev() {
                self.pending.push_front(load);
            }
            return Err(e);
        }

        if let Some(e) = failure {
            return Err(e);
        }

        info!(loaded = created.len(), resident = self.entries.len(), "Texture batch resident");
        Ok(created.len())
    }

    /// 反复 flush 直到队列为空
    ///
    /// 单个纹理的创建失败只记录下来，回退纹理会代替它显示；
    /// 其他错误（设备丢失等）立即返回。
    /// 批次失败后队列没有缩短时重试一次，连续两次都没有进展则返回该错误。
    pub fn flush_all_loads<U>(&mut self, uploader: &mut U) -> Result<FlushReport>
    where
        U: TextureUploader<Resource = R>,
    {
        let before = self.entries.len();
        let mut failures = Vec::new();
        let mut stalled = false;

        while !self.pending.is_empty() {
            let queued = self.pending.len();
            match self.flush_loads(uploader) {
                Ok(_) => stalled = false,
                Err(e) if e.is_resource_creation() => {
                    if self.pending.len() < queued {
                        failures.push(e);
                        stalled = false;
                    } else if stalled {
                        return Err(e);
                    } else {
                        stalled = true;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        if !failures.is_empty() {
            warn!(failed = failures.len(), "Some textures failed to load, fallback will be used");
        }

        Ok(FlushReport {
            loaded: self.entries.len().saturating_sub(before),
            failures,
        })
    }

    /// 查找纹理
    ///
    /// 未命中时返回回退纹理；回退纹理本身未加载时返回 `None` 并记录警告。
    pub fn lookup(&self, name: &str) -> Option<&TextureHandle<R>> {
        self.entries.get(name).or_else(|| self.fallback_handle())
    }

    /// 回退纹理
    pub fn fallback_handle(&self) -> Option<&TextureHandle<R>> {
        let handle = self.entries.get(&self.fallback);
        if handle.is_none() {
            warn!(fallback = %self.fallback, "Fallback texture is not resident");
        }
        handle
    }

    /// 确认回退纹理已加载
    pub fn ensure_fallback(&self) -> Result<()> {
        if self.entries.contains_key(&self.fallback) {
            Ok(())
        } else {
            Err(EmteError::Initialization(format!(
                "Fallback texture '{}' must be loaded before first use",
                self.fallback
            )))
        }
    }

    /// 释放所有纹理并归还描述符槽位
    ///
    /// 设备丢失或关闭时调用，之后所有查找都退回到回退逻辑。
    pub fn release(&mut self) {
        info!(count = self.entries.len(), "Releasing texture registry");
        self.entries.clear();
        self.pending.clear();
        self.range.release();
    }

    /// 名字是否已加载（不考虑回退）
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// 已加载的纹理数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 待加载队列长度
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn fallback_name(&self) -> &str {
        &self.fallback
    }

    pub fn descriptor_range(&self) -> &DescriptorRange {
        &self.range
    }

    /// 按槽位顺序遍历已加载的纹理
    pub fn iter_by_slot(&self) -> impl Iterator<Item = &TextureHandle<R>> {
        let mut handles: Vec<_> = self.entries.values().collect();
        handles.sort_by_key(|h| h.slot);
        handles.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::{HeadlessTexture, HeadlessUploader};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_png(dir: &TempDir, name: &str, color: [u8; 4]) -> String {
        let path = dir.path().join(name);
        image::RgbaImage::from_pixel(2, 2, image::Rgba(color))
            .save(&path)
            .unwrap();
        path.to_string_lossy().into_owned()
    }

    fn write_garbage(dir: &TempDir, name: &str) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"DDS \x00\x01 definitely not a texture").unwrap();
        path.to_string_lossy().into_owned()
    }

    fn registry(capacity: u32) -> TextureRegistry<HeadlessTexture> {
        TextureRegistry::new(DescriptorRange::new(0, capacity), "default")
    }

    #[test]
    fn test_checkerboard() {
        let data = TextureData::checkerboard(4, 2, [255; 4], [0, 0, 0, 255]);
        assert_eq!(data.rgba.len(), 64);
        assert_eq!(&data.rgba[0..4], &[255; 4]);
        // (2, 0) 落在第二个格子
        assert_eq!(&data.rgba[8..12], &[0, 0, 0, 255]);
        // (2, 2) 又回到第一种颜色
        let idx = (2 * 4 + 2) * 4;
        assert_eq!(&data.rgba[idx..idx + 4], &[255; 4]);
    }

    #[test]
    fn test_texture_data_rejects_bad_length() {
        assert!(TextureData::new(2, 2, vec![0; 15]).is_err());
        assert!(TextureData::new(0, 2, vec![]).is_err());
        assert!(TextureData::new(1, 1, vec![0; 4]).is_ok());
    }

    #[test]
    fn test_decode_missing_file() {
        let err = decode_texture_file(Path::new("does/not/exist.dds")).unwrap_err();
        assert!(matches!(err, EmteError::Texture(TextureError::NotFound(_))));
    }

    #[test]
    fn test_decode_png() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "red.png", [255, 0, 0, 255]);

        let data = decode_texture_file(Path::new(&path)).unwrap();
        assert_eq!((data.width, data.height), (2, 2));
        assert_eq!(&data.rgba[0..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_duplicates_collapse_in_first_seen_order() {
        let dir = TempDir::new().unwrap();
        let a = write_png(&dir, "a.png", [1, 2, 3, 255]);
        let b = write_png(&dir, "b.png", [4, 5, 6, 255]);

        let mut uploader = HeadlessUploader::new();
        let mut registry = registry(8);
        registry.queue_load(&a);
        registry.queue_load(&b);
        registry.queue_load(&a);

        assert_eq!(registry.flush_loads(&mut uploader).unwrap(), 2);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.pending_len(), 0);
        assert!(registry.contains(&a) && registry.contains(&b));

        let slot_a = registry.lookup(&a).unwrap().slot();
        let slot_b = registry.lookup(&b).unwrap().slot();
        assert!(slot_a < slot_b);
        assert_eq!(uploader.batches_ended(), 1);
    }

    #[test]
    fn test_slots_are_stable_across_flushes() {
        let mut uploader = HeadlessUploader::new();
        let mut registry = registry(8);

        registry.queue_pixels("first", TextureData::solid(1, 1, [0; 4]));
        registry.flush_loads(&mut uploader).unwrap();
        let slot = registry.lookup("first").unwrap().slot();

        registry.queue_pixels("first", TextureData::solid(2, 2, [9; 4]));
        registry.queue_pixels("second", TextureData::solid(1, 1, [1; 4]));
        assert_eq!(registry.flush_loads(&mut uploader).unwrap(), 1);

        assert_eq!(registry.lookup("first").unwrap().slot(), slot);
        assert_eq!(registry.lookup("first").unwrap().resource().width, 1);
        assert!(registry.lookup("second").unwrap().slot() > slot);
    }

    #[test]
    fn test_flush_with_nothing_new_skips_batch() {
        let mut uploader = HeadlessUploader::new();
        let mut registry = registry(4);
        registry.queue_pixels("default", TextureData::solid(1, 1, [0; 4]));
        registry.flush_loads(&mut uploader).unwrap();

        registry.queue_pixels("default", TextureData::solid(1, 1, [0; 4]));
        assert_eq!(registry.flush_loads(&mut uploader).unwrap(), 0);
        assert_eq!(uploader.batches_ended(), 1);
    }

    #[test]
    fn test_lookup_miss_returns_same_fallback() {
        let mut uploader = HeadlessUploader::new();
        let mut registry = registry(4);
        registry.queue_pixels("default", TextureData::checkerboard(8, 4, [255; 4], [0; 4]));
        registry.flush_loads(&mut uploader).unwrap();

        let first = registry.lookup("never-queued.dds").unwrap();
        let second = registry.lookup("never-queued.dds").unwrap();
        assert_eq!(first.name(), "default");
        assert_eq!(first.slot(), second.slot());
        assert!(registry.ensure_fallback().is_ok());
    }

    #[test]
    fn test_lookup_without_fallback_is_none() {
        let registry = registry(4);
        assert!(registry.lookup("anything").is_none());
        assert!(matches!(
            registry.ensure_fallback(),
            Err(EmteError::Initialization(_))
        ));
    }

    #[test]
    fn test_failure_keeps_earlier_entries_and_requeues_later() {
        let dir = TempDir::new().unwrap();
        let one = write_png(&dir, "one.png", [1; 4]);
        let two = write_png(&dir, "two.png", [2; 4]);
        let bad = write_garbage(&dir, "bad.dds");
        let three = write_png(&dir, "three.png", [3; 4]);

        let mut uploader = HeadlessUploader::new();
        let mut registry = registry(8);
        registry.queue_pixels("default", TextureData::solid(1, 1, [0; 4]));
        for name in [&one, &two, &bad, &three] {
            registry.queue_load(name.as_str());
        }

        let err = registry.flush_loads(&mut uploader).unwrap_err();
        assert!(err.is_resource_creation());

        // 失败之前的纹理可用，且批次已结束
        assert!(registry.contains(&one) && registry.contains(&two));
        assert_eq!(uploader.batches_ended(), 1);
        assert_eq!(registry.lookup(&bad).unwrap().name(), "default");

        // 失败纹理的槽位被撤销，之后的请求仍在队列中
        assert_eq!(registry.descriptor_range().allocated_count(), 3);
        assert_eq!(registry.pending_len(), 1);

        assert_eq!(registry.flush_loads(&mut uploader).unwrap(), 1);
        assert_eq!(registry.lookup(&three).unwrap().slot().index(), 3);
    }

    #[test]
    fn test_end_batch_failure_discards_batch() {
        let mut uploader = HeadlessUploader::new();
        let mut registry = registry(4);
        registry.queue_pixels("default", TextureData::solid(1, 1, [0; 4]));
        registry.flush_loads(&mut uploader).unwrap();

        uploader.fail_next_batch();
        registry.queue_pixels("late", TextureData::solid(1, 1, [0; 4]));
        registry.queue_pixels("later", TextureData::solid(1, 1, [0; 4]));
        assert!(registry.flush_loads(&mut uploader).is_err());

        assert!(!registry.contains("late"));
        assert_eq!(registry.descriptor_range().allocated_count(), 1);

        // 撤销的请求按原顺序回到队列
        assert_eq!(registry.pending_len(), 2);
        assert_eq!(registry.flush_loads(&mut uploader).unwrap(), 2);
        let late = registry.lookup("late").unwrap().slot();
        let later = registry.lookup("later").unwrap().slot();
        assert_eq!(late.index() + 1, later.index());
        assert_eq!(uploader.descriptor(late), Some("late"));
    }

    #[test]
    fn test_flush_all_retries_failed_batch() {
        let mut uploader = HeadlessUploader::new();
        let mut registry = registry(4);
        registry.queue_pixels("default", TextureData::solid(1, 1, [0; 4]));
        registry.queue_pixels("rocks", TextureData::solid(2, 2, [0; 4]));

        uploader.fail_next_batch();
        let report = registry.flush_all_loads(&mut uploader).unwrap();

        assert_eq!(report.loaded, 2);
        assert!(report.failures.is_empty());
        assert_eq!(registry.pending_len(), 0);
    }

    #[test]
    fn test_descriptor_exhaustion() {
        let mut uploader = HeadlessUploader::new();
        let mut registry = registry(1);
        registry.queue_pixels("default", TextureData::solid(1, 1, [0; 4]));
        registry.queue_pixels("overflow", TextureData::solid(1, 1, [0; 4]));

        let err = registry.flush_loads(&mut uploader).unwrap_err();
        assert!(err.is_resource_creation());
        assert!(registry.contains("default"));
        assert!(!registry.contains("overflow"));
    }

    #[test]
    fn test_release_invalidates_handles() {
        let mut uploader = HeadlessUploader::new();
        let mut registry = registry(4);
        registry.queue_pixels("default", TextureData::solid(1, 1, [0; 4]));
        registry.queue_pixels("sprite", TextureData::solid(1, 1, [7; 4]));
        registry.flush_loads(&mut uploader).unwrap();
        assert_eq!(registry.lookup("sprite").unwrap().name(), "sprite");

        registry.release();
        assert!(registry.is_empty());
        assert_eq!(registry.descriptor_range().allocated_count(), 0);
        assert!(registry.lookup("sprite").is_none());

        // 重新加载回退纹理后，旧名字解析为回退纹理
        registry.queue_pixels("default", TextureData::solid(1, 1, [0; 4]));
        registry.flush_loads(&mut uploader).unwrap();
        assert_eq!(registry.lookup("sprite").unwrap().name(), "default");
    }

    #[test]
    fn test_iter_by_slot() {
        let mut uploader = HeadlessUploader::new();
        let mut registry = registry(4);
        for name in ["c", "a", "b"] {
            registry.queue_pixels(name, TextureData::solid(1, 1, [0; 4]));
        }
        registry.flush_loads(&mut uploader).unwrap();

        let names: Vec<_> = registry.iter_by_slot().map(|h| h.name().to_string()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
