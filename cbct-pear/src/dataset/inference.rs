//! 推理集.
//!
//! 遍历所有病例的全部 CBCT. 每个样本是整幅归一化后的体数据及其重建元数据;
//! 模型输出通过 [`InferenceDataset::save`] 还原并写回到输出目录.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array4, ArrayView4, Axis};

use super::catalog::Catalog;
use crate::config::{DatasetConfig, SizePolicy};
use crate::consts::Modality;
use crate::error::{FatalError, IoError, PipelineError};
use crate::reconstruct::{reconstruct, ReconstructionMetadata};
use crate::transform::{apply_body_mask_and_bound, pad_volume, truncate_fov, Padding};
use crate::{BoundingBox, ExtensionIo, HuWindow, Volume, VolumeAttr, VolumeIo};

/// 推理集.
#[derive(Debug)]
pub struct InferenceDataset<IO = ExtensionIo> {
    root: PathBuf,
    paths: Vec<PathBuf>,
    config: DatasetConfig,
    window: HuWindow,
    io: IO,
}

impl InferenceDataset<ExtensionIo> {
    /// 扫描 `config.root` 创建推理集, 按扩展名读写文件.
    pub fn new(config: DatasetConfig) -> Result<Self, FatalError> {
        Self::with_io(config, ExtensionIo)
    }
}

impl<IO: VolumeIo> InferenceDataset<IO> {
    /// 扫描 `config.root` 创建推理集, 使用 `io` 读写文件.
    pub fn with_io(config: DatasetConfig, io: IO) -> Result<Self, FatalError> {
        config.validate()?;
        let catalog = Catalog::scan(&config)?;
        Self::from_catalog(&catalog, config, io)
    }

    /// 由已有的病例目录创建推理集.
    pub fn from_catalog(
        catalog: &Catalog,
        config: DatasetConfig,
        io: IO,
    ) -> Result<Self, FatalError> {
        config.validate()?;
        Ok(Self {
            root: catalog.root().to_owned(),
            paths: catalog.files(Modality::Primary).map(Path::to_owned).collect(),
            window: config.window()?,
            config,
            io,
        })
    }

    /// 样本数, 即所有病例的 CBCT 文件总数.
    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// 第 `index` 个样本的源文件.
    #[inline]
    pub fn path(&self, index: usize) -> Option<&Path> {
        self.paths.get(index).map(PathBuf::as_path)
    }

    /// 读取第 `index` 个样本: 形状为 `[1, z, y, x]` 的归一化体数据及其重建元数据.
    ///
    /// 只在填充策略下填充小于 patch 的体数据. 身体掩膜失败时记录日志,
    /// 以整幅体数据继续处理.
    ///
    /// `index` 越界时程序 panic.
    pub fn get(
        &self,
        index: usize,
    ) -> Result<(Array4<f32>, ReconstructionMetadata), PipelineError> {
        let path = &self.paths[index];
        log::debug!("推理: `{}`", path.display());

        let volume = self.io.load(path)?.offset(self.config.primary_hu_offset);
        let volume = truncate_fov(&volume);
        let (cropped, bbox) = self.mask_and_bound(&volume, path);

        let (cropped, padding) = match self.config.size_policy() {
            SizePolicy::Pad => pad_volume(&cropped, self.config.patch_size),
            SizePolicy::Replace => {
                let shape = cropped.shape();
                (cropped, Padding::none(shape))
            }
        };

        let meta = ReconstructionMetadata::new(path.clone(), &volume, bbox, padding);
        let tensor = self.window.normalize_array(&cropped.data()).insert_axis(Axis(0));
        Ok((tensor, meta))
    }

    /// 将模型输出还原为原尺寸体数据, 写入 `output_dir` 下与源文件相对路径相同的位置.
    ///
    /// 返回写入的路径.
    pub fn save<P: AsRef<Path>>(
        &self,
        tensor: ArrayView4<'_, f32>,
        meta: &ReconstructionMetadata,
        output_dir: P,
    ) -> Result<PathBuf, FatalError> {
        let volume = reconstruct(tensor, meta, &self.window)?;
        let relative = meta.source().strip_prefix(&self.root).unwrap_or_else(|_| {
            log::warn!(
                "`{}` 不在数据集根目录 `{}` 下, 仅使用文件名",
                meta.source().display(),
                self.root.display()
            );
            Path::new(meta.source().file_name().unwrap_or_default())
        });
        let out = output_dir.as_ref().join(relative);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|source| IoError::Io {
                path: parent.to_owned(),
                source,
            })?;
        }
        self.io.write(&volume, &out)?;
        log::info!("写入 `{}`", out.display());
        Ok(out)
    }

    fn mask_and_bound(&self, volume: &Volume, path: &Path) -> (Volume, BoundingBox) {
        apply_body_mask_and_bound(
            volume,
            self.config.enable_masking,
            self.config.enable_bounding,
            self.config.primary_mask_threshold,
        )
        .unwrap_or_else(|e| {
            log::error!("对 `{}` 施加身体掩膜失败: {e}", path.display());
            (volume.clone(), BoundingBox::full(volume.shape()))
        })
    }
}
