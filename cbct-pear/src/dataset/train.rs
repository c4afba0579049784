//! 训练集.
//!
//! 每个样本来自一个病例: 随机挑选一个 CBCT 和一个 CT, 经过 FOV 截断、范围配准、
//! 身体掩膜与裁剪、尺寸守卫后, 采样一对空间对应的 patch, 截断并归一化到 `[-1, 1]`.

use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::{Array3, Array4, Axis};
use rand::Rng;

use super::catalog::Catalog;
use super::item_rng;
use crate::config::{DatasetConfig, SizePolicy};
use crate::consts::hu::AIR;
use crate::consts::Modality;
use crate::error::{FatalError, PipelineError};
use crate::sampler::StochasticFocalPatchSampler;
use crate::transform::{
    apply_body_mask_and_bound, pad, replace_if_undersized, truncate_fov, truncate_to_scope,
};
use crate::{ExtensionIo, HuWindow, Volume, VolumeAttr, VolumeIo};

/// 训练样本. 两者形状均为 `[1, pz, py, px]`, 取值 `[-1, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainItem {
    /// 主模态 (CBCT) patch.
    pub a: Array4<f32>,

    /// 次模态 (CT) patch.
    pub b: Array4<f32>,
}

/// 训练集.
///
/// 本身不持有随机状态, 可以在多个 worker 间共享.
#[derive(Debug)]
pub struct TrainDataset<IO = ExtensionIo> {
    catalog: Catalog,
    config: DatasetConfig,
    window: HuWindow,
    sampler: StochasticFocalPatchSampler,
    io: IO,
}

impl TrainDataset<ExtensionIo> {
    /// 扫描 `config.root` 创建训练集, 按扩展名读取文件.
    pub fn new(config: DatasetConfig) -> Result<Self, FatalError> {
        Self::with_io(config, ExtensionIo)
    }
}

impl<IO: VolumeIo> TrainDataset<IO> {
    /// 扫描 `config.root` 创建训练集, 使用 `io` 读取文件.
    pub fn with_io(config: DatasetConfig, io: IO) -> Result<Self, FatalError> {
        config.validate()?;
        let catalog = Catalog::scan(&config)?;
        Self::from_catalog(catalog, config, io)
    }

    /// 由已有的病例目录创建训练集.
    pub fn from_catalog(
        catalog: Catalog,
        config: DatasetConfig,
        io: IO,
    ) -> Result<Self, FatalError> {
        config.validate()?;
        let window = config.window()?;
        let sampler = config.sampler()?;
        Ok(Self {
            catalog,
            config,
            window,
            sampler,
            io,
        })
    }

    /// 样本数, 即病例数.
    #[inline]
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// 病例目录.
    #[inline]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// 读取第 `index` 个病例的一个训练样本.
    ///
    /// # 注意
    ///
    /// 1. `index` 越界时程序 panic.
    /// 2. 身体掩膜失败只记录日志, 样本以未掩膜的形式继续处理.
    /// 3. 替换策略下, FOV 截断后仍小于 patch 的体数据返回 [`FatalError::VolumeTooSmall`].
    pub fn get<R: Rng>(&self, index: usize, rng: &mut R) -> Result<TrainItem, PipelineError> {
        let Some((patient, case)) = self.catalog.get(index) else {
            panic!("索引 {index} 越界, 数据集共有 {} 个病例", self.len());
        };
        let primaries = case.files(Modality::Primary);
        let secondaries = case.files(Modality::Secondary);
        let primary_path = &primaries[rng.gen_range(0..primaries.len())];
        let secondary_path = &secondaries[rng.gen_range(0..secondaries.len())];
        log::debug!(
            "病例 `{patient}`: `{}`, `{}`",
            primary_path.display(),
            secondary_path.display()
        );

        let policy = self.config.size_policy();
        let patch = self.sampler.patch_size();
        let mut primary = self.io.load(primary_path)?;
        let mut secondary = self.io.load(secondary_path)?;
        let (mut primary_path, mut secondary_path): (PathBuf, PathBuf) =
            (primary_path.clone(), secondary_path.clone());
        if policy == SizePolicy::Replace {
            (primary, primary_path) =
                replace_if_undersized(primary, &primary_path, primaries, patch, &self.io, rng)?;
            (secondary, secondary_path) =
                replace_if_undersized(
                    secondary,
                    &secondary_path,
                    secondaries,
                    patch,
                    &self.io,
                    rng,
                )?;
        }

        let primary = truncate_fov(&primary.offset(self.config.primary_hu_offset));
        if policy == SizePolicy::Replace {
            for v in [&primary, &secondary] {
                if v.is_smaller_than(patch) {
                    return Err(FatalError::VolumeTooSmall {
                        shape: v.shape(),
                        patch,
                    }
                    .into());
                }
            }
        }

        let registered = truncate_to_scope(&secondary, &primary);
        let secondary = if policy == SizePolicy::Replace && registered.is_smaller_than(patch) {
            log::info!(
                "`{}` 配准后的形状 {:?} 小于 patch 大小, 使用完整的体数据",
                secondary_path.display(),
                registered.shape()
            );
            secondary
        } else {
            registered
        };

        let primary =
            self.mask_and_bound(primary, &primary_path, self.config.primary_mask_threshold);
        let secondary =
            self.mask_and_bound(secondary, &secondary_path, self.config.secondary_mask_threshold);

        let (a, b) = match policy {
            SizePolicy::Pad => (
                pad(primary.data(), patch, AIR).0,
                pad(secondary.data(), patch, AIR).0,
            ),
            SizePolicy::Replace => (primary.into_data(), secondary.into_data()),
        };
        let (a, b) = self.patches(a, b, rng);

        Ok(TrainItem {
            a: self.window.normalize_array(&a).insert_axis(Axis(0)),
            b: self.window.normalize_array(&b).insert_axis(Axis(0)),
        })
    }

    /// 依次读取 `indices` 中的样本, 第 `i` 个样本使用 `item_rng(seed, i)`.
    pub fn items(
        &self,
        indices: Range<usize>,
        seed: u64,
    ) -> Vec<Result<TrainItem, PipelineError>> {
        indices
            .map(|i| self.get(i, &mut item_rng(seed, i as u64)))
            .collect()
    }

    /// 用配置中的种子读取第 `index` 个样本, 等价于 `items(index..index + 1, config.seed)`.
    pub fn get_seeded(&self, index: usize) -> Result<TrainItem, PipelineError> {
        self.get(index, &mut self.config.item_rng(index as u64))
    }

    /// 身体掩膜与裁剪. 失败时记录错误并原样返回.
    ///
    /// 替换策略下裁剪结果小于 patch 时, 只做掩膜不做裁剪.
    fn mask_and_bound(&self, volume: Volume, path: &Path, threshold: f32) -> Volume {
        let (mask, bound) = (self.config.enable_masking, self.config.enable_bounding);
        let patch = self.sampler.patch_size();
        match apply_body_mask_and_bound(&volume, mask, bound, threshold) {
            Ok((v, _))
                if self.config.size_policy() == SizePolicy::Replace && v.is_smaller_than(patch) =>
            {
                log::info!(
                    "`{}` 裁剪后的形状 {:?} 小于 patch 大小, 不做裁剪",
                    path.display(),
                    v.shape()
                );
                apply_body_mask_and_bound(&volume, mask, false, threshold)
                    .map(|(v, _)| v)
                    .unwrap_or(volume)
            }
            Ok((v, _)) => v,
            Err(e) => {
                log::error!("对 `{}` 施加身体掩膜失败: {e}", path.display());
                volume
            }
        }
    }

    /// 采样 patch 对. 形状相同时使用同一起点, 否则使用同一相对位置.
    fn patches<R: Rng>(
        &self,
        a: Array3<f32>,
        b: Array3<f32>,
        rng: &mut R,
    ) -> (Array3<f32>, Array3<f32>) {
        if a.dim() == b.dim() {
            let pair = self.sampler.patch_pair(a.view(), b.view(), rng);
            log::trace!("patch 起点 {:?}", pair.offset);
            (pair.a, pair.b)
        } else {
            let [(pa, oa), (pb, ob)] = self.sampler.relative_patch_pair(a.view(), b.view(), rng);
            log::trace!("patch 起点 {oa:?} / {ob:?}");
            (pa, pb)
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};

        impl<IO: VolumeIo> TrainDataset<IO> {
            /// [`items`](Self::items) 的并行版本. 结果与串行版本完全相同.
            pub fn par_items(
                &self,
                indices: Range<usize>,
                seed: u64,
            ) -> Vec<Result<TrainItem, PipelineError>> {
                indices
                    .into_par_iter()
                    .map(|i| self.get(i, &mut item_rng(seed, i as u64)))
                    .collect()
            }
        }
    }
}
