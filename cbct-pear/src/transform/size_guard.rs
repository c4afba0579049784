//! 尺寸守卫.
//!
//! 保证体数据在每个轴上都不小于 patch 大小. 两种策略二选一:
//!
//! 1. 填充 ([`pad`], [`pad_volume`]): 用空气 HU 值补齐不足的轴, 并记录偏移以便重建时还原;
//! 2. 替换 ([`replace_if_undersized`]): 从同一病例的其他候选文件中随机挑选足够大的体数据.

use std::path::{Path, PathBuf};

use ndarray::{s, Array3, ArrayView3};
use rand::Rng;

use crate::consts::hu::AIR;
use crate::data::is_smaller_than;
use crate::error::FatalError;
use crate::{Idx3d, Volume, VolumeAttr, VolumeIo};

/// 填充记录.
///
/// `before` 是原数据在填充后数组中的起点, `shape` 是原数据 (填充前) 的形状,
/// `after` 是各轴末尾补上的体素数.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Padding {
    before: Idx3d,
    shape: Idx3d,
    after: Idx3d,
}

impl Padding {
    /// 不做任何填充时的记录.
    #[inline]
    pub const fn none(shape: Idx3d) -> Self {
        Self {
            before: (0, 0, 0),
            shape,
            after: (0, 0, 0),
        }
    }

    /// 原数据在填充后数组中的起点.
    #[inline]
    pub fn before(&self) -> Idx3d {
        self.before
    }

    /// 填充前的形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 各轴末尾补上的体素数.
    #[inline]
    pub fn after(&self) -> Idx3d {
        self.after
    }

    /// 填充后的形状.
    #[inline]
    pub fn padded_shape(&self) -> Idx3d {
        let (bz, by, bx) = self.before;
        let (z, y, x) = self.shape;
        let (az, ay, ax) = self.after;
        (bz + z + az, by + y + ay, bx + x + ax)
    }

    /// 是否未做任何填充, 即填充前后形状相同.
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.padded_shape() == self.shape
    }

    /// 去除填充, 得到原数据所在区域的视图.
    ///
    /// `data` 小于 `before + shape` 时 panic.
    pub fn strip<'a>(&self, data: ArrayView3<'a, f32>) -> ArrayView3<'a, f32> {
        let (z, y, x) = self.before;
        let (dz, dy, dx) = self.shape;
        data.slice_move(s![z..z + dz, y..y + dy, x..x + dx])
    }
}

/// 单轴填充量: `(before, after)`. 不足部分对半分, 多出的一个体素放在后面.
#[inline]
fn split_deficit(dim: usize, patch: usize) -> (usize, usize) {
    let deficit = patch.saturating_sub(dim);
    let before = deficit / 2;
    (before, deficit - before)
}

/// 用 `fill` 填充 `data`, 使其每个轴都不小于 `patch`.
///
/// 已经足够大的轴保持不变. 返回填充后的数组和填充记录.
pub fn pad(data: ArrayView3<'_, f32>, patch: Idx3d, fill: f32) -> (Array3<f32>, Padding) {
    let (z, y, x) = data.dim();
    let (bz, az) = split_deficit(z, patch.0);
    let (by, ay) = split_deficit(y, patch.1);
    let (bx, ax) = split_deficit(x, patch.2);
    let padding = Padding {
        before: (bz, by, bx),
        shape: (z, y, x),
        after: (az, ay, ax),
    };

    if padding.is_trivial() {
        return (data.to_owned(), padding);
    }

    let mut out = Array3::from_elem(padding.padded_shape(), fill);
    out.slice_mut(s![bz..bz + z, by..by + y, bx..bx + x])
        .assign(&data);
    (out, padding)
}

/// 对体数据做 [`pad`] (以空气 HU 值填充), 原点随之向外移动.
pub fn pad_volume(volume: &Volume, patch: Idx3d) -> (Volume, Padding) {
    let (data, padding) = pad(volume.data(), patch, AIR);
    if padding.is_trivial() {
        return (volume.clone(), padding);
    }
    log::debug!("填充: {:?} -> {:?}", volume.shape(), data.dim());
    let geometry = volume.geometry().extended(padding.before());
    (Volume::new(data, geometry, volume.dtype()), padding)
}

/// 若 `volume` 小于 `patch`, 从 `candidates` 中随机挑选替换者, 直到找到足够大的体数据.
///
/// `original` 及已被拒绝的候选不会被重复挑选. 无法读取的候选会被记录并跳过.
/// 返回最终使用的体数据及其路径.
///
/// # 错误
///
/// 所有候选都不满足要求时, 返回 [`FatalError::NoValidReplacement`].
pub fn replace_if_undersized<IO, R>(
    volume: Volume,
    original: &Path,
    candidates: &[PathBuf],
    patch: Idx3d,
    io: &IO,
    rng: &mut R,
) -> Result<(Volume, PathBuf), FatalError>
where
    IO: VolumeIo + ?Sized,
    R: Rng,
{
    if !volume.is_smaller_than(patch) {
        return Ok((volume, original.to_owned()));
    }
    log::info!(
        "`{}` 的形状 {:?} 小于 patch 大小 {:?}, 尝试替换",
        original.display(),
        volume.shape(),
        patch
    );

    let mut pool: Vec<&PathBuf> = candidates
        .iter()
        .filter(|p| p.as_path() != original)
        .collect();
    while !pool.is_empty() {
        let path = pool.swap_remove(rng.gen_range(0..pool.len()));
        match io.load(path) {
            Ok(v) if !is_smaller_than(v.shape(), patch) => {
                log::info!("使用 `{}` 替换 `{}`", path.display(), original.display());
                return Ok((v, path.clone()));
            }
            Ok(v) => log::debug!("候选 `{}` 过小: {:?}", path.display(), v.shape()),
            Err(e) => log::warn!("跳过无法读取的候选: {e}"),
        }
    }

    Err(FatalError::NoValidReplacement {
        original: original.to_owned(),
        patch,
    })
}
