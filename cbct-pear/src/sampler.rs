//! 随机聚焦 patch 采样.
//!
//! 对每个轴独立地:
//!
//! 1. 合法起点范围为 `[0, r]`, 其中 `r = dim - patch_dim`;
//! 2. 聚焦区间是以 `r / 2` 为中心、长度为 `p * r` 的子区间;
//! 3. 从聚焦区间内的整数中均匀抽取起点.
//!
//! 这让 patch 偏向解剖结构中心, 减少对体数据边缘背景的过采样.
//! 两个体数据使用同一组起点, 因此两个 patch 在空间上严格对应.

use ndarray::{s, Array3, ArrayView3};
use rand::Rng;

use crate::Idx3d;

/// 空间上对应的一对 patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchPair {
    /// 来自第一个体数据的 patch.
    pub a: Array3<f32>,

    /// 来自第二个体数据的 patch.
    pub b: Array3<f32>,

    /// 两者共同的起点.
    pub offset: Idx3d,
}

/// 随机聚焦 patch 采样器.
///
/// 采样器本身不持有随机状态. 随机数生成器由调用方在每次采样时传入,
/// 以便并行 worker 各自使用独立的生成器.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StochasticFocalPatchSampler {
    patch_size: Idx3d,
    focal_region_proportion: f64,
}

/// 单轴的聚焦区间 `[lo, hi]` (整数, 闭区间).
///
/// 区间内没有整数时 (`r` 为奇数且 `p` 很小), 退化为中心起点 `r / 2`.
#[inline]
fn focal_range(dim: usize, patch: usize, p: f64) -> (usize, usize) {
    let r = dim - patch;
    let center = r as f64 / 2.0;
    let half = p * r as f64 / 2.0;
    let lo = (center - half).ceil().max(0.0) as usize;
    let hi = ((center + half).floor() as usize).min(r);
    if lo > hi {
        (r / 2, r / 2)
    } else {
        (lo, hi)
    }
}

impl StochasticFocalPatchSampler {
    /// 创建采样器.
    ///
    /// `patch_size` 的每个分量必须为正, `focal_region_proportion` 必须在 `[0, 1]` 内,
    /// 否则返回 `None`.
    pub fn new(patch_size: Idx3d, focal_region_proportion: f64) -> Option<Self> {
        let (z, y, x) = patch_size;
        (z > 0 && y > 0 && x > 0 && (0.0..=1.0).contains(&focal_region_proportion)).then_some(
            Self {
                patch_size,
                focal_region_proportion,
            },
        )
    }

    /// patch 大小.
    #[inline]
    pub fn patch_size(&self) -> Idx3d {
        self.patch_size
    }

    /// 聚焦区域比例.
    #[inline]
    pub fn focal_region_proportion(&self) -> f64 {
        self.focal_region_proportion
    }

    /// 形状为 `shape` 的体数据上, 各轴的聚焦区间 (整数闭区间).
    ///
    /// 任一轴 `shape` 小于 patch 大小时 panic.
    pub fn focal_window(&self, shape: Idx3d) -> [(usize, usize); 3] {
        self.assert_fits(shape);
        let p = self.focal_region_proportion;
        let (pz, py, px) = self.patch_size;
        [
            focal_range(shape.0, pz, p),
            focal_range(shape.1, py, p),
            focal_range(shape.2, px, p),
        ]
    }

    /// 在形状为 `shape` 的体数据上抽取一个起点.
    ///
    /// 任一轴 `shape` 小于 patch 大小时 panic: 尺寸守卫应当已经排除了这种情况.
    pub fn sample_offset<R: Rng>(&self, shape: Idx3d, rng: &mut R) -> Idx3d {
        let [(z0, z1), (y0, y1), (x0, x1)] = self.focal_window(shape);
        (
            rng.gen_range(z0..=z1),
            rng.gen_range(y0..=y1),
            rng.gen_range(x0..=x1),
        )
    }

    /// 在 `data` 的 `offset` 处裁剪出一个 patch.
    pub fn crop(&self, data: ArrayView3<'_, f32>, (z, y, x): Idx3d) -> Array3<f32> {
        let (pz, py, px) = self.patch_size;
        data.slice(s![z..z + pz, y..y + py, x..x + px]).to_owned()
    }

    /// 从形状相同的 `a`, `b` 中, 在同一位置各裁剪出一个 patch.
    ///
    /// # Panics
    ///
    /// `a` 与 `b` 形状不同, 或任一轴小于 patch 大小时 panic.
    pub fn patch_pair<R: Rng>(
        &self,
        a: ArrayView3<'_, f32>,
        b: ArrayView3<'_, f32>,
        rng: &mut R,
    ) -> PatchPair {
        assert_eq!(a.dim(), b.dim(), "两个体数据的形状必须一致");
        let offset = self.sample_offset(a.dim(), rng);
        PatchPair {
            a: self.crop(a, offset),
            b: self.crop(b, offset),
            offset,
        }
    }

    /// 从单个体数据中裁剪一个 patch.
    pub fn patch<R: Rng>(&self, data: ArrayView3<'_, f32>, rng: &mut R) -> (Array3<f32>, Idx3d) {
        let offset = self.sample_offset(data.dim(), rng);
        (self.crop(data, offset), offset)
    }

    /// 从形状可能不同的 `a`, `b` 中各裁剪一个 patch.
    ///
    /// 每个轴抽取一个相对位置 `u ∈ [0, 1]`, 映射到各自聚焦区间内的同一相对位置:
    /// `offset = lo + round(u * (hi - lo))`. 形状相同时两者起点相同, 与 [`patch_pair`]
    /// 的分布一致 (只是随机数的消耗方式不同).
    ///
    /// 任一体数据小于 patch 大小时 panic.
    ///
    /// [`patch_pair`]: Self::patch_pair
    pub fn relative_patch_pair<R: Rng>(
        &self,
        a: ArrayView3<'_, f32>,
        b: ArrayView3<'_, f32>,
        rng: &mut R,
    ) -> [(Array3<f32>, Idx3d); 2] {
        let wa = self.focal_window(a.dim());
        let wb = self.focal_window(b.dim());
        let u: [f64; 3] = [rng.gen(), rng.gen(), rng.gen()];
        let place = |w: [(usize, usize); 3]| {
            let at = |i: usize| {
                let (lo, hi) = w[i];
                lo + (u[i] * (hi - lo) as f64).round() as usize
            };
            (at(0), at(1), at(2))
        };
        let (oa, ob) = (place(wa), place(wb));
        [(self.crop(a, oa), oa), (self.crop(b, ob), ob)]
    }

    fn assert_fits(&self, shape: Idx3d) {
        assert!(
            !crate::data::is_smaller_than(shape, self.patch_size),
            "体数据形状 {shape:?} 小于 patch 大小 {:?}",
            self.patch_size
        );
    }
}
