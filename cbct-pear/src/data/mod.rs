use std::ops::Index;

use ndarray::{Array3, ArrayView3};

use crate::{Idx3d, Idx3dF};

pub mod bbox;
pub mod io;
pub mod window;

pub use bbox::{BoundingBox, InitBoxError};
pub use io::{ExtensionIo, MemoryIo, NiftiIo, NpyIo, VolumeIo};
pub use window::HuWindow;

/// 体素在磁盘上的存储类型.
///
/// 内存中的体数据一律以 `f32` 表示, 该类型仅用于写回磁盘时恢复原格式.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum VoxelType {
    /// `u8`
    U8,
    /// `i8`
    I8,
    /// `u16`
    U16,
    /// `i16`, 最常见的 CT 存储格式.
    I16,
    /// `u32`
    U32,
    /// `i32`
    I32,
    /// `f32`
    F32,
    /// `f64`
    F64,
}

impl VoxelType {
    /// 该类型是否为整数类型.
    #[inline]
    pub fn is_integer(&self) -> bool {
        !matches!(self, Self::F32 | Self::F64)
    }
}

/// 体数据的物理空间几何信息.
///
/// - `origin`: 第 `(0, 0, 0)` 个体素中心的物理坐标, 按 `(x, y, z)` 排列, 单位毫米.
/// - `spacing`: 体素分辨率, 按数组轴 `(z, y, x)` 排列, 单位毫米.
/// - `direction`: 方向余弦矩阵. 第 `c` 列是数组第 `c` 轴在物理空间 `(x, y, z)`
///   中的单位向量.
///
/// 方向矩阵应当是正交的, 否则 [`Self::physical_to_index`] 的结果没有意义.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Geometry {
    origin: [f64; 3],
    spacing: [f64; 3],
    direction: [[f64; 3]; 3],
}

/// 数组轴 `(z, y, x)` 对应物理轴 `(z, y, x)` 的方向矩阵.
const IDENTITY_DIRECTION: [[f64; 3]; 3] = [[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]];

impl Default for Geometry {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            spacing: [1.0; 3],
            direction: IDENTITY_DIRECTION,
        }
    }
}

impl Geometry {
    /// 创建几何信息. 非正的分辨率被视为非法, 返回 `None`.
    pub fn new(origin: [f64; 3], spacing: [f64; 3], direction: [[f64; 3]; 3]) -> Option<Self> {
        spacing
            .iter()
            .all(|s| s.is_finite() && *s > 0.0)
            .then_some(Self {
                origin,
                spacing,
                direction,
            })
    }

    /// 轴对齐的几何信息. `spacing` 按 `(z, y, x)` 排列.
    #[inline]
    pub fn axis_aligned(origin: [f64; 3], spacing: [f64; 3]) -> Option<Self> {
        Self::new(origin, spacing, IDENTITY_DIRECTION)
    }

    /// 原点物理坐标 `(x, y, z)`.
    #[inline]
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// 体素分辨率 `(z, y, x)`.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// 方向余弦矩阵.
    #[inline]
    pub fn direction(&self) -> [[f64; 3]; 3] {
        self.direction
    }

    /// 连续体素索引 `(z, y, x)` 转物理坐标 `(x, y, z)`.
    pub fn index_to_physical(&self, idx: Idx3dF) -> [f64; 3] {
        let idx = [idx.0, idx.1, idx.2];
        let mut p = self.origin;
        for (r, row) in self.direction.iter().enumerate() {
            for c in 0..3 {
                p[r] += row[c] * self.spacing[c] * idx[c];
            }
        }
        p
    }

    /// 物理坐标 `(x, y, z)` 转连续体素索引 `(z, y, x)`. 要求方向矩阵正交.
    pub fn physical_to_index(&self, p: [f64; 3]) -> Idx3dF {
        let d = [
            p[0] - self.origin[0],
            p[1] - self.origin[1],
            p[2] - self.origin[2],
        ];
        let mut idx = [0.0; 3];
        for (c, v) in idx.iter_mut().enumerate() {
            let proj: f64 = (0..3).map(|r| self.direction[r][c] * d[r]).sum();
            *v = proj / self.spacing[c];
        }
        (idx[0], idx[1], idx[2])
    }

    /// 将原点移动到体素 `offset` 处后的几何信息. 裁剪体数据时使用.
    #[inline]
    pub fn shifted(&self, (z, y, x): Idx3d) -> Self {
        Self {
            origin: self.index_to_physical((z as f64, y as f64, x as f64)),
            ..*self
        }
    }

    /// 将原点向负方向移动 `before` 个体素后的几何信息. 填充体数据时使用.
    #[inline]
    pub fn extended(&self, (z, y, x): Idx3d) -> Self {
        Self {
            origin: self.index_to_physical((-(z as f64), -(y as f64), -(x as f64))),
            ..*self
        }
    }
}

/// 体数据共用属性和部分通用操作.
pub trait VolumeAttr {
    /// 获取几何信息.
    fn geometry(&self) -> &Geometry;

    /// 获取数据形状大小, `(z, y, x)`.
    fn shape(&self) -> Idx3d;

    /// 某个轴上是否小于 `patch`?
    #[inline]
    fn is_smaller_than(&self, patch: Idx3d) -> bool {
        is_smaller_than(self.shape(), patch)
    }
}

/// `shape` 是否在某个轴上小于 `patch`?
#[inline]
pub fn is_smaller_than((z, y, x): Idx3d, (pz, py, px): Idx3d) -> bool {
    z < pz || y < py || x < px
}

/// 3D 体数据. HU 值以 `f32` 保存, 数组按 `(z, y, x)` 排列.
///
/// 该结构对外是只读的. 所有变换都会产生新的 `Volume` 或裸数组.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
    geometry: Geometry,
    dtype: VoxelType,
}

impl VolumeAttr for Volume {
    #[inline]
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl Volume {
    /// 由数据、几何信息与存储类型创建体数据.
    #[inline]
    pub fn new(data: Array3<f32>, geometry: Geometry, dtype: VoxelType) -> Self {
        Self {
            data,
            geometry,
            dtype,
        }
    }

    /// 以默认几何信息 (原点为 0, 分辨率为 1mm, 轴对齐) 和 `f32` 存储类型创建体数据.
    #[inline]
    pub fn from_array(data: Array3<f32>) -> Self {
        Self::new(data, Geometry::default(), VoxelType::F32)
    }

    /// 存储类型.
    #[inline]
    pub fn dtype(&self) -> VoxelType {
        self.dtype
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 取出底层数组.
    #[inline]
    pub fn into_data(self) -> Array3<f32> {
        self.data
    }

    /// 拆分为底层数组、几何信息和存储类型.
    #[inline]
    pub fn into_parts(self) -> (Array3<f32>, Geometry, VoxelType) {
        (self.data, self.geometry, self.dtype)
    }

    /// 用 `data` 替换数据, 保留几何信息与存储类型.
    ///
    /// 仅当 `data` 与原数据在空间上一一对应时才有意义 (如逐体素映射).
    #[inline]
    pub fn with_data(&self, data: Array3<f32>) -> Self {
        Self::new(data, self.geometry, self.dtype)
    }

    /// 裁剪到 `bbox`, 原点随之移动.
    ///
    /// `bbox` 超出体数据范围时 panic.
    pub fn crop(&self, bbox: &BoundingBox) -> Self {
        Self::new(
            bbox.view(&self.data).to_owned(),
            self.geometry.shifted(bbox.start()),
            self.dtype,
        )
    }

    /// 对每个体素施加 `f`, 返回新的体数据.
    #[inline]
    pub fn map<F: FnMut(f32) -> f32>(&self, mut f: F) -> Self {
        self.with_data(self.data.mapv(|v| f(v)))
    }

    /// 所有体素加上 `delta`. 用于将 CBCT 灰度值转换为近似 HU 值.
    #[inline]
    pub fn offset(&self, delta: f32) -> Self {
        self.map(|v| v + delta)
    }

    /// 最小体素值. 空体数据返回 `None`.
    pub fn min_value(&self) -> Option<f32> {
        self.data.iter().copied().reduce(f32::min)
    }
}
