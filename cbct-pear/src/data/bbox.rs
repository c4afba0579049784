//! 三维轴对齐裁剪框.

use ndarray::{s, ArrayBase, ArrayView3, ArrayViewMut3, Data, DataMut, Ix3};

use crate::Idx3d;

/// 三维轴对齐裁剪框, 每个轴均为左闭右开区间 `[min, max)`.
///
/// 该结构保证 `min <= max`. 是否位于某个体数据内部由构造方法检查.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct BoundingBox {
    z: (usize, usize),
    y: (usize, usize),
    x: (usize, usize),
}

/// `BoundingBox` 初始化错误.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InitBoxError {
    /// 某个轴上 `min > max`.
    Inverted,

    /// 裁剪框超出体数据范围.
    OutOfBound,
}

impl BoundingBox {
    /// 以 `(z_min, z_max, y_min, y_max, x_min, x_max)` 创建裁剪框,
    /// 并检查它是否位于形状为 `shape` 的体数据内.
    pub fn new(
        (z_min, z_max, y_min, y_max, x_min, x_max): (usize, usize, usize, usize, usize, usize),
        shape: Idx3d,
    ) -> Result<Self, InitBoxError> {
        if z_min > z_max || y_min > y_max || x_min > x_max {
            return Err(InitBoxError::Inverted);
        }
        if z_max > shape.0 || y_max > shape.1 || x_max > shape.2 {
            return Err(InitBoxError::OutOfBound);
        }
        Ok(Self {
            z: (z_min, z_max),
            y: (y_min, y_max),
            x: (x_min, x_max),
        })
    }

    /// 从起点 `start` 和大小 `size` 创建裁剪框, 并检查是否位于 `shape` 内.
    pub fn from_start_size(start: Idx3d, size: Idx3d, shape: Idx3d) -> Result<Self, InitBoxError> {
        let (z, y, x) = start;
        let (dz, dy, dx) = size;
        Self::new((z, z + dz, y, y + dy, x, x + dx), shape)
    }

    /// 覆盖整个 `shape` 的裁剪框.
    #[inline]
    pub const fn full((z, y, x): Idx3d) -> Self {
        Self {
            z: (0, z),
            y: (0, y),
            x: (0, x),
        }
    }

    /// 起点, 即 `(z_min, y_min, x_min)`.
    #[inline]
    pub fn start(&self) -> Idx3d {
        (self.z.0, self.y.0, self.x.0)
    }

    /// 终点 (不含), 即 `(z_max, y_max, x_max)`.
    #[inline]
    pub fn end(&self) -> Idx3d {
        (self.z.1, self.y.1, self.x.1)
    }

    /// 裁剪后的形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        (self.z.1 - self.z.0, self.y.1 - self.y.0, self.x.1 - self.x.0)
    }

    /// 六元组形式, `(z_min, z_max, y_min, y_max, x_min, x_max)`.
    #[inline]
    pub fn as_tuple(&self) -> (usize, usize, usize, usize, usize, usize) {
        (self.z.0, self.z.1, self.y.0, self.y.1, self.x.0, self.x.1)
    }

    /// 裁剪框是否不包含任何体素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        let (z, y, x) = self.shape();
        z == 0 || y == 0 || x == 0
    }

    /// 裁剪框是否覆盖了整个 `shape`.
    #[inline]
    pub fn is_full(&self, shape: Idx3d) -> bool {
        *self == Self::full(shape)
    }

    /// 裁剪框是否位于 `shape` 内.
    #[inline]
    pub fn fits_in(&self, (z, y, x): Idx3d) -> bool {
        self.z.1 <= z && self.y.1 <= y && self.x.1 <= x
    }

    /// 获取 `data` 在裁剪框内的视图.
    ///
    /// 裁剪框超出 `data` 范围时 panic.
    #[inline]
    pub fn view<'a, S, A>(&self, data: &'a ArrayBase<S, Ix3>) -> ArrayView3<'a, A>
    where
        S: Data<Elem = A>,
    {
        data.slice(s![self.z.0..self.z.1, self.y.0..self.y.1, self.x.0..self.x.1])
    }

    /// 获取 `data` 在裁剪框内的可变视图.
    ///
    /// 裁剪框超出 `data` 范围时 panic.
    #[inline]
    pub fn view_mut<'a, S, A>(&self, data: &'a mut ArrayBase<S, Ix3>) -> ArrayViewMut3<'a, A>
    where
        S: DataMut<Elem = A>,
    {
        data.slice_mut(s![self.z.0..self.z.1, self.y.0..self.y.1, self.x.0..self.x.1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_bbox_validation() {
        assert_eq!(
            BoundingBox::new((2, 1, 0, 1, 0, 1), (4, 4, 4)),
            Err(InitBoxError::Inverted)
        );
        assert_eq!(
            BoundingBox::new((0, 5, 0, 1, 0, 1), (4, 4, 4)),
            Err(InitBoxError::OutOfBound)
        );
        let b = BoundingBox::new((1, 3, 0, 4, 2, 2), (4, 4, 4)).unwrap();
        assert_eq!(b.shape(), (2, 4, 0));
        assert!(b.is_empty());
        assert!(BoundingBox::full((4, 4, 4)).is_full((4, 4, 4)));
    }

    #[test]
    fn test_bbox_view() {
        let data = Array3::from_shape_fn((4, 5, 6), |(z, y, x)| (z * 100 + y * 10 + x) as f32);
        let b = BoundingBox::from_start_size((1, 2, 3), (2, 2, 2), (4, 5, 6)).unwrap();
        let v = b.view(&data);
        assert_eq!(v.dim(), (2, 2, 2));
        assert_eq!(v[(0, 0, 0)], 123.0);
        assert_eq!(v[(1, 1, 1)], 234.0);
    }
}
