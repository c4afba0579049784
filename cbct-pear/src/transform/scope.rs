//! 跨模态范围配准.
//!
//! 两个体数据共享同一物理坐标系, 但分辨率可能不同. 将主体数据 (CBCT)
//! 的物理范围映射到次体数据 (CT) 的体素索引空间, 再裁剪次体数据.
//! 映射在物理空间中完成, 因此与两者的分辨率无关.
//!
//! 这不是真正的图像配准, 仅仅是包围盒对齐.

use itertools::iproduct;

use crate::{BoundingBox, Geometry, Idx3d, Volume, VolumeAttr};

/// 浮点误差容限, 以体素为单位. 恰好贴边的体素不计入重叠.
const EPS: f64 = 1e-6;

/// 计算次体数据中与主体数据物理范围重叠的体素裁剪框.
///
/// 主体数据的范围取其体素边缘 (索引 `-0.5` 到 `dim - 0.5`) 的 8 个角点.
/// 角点映射到次体数据的连续索引后, 取各轴的最小/最大值; 次体数据中凡与该区间
/// 有正长度重叠的体素都被保留. 结果被限制在次体数据范围内.
///
/// 任一轴没有重叠时返回 `None`.
pub fn scope_bounding_box(
    primary: &Geometry,
    primary_shape: Idx3d,
    secondary: &Geometry,
    secondary_shape: Idx3d,
) -> Option<BoundingBox> {
    let (pz, py, px) = primary_shape;
    let edges = |d: usize| [-0.5, d as f64 - 0.5];

    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for (z, y, x) in iproduct!(edges(pz), edges(py), edges(px)) {
        let p = primary.index_to_physical((z, y, x));
        let (a, b, c) = secondary.physical_to_index(p);
        for (i, v) in [a, b, c].into_iter().enumerate() {
            lo[i] = lo[i].min(v);
            hi[i] = hi[i].max(v);
        }
    }

    let dims = [secondary_shape.0, secondary_shape.1, secondary_shape.2];
    let mut range = [(0usize, 0usize); 3];
    for i in 0..3 {
        // 体素 j 覆盖 [j - 0.5, j + 0.5].
        let start = ((lo[i] - 0.5 + EPS).floor() + 1.0).max(0.0);
        let end = (hi[i] + 0.5 - EPS).ceil().min(dims[i] as f64);
        if !(start < end) {
            return None;
        }
        range[i] = (start as usize, end as usize);
    }

    let [(z0, z1), (y0, y1), (x0, x1)] = range;
    BoundingBox::new((z0, z1, y0, y1, x0, x1), secondary_shape).ok()
}

/// 将 `secondary` 裁剪到 `primary` 的物理范围.
///
/// 没有重叠时, 原样返回 `secondary`, 并记录警告: 这意味着两者的解剖结构可能严重错位.
pub fn truncate_to_scope(secondary: &Volume, primary: &Volume) -> Volume {
    match scope_bounding_box(
        primary.geometry(),
        primary.shape(),
        secondary.geometry(),
        secondary.shape(),
    ) {
        Some(bbox) if bbox.is_full(secondary.shape()) => secondary.clone(),
        Some(bbox) => {
            log::debug!("范围配准: {:?} -> {:?}", secondary.shape(), bbox.shape());
            secondary.crop(&bbox)
        }
        None => {
            log::warn!(
                "范围配准: 主体数据 {:?} 与次体数据 {:?} 没有物理重叠, 保留完整的次体数据",
                primary.shape(),
                secondary.shape()
            );
            secondary.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn volume(shape: Idx3d, origin: [f64; 3], spacing: [f64; 3]) -> Volume {
        let g = Geometry::axis_aligned(origin, spacing).unwrap();
        Volume::new(Array3::zeros(shape), g, crate::VoxelType::I16)
    }

    #[test]
    fn test_same_geometry_is_identity() {
        let a = volume((5, 6, 7), [1.0, 2.0, 3.0], [2.0, 1.0, 1.0]);
        let b = scope_bounding_box(a.geometry(), a.shape(), a.geometry(), a.shape()).unwrap();
        assert!(b.is_full(a.shape()));
    }

    #[test]
    fn test_different_spacing() {
        // CBCT: x 方向 10 个 2mm 体素, 中心 10..=28, 边缘 [9, 29].
        let cbct = volume((4, 4, 10), [10.0, 0.0, 0.0], [3.0, 1.0, 2.0]);
        // CT: x 方向 50 个 1mm 体素, 中心 0..=49.
        let ct = volume((20, 8, 50), [0.0, 0.0, -3.0], [1.0, 1.0, 1.0]);
        let b = scope_bounding_box(cbct.geometry(), cbct.shape(), ct.geometry(), ct.shape())
            .unwrap();
        // x: 中心 9..=29 的体素与 [9, 29] 有正长度重叠.
        assert_eq!(b.as_tuple().4, 9);
        assert_eq!(b.as_tuple().5, 30);
        // y: CBCT 边缘 [-0.5, 3.5] -> CT 体素 0..4.
        assert_eq!((b.as_tuple().2, b.as_tuple().3), (0, 4));
        // z: CBCT 边缘 [-1.5, 10.5], CT 原点 -3 -> 索引 [1.5, 13.5] -> 体素 2..=13.
        // 体素 1 只在边缘处接触, 不计入.
        assert_eq!((b.as_tuple().0, b.as_tuple().1), (2, 14));

        let t = truncate_to_scope(&ct, &cbct);
        assert_eq!(t.shape(), (12, 4, 21));
        assert_eq!(t.geometry().origin(), [9.0, 0.0, -1.0]);
    }

    #[test]
    fn test_clamped_to_secondary_extent() {
        let cbct = volume((10, 10, 10), [-5.0, -5.0, -5.0], [2.0, 2.0, 2.0]);
        let ct = volume((4, 4, 4), [0.0; 3], [1.0; 3]);
        let b = scope_bounding_box(cbct.geometry(), cbct.shape(), ct.geometry(), ct.shape())
            .unwrap();
        assert!(b.fits_in(ct.shape()));
        assert!(b.is_full(ct.shape()));
    }

    #[test]
    fn test_no_overlap_keeps_secondary() {
        let cbct = volume((4, 4, 4), [100.0, 100.0, 100.0], [1.0; 3]);
        let ct = volume((6, 6, 6), [0.0; 3], [1.0; 3]);
        assert!(
            scope_bounding_box(cbct.geometry(), cbct.shape(), ct.geometry(), ct.shape()).is_none()
        );
        assert_eq!(truncate_to_scope(&ct, &cbct), ct);
    }

    #[test]
    fn test_touching_edge_is_not_overlap() {
        // CBCT 右边缘 (x = 4.5) 恰好是 CT 体素 0 的左边缘.
        let cbct = volume((1, 1, 5), [0.0; 3], [1.0; 3]);
        let ct = volume((1, 1, 10), [5.0, 0.0, 0.0], [1.0; 3]);
        assert!(
            scope_bounding_box(cbct.geometry(), cbct.shape(), ct.geometry(), ct.shape()).is_none()
        );
    }
}
