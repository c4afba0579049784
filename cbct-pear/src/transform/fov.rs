//! CBCT 视野 (FOV) 截断.
//!
//! 锥束 CT 重建后, 有效视野之外的区域被填充为固定值 (一般是体数据的最小值).
//! 这里逐层找出有效内容的矩形范围, 再取所有有效层的并集作为裁剪框.

use ndarray::{ArrayView2, Axis};

use crate::consts::hu::FOV_TOLERANCE;
use crate::{BoundingBox, Volume, VolumeAttr};

/// 单层有效内容的 `(y_min, y_max, x_min, x_max)`, 左闭右开.
type Rect = (usize, usize, usize, usize);

/// 求单层切片中大于 `cutoff` 的体素的外接矩形. 不存在时返回 `None`.
fn slice_rect(slice: ArrayView2<'_, f32>, cutoff: f32) -> Option<Rect> {
    slice
        .indexed_iter()
        .filter(|(_, v)| **v > cutoff)
        .fold(None, |acc, ((y, x), _)| {
            Some(match acc {
                None => (y, y + 1, x, x + 1),
                Some((y0, y1, x0, x1)) => (y0.min(y), y1.max(y + 1), x0.min(x), x1.max(x + 1)),
            })
        })
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};

        fn slice_rects(volume: &Volume, cutoff: f32) -> Vec<Option<Rect>> {
            let data = volume.data();
            data.axis_iter(Axis(0))
                .into_par_iter()
                .map(|s| slice_rect(s, cutoff))
                .collect()
        }
    } else {
        fn slice_rects(volume: &Volume, cutoff: f32) -> Vec<Option<Rect>> {
            volume
                .data()
                .axis_iter(Axis(0))
                .map(|s| slice_rect(s, cutoff))
                .collect()
        }
    }
}

/// 计算 `volume` 的 FOV 裁剪框.
///
/// 填充值取体数据最小值, 高于它 `tolerance` 以上的体素视为有效内容.
/// 如果没有任何有效内容 (包括空体数据), 返回 `None`.
pub fn fov_bounding_box(volume: &Volume, tolerance: f32) -> Option<BoundingBox> {
    let fill = volume.min_value()?;
    let cutoff = fill + tolerance;

    let rects = slice_rects(volume, cutoff);
    let z_min = rects.iter().position(Option::is_some)?;
    let z_max = rects.iter().rposition(Option::is_some)? + 1;
    let (y0, y1, x0, x1) = rects
        .iter()
        .flatten()
        .copied()
        .reduce(|(a0, a1, b0, b1), (c0, c1, d0, d1)| {
            (a0.min(c0), a1.max(c1), b0.min(d0), b1.max(d1))
        })?;

    BoundingBox::new((z_min, z_max, y0, y1, x0, x1), volume.shape()).ok()
}

/// 将 `volume` 裁剪到有效视野.
///
/// 确定性操作. 如果找不到有效内容, 原样返回 (的副本).
pub fn truncate_fov(volume: &Volume) -> Volume {
    match fov_bounding_box(volume, FOV_TOLERANCE) {
        Some(bbox) if !bbox.is_full(volume.shape()) => {
            log::debug!("FOV 截断: {:?} -> {:?}", volume.shape(), bbox.shape());
            volume.crop(&bbox)
        }
        Some(_) => volume.clone(),
        None => {
            log::debug!("FOV 截断: 未发现有效内容, 保持原样");
            volume.clone()
        }
    }
}
