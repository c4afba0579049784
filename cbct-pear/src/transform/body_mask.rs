//! 身体掩膜与包围盒.
//!
//! 以单一 HU 阈值区分人体与背景空气. 不同模态的标定不同, 因此阈值按模态分别配置.

use ndarray::{Array3, ArrayView3, Zip};

use crate::consts::hu::{is_foreground, AIR};
use crate::error::RecoverableError;
use crate::{BoundingBox, Idx3d, Volume, VolumeAttr};

/// 身体掩膜及其紧致包围盒.
#[derive(Debug, Clone)]
pub struct BodyMask {
    mask: Array3<bool>,
    bbox: BoundingBox,
}

impl BodyMask {
    /// 掩膜. `true` 代表前景 (人体).
    #[inline]
    pub fn mask(&self) -> ArrayView3<'_, bool> {
        self.mask.view()
    }

    /// 前景体素的包围盒. 掩膜为空时为整个体数据.
    #[inline]
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// 前景体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|p| **p).count()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        fn threshold(data: ArrayView3<'_, f32>, t: f32) -> Array3<bool> {
            let mut mask = Array3::from_elem(data.dim(), false);
            Zip::from(&mut mask)
                .and(&data)
                .par_for_each(|m, &v| *m = is_foreground(v, t));
            mask
        }
    } else {
        fn threshold(data: ArrayView3<'_, f32>, t: f32) -> Array3<bool> {
            let mut mask = Array3::from_elem(data.dim(), false);
            Zip::from(&mut mask)
                .and(&data)
                .for_each(|m, &v| *m = is_foreground(v, t));
            mask
        }
    }
}

/// 掩膜中 `true` 体素的包围盒. 掩膜为空时返回 `None`.
fn mask_bound(mask: &Array3<bool>) -> Option<BoundingBox> {
    let ((z0, z1), (y0, y1), (x0, x1)) = mask
        .indexed_iter()
        .filter(|(_, m)| **m)
        .map(|((z, y, x), _)| ((z, z + 1), (y, y + 1), (x, x + 1)))
        .reduce(|(a, b, c), (d, e, f)| {
            (
                (a.0.min(d.0), a.1.max(d.1)),
                (b.0.min(e.0), b.1.max(e.1)),
                (c.0.min(f.0), c.1.max(f.1)),
            )
        })?;
    BoundingBox::new((z0, z1, y0, y1, x0, x1), mask.dim()).ok()
}

/// 检查体数据能否进行掩膜计算.
fn check_degenerate(data: ArrayView3<'_, f32>) -> Result<(), RecoverableError> {
    let shape: Idx3d = data.dim();
    if shape.0 == 0 || shape.1 == 0 || shape.2 == 0 {
        return Err(RecoverableError::DegenerateVolume(shape));
    }
    let bad = data.iter().filter(|v| !v.is_finite()).count();
    if bad != 0 {
        return Err(RecoverableError::NonFiniteIntensity(bad));
    }
    Ok(())
}

/// 计算身体掩膜 (`value > threshold`) 和包围盒.
///
/// # 返回值
///
/// - 体数据退化 (某轴长度为 0) 或含非有限值时, 返回 `Err`;
/// - 掩膜为空时, 包围盒退化为整个体数据;
/// - 其他情况返回紧致包围盒.
pub fn body_mask_and_bound(
    data: ArrayView3<'_, f32>,
    threshold_hu: f32,
) -> Result<BodyMask, RecoverableError> {
    check_degenerate(data)?;
    let mask = threshold(data, threshold_hu);
    let bbox = mask_bound(&mask).unwrap_or_else(|| {
        log::debug!("身体掩膜为空 (阈值 {threshold_hu}), 使用整个体数据");
        BoundingBox::full(data.dim())
    });
    Ok(BodyMask { mask, bbox })
}

/// 对 `volume` 施加身体掩膜和/或裁剪.
///
/// `apply_mask` 将掩膜外的体素替换为空气 HU 值; `apply_bound` 将体数据裁剪到包围盒.
/// 两者相互独立. 返回处理后的体数据和实际使用的裁剪框
/// (`apply_bound` 为 `false` 时是整个体数据).
pub fn apply_body_mask_and_bound(
    volume: &Volume,
    apply_mask: bool,
    apply_bound: bool,
    threshold_hu: f32,
) -> Result<(Volume, BoundingBox), RecoverableError> {
    if !apply_mask && !apply_bound {
        return Ok((volume.clone(), BoundingBox::full(volume.shape())));
    }
    let body = body_mask_and_bound(volume.data(), threshold_hu)?;

    let masked = if apply_mask {
        let mut data = volume.data().to_owned();
        Zip::from(&mut data)
            .and(&body.mask)
            .for_each(|v, &m| {
                if !m {
                    *v = AIR;
                }
            });
        volume.with_data(data)
    } else {
        volume.clone()
    };

    if apply_bound {
        let bbox = body.bbox();
        Ok((masked.crop(&bbox), bbox))
    } else {
        Ok((masked, BoundingBox::full(volume.shape())))
    }
}
