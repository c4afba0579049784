//! 推理结果重建.
//!
//! 推理时体数据经过 FOV 截断、掩膜裁剪与 (可选的) 填充. 模型输出只覆盖裁剪后的区域,
//! 这里将其反归一化后写回原尺寸的画布中. 画布其余部分为空气 HU 值.
//!
//! 只还原掩膜裁剪与填充, 不还原 FOV 截断: 原尺寸指 FOV 截断 **之后** 的尺寸.

use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayView3, ArrayView4, Axis};

use crate::consts::hu::AIR;
use crate::error::FatalError;
use crate::transform::Padding;
use crate::{BoundingBox, Geometry, HuWindow, Idx3d, Volume, VolumeAttr, VoxelType};

/// 从读取到写回之间需要保留的全部信息. 由调用方持有.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionMetadata {
    source: PathBuf,
    size: Idx3d,
    geometry: Geometry,
    dtype: VoxelType,
    bbox: BoundingBox,
    padding: Padding,
}

impl ReconstructionMetadata {
    /// 由 FOV 截断后 (裁剪前) 的体数据、实际使用的裁剪框和填充记录创建元数据.
    ///
    /// `bbox` 必须位于 `volume` 内, 否则程序 panic.
    pub fn new<P: Into<PathBuf>>(
        source: P,
        volume: &Volume,
        bbox: BoundingBox,
        padding: Padding,
    ) -> Self {
        assert!(bbox.fits_in(volume.shape()), "裁剪框超出体数据范围");
        Self {
            source: source.into(),
            size: volume.shape(),
            geometry: *volume.geometry(),
            dtype: volume.dtype(),
            bbox,
            padding,
        }
    }

    /// 原始文件路径.
    #[inline]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// 原尺寸 `(z, y, x)`.
    #[inline]
    pub fn size(&self) -> Idx3d {
        self.size
    }

    /// 原点物理坐标.
    #[inline]
    pub fn origin(&self) -> [f64; 3] {
        self.geometry.origin()
    }

    /// 体素分辨率.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.geometry.spacing()
    }

    /// 方向余弦矩阵.
    #[inline]
    pub fn direction(&self) -> [[f64; 3]; 3] {
        self.geometry.direction()
    }

    /// 几何信息.
    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// 存储类型.
    #[inline]
    pub fn dtype(&self) -> VoxelType {
        self.dtype
    }

    /// 裁剪框.
    #[inline]
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// 填充记录.
    #[inline]
    pub fn padding(&self) -> Padding {
        self.padding
    }
}

/// 将已是 HU 值的 `data` 写回原尺寸画布.
///
/// `data` 应当是填充后的形状; 去除填充后必须与裁剪框形状一致.
pub fn reinsert(
    data: ArrayView3<'_, f32>,
    meta: &ReconstructionMetadata,
) -> Result<Volume, FatalError> {
    let padding = meta.padding();
    let (bz, by, bx) = padding.before();
    let (sz, sy, sx) = padding.shape();
    let (dz, dy, dx) = data.dim();
    if dz < bz + sz || dy < by + sy || dx < bx + sx {
        return Err(FatalError::ShapeMismatch {
            got: data.dim(),
            bbox: meta.bbox(),
        });
    }
    let data = padding.strip(data);
    if data.dim() != meta.bbox().shape() {
        return Err(FatalError::ShapeMismatch {
            got: data.dim(),
            bbox: meta.bbox(),
        });
    }

    let mut canvas = Array3::from_elem(meta.size(), AIR);
    meta.bbox().view_mut(&mut canvas).assign(&data);
    Ok(Volume::new(canvas, meta.geometry, meta.dtype))
}

/// 将模型输出 (`[1, z, y, x]`, 取值 `[-1, 1]`) 反归一化并重建为原尺寸体数据.
///
/// # 错误
///
/// - 通道数不为 1 时返回 [`FatalError::ChannelCount`];
/// - 去除填充后形状与裁剪框不一致时返回 [`FatalError::ShapeMismatch`].
pub fn reconstruct(
    tensor: ArrayView4<'_, f32>,
    meta: &ReconstructionMetadata,
    window: &HuWindow,
) -> Result<Volume, FatalError> {
    let channels = tensor.len_of(Axis(0));
    if channels != 1 {
        return Err(FatalError::ChannelCount(channels));
    }
    let hu = window.denormalize_array(&tensor.index_axis(Axis(0), 0));
    reinsert(hu.view(), meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::pad;

    fn ramp(shape: Idx3d) -> Array3<f32> {
        Array3::from_shape_fn(shape, |(z, y, x)| (z * 100 + y * 10 + x) as f32)
    }

    #[test]
    fn test_crop_then_reinsert_is_inverse() {
        let v = Volume::from_array(ramp((6, 7, 8)));
        let bbox = BoundingBox::new((1, 5, 2, 7, 0, 3), v.shape()).unwrap();
        let cropped = v.crop(&bbox);
        let meta = ReconstructionMetadata::new("a/b.nii", &v, bbox, Padding::none(bbox.shape()));

        let back = reinsert(cropped.data(), &meta).unwrap();
        assert_eq!(back.shape(), v.shape());
        for ((z, y, x), value) in back.data().indexed_iter() {
            let inside = (1..5).contains(&z) && (2..7).contains(&y) && x < 3;
            if inside {
                assert_eq!(*value, v[(z, y, x)]);
            } else {
                assert_eq!(*value, AIR);
            }
        }
        assert_eq!(back.geometry(), v.geometry());
    }

    #[test]
    fn test_reconstruct_strips_padding() {
        let v = Volume::from_array(ramp((4, 40, 40)));
        let bbox = BoundingBox::new((0, 4, 5, 35, 5, 35), v.shape()).unwrap();
        let cropped = v.crop(&bbox);
        let (padded, padding) = pad(cropped.data(), (8, 32, 32), AIR);
        assert_eq!(padded.dim(), (8, 32, 32));

        let window = HuWindow::new(-1024.0, 3072.0).unwrap();
        let tensor = window.normalize_array(&padded).insert_axis(Axis(0));
        let meta = ReconstructionMetadata::new("a/b.nii", &v, bbox, padding);
        let back = reconstruct(tensor.view(), &meta, &window).unwrap();

        assert_eq!(back.shape(), (4, 40, 40));
        assert!((back[(2, 10, 20)] - v[(2, 10, 20)]).abs() < 1e-2);
        assert_eq!(back[(2, 0, 0)], AIR);
    }

    #[test]
    fn test_shape_mismatch() {
        let v = Volume::from_array(ramp((4, 4, 4)));
        let bbox = BoundingBox::new((0, 2, 0, 2, 0, 2), v.shape()).unwrap();
        let meta = ReconstructionMetadata::new("a.nii", &v, bbox, Padding::none(bbox.shape()));
        let wrong = Array3::<f32>::zeros((3, 2, 2));
        assert!(matches!(
            reinsert(wrong.view(), &meta),
            Err(FatalError::ShapeMismatch { .. })
        ));
        let two_channels = ndarray::Array4::<f32>::zeros((2, 2, 2, 2));
        assert!(matches!(
            reconstruct(two_channels.view(), &meta, &HuWindow::default()),
            Err(FatalError::ChannelCount(2))
        ));
    }
}
