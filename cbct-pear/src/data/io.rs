//! 体数据读写.
//!
//! 数据格式解析不属于本 crate 的核心职责, 所以这里只定义 [`VolumeIo`]
//! 接口, 并提供 nifti ([`NiftiIo`]) 和 npy ([`NpyIo`]) 两种实现.
//! [`ExtensionIo`] 按扩展名在两者之间分派, [`MemoryIo`] 将体数据保存在内存中.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::{Array3, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, NiftiType, ReaderOptions};

use super::{Geometry, Volume, VolumeAttr, VoxelType};
use crate::error::IoError;

/// 体数据读写接口.
///
/// 实现者必须是 `Sync` 的, 以便多个 worker 同时调用.
pub trait VolumeIo: Sync {
    /// 从 `path` 读取体数据.
    fn load(&self, path: &Path) -> Result<Volume, IoError>;

    /// 将 `volume` 写入 `path`. 父目录应当已经存在.
    fn write(&self, volume: &Volume, path: &Path) -> Result<(), IoError>;
}

/// 文件名是否以 `ext` 结尾 (不区分大小写, `ext` 不含前导 `.`).
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_ascii_lowercase().ends_with(&format!(".{}", ext.to_ascii_lowercase())))
        .unwrap_or(false)
}

/// nifti (`.nii`, `.nii.gz`) 格式读写器.
#[derive(Copy, Clone, Debug, Default)]
pub struct NiftiIo;

impl NiftiIo {
    fn nifti_err(path: &Path) -> impl FnOnce(nifti::NiftiError) -> IoError + '_ {
        move |source| IoError::Nifti {
            path: path.to_owned(),
            source,
        }
    }
}

/// 将 nifti 数据类型转换为 [`VoxelType`]. 不常见的类型按 `f32` 处理.
fn voxel_type_of(header: &NiftiHeader) -> VoxelType {
    match header.data_type() {
        Ok(NiftiType::Uint8) => VoxelType::U8,
        Ok(NiftiType::Int8) => VoxelType::I8,
        Ok(NiftiType::Uint16) => VoxelType::U16,
        Ok(NiftiType::Int16) => VoxelType::I16,
        Ok(NiftiType::Uint32) => VoxelType::U32,
        Ok(NiftiType::Int32) => VoxelType::I32,
        Ok(NiftiType::Float64) => VoxelType::F64,
        _ => VoxelType::F32,
    }
}

/// 从 nifti header 中解析几何信息.
///
/// 优先使用 sform, 其次 qform, 最后退化为仅使用 `pixdim` 的轴对齐几何.
/// nifti 的 `(i, j, k)` 轴对应数组的 `(x, y, z)` 轴.
fn geometry_of(header: &NiftiHeader) -> Geometry {
    let pix = |n: usize| {
        let v = header.pixdim[n + 1].abs() as f64;
        if v > 0.0 && v.is_finite() {
            v
        } else {
            1.0
        }
    };

    if header.sform_code > 0 {
        let rows = [header.srow_x, header.srow_y, header.srow_z];
        let mut spacing = [1.0; 3];
        let mut direction = [[0.0; 3]; 3];
        for c in 0..3 {
            let n = 2 - c;
            let norm = rows
                .iter()
                .map(|r| (r[n] as f64).powi(2))
                .sum::<f64>()
                .sqrt();
            if norm > 0.0 {
                spacing[c] = norm;
                for r in 0..3 {
                    direction[r][c] = rows[r][n] as f64 / norm;
                }
            } else {
                direction[n][c] = 1.0;
            }
        }
        let origin = [rows[0][3] as f64, rows[1][3] as f64, rows[2][3] as f64];
        if let Some(g) = Geometry::new(origin, spacing, direction) {
            return g;
        }
    }

    let spacing = [pix(2), pix(1), pix(0)];
    if header.qform_code > 0 {
        let (b, c, d) = (
            header.quatern_b as f64,
            header.quatern_c as f64,
            header.quatern_d as f64,
        );
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        // 列依次为 i, j, k 轴.
        let r = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b],
        ];
        let mut direction = [[0.0; 3]; 3];
        for (row, out) in r.iter().zip(direction.iter_mut()) {
            *out = [row[2] * qfac, row[1], row[0]];
        }
        let origin = [
            header.quatern_x as f64,
            header.quatern_y as f64,
            header.quatern_z as f64,
        ];
        if let Some(g) = Geometry::new(origin, spacing, direction) {
            return g;
        }
    }

    Geometry::axis_aligned([0.0; 3], spacing).unwrap_or_default()
}

/// 由几何信息构造写出用的 nifti header (sform 模式).
fn header_of(geometry: &Geometry) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    let spacing = geometry.spacing();
    let direction = geometry.direction();
    let origin = geometry.origin();

    let mut rows = [[0f32; 4]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        for c in 0..3 {
            row[2 - c] = (direction[r][c] * spacing[c]) as f32;
        }
        row[3] = origin[r] as f32;
    }
    [header.srow_x, header.srow_y, header.srow_z] = rows;
    header.sform_code = 1;
    header.qform_code = 0;

    let [_, pi, pj, pk, ..] = &mut header.pixdim;
    (*pi, *pj, *pk) = (spacing[2] as f32, spacing[1] as f32, spacing[0] as f32);
    header
}

/// 将 `f32` 四舍五入并饱和转换为 `T`.
#[inline]
fn saturate<T: num::Bounded + num::NumCast + num::ToPrimitive>(v: f32) -> T {
    let lo = T::min_value().to_f64().unwrap_or(f64::MIN);
    let hi = T::max_value().to_f64().unwrap_or(f64::MAX);
    let v = (v as f64).round().clamp(lo, hi);
    num::cast(v).unwrap_or_else(T::min_value)
}

impl VolumeIo for NiftiIo {
    fn load(&self, path: &Path) -> Result<Volume, IoError> {
        let obj = ReaderOptions::new()
            .read_file(path)
            .map_err(Self::nifti_err(path))?;
        let geometry = geometry_of(obj.header());
        let dtype = voxel_type_of(obj.header());

        let data = obj
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(Self::nifti_err(path))?;
        if data.ndim() != 3 {
            return Err(IoError::UnsupportedFormat(path.to_owned()));
        }

        // [x, y, z] -> [z, y, x].
        let data = data
            .permuted_axes([2, 1, 0].as_slice())
            .into_dimensionality::<Ix3>()
            .map_err(|_| IoError::UnsupportedFormat(path.to_owned()))?;
        let data = data.as_standard_layout().into_owned();

        log::debug!("读取 {:?}, 形状 {:?}, {:?}", path, data.dim(), dtype);
        Ok(Volume::new(data, geometry, dtype))
    }

    fn write(&self, volume: &Volume, path: &Path) -> Result<(), IoError> {
        let header = header_of(volume.geometry());
        // [z, y, x] -> [x, y, z].
        let data = volume.data().reversed_axes();
        let writer = WriterOptions::new(path).reference_header(&header);

        macro_rules! write_as {
            ($t: ty) => {
                writer.write_nifti(&data.mapv(saturate::<$t>))
            };
        }
        let res = match volume.dtype() {
            VoxelType::U8 => write_as!(u8),
            VoxelType::I8 => write_as!(i8),
            VoxelType::U16 => write_as!(u16),
            VoxelType::I16 => write_as!(i16),
            VoxelType::U32 => write_as!(u32),
            VoxelType::I32 => write_as!(i32),
            VoxelType::F32 => writer.write_nifti(&data),
            VoxelType::F64 => writer.write_nifti(&data.mapv(f64::from)),
        };
        res.map_err(Self::nifti_err(path))?;
        log::debug!("写入 {:?}, 形状 {:?}", path, volume.shape());
        Ok(())
    }
}

/// npy 格式读写器.
///
/// npy 文件不携带几何信息, 读取时使用默认几何信息. 数组按 `(z, y, x)` 存储.
#[derive(Copy, Clone, Debug, Default)]
pub struct NpyIo;

impl VolumeIo for NpyIo {
    fn load(&self, path: &Path) -> Result<Volume, IoError> {
        let data: Array3<f32> =
            ndarray_npy::read_npy(path).map_err(|source| IoError::ReadNpy {
                path: path.to_owned(),
                source,
            })?;
        Ok(Volume::from_array(data))
    }

    fn write(&self, volume: &Volume, path: &Path) -> Result<(), IoError> {
        ndarray_npy::write_npy(path, &volume.data()).map_err(|source| IoError::WriteNpy {
            path: path.to_owned(),
            source,
        })
    }
}

/// 按扩展名分派的读写器: `.nii`/`.nii.gz` 交给 [`NiftiIo`], `.npy` 交给 [`NpyIo`].
#[derive(Copy, Clone, Debug, Default)]
pub struct ExtensionIo;

impl ExtensionIo {
    fn pick(path: &Path) -> Result<&'static dyn VolumeIo, IoError> {
        if has_extension(path, "nii") || has_extension(path, "nii.gz") {
            Ok(&NiftiIo)
        } else if has_extension(path, "npy") {
            Ok(&NpyIo)
        } else {
            Err(IoError::UnsupportedFormat(path.to_owned()))
        }
    }
}

impl VolumeIo for ExtensionIo {
    fn load(&self, path: &Path) -> Result<Volume, IoError> {
        Self::pick(path)?.load(path)
    }

    fn write(&self, volume: &Volume, path: &Path) -> Result<(), IoError> {
        Self::pick(path)?.write(volume, path)
    }
}

/// 内存中的读写器. 常用于测试, 或缓存已经读取过的体数据.
#[derive(Debug, Default)]
pub struct MemoryIo {
    volumes: Mutex<HashMap<PathBuf, Volume>>,
}

impl MemoryIo {
    /// 创建空读写器.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入一个体数据, 返回被替换的旧值.
    pub fn insert<P: Into<PathBuf>>(&self, path: P, volume: Volume) -> Option<Volume> {
        self.lock().insert(path.into(), volume)
    }

    /// 取出 `path` 处的体数据副本.
    pub fn get(&self, path: &Path) -> Option<Volume> {
        self.lock().get(path).cloned()
    }

    /// 已保存的体数据个数.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// 是否为空.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Volume>> {
        // 中毒只说明另一个线程 panic 了, map 本身仍然完整.
        self.volumes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl VolumeIo for MemoryIo {
    fn load(&self, path: &Path) -> Result<Volume, IoError> {
        self.get(path).ok_or_else(|| IoError::Io {
            path: path.to_owned(),
            source: std::io::ErrorKind::NotFound.into(),
        })
    }

    fn write(&self, volume: &Volume, path: &Path) -> Result<(), IoError> {
        self.insert(path, volume.clone());
        Ok(())
    }
}
