//! 评估集.
//!
//! 每个病例取排序后的第一个 CBCT 和第一个计划 CT, 各自做身体掩膜与裁剪后整幅返回.

use ndarray::{Array4, Axis};

use super::catalog::Catalog;
use crate::config::DatasetConfig;
use crate::consts::Modality;
use crate::error::{FatalError, PipelineError};
use crate::transform::{apply_body_mask_and_bound, truncate_fov};
use crate::{ExtensionIo, HuWindow, Volume, VolumeIo};

/// 评估样本. 形状为 `[1, z, y, x]`, 两者形状一般不同.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalItem {
    /// 主模态 (CBCT).
    pub a: Array4<f32>,

    /// 次模态 (CT).
    pub b: Array4<f32>,
}

/// 评估集.
#[derive(Debug)]
pub struct EvalDataset<IO = ExtensionIo> {
    catalog: Catalog,
    config: DatasetConfig,
    window: HuWindow,
    io: IO,
}

impl EvalDataset<ExtensionIo> {
    /// 扫描 `config.root` 创建评估集.
    pub fn new(config: DatasetConfig) -> Result<Self, FatalError> {
        Self::with_io(config, ExtensionIo)
    }
}

impl<IO: VolumeIo> EvalDataset<IO> {
    /// 扫描 `config.root` 创建评估集, 使用 `io` 读取文件.
    pub fn with_io(config: DatasetConfig, io: IO) -> Result<Self, FatalError> {
        config.validate()?;
        let catalog = Catalog::scan(&config)?;
        Self::from_catalog(catalog, config, io)
    }

    /// 由已有的病例目录创建评估集.
    pub fn from_catalog(
        catalog: Catalog,
        config: DatasetConfig,
        io: IO,
    ) -> Result<Self, FatalError> {
        config.validate()?;
        Ok(Self {
            catalog,
            window: config.window()?,
            config,
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

    /// 读取第 `index` 个病例. `index` 越界时程序 panic.
    pub fn get(&self, index: usize) -> Result<EvalItem, PipelineError> {
        let Some((patient, case)) = self.catalog.get(index) else {
            panic!("索引 {index} 越界, 数据集共有 {} 个病例", self.len());
        };
        log::debug!("评估: 病例 `{patient}`");

        let primary = self
            .io
            .load(case.first(Modality::Primary))?
            .offset(self.config.primary_hu_offset);
        let primary = truncate_fov(&primary);
        let secondary = self.io.load(case.first(Modality::Secondary))?;

        let a = self.prepare(primary, self.config.primary_mask_threshold);
        let b = self.prepare(secondary, self.config.secondary_mask_threshold);
        Ok(EvalItem { a, b })
    }

    fn prepare(&self, volume: Volume, threshold: f32) -> Array4<f32> {
        let volume = match apply_body_mask_and_bound(
            &volume,
            self.config.enable_masking,
            self.config.enable_bounding,
            threshold,
        ) {
            Ok((v, _)) => v,
            Err(e) => {
                log::error!("施加身体掩膜失败: {e}");
                volume
            }
        };
        self.window
            .normalize_array(&volume.data())
            .insert_axis(Axis(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Case;
    use crate::MemoryIo;
    use ndarray::{s, Array3};
    use std::path::PathBuf;

    #[test]
    fn test_first_files_are_used() {
        let io = MemoryIo::new();
        let mut cbct = Array3::from_elem((10, 10, 10), 0.0f32);
        cbct.slice_mut(s![2..8, 2..8, 2..8]).fill(1064.0);
        io.insert("p/CBCT/0.nii", Volume::from_array(cbct));
        io.insert("p/CBCT/1.nii", Volume::from_array(Array3::zeros((3, 3, 3))));
        let mut ct = Array3::from_elem((12, 12, 12), -1024.0f32);
        ct.slice_mut(s![1..11, 1..11, 1..11]).fill(40.0);
        io.insert("p/CT/CT.nii", Volume::from_array(ct));

        let case = Case::new(
            vec![PathBuf::from("p/CBCT/1.nii"), PathBuf::from("p/CBCT/0.nii")],
            vec![PathBuf::from("p/CT/CT.nii")],
        )
        .unwrap();
        let catalog = Catalog::from_cases("", [("p".to_owned(), case)]).unwrap();
        let ds = EvalDataset::from_catalog(catalog, DatasetConfig::with_root(""), io).unwrap();

        let item = ds.get(0).unwrap();
        assert_eq!(item.a.dim(), (1, 6, 6, 6));
        assert_eq!(item.b.dim(), (1, 10, 10, 10));
        // 40 HU 在默认窗口 [-1024, 2048] 下的归一化值.
        let expect = 2.0 * (40.0 + 1024.0) / 3072.0 - 1.0;
        assert!(item.b.iter().all(|v| (v - expect).abs() < 1e-5));
    }
}
