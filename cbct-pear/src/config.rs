//! 数据集配置.
//!
//! 配置文件为 TOML 格式. 所有字段都有默认值, 缺省的字段取默认值,
//! 未知字段视为错误.
//!
//! ```toml
//! root = "/data/cbct2ct"
//! hounsfield_units_range = [-1024, 2048]
//! patch_size = [32, 32, 32]
//! focal_region_proportion = 0.2
//! pad = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use serde::Deserialize;

use crate::consts::{self, hu};
use crate::error::{FatalError, IoError};
use crate::sampler::StochasticFocalPatchSampler;
use crate::{HuWindow, Idx3d};

/// 体数据小于 patch 时的处理策略.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SizePolicy {
    /// 用空气 HU 值填充.
    Pad,

    /// 从同一病例的其他文件中挑选替换者.
    Replace,
}

/// 数据集配置.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    /// 数据集根目录. 每个子目录是一个病例.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// 截断与归一化使用的 HU 范围 `[min, max]`.
    #[serde(default = "default_hu_range")]
    pub hounsfield_units_range: (f32, f32),

    /// patch 大小 `(z, y, x)`.
    #[serde(default = "default_patch_size")]
    pub patch_size: Idx3d,

    /// 聚焦区域比例, 取值 `[0, 1]`.
    #[serde(default = "default_focal_region_proportion")]
    pub focal_region_proportion: f64,

    /// 是否将身体以外的体素替换为空气.
    #[serde(default = "yes")]
    pub enable_masking: bool,

    /// 是否裁剪到身体包围盒.
    #[serde(default = "yes")]
    pub enable_bounding: bool,

    /// 主模态 (CBCT) 的身体阈值.
    #[serde(default = "default_primary_threshold")]
    pub primary_mask_threshold: f32,

    /// 次模态 (CT) 的身体阈值.
    #[serde(default = "default_secondary_threshold")]
    pub secondary_mask_threshold: f32,

    /// `true` 时填充过小的体数据, 否则替换.
    #[serde(default = "yes")]
    pub pad: bool,

    /// 病例目录下主模态的子目录名.
    #[serde(default = "default_primary_dir")]
    pub primary_dir: String,

    /// 病例目录下次模态的子目录名.
    #[serde(default = "default_secondary_dir")]
    pub secondary_dir: String,

    /// 只保留文件名主干 (去掉扩展名) 等于该值的次模态文件. `None` 表示全部保留.
    #[serde(default = "default_secondary_stem")]
    pub secondary_stem: Option<String>,

    /// 可识别的文件扩展名, 不含前导 `.`.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// 读取主模态后加到每个体素上的偏移, 用于将灰度值转换为 HU.
    #[serde(default = "default_primary_hu_offset")]
    pub primary_hu_offset: f32,

    /// 随机数种子. 见 [`DatasetConfig::item_rng`].
    #[serde(default)]
    pub seed: u64,
}

fn yes() -> bool {
    true
}

fn default_root() -> PathBuf {
    crate::dataset::home_dataset_dir().unwrap_or_else(|| PathBuf::from("dataset"))
}

fn default_hu_range() -> (f32, f32) {
    (hu::DEFAULT_MIN, hu::DEFAULT_MAX)
}

fn default_patch_size() -> Idx3d {
    consts::DEFAULT_PATCH_SIZE
}

fn default_focal_region_proportion() -> f64 {
    consts::DEFAULT_FOCAL_REGION_PROPORTION
}

fn default_primary_threshold() -> f32 {
    hu::CBCT_MASK_THRESHOLD
}

fn default_secondary_threshold() -> f32 {
    hu::CT_MASK_THRESHOLD
}

fn default_primary_dir() -> String {
    "CBCT".to_owned()
}

fn default_secondary_dir() -> String {
    "CT".to_owned()
}

fn default_secondary_stem() -> Option<String> {
    Some("CT".to_owned())
}

fn default_extensions() -> Vec<String> {
    consts::DEFAULT_EXTENSIONS
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn default_primary_hu_offset() -> f32 {
    hu::CBCT_GRAY_OFFSET
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            hounsfield_units_range: default_hu_range(),
            patch_size: default_patch_size(),
            focal_region_proportion: default_focal_region_proportion(),
            enable_masking: true,
            enable_bounding: true,
            primary_mask_threshold: default_primary_threshold(),
            secondary_mask_threshold: default_secondary_threshold(),
            pad: true,
            primary_dir: default_primary_dir(),
            secondary_dir: default_secondary_dir(),
            secondary_stem: default_secondary_stem(),
            extensions: default_extensions(),
            primary_hu_offset: default_primary_hu_offset(),
            seed: 0,
        }
    }
}

impl DatasetConfig {
    /// 以 `root` 为根目录、其余字段取默认值创建配置.
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// 从 TOML 字符串解析并校验配置.
    pub fn from_toml_str(s: &str) -> Result<Self, FatalError> {
        let config: Self =
            toml::from_str(s).map_err(|e| FatalError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件读取并校验配置.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FatalError> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|source| IoError::Io {
            path: path.to_owned(),
            source,
        })?;
        log::debug!("读取配置文件 `{}`", path.display());
        Self::from_toml_str(&s)
    }

    /// 校验配置.
    ///
    /// HU 范围必须满足 `min < max` 且均为有限值, patch 每个分量必须为正,
    /// 聚焦区域比例必须在 `[0, 1]` 内, 扩展名列表不能为空.
    pub fn validate(&self) -> Result<(), FatalError> {
        let (lo, hi) = self.hounsfield_units_range;
        if HuWindow::new(lo, hi).is_none() {
            return Err(FatalError::InvalidConfig(format!(
                "HU 范围 [{lo}, {hi}] 非法"
            )));
        }
        let (z, y, x) = self.patch_size;
        if z == 0 || y == 0 || x == 0 {
            return Err(FatalError::InvalidConfig(format!(
                "patch 大小 {:?} 含有 0",
                self.patch_size
            )));
        }
        if !(0.0..=1.0).contains(&self.focal_region_proportion) {
            return Err(FatalError::InvalidConfig(format!(
                "聚焦区域比例 {} 不在 [0, 1] 内",
                self.focal_region_proportion
            )));
        }
        if self.extensions.is_empty() {
            return Err(FatalError::InvalidConfig("扩展名列表为空".to_owned()));
        }
        Ok(())
    }

    /// 尺寸守卫策略.
    #[inline]
    pub fn size_policy(&self) -> SizePolicy {
        if self.pad {
            SizePolicy::Pad
        } else {
            SizePolicy::Replace
        }
    }

    /// HU 窗口. 配置非法时返回 `Err`.
    pub fn window(&self) -> Result<HuWindow, FatalError> {
        let (lo, hi) = self.hounsfield_units_range;
        HuWindow::new(lo, hi)
            .ok_or_else(|| FatalError::InvalidConfig(format!("HU 范围 [{lo}, {hi}] 非法")))
    }

    /// patch 采样器. 配置非法时返回 `Err`.
    pub fn sampler(&self) -> Result<StochasticFocalPatchSampler, FatalError> {
        StochasticFocalPatchSampler::new(self.patch_size, self.focal_region_proportion).ok_or_else(
            || {
                FatalError::InvalidConfig(format!(
                    "patch 大小 {:?} 或聚焦区域比例 {} 非法",
                    self.patch_size, self.focal_region_proportion
                ))
            },
        )
    }

    /// 以 `seed` 为基础种子, 为第 `stream` 个样本 (或 worker) 派生随机数生成器.
    #[inline]
    pub fn item_rng(&self, stream: u64) -> StdRng {
        crate::dataset::item_rng(self.seed, stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_empty_toml_is_default() {
        let c = DatasetConfig::from_toml_str("").unwrap();
        let d = DatasetConfig::default();
        assert_eq!(c, d);
        assert_eq!(c.hounsfield_units_range, (-1024.0, 2048.0));
        assert_eq!(c.patch_size, (32, 32, 32));
        assert_eq!(c.focal_region_proportion, 0.2);
        assert_eq!(c.primary_mask_threshold, -700.0);
        assert_eq!(c.secondary_mask_threshold, -300.0);
        assert_eq!(c.size_policy(), SizePolicy::Pad);
        assert_eq!(c.secondary_stem.as_deref(), Some("CT"));
    }

    #[test]
    fn test_parse_fields() {
        let c = DatasetConfig::from_toml_str(
            r#"
            root = "/tmp/cbct"
            hounsfield_units_range = [-1000, 2000.5]
            patch_size = [16, 64, 64]
            focal_region_proportion = 0.5
            enable_masking = false
            pad = false
            secondary_stem = "planning"
            extensions = ["npy"]
            seed = 42
            "#,
        )
        .unwrap();
        assert_eq!(c.root, PathBuf::from("/tmp/cbct"));
        assert_eq!(c.hounsfield_units_range, (-1000.0, 2000.5));
        assert_eq!(c.patch_size, (16, 64, 64));
        assert!(!c.enable_masking);
        assert!(c.enable_bounding);
        assert_eq!(c.size_policy(), SizePolicy::Replace);
        assert_eq!(c.extensions, vec!["npy".to_owned()]);
        assert_eq!(c.seed, 42);
        assert_eq!(
            c.item_rng(3).gen::<u64>(),
            crate::dataset::item_rng(42, 3).gen::<u64>()
        );
        assert_eq!(c.sampler().unwrap().patch_size(), (16, 64, 64));
        assert_eq!(c.window().unwrap().width(), 3000.5);
    }

    #[test]
    fn test_reject_invalid() {
        for s in [
            "hounsfield_units_range = [100, -100]",
            "patch_size = [0, 32, 32]",
            "focal_region_proportion = 1.5",
            "extensions = []",
            "unknown_field = 1",
        ] {
            assert!(
                matches!(
                    DatasetConfig::from_toml_str(s),
                    Err(FatalError::InvalidConfig(_))
                ),
                "{s}"
            );
        }
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.toml");
        fs::write(&path, "focal_region_proportion = 0.0\n").unwrap();
        let c = DatasetConfig::from_file(&path).unwrap();
        assert_eq!(c.focal_region_proportion, 0.0);

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            DatasetConfig::from_file(missing),
            Err(FatalError::Io(IoError::Io { .. }))
        ));
    }
}
