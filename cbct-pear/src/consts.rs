//! 通用常量.

/// HU 相关常量.
pub mod hu {
    /// 空气的 HU 值. 掩膜背景与重建画布都以此填充.
    pub const AIR: f32 = -1024.0;

    /// CBCT 原始灰度值到近似 HU 值的偏移量.
    pub const CBCT_GRAY_OFFSET: f32 = -1024.0;

    /// 默认的 HU 截断下限.
    pub const DEFAULT_MIN: f32 = -1024.0;

    /// 默认的 HU 截断上限.
    pub const DEFAULT_MAX: f32 = 2048.0;

    /// 默认的 CBCT 身体掩膜阈值.
    pub const CBCT_MASK_THRESHOLD: f32 = -700.0;

    /// 默认的 CT 身体掩膜阈值.
    pub const CT_MASK_THRESHOLD: f32 = -300.0;

    /// FOV 检测时, 高于填充值多少才认为是有效内容.
    pub const FOV_TOLERANCE: f32 = 1.0;

    /// 体素是否高于阈值 (即属于前景)?
    #[inline]
    pub fn is_foreground(value: f32, threshold: f32) -> bool {
        value > threshold
    }
}

/// 默认的 patch 大小, `(z, y, x)` 格式.
pub const DEFAULT_PATCH_SIZE: crate::Idx3d = (32, 32, 32);

/// 默认的聚焦区域比例.
pub const DEFAULT_FOCAL_REGION_PROPORTION: f64 = 0.2;

/// 默认接受的体数据文件扩展名.
pub const DEFAULT_EXTENSIONS: [&str; 3] = ["nii", "nii.gz", "npy"];

/// 数据集中两个模态的角色.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Modality {
    /// 主模态 (CBCT). 决定扫描范围.
    Primary,

    /// 次模态 (CT). 会被裁剪到主模态的范围内.
    Secondary,
}

impl Modality {
    /// 是否为主模态.
    #[inline]
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Primary)
    }

    /// 是否为次模态.
    #[inline]
    pub fn is_secondary(&self) -> bool {
        !self.is_primary()
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Secondary => f.write_str("secondary"),
        }
    }
}
