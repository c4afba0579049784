//! 运行时错误.
//!
//! 错误分为两类:
//!
//! 1. [`RecoverableError`]: 单个样本的局部问题. 调用方记录日志后继续处理该样本.
//! 2. [`FatalError`]: 结构性问题, 或继续运行会悄悄污染训练数据. 调用方应立即中止.
//!
//! [`PipelineError`] 是单个样本处理流程的错误总和.

use std::path::PathBuf;

use thiserror::Error;

use crate::{BoundingBox, Idx3d};

/// 体数据读写错误.
#[derive(Debug, Error)]
pub enum IoError {
    /// nifti 解析或写入错误.
    #[error("nifti 读写 `{path}` 失败: {source}")]
    Nifti {
        /// 出错文件.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: nifti::NiftiError,
    },

    /// npy 读取错误.
    #[error("npy 读取 `{path}` 失败: {source}")]
    ReadNpy {
        /// 出错文件.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: ndarray_npy::ReadNpyError,
    },

    /// npy 写入错误.
    #[error("npy 写入 `{path}` 失败: {source}")]
    WriteNpy {
        /// 出错文件.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: ndarray_npy::WriteNpyError,
    },

    /// 文件扩展名不被当前读写器支持.
    #[error("不支持的文件格式: `{0}`")]
    UnsupportedFormat(PathBuf),

    /// 其他底层 I/O 错误.
    #[error("I/O 错误 `{path}`: {source}")]
    Io {
        /// 出错文件.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },
}

/// 可恢复错误. 记录日志后, 样本以未处理的形式继续流转.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecoverableError {
    /// 体数据至少有一个维度长度为 0.
    #[error("退化的体数据, 形状为 {0:?}")]
    DegenerateVolume(Idx3d),

    /// 体数据包含 NaN 或 inf.
    #[error("体数据包含 {0} 个非有限值")]
    NonFiniteIntensity(usize),
}

/// 致命错误. 继续运行没有意义.
#[derive(Debug, Error)]
pub enum FatalError {
    /// 数据集根目录不存在或不是目录.
    #[error("数据集根目录无效: `{0}`")]
    InvalidRoot(PathBuf),

    /// 某病例缺少一个模态目录.
    #[error("病例 `{patient}` 缺少模态目录 `{dir}`")]
    MissingModality {
        /// 病例标识.
        patient: String,
        /// 期望存在的目录.
        dir: PathBuf,
    },

    /// 某病例的模态目录下没有任何可用文件.
    #[error("病例 `{patient}` 的目录 `{dir}` 下没有可用的体数据文件")]
    EmptyModality {
        /// 病例标识.
        patient: String,
        /// 被扫描的目录.
        dir: PathBuf,
    },

    /// 数据集为空.
    #[error("数据集 `{0}` 中没有任何病例")]
    EmptyDataset(PathBuf),

    /// 所有候选体数据都小于 patch 大小.
    #[error("`{original}` 小于 patch 大小 {patch:?}, 且找不到可替换的体数据")]
    NoValidReplacement {
        /// 最初选择的文件.
        original: PathBuf,
        /// patch 大小.
        patch: Idx3d,
    },

    /// 在不允许填充的情况下, 体数据小于 patch 大小.
    #[error("体数据形状 {shape:?} 小于 patch 大小 {patch:?}")]
    VolumeTooSmall {
        /// 体数据形状.
        shape: Idx3d,
        /// patch 大小.
        patch: Idx3d,
    },

    /// 重建时模型输出形状与裁剪框不一致.
    #[error("输出形状 {got:?} 与裁剪框 {bbox:?} 不一致")]
    ShapeMismatch {
        /// 实际输出形状 (去除填充后).
        got: Idx3d,
        /// 元数据中记录的裁剪框.
        bbox: BoundingBox,
    },

    /// 重建时模型输出的通道数不为 1.
    #[error("模型输出应当只有 1 个通道, 实际为 {0}")]
    ChannelCount(usize),

    /// 配置非法.
    #[error("配置非法: {0}")]
    InvalidConfig(String),

    /// 读写错误.
    #[error(transparent)]
    Io(#[from] IoError),
}

/// 单个样本处理流程中的错误.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 可恢复错误.
    #[error(transparent)]
    Recoverable(#[from] RecoverableError),

    /// 致命错误.
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl PipelineError {
    /// 是否为致命错误.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<IoError> for PipelineError {
    #[inline]
    fn from(e: IoError) -> Self {
        Self::Fatal(FatalError::Io(e))
    }
}

/// 本 crate 的通用 `Result`.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
