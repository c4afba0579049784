#![warn(missing_docs)]

//! CBCT/CT 配对 3D 体数据的几何预处理库.
//!
//! 为 CBCT -> CT 图像翻译模型准备成对的 3D 训练样本, 并在推理结束后把模型输出
//! 还原到原始坐标空间. 网络结构、训练循环与实验记录不属于本 crate.
//!
//! # 流程
//!
//! 训练:
//!
//! 读取 -> CBCT 灰度转 HU -> FOV 截断 (CBCT) -> 范围配准 (CT 对齐 CBCT)
//! -> 身体掩膜与裁剪 (两者) -> 尺寸守卫 -> 随机聚焦 patch 采样 -> 截断与归一化.
//!
//! 推理:
//!
//! 读取 -> CBCT 灰度转 HU -> FOV 截断 -> 身体掩膜与裁剪 -> 尺寸守卫 -> 归一化,
//! 同时输出 [`ReconstructionMetadata`]. 模型输出经 [`reconstruct`] 还原后写回磁盘.
//!
//! # 注意
//!
//! 1. 数组一律按 `(z, y, x)` 排列, 物理坐标一律按 `(x, y, z)` 排列.
//! 2. FOV 截断丢弃的内容不会在重建时恢复.
//! 3. 所有随机性都来自调用方传入的随机数生成器, 本 crate 不使用全局随机状态.
//!   多 worker 并行时请用 [`dataset::item_rng`] 为每个 worker 派生独立的生成器.
//! 4. 违反前置条件 (如对小于 patch 的体数据采样) 会直接 panic,
//!   其余错误通过 [`error::PipelineError`] 返回.
//!
//! # 模块
//!
//! - [`data`]: 体数据、几何信息、裁剪框、HU 窗口与读写接口.
//! - [`transform`]: FOV 截断、范围配准、身体掩膜、尺寸守卫.
//! - [`sampler`]: 随机聚焦 patch 采样.
//! - [`reconstruct`]: 推理结果重建.
//! - [`dataset`]: 病例目录、训练/推理/评估数据集.
//! - [`config`]: 数据集配置.

/// 三维索引, 同时也可一定程度上用作非负整数向量. 按 `(z, y, x)` 排列.
pub type Idx3d = (usize, usize, usize);

/// 连续三维索引. 按 `(z, y, x)` 排列.
pub type Idx3dF = (f64, f64, f64);

pub mod consts;

pub mod error;

/// 3D 体数据基础数据结构.
pub mod data;

pub use data::{
    BoundingBox, ExtensionIo, Geometry, HuWindow, MemoryIo, NiftiIo, NpyIo, Volume, VolumeAttr,
    VolumeIo, VoxelType,
};

pub mod transform;

pub mod sampler;

pub mod reconstruct;

pub use reconstruct::{reconstruct, ReconstructionMetadata};
pub use transform::Padding;

pub mod config;

pub mod dataset;

pub mod prelude;
