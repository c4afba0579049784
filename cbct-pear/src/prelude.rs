//! 🍐欢迎光临🍐
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::consts::{hu::AIR, Modality};
pub use crate::data::{
    BoundingBox, ExtensionIo, Geometry, HuWindow, NiftiIo, NpyIo, Volume, VolumeAttr, VolumeIo,
    VoxelType,
};
pub use crate::error::{FatalError, PipelineError, RecoverableError};

pub use crate::config::{DatasetConfig, SizePolicy};
pub use crate::reconstruct::{reconstruct, ReconstructionMetadata};
pub use crate::sampler::{PatchPair, StochasticFocalPatchSampler};

pub use crate::dataset::{item_rng, Catalog, EvalDataset, InferenceDataset, TrainDataset};
pub use crate::dataset::home_dataset_dir_with;
