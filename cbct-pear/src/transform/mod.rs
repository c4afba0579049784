//! 体数据的几何变换.
//!
//! 每个变换都是纯函数: 输入体数据不会被修改, 结果以新的 [`Volume`](crate::Volume)
//! 或裸数组返回.

pub mod body_mask;
pub mod fov;
pub mod scope;
pub mod size_guard;

pub use body_mask::{apply_body_mask_and_bound, body_mask_and_bound, BodyMask};
pub use fov::{fov_bounding_box, truncate_fov};
pub use scope::{scope_bounding_box, truncate_to_scope};
pub use size_guard::{pad, pad_volume, replace_if_undersized, Padding};
