//! 数据集操作.
//!
//! 数据集根目录下每个子目录是一个病例, 病例目录下分别有主模态 (默认 `CBCT`)
//! 和次模态 (默认 `CT`) 两个子目录:
//!
//! ```text
//! root/
//! ├── patient-001/
//! │   ├── CBCT/   (任意层级下的 .nii, .nii.gz, .npy)
//! │   └── CT/     (文件名主干为 CT 的文件)
//! └── patient-002/
//! ```

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;

mod catalog;
mod eval;
mod inference;
mod train;

pub use catalog::{Case, Catalog};
pub use eval::{EvalDataset, EvalItem};
pub use inference::InferenceDataset;
pub use train::{TrainDataset, TrainItem};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.extend(it);
    Some(ans)
}

/// SplitMix64 的输出混合函数.
#[inline]
fn split_mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// 从基础种子 `seed` 为第 `stream` 个 worker (或样本) 派生独立的随机数生成器.
///
/// 相同的 `(seed, stream)` 总是得到相同的生成器; 不同的 `stream` 之间互不相关.
pub fn item_rng(seed: u64, stream: u64) -> StdRng {
    let a = split_mix(seed.wrapping_add(0x9e37_79b9_7f4a_7c15));
    let b = split_mix(a ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15));
    StdRng::seed_from_u64(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn draws(mut rng: StdRng) -> Vec<u32> {
        (0..16).map(|_| rng.gen()).collect()
    }

    #[test]
    fn test_item_rng_is_reproducible() {
        assert_eq!(draws(item_rng(7, 3)), draws(item_rng(7, 3)));
    }

    #[test]
    fn test_item_rng_streams_differ() {
        let base = draws(item_rng(7, 0));
        for stream in 1..32 {
            assert_ne!(base, draws(item_rng(7, stream)));
        }
        assert_ne!(base, draws(item_rng(8, 0)));
    }

    #[test]
    fn test_home_dataset_dir_with() {
        if let Some(home) = home_dataset_dir() {
            let p = home_dataset_dir_with(["cbct", "patient-001"]).unwrap();
            assert_eq!(p, home.join("cbct").join("patient-001"));
        }
    }
}
