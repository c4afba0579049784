use std::fs;
use std::path::Path;

use cbct_pear::prelude::*;
use ndarray::{s, Array3};
use ndarray_npy::write_npy;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

/// CBCT 灰度体数据: FOV 外为 0, FOV 内为 -900 HU 的外壳和 40 HU 的软组织核心.
fn cbct_gray() -> Array3<f32> {
    let mut data = Array3::from_elem((20, 24, 24), 0.0f32);
    data.slice_mut(s![2..18, 2..22, 2..22]).fill(124.0);
    data.slice_mut(s![5..15, 6..18, 6..18]).fill(1064.0);
    data
}

fn ct() -> Array3<f32> {
    let mut data = Array3::from_elem((20, 24, 24), -1024.0f32);
    data.slice_mut(s![1..19, 1..23, 1..23]).fill(40.0);
    data
}

fn write(root: &Path, rel: &str, data: &Array3<f32>) {
    let p = root.join(rel);
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    write_npy(&p, data).unwrap();
}

fn layout() -> (TempDir, DatasetConfig) {
    let dir = tempfile::tempdir().unwrap();
    for patient in ["p1", "p2"] {
        write(dir.path(), &format!("{patient}/CBCT/day0/scan.npy"), &cbct_gray());
        write(dir.path(), &format!("{patient}/CT/CT.npy"), &ct());
        write(dir.path(), &format!("{patient}/CT/structure.npy"), &ct());
    }
    let config = DatasetConfig::with_root(dir.path());
    (dir, config)
}

#[test]
fn test_train_from_disk() {
    let (_dir, config) = layout();
    let config = DatasetConfig {
        patch_size: (8, 8, 8),
        ..config
    };
    let ds = TrainDataset::new(config).unwrap();
    assert_eq!(ds.len(), 2);
    assert_eq!(ds.catalog().files(Modality::Secondary).count(), 2);

    let mut rng = StdRng::seed_from_u64(3);
    for i in 0..ds.len() {
        let item = ds.get(i, &mut rng).unwrap();
        assert_eq!(item.a.dim(), (1, 8, 8, 8));
        assert_eq!(item.b.dim(), (1, 8, 8, 8));
    }
}

#[test]
fn test_eval_from_disk() {
    let (_dir, config) = layout();
    let ds = EvalDataset::new(config).unwrap();
    let item = ds.get(1).unwrap();
    assert_eq!(item.a.dim(), (1, 10, 12, 12));
    assert_eq!(item.b.dim(), (1, 18, 22, 22));
}

#[test]
fn test_inference_save_restores_geometry() {
    let (dir, config) = layout();
    let ds = InferenceDataset::new(config).unwrap();
    assert_eq!(ds.len(), 2);

    let (tensor, meta) = ds.get(0).unwrap();
    assert_eq!(tensor.dim(), (1, 32, 32, 32));
    assert_eq!(meta.size(), (16, 20, 20));
    assert_eq!(meta.bbox().start(), (3, 4, 4));
    assert_eq!(meta.bbox().shape(), (10, 12, 12));
    assert_eq!(meta.padding().before(), (11, 10, 10));

    let out_dir = dir.path().join("out");
    let out = ds.save(tensor.view(), &meta, &out_dir).unwrap();
    assert_eq!(out, out_dir.join("p1/CBCT/day0/scan.npy"));

    let restored = NpyIo.load(&out).unwrap();
    assert_eq!(restored.shape(), (16, 20, 20));
    for ((z, y, x), v) in restored.data().indexed_iter() {
        let core = (3..13).contains(&z) && (4..16).contains(&y) && (4..16).contains(&x);
        let expect = if core { 40.0 } else { AIR };
        assert!((v - expect).abs() < 1e-2, "({z}, {y}, {x}): {v}");
    }
}

#[test]
fn test_catalog_fails_fast() {
    let (dir, config) = layout();
    fs::create_dir_all(dir.path().join("p3/CBCT")).unwrap();
    write(dir.path(), "p3/CBCT/scan.npy", &cbct_gray());

    match TrainDataset::new(config) {
        Err(FatalError::MissingModality { patient, dir }) => {
            assert_eq!(patient, "p3");
            assert!(dir.ends_with("p3/CT"));
        }
        other => panic!("期望 MissingModality, 实际为 {other:?}"),
    }
}

#[test]
fn test_config_file_round() {
    let (dir, _) = layout();
    let path = dir.path().join("dataset.toml");
    fs::write(
        &path,
        format!(
            "root = {:?}\npatch_size = [4, 4, 4]\npad = false\nenable_masking = false\n",
            dir.path().to_str().unwrap()
        ),
    )
    .unwrap();
    let config = DatasetConfig::from_file(&path).unwrap();
    assert_eq!(config.size_policy(), SizePolicy::Replace);

    let ds = TrainDataset::new(config).unwrap();
    let item = ds.get(0, &mut StdRng::seed_from_u64(0)).unwrap();
    assert_eq!(item.a.dim(), (1, 4, 4, 4));
}
