//! 病例目录.
//!
//! 构造时扫描整个数据集根目录并立即校验结构, 之后不再访问文件系统.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DatasetConfig;
use crate::consts::Modality;
use crate::data::io::has_extension;
use crate::error::{FatalError, IoError};

/// 单个病例的文件列表. 两个列表都非空且按路径排序.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Case {
    primary: Vec<PathBuf>,
    secondary: Vec<PathBuf>,
}

impl Case {
    /// 由两个模态的文件列表创建病例. 任一列表为空时返回 `None`.
    pub fn new(mut primary: Vec<PathBuf>, mut secondary: Vec<PathBuf>) -> Option<Self> {
        if primary.is_empty() || secondary.is_empty() {
            return None;
        }
        primary.sort();
        secondary.sort();
        Some(Self { primary, secondary })
    }

    /// 指定模态的全部文件.
    #[inline]
    pub fn files(&self, modality: Modality) -> &[PathBuf] {
        match modality {
            Modality::Primary => &self.primary,
            Modality::Secondary => &self.secondary,
        }
    }

    /// 指定模态排序后的第一个文件.
    #[inline]
    pub fn first(&self, modality: Modality) -> &Path {
        // 构造时保证非空.
        &self.files(modality)[0]
    }
}

/// 数据集目录: 病例标识 -> 病例文件.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Catalog {
    root: PathBuf,
    cases: BTreeMap<String, Case>,
}

/// 文件名去掉 `extensions` 中最长匹配扩展名后的主干. 不匹配任何扩展名时返回 `None`.
fn stem_of<'a>(path: &'a Path, extensions: &[String]) -> Option<&'a str> {
    let name = path.file_name()?.to_str()?;
    extensions
        .iter()
        .filter(|ext| has_extension(path, ext))
        .map(|ext| &name[..name.len() - ext.len() - 1])
        .min_by_key(|stem| stem.len())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> FatalError + '_ {
    move |source| {
        FatalError::Io(IoError::Io {
            path: path.to_owned(),
            source,
        })
    }
}

/// 递归收集 `dir` 下扩展名匹配的文件, 结果已排序.
fn scan_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, FatalError> {
    let mut out = Vec::new();
    let mut pending = vec![dir.to_owned()];
    while let Some(d) = pending.pop() {
        for entry in fs::read_dir(&d).map_err(io_err(&d))? {
            let path = entry.map_err(io_err(&d))?.path();
            if path.is_dir() {
                pending.push(path);
            } else if stem_of(&path, extensions).is_some() {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

impl Catalog {
    /// 按 `config` 扫描 `config.root`.
    ///
    /// # 错误
    ///
    /// - 根目录不存在: [`FatalError::InvalidRoot`];
    /// - 某病例缺少模态目录: [`FatalError::MissingModality`];
    /// - 某模态目录下没有符合条件的文件: [`FatalError::EmptyModality`];
    /// - 没有任何病例: [`FatalError::EmptyDataset`].
    pub fn scan(config: &DatasetConfig) -> Result<Self, FatalError> {
        let root = config.root.as_path();
        if !root.is_dir() {
            return Err(FatalError::InvalidRoot(root.to_owned()));
        }

        let mut patients: Vec<PathBuf> = fs::read_dir(root)
            .map_err(io_err(root))?
            .map(|e| e.map(|e| e.path()).map_err(io_err(root)))
            .collect::<Result<_, _>>()?;
        patients.retain(|p| p.is_dir());
        patients.sort();

        let mut cases = BTreeMap::new();
        for patient_dir in patients {
            let patient = patient_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let primary = Self::scan_modality(&patient, &patient_dir, &config.primary_dir, config, None)?;
            let secondary = Self::scan_modality(
                &patient,
                &patient_dir,
                &config.secondary_dir,
                config,
                config.secondary_stem.as_deref(),
            )?;
            log::debug!(
                "病例 `{patient}`: {} 个主模态文件, {} 个次模态文件",
                primary.len(),
                secondary.len()
            );
            // scan_modality 已保证非空.
            cases.insert(patient, Case { primary, secondary });
        }

        if cases.is_empty() {
            return Err(FatalError::EmptyDataset(root.to_owned()));
        }
        log::info!("数据集 `{}`: {} 个病例", root.display(), cases.len());
        Ok(Self {
            root: root.to_owned(),
            cases,
        })
    }

    fn scan_modality(
        patient: &str,
        patient_dir: &Path,
        sub_dir: &str,
        config: &DatasetConfig,
        stem: Option<&str>,
    ) -> Result<Vec<PathBuf>, FatalError> {
        let dir = patient_dir.join(sub_dir);
        if !dir.is_dir() {
            return Err(FatalError::MissingModality {
                patient: patient.to_owned(),
                dir,
            });
        }
        let mut files = scan_files(&dir, &config.extensions)?;
        if let Some(stem) = stem {
            files.retain(|p| stem_of(p, &config.extensions) == Some(stem));
        }
        if files.is_empty() {
            return Err(FatalError::EmptyModality {
                patient: patient.to_owned(),
                dir,
            });
        }
        Ok(files)
    }

    /// 由已知的病例创建目录, 不访问文件系统.
    ///
    /// 没有任何病例时返回 [`FatalError::EmptyDataset`].
    pub fn from_cases<P, I>(root: P, cases: I) -> Result<Self, FatalError>
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = (String, Case)>,
    {
        let root = root.into();
        let cases: BTreeMap<_, _> = cases.into_iter().collect();
        if cases.is_empty() {
            return Err(FatalError::EmptyDataset(root));
        }
        Ok(Self { root, cases })
    }

    /// 数据集根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 病例数.
    #[inline]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// 是否为空. 构造成功的目录总是非空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// 第 `index` 个病例 (按病例标识排序).
    pub fn get(&self, index: usize) -> Option<(&str, &Case)> {
        self.cases.iter().nth(index).map(|(k, v)| (k.as_str(), v))
    }

    /// 按病例标识查找.
    pub fn case(&self, patient: &str) -> Option<&Case> {
        self.cases.get(patient)
    }

    /// 按病例标识顺序迭代.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Case)> + '_ {
        self.cases.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 所有病例中指定模态的全部文件, 按病例顺序排列.
    pub fn files(&self, modality: Modality) -> impl Iterator<Item = &Path> + '_ {
        self.cases
            .values()
            .flat_map(move |c| c.files(modality).iter().map(PathBuf::as_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, b"").unwrap();
    }

    fn layout(files: &[&str]) -> (TempDir, DatasetConfig) {
        let dir = tempfile::tempdir().unwrap();
        for f in files {
            touch(dir.path(), f);
        }
        let config = DatasetConfig::with_root(dir.path());
        (dir, config)
    }

    #[test]
    fn test_stem_of() {
        let ext: Vec<String> = vec!["nii".into(), "nii.gz".into(), "npy".into()];
        assert_eq!(stem_of(Path::new("a/CT.nii.gz"), &ext), Some("CT"));
        assert_eq!(stem_of(Path::new("a/CT.nii"), &ext), Some("CT"));
        assert_eq!(stem_of(Path::new("a/ct_1.npy"), &ext), Some("ct_1"));
        assert_eq!(stem_of(Path::new("a/CT.nrrd"), &ext), None);
    }

    #[test]
    fn test_scan() {
        let (_dir, config) = layout(&[
            "p2/CBCT/day1/x.nii.gz",
            "p2/CBCT/day0/x.nii.gz",
            "p2/CT/CT.nii.gz",
            "p2/CT/mask.nii.gz",
            "p1/CBCT/a.npy",
            "p1/CBCT/notes.txt",
            "p1/CT/sub/CT.npy",
            "README.md",
        ]);
        let c = Catalog::scan(&config).unwrap();
        assert_eq!(c.len(), 2);

        let (id, case) = c.get(0).unwrap();
        assert_eq!(id, "p1");
        assert_eq!(case.files(Modality::Primary).len(), 1);
        assert!(case.first(Modality::Secondary).ends_with("sub/CT.npy"));

        let case = c.case("p2").unwrap();
        let primary = case.files(Modality::Primary);
        assert_eq!(primary.len(), 2);
        assert!(primary[0].ends_with("day0/x.nii.gz"));
        assert_eq!(case.files(Modality::Secondary).len(), 1);
        assert_eq!(c.files(Modality::Primary).count(), 3);
    }

    #[test]
    fn test_missing_modality_fails_fast() {
        let (_dir, config) = layout(&["p1/CBCT/a.nii", "p1/CT/CT.nii", "p2/CBCT/a.nii"]);
        assert!(matches!(
            Catalog::scan(&config),
            Err(FatalError::MissingModality { patient, .. }) if patient == "p2"
        ));
    }

    #[test]
    fn test_no_matching_stem_fails_fast() {
        let (_dir, config) = layout(&["p1/CBCT/a.nii", "p1/CT/planning.nii"]);
        assert!(matches!(
            Catalog::scan(&config),
            Err(FatalError::EmptyModality { .. })
        ));

        let config = DatasetConfig {
            secondary_stem: None,
            ..config
        };
        assert_eq!(Catalog::scan(&config).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_and_invalid_root() {
        let (dir, config) = layout(&[]);
        assert!(matches!(
            Catalog::scan(&config),
            Err(FatalError::EmptyDataset(_))
        ));

        let config = DatasetConfig::with_root(dir.path().join("nope"));
        assert!(matches!(
            Catalog::scan(&config),
            Err(FatalError::InvalidRoot(_))
        ));
    }

    #[test]
    fn test_from_cases() {
        let case = Case::new(vec!["b".into(), "a".into()], vec!["CT".into()]).unwrap();
        assert_eq!(case.first(Modality::Primary), Path::new("a"));
        assert!(Case::new(vec![], vec!["CT".into()]).is_none());

        let c = Catalog::from_cases("root", [("p".to_owned(), case)]).unwrap();
        assert_eq!(c.root(), Path::new("root"));
        assert!(Catalog::from_cases("root", []).is_err());
    }
}
