use std::collections::HashSet;
use std::fs;
use std::path::Path;

use maskfuse_types::{FuseError, FuseResult, SplitRatios};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::loader::{IMAGES_DIR, MASKS_DIR, list_files};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    Train,
    Valid,
    Test,
}

impl Subset {
    pub const ALL: [Subset; 3] = [Subset::Train, Subset::Valid, Subset::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Subset::Train => "train",
            Subset::Valid => "valid",
            Subset::Test => "test",
        }
    }
}

/// Filenames assigned to each subset. The three lists partition the input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitPlan {
    pub train: Vec<String>,
    pub valid: Vec<String>,
    pub test: Vec<String>,
}

impl SplitPlan {
    pub fn subset(&self, subset: Subset) -> &[String] {
        match subset {
            Subset::Train => &self.train,
            Subset::Valid => &self.valid,
            Subset::Test => &self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.valid.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shuffles `names` with a seeded RNG and cuts them by `ratios`.
///
/// Train and validation counts are rounded; the test subset takes whatever
/// remains so no name is lost to rounding.
pub fn plan_split(mut names: Vec<String>, ratios: SplitRatios, seed: u64) -> SplitPlan {
    let mut rng = StdRng::seed_from_u64(seed);
    names.shuffle(&mut rng);

    let total = names.len();
    let train_len = ((total as f64) * ratios.train()).round() as usize;
    let train_len = train_len.min(total);
    let valid_len = ((total as f64) * ratios.valid()).round() as usize;
    let valid_len = valid_len.min(total - train_len);

    let test = names.split_off(train_len + valid_len);
    let valid = names.split_off(train_len);
    SplitPlan {
        train: names,
        valid,
        test,
    }
}

/// Moves every `images/<name>` and `masks/<name>` pair under `root` into
/// `images/<subset>/` and `masks/<subset>/`.
pub fn split_dataset(root: &Path, ratios: SplitRatios, seed: u64) -> FuseResult<SplitPlan> {
    let images_dir = root.join(IMAGES_DIR);
    let masks_dir = root.join(MASKS_DIR);

    let image_names = file_names(&images_dir)?;
    let mask_names: HashSet<String> = file_names(&masks_dir)?.into_iter().collect();
    if let Some(orphan) = image_names.iter().find(|name| !mask_names.contains(*name)) {
        return Err(FuseError::MissingMask {
            name: orphan.clone(),
        });
    }

    let plan = plan_split(image_names, ratios, seed);
    for subset in Subset::ALL {
        for dir in [&images_dir, &masks_dir] {
            let target = dir.join(subset.as_str());
            fs::create_dir_all(&target).map_err(|err| FuseError::io(&target, err))?;
        }
        for name in plan.subset(subset) {
            for dir in [&images_dir, &masks_dir] {
                let from = dir.join(name);
                let to = dir.join(subset.as_str()).join(name);
                fs::rename(&from, &to).map_err(|err| FuseError::io(&from, err))?;
            }
        }
        tracing::info!(
            subset = subset.as_str(),
            samples = plan.subset(subset).len(),
            "moved samples"
        );
    }
    Ok(plan)
}

fn file_names(dir: &Path) -> FuseResult<Vec<String>> {
    Ok(list_files(dir)?
        .iter()
        .filter_map(|path| path.file_name()?.to_str().map(str::to_owned))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("{i}.png")).collect()
    }

    #[test]
    fn hundred_names_split_seventy_fifteen_fifteen() {
        let plan = plan_split(names(100), SplitRatios::new(0.7, 0.15, 0.15).unwrap(), 1);
        assert_eq!(plan.train.len(), 70);
        assert_eq!(plan.valid.len(), 15);
        assert_eq!(plan.test.len(), 15);

        let mut all: Vec<String> = plan
            .train
            .iter()
            .chain(&plan.valid)
            .chain(&plan.test)
            .cloned()
            .collect();
        all.sort();
        let mut expected = names(100);
        expected.sort();
        assert_eq!(all, expected);
    }

    #[test]
    fn same_seed_gives_same_plan() {
        let ratios = SplitRatios::default();
        assert_eq!(plan_split(names(20), ratios, 7), plan_split(names(20), ratios, 7));
    }

    #[test]
    fn rounding_never_drops_names() {
        let ratios = SplitRatios::new(0.5, 0.5, 0.0).unwrap();
        let plan = plan_split(names(3), ratios, 3);
        assert_eq!(plan.len(), 3);
        assert!(plan.test.len() <= 1);
    }

    #[test]
    fn split_dataset_moves_pairs_together() {
        let dir = tempfile::tempdir().unwrap();
        for sub in [IMAGES_DIR, MASKS_DIR] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
            for name in names(10) {
                fs::write(dir.path().join(sub).join(&name), name.as_bytes()).unwrap();
            }
        }

        let plan = split_dataset(dir.path(), SplitRatios::default(), 5).unwrap();
        assert_eq!(plan.len(), 10);
        for subset in Subset::ALL {
            for name in plan.subset(subset) {
                for sub in [IMAGES_DIR, MASKS_DIR] {
                    let moved = dir.path().join(sub).join(subset.as_str()).join(name);
                    assert_eq!(fs::read(&moved).unwrap(), name.as_bytes());
                }
            }
        }
        assert!(list_files(&dir.path().join(IMAGES_DIR)).unwrap().is_empty());
    }

    #[test]
    fn split_dataset_requires_matching_masks() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(IMAGES_DIR)).unwrap();
        fs::create_dir_all(dir.path().join(MASKS_DIR)).unwrap();
        fs::write(dir.path().join(IMAGES_DIR).join("0.png"), b"x").unwrap();

        let err = split_dataset(dir.path(), SplitRatios::default(), 0).unwrap_err();
        assert!(matches!(err, FuseError::MissingMask { name } if name == "0.png"));
    }
}
