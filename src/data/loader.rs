use crate::data::labels::LabelMap;

use burn::data::dataset::{
    Dataset,
    transform::{PartialDataset, ShuffledDataset},
};
use color_eyre::{
    Result,
    eyre::{WrapErr, bail},
};
use image::ImageFormat;
use log::{info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// One file of the folder-per-class tree, labeled with its parent directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelInput {
    pub image_path: PathBuf,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowerItem {
    pub image_path: PathBuf,
    pub label: usize,
}

pub type SplitDataset = PartialDataset<ShuffledDataset<FlowerDataset, FlowerItem>, FlowerItem>;

pub struct DatasetSplits {
    pub train: SplitDataset,
    pub validation: SplitDataset,
    pub test: SplitDataset,
}

/// Walks `root` recursively and turns every regular file into a record.
pub fn convert_data(root: &Path) -> Result<Vec<ModelInput>> {
    if !root.is_dir() {
        bail!("Data directory not found: {}", root.display());
    }
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    files
        .into_iter()
        .map(|file| {
            // Symlinked class folders keep their own name as the label.
            let label = file
                .parent()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let image_path = std::path::absolute(&file)
                .wrap_err_with(|| format!("Failed to resolve {}", file.display()))?;
            Ok(ModelInput { image_path, label })
        })
        .collect()
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).wrap_err_with(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .wrap_err_with(|| format!("Failed to list {}", dir.display()))?
            .path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

fn is_supported_image(path: &Path) -> bool {
    ImageFormat::from_path(path)
        .map(|format| format.reading_enabled())
        .unwrap_or(false)
}

#[derive(Clone, Debug)]
pub struct FlowerDataset {
    items: Arc<Vec<FlowerItem>>,
}

impl FlowerDataset {
    pub fn new(inputs: Vec<ModelInput>, labels: &LabelMap) -> Self {
        let items = inputs
            .into_iter()
            .filter_map(|input| {
                let label = labels.encode(&input.label)?;
                Some(FlowerItem {
                    image_path: input.image_path,
                    label,
                })
            })
            .collect();
        Self {
            items: Arc::new(items),
        }
    }
}

impl Dataset<FlowerItem> for FlowerDataset {
    fn get(&self, index: usize) -> Option<FlowerItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

pub fn load_dataset(root: &Path) -> Result<(FlowerDataset, LabelMap)> {
    let inputs: Vec<ModelInput> = convert_data(root)?
        .into_iter()
        .filter(|input| {
            let keep = is_supported_image(&input.image_path);
            if !keep {
                warn!("Skipping non-image file {}", input.image_path.display());
            }
            keep
        })
        .collect();
    let labels = LabelMap::from_inputs(&inputs);
    let dataset = FlowerDataset::new(inputs, &labels);
    if dataset.is_empty() {
        bail!("No images found under {}", root.display());
    }
    info!(
        "Loaded {} images in {} classes from {}",
        dataset.len(),
        labels.len(),
        root.display()
    );
    Ok((dataset, labels))
}

/// Shuffles with `seed` and cuts the dataset into `[train | validation | test]`.
///
/// Train and test always hold at least one item; validation may be empty.
pub fn split_dataset(
    dataset: FlowerDataset,
    seed: u64,
    test_fraction: f32,
    validation_fraction: f32,
) -> Result<DatasetSplits> {
    let len = dataset.len();
    if len < 2 {
        bail!("Need at least two images to split, found {len}");
    }
    let test_len = ((len as f32) * test_fraction).round() as usize;
    let test_len = test_len.clamp(1, len - 1);
    let train_len = len - test_len;
    let validation_len = ((train_len as f32) * validation_fraction).round() as usize;
    let validation_len = validation_len.min(train_len - 1);
    let train_end = train_len - validation_len;

    let shuffled = || ShuffledDataset::with_seed(dataset.clone(), seed);

    Ok(DatasetSplits {
        train: PartialDataset::new(shuffled(), 0, train_end),
        validation: PartialDataset::new(shuffled(), train_end, train_len),
        test: PartialDataset::new(shuffled(), train_len, len),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn write_tree(files: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"not really an image").unwrap();
        }
        dir
    }

    fn encoded(count: usize) -> FlowerDataset {
        let inputs = (0..count)
            .map(|i| ModelInput {
                image_path: PathBuf::from(format!("/flowers/{}/{i}.jpg", i % 2)),
                label: (i % 2).to_string(),
            })
            .collect::<Vec<_>>();
        let labels = LabelMap::from_inputs(&inputs);
        FlowerDataset::new(inputs, &labels)
    }

    #[test]
    fn every_file_becomes_one_record_labeled_by_parent() {
        let dir = write_tree(&[
            "daisy/a.jpg",
            "daisy/b.jpg",
            "rose/c.png",
            "tulip/red/d.jpg",
            "notes.txt",
        ]);
        let records = convert_data(dir.path()).unwrap();

        assert_eq!(records.len(), 5);
        for record in &records {
            assert!(record.image_path.is_absolute());
            let parent = record.image_path.parent().unwrap().file_name().unwrap();
            assert_eq!(record.label, parent.to_string_lossy());
        }
        let labels: HashSet<_> = records.iter().map(|r| r.label.as_str()).collect();
        assert!(labels.contains("red"));
        assert!(!labels.contains("tulip"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(convert_data(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn dataset_drops_files_that_are_not_images() {
        let dir = write_tree(&["daisy/a.jpg", "daisy/readme.md", "rose/b.jpeg"]);
        let (dataset, labels) = load_dataset(dir.path()).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(labels.len(), 2);
        let daisy = dataset.get(0).unwrap();
        assert_eq!(labels.decode(daisy.label), Some("daisy"));
    }

    #[test]
    fn stray_files_do_not_become_classes() {
        let dir = write_tree(&["daisy/a.jpg", "rose/b.jpg", "LICENSE.txt"]);
        let (dataset, labels) = load_dataset(dir.path()).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(labels.classes(), ["daisy".to_string(), "rose".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_class_folder_keeps_its_own_name() {
        let dir = write_tree(&["pool_v2/a.jpg"]);
        let root = dir.path().join("data");
        fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(dir.path().join("pool_v2"), root.join("daisy")).unwrap();

        let records = convert_data(&root).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "daisy");
        assert!(records[0].image_path.ends_with("daisy/a.jpg"));
    }

    #[test]
    fn split_matches_configured_ratios() {
        let splits = split_dataset(encoded(100), 0, 0.3, 0.1).unwrap();

        assert_eq!(splits.test.len(), 30);
        assert_eq!(splits.validation.len(), 7);
        assert_eq!(splits.train.len(), 63);
    }

    #[test]
    fn split_partitions_are_disjoint_and_cover_everything() {
        let splits = split_dataset(encoded(20), 7, 0.3, 0.1).unwrap();
        let paths: Vec<PathBuf> = [&splits.train, &splits.validation, &splits.test]
            .into_iter()
            .flat_map(|split| split.iter().map(|item| item.image_path))
            .collect();
        let unique: HashSet<_> = paths.iter().collect();

        assert_eq!(paths.len(), 20);
        assert_eq!(unique.len(), 20);
    }

    #[test]
    fn tiny_datasets_keep_train_and_test_non_empty() {
        let splits = split_dataset(encoded(2), 0, 0.3, 0.1).unwrap();
        assert_eq!(splits.train.len(), 1);
        assert_eq!(splits.validation.len(), 0);
        assert_eq!(splits.test.len(), 1);

        assert!(split_dataset(encoded(1), 0, 0.3, 0.1).is_err());
    }
}
