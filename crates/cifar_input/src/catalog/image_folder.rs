use super::{strip_version, BaseSplit, DatasetCatalog, DatasetInfo, SplitSpec};
use crate::dataset::InMemoryDataset;
use crate::example::Example;
use crate::transforms::vision::{ImageToTensor, LoadImage};
use crate::transforms::Transform;
use anyhow::{anyhow, bail, ensure, Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Reads datasets laid out as `<root>/<name>/<split>/<class>/<image>`.
///
/// Classes are the sorted directory names of the train split; the test split
/// must not introduce new ones. Images are listed in path order, so slices
/// are stable across runs.
#[derive(Debug, Clone)]
pub struct ImageFolderCatalog {
    root: PathBuf,
}

impl ImageFolderCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn split_dir(&self, name: &str, base: BaseSplit) -> PathBuf {
        self.root.join(strip_version(name)).join(base.as_str())
    }

    fn classes(&self, name: &str) -> Result<Vec<String>> {
        let dir = self.split_dir(name, BaseSplit::Train);
        let mut classes = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("Failed to access directory: {}", dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                classes.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ensure!(!classes.is_empty(), "No class directories under {}", dir.display());
        classes.sort();
        Ok(classes)
    }

    /// Every `(path, class index)` of a split in path order.
    fn list(&self, name: &str, base: BaseSplit, classes: &[String]) -> Result<Vec<(PathBuf, i64)>> {
        let dir = self.split_dir(name, base);
        let mut items = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(2).max_depth(2).sort_by_file_name() {
            let entry = entry.map_err(|e| anyhow!("Failed to read directory entry: {}", e))?;
            if !entry.file_type().is_file() || !has_image_extension(entry.path()) {
                continue;
            }
            let class = entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .map(|c| c.to_string_lossy().into_owned())
                .with_context(|| format!("No class directory for {}", entry.path().display()))?;
            let Ok(index) = classes.binary_search(&class) else {
                bail!("Class '{}' in {} is not a train class", class, dir.display());
            };
            items.push((entry.into_path(), index as i64));
        }
        Ok(items)
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

impl DatasetCatalog for ImageFolderCatalog {
    fn info(&self, name: &str) -> Result<DatasetInfo> {
        let classes = self.classes(name)?;
        let train = self.list(name, BaseSplit::Train, &classes)?;
        let test = self.list(name, BaseSplit::Test, &classes)?;

        let (first, _) = train
            .first()
            .with_context(|| format!("Dataset '{}' has no train images", name))?;
        let image = LoadImage::new().then(ImageToTensor).apply(first.clone())?;
        let size = image.size();

        Ok(DatasetInfo {
            name: strip_version(name).to_string(),
            image_shape: [size[0], size[1], size[2]],
            train_examples: train.len(),
            test_examples: test.len(),
            num_classes: classes.len(),
        })
    }

    fn load(&self, name: &str, split: &SplitSpec) -> Result<InMemoryDataset> {
        let classes = self.classes(name)?;
        let items = self.list(name, split.base, &classes)?;
        let range = split.resolve(items.len())?;
        debug!("Decoding {} images for '{}' of '{}'", range.len(), split, name);

        let decode = LoadImage::new().then(ImageToTensor);
        let examples = items[range]
            .iter()
            .map(|(path, class)| Example::raw(decode.apply(path.clone())?, *class))
            .collect::<Result<Vec<_>>>()?;

        Ok(InMemoryDataset::new(examples)
            .with_metadata("dataset", strip_version(name))
            .with_metadata("split", split.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_image(dir: &Path, class: &str, file: &str, value: u8) {
        let class_dir = dir.join(class);
        fs::create_dir_all(&class_dir).unwrap();
        RgbImage::from_pixel(8, 6, Rgb([value, value, value]))
            .save(class_dir.join(file))
            .unwrap();
    }

    #[test]
    fn test_image_folder_catalog() -> Result<()> {
        let root = tempdir()?;
        let train = root.path().join("toy").join("train");
        let test = root.path().join("toy").join("test");
        write_image(&train, "cat", "a.png", 10);
        write_image(&train, "cat", "b.png", 20);
        write_image(&train, "dog", "a.png", 30);
        write_image(&train, "dog", "b.png", 40);
        write_image(&test, "dog", "c.png", 50);
        fs::write(train.join("cat").join("notes.txt"), "skip me")?;

        let catalog = ImageFolderCatalog::new(root.path());
        let info = catalog.info("toy:1.0.0")?;
        assert_eq!(info.num_classes, 2);
        assert_eq!(info.image_shape, [6, 8, 3]);
        assert_eq!((info.train_examples, info.test_examples), (4, 1));

        let tail = catalog.load("toy", &"train[50%:]".parse()?)?;
        assert_eq!(tail.len(), 2);
        let first = tail.get(0).context("missing example")?;
        assert_eq!(first.class_index()?, 1);
        assert_eq!(first.image.int64_value(&[0, 0, 0]), 30);

        let test = catalog.load("toy", &"test".parse()?)?;
        assert_eq!(test.get(0).map(|e| e.class_index()).transpose()?, Some(1));
        Ok(())
    }

    #[test]
    fn test_unknown_test_class_is_an_error() -> Result<()> {
        let root = tempdir()?;
        write_image(&root.path().join("toy").join("train"), "cat", "a.png", 1);
        write_image(&root.path().join("toy").join("test"), "bird", "a.png", 1);

        let catalog = ImageFolderCatalog::new(root.path());
        assert!(catalog.info("toy").is_err());
        assert!(catalog.info("missing").is_err());
        Ok(())
    }
}
