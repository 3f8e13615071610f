//! src/catalog/mod.rs
//!
//! Dataset catalogs: metadata and raw `(Uint8 image, class index)` examples
//! per split.
//!
//! ```text
//! catalog/
//! ├── mod.rs           → `DatasetCatalog` trait, `DatasetInfo`, `InMemoryCatalog`
//! ├── split.rs         → `Split`, `SplitSpec` (`train[:95%]` syntax)
//! ├── cifar.rs         → CIFAR-10/100 binary distribution reader
//! └── image_folder.rs  → `<root>/<name>/<split>/<class>/<image>` trees
//! ```

pub mod cifar;
pub mod image_folder;
pub mod split;

pub use cifar::CifarCatalog;
pub use image_folder::ImageFolderCatalog;
pub use split::{BaseSplit, Boundary, Split, SplitSpec};

use crate::dataset::InMemoryDataset;
use anyhow::{bail, ensure, Context, Result};
use std::collections::HashMap;

/// Static facts about a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    pub name: String,
    /// `[H, W, C]`
    pub image_shape: [i64; 3],
    pub train_examples: usize,
    pub test_examples: usize,
    pub num_classes: usize,
}

impl DatasetInfo {
    pub fn examples_in(&self, base: BaseSplit) -> usize {
        match base {
            BaseSplit::Train => self.train_examples,
            BaseSplit::Test => self.test_examples,
        }
    }
}

/// Source of dataset metadata and raw examples.
pub trait DatasetCatalog: Send + Sync {
    fn info(&self, name: &str) -> Result<DatasetInfo>;

    fn load(&self, name: &str, split: &SplitSpec) -> Result<InMemoryDataset>;
}

/// Drops a `:version` suffix, e.g. `cifar10:3.*.*` → `cifar10`.
pub fn strip_version(name: &str) -> &str {
    name.split_once(':').map_or(name, |(base, _)| base).trim()
}

// ============================================================================
// InMemoryCatalog
// ============================================================================

#[derive(Debug, Clone)]
struct InMemoryEntry {
    info: DatasetInfo,
    train: InMemoryDataset,
    test: InMemoryDataset,
}

/// Named datasets held in memory. Handy for tests and for callers that
/// decode data themselves.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    entries: HashMap<String, InMemoryEntry>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dataset. Image shape is taken from the first example and
    /// every example must match it.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        num_classes: usize,
        train: InMemoryDataset,
        test: InMemoryDataset,
    ) -> Result<()> {
        let name = name.into();
        let Some(first) = train.iter().chain(test.iter()).next() else {
            bail!("Dataset '{}' has no examples", name);
        };
        let image_shape: [i64; 3] = first
            .image
            .size()
            .try_into()
            .map_err(|shape| anyhow::anyhow!("Images must be [H, W, C] (got {:?})", shape))?;

        for (i, example) in train.iter().chain(test.iter()).enumerate() {
            ensure!(
                example.image.size() == image_shape,
                "Example {} of '{}' has shape {:?}, expected {:?}",
                i,
                name,
                example.image.size(),
                image_shape
            );
            let class = example.class_index()?;
            ensure!(
                (class as usize) < num_classes,
                "Example {} of '{}' has label {} outside [0, {})",
                i,
                name,
                class,
                num_classes
            );
        }

        let info = DatasetInfo {
            name: name.clone(),
            image_shape,
            train_examples: train.len(),
            test_examples: test.len(),
            num_classes,
        };
        self.entries.insert(name, InMemoryEntry { info, train, test });
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<&InMemoryEntry> {
        let key = strip_version(name);
        self.entries
            .get(key)
            .with_context(|| format!("Unknown dataset '{}'", key))
    }
}

impl DatasetCatalog for InMemoryCatalog {
    fn info(&self, name: &str) -> Result<DatasetInfo> {
        Ok(self.entry(name)?.info.clone())
    }

    fn load(&self, name: &str, split: &SplitSpec) -> Result<InMemoryDataset> {
        let entry = self.entry(name)?;
        let source = match split.base {
            BaseSplit::Train => &entry.train,
            BaseSplit::Test => &entry.test,
        };
        let range = split.resolve(source.len())?;
        Ok(source
            .slice(range)?
            .with_metadata("dataset", entry.info.name.clone())
            .with_metadata("split", split.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example::Example;
    use tch::{Device, Kind, Tensor};

    fn examples(n: usize, num_classes: usize) -> InMemoryDataset {
        InMemoryDataset::new(
            (0..n)
                .map(|i| {
                    Example::raw(
                        Tensor::full([4, 4, 3], i as i64, (Kind::Uint8, Device::Cpu)),
                        (i % num_classes) as i64,
                    )
                    .expect("valid example")
                })
                .collect(),
        )
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("cifar10:3.*.*"), "cifar10");
        assert_eq!(strip_version("cifar100"), "cifar100");
    }

    #[test]
    fn test_in_memory_catalog() -> Result<()> {
        let mut catalog = InMemoryCatalog::new();
        catalog.insert("toy", 3, examples(20, 3), examples(10, 3))?;

        let info = catalog.info("toy:1.0.0")?;
        assert_eq!(info.image_shape, [4, 4, 3]);
        assert_eq!((info.train_examples, info.test_examples), (20, 10));
        assert_eq!(info.examples_in(BaseSplit::Test), 10);

        let head = catalog.load("toy", &"train[:25%]".parse()?)?;
        assert_eq!(head.len(), 5);
        assert_eq!(head.metadata("split"), Some("train[:25%]"));
        let tail = catalog.load("toy", &"train[25%:]".parse()?)?;
        assert_eq!(tail.get(0).map(|e| e.image.int64_value(&[0, 0, 0])), Some(5));

        assert!(catalog.info("missing").is_err());
        Ok(())
    }

    #[test]
    fn test_in_memory_catalog_rejects_bad_labels() {
        let mut catalog = InMemoryCatalog::new();
        assert!(catalog.insert("toy", 2, examples(4, 3), examples(1, 3)).is_err());
        assert!(catalog
            .insert("empty", 2, InMemoryDataset::new(vec![]), InMemoryDataset::new(vec![]))
            .is_err());
    }
}
