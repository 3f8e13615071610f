use super::{strip_version, BaseSplit, DatasetCatalog, DatasetInfo, SplitSpec};
use crate::dataset::InMemoryDataset;
use crate::example::Example;
use anyhow::{bail, ensure, Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use tch::Tensor;

const HEIGHT: usize = 32;
const WIDTH: usize = 32;
const CHANNELS: usize = 3;
const PIXELS: usize = HEIGHT * WIDTH * CHANNELS;

/// Layout of one dataset in the CIFAR binary distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CifarVariant {
    /// `cifar-10-batches-bin/`: `<label><3072 pixels>` records.
    Cifar10,
    /// `cifar-100-binary/`: `<coarse label><fine label><3072 pixels>` records.
    Cifar100,
}

impl CifarVariant {
    pub fn from_name(name: &str) -> Result<Self> {
        match strip_version(name) {
            "cifar10" => Ok(Self::Cifar10),
            "cifar100" => Ok(Self::Cifar100),
            other => bail!("Unknown CIFAR dataset '{}' (expected cifar10 or cifar100)", other),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cifar10 => "cifar10",
            Self::Cifar100 => "cifar100",
        }
    }

    pub fn directory(self) -> &'static str {
        match self {
            Self::Cifar10 => "cifar-10-batches-bin",
            Self::Cifar100 => "cifar-100-binary",
        }
    }

    pub fn num_classes(self) -> usize {
        match self {
            Self::Cifar10 => 10,
            Self::Cifar100 => 100,
        }
    }

    /// Bytes before the pixels; the last one is the label in use.
    fn label_bytes(self) -> usize {
        match self {
            Self::Cifar10 => 1,
            Self::Cifar100 => 2,
        }
    }

    pub fn record_size(self) -> usize {
        self.label_bytes() + PIXELS
    }

    pub fn files(self, base: BaseSplit) -> Vec<&'static str> {
        match (self, base) {
            (Self::Cifar10, BaseSplit::Train) => vec![
                "data_batch_1.bin",
                "data_batch_2.bin",
                "data_batch_3.bin",
                "data_batch_4.bin",
                "data_batch_5.bin",
            ],
            (Self::Cifar10, BaseSplit::Test) => vec!["test_batch.bin"],
            (Self::Cifar100, BaseSplit::Train) => vec!["train.bin"],
            (Self::Cifar100, BaseSplit::Test) => vec!["test.bin"],
        }
    }

    /// Decodes one record: pixel bytes are stored CHW (all red, then green,
    /// then blue) and come out as an HWC `Uint8` tensor.
    pub fn decode_record(self, record: &[u8]) -> Result<Example> {
        ensure!(
            record.len() == self.record_size(),
            "CIFAR record must be {} bytes (got {})",
            self.record_size(),
            record.len()
        );
        let label = record[self.label_bytes() - 1];
        let image = Tensor::from_slice(&record[self.label_bytes()..])
            .view([CHANNELS as i64, HEIGHT as i64, WIDTH as i64])
            .permute([1, 2, 0])
            .contiguous();
        Example::raw(image, label as i64)
    }
}

/// Reads the CIFAR binary distribution from `root`, which holds the
/// extracted `cifar-10-batches-bin/` and/or `cifar-100-binary/` directories.
#[derive(Debug, Clone)]
pub struct CifarCatalog {
    root: PathBuf,
}

impl CifarCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn paths(&self, variant: CifarVariant, base: BaseSplit) -> Vec<PathBuf> {
        let dir = self.root.join(variant.directory());
        variant.files(base).into_iter().map(|f| dir.join(f)).collect()
    }

    fn count_records(&self, variant: CifarVariant, base: BaseSplit) -> Result<usize> {
        let mut total = 0;
        for path in self.paths(variant, base) {
            let len = fs::metadata(&path)
                .with_context(|| format!("Failed to access CIFAR file: {}", path.display()))?
                .len() as usize;
            ensure!(
                len % variant.record_size() == 0,
                "{} is not a whole number of {}-byte records",
                path.display(),
                variant.record_size()
            );
            total += len / variant.record_size();
        }
        Ok(total)
    }
}

impl DatasetCatalog for CifarCatalog {
    fn info(&self, name: &str) -> Result<DatasetInfo> {
        let variant = CifarVariant::from_name(name)?;
        Ok(DatasetInfo {
            name: variant.name().to_string(),
            image_shape: [HEIGHT as i64, WIDTH as i64, CHANNELS as i64],
            train_examples: self.count_records(variant, BaseSplit::Train)?,
            test_examples: self.count_records(variant, BaseSplit::Test)?,
            num_classes: variant.num_classes(),
        })
    }

    fn load(&self, name: &str, split: &SplitSpec) -> Result<InMemoryDataset> {
        let variant = CifarVariant::from_name(name)?;
        let mut bytes = Vec::new();
        for path in self.paths(variant, split.base) {
            let mut file = fs::read(&path)
                .with_context(|| format!("Failed to read CIFAR file: {}", path.display()))?;
            bytes.append(&mut file);
        }
        ensure!(
            bytes.len() % variant.record_size() == 0,
            "Truncated CIFAR data for split '{}'",
            split
        );

        let total = bytes.len() / variant.record_size();
        let range = split.resolve(total)?;
        debug!(
            "Decoding {} of {} {} records for '{}'",
            range.len(),
            total,
            variant.name(),
            split
        );

        let examples = bytes
            .chunks_exact(variant.record_size())
            .skip(range.start)
            .take(range.len())
            .enumerate()
            .map(|(i, record)| {
                variant
                    .decode_record(record)
                    .with_context(|| format!("Bad record {} in '{}'", range.start + i, split))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(InMemoryDataset::new(examples)
            .with_metadata("dataset", variant.name())
            .with_metadata("split", split.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// A record whose red plane is `label`, green plane the pixel index mod
    /// 256 and blue plane 255.
    fn record(variant: CifarVariant, label: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; variant.label_bytes()];
        if variant == CifarVariant::Cifar100 {
            bytes[0] = 7; // coarse label, ignored
        }
        *bytes.last_mut().unwrap() = label;
        bytes.extend(std::iter::repeat(label).take(HEIGHT * WIDTH));
        bytes.extend((0..HEIGHT * WIDTH).map(|i| (i % 256) as u8));
        bytes.extend(std::iter::repeat(255u8).take(HEIGHT * WIDTH));
        bytes
    }

    fn write_split(dir: &Path, file: &str, records: &[Vec<u8>]) {
        fs::write(dir.join(file), records.concat()).unwrap();
    }

    #[test]
    fn test_decode_record_chw_to_hwc() -> Result<()> {
        let example = CifarVariant::Cifar10.decode_record(&record(CifarVariant::Cifar10, 3))?;
        assert_eq!(example.image.size(), vec![32, 32, 3]);
        assert_eq!(example.class_index()?, 3);
        // pixel (row 0, col 5): R = label, G = 5, B = 255
        assert_eq!(example.image.int64_value(&[0, 5, 0]), 3);
        assert_eq!(example.image.int64_value(&[0, 5, 1]), 5);
        assert_eq!(example.image.int64_value(&[0, 5, 2]), 255);
        // pixel (row 1, col 0) is flat index 32
        assert_eq!(example.image.int64_value(&[1, 0, 1]), 32);

        assert!(CifarVariant::Cifar10.decode_record(&[0u8; 10]).is_err());
        Ok(())
    }

    #[test]
    fn test_cifar100_uses_fine_label() -> Result<()> {
        let example = CifarVariant::Cifar100.decode_record(&record(CifarVariant::Cifar100, 42))?;
        assert_eq!(example.class_index()?, 42);
        Ok(())
    }

    #[test]
    fn test_cifar10_catalog() -> Result<()> {
        let root = tempdir()?;
        let dir = root.path().join("cifar-10-batches-bin");
        fs::create_dir_all(&dir)?;
        for (batch, file) in CifarVariant::Cifar10.files(BaseSplit::Train).iter().enumerate() {
            let records: Vec<_> = (0..4)
                .map(|i| record(CifarVariant::Cifar10, ((batch * 4 + i) % 10) as u8))
                .collect();
            write_split(&dir, file, &records);
        }
        write_split(&dir, "test_batch.bin", &[record(CifarVariant::Cifar10, 9)]);

        let catalog = CifarCatalog::new(root.path());
        let info = catalog.info("cifar10:3.*.*")?;
        assert_eq!(info.train_examples, 20);
        assert_eq!(info.test_examples, 1);
        assert_eq!(info.num_classes, 10);
        assert_eq!(info.image_shape, [32, 32, 3]);

        // Files are read in batch order; the tail quarter starts at record 15.
        let tail = catalog.load("cifar10", &"train[75%:]".parse()?)?;
        assert_eq!(tail.len(), 5);
        assert_eq!(tail.get(0).map(|e| e.class_index()).transpose()?, Some(5));

        let test = catalog.load("cifar10", &"test".parse()?)?;
        assert_eq!(test.len(), 1);
        assert_eq!(test.metadata("dataset"), Some("cifar10"));
        Ok(())
    }

    #[test]
    fn test_missing_or_truncated_files() -> Result<()> {
        let root = tempdir()?;
        let catalog = CifarCatalog::new(root.path());
        assert!(catalog.info("cifar100").is_err());
        assert!(catalog.info("mnist").is_err());

        let dir = root.path().join("cifar-100-binary");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("train.bin"), vec![0u8; 100])?;
        fs::write(dir.join("test.bin"), record(CifarVariant::Cifar100, 1))?;
        assert!(catalog.info("cifar100").is_err());
        assert!(catalog.load("cifar100", &"train".parse()?).is_err());
        assert_eq!(catalog.load("cifar100", &"test".parse()?)?.len(), 1);
        Ok(())
    }
}
