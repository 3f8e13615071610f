#![allow(dead_code)]

use cifar_input::{Example, InMemoryCatalog, InMemoryDataset};

use anyhow::Result;
use std::path::Path;
use tch::{Device, Kind, Tensor};

pub const NAME: &str = "toy_cifar";
pub const NUM_CLASSES: usize = 10;
pub const TRAIN_EXAMPLES: usize = 200;
pub const TEST_EXAMPLES: usize = 60;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `n` 32x32x3 images; example `i` is filled with the value `i % 256` and
/// labelled `i % NUM_CLASSES`, so both can be read back from a batch.
pub fn synthetic_split(n: usize) -> Result<InMemoryDataset> {
    let examples = (0..n)
        .map(|i| {
            let image = Tensor::full([32, 32, 3], (i % 256) as i64, (Kind::Uint8, Device::Cpu));
            Example::raw(image, (i % NUM_CLASSES) as i64)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(InMemoryDataset::new(examples))
}

/// A catalog with one CIFAR-shaped dataset named `NAME`.
pub fn synthetic_catalog() -> Result<InMemoryCatalog> {
    init_logging();
    let mut catalog = InMemoryCatalog::new();
    catalog.insert(
        NAME,
        NUM_CLASSES,
        synthetic_split(TRAIN_EXAMPLES)?,
        synthetic_split(TEST_EXAMPLES)?,
    )?;
    Ok(catalog)
}

/// One CIFAR-10 binary record: label byte then CHW pixel bytes, all `value`.
pub fn cifar10_record(label: u8, value: u8) -> Vec<u8> {
    let mut record = vec![label];
    record.extend(std::iter::repeat(value).take(3 * 32 * 32));
    record
}

/// Writes a CIFAR-10 binary tree under `root` with `per_file` records in each
/// of the five train files and in the test file.
pub fn write_cifar10(root: &Path, per_file: usize) -> Result<()> {
    let dir = root.join("cifar-10-batches-bin");
    std::fs::create_dir_all(&dir)?;
    let files = [
        "data_batch_1.bin",
        "data_batch_2.bin",
        "data_batch_3.bin",
        "data_batch_4.bin",
        "data_batch_5.bin",
        "test_batch.bin",
    ];
    for (f, file) in files.iter().enumerate() {
        let bytes: Vec<u8> = (0..per_file)
            .flat_map(|i| cifar10_record(((f * per_file + i) % 10) as u8, (f * per_file + i) as u8))
            .collect();
        std::fs::write(dir.join(file), bytes)?;
    }
    Ok(())
}

/// Class index of every row of a scalar label batch.
pub fn scalar_labels(labels: &Tensor) -> Result<Vec<i64>> {
    Ok(Vec::<i64>::try_from(&labels.to_kind(Kind::Int64))?)
}
