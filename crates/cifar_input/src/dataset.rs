use crate::example::Example;
use anyhow::{ensure, Result};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

/// A split held entirely in memory as raw `(Uint8 image, class index)`
/// examples, with atomic-reference counting (`Arc<[Example]>`).
///
/// This enables:
/// - Zero-copy clone: cloning only bumps the `Arc` counter
/// - Thread-safe sharing between the feeder and worker threads
///
/// CIFAR splits are at most 60k 32x32 images, so they always fit in RAM.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    examples: Arc<[Example]>,
    metadata: HashMap<String, String>,
}

impl InMemoryDataset {
    pub fn new(examples: Vec<Example>) -> Self {
        Self {
            examples: examples.into(),
            metadata: HashMap::new(),
        }
    }

    /// Adds/updates metadata and returns the modified dataset.
    /// Enables chaining: `dataset.with_metadata("split", "train[:95%]")`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Example> {
        self.examples.get(index)
    }

    /// Shallow clones of the examples at `indices`, in order.
    pub fn gather(&self, indices: &[usize]) -> Result<Vec<Example>> {
        indices
            .iter()
            .map(|&i| {
                self.examples.get(i).cloned().ok_or_else(|| {
                    anyhow::anyhow!("Index {} out of bounds for dataset of size {}", i, self.len())
                })
            })
            .collect()
    }

    /// A new dataset over the examples in `range`, keeping the metadata.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        ensure!(
            range.start <= range.end && range.end <= self.len(),
            "Slice {:?} out of bounds for dataset of size {}",
            range,
            self.len()
        );
        Ok(Self {
            examples: self.examples[range].to_vec().into(),
            metadata: self.metadata.clone(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Example> + '_ {
        self.examples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind, Tensor};

    // Creates `n` examples whose pixels and label both equal the index.
    fn create_test_examples(n: usize) -> Vec<Example> {
        (0..n)
            .map(|i| {
                Example::raw(
                    Tensor::full([2, 2, 3], i as i64, (Kind::Uint8, Device::Cpu)),
                    (i % 10) as i64,
                )
                .expect("valid example")
            })
            .collect()
    }

    #[test]
    fn test_creation() {
        let dataset = InMemoryDataset::new(create_test_examples(3));
        assert_eq!(dataset.len(), 3);
        assert!(!dataset.is_empty());
        assert!(InMemoryDataset::new(Vec::new()).is_empty());
    }

    #[test]
    fn test_random_access_and_gather() -> Result<()> {
        let dataset = InMemoryDataset::new(create_test_examples(4));
        assert_eq!(dataset.get(1).map(|e| e.class_index()).transpose()?, Some(1));
        assert!(dataset.get(4).is_none());

        let gathered = dataset.gather(&[3, 0])?;
        assert_eq!(gathered[0].image.int64_value(&[0, 0, 0]), 3);
        assert_eq!(gathered[1].class_index()?, 0);
        assert!(dataset.gather(&[0, 9]).is_err());
        Ok(())
    }

    #[test]
    fn test_slice_keeps_metadata() -> Result<()> {
        let dataset = InMemoryDataset::new(create_test_examples(10)).with_metadata("split", "train");
        let head = dataset.slice(0..4)?;
        assert_eq!(head.len(), 4);
        assert_eq!(head.metadata("split"), Some("train"));
        assert_eq!(head.iter().last().map(|e| e.class_index()).transpose()?, Some(3));
        assert!(dataset.slice(5..11).is_err());
        Ok(())
    }

    #[test]
    fn test_concurrent_gather() {
        let dataset = Arc::new(InMemoryDataset::new(create_test_examples(100)));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let dataset = dataset.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let example = &dataset.gather(&[i]).unwrap()[0];
                        assert_eq!(example.image.int64_value(&[0, 0, 0]), i as i64);
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
    }
}
