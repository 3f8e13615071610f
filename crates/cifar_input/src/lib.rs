pub mod augment;
pub mod batch;
pub mod catalog;
pub mod collator;
pub mod config;
pub mod dataloader;
pub mod dataset;
pub mod error;
pub mod example;
pub mod precision;
pub mod preprocess;
pub mod sampler;
pub mod transforms;

pub use augment::{adaptive_mixup, augment_and_mix, mixup, AugMix, Augmenter, RandAugment};
pub use batch::Batch;
pub use catalog::{CifarCatalog, DatasetCatalog, DatasetInfo, ImageFolderCatalog, InMemoryCatalog, Split, SplitSpec};
pub use collator::StackCollator;
pub use config::{AugmentationConfig, MixupCoeff};
pub use dataloader::{load_dataset, BatchStream, LoaderConfig, TrainCarveOut};
pub use dataset::InMemoryDataset;
pub use error::ConfigError;
pub use example::Example;
pub use precision::Precision;
pub use preprocess::Preprocessor;
