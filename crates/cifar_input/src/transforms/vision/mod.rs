//! src/transforms/vision/mod.rs
//!
//! Vision transforms for CIFAR-style preprocessing.
//!
//! # Module Organization
//!
//! All transforms work on channel-last tensors (`[..., H, W, C]`):
//!
//! ```text
//! transforms/vision/
//! ├── geometric.rs     → Pad + random crop
//! ├── augmentation.rs  → Random horizontal flip
//! ├── photometric.rs   → Precision conversion and mean/std normalization
//! ├── conversion.rs    → `image` -> tensor conversion
//! └── io.rs            → Image file decoding
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use crate::transforms::Transform;
//! use crate::transforms::vision::{Normalize, PadAndRandomCrop, RandomHorizontalFlip};
//!
//! let train_geometry = PadAndRandomCrop::new(4)?
//!     .then(RandomHorizontalFlip::new(0.5)?)
//!     .then(Normalize::cifar(Precision::Float32));
//! ```

pub mod augmentation;
pub mod conversion;
pub mod geometric;
pub mod io;
pub mod photometric;

pub use augmentation::RandomHorizontalFlip;
pub use conversion::ImageToTensor;
pub use geometric::PadAndRandomCrop;
pub use io::LoadImage;
pub use photometric::{
    convert_image_dtype, denormalize, normalize_convert_image, ConvertImageDtype, Normalize,
    CIFAR_MEAN, CIFAR_STD,
};
