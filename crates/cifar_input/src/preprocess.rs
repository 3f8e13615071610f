//! src/preprocess.rs
//!
//! Per-example preprocessing, chosen once per pipeline from the split.
//!
//! ```text
//! Train:  pad(4) → random crop → random flip
//!           ├── augmix          → [aug_count + 1, H, W, C]  (AugMix stack)
//!           ├── random_augment  → [aug_count, H, W, C]      (then normalize/convert)
//!           └── otherwise       → [H, W, C]                 (normalize/convert)
//!         label → one-hot if mixup_alpha > 0 or label_smoothing > 0, else scalar
//!
//! Eval:   normalize/convert → [H, W, C];  label → scalar
//! ```

use crate::augment::{AugMix, Augmenter, RandAugment};
use crate::catalog::Split;
use crate::config::AugmentationConfig;
use crate::dataloader::LoaderConfig;
use crate::example::Example;
use crate::precision::Precision;
use crate::transforms::vision::{
    ConvertImageDtype, Normalize, PadAndRandomCrop, RandomHorizontalFlip,
};
use crate::transforms::{Chain, Transform};
use anyhow::{ensure, Context, Result};
use log::warn;
use std::sync::Arc;
use tch::Tensor;

/// Zero padding added on every spatial side before the random crop.
pub const CROP_PADDING: i64 = 4;

// ============================================================================
// Shared stages
// ============================================================================

/// Final image stage: mean/std normalization, or a plain precision cast.
#[derive(Debug, Clone)]
pub enum ImageFinish {
    Normalize(Normalize),
    Convert(ConvertImageDtype),
}

impl ImageFinish {
    pub fn new(normalize: bool, precision: Precision) -> Self {
        if normalize {
            Self::Normalize(Normalize::cifar(precision))
        } else {
            Self::Convert(ConvertImageDtype(precision))
        }
    }
}

impl Transform<Tensor, Tensor> for ImageFinish {
    fn apply(&self, image: Tensor) -> Result<Tensor> {
        match self {
            Self::Normalize(normalize) => normalize.apply(image),
            Self::Convert(convert) => convert.apply(image),
        }
    }
}

/// Encodes a raw class index as a one-hot vector or a scalar, both in the
/// pipeline precision.
#[derive(Debug, Clone, Copy)]
pub struct LabelEncoder {
    num_classes: usize,
    one_hot: bool,
    precision: Precision,
}

impl LabelEncoder {
    pub fn new(num_classes: usize, one_hot: bool, precision: Precision) -> Self {
        Self {
            num_classes,
            one_hot,
            precision,
        }
    }
}

impl Transform<Tensor, Tensor> for LabelEncoder {
    fn apply(&self, label: Tensor) -> Result<Tensor> {
        ensure!(
            label.numel() == 1,
            "Expected a scalar class index, got shape {:?}",
            label.size()
        );
        let class = label.int64_value(&[]);
        ensure!(
            class >= 0 && (class as usize) < self.num_classes,
            "Label {} outside [0, {})",
            class,
            self.num_classes
        );

        let kind = self.precision.kind();
        if self.one_hot {
            Ok(Tensor::from(class)
                .one_hot(self.num_classes as i64)
                .to_kind(kind))
        } else {
            Ok(Tensor::from(class).to_kind(kind))
        }
    }
}

// ============================================================================
// TrainPreprocessor
// ============================================================================

#[derive(Debug)]
enum TrainImages {
    AugMix(AugMix),
    RandomAugment {
        augmenter: Arc<dyn Augmenter>,
        count: usize,
        finish: ImageFinish,
    },
    Plain(ImageFinish),
}

/// Training-split preprocessing: random crop and flip, then AugMix,
/// random-augment or plain normalization.
#[derive(Debug)]
pub struct TrainPreprocessor {
    geometry: Chain<PadAndRandomCrop, RandomHorizontalFlip, Tensor>,
    images: TrainImages,
    labels: LabelEncoder,
    image_shape: [i64; 3],
}

impl TrainPreprocessor {
    pub fn new(
        augmentation: &AugmentationConfig,
        normalize: bool,
        precision: Precision,
        num_classes: usize,
        image_shape: [i64; 3],
        augmenter: Arc<dyn Augmenter>,
    ) -> Result<Self> {
        let geometry =
            PadAndRandomCrop::new(CROP_PADDING)?.then(RandomHorizontalFlip::new(0.5)?);

        let images = if augmentation.augmix {
            if augmentation.random_augment {
                warn!("Both augmix and random_augment are set; AugMix supersedes random-augment");
            }
            TrainImages::AugMix(AugMix::from_config(augmentation, precision, augmenter)?)
        } else if augmentation.random_augment {
            ensure!(augmentation.aug_count > 0, "aug_count must be at least 1");
            TrainImages::RandomAugment {
                augmenter,
                count: augmentation.aug_count,
                finish: ImageFinish::new(normalize, precision),
            }
        } else {
            TrainImages::Plain(ImageFinish::new(normalize, precision))
        };

        Ok(Self {
            geometry,
            images,
            labels: LabelEncoder::new(num_classes, augmentation.one_hot_labels(), precision),
            image_shape,
        })
    }

    fn process_image(&self, image: Tensor) -> Result<Tensor> {
        let image = self.geometry.apply(image)?;
        match &self.images {
            TrainImages::AugMix(augmix) => augmix.apply(image),
            TrainImages::RandomAugment {
                augmenter,
                count,
                finish,
            } => {
                let copies = (0..*count)
                    .map(|_| augmenter.distort(&image))
                    .collect::<Result<Vec<_>>>()
                    .context("Random augmentation failed")?;
                finish.apply(Tensor::stack(&copies, 0))
            }
            TrainImages::Plain(finish) => finish.apply(image),
        }
    }
}

impl Transform<Example, Example> for TrainPreprocessor {
    fn apply(&self, example: Example) -> Result<Example> {
        check_image_shape(&example.image, self.image_shape)?;
        let label = self.labels.apply(example.label)?;
        let image = self.process_image(example.image)?;
        Ok(Example::new(image, label))
    }
}

// ============================================================================
// EvalPreprocessor
// ============================================================================

/// Evaluation preprocessing: normalization (or a cast) only, scalar labels.
#[derive(Debug, Clone)]
pub struct EvalPreprocessor {
    finish: ImageFinish,
    labels: LabelEncoder,
    image_shape: [i64; 3],
}

impl EvalPreprocessor {
    pub fn new(
        normalize: bool,
        precision: Precision,
        num_classes: usize,
        image_shape: [i64; 3],
    ) -> Self {
        Self {
            finish: ImageFinish::new(normalize, precision),
            labels: LabelEncoder::new(num_classes, false, precision),
            image_shape,
        }
    }
}

impl Transform<Example, Example> for EvalPreprocessor {
    fn apply(&self, example: Example) -> Result<Example> {
        check_image_shape(&example.image, self.image_shape)?;
        let label = self.labels.apply(example.label)?;
        let image = self.finish.apply(example.image)?;
        Ok(Example::new(image, label))
    }
}

fn check_image_shape(image: &Tensor, expected: [i64; 3]) -> Result<()> {
    ensure!(
        image.size() == expected,
        "Expected image shape {:?}, got {:?}",
        expected,
        image.size()
    );
    Ok(())
}

// ============================================================================
// Preprocessor
// ============================================================================

/// The preprocessing variant of a pipeline.
#[derive(Debug)]
pub enum Preprocessor {
    Train(TrainPreprocessor),
    Eval(EvalPreprocessor),
}

impl Preprocessor {
    /// Training preprocessing for `Split::Train`; evaluation preprocessing for
    /// `Test` and `Validation`.
    pub fn for_split(
        split: Split,
        options: &LoaderConfig,
        num_classes: usize,
        image_shape: [i64; 3],
    ) -> Result<Self> {
        if split.is_train() {
            let augmenter = options
                .augmenter
                .clone()
                .unwrap_or_else(|| Arc::new(RandAugment::default()));
            Ok(Self::Train(TrainPreprocessor::new(
                &options.augmentation,
                options.normalize,
                options.precision,
                num_classes,
                image_shape,
                augmenter,
            )?))
        } else {
            Ok(Self::Eval(EvalPreprocessor::new(
                options.normalize,
                options.precision,
                num_classes,
                image_shape,
            )))
        }
    }
}

impl Transform<Example, Example> for Preprocessor {
    fn apply(&self, example: Example) -> Result<Example> {
        match self {
            Self::Train(train) => train.apply(example),
            Self::Eval(eval) => eval.apply(example),
        }
    }
}
