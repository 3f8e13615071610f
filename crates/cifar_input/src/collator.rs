use crate::batch::Batch;
use crate::example::Example;
use anyhow::{bail, Result};
use tch::Tensor;

/// A `Collator` defines how to combine multiple [`Example`]s into a [`Batch`].
pub trait Collator {
    fn collate(&self, examples: &[Example]) -> Result<Batch>;
}

/// A `Collator` that stacks images and labels with identical shapes
/// along the batch dimension (dim 0). There is no padding logic, so an
/// example with an inconsistent shape is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackCollator;

impl StackCollator {
    fn stack_checked(field: &str, tensors: &[&Tensor]) -> Result<Tensor> {
        let reference_shape = tensors[0].size();
        for (i, tensor) in tensors.iter().enumerate() {
            if tensor.size() != reference_shape {
                bail!(
                    "Shape mismatch in example {} for '{}': expected {:?}, got {:?}",
                    i,
                    field,
                    reference_shape,
                    tensor.size()
                );
            }
        }
        Ok(Tensor::stack(tensors, 0))
    }
}

impl Collator for StackCollator {
    fn collate(&self, examples: &[Example]) -> Result<Batch> {
        if examples.is_empty() {
            bail!("Cannot collate empty example list");
        }

        let images: Vec<&Tensor> = examples.iter().map(|e| &e.image).collect();
        let labels: Vec<&Tensor> = examples.iter().map(|e| &e.label).collect();

        Ok(Batch {
            images: Self::stack_checked("image", &images)?,
            labels: Self::stack_checked("label", &labels)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn test_stack_collator_shapes() -> Result<()> {
        let examples: Vec<Example> = (0..4)
            .map(|i| {
                Example::new(
                    Tensor::zeros([3, 5, 5, 3], (Kind::Float, Device::Cpu)),
                    Tensor::from(i as i64),
                )
            })
            .collect();

        let batch = StackCollator.collate(&examples)?;
        assert_eq!(batch.images.size(), vec![4, 3, 5, 5, 3]);
        assert_eq!(batch.labels.size(), vec![4]);
        Ok(())
    }

    #[test]
    fn test_stack_collator_rejects_empty_and_mismatch() {
        assert!(StackCollator.collate(&[]).is_err());

        let e1 = Example::new(
            Tensor::zeros([2, 2, 3], (Kind::Float, Device::Cpu)),
            Tensor::from(0i64),
        );
        let e2 = Example::new(
            Tensor::zeros([3, 3, 3], (Kind::Float, Device::Cpu)),
            Tensor::from(1i64),
        );
        let err = StackCollator.collate(&[e1, e2]).unwrap_err();
        assert!(err.to_string().contains("image"));
    }

    #[test]
    fn test_stack_collator_rejects_mixed_label_encoding() {
        let scalar = Example::new(
            Tensor::zeros([2, 2, 3], (Kind::Float, Device::Cpu)),
            Tensor::from(0i64),
        );
        let one_hot = Example::new(
            Tensor::zeros([2, 2, 3], (Kind::Float, Device::Cpu)),
            Tensor::zeros([10], (Kind::Float, Device::Cpu)),
        );
        assert!(StackCollator.collate(&[scalar, one_hot]).is_err());
    }
}
