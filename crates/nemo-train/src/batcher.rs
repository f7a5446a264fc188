//! Burn batching of decoded samples

use crate::dataset::Sample;
use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Int, Tensor, TensorData},
};

/// A batch of images with one-hot and index targets
#[derive(Clone, Debug)]
pub struct PatchBatch<B: Backend> {
    /// `[batch, 3, size, size]`
    pub images: Tensor<B, 4>,
    /// One-hot targets, `[batch, classes]`
    pub targets: Tensor<B, 2>,
    /// Class indices, `[batch]`
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> PatchBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug)]
pub struct PatchBatcher {
    image_size: usize,
    num_classes: usize,
}

impl PatchBatcher {
    pub fn new(image_size: usize, num_classes: usize) -> Self {
        Self {
            image_size,
            num_classes,
        }
    }
}

impl<B: Backend> Batcher<B, Sample, PatchBatch<B>> for PatchBatcher {
    fn batch(&self, items: Vec<Sample>, device: &B::Device) -> PatchBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let mut pixels = Vec::with_capacity(batch_size * 3 * size * size);
        let mut targets = Vec::with_capacity(batch_size * self.num_classes);
        let mut labels = Vec::with_capacity(batch_size);

        for item in items {
            pixels.extend_from_slice(&item.image.data);
            targets.extend_from_slice(&item.target);
            labels.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 3, size, size]),
            device,
        );
        let targets = Tensor::<B, 2>::from_data(
            TensorData::new(targets, [batch_size, self.num_classes]),
            device,
        );
        let labels = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [batch_size]), device);

        PatchBatch {
            images,
            targets,
            labels,
        }
    }
}
