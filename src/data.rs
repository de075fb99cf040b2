use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::{Bool, Int},
};
use image::RgbImage;
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::sync::{Arc, Mutex};

use crate::config::TrainingConfig;
use crate::mask::InstanceMasks;
use crate::transforms::pipeline::{Transform, labels_as_tensor};

/// One dataset image with the masks and class IDs of its annotated instances.
#[derive(Clone, Debug)]
pub struct MaskItem {
    pub image_id: usize,
    pub image: RgbImage,
    pub masks: InstanceMasks,
    pub class_ids: Vec<i32>,
}

/// A batch of molded images and their padded ground truth.
///
/// Every image in the batch carries `M` instance slots, the largest instance count in the
/// batch. Slots past an image's own instances have an all-false mask and class ID `0`.
#[derive(Clone, Debug)]
pub struct MaskBatch<B: Backend> {
    /// `[N, 3, D, D]` mean-subtracted images
    pub images: Tensor<B, 4>,
    /// `[N, M, D, D]`
    pub masks: Tensor<B, 4, Bool>,
    /// `[N, M]`, `0` marks padding
    pub class_ids: Tensor<B, 2, Int>,
    /// `[N, 4]` image content as `[y1, x1, y2, x2]` inside the padding
    pub windows: Tensor<B, 2, Int>,
    pub image_ids: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BatchType {
    Train,
    Valid,
}

/// Turns [`MaskItem`]s into [`MaskBatch`]es for the data loader.
///
/// Clones share one random stream seeded from the config, so an image gets a fresh
/// augmentation draw on every pass over the dataset.
#[derive(Clone, Debug)]
pub struct MaskBatcher {
    min_dim: usize,
    max_dim: usize,
    max_instances: usize,
    mean_pixel: [f32; 3],
    augment: bool,
    rng: Arc<Mutex<StdRng>>,
}

impl MaskBatcher {
    pub fn new(config: &TrainingConfig, batch_type: BatchType) -> Self {
        Self {
            min_dim: config.image_min_dim,
            max_dim: config.image_max_dim,
            max_instances: config.max_gt_instances,
            mean_pixel: config.mean_pixel,
            augment: config.augment && batch_type == BatchType::Train,
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(config.seed))),
        }
    }

    // Seed for one item's transform, drawn from the shared stream.
    fn next_seed(&self) -> u64 {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.random::<u64>()
    }

    fn mold_item<B: Backend>(&self, item: MaskItem, device: &B::Device) -> (Tensor<B, 3>, Option<Tensor<B, 3, Bool>>, Vec<i32>, [usize; 4]) {
        let image = Transform::<B>::rgb_img_as_tensor(item.image, device);
        let masks = (item.masks.count() > 0).then(|| item.masks.to_tensor::<B>(device));
        let labels = (!item.class_ids.is_empty()).then(|| labels_as_tensor::<B>(&item.class_ids, device));
        let rng = StdRng::seed_from_u64(self.next_seed());

        let mut t = Transform::new_seeded(image, masks, labels, rng).resize_square(self.min_dim, self.max_dim);

        if self.augment {
            t = t.random_horizontal_flip(0.5);
        }

        let t = t.clean_masks().mold(self.mean_pixel);
        let window = t.window;

        // clean_masks keeps masks and labels the same length, so this cannot fail.
        let (image, masks, labels) = match t.finish() {
            Ok(finished) => finished,
            Err(e) => panic!("Inconsistent transform output for image {}: {}", item.image_id, e),
        };

        let class_ids = labels
            .map(|l| l.into_data().iter::<i64>().map(|id| id as i32).collect())
            .unwrap_or_default();

        (image, masks, class_ids, window)
    }
}

impl<B: Backend> Batcher<B, MaskItem, MaskBatch<B>> for MaskBatcher {
    fn batch(&self, items: Vec<MaskItem>, device: &B::Device) -> MaskBatch<B> {
        let image_ids: Vec<usize> = items.iter().map(|item| item.image_id).collect();
        let molded: Vec<_> = items.into_iter().map(|item| self.mold_item::<B>(item, device)).collect();

        let side = self.max_dim;
        let slots = molded
            .iter()
            .map(|(_, _, ids, _)| ids.len())
            .max()
            .unwrap_or(0)
            .clamp(1, self.max_instances.max(1));

        let mut images = Vec::with_capacity(molded.len());
        let mut masks = Vec::with_capacity(molded.len());
        let mut class_ids = Vec::with_capacity(molded.len() * slots);
        let mut windows = Vec::with_capacity(molded.len() * 4);

        for (image, item_masks, ids, window) in molded {
            images.push(image);

            let n = ids.len().min(slots);
            let mut padded = Tensor::<B, 3, Int>::zeros([slots, side, side], device);
            if let Some(item_masks) = item_masks {
                padded = padded.slice_assign([0..n, 0..side, 0..side], item_masks.int().slice([0..n, 0..side, 0..side]));
            }
            masks.push(padded);

            class_ids.extend(ids.iter().take(n).map(|&id| id as i64));
            class_ids.extend(std::iter::repeat(0).take(slots - n));
            windows.extend(window.iter().map(|&w| w as i64));
        }

        let batch_size = images.len();

        MaskBatch {
            images: Tensor::stack(images, 0),
            masks: Tensor::stack::<4>(masks, 0).bool(),
            class_ids: Tensor::from_data(
                TensorData::new(class_ids, [batch_size, slots]).convert::<B::IntElem>(),
                device,
            ),
            windows: Tensor::from_data(
                TensorData::new(windows, [batch_size, 4]).convert::<B::IntElem>(),
                device,
            ),
            image_ids,
        }
    }
}
