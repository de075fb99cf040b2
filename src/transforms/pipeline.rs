use burn::tensor::{Bool, Int, Tensor, TensorData, backend::Backend};
use image::RgbImage;

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Maximum pixel value for a RGB8 pixel
pub const MAX_PIXEL_VAL: f32 = 255.0;

/// A pipeline for chaining the image and mask operations that turn a dataset item into a
/// network input.
///
/// `Transform` wraps an image tensor along with the optional instance masks and class labels
/// of the objects in it, so every geometric operation moves all three together:
/// - Resizing to the square network input, with zero padding
/// - Horizontal flipping
/// - Dropping instances whose mask no longer covers any pixel
/// - Mean pixel subtraction
/// - Saving the image with its masks drawn on top
///
/// # Type Parameters
///
/// * `B` – The backend used for tensor operations, implementing the `Backend` trait.
/// * `R` – Random number generator used for stochastic augmentations (default: `StdRng`).
///
/// # Fields
///
/// * `image` – The 3-channel image tensor in `[C, H, W]` format.
/// * `masks` – Optional boolean tensor of instance masks in `[N, H, W]` format.
/// * `labels` – Optional tensor of class IDs, one per mask.
/// * `window` – `[y1, x1, y2, x2]` of the image content inside any padding.
/// * `device` – Backend device where tensors reside (CPU or GPU).
/// * `rng` – Random number generator for stochastic transformations.
///
#[derive(Clone, Debug)]
pub struct Transform<B, R = StdRng>
where
    B: Backend,
    R: rand::Rng,
{
    pub image: Tensor<B, 3>,
    pub masks: Option<Tensor<B, 3, Bool>>,
    pub labels: Option<Tensor<B, 1, Int>>,
    pub window: [usize; 4],
    pub device: <B as Backend>::Device,
    pub rng: R,
}

/// The processed image, masks and labels handed back by [`Transform::finish`].
pub type Finished<B> = (
    Tensor<B, 3>,
    Option<Tensor<B, 3, Bool>>,
    Option<Tensor<B, 1, Int>>,
);

impl<B: Backend, R: rand::Rng> Transform<B, R> {
    /// Creates a new [`Transform`] with an explicitly provided random number generator, which
    /// makes stochastic augmentations reproducible.
    pub fn new_seeded(
        image: Tensor<B, 3>,
        masks: Option<Tensor<B, 3, Bool>>,
        labels: Option<Tensor<B, 1, Int>>,
        rng: R,
    ) -> Self {
        let device = image.device().clone();
        let [_ch, height, width] = image.dims();
        Self {
            image,
            masks,
            labels,
            window: [0, 0, height, width],
            device,
            rng,
        }
    }

    /// Returns `true` with probability `p`, clamped to `[0.0, 1.0]`.
    pub fn should_apply(&mut self, p: f32) -> bool {
        self.rng.random::<f32>() < p.clamp(0.0, 1.0)
    }

    /// Number of instances currently carried by the pipeline.
    pub fn instance_count(&self) -> usize {
        self.masks.as_ref().map(|m| m.dims()[0]).unwrap_or(0)
    }

    /// Finalizes a chained transformation pipeline and returns the processed image, masks and
    /// labels.
    ///
    /// # Errors
    ///
    /// When the mask and label counts disagree.
    pub fn finish(self) -> Result<Finished<B>, String> {
        if let (Some(masks), Some(labels)) = (&self.masks, &self.labels) {
            let (n_masks, n_labels) = (masks.dims()[0], labels.dims()[0]);
            if n_masks != n_labels {
                return Err(format!("{} masks but {} labels", n_masks, n_labels));
            }
        }

        Ok((self.image, self.masks, self.labels))
    }
}

impl<B: Backend> Transform<B> {
    /// Creates a new instance from an `RgbImage` and optional masks and labels.
    ///
    /// # Example
    /// ```rust,ignore
    /// let (masks, class_ids) = dataset.load_mask(0)?;
    /// let t = Transform::new(
    ///     dataset.load_image(0)?,
    ///     Some(masks.to_tensor(&device)),
    ///     Some(labels_as_tensor(&class_ids, &device)),
    ///     &device,
    /// );
    /// ```
    pub fn new(
        image: RgbImage,
        masks: Option<Tensor<B, 3, Bool>>,
        labels: Option<Tensor<B, 1, Int>>,
        device: &<B as Backend>::Device,
    ) -> Self {
        let image = Self::rgb_img_as_tensor(image, device);
        Self::new_seeded(image, masks, labels, StdRng::from_os_rng())
    }

    /// Converts an `image::RgbImage` into a 3-channel tensor in `[C, H, W]` format.
    ///
    /// Pixel values are converted to `f32` and stay in the `0–255` range.
    pub fn rgb_img_as_tensor(image: RgbImage, device: &B::Device) -> Tensor<B, 3> {
        let (width, height) = image.dimensions();
        let img_vec: Vec<f32> = image.into_raw().iter().map(|&p| p as f32).collect();
        Tensor::<B, 3>::from_data(
            TensorData::new(img_vec, [height as usize, width as usize, 3])
                .convert::<B::FloatElem>(),
            device,
        )
        .permute([2, 0, 1])
    }

    /// Converts a `[C, H, W]` tensor back into an `RgbImage`, clamping to `0–255`.
    pub fn tensor_as_rgb_img(image: Tensor<B, 3>) -> RgbImage {
        let [_ch, height, width] = image.dims();

        let buf: Vec<u8> = image
            .clamp(0.0, MAX_PIXEL_VAL)
            .permute([1, 2, 0])
            .into_data()
            .iter::<f32>()
            .map(|p| p as u8)
            .collect();

        RgbImage::from_vec(width as u32, height as u32, buf)
            .unwrap_or_else(|| RgbImage::new(width as u32, height as u32))
    }
}

/// Converts class IDs into a label tensor.
pub fn labels_as_tensor<B: Backend>(class_ids: &[i32], device: &B::Device) -> Tensor<B, 1, Int> {
    Tensor::<B, 1, Int>::from_data(
        TensorData::new(class_ids.to_vec(), [class_ids.len()]).convert::<B::IntElem>(),
        device,
    )
}

/// Creates an RGB test image of the given size filled with `pattern`.
pub fn create_test_image(width: u32, height: u32, pattern: [u8; 3]) -> RgbImage {
    let mut img = RgbImage::new(width, height);
    let img_pattern: image::Rgb<u8> = image::Rgb(pattern);

    for px in img.pixels_mut() {
        *px = img_pattern;
    }

    img
}
