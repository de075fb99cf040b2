use super::pipeline::Transform;
use burn::{
    prelude::Backend,
    tensor::{Bool, Int, Tensor, TensorData},
};
use image::{DynamicImage, GrayImage, imageops::FilterType};

/// Computes the factor that brings an image to the network's input size.
///
/// The short side is scaled up to `min_dim`, never down. If that pushes the long side past
/// `max_dim`, the long side is scaled to exactly `max_dim` instead. A zero limit is ignored.
pub fn resize_scale(height: usize, width: usize, min_dim: usize, max_dim: usize) -> f64 {
    let mut scale = 1.0_f64;

    if min_dim > 0 {
        scale = (min_dim as f64 / height.min(width) as f64).max(1.0);
    }

    let image_max = height.max(width) as f64;
    if max_dim > 0 && (image_max * scale).round() > max_dim as f64 {
        scale = max_dim as f64 / image_max;
    }

    scale
}

// Nearest-neighbour resize of every mask channel, so instances stay strictly binary.
fn resize_masks<B: Backend>(
    masks: Tensor<B, 3, Bool>,
    new_h: usize,
    new_w: usize,
    device: &B::Device,
) -> Tensor<B, 3, Int> {
    let [n, height, width] = masks.dims();
    let mut resized = Vec::with_capacity(n * new_h * new_w);

    if n > 0 && height * width > 0 {
        let data: Vec<u8> = masks
            .into_data()
            .iter::<bool>()
            .map(|p| if p { 255 } else { 0 })
            .collect();

        for channel in data.chunks(height * width) {
            let channel = GrayImage::from_vec(width as u32, height as u32, channel.to_vec())
                .unwrap_or_else(|| GrayImage::new(width as u32, height as u32));
            let channel = image::imageops::resize(
                &channel,
                new_w as u32,
                new_h as u32,
                FilterType::Nearest,
            );
            resized.extend(channel.into_raw().into_iter().map(|p| (p > 127) as i32));
        }
    }

    Tensor::<B, 3, Int>::from_data(
        TensorData::new(resized, [n, new_h, new_w]).convert::<B::IntElem>(),
        device,
    )
}

impl<B: Backend> Transform<B> {
    /// Resizes the image and its masks to the square network input.
    ///
    /// The image is scaled by [`resize_scale`] with triangular interpolation and the masks
    /// with nearest-neighbour sampling. Both are then zero padded, centred, to
    /// `max_dim × max_dim`. The `window` records where the image content ended up.
    ///
    /// # Parameters
    ///
    /// * `min_dim` – Target length of the short side.
    /// * `max_dim` – Side of the square output, and the cap on the long side.
    ///
    pub fn resize_square(&mut self, min_dim: usize, max_dim: usize) -> Self {
        let [_ch, height, width] = self.image.dims();

        let scale = resize_scale(height, width, min_dim, max_dim);
        let new_h = ((height as f64 * scale).round() as usize).clamp(1, max_dim.max(1));
        let new_w = ((width as f64 * scale).round() as usize).clamp(1, max_dim.max(1));

        let mut image = self.image.clone();
        let mut masks = self.masks.clone().map(|m| m.int());

        if (new_h, new_w) != (height, width) {
            let resized = DynamicImage::from(Self::tensor_as_rgb_img(image))
                .resize_exact(new_w as u32, new_h as u32, FilterType::Triangle)
                .to_rgb8();
            image = Self::rgb_img_as_tensor(resized, &self.device);

            masks = self
                .masks
                .clone()
                .map(|m| resize_masks(m, new_h, new_w, &self.device));
        }

        let side = max_dim.max(new_h).max(new_w);
        let top = (side - new_h) / 2;
        let left = (side - new_w) / 2;

        self.image = Tensor::<B, 3>::zeros([3, side, side], &self.device)
            .slice_assign([0..3, top..top + new_h, left..left + new_w], image);

        self.masks = masks.map(|m| {
            let n = m.dims()[0];
            Tensor::<B, 3, Int>::zeros([n, side, side], &self.device)
                .slice_assign([0..n, top..top + new_h, left..left + new_w], m)
                .bool()
        });

        self.window = [top, left, top + new_h, left + new_w];

        self.clone()
    }
}
