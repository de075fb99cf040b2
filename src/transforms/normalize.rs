use super::pipeline::Transform;
use burn::{
    prelude::Backend,
    tensor::{Device, Tensor},
};

#[derive(Clone)]
pub struct MeanPixel<B: Backend> {
    pub mean: Tensor<B, 3>,
}

impl<B: Backend> MeanPixel<B> {
    /// Creates a `[3, 1, 1]` mean that broadcasts over a `[3, H, W]` image.
    pub fn new(mean: [f32; 3], device: &Device<B>) -> Self {
        let mean = Tensor::<B, 1>::from_floats(mean, device).reshape([3, 1, 1]);
        Self { mean }
    }

    /// `input - mean`, pixel values stay in their `0–255` scale.
    pub fn mold(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        input - self.mean.clone()
    }
}

impl<B: Backend> Transform<B> {
    /// Subtracts the mean pixel from every channel of the image.
    ///
    /// Values stay in the `0–255` scale with no division, so zero padding becomes `-mean`.
    pub fn mold(&mut self, mean_pixel: [f32; 3]) -> Self {
        self.image = MeanPixel::new(mean_pixel, &self.device).mold(self.image.clone());
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::pipeline::create_test_image;
    use burn::backend::{NdArray, ndarray::NdArrayDevice};
    use burn::tensor::{TensorData, Tolerance, ops::FloatElem};

    type B = NdArray<f32>;
    type FT = FloatElem<B>;

    #[test]
    fn mold_subtracts_channel_mean() {
        let device = &NdArrayDevice::default();
        let image = create_test_image(2, 1, [124, 117, 104]);

        let (image, _, _) = Transform::<B>::new(image, None, None, device)
            .mold([123.5, 116.5, 103.5])
            .finish()
            .unwrap();

        Tensor::<B, 3>::from_data([[[0.5, 0.5]], [[0.5, 0.5]], [[0.5, 0.5]]], device)
            .into_data()
            .assert_approx_eq::<FT>(&image.to_data(), Tolerance::default());
    }

    #[test]
    fn mean_broadcasts_over_every_pixel() {
        let device = &NdArrayDevice::default();
        let mean = MeanPixel::<B>::new([1.0, 2.0, 3.0], device);
        let image = Tensor::<B, 3>::from_data([[[10.0, 11.0]], [[20.0, 21.0]], [[30.0, 31.0]]], device);

        mean.mold(image)
            .into_data()
            .assert_approx_eq::<FT>(
                &TensorData::from([[[9.0, 10.0]], [[18.0, 19.0]], [[27.0, 28.0]]]),
                Tolerance::default(),
            );
    }
}
