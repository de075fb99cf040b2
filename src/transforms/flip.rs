use crate::transforms::pipeline::Transform;
use burn::{
    prelude::Backend,
    tensor::{Int, Tensor, TensorData},
};

// `[len - 1, ..., 1, 0]`, for gathering columns in mirrored order.
fn reversed_index<B: Backend>(len: usize, device: &B::Device) -> Tensor<B, 1, Int> {
    let index: Vec<i64> = (0..len as i64).rev().collect();
    Tensor::<B, 1, Int>::from_data(TensorData::new(index, [len]).convert::<B::IntElem>(), device)
}

impl<B: Backend> Transform<B> {
    /// Horizontally flips the image and its masks.
    ///
    /// Both are mirrored along the width axis, and the content window is mirrored with them,
    /// so padding added by an earlier resize stays described correctly.
    ///
    /// # Returns
    ///
    /// A [`Transform`] instance containing the flipped image and masks, ready for further
    /// transformations or finalization.
    pub fn horizontal_flip(&mut self) -> Self {
        let [_ch, _height, width] = self.image.dims();
        let columns = reversed_index::<B>(width, &self.device);

        self.image = self.image.clone().select(2, columns.clone());
        self.masks = self
            .masks
            .clone()
            .map(|m| m.int().select(2, columns).bool());

        let [y1, x1, y2, x2] = self.window;
        self.window = [y1, width - x2, y2, width - x1];

        self.clone()
    }

    /// Applies [`Transform::horizontal_flip`] with probability `p`.
    pub fn random_horizontal_flip(&mut self, p: f32) -> Self {
        if !self.should_apply(p) {
            return self.clone();
        }
        self.horizontal_flip()
    }
}
