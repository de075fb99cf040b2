use super::pipeline::Transform;
use burn::{
    prelude::Backend,
    tensor::{Int, Tensor, TensorData},
};

impl<B: Backend> Transform<B> {
    /// Removes instances whose mask no longer covers a single pixel.
    ///
    /// A tiny region can vanish when the image is scaled down, and a polygon drawn entirely
    /// outside the image never covers anything. Their labels are dropped with them.
    ///
    /// # Returns
    ///
    /// A [`Transform`] with only non-empty masks remaining. When no instance survives, both
    /// `masks` and `labels` become `None`.
    pub fn clean_masks(&mut self) -> Self {
        let Some(masks) = self.masks.clone() else {
            return self.clone();
        };

        let areas: Vec<i64> = masks
            .clone()
            .int()
            .sum_dim(2)
            .sum_dim(1)
            .flatten::<1>(0, 2)
            .into_data()
            .iter::<i64>()
            .collect();

        let keep: Vec<i64> = areas
            .iter()
            .enumerate()
            .filter(|(_, area)| **area > 0)
            .map(|(i, _)| i as i64)
            .collect();

        if keep.len() == areas.len() {
            return self.clone();
        }

        if keep.is_empty() {
            self.masks = None;
            self.labels = None;
            return self.clone();
        }

        let keep = Tensor::<B, 1, Int>::from_data(
            TensorData::new(keep.clone(), [keep.len()]).convert::<B::IntElem>(),
            &self.device,
        );

        self.masks = Some(masks.int().select(0, keep.clone()).bool());
        self.labels = self.labels.clone().map(|labels| labels.select(0, keep));

        self.clone()
    }
}
