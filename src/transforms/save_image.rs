use std::path::Path;

use super::pipeline::Transform;
use crate::mask::InstanceMasks;
use burn::prelude::Backend;
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

const MASK_ALPHA: f32 = 0.5;

/// Evenly spaced, fully saturated hues, one per instance.
pub fn instance_colors(count: usize) -> Vec<[u8; 3]> {
    (0..count)
        .map(|i| hsv_to_rgb(i as f32 / count as f32, 1.0, 1.0))
        .collect()
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let (p, q, t) = (v * (1.0 - s), v * (1.0 - f * s), v * (1.0 - (1.0 - f) * s));

    let (r, g, b) = match sector as i32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}

/// Blends `color` into every pixel set in mask `instance`.
pub fn apply_mask(image: &mut RgbImage, masks: &InstanceMasks, instance: usize, color: [u8; 3]) {
    let width = image.width() as usize;

    for (p, &set) in masks.channel(instance).iter().enumerate() {
        if !set {
            continue;
        }
        let px = image.get_pixel_mut((p % width) as u32, (p / width) as u32);
        for c in 0..3 {
            px.0[c] = (px.0[c] as f32 * (1.0 - MASK_ALPHA) + color[c] as f32 * MASK_ALPHA) as u8;
        }
    }
}

impl<B: Backend> Transform<B> {
    /// Renders the image with each instance mask blended in its own colour and outlined by
    /// its bounding box, then writes it to `path`.
    ///
    /// The image tensor is expected in `[C, H, W]` format with pixel values in `0–255`, so
    /// call this before [`Transform::mold`]. The format follows the file extension.
    ///
    /// # Returns
    ///
    /// The rendered image, which was also written to disk.
    pub fn save_overlay(&self, path: impl AsRef<Path>) -> Result<RgbImage, image::ImageError> {
        let mut image = Self::tensor_as_rgb_img(self.image.clone());

        if let Some(masks) = self.masks.clone() {
            let [count, height, width] = masks.dims();
            let data: Vec<bool> = masks.into_data().iter::<bool>().collect();
            let masks = InstanceMasks::from_channels(height, width, count, &data);
            let colors = instance_colors(count);

            for (i, color) in colors.iter().enumerate() {
                apply_mask(&mut image, &masks, i, *color);
            }

            for (bbox, color) in masks.bounding_boxes().iter().zip(colors) {
                if let Some([y1, x1, y2, x2]) = *bbox {
                    let rect = Rect::at(x1 as i32, y1 as i32).of_size((x2 - x1) as u32, (y2 - y1) as u32);
                    draw_hollow_rect_mut(&mut image, rect, Rgb(color));
                }
            }
        }

        image.save(path)?;

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::fixture_dir;
    use crate::mask::Polygon;
    use crate::transforms::pipeline::create_test_image;
    use burn::backend::{NdArray, ndarray::NdArrayDevice};

    type B = NdArray<f32>;

    #[test]
    fn colors_are_distinct() {
        let colors = instance_colors(3);
        assert_eq!(colors, vec![[255, 0, 0], [0, 255, 0], [0, 0, 255]]);
    }

    #[test]
    fn overlay_blends_masks_and_outlines_boxes() {
        let device = &NdArrayDevice::default();
        let dir = fixture_dir("overlay");

        let square = Polygon::new(vec![2.0, 6.0, 6.0, 2.0], vec![2.0, 2.0, 6.0, 6.0]);
        let masks = InstanceMasks::from_polygons(&[square], 10, 10).to_tensor::<B>(device);

        let t = Transform::new(create_test_image(10, 10, [0, 0, 200]), Some(masks), None, device);
        let rendered = t.save_overlay(dir.join("overlay.png")).unwrap();

        // Box outline in the instance colour.
        assert_eq!(rendered.get_pixel(2, 2), &Rgb([255, 0, 0]));
        // Interior blended half way between blue and red.
        assert_eq!(rendered.get_pixel(4, 4), &Rgb([127, 0, 100]));
        // Untouched background.
        assert_eq!(rendered.get_pixel(8, 8), &Rgb([0, 0, 200]));

        assert!(dir.join("overlay.png").exists());
        std::fs::remove_dir_all(dir).ok();
    }
}
