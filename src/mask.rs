use burn::tensor::{Bool, Tensor, TensorData, backend::Backend};

/// Closed polygon given by parallel vertex coordinate arrays, in pixel units.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

impl Polygon {
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Self {
        Self { xs, ys }
    }

    pub fn len(&self) -> usize {
        self.xs.len().min(self.ys.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `(x, y)` lies on one of the polygon's edges, vertices included.
    pub fn on_boundary(&self, x: f64, y: f64) -> bool {
        let n = self.len();
        (0..n).any(|i| {
            let j = if i == 0 { n - 1 } else { i - 1 };
            on_segment(x, y, (self.xs[j], self.ys[j]), (self.xs[i], self.ys[i]))
        })
    }

    /// Point-in-polygon test where the boundary counts as inside.
    ///
    /// Points on an edge or a vertex are inside. Everything else follows the even-odd crossing
    /// rule. Polygons of one or two vertices therefore cover exactly their point or segment.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let n = self.len();
        if n == 0 {
            return false;
        }
        if self.on_boundary(x, y) {
            return true;
        }
        if n < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;

        for i in 0..n {
            let (xi, yi) = (self.xs[i], self.ys[i]);
            let (xj, yj) = (self.xs[j], self.ys[j]);

            let spans = (yi <= y && y < yj) || (yj <= y && y < yi);
            if spans && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }

        inside
    }

    /// Scan-fills the polygon, returning the `(row, col)` of every pixel whose centre lies
    /// inside it or on its boundary.
    ///
    /// Only the vertex bounding box is scanned, and the scan is clipped to an image of
    /// `height × width` pixels. Vertices may lie outside the image.
    pub fn rasterize(&self, height: usize, width: usize) -> Vec<(usize, usize)> {
        let mut pixels = vec![];
        if self.is_empty() || height == 0 || width == 0 {
            return pixels;
        }

        let (min_y, max_y) = min_max(&self.ys[..self.len()]);
        let (min_x, max_x) = min_max(&self.xs[..self.len()]);

        if max_y < 0.0 || max_x < 0.0 {
            return pixels;
        }

        let min_r = min_y.max(0.0) as usize;
        let min_c = min_x.max(0.0) as usize;
        let max_r = (max_y.ceil() as usize).min(height - 1);
        let max_c = (max_x.ceil() as usize).min(width - 1);

        for r in min_r..=max_r {
            for c in min_c..=max_c {
                if self.contains(c as f64, r as f64) {
                    pixels.push((r, c));
                }
            }
        }

        pixels
    }
}

fn on_segment(x: f64, y: f64, (x0, y0): (f64, f64), (x1, y1): (f64, f64)) -> bool {
    let cross = (x1 - x0) * (y - y0) - (y1 - y0) * (x - x0);
    cross.abs() <= 1e-9
        && x >= x0.min(x1)
        && x <= x0.max(x1)
        && y >= y0.min(y1)
        && y <= y0.max(y1)
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Per-instance binary masks of one image, a `(height, width, instances)` boolean array.
///
/// Storage is row major with the instance axis innermost, so `data[(r * width + c) * n + i]`
/// is pixel `(r, c)` of instance `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMasks {
    height: usize,
    width: usize,
    count: usize,
    data: Vec<bool>,
}

impl InstanceMasks {
    /// Allocates `count` empty masks of `height × width` pixels.
    pub fn zeros(height: usize, width: usize, count: usize) -> Self {
        Self {
            height,
            width,
            count,
            data: vec![false; height * width * count],
        }
    }

    /// Rasterizes each polygon into its own channel, in order.
    pub fn from_polygons(polygons: &[Polygon], height: usize, width: usize) -> Self {
        let mut masks = Self::zeros(height, width, polygons.len());

        for (i, polygon) in polygons.iter().enumerate() {
            for (r, c) in polygon.rasterize(height, width) {
                masks.set(r, c, i, true);
            }
        }

        masks
    }

    /// Builds masks from channel-first data, `count` consecutive `height × width` bitmaps.
    pub fn from_channels(height: usize, width: usize, count: usize, channels: &[bool]) -> Self {
        let mut masks = Self::zeros(height, width, count);
        let plane = height * width;

        for (i, channel) in channels.chunks(plane.max(1)).take(count).enumerate() {
            for (p, &value) in channel.iter().enumerate() {
                if value {
                    masks.set(p / width, p % width, i, true);
                }
            }
        }

        masks
    }

    /// `[height, width, instances]`
    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, self.count]
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn get(&self, row: usize, col: usize, instance: usize) -> bool {
        self.data[self.index(row, col, instance)]
    }

    pub fn set(&mut self, row: usize, col: usize, instance: usize, value: bool) {
        let index = self.index(row, col, instance);
        self.data[index] = value;
    }

    fn index(&self, row: usize, col: usize, instance: usize) -> usize {
        assert!(row < self.height && col < self.width && instance < self.count);
        (row * self.width + col) * self.count + instance
    }

    /// Returns mask `instance` as a row-major `height × width` bitmap.
    pub fn channel(&self, instance: usize) -> Vec<bool> {
        self.data
            .iter()
            .skip(instance)
            .step_by(self.count.max(1))
            .copied()
            .collect()
    }

    /// Number of pixels set in mask `instance`.
    pub fn area(&self, instance: usize) -> usize {
        self.channel(instance).iter().filter(|&&p| p).count()
    }

    /// Tight box around each mask as `[y1, x1, y2, x2]`, end coordinates exclusive.
    ///
    /// Masks without a single set pixel have no box.
    pub fn bounding_boxes(&self) -> Vec<Option<[usize; 4]>> {
        let mut boxes: Vec<Option<[usize; 4]>> = vec![None; self.count];

        for r in 0..self.height {
            for c in 0..self.width {
                for (i, bbox) in boxes.iter_mut().enumerate() {
                    if !self.get(r, c, i) {
                        continue;
                    }
                    *bbox = Some(match bbox {
                        None => [r, c, r + 1, c + 1],
                        Some([y1, x1, y2, x2]) => {
                            [(*y1).min(r), (*x1).min(c), (*y2).max(r + 1), (*x2).max(c + 1)]
                        }
                    });
                }
            }
        }

        boxes
    }

    /// Converts the masks into a channel-first `[instances, height, width]` tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3, Bool> {
        let mut channels = Vec::with_capacity(self.data.len());
        for i in 0..self.count {
            channels.extend(self.channel(i));
        }

        Tensor::<B, 3, Bool>::from_data(
            TensorData::new(channels, [self.count, self.height, self.width]),
            device,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{NdArray, ndarray::NdArrayDevice};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon {
        Polygon::new(vec![x0, x1, x1, x0], vec![y0, y0, y1, y1])
    }

    #[test]
    fn square_includes_every_edge() {
        let pixels = square(1.0, 1.0, 4.0, 3.0).rasterize(10, 10);

        let expected: Vec<(usize, usize)> = (1..=3)
            .flat_map(|r| (1..=4).map(move |c| (r, c)))
            .collect();
        assert_eq!(pixels, expected);
    }

    #[test]
    fn vertices_and_far_edges_are_filled() {
        let rect = Polygon::new(vec![2.0, 30.0, 30.0, 2.0], vec![2.0, 2.0, 20.0, 20.0]);
        let pixels = rect.rasterize(25, 50);

        assert_eq!(pixels.len(), 29 * 19);
        for corner in [(2, 2), (2, 30), (20, 30), (20, 2)] {
            assert!(pixels.contains(&corner));
        }
        assert!(!pixels.contains(&(21, 30)));
        assert!(!pixels.contains(&(20, 31)));
    }

    #[test]
    fn collinear_sliver_draws_its_line() {
        let sliver = Polygon::new(vec![5.0, 5.0, 5.0], vec![0.0, 9.0, 4.0]);
        let pixels = sliver.rasterize(12, 12);

        let expected: Vec<(usize, usize)> = (0..=9).map(|r| (r, 5)).collect();
        assert_eq!(pixels, expected);
    }

    #[test]
    fn triangle_pixels_lie_inside() {
        let triangle = Polygon::new(vec![10.0, 200.0, 390.0], vec![20.0, 280.0, 30.0]);
        let pixels = triangle.rasterize(300, 400);

        assert!(!pixels.is_empty());
        assert!(pixels.contains(&(40, 200)));
        assert!(!pixels.contains(&(290, 200)));
        assert!(pixels.iter().all(|&(r, c)| triangle.contains(c as f64, r as f64)));
    }

    #[test]
    fn rasterize_clips_to_image() {
        let pixels = square(-5.0, -5.0, 20.0, 20.0).rasterize(4, 6);
        assert_eq!(pixels.len(), 24);
        assert!(pixels.iter().all(|&(r, c)| r < 4 && c < 6));

        assert!(square(-10.0, -10.0, -2.0, -2.0).rasterize(4, 6).is_empty());
    }

    #[test]
    fn degenerate_polygons() {
        assert!(Polygon::new(vec![], vec![]).rasterize(5, 5).is_empty());
        assert!(square(1.0, 1.0, 3.0, 3.0).rasterize(0, 5).is_empty());

        let segment = Polygon::new(vec![1.0, 3.0], vec![1.0, 3.0]).rasterize(5, 5);
        assert_eq!(segment, vec![(1, 1), (2, 2), (3, 3)]);
        assert_eq!(Polygon::new(vec![2.0], vec![4.0]).rasterize(5, 5), vec![(4, 2)]);
    }

    #[test]
    fn one_channel_per_polygon() {
        let polygons = vec![square(0.0, 0.0, 2.0, 2.0), square(3.0, 1.0, 5.0, 4.0)];
        let masks = InstanceMasks::from_polygons(&polygons, 6, 8);

        assert_eq!(masks.shape(), [6, 8, 2]);
        assert_eq!(masks.area(0), 9);
        assert_eq!(masks.area(1), 12);
        assert!(masks.get(0, 0, 0));
        assert!(!masks.get(0, 0, 1));
        assert!(masks.get(1, 3, 1));
        assert_eq!(masks.channel(1).len(), 48);
    }

    #[test]
    fn bounding_boxes_are_tight() {
        let polygons = vec![
            square(2.0, 1.0, 5.0, 3.0),
            square(-4.0, -4.0, -1.0, -1.0),
        ];
        let masks = InstanceMasks::from_polygons(&polygons, 8, 8);

        assert_eq!(masks.bounding_boxes(), vec![Some([1, 2, 4, 6]), None]);
    }

    #[test]
    fn to_tensor_is_channel_first() {
        type B = NdArray<f32>;
        let device = &NdArrayDevice::default();

        let masks = InstanceMasks::from_polygons(&[square(0.0, 0.0, 0.0, 1.0)], 3, 2);
        let tensor = masks.to_tensor::<B>(device);

        assert_eq!(tensor.dims(), [1, 3, 2]);
        assert_eq!(
            tensor.to_data().to_vec::<bool>().unwrap(),
            vec![true, false, true, false, false, false]
        );
    }
}
