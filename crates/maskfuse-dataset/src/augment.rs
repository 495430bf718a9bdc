//! Paired image/mask augmentation.
//!
//! The same random transform is drawn once per sample and applied to both the
//! image and its mask, so the pair stays spatially aligned.

use maskfuse_types::{FuseError, FuseResult};
use ndarray::{Array1, Array3, Array4, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const STD_EPSILON: f32 = 1e-7;

#[derive(Debug, Clone)]
pub struct AugmentConfig {
    pub batch_size: usize,
    /// Max rotation in degrees; the angle is drawn from `[-rotation, rotation]`.
    pub rotation: f32,
    /// Probability of mirroring left/right.
    pub flip_horizontal_prob: f32,
    /// Probability of mirroring top/bottom.
    pub flip_vertical_prob: f32,
    /// Max horizontal shift as a fraction of the width.
    pub width_shift: f32,
    /// Max vertical shift as a fraction of the height.
    pub height_shift: f32,
    /// Zoom factor is drawn from `[1 - zoom, 1 + zoom]`.
    pub zoom: f32,
    /// Subtract the dataset mean and divide by its std, per channel.
    pub featurewise_normalize: bool,
    pub seed: u64,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            rotation: 90.0,
            flip_horizontal_prob: 0.0,
            flip_vertical_prob: 0.0,
            width_shift: 0.1,
            height_shift: 0.1,
            zoom: 0.2,
            featurewise_normalize: true,
            seed: 1,
        }
    }
}

/// Geometric transform shared by an image and its mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Degrees about the centre; positive turns the content clockwise as displayed.
    pub rotation: f32,
    pub shift_x: f32,
    pub shift_y: f32,
    pub zoom: f32,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        flip_horizontal: false,
        flip_vertical: false,
        rotation: 0.0,
        shift_x: 0.0,
        shift_y: 0.0,
        zoom: 1.0,
    };

    fn sample(config: &AugmentConfig, width: usize, height: usize, rng: &mut impl Rng) -> Self {
        let mut draw = |max: f32| {
            if max > 0.0 {
                rng.random_range(-max..max)
            } else {
                0.0
            }
        };
        let rotation = draw(config.rotation);
        let shift_x = draw(config.width_shift) * width as f32;
        let shift_y = draw(config.height_shift) * height as f32;
        let zoom = 1.0 + draw(config.zoom);
        Self {
            flip_horizontal: rng.random_bool(config.flip_horizontal_prob.clamp(0.0, 1.0) as f64),
            flip_vertical: rng.random_bool(config.flip_vertical_prob.clamp(0.0, 1.0) as f64),
            rotation,
            shift_x,
            shift_y,
            zoom,
        }
    }

    /// Applies the transform with nearest-neighbour sampling; pixels mapped
    /// from outside the source are zero. Binary inputs stay binary.
    ///
    /// Each output pixel is mapped back through the flips, the inverse
    /// rotation, the zoom and the shift, in that order.
    pub fn apply(&self, sample: ArrayView3<'_, f32>) -> Array3<f32> {
        let (height, width, channels) = sample.dim();
        let mut out = Array3::zeros((height, width, channels));
        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;
        let zoom = if self.zoom > 0.0 { self.zoom } else { 1.0 };
        let (sin, cos) = self.rotation.to_radians().sin_cos();

        for y in 0..height {
            for x in 0..width {
                let fx = if self.flip_horizontal { width - 1 - x } else { x };
                let fy = if self.flip_vertical { height - 1 - y } else { y };
                let (dx, dy) = (fx as f32 - cx, fy as f32 - cy);
                let rx = cos * dx + sin * dy;
                let ry = cos * dy - sin * dx;
                let sx = (cx + rx * zoom - self.shift_x).round();
                let sy = (cy + ry * zoom - self.shift_y).round();
                if sx < 0.0 || sy < 0.0 || sx >= width as f32 || sy >= height as f32 {
                    continue;
                }
                let (sx, sy) = (sx as usize, sy as usize);
                for c in 0..channels {
                    out[[y, x, c]] = sample[[sy, sx, c]];
                }
            }
        }
        out
    }
}

/// Per-channel mean and standard deviation of an NHWC tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalizer {
    pub mean: Array1<f32>,
    pub std: Array1<f32>,
}

impl Normalizer {
    pub fn fit(images: &Array4<f32>) -> Self {
        let channels = images.shape()[3];
        let mut mean = Array1::zeros(channels);
        let mut std = Array1::ones(channels);
        for c in 0..channels {
            let lane = images.index_axis(Axis(3), c);
            let count = lane.len().max(1) as f32;
            let m = lane.sum() / count;
            let var = lane.iter().map(|v| (v - m) * (v - m)).sum::<f32>() / count;
            mean[c] = m;
            std[c] = var.sqrt();
        }
        Self { mean, std }
    }

    pub fn apply(&self, batch: &mut Array4<f32>) {
        for (c, mut lane) in batch.axis_iter_mut(Axis(3)).enumerate() {
            let (m, s) = (self.mean[c], self.std[c] + STD_EPSILON);
            lane.mapv_inplace(|v| (v - m) / s);
        }
    }
}

/// One training batch: images and aligned masks, both NHWC.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Array4<f32>,
    pub masks: Array4<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.images.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Yields augmented `(image, mask)` batches, reshuffling on every pass.
pub struct PairedGenerator {
    images: Array4<f32>,
    masks: Array4<f32>,
    config: AugmentConfig,
    normalizer: Option<Normalizer>,
    rng: StdRng,
}

impl PairedGenerator {
    pub fn new(images: Array4<f32>, masks: Array4<f32>, config: AugmentConfig) -> FuseResult<Self> {
        let image_shape = images.shape();
        let mask_shape = masks.shape();
        if image_shape[..3] != mask_shape[..3] {
            return Err(FuseError::configuration(format!(
                "image tensor {image_shape:?} and mask tensor {mask_shape:?} disagree on sample count or size"
            )));
        }
        if config.batch_size == 0 {
            return Err(FuseError::configuration("batch size must be positive"));
        }
        let normalizer = config
            .featurewise_normalize
            .then(|| Normalizer::fit(&images));
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            images,
            masks,
            config,
            normalizer,
            rng,
        })
    }

    pub fn data_size(&self) -> usize {
        self.images.shape()[0]
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn normalizer(&self) -> Option<&Normalizer> {
        self.normalizer.as_ref()
    }

    /// One shuffled pass over the data. The last batch may be short.
    pub fn epoch(&mut self) -> EpochBatches<'_> {
        let mut order: Vec<usize> = (0..self.data_size()).collect();
        order.shuffle(&mut self.rng);
        EpochBatches {
            generator: self,
            order,
            cursor: 0,
        }
    }

    fn assemble(&mut self, indices: &[usize]) -> Batch {
        let (_, height, width, image_channels) = self.images.dim();
        let mask_channels = self.masks.shape()[3];
        let mut images = Array4::zeros((indices.len(), height, width, image_channels));
        let mut masks = Array4::zeros((indices.len(), height, width, mask_channels));

        for (slot, &index) in indices.iter().enumerate() {
            let transform = Transform::sample(&self.config, width, height, &mut self.rng);
            let image = transform.apply(self.images.index_axis(Axis(0), index));
            let mask = transform.apply(self.masks.index_axis(Axis(0), index));
            images.index_axis_mut(Axis(0), slot).assign(&image);
            masks.index_axis_mut(Axis(0), slot).assign(&mask);
        }

        if let Some(normalizer) = &self.normalizer {
            normalizer.apply(&mut images);
        }
        Batch { images, masks }
    }
}

pub struct EpochBatches<'a> {
    generator: &'a mut PairedGenerator,
    order: Vec<usize>,
    cursor: usize,
}

impl Iterator for EpochBatches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.generator.batch_size()).min(self.order.len());
        let indices = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        Some(self.generator.assemble(&indices))
    }
}
