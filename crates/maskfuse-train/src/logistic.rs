//! Baseline segmentation model: per-pixel logistic regression over the 3x3
//! neighbourhood of channel-averaged intensities.
//!
//! Small enough to train on a CPU in seconds, it gives the training loop a
//! concrete model while a convolutional network is plugged in through the
//! same trait.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use ndarray::{Array3, Array4, ArrayView4, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{TrainError, TrainResult};
use crate::metrics::{binary_accuracy, binary_cross_entropy};
use crate::model::{History, Loss, Metric, Optimizer, SegmentationModel, ValidationData};

const RADIUS: isize = 1;
const FEATURES: usize = 9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticWeights {
    pub kernel: Vec<f32>,
    pub bias: f32,
}

#[derive(Debug, Clone, Default)]
struct AdamState {
    first: Vec<f32>,
    second: Vec<f32>,
    step: i32,
}

#[derive(Debug, Clone)]
struct Compiled {
    optimizer: Optimizer,
    loss: Loss,
    metrics: Vec<Metric>,
}

#[derive(Debug, Clone)]
pub struct PixelLogisticModel {
    kernel: [f32; FEATURES],
    bias: f32,
    compiled: Option<Compiled>,
    adam: AdamState,
}

impl Default for PixelLogisticModel {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelLogisticModel {
    pub fn new() -> Self {
        Self {
            kernel: [0.0; FEATURES],
            bias: 0.0,
            compiled: None,
            adam: AdamState::default(),
        }
    }

    pub fn weights(&self) -> LogisticWeights {
        LogisticWeights {
            kernel: self.kernel.to_vec(),
            bias: self.bias,
        }
    }

    fn logit(&self, features: &[f32; FEATURES]) -> f32 {
        self.bias
            + self
                .kernel
                .iter()
                .zip(features)
                .map(|(w, f)| w * f)
                .sum::<f32>()
    }

    fn forward(&self, intensity: &Array3<f32>) -> Array4<f32> {
        let (n, height, width) = intensity.dim();
        Array4::from_shape_fn((n, height, width, 1), |(i, y, x, _)| {
            sigmoid(self.logit(&neighbourhood(intensity, i, y, x)))
        })
    }

    fn apply_gradient(&mut self, gradient: &[f32; FEATURES + 1], optimizer: Optimizer) {
        let updates: Vec<f32> = match optimizer {
            Optimizer::Sgd { learning_rate } => {
                gradient.iter().map(|g| learning_rate * g).collect()
            }
            Optimizer::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => {
                let state = &mut self.adam;
                if state.first.len() != gradient.len() {
                    state.first = vec![0.0; gradient.len()];
                    state.second = vec![0.0; gradient.len()];
                    state.step = 0;
                }
                state.step += 1;
                let correction1 = 1.0 - beta1.powi(state.step);
                let correction2 = 1.0 - beta2.powi(state.step);
                gradient
                    .iter()
                    .enumerate()
                    .map(|(i, &g)| {
                        state.first[i] = beta1 * state.first[i] + (1.0 - beta1) * g;
                        state.second[i] = beta2 * state.second[i] + (1.0 - beta2) * g * g;
                        let m = state.first[i] / correction1;
                        let v = state.second[i] / correction2;
                        learning_rate * m / (v.sqrt() + epsilon)
                    })
                    .collect()
            }
        };
        for (w, update) in self.kernel.iter_mut().zip(&updates) {
            *w -= update;
        }
        self.bias -= updates[FEATURES];
    }
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

/// Channel mean of an NHWC tensor.
fn intensity(images: &Array4<f32>) -> TrainResult<Array3<f32>> {
    images
        .mean_axis(Axis(3))
        .ok_or_else(|| TrainError::shape("images have no channels"))
}

/// Zero-padded 3x3 window around `(y, x)` in row-major order.
fn neighbourhood(intensity: &Array3<f32>, n: usize, y: usize, x: usize) -> [f32; FEATURES] {
    let (_, height, width) = intensity.dim();
    let mut out = [0.0; FEATURES];
    let mut k = 0;
    for dy in -RADIUS..=RADIUS {
        for dx in -RADIUS..=RADIUS {
            let sy = y as isize + dy;
            let sx = x as isize + dx;
            if sy >= 0 && sx >= 0 && (sy as usize) < height && (sx as usize) < width {
                out[k] = intensity[[n, sy as usize, sx as usize]];
            }
            k += 1;
        }
    }
    out
}

fn check_pair(images: &Array4<f32>, masks: &Array4<f32>) -> TrainResult<()> {
    if images.shape()[..3] != masks.shape()[..3] || masks.shape()[3] == 0 {
        return Err(TrainError::shape(format!(
            "images {:?} and masks {:?} differ in sample count or size",
            images.shape(),
            masks.shape()
        )));
    }
    Ok(())
}

/// First mask channel, reshaped to `N x H x W x 1`.
fn mask_target(masks: &Array4<f32>) -> Array4<f32> {
    masks.index_axis(Axis(3), 0).insert_axis(Axis(3)).to_owned()
}

fn score(loss: Loss, predicted: ArrayView4<'_, f32>, target: ArrayView4<'_, f32>) -> f32 {
    match loss {
        Loss::BinaryCrossEntropy => binary_cross_entropy(predicted, target),
    }
}

impl SegmentationModel for PixelLogisticModel {
    fn name(&self) -> &'static str {
        "pixel-logistic"
    }

    fn compile(&mut self, optimizer: Optimizer, loss: Loss, metrics: &[Metric]) {
        self.compiled = Some(Compiled {
            optimizer,
            loss,
            metrics: metrics.to_vec(),
        });
        self.adam = AdamState::default();
    }

    fn fit(
        &mut self,
        images: &Array4<f32>,
        masks: &Array4<f32>,
        validation: Option<ValidationData<'_>>,
    ) -> TrainResult<History> {
        let compiled = self
            .compiled
            .clone()
            .ok_or(TrainError::NotCompiled { operation: "fit" })?;
        check_pair(images, masks)?;

        let intensity = intensity(images)?;
        let target = mask_target(masks);
        let predicted = self.forward(&intensity);

        let (n, height, width) = intensity.dim();
        let count = (n * height * width).max(1) as f32;
        let mut gradient = [0.0f32; FEATURES + 1];
        for ((i, y, x, _), &p) in predicted.indexed_iter() {
            let error = p - target[[i, y, x, 0]];
            let features = neighbourhood(&intensity, i, y, x);
            for (g, f) in gradient.iter_mut().zip(features) {
                *g += error * f;
            }
            gradient[FEATURES] += error;
        }
        for g in gradient.iter_mut() {
            *g /= count;
        }

        let mut history = History::default();
        history
            .loss
            .push(score(compiled.loss, predicted.view(), target.view()));
        let track_accuracy = compiled.metrics.contains(&Metric::Accuracy);
        if track_accuracy {
            history
                .accuracy
                .push(binary_accuracy(predicted.view(), target.view()));
        }

        self.apply_gradient(&gradient, compiled.optimizer);

        if let Some((val_images, val_masks)) = validation {
            check_pair(val_images, val_masks)?;
            let val_predicted = self.predict(val_images)?;
            let val_target = mask_target(val_masks);
            history
                .val_loss
                .push(score(compiled.loss, val_predicted.view(), val_target.view()));
            if track_accuracy {
                history
                    .val_accuracy
                    .push(binary_accuracy(val_predicted.view(), val_target.view()));
            }
        }
        Ok(history)
    }

    fn predict(&self, images: &Array4<f32>) -> TrainResult<Array4<f32>> {
        Ok(self.forward(&intensity(images)?))
    }

    fn save_weights(&self, path: &Path) -> TrainResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| TrainError::io(parent, err))?;
        }
        let file = File::create(path).map_err(|err| TrainError::io(path, err))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.weights())?;
        Ok(())
    }
}
