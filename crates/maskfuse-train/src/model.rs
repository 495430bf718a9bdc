use std::path::Path;

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::error::TrainResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Optimizer {
    Sgd {
        learning_rate: f32,
    },
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
}

impl Optimizer {
    pub fn adam(learning_rate: f32) -> Self {
        Optimizer::Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::adam(1e-3)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    #[default]
    BinaryCrossEntropy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
}

/// Per-epoch training record. Validation series stay empty when no
/// validation data is supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub loss: Vec<f32>,
    pub accuracy: Vec<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub val_loss: Vec<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub val_accuracy: Vec<f32>,
}

impl History {
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }
}

/// Validation images and masks, both NHWC.
pub type ValidationData<'a> = (&'a Array4<f32>, &'a Array4<f32>);

/// Segmentation model capability consumed by the training loop.
///
/// Images are NHWC tensors; masks are `N x H x W x 1` with 0/1 targets and
/// predictions are per-pixel foreground probabilities of the same shape.
pub trait SegmentationModel {
    fn name(&self) -> &'static str;

    fn compile(&mut self, optimizer: Optimizer, loss: Loss, metrics: &[Metric]);

    /// Fits one batch, returning a single-entry history.
    fn fit(
        &mut self,
        images: &Array4<f32>,
        masks: &Array4<f32>,
        validation: Option<ValidationData<'_>>,
    ) -> TrainResult<History>;

    fn predict(&self, images: &Array4<f32>) -> TrainResult<Array4<f32>>;

    fn save_weights(&self, path: &Path) -> TrainResult<()>;
}
