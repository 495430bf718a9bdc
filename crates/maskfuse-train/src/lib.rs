//! Model capability, baseline model and training loop for fused segmentation
//! datasets.

mod error;
mod logistic;
mod metrics;
mod model;
mod trainer;

pub use error::{TrainError, TrainResult};
pub use logistic::{LogisticWeights, PixelLogisticModel};
pub use metrics::{DECISION_THRESHOLD, binary_accuracy, binary_cross_entropy};
pub use model::{History, Loss, Metric, Optimizer, SegmentationModel, ValidationData};
pub use trainer::{
    BatchSource, CHECKPOINTS_DIR, HISTORY_FILE, PREVIEWS_DIR, TrainConfig, checkpoint_path,
    evaluate, train, write_history, write_previews,
};
