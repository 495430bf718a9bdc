//! Dataset glue around the preprocessed output: splitting into subsets,
//! loading directories into tensors and producing augmented batches.

pub mod augment;
pub mod loader;
pub mod split;

pub use augment::{AugmentConfig, Batch, EpochBatches, Normalizer, PairedGenerator, Transform};
pub use loader::{
    IMAGES_DIR, MASKS_DIR, data_size, image_to_array, list_files, load_directory, subset_dir,
};
pub use split::{SplitPlan, Subset, plan_split, split_dataset};
