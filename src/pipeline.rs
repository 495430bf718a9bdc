use std::path::{Path, PathBuf};

use maskfuse_dataset::{
    AugmentConfig, IMAGES_DIR, MASKS_DIR, PairedGenerator, SplitPlan, Subset, load_directory,
    split_dataset, subset_dir,
};
use maskfuse_preprocess::{PreprocessConfig, PreprocessReport, preprocess_data};
use maskfuse_train::{
    History, Loss, Metric, Optimizer, PixelLogisticModel, SegmentationModel, TrainConfig,
    TrainError, train, write_previews,
};
use maskfuse_types::FuseError;
use ndarray::Array4;
use thiserror::Error;

use crate::cli::Stage;
use crate::settings::{ConfigError, EffectiveSettings};

pub const WEIGHTS_FILE: &str = "weights.json";

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] FuseError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error("no training samples found in {}", .dir.display())]
    EmptyDataset { dir: PathBuf },
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub preprocess: Option<PreprocessReport>,
    pub split: Option<SplitPlan>,
    pub history: Option<History>,
}

pub fn run(stage: Stage, settings: &EffectiveSettings) -> Result<RunSummary, AppError> {
    let mut summary = RunSummary::default();
    if matches!(stage, Stage::Preprocess | Stage::Run) {
        summary.preprocess = Some(run_preprocess(settings)?);
    }
    if matches!(stage, Stage::Split | Stage::Run) {
        summary.split = Some(run_split(settings)?);
    }
    if matches!(stage, Stage::Train | Stage::Run) {
        summary.history = Some(run_train(settings)?);
    }
    Ok(summary)
}

pub fn run_preprocess(settings: &EffectiveSettings) -> Result<PreprocessReport, AppError> {
    let config = PreprocessConfig {
        data_dir: settings.raw_dir.clone(),
        output_dir: settings.dataset_dir.clone(),
        size: settings.size,
        mask_resample: settings.mask_resample,
        count_policy: settings.count_policy,
        show_progress: settings.show_progress,
    };
    Ok(preprocess_data(&config)?)
}

pub fn run_split(settings: &EffectiveSettings) -> Result<SplitPlan, AppError> {
    Ok(split_dataset(
        &settings.dataset_dir,
        settings.ratios,
        settings.seed,
    )?)
}

fn is_split(root: &Path, subset: Subset) -> bool {
    root.join(IMAGES_DIR).join(subset.as_str()).is_dir()
}

fn load_pair(root: &Path, subset: Subset) -> Result<(Array4<f32>, Array4<f32>), AppError> {
    let images = load_directory(&subset_dir(root, IMAGES_DIR, subset))?;
    let masks = load_directory(&subset_dir(root, MASKS_DIR, subset))?;
    Ok((images, masks))
}

/// Trains the baseline model on `train`, scoring `valid` after each epoch and
/// writing previews for `test` when those subsets exist.
pub fn run_train(settings: &EffectiveSettings) -> Result<History, AppError> {
    let root = settings.dataset_dir.as_path();
    let (images, masks) = load_pair(root, Subset::Train)?;
    if images.shape()[0] == 0 {
        return Err(AppError::EmptyDataset {
            dir: subset_dir(root, IMAGES_DIR, Subset::Train),
        });
    }

    let augment = AugmentConfig {
        batch_size: settings.batch_size,
        seed: settings.seed,
        ..AugmentConfig::default()
    };
    let mut generator = PairedGenerator::new(images, masks, augment)?;

    let mut validation = if is_split(root, Subset::Valid) {
        Some(load_pair(root, Subset::Valid)?).filter(|(images, _)| images.shape()[0] > 0)
    } else {
        None
    };
    let mut previews = if is_split(root, Subset::Test) {
        Some(load_directory(&subset_dir(root, IMAGES_DIR, Subset::Test))?)
            .filter(|images| images.shape()[0] > 0)
    } else {
        None
    };
    if let Some(normalizer) = generator.normalizer() {
        if let Some((images, _)) = validation.as_mut() {
            normalizer.apply(images);
        }
        if let Some(images) = previews.as_mut() {
            normalizer.apply(images);
        }
    }

    let mut model = PixelLogisticModel::new();
    model.compile(
        Optimizer::adam(settings.learning_rate),
        Loss::BinaryCrossEntropy,
        &[Metric::Accuracy],
    );

    let config = TrainConfig {
        epochs: settings.epochs,
        checkpoint_every: settings.checkpoint_every,
        output_dir: settings.output_dir.clone(),
        show_progress: settings.show_progress,
    };
    let history = train(
        &mut model,
        &mut generator,
        &config,
        validation.as_ref().map(|(images, masks)| (images, masks)),
    )?;

    let weights = settings.output_dir.join(WEIGHTS_FILE);
    model.save_weights(&weights)?;
    tracing::info!(path = %weights.display(), "saved final weights");

    if let Some(images) = previews.as_ref() {
        let written = write_previews(&model, images, &settings.output_dir)?;
        tracing::info!(previews = written, "wrote test previews");
    }
    Ok(history)
}
