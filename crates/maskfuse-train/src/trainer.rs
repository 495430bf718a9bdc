use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageFormat};
use indicatif::{ProgressBar, ProgressStyle};
use maskfuse_dataset::{Batch, PairedGenerator};
use ndarray::{Array4, Axis};

use crate::error::{TrainError, TrainResult};
use crate::metrics::{DECISION_THRESHOLD, binary_accuracy, binary_cross_entropy};
use crate::model::{History, SegmentationModel, ValidationData};

pub const CHECKPOINTS_DIR: &str = "checkpoints";
pub const PREVIEWS_DIR: &str = "previews";
pub const HISTORY_FILE: &str = "history.json";

/// Source of training batches, one pass per epoch.
pub trait BatchSource {
    fn data_size(&self) -> usize;

    fn batch_size(&self) -> usize;

    fn epoch_batches(&mut self) -> Box<dyn Iterator<Item = Batch> + '_>;
}

impl BatchSource for PairedGenerator {
    fn data_size(&self) -> usize {
        PairedGenerator::data_size(self)
    }

    fn batch_size(&self) -> usize {
        PairedGenerator::batch_size(self)
    }

    fn epoch_batches(&mut self) -> Box<dyn Iterator<Item = Batch> + '_> {
        Box::new(self.epoch())
    }
}

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub epochs: usize,
    /// Save weights every this many epochs; `None` disables checkpoints.
    pub checkpoint_every: Option<usize>,
    /// Root for checkpoints, previews and the history file.
    pub output_dir: PathBuf,
    pub show_progress: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 25,
            checkpoint_every: Some(5),
            output_dir: PathBuf::from("runs"),
            show_progress: true,
        }
    }
}

fn epoch_bar(len: u64, epoch: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        "{prefix:<10} {bar:40.cyan/blue} {pos}/{len} batches [{elapsed_precise}] {msg}",
    ) {
        bar.set_style(style);
    }
    bar.set_prefix(format!("epoch {epoch}"));
    bar
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Runs `config.epochs` passes over `source`.
///
/// Within an epoch, batching stops once `iteration * batch_size` exceeds the
/// data size, so a trailing short batch is never fitted. A source holding
/// fewer samples than one batch is rejected before anything is written.
/// Validation, when given, is scored with `predict` after each epoch.
pub fn train<M, S>(
    model: &mut M,
    source: &mut S,
    config: &TrainConfig,
    validation: Option<ValidationData<'_>>,
) -> TrainResult<History>
where
    M: SegmentationModel + ?Sized,
    S: BatchSource + ?Sized,
{
    let data_size = source.data_size();
    let batch_size = source.batch_size().max(1);
    let full_batches = (data_size / batch_size) as u64;
    if full_batches == 0 {
        return Err(TrainError::InsufficientData {
            data_size,
            batch_size,
        });
    }
    let mut history = History::default();

    tracing::info!(
        model = model.name(),
        epochs = config.epochs,
        data_size,
        batch_size,
        "starting training"
    );

    for epoch in 1..=config.epochs {
        tracing::info!("Epoch {epoch}");
        let progress = epoch_bar(full_batches, epoch, config.show_progress);
        let mut losses = Vec::new();
        let mut accuracies = Vec::new();

        let mut iteration = 1usize;
        for batch in source.epoch_batches() {
            if iteration * batch_size > data_size {
                break;
            }
            let step = model.fit(&batch.images, &batch.masks, None)?;
            losses.extend(step.loss);
            accuracies.extend(step.accuracy);
            progress.inc(1);
            progress.set_message(format!("loss {:.4}", mean(&losses)));
            iteration += 1;
        }

        if losses.is_empty() {
            progress.finish_and_clear();
            tracing::warn!(epoch, "source yielded no full batch; skipping epoch");
            continue;
        }
        let loss = mean(&losses);
        history.loss.push(loss);
        if !accuracies.is_empty() {
            history.accuracy.push(mean(&accuracies));
        }

        if let Some((images, masks)) = validation {
            let (val_loss, val_accuracy) = evaluate(model, images, masks)?;
            history.val_loss.push(val_loss);
            history.val_accuracy.push(val_accuracy);
            progress.suspend(|| {
                tracing::info!(epoch, loss, val_loss, val_accuracy, "epoch finished");
            });
        } else {
            progress.suspend(|| tracing::info!(epoch, loss, "epoch finished"));
        }
        progress.finish_and_clear();

        if let Some(every) = config.checkpoint_every.filter(|every| *every > 0) {
            if epoch % every == 0 || epoch == config.epochs {
                let path = checkpoint_path(&config.output_dir, epoch);
                model.save_weights(&path)?;
                tracing::info!(path = %path.display(), "saved checkpoint");
            }
        }
    }

    write_history(&config.output_dir.join(HISTORY_FILE), &history)?;
    Ok(history)
}

pub fn checkpoint_path(output_dir: &Path, epoch: usize) -> PathBuf {
    output_dir
        .join(CHECKPOINTS_DIR)
        .join(format!("epoch_{epoch}.json"))
}

/// Loss and accuracy of `model` on a held-out set.
pub fn evaluate<M>(model: &M, images: &Array4<f32>, masks: &Array4<f32>) -> TrainResult<(f32, f32)>
where
    M: SegmentationModel + ?Sized,
{
    let predicted = model.predict(images)?;
    if masks.shape()[3] == 0 || predicted.shape()[..3] != masks.shape()[..3] {
        return Err(TrainError::shape(format!(
            "predictions {:?} do not match masks {:?}",
            predicted.shape(),
            masks.shape()
        )));
    }
    let target = masks.index_axis(Axis(3), 0).insert_axis(Axis(3));
    let predicted = predicted.index_axis(Axis(3), 0).insert_axis(Axis(3));
    Ok((
        binary_cross_entropy(predicted, target),
        binary_accuracy(predicted, target),
    ))
}

pub fn write_history(path: &Path, history: &History) -> TrainResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| TrainError::io(parent, err))?;
    }
    let file = File::create(path).map_err(|err| TrainError::io(path, err))?;
    serde_json::to_writer_pretty(BufWriter::new(file), history)?;
    Ok(())
}

/// Writes thresholded predictions for `images` as `previews/<i>.png`.
pub fn write_previews<M>(model: &M, images: &Array4<f32>, output_dir: &Path) -> TrainResult<usize>
where
    M: SegmentationModel + ?Sized,
{
    let dir = output_dir.join(PREVIEWS_DIR);
    fs::create_dir_all(&dir).map_err(|err| TrainError::io(&dir, err))?;
    let predicted = model.predict(images)?;
    let (count, height, width, _) = predicted.dim();

    for (index, sample) in predicted.axis_iter(Axis(0)).enumerate() {
        let pixels: Vec<u8> = sample
            .index_axis(Axis(2), 0)
            .iter()
            .map(|&p| if p >= DECISION_THRESHOLD { 255 } else { 0 })
            .collect();
        let mask = GrayImage::from_raw(width as u32, height as u32, pixels)
            .ok_or_else(|| TrainError::shape("prediction buffer does not match its shape"))?;
        let path = dir.join(format!("{index}.png"));
        mask.save_with_format(&path, ImageFormat::Png)
            .map_err(|source| TrainError::Encode {
                path: path.clone(),
                source,
            })?;
    }
    Ok(count)
}
