//! Mask fusion preprocessing.
//!
//! Reads a raw annotation directory exported in blocks of four files, groups
//! consecutive masks by the image they annotate and writes one resized image
//! plus one fused binary mask per group.

use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use maskfuse_types::{CountPolicy, FuseResult, MaskResample, TargetSize};

pub mod fusion;
pub mod listing;
pub mod transform;
pub mod writer;

pub use fusion::{GroupAccumulator, GroupedSample, fuse_masks};
pub use listing::{AnnotationPair, list_annotation_pairs};
pub use transform::{binarize, grayscale, load_binary_mask, load_image, luma_601};
pub use writer::{IMAGES_DIR, MASKS_DIR, OutputSample, SampleWriter};

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub size: TargetSize,
    pub mask_resample: MaskResample,
    pub count_policy: CountPolicy,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreprocessReport {
    pub pairs: usize,
    pub groups: u64,
    pub masks_fused: usize,
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{prefix:<10} {bar:40.cyan/blue} {percent:>3}% {pos}/{len} pairs [{elapsed_precise}<{eta_precise}] {msg}",
    ) {
        bar.set_style(style);
    }
    bar.set_prefix("preprocess");
    bar
}

fn flush(
    writer: &SampleWriter,
    sample: GroupedSample,
    report: &mut PreprocessReport,
) -> FuseResult<()> {
    let masks = sample.masks.len();
    let output = OutputSample::try_from(sample)?;
    writer.write(&output)?;
    report.groups += 1;
    report.masks_fused += masks;
    Ok(())
}

/// Runs the full scan: list, group, fuse, write.
///
/// The trailing group is flushed after the scan even though no differing
/// image follows it.
pub fn preprocess_data(config: &PreprocessConfig) -> FuseResult<PreprocessReport> {
    let pairs = list_annotation_pairs(&config.data_dir, config.count_policy)?;
    let writer = SampleWriter::create(&config.output_dir)?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        output_dir = %config.output_dir.display(),
        pairs = pairs.len(),
        size = %config.size,
        mask_resample = config.mask_resample.as_str(),
        "preprocessing raw annotations"
    );

    let progress = progress_bar(pairs.len(), config.show_progress);
    let mut report = PreprocessReport {
        pairs: pairs.len(),
        ..PreprocessReport::default()
    };

    let accumulator = pairs.iter().try_fold(
        GroupAccumulator::new(),
        |mut accumulator, pair| -> FuseResult<GroupAccumulator> {
            let image = load_image(&pair.image, config.size)?;
            let mask = load_binary_mask(&pair.mask, config.size, config.mask_resample)?;
            if let Some(completed) = accumulator.push(image, mask) {
                flush(&writer, completed, &mut report)?;
                progress.set_message(format!("{} groups", report.groups));
            }
            progress.inc(1);
            Ok(accumulator)
        },
    );
    let accumulator = match accumulator {
        Ok(accumulator) => accumulator,
        Err(err) => {
            progress.abandon_with_message(format!("failed after {} groups", report.groups));
            return Err(err);
        }
    };

    if let Some(trailing) = accumulator.finish() {
        let index = trailing.index;
        flush(&writer, trailing, &mut report)?;
        tracing::info!(index, groups = report.groups, "flushed trailing group");
    }

    progress.finish_with_message(format!("{} groups", report.groups));
    tracing::info!(
        pairs = report.pairs,
        groups = report.groups,
        masks = report.masks_fused,
        "preprocessing finished"
    );
    Ok(report)
}
