use std::fs;
use std::path::{Path, PathBuf};

use maskfuse_types::{CountPolicy, FuseError, FuseResult};

/// Files are exported by the annotation tool in blocks of four.
pub const BLOCK_STRIDE: usize = 4;
/// Position of the source image inside each block.
pub const IMAGE_OFFSET: usize = 1;
/// Position of the mask inside each block.
pub const MASK_OFFSET: usize = 3;

/// One source image and one of the masks annotating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationPair {
    pub image: PathBuf,
    pub mask: PathBuf,
}

/// Regular, non-hidden files of `dir` sorted by file name.
///
/// Filesystem listing order is not stable across platforms, so the block
/// structure is read from the sorted names instead.
pub fn sorted_entries(dir: &Path) -> FuseResult<Vec<PathBuf>> {
    let reader = fs::read_dir(dir).map_err(|err| FuseError::io(dir, err))?;
    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|err| FuseError::io(dir, err))?;
        let file_type = entry
            .file_type()
            .map_err(|err| FuseError::io(entry.path(), err))?;
        if !file_type.is_file() {
            continue;
        }
        let hidden = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'));
        if hidden {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(entries)
}

fn stride_select(entries: &[PathBuf], offset: usize) -> Vec<PathBuf> {
    entries
        .iter()
        .skip(offset)
        .step_by(BLOCK_STRIDE)
        .cloned()
        .collect()
}

/// Pairs every image-position file with the mask-position file of the same
/// block, in listing order.
pub fn pair_entries(entries: &[PathBuf], policy: CountPolicy) -> FuseResult<Vec<AnnotationPair>> {
    let images = stride_select(entries, IMAGE_OFFSET);
    let masks = stride_select(entries, MASK_OFFSET);

    if images.len() != masks.len() {
        match policy {
            CountPolicy::Strict => {
                return Err(FuseError::CountMismatch {
                    images: images.len(),
                    masks: masks.len(),
                });
            }
            CountPolicy::Truncate => {
                tracing::warn!(
                    images = images.len(),
                    masks = masks.len(),
                    "image and mask counts differ; truncating to the shorter listing"
                );
            }
        }
    }

    Ok(images
        .into_iter()
        .zip(masks)
        .map(|(image, mask)| AnnotationPair { image, mask })
        .collect())
}

pub fn list_annotation_pairs(dir: &Path, policy: CountPolicy) -> FuseResult<Vec<AnnotationPair>> {
    let entries = sorted_entries(dir)?;
    tracing::debug!(dir = %dir.display(), files = entries.len(), "listed raw annotation directory");
    pair_entries(&entries, policy)
}
