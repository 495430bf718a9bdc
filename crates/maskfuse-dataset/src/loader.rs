use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use maskfuse_types::{FuseError, FuseResult};
use ndarray::{Array3, Array4, Axis};

use crate::split::Subset;

pub const IMAGES_DIR: &str = "images";
pub const MASKS_DIR: &str = "masks";

/// Regular, non-hidden files directly under `dir`, sorted by name.
pub fn list_files(dir: &Path) -> FuseResult<Vec<PathBuf>> {
    let reader = fs::read_dir(dir).map_err(|err| FuseError::io(dir, err))?;
    let mut files = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|err| FuseError::io(dir, err))?;
        let is_file = entry
            .file_type()
            .map_err(|err| FuseError::io(entry.path(), err))?
            .is_file();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if is_file && !hidden {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Number of preprocessed samples under `root/images`.
pub fn data_size(root: &Path) -> FuseResult<usize> {
    Ok(list_files(&root.join(IMAGES_DIR))?.len())
}

/// `root/<kind>/<subset>` when the dataset has been split, otherwise
/// `root/<kind>`.
pub fn subset_dir(root: &Path, kind: &str, subset: Subset) -> PathBuf {
    let split = root.join(kind).join(subset.as_str());
    if split.is_dir() {
        split
    } else {
        root.join(kind)
    }
}

/// Converts an image to an HWC array scaled to `[0, 1]`.
///
/// Grayscale images keep an explicit single channel.
pub fn image_to_array(image: &DynamicImage) -> FuseResult<Array3<f32>> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let (channels, raw) = match image.color().channel_count() {
        1 => (1, image.to_luma8().into_raw()),
        2 => (2, image.to_luma_alpha8().into_raw()),
        3 => (3, image.to_rgb8().into_raw()),
        _ => (4, image.to_rgba8().into_raw()),
    };
    let data: Vec<f32> = raw.into_iter().map(|v| f32::from(v) / 255.0).collect();
    Array3::from_shape_vec((height, width, channels), data).map_err(|err| {
        FuseError::configuration(format!(
            "pixel buffer does not match {width}x{height}x{channels}: {err}"
        ))
    })
}

/// Loads every image of `dir` into an NHWC tensor.
///
/// All images must share width, height and channel count.
pub fn load_directory(dir: &Path) -> FuseResult<Array4<f32>> {
    let files = list_files(dir)?;
    let mut samples: Vec<Array3<f32>> = Vec::with_capacity(files.len());
    let mut expected: Option<(u32, u32, usize)> = None;

    for path in &files {
        let image = image::open(path).map_err(|err| FuseError::image(path, err))?;
        let array = image_to_array(&image)?;
        let shape = (image.width(), image.height(), array.shape()[2]);
        match expected {
            None => expected = Some(shape),
            Some(expected) if expected != shape => {
                return Err(FuseError::InconsistentShape {
                    path: path.clone(),
                    expected,
                    found: shape,
                });
            }
            Some(_) => {}
        }
        samples.push(array);
    }

    let Some((width, height, channels)) = expected else {
        return Ok(Array4::zeros((0, 0, 0, 0)));
    };
    let views: Vec<_> = samples.iter().map(|sample| sample.view()).collect();
    let stacked = ndarray::stack(Axis(0), &views).map_err(|err| {
        FuseError::configuration(format!("cannot stack images of {}: {err}", dir.display()))
    })?;
    tracing::debug!(
        dir = %dir.display(),
        samples = stacked.shape()[0],
        width,
        height,
        channels,
        "loaded directory"
    );
    Ok(stacked)
}
