use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageFormat};
use maskfuse_types::{FuseError, FuseResult};

use crate::fusion::GroupedSample;

pub const IMAGES_DIR: &str = "images";
pub const MASKS_DIR: &str = "masks";
const EXTENSION: &str = "png";

/// A resized image and its fused mask, written under the same index.
#[derive(Debug, Clone)]
pub struct OutputSample {
    pub index: u64,
    pub image: DynamicImage,
    pub mask: GrayImage,
}

impl TryFrom<GroupedSample> for OutputSample {
    type Error = FuseError;

    fn try_from(sample: GroupedSample) -> Result<Self, Self::Error> {
        let mask = sample.combined_mask()?;
        Ok(Self {
            index: sample.index,
            image: sample.image,
            mask,
        })
    }
}

/// Persists output samples as `images/<index>.png` and `masks/<index>.png`.
pub struct SampleWriter {
    images_dir: PathBuf,
    masks_dir: PathBuf,
}

impl SampleWriter {
    pub fn create(root: &Path) -> FuseResult<Self> {
        let images_dir = root.join(IMAGES_DIR);
        let masks_dir = root.join(MASKS_DIR);
        for dir in [&images_dir, &masks_dir] {
            fs::create_dir_all(dir).map_err(|err| FuseError::io(dir, err))?;
        }
        Ok(Self {
            images_dir,
            masks_dir,
        })
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn masks_dir(&self) -> &Path {
        &self.masks_dir
    }

    pub fn write(&self, sample: &OutputSample) -> FuseResult<()> {
        let filename = format!("{}.{EXTENSION}", sample.index);
        let image_path = self.images_dir.join(&filename);
        let mask_path = self.masks_dir.join(&filename);
        sample
            .image
            .save_with_format(&image_path, ImageFormat::Png)
            .map_err(|err| FuseError::image(&image_path, err))?;
        sample
            .mask
            .save_with_format(&mask_path, ImageFormat::Png)
            .map_err(|err| FuseError::image(&mask_path, err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn writes_pair_under_shared_index() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SampleWriter::create(dir.path()).unwrap();
        let sample = OutputSample {
            index: 7,
            image: DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([9, 8, 7]))),
            mask: GrayImage::from_raw(3, 2, vec![0, 255, 0, 255, 0, 255]).unwrap(),
        };
        writer.write(&sample).unwrap();

        let image = image::open(dir.path().join("images/7.png")).unwrap();
        let mask = image::open(dir.path().join("masks/7.png")).unwrap().to_luma8();
        assert_eq!(image.to_rgb8().get_pixel(2, 1), &Rgb([9, 8, 7]));
        assert_eq!(mask.as_raw(), sample.mask.as_raw());
    }

    #[test]
    fn create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        SampleWriter::create(dir.path()).unwrap();
        let writer = SampleWriter::create(dir.path()).unwrap();
        assert!(writer.images_dir().is_dir());
        assert!(writer.masks_dir().is_dir());
    }
}
