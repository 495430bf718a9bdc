use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, Rgb};
use maskfuse_types::{FuseError, FuseResult, MaskResample, TargetSize};

/// Foreground value of a binary mask.
pub const MASK_FOREGROUND: u8 = 255;

/// High-quality antialiasing filter used for every image resize.
pub const IMAGE_FILTER: FilterType = FilterType::Lanczos3;

fn mask_filter(resample: MaskResample) -> FilterType {
    match resample {
        MaskResample::Area => IMAGE_FILTER,
        MaskResample::Nearest => FilterType::Nearest,
    }
}

fn open(path: &Path) -> FuseResult<DynamicImage> {
    image::open(path).map_err(|err| FuseError::image(path, err))
}

/// Decodes `path` and resizes it to exactly `size`, ignoring aspect ratio.
pub fn load_image(path: &Path, size: TargetSize) -> FuseResult<DynamicImage> {
    let image = open(path)?;
    Ok(image.resize_exact(size.width(), size.height(), IMAGE_FILTER))
}

/// Decodes a mask, resizes it to `size`, collapses it to one grayscale channel
/// and binarizes it.
pub fn load_binary_mask(
    path: &Path,
    size: TargetSize,
    resample: MaskResample,
) -> FuseResult<GrayImage> {
    let mask = open(path)?;
    let resized = mask.resize_exact(size.width(), size.height(), mask_filter(resample));
    let mut gray = grayscale(&resized);
    binarize(&mut gray);
    Ok(gray)
}

/// ITU-R 601-2 luma in 16-bit fixed point, rounded to nearest.
pub fn luma_601(Rgb([r, g, b]): Rgb<u8>) -> u8 {
    let weighted = 19595 * u32::from(r) + 38470 * u32::from(g) + 7471 * u32::from(b);
    ((weighted + 0x8000) >> 16) as u8
}

/// Single-channel copy of `image` using [`luma_601`]; alpha is ignored.
pub fn grayscale(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        Luma([luma_601(*rgb.get_pixel(x, y))])
    })
}

/// Any non-zero intensity becomes foreground.
pub fn binarize(mask: &mut GrayImage) {
    for value in mask.iter_mut() {
        *value = if *value > 0 { MASK_FOREGROUND } else { 0 };
    }
}

/// Pixel-for-pixel identity: same dimensions, same colour type, same bytes.
pub fn same_pixels(a: &DynamicImage, b: &DynamicImage) -> bool {
    a.width() == b.width()
        && a.height() == b.height()
        && a.color() == b.color()
        && a.as_bytes() == b.as_bytes()
}
