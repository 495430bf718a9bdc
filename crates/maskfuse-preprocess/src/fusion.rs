use image::{DynamicImage, GrayImage};
use maskfuse_types::{FuseError, FuseResult};

use crate::transform::{MASK_FOREGROUND, same_pixels};

/// Saturating element-wise union of binary masks.
///
/// Values are summed in a wider integer type and clipped to the foreground
/// value, so a pixel covered by any mask ends up foreground.
pub fn fuse_masks(masks: &[GrayImage]) -> FuseResult<GrayImage> {
    let (first, rest) = masks.split_first().ok_or(FuseError::EmptyGroup)?;
    let (width, height) = first.dimensions();

    let mut sums: Vec<u16> = first.iter().map(|&v| u16::from(v)).collect();
    for mask in rest {
        if mask.dimensions() != (width, height) {
            return Err(FuseError::MaskShapeMismatch {
                expected: (width, height),
                found: mask.dimensions(),
            });
        }
        for (sum, &value) in sums.iter_mut().zip(mask.iter()) {
            *sum = sum.saturating_add(u16::from(value));
        }
    }

    let combined: Vec<u8> = sums
        .into_iter()
        .map(|sum| sum.min(u16::from(MASK_FOREGROUND)) as u8)
        .collect();
    GrayImage::from_raw(width, height, combined).ok_or(FuseError::MaskShapeMismatch {
        expected: (width, height),
        found: (width, height),
    })
}

/// A source image with every mask annotating it, ready to be flushed.
#[derive(Debug, Clone)]
pub struct GroupedSample {
    pub index: u64,
    pub image: DynamicImage,
    pub masks: Vec<GrayImage>,
}

impl GroupedSample {
    pub fn combined_mask(&self) -> FuseResult<GrayImage> {
        fuse_masks(&self.masks)
    }
}

struct PendingGroup {
    image: DynamicImage,
    masks: Vec<GrayImage>,
}

/// Run-length grouping state for the preprocessing scan.
///
/// Consecutive pairs whose resized image is identical to the group's first
/// image are collected together; the first differing image completes the
/// group. `finish` hands out the trailing group, which no differing image
/// will ever complete.
pub struct GroupAccumulator {
    current: Option<PendingGroup>,
    next_index: u64,
}

impl GroupAccumulator {
    pub fn new() -> Self {
        Self {
            current: None,
            next_index: 0,
        }
    }

    /// Adds one (image, mask) pair. Returns the previous group once `image`
    /// starts a new one.
    pub fn push(&mut self, image: DynamicImage, mask: GrayImage) -> Option<GroupedSample> {
        match self.current.as_mut() {
            Some(group) if same_pixels(&group.image, &image) => {
                group.masks.push(mask);
                return None;
            }
            _ => {}
        }
        let completed = self.take_current();
        self.current = Some(PendingGroup {
            image,
            masks: vec![mask],
        });
        completed
    }

    /// Completes the pending group, if any.
    pub fn finish(mut self) -> Option<GroupedSample> {
        self.take_current()
    }

    fn take_current(&mut self) -> Option<GroupedSample> {
        let group = self.current.take()?;
        let index = self.next_index;
        self.next_index += 1;
        Some(GroupedSample {
            index,
            image: group.image,
            masks: group.masks,
        })
    }
}

impl Default for GroupAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn mask(values: &[u8]) -> GrayImage {
        GrayImage::from_raw(values.len() as u32, 1, values.to_vec()).unwrap()
    }

    fn solid(value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([value, value, value])))
    }

    #[test]
    fn union_of_disjoint_masks() {
        let fused = fuse_masks(&[mask(&[255, 0, 0, 0]), mask(&[0, 0, 255, 255])]).unwrap();
        assert_eq!(fused.as_raw(), &vec![255, 0, 255, 255]);
    }

    #[test]
    fn overlapping_foreground_saturates() {
        let fused = fuse_masks(&[mask(&[255, 255]), mask(&[255, 0]), mask(&[255, 0])]).unwrap();
        assert_eq!(fused.as_raw(), &vec![255, 255]);
    }

    #[test]
    fn blank_mask_is_the_identity() {
        let annotated = mask(&[0, 255, 255, 0]);
        let fused = fuse_masks(&[mask(&[0, 0, 0, 0]), annotated.clone()]).unwrap();
        assert_eq!(fused, annotated);
    }

    #[test]
    fn fused_masks_stay_binary() {
        let masks: Vec<GrayImage> = (0..300)
            .map(|i| mask(&[255, if i % 2 == 0 { 255 } else { 0 }, 0]))
            .collect();
        let fused = fuse_masks(&masks).unwrap();
        assert_eq!(fused.as_raw(), &vec![255, 255, 0]);
    }

    #[test]
    fn empty_group_is_rejected() {
        assert!(matches!(fuse_masks(&[]), Err(FuseError::EmptyGroup)));
    }

    #[test]
    fn mismatched_mask_shapes_are_rejected() {
        let err = fuse_masks(&[mask(&[0, 0]), mask(&[0, 0, 0])]).unwrap_err();
        assert!(matches!(err, FuseError::MaskShapeMismatch { .. }));
    }

    #[test]
    fn identical_images_share_one_group() {
        let mut acc = GroupAccumulator::new();
        assert!(acc.push(solid(10), mask(&[255, 0])).is_none());
        assert!(acc.push(solid(10), mask(&[0, 255])).is_none());
        let last = acc.finish().unwrap();
        assert_eq!(last.index, 0);
        assert_eq!(last.masks.len(), 2);
        assert_eq!(last.combined_mask().unwrap().as_raw(), &vec![255, 255]);
    }

    #[test]
    fn differing_image_completes_previous_group() {
        let mut acc = GroupAccumulator::new();
        acc.push(solid(1), mask(&[255]));
        acc.push(solid(1), mask(&[255]));
        let first = acc.push(solid(2), mask(&[0])).unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.masks.len(), 2);
        assert!(same_pixels(&first.image, &solid(1)));

        let second = acc.push(solid(1), mask(&[0])).unwrap();
        assert_eq!(second.index, 1);
        assert!(same_pixels(&second.image, &solid(2)));

        let trailing = acc.finish().unwrap();
        assert_eq!(trailing.index, 2);
        assert!(same_pixels(&trailing.image, &solid(1)));
    }

    #[test]
    fn empty_accumulator_finishes_with_nothing() {
        assert!(GroupAccumulator::new().finish().is_none());
    }
}
