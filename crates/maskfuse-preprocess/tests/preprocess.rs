use std::fs;
use std::path::Path;

use image::{GrayImage, Luma, Rgb, RgbImage};
use maskfuse_preprocess::{PreprocessConfig, preprocess_data};
use maskfuse_types::{CountPolicy, FuseError, MaskResample, TargetSize};

const SIZE: (u32, u32) = (8, 6);

fn config(data_dir: &Path, output_dir: &Path, policy: CountPolicy) -> PreprocessConfig {
    PreprocessConfig {
        data_dir: data_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        size: TargetSize::new(SIZE.0, SIZE.1).unwrap(),
        mask_resample: MaskResample::Nearest,
        count_policy: policy,
        show_progress: false,
    }
}

fn scene(seed: u8) -> RgbImage {
    RgbImage::from_fn(SIZE.0, SIZE.1, |x, y| {
        Rgb([seed, (x * 20) as u8, (y * 30) as u8])
    })
}

/// Foreground on columns `[from, to)`.
fn band_mask(from: u32, to: u32) -> GrayImage {
    GrayImage::from_fn(SIZE.0, SIZE.1, |x, _| {
        if (from..to).contains(&x) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Writes one four-file block: metadata, image, metadata, mask.
fn write_block(dir: &Path, block: usize, image: &RgbImage, mask: &GrayImage) {
    fs::write(dir.join(format!("{block:04}_0.json")), b"{}").unwrap();
    image.save(dir.join(format!("{block:04}_1.png"))).unwrap();
    fs::write(dir.join(format!("{block:04}_2.json")), b"{}").unwrap();
    mask.save(dir.join(format!("{block:04}_3.png"))).unwrap();
}

fn output_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[test]
fn repeated_image_masks_are_fused_into_one_pair() {
    let raw = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let image = scene(40);
    write_block(raw.path(), 0, &image, &band_mask(0, 2));
    write_block(raw.path(), 1, &image, &band_mask(5, 8));

    let report = preprocess_data(&config(raw.path(), out.path(), CountPolicy::Strict)).unwrap();
    assert_eq!(report.pairs, 2);
    assert_eq!(report.groups, 1);
    assert_eq!(report.masks_fused, 2);

    assert_eq!(output_names(&out.path().join("images")), vec!["0.png"]);
    assert_eq!(output_names(&out.path().join("masks")), vec!["0.png"]);

    let mask = image::open(out.path().join("masks/0.png")).unwrap().to_luma8();
    for (x, _, pixel) in mask.enumerate_pixels() {
        let expected = if x < 2 || x >= 5 { 255 } else { 0 };
        assert_eq!(pixel.0[0], expected, "column {x}");
    }
}

#[test]
fn one_pair_per_distinct_image_including_the_last() {
    let raw = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let a = scene(10);
    let b = scene(90);
    let c = scene(170);
    write_block(raw.path(), 0, &a, &band_mask(0, 1));
    write_block(raw.path(), 1, &a, &band_mask(1, 2));
    write_block(raw.path(), 2, &b, &band_mask(2, 3));
    write_block(raw.path(), 3, &c, &band_mask(3, 4));
    write_block(raw.path(), 4, &c, &GrayImage::new(SIZE.0, SIZE.1));

    let report = preprocess_data(&config(raw.path(), out.path(), CountPolicy::Strict)).unwrap();
    assert_eq!(report.groups, 3);
    assert_eq!(
        output_names(&out.path().join("images")),
        vec!["0.png", "1.png", "2.png"]
    );

    for index in 0..3 {
        let image = image::open(out.path().join(format!("images/{index}.png"))).unwrap();
        let mask = image::open(out.path().join(format!("masks/{index}.png"))).unwrap();
        assert_eq!((image.width(), image.height()), SIZE);
        assert_eq!((mask.width(), mask.height()), SIZE);
        assert!(mask.to_luma8().iter().all(|&v| v == 0 || v == 255));
    }

    // the blank mask leaves the last group's annotation unchanged
    let last = image::open(out.path().join("masks/2.png")).unwrap().to_luma8();
    assert_eq!(last, band_mask(3, 4));
}

#[test]
fn non_adjacent_repeats_start_new_groups() {
    let raw = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let a = scene(10);
    let b = scene(90);
    write_block(raw.path(), 0, &a, &band_mask(0, 1));
    write_block(raw.path(), 1, &b, &band_mask(1, 2));
    write_block(raw.path(), 2, &a, &band_mask(2, 3));

    let report = preprocess_data(&config(raw.path(), out.path(), CountPolicy::Strict)).unwrap();
    assert_eq!(report.groups, 3);
}

#[test]
fn count_mismatch_is_rejected_under_strict_policy() {
    let raw = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_block(raw.path(), 0, &scene(1), &band_mask(0, 1));
    fs::write(raw.path().join("0001_0.json"), b"{}").unwrap();
    scene(2).save(raw.path().join("0001_1.png")).unwrap();

    let err = preprocess_data(&config(raw.path(), out.path(), CountPolicy::Strict)).unwrap_err();
    assert!(matches!(err, FuseError::CountMismatch { images: 2, masks: 1 }));

    let report = preprocess_data(&config(raw.path(), out.path(), CountPolicy::Truncate)).unwrap();
    assert_eq!(report.groups, 1);
}

#[test]
fn empty_directory_produces_no_output() {
    let raw = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let report = preprocess_data(&config(raw.path(), out.path(), CountPolicy::Strict)).unwrap();
    assert_eq!(report.groups, 0);
    assert!(output_names(&out.path().join("images")).is_empty());
}
