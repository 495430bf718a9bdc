use std::fs;
use std::path::Path;

use image::{GrayImage, Luma, Rgb, RgbImage};
use maskfuse::cli::{Stage, parse_cli_from};
use maskfuse::pipeline::{AppError, WEIGHTS_FILE, run};
use maskfuse::settings::{EffectiveSettings, resolve_settings};
use maskfuse_train::TrainError;
use maskfuse_types::FuseError;

/// Bright left half over a per-sample background tint.
fn scene(tint: u8) -> RgbImage {
    RgbImage::from_fn(32, 16, |x, _| {
        if x < 16 {
            Rgb([250, 250, 250])
        } else {
            Rgb([tint, tint / 2, 10])
        }
    })
}

fn left_half_mask() -> GrayImage {
    GrayImage::from_fn(32, 16, |x, _| if x < 16 { Luma([255]) } else { Luma([0]) })
}

fn write_raw_export(dir: &Path, samples: usize) {
    fs::create_dir_all(dir).unwrap();
    for block in 0..samples {
        fs::write(dir.join(format!("{block:04}_0.json")), b"{}").unwrap();
        scene(block as u8 * 9)
            .save(dir.join(format!("{block:04}_1.png")))
            .unwrap();
        fs::write(dir.join(format!("{block:04}_2.json")), b"{}").unwrap();
        left_half_mask()
            .save(dir.join(format!("{block:04}_3.png")))
            .unwrap();
    }
}

fn file_count(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

fn settings(root: &Path, stage: &str, extra: &[&str]) -> (Stage, EffectiveSettings) {
    let config = root.join("maskfuse.toml");
    fs::write(
        &config,
        "size = \"16x8\"\nseed = 7\n\n[split]\ntrain = 0.5\nvalid = 0.25\ntest = 0.25\n",
    )
    .unwrap();
    let mut argv = vec![
        "maskfuse".to_string(),
        stage.to_string(),
        "--quiet".to_string(),
        "--config".to_string(),
        config.display().to_string(),
    ];
    argv.extend(extra.iter().map(|arg| arg.to_string()));
    let (cli, sources) = parse_cli_from(argv).unwrap();
    let settings = resolve_settings(&cli, &sources).unwrap();
    (cli.stage(), settings)
}

#[test]
fn full_run_preprocesses_splits_and_trains() {
    let root = tempfile::tempdir().unwrap();
    write_raw_export(&root.path().join("raw"), 12);
    let (stage, settings) = settings(
        root.path(),
        "run",
        &[
            "--raw-dir",
            root.path().join("raw").to_str().unwrap(),
            "--dataset-dir",
            root.path().join("data").to_str().unwrap(),
            "--output-dir",
            root.path().join("runs").to_str().unwrap(),
            "--batch-size",
            "2",
            "--epochs",
            "2",
            "--learning-rate",
            "0.05",
        ],
    );

    let summary = run(stage, &settings).unwrap();

    let report = summary.preprocess.unwrap();
    assert_eq!(report.pairs, 12);
    assert_eq!(report.groups, 12);

    let plan = summary.split.unwrap();
    assert_eq!((plan.train.len(), plan.valid.len(), plan.test.len()), (6, 3, 3));
    let data = root.path().join("data");
    assert_eq!(file_count(&data.join("images/train")), 6);
    assert_eq!(file_count(&data.join("masks/valid")), 3);
    assert_eq!(file_count(&data.join("masks/test")), 3);

    let history = summary.history.unwrap();
    assert_eq!(history.epochs(), 2);
    assert_eq!(history.val_loss.len(), 2);

    let runs = root.path().join("runs");
    assert!(runs.join("history.json").is_file());
    assert!(runs.join(WEIGHTS_FILE).is_file());
    assert!(runs.join("checkpoints/epoch_2.json").is_file());
    assert_eq!(file_count(&runs.join("previews")), 3);

    let preview = image::open(runs.join("previews/0.png")).unwrap();
    assert_eq!((preview.width(), preview.height()), (16, 8));
}

#[test]
fn fused_outputs_have_the_configured_size() {
    let root = tempfile::tempdir().unwrap();
    write_raw_export(&root.path().join("raw"), 2);
    let (stage, settings) = settings(
        root.path(),
        "preprocess",
        &[
            "--raw-dir",
            root.path().join("raw").to_str().unwrap(),
            "--dataset-dir",
            root.path().join("data").to_str().unwrap(),
        ],
    );
    run(stage, &settings).unwrap();

    let mask = image::open(root.path().join("data/masks/1.png"))
        .unwrap()
        .to_luma8();
    assert_eq!(mask.dimensions(), (16, 8));
    assert!(mask.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    assert_eq!(mask.get_pixel(0, 4).0[0], 255);
    assert_eq!(mask.get_pixel(15, 4).0[0], 0);
}

#[test]
fn count_mismatch_surfaces_as_data_error() {
    let root = tempfile::tempdir().unwrap();
    let raw = root.path().join("raw");
    write_raw_export(&raw, 2);
    // a fifth-block image without its mask
    scene(200).save(raw.join("0008_1.png")).unwrap();
    fs::write(raw.join("0008_0.json"), b"{}").unwrap();

    let (stage, settings) = settings(
        root.path(),
        "preprocess",
        &[
            "--raw-dir",
            raw.to_str().unwrap(),
            "--dataset-dir",
            root.path().join("data").to_str().unwrap(),
        ],
    );
    let err = run(stage, &settings).unwrap_err();
    assert!(matches!(
        err,
        AppError::Data(FuseError::CountMismatch { images: 3, masks: 2 })
    ));
}

#[test]
fn training_without_samples_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let data = root.path().join("data");
    fs::create_dir_all(data.join("images")).unwrap();
    fs::create_dir_all(data.join("masks")).unwrap();
    let (stage, settings) = settings(
        root.path(),
        "train",
        &["--dataset-dir", data.to_str().unwrap()],
    );
    assert!(matches!(
        run(stage, &settings),
        Err(AppError::EmptyDataset { .. })
    ));
}

#[test]
fn training_needs_a_full_batch() {
    let root = tempfile::tempdir().unwrap();
    write_raw_export(&root.path().join("raw"), 3);
    let dirs = [
        "--raw-dir".to_string(),
        root.path().join("raw").display().to_string(),
        "--dataset-dir".to_string(),
        root.path().join("data").display().to_string(),
        "--output-dir".to_string(),
        root.path().join("runs").display().to_string(),
    ];
    let dirs: Vec<&str> = dirs.iter().map(String::as_str).collect();

    let (stage, preprocess) = settings(root.path(), "preprocess", &dirs);
    run(stage, &preprocess).unwrap();

    // default batch size of 25 against three samples
    let (stage, train) = settings(root.path(), "train", &dirs);
    let err = run(stage, &train).unwrap_err();
    assert!(matches!(
        err,
        AppError::Train(TrainError::InsufficientData {
            data_size: 3,
            batch_size: 25
        })
    ));
    assert!(!root.path().join("runs").join(WEIGHTS_FILE).exists());
}
