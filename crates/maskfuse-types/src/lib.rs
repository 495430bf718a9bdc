//! Shared domain models for the maskfuse workspace.
//!
//! This crate centralizes the small value types and the error enum used by the
//! preprocessing, dataset and training crates.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type FuseResult<T> = Result<T, FuseError>;

/// Resize target shared by every image and mask of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(u32, u32)", into = "(u32, u32)")]
pub struct TargetSize {
    width: u32,
    height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> FuseResult<Self> {
        if width == 0 || height == 0 {
            return Err(FuseError::InvalidSize { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl TryFrom<(u32, u32)> for TargetSize {
    type Error = FuseError;

    fn try_from((width, height): (u32, u32)) -> Result<Self, Self::Error> {
        Self::new(width, height)
    }
}

impl From<TargetSize> for (u32, u32) {
    fn from(size: TargetSize) -> Self {
        (size.width, size.height)
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for TargetSize {
    type Err = FuseError;

    /// Parses `WIDTHxHEIGHT`, e.g. `256x144`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || FuseError::configuration(format!("invalid size '{value}', expected WxH"));
        let (w, h) = value
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width = w.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = h.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::new(width, height)
    }
}

/// Resampling filter applied to masks before binarization.
///
/// `Area` matches the high-quality antialiasing filter used for images and
/// relies on the threshold to remove the soft edges it introduces. `Nearest`
/// never produces partial intensities in the first place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskResample {
    #[default]
    Area,
    Nearest,
}

impl MaskResample {
    pub fn as_str(self) -> &'static str {
        match self {
            MaskResample::Area => "area",
            MaskResample::Nearest => "nearest",
        }
    }
}

impl FromStr for MaskResample {
    type Err = FuseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "area" | "antialias" | "lanczos" => Ok(MaskResample::Area),
            "nearest" => Ok(MaskResample::Nearest),
            other => Err(FuseError::configuration(format!(
                "unknown mask resample filter '{other}'"
            ))),
        }
    }
}

/// What to do when the image and mask subsequences of a raw listing differ in
/// length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountPolicy {
    #[default]
    Strict,
    Truncate,
}

impl CountPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CountPolicy::Strict => "strict",
            CountPolicy::Truncate => "truncate",
        }
    }
}

impl FromStr for CountPolicy {
    type Err = FuseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(CountPolicy::Strict),
            "truncate" => Ok(CountPolicy::Truncate),
            other => Err(FuseError::configuration(format!(
                "unknown count policy '{other}'"
            ))),
        }
    }
}

/// Train/validation/test fractions. Always sums to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    train: f64,
    valid: f64,
    test: f64,
}

const RATIO_TOLERANCE: f64 = 1e-6;

impl SplitRatios {
    pub fn new(train: f64, valid: f64, test: f64) -> FuseResult<Self> {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        let sum = train + valid + test;
        if !in_range(train) || !in_range(valid) || !in_range(test) || (sum - 1.0).abs() > RATIO_TOLERANCE
        {
            return Err(FuseError::InvalidRatios { train, valid, test });
        }
        Ok(Self { train, valid, test })
    }

    pub fn train(&self) -> f64 {
        self.train
    }

    pub fn valid(&self) -> f64 {
        self.valid
    }

    pub fn test(&self) -> f64 {
        self.test
    }
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            valid: 0.15,
            test: 0.15,
        }
    }
}

#[derive(Debug, Error)]
pub enum FuseError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error on {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("listing has {images} image files but {masks} mask files")]
    CountMismatch { images: usize, masks: usize },

    #[error("invalid target size {width}x{height}; both sides must be positive")]
    InvalidSize { width: u32, height: u32 },

    #[error("invalid split ratios {train}/{valid}/{test}; each must lie in [0, 1] and sum to 1")]
    InvalidRatios { train: f64, valid: f64, test: f64 },

    #[error(
        "shape mismatch for {}: expected {expected:?}, found {found:?}",
        .path.display()
    )]
    InconsistentShape {
        path: PathBuf,
        expected: (u32, u32, usize),
        found: (u32, u32, usize),
    },

    #[error("cannot fuse masks of shape {found:?} into a group of shape {expected:?}")]
    MaskShapeMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("cannot fuse an empty mask group")]
    EmptyGroup,

    #[error("image {name} has no matching mask")]
    MissingMask { name: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl FuseError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn image(path: impl AsRef<Path>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
