use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::{BaseDirs, ProjectDirs};
use maskfuse_types::{CountPolicy, MaskResample, SplitRatios, TargetSize};
use serde::Deserialize;

use crate::cli::{CliArgs, CliSources};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    raw_dir: Option<String>,
    dataset_dir: Option<String>,
    output_dir: Option<String>,
    size: Option<String>,
    mask_resample: Option<String>,
    count_policy: Option<String>,
    seed: Option<u64>,
    split: Option<SplitFileConfig>,
    train: Option<TrainFileConfig>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct SplitFileConfig {
    train: Option<f64>,
    valid: Option<f64>,
    test: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct TrainFileConfig {
    batch_size: Option<usize>,
    epochs: Option<usize>,
    learning_rate: Option<f32>,
    checkpoint_every: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    pub raw_dir: PathBuf,
    pub dataset_dir: PathBuf,
    pub output_dir: PathBuf,
    pub size: TargetSize,
    pub mask_resample: MaskResample,
    pub count_policy: CountPolicy,
    pub ratios: SplitRatios,
    pub seed: u64,
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    pub checkpoint_every: Option<usize>,
    pub show_progress: bool,
    pub config_path: Option<PathBuf>,
}

pub const CONFIG_FILE_NAME: &str = "maskfuse.toml";
const DEFAULT_RAW_DIR: &str = "data/raw";
const DEFAULT_DATASET_DIR: &str = "data";
const DEFAULT_OUTPUT_DIR: &str = "runs";
const DEFAULT_WIDTH: u32 = 256;
const DEFAULT_HEIGHT: u32 = 144;
const DEFAULT_SEED: u64 = 1;
const DEFAULT_LEARNING_RATE: f32 = 1e-3;
const DEFAULT_CHECKPOINT_EVERY: usize = 5;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config file {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config file {}: {source}", path.display())
            }
            ConfigError::InvalidValue { path, field, value } => match path {
                Some(path) => write!(
                    f,
                    "invalid value '{value}' for '{field}' in {}",
                    path.display()
                ),
                None => write!(f, "invalid value '{value}' for '{field}'"),
            },
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } | ConfigError::NotFound { .. } => None,
        }
    }
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.options().config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return read_config(path).map(|config| (config, Some(path.to_path_buf())));
    }

    let candidates = [project_config_path(), default_config_path()];
    for path in candidates.into_iter().flatten() {
        if path.exists() {
            let config = read_config(&path)?;
            tracing::debug!(path = %path.display(), "loaded config file");
            return Ok((config, Some(path)));
        }
    }
    Ok((FileConfig::default(), None))
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let options = cli.options();
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(Path::to_path_buf));

    let FileConfig {
        raw_dir: file_raw_dir,
        dataset_dir: file_dataset_dir,
        output_dir: file_output_dir,
        size: file_size,
        mask_resample: file_mask_resample,
        count_policy: file_count_policy,
        seed: file_seed,
        split: file_split,
        train: file_train,
    } = file;
    let file_split = file_split.unwrap_or_default();
    let file_train = file_train.unwrap_or_default();

    let resolve_dir = |cli_value: &Option<PathBuf>, file_value: Option<String>, default: &str| {
        cli_value
            .clone()
            .map(expand_pathbuf)
            .or_else(|| {
                normalize_string(file_value)
                    .and_then(|value| resolve_path_from_config(value, config_dir.as_deref()))
            })
            .unwrap_or_else(|| PathBuf::from(default))
    };
    let raw_dir = resolve_dir(&options.raw_dir, file_raw_dir, DEFAULT_RAW_DIR);
    let dataset_dir = resolve_dir(&options.dataset_dir, file_dataset_dir, DEFAULT_DATASET_DIR);
    let output_dir = resolve_dir(&options.output_dir, file_output_dir, DEFAULT_OUTPUT_DIR);

    let size = match normalize_string(options.size.clone()) {
        Some(value) => parse_value::<TargetSize>(&value, "size", None)?,
        None => match normalize_string(file_size) {
            Some(value) => parse_value::<TargetSize>(&value, "size", config_path.as_ref())?,
            None => TargetSize::new(DEFAULT_WIDTH, DEFAULT_HEIGHT).map_err(|_| {
                ConfigError::InvalidValue {
                    path: None,
                    field: "size",
                    value: format!("{DEFAULT_WIDTH}x{DEFAULT_HEIGHT}"),
                }
            })?,
        },
    };

    let mut mask_resample = MaskResample::from(options.mask_resample);
    if !sources.mask_resample_from_cli {
        if let Some(value) = normalize_string(file_mask_resample) {
            mask_resample = parse_value(&value, "mask_resample", config_path.as_ref())?;
        }
    }

    let mut count_policy = CountPolicy::from(options.count_policy);
    if !sources.count_policy_from_cli {
        if let Some(value) = normalize_string(file_count_policy) {
            count_policy = parse_value(&value, "count_policy", config_path.as_ref())?;
        }
    }

    let mut batch_size = options.batch_size as usize;
    if !sources.batch_size_from_cli {
        if let Some(value) = file_train.batch_size {
            batch_size = positive(value, "train.batch_size", config_path.as_ref())?;
        }
    }

    let mut epochs = options.epochs as usize;
    if !sources.epochs_from_cli {
        if let Some(value) = file_train.epochs {
            epochs = positive(value, "train.epochs", config_path.as_ref())?;
        }
    }

    let learning_rate = match (options.learning_rate, file_train.learning_rate) {
        (Some(value), _) => learning_rate(value, None)?,
        (None, Some(value)) => learning_rate(value, config_path.as_ref())?,
        (None, None) => DEFAULT_LEARNING_RATE,
    };

    let checkpoint_every = options
        .checkpoint_every
        .or(file_train.checkpoint_every)
        .unwrap_or(DEFAULT_CHECKPOINT_EVERY);
    let checkpoint_every = (checkpoint_every > 0).then_some(checkpoint_every);

    let defaults = SplitRatios::default();
    let train = options.train_ratio.or(file_split.train).unwrap_or(defaults.train());
    let valid = options.valid_ratio.or(file_split.valid).unwrap_or(defaults.valid());
    let test = options.test_ratio.or(file_split.test).unwrap_or(defaults.test());
    let ratios =
        SplitRatios::new(train, valid, test).map_err(|_| ConfigError::InvalidValue {
            path: config_path.clone(),
            field: "split",
            value: format!("{train}/{valid}/{test}"),
        })?;

    let seed = options.seed.or(file_seed).unwrap_or(DEFAULT_SEED);

    Ok(EffectiveSettings {
        raw_dir,
        dataset_dir,
        output_dir,
        size,
        mask_resample,
        count_policy,
        ratios,
        seed,
        batch_size,
        epochs,
        learning_rate,
        checkpoint_every,
        show_progress: !options.quiet,
        config_path,
    })
}

fn parse_value<T: FromStr>(
    value: &str,
    field: &'static str,
    path: Option<&PathBuf>,
) -> Result<T, ConfigError> {
    T::from_str(value).map_err(|_| ConfigError::InvalidValue {
        path: path.cloned(),
        field,
        value: value.to_string(),
    })
}

fn positive(value: usize, field: &'static str, path: Option<&PathBuf>) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            path: path.cloned(),
            field,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn learning_rate(value: f32, path: Option<&PathBuf>) -> Result<f32, ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::InvalidValue {
            path: path.cloned(),
            field: "train.learning_rate",
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "maskfuse", "maskfuse")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join(CONFIG_FILE_NAME))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

/// Relative paths in a config file are taken relative to that file.
fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    match base {
        Some(base) if !expanded.is_absolute() => Some(base.join(expanded)),
        _ => Some(expanded),
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}
