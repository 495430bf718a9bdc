use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand, ValueEnum};
use maskfuse_types::{CountPolicy, MaskResample};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum MaskResampleArg {
    Area,
    Nearest,
}

impl From<MaskResampleArg> for MaskResample {
    fn from(value: MaskResampleArg) -> Self {
        match value {
            MaskResampleArg::Area => MaskResample::Area,
            MaskResampleArg::Nearest => MaskResample::Nearest,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CountPolicyArg {
    Strict,
    Truncate,
}

impl From<CountPolicyArg> for CountPolicy {
    fn from(value: CountPolicyArg) -> Self {
        match value {
            CountPolicyArg::Strict => CountPolicy::Strict,
            CountPolicyArg::Truncate => CountPolicy::Truncate,
        }
    }
}

/// Which options were typed on the command line rather than defaulted.
#[derive(Debug, Default)]
pub struct CliSources {
    pub mask_resample_from_cli: bool,
    pub count_policy_from_cli: bool,
    pub batch_size_from_cli: bool,
    pub epochs_from_cli: bool,
}

impl CliSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            mask_resample_from_cli: value_from_cli(matches, "mask_resample"),
            count_policy_from_cli: value_from_cli(matches, "count_policy"),
            batch_size_from_cli: value_from_cli(matches, "batch_size"),
            epochs_from_cli: value_from_cli(matches, "epochs"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let matches = CliArgs::command().get_matches();
    match from_matches(&matches) {
        Ok(parsed) => parsed,
        Err(err) => err.exit(),
    }
}

/// Parses an explicit argument list; used by tests and embedding callers.
pub fn parse_cli_from<I, T>(args: I) -> Result<(CliArgs, CliSources), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = CliArgs::command().try_get_matches_from(args)?;
    from_matches(&matches)
}

fn from_matches(matches: &ArgMatches) -> Result<(CliArgs, CliSources), clap::Error> {
    let args = CliArgs::from_arg_matches(matches)?;
    // stage options live on the subcommand
    let sources = matches
        .subcommand()
        .map(|(_, sub)| CliSources::from_matches(sub))
        .unwrap_or_default();
    Ok((args, sources))
}

#[derive(Debug, Parser)]
#[command(
    name = "maskfuse",
    about = "Fuse raw annotation masks into a segmentation dataset and train on it",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    pub fn stage(&self) -> Stage {
        match self.command {
            Command::Preprocess(_) => Stage::Preprocess,
            Command::Split(_) => Stage::Split,
            Command::Train(_) => Stage::Train,
            Command::Run(_) => Stage::Run,
        }
    }

    pub fn options(&self) -> &StageArgs {
        match &self.command {
            Command::Preprocess(args)
            | Command::Split(args)
            | Command::Train(args)
            | Command::Run(args) => args,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Stage {
    Preprocess,
    Split,
    Train,
    Run,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Group raw annotations by image, fuse their masks and write the dataset
    Preprocess(StageArgs),
    /// Shuffle the fused dataset into train/valid/test subsets
    Split(StageArgs),
    /// Train the baseline segmentation model on the split dataset
    Train(StageArgs),
    /// Preprocess, split and train in sequence
    Run(StageArgs),
}

#[derive(Debug, Args)]
pub struct StageArgs {
    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Raw annotation export read by the preprocessor
    #[arg(long = "raw-dir", alias = "data-dir", value_name = "DIR")]
    pub raw_dir: Option<PathBuf>,

    /// Dataset root holding images/ and masks/
    #[arg(long = "dataset-dir", value_name = "DIR")]
    pub dataset_dir: Option<PathBuf>,

    /// Directory for checkpoints, previews and training history
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output size as WIDTHxHEIGHT
    #[arg(long = "size", value_name = "WxH")]
    pub size: Option<String>,

    /// Resampling used when shrinking masks
    #[arg(long = "mask-resample", value_enum, default_value_t = MaskResampleArg::Area)]
    pub mask_resample: MaskResampleArg,

    /// How to treat a listing whose image and mask counts differ
    #[arg(long = "count-policy", value_enum, default_value_t = CountPolicyArg::Strict)]
    pub count_policy: CountPolicyArg,

    /// Samples per training batch
    #[arg(
        long = "batch-size",
        default_value_t = 25,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub batch_size: u64,

    /// Training epochs
    #[arg(
        long = "epochs",
        default_value_t = 25,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub epochs: u64,

    /// Optimizer learning rate
    #[arg(long = "learning-rate", value_name = "RATE")]
    pub learning_rate: Option<f32>,

    /// Save weights every N epochs (0 disables checkpoints)
    #[arg(long = "checkpoint-every", value_name = "N")]
    pub checkpoint_every: Option<usize>,

    /// Fraction of samples moved to the train subset
    #[arg(long = "train-ratio")]
    pub train_ratio: Option<f64>,

    /// Fraction of samples moved to the valid subset
    #[arg(long = "valid-ratio")]
    pub valid_ratio: Option<f64>,

    /// Fraction of samples moved to the test subset
    #[arg(long = "test-ratio")]
    pub test_ratio: Option<f64>,

    /// Seed for shuffling and augmentation
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Hide progress bars
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}
