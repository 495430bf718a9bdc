use std::process::ExitCode;

use maskfuse::cli::parse_cli;
use maskfuse::logging;
use maskfuse::pipeline::{RunSummary, run};
use maskfuse::settings::resolve_settings;

fn main() -> ExitCode {
    logging::init();
    let (cli, sources) = parse_cli();

    let settings = match resolve_settings(&cli, &sources) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = settings.config_path.as_ref() {
        tracing::info!(path = %path.display(), "using config file");
    }

    match run(cli.stage(), &settings) {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn print_summary(summary: &RunSummary) {
    if let Some(report) = summary.preprocess.as_ref() {
        println!(
            "preprocess: {} annotation pairs -> {} fused samples ({} masks)",
            report.pairs, report.groups, report.masks_fused
        );
    }
    if let Some(plan) = summary.split.as_ref() {
        println!(
            "split: {} train, {} valid, {} test",
            plan.train.len(),
            plan.valid.len(),
            plan.test.len()
        );
    }
    if let Some(history) = summary.history.as_ref() {
        let last = |series: &[f32]| series.last().map(|v| format!("{v:.4}"));
        println!(
            "train: {} epochs, loss {}, val_loss {}",
            history.epochs(),
            last(&history.loss).unwrap_or_else(|| "-".into()),
            last(&history.val_loss).unwrap_or_else(|| "-".into())
        );
    }
}
