use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use looperconfig::{Config, Output};
use looperdecode::{AbortHandle, AudioSink, DecodeError, NullSink, play_file_async};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: looper [--config DIR] FILE...";

struct Args {
    config_dir: Option<PathBuf>,
    files: Vec<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args_os().skip(1);
    let mut config_dir = None;
    let mut files = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let dir = args.next().context("--config needs a directory")?;
            config_dir = Some(PathBuf::from(dir));
        } else if arg == "-h" || arg == "--help" {
            println!("{USAGE}");
            std::process::exit(0);
        } else {
            files.push(PathBuf::from(arg));
        }
    }
    if files.is_empty() {
        anyhow::bail!("{USAGE}");
    }
    Ok(Args { config_dir, files })
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn make_sink(output: Output) -> Result<Box<dyn AudioSink>, DecodeError> {
    match output {
        #[cfg(feature = "cpal")]
        Output::Device => Ok(Box::new(looperdecode::CpalSink::new())),
        #[cfg(not(feature = "cpal"))]
        Output::Device => {
            tracing::warn!("built without the cpal feature, decoding without sound");
            Ok(Box::new(NullSink::new()))
        }
        Output::Discard => Ok(Box::new(NullSink::new())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = parse_args()?;
    let config = Config::load(args.config_dir.as_deref())?;
    init_logging(&config.logging.level);
    if let Some(source) = &config.source {
        info!(config = %source.display(), "configuration loaded");
    }

    let abort = AbortHandle::new();
    let on_signal = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping playback");
            on_signal.abort();
        }
    });

    let options = config.session_options();
    let output = config.playback.output;
    let mut failures = 0usize;
    for path in args.files {
        if abort.is_aborted() {
            break;
        }
        let shown = path.display().to_string();
        match play_file_async(path, move || make_sink(output), options, abort.clone()).await {
            Ok(report) => info!(
                file = %shown,
                frames = report.frames,
                duration = ?report.format.duration(),
                "played"
            ),
            Err(err) => {
                failures += 1;
                error!(file = %shown, kind = ?err.kind(), "skipping: {err}");
            }
        }
    }

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
