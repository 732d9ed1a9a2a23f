mod batch;
mod cli;
mod commit;
mod config;
mod dates;
mod error;
mod mux;
mod ops;
mod pairing;
mod record;
mod sidecar;
mod transform;
mod ui;

use crate::batch::{BatchContext, install_signal_handlers, run_batch};
use crate::cli::Cli;
use crate::config::Settings;
use crate::mux::{FfmpegMuxer, Muxer};
use crate::ops::Ops;
use crate::pairing::BatchPair;
use crate::transform::LinePrompter;
use crate::ui::prelude::*;
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    ui::init(format, !cli.no_color);
    ui::set_debug_mode(cli.debug);

    if let Err(err) = run(cli).await {
        emit(
            Level::Error,
            "startup.failed",
            &format!("Error: {:#}", err),
            None,
        );
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply_to(&mut settings);
    settings.validate()?;

    if cli.write_config {
        let path = match &cli.config {
            Some(path) => config::paths::expand_user_path(&path.to_string_lossy()),
            None => config::paths::default_config_path()?,
        };
        settings.save_with_documentation(&path)?;
        emit(
            Level::Success,
            "config.written",
            &format!("Wrote settings to {}", path.display()),
            None,
        );
        return Ok(());
    }

    let ops = Ops::from_settings(&settings).context("parsing operations")?;
    let pairs = parse_pairs(&settings.batch_pairs)?;

    let muxer: Option<Arc<dyn Muxer>> = settings.embed_metadata.then(|| {
        Arc::new(FfmpegMuxer {
            ffmpeg: settings.ffmpeg_program.clone(),
            ffprobe: settings.ffprobe_program.clone(),
            keep_backup: settings.keep_video_backup,
        }) as Arc<dyn Muxer>
    });
    let ctx = Arc::new(BatchContext::new(
        settings,
        ops,
        Arc::new(LinePrompter::stdin()),
        muxer,
    ));
    install_signal_handlers(ctx.cancel.clone());

    let summary = run_batch(&pairs, ctx).await;
    summary.log();
    Ok(())
}

fn parse_pairs(raw: &[String]) -> Result<Vec<BatchPair>> {
    if raw.is_empty() {
        anyhow::bail!("no batch pairs given (use -b VIDEO:META or batch_pairs in the settings file)");
    }
    raw.iter()
        .map(|s| {
            let pair: BatchPair = s.parse()?;
            pair.validate()?;
            Ok(pair)
        })
        .collect()
}
