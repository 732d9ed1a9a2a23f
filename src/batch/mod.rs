//! Drives matched records through sidecar edits, muxing, renaming and
//! moving on a bounded pool of blocking workers.

mod gate;

pub use gate::ResourceGate;

use crate::commit;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::mux::{Muxer, mux_fields};
use crate::ops::Ops;
use crate::pairing::{self, BatchPair, ScanOptions};
use crate::record::{FileRecord, RecordState};
use crate::sidecar::{self, Sidecar};
use crate::transform::{EditContext, OverwriteState, Prompter, compute_tags, transform_stem};
use crate::ui::prelude::*;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Shared, read-only inputs of one run plus the overwrite bits.
pub struct BatchContext {
    pub settings: Settings,
    pub ops: Arc<Ops>,
    pub overwrite: OverwriteState,
    pub prompter: Arc<dyn Prompter>,
    pub muxer: Option<Arc<dyn Muxer>>,
    pub cancel: CancellationToken,
}

impl BatchContext {
    pub fn new(settings: Settings, ops: Ops, prompter: Arc<dyn Prompter>, muxer: Option<Arc<dyn Muxer>>) -> Self {
        let overwrite = OverwriteState::new(settings.overwrite_all, settings.preserve_all);
        Self {
            settings,
            ops: Arc::new(ops),
            overwrite,
            prompter,
            muxer,
            cancel: CancellationToken::new(),
        }
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::OperationCanceled);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub label: String,
    pub state: RecordState,
    pub final_video_path: Option<PathBuf>,
    pub final_meta_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub committed: usize,
    pub failed: usize,
    pub canceled: usize,
    pub unmatched: usize,
    pub failed_pairs: usize,
}

impl BatchSummary {
    pub fn record(&mut self, state: &RecordState) {
        match state {
            RecordState::Committed => self.committed += 1,
            RecordState::Canceled => self.canceled += 1,
            _ => self.failed += 1,
        }
    }

    pub fn log(&self) {
        let level = if self.failed + self.failed_pairs > 0 {
            Level::Warn
        } else {
            Level::Success
        };
        emit(
            level,
            "batch.summary",
            &format!(
                "{} committed, {} failed, {} canceled, {} without sidecar",
                self.committed, self.failed, self.canceled, self.unmatched
            ),
            Some(json!({
                "committed": self.committed,
                "failed": self.failed,
                "canceled": self.canceled,
                "unmatched": self.unmatched,
                "failed_pairs": self.failed_pairs,
            })),
        );
    }
}

/// Cancel `cancel` on the first SIGINT or SIGTERM.
pub fn install_signal_handlers(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let sigterm = async {
            match terminate.as_mut() {
                Some(stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm => {}
        }
        emit(
            Level::Warn,
            "batch.interrupted",
            "Interrupted; finishing records already in progress",
            None,
        );
        cancel.cancel();
    });
}

pub async fn run_batch(pairs: &[BatchPair], ctx: Arc<BatchContext>) -> BatchSummary {
    let settings = &ctx.settings;
    let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let gate = ResourceGate::new(settings.max_cpu_pct, settings.min_free_mem_bytes);
    let options = ScanOptions {
        video_extensions: settings.video_extensions.clone(),
        filters: settings.filters.clone(),
    };
    let mut summary = BatchSummary::default();
    let mut tasks = JoinSet::new();

    for pair in pairs {
        let matches = match pairing::collect_records(pair, &options, &ctx.ops) {
            Ok(matches) => matches,
            Err(err) => {
                summary.failed_pairs += 1;
                emit(
                    Level::Error,
                    "pair.failed",
                    &format!("{}: {}", pair, err),
                    Some(json!({ "pair": pair.to_string(), "kind": err.kind() })),
                );
                continue;
            }
        };
        summary.unmatched += matches.unmatched.len();

        for record in matches.records {
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                _ = ctx.cancel.cancelled() => None,
            };
            let Some(permit) = permit else {
                summary.canceled += 1;
                continue;
            };
            if gate.wait(&ctx.cancel).await.is_err() {
                summary.canceled += 1;
                continue;
            }

            let worker_ctx = Arc::clone(&ctx);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                process_record(record, &worker_ctx)
            });
        }
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => summary.record(&outcome.state),
            Err(err) => {
                summary.failed += 1;
                emit(
                    Level::Error,
                    "record.panicked",
                    &format!("A worker stopped unexpectedly: {}", err),
                    None,
                );
            }
        }
    }
    summary
}

/// Run one record to a terminal state and log the result.
pub fn process_record(mut record: FileRecord, ctx: &BatchContext) -> RecordOutcome {
    let label = record.label();
    let mut progress = RecordState::Discovered;
    emit(
        Level::Debug,
        "record.start",
        &format!("Processing {}", record.original_video_path.display()),
        None,
    );

    let state = match drive(&mut record, ctx, &mut progress) {
        Ok(()) => RecordState::Committed,
        Err(err) => {
            let terminal = progress.fail(&err);
            match &terminal {
                RecordState::Canceled => emit(
                    Level::Warn,
                    "record.canceled",
                    &format!("{}: canceled at {}", label, progress),
                    None,
                ),
                _ => emit(
                    Level::Error,
                    "record.failed",
                    &format!("{}: {} ({})", label, err, terminal),
                    Some(json!({
                        "record": record.original_video_path.display().to_string(),
                        "state": progress.name(),
                        "kind": err.kind(),
                    })),
                ),
            }
            terminal
        }
    };

    RecordOutcome {
        label,
        state,
        final_video_path: record.final_video_path.clone(),
        final_meta_path: record.final_meta_path.clone(),
    }
}

fn drive(record: &mut FileRecord, ctx: &BatchContext, state: &mut RecordState) -> Result<()> {
    ctx.checkpoint()?;
    let mut sidecar = sidecar::open(record, ctx.settings.backup_sidecars)?;
    *state = RecordState::MetaOpened;

    let outcome = transform_and_commit(record, ctx, sidecar.as_mut(), state);
    if let Err(err) = &outcome
        && !matches!(err, Error::OperationCanceled)
    {
        if let Err(undo) = sidecar.rollback() {
            emit(
                Level::Error,
                "sidecar.rollback.failed",
                &format!("{}: could not restore sidecar: {}", record.label(), undo),
                None,
            );
        }
    }
    drop(sidecar);

    outcome?;
    purge(record, ctx);
    Ok(())
}

fn transform_and_commit(
    record: &mut FileRecord,
    ctx: &BatchContext,
    sidecar: &mut dyn Sidecar,
    state: &mut RecordState,
) -> Result<()> {
    let settings = &ctx.settings;
    let ops = Arc::clone(&record.ops);
    let label = record.label();

    let edit_ctx = EditContext {
        ops: &ops.meta,
        record_overwrite: ops.overwrite,
        overwrite: &ctx.overwrite,
        prompter: ctx.prompter.as_ref(),
        cancel: &ctx.cancel,
        label: &label,
    };
    let mut changed = sidecar.make_meta_edits(&edit_ctx)?;
    if ops.meta.has_date_tag_ops() {
        ctx.checkpoint()?;
        changed |= sidecar.make_date_tag_edits(&ops.meta, &label)?;
    }
    *state = RecordState::MetaTransformed;
    if changed {
        emit(
            Level::Info,
            "record.meta.updated",
            &format!("{}: updated {}", label, sidecar.path().display()),
            None,
        );
    }

    let meta = sidecar.decode()?;
    record.computed = compute_tags(&meta, &ops.filename, &settings.filename_prefix_fields);

    if let Some(muxer) = &ctx.muxer {
        *state = RecordState::MuxRequested;
        ctx.checkpoint()?;
        let fields = mux_fields(&meta, &record.computed.formatted_date);
        if !fields.is_empty() {
            if muxer.already_applied(&record.original_video_path, &fields)? {
                record.meta_already_applied = true;
            } else {
                muxer.apply(&record.original_video_path, &fields, &ctx.cancel)?;
            }
        }
        *state = RecordState::Muxed;
    }

    let stem = transform_stem(
        &record.video_base,
        &meta,
        &ops.filename,
        settings.naming_style,
        &record.computed,
    );
    *state = RecordState::FilenameComputed;

    commit_record(record, &stem, settings)
}

fn commit_record(record: &mut FileRecord, stem: &str, settings: &Settings) -> Result<()> {
    let src_video = record.original_video_path.clone();
    let src_meta = record.meta_path.clone();
    let mut video = record.video_path_for(stem);
    let mut meta = record.meta_path_for(stem);
    commit::write_results(&src_video, &video, Some(&src_meta), Some(&meta))?;

    if let Some(dir) = &settings.output_dir {
        match commit::move_pair(&video, Some(&meta), dir) {
            Ok((moved_video, moved_meta)) => {
                video = moved_video;
                meta = moved_meta.unwrap_or(meta);
            }
            Err(err) => {
                if let Err(undo) = commit::write_results(&video, &src_video, Some(&meta), Some(&src_meta)) {
                    emit(
                        Level::Error,
                        "commit.rollback.failed",
                        &format!("{}: could not undo rename: {}", record.label(), undo),
                        None,
                    );
                }
                return Err(err);
            }
        }
    }

    let renamed = video != src_video || meta != src_meta;
    emit(
        if renamed { Level::Success } else { Level::Info },
        if renamed {
            "record.commit.success"
        } else {
            "record.commit.unchanged"
        },
        &format!("{} -> {}", src_video.display(), video.display()),
        Some(json!({
            "video_from": src_video.display().to_string(),
            "video_to": video.display().to_string(),
            "meta_from": src_meta.display().to_string(),
            "meta_to": meta.display().to_string(),
            "already_muxed": record.meta_already_applied,
        })),
    );
    record.final_video_path = Some(video);
    record.final_meta_path = Some(meta);
    Ok(())
}

/// Delete the committed sidecar when the purge mode asks for it. Failures
/// only warn; the record is already committed.
fn purge(record: &mut FileRecord, ctx: &BatchContext) {
    let Some(meta) = record.final_meta_path.clone() else {
        return;
    };
    match commit::delete_metafile(&meta, ctx.settings.purge_metafile) {
        Ok(true) => {
            emit(
                Level::Info,
                "record.meta.purged",
                &format!("Deleted {}", meta.display()),
                None,
            );
            record.final_meta_path = None;
        }
        Ok(false) => {}
        Err(err) => emit(
            Level::Warn,
            "record.meta.purge_failed",
            &format!("{}: {}", record.label(), err),
            None,
        ),
    }
}
