//! Batch runs: discovery, probing, classification and relocation over one
//! root folder.
//!
//! A run moves through `Idle → Scanning → Processing → Completed | Aborted`.
//! One coordinating task owns the [`BatchResultBuilder`] and spawns a bounded
//! pool of workers. Workers pull files from a shared queue and report back
//! over a channel; the coordinator numbers the reports in completion order
//! and forwards them as [`ProgressEvent`]s.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::batch::{BatchResult, BatchResultBuilder};
use crate::config::SorterConfig;
use crate::discover::{Discoverer, VideoFile};
use crate::error::{Result, SortError};
use crate::events::{AbortReason, FileOutcome, FileReport, ProgressEvent, RunState};
use crate::fs::{FileSystem, RealFs};
use crate::probe::{FfprobeProber, Prober};
use crate::relocate::{Relocation, Relocator, tier_dir};
use crate::tier::classify;

/// Entry point for front ends. Cheap to clone; clones share the registry of
/// running roots.
#[derive(Clone)]
pub struct Orchestrator {
    config: SorterConfig,
    fs: Arc<dyn FileSystem>,
    prober: Arc<dyn Prober>,
    relocator: Arc<Relocator>,
    active_roots: Arc<DashMap<PathBuf, Uuid>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("prober", &self.prober.name())
            .field("active_roots", &self.active_roots.len())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(config: SorterConfig, prober: Arc<dyn Prober>, fs: Arc<dyn FileSystem>) -> Self {
        let relocator = Arc::new(Relocator::new(Arc::clone(&fs)));
        Self {
            config,
            fs,
            prober,
            relocator,
            active_roots: Arc::new(DashMap::new()),
        }
    }

    /// Orchestrator over the real filesystem, probing with ffprobe.
    pub fn with_ffprobe(config: SorterConfig) -> Self {
        let prober = Arc::new(FfprobeProber::from_config(&config));
        Self::new(config, prober, Arc::new(RealFs::new()))
    }

    pub fn config(&self) -> &SorterConfig {
        &self.config
    }

    /// Whether a run currently holds `root` (compared after canonicalizing).
    pub async fn is_running(&self, root: &Path) -> bool {
        match self.fs.canonicalize(root).await {
            Ok(root) => self.active_roots.contains_key(&root),
            Err(_) => false,
        }
    }

    /// Start sorting `root` in the background.
    ///
    /// Rejected before anything is touched with [`SortError::InvalidRoot`]
    /// when `root` is not an existing directory, and with
    /// [`SortError::RunInProgress`] when another run holds the same root.
    pub async fn start_run(&self, root: impl AsRef<Path>) -> Result<RunHandle> {
        let root = self.validate_root(root.as_ref()).await?;
        let run_id = Uuid::now_v7();
        let lease = RootLease::acquire(&self.active_roots, root.clone(), run_id)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(RunState::Idle);
        let cancel = CancellationToken::new();

        let run = BatchRun {
            run_id,
            root: root.clone(),
            config: self.config.clone(),
            fs: Arc::clone(&self.fs),
            prober: Arc::clone(&self.prober),
            relocator: Arc::clone(&self.relocator),
            events: events_tx,
            state: state_tx,
            cancel: cancel.clone(),
            _lease: lease,
        };

        info!(run_id = %run_id, root = %root.display(), "starting run");
        let task = tokio::spawn(run.execute());

        Ok(RunHandle {
            run_id,
            root,
            cancel,
            events: events_rx,
            state: state_rx,
            task,
        })
    }

    async fn validate_root(&self, root: &Path) -> Result<PathBuf> {
        let invalid = |reason: String| SortError::InvalidRoot {
            path: root.to_path_buf(),
            reason,
        };

        let canonical = self.fs.canonicalize(root).await.map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => invalid("does not exist".to_string()),
            _ => invalid(err.to_string()),
        })?;
        let meta = self
            .fs
            .metadata(&canonical)
            .await
            .map_err(|err| invalid(err.to_string()))?;
        if !meta.is_dir {
            return Err(invalid("not a directory".to_string()));
        }
        Ok(canonical)
    }
}

/// Reservation of a root folder for one run. Released on drop.
#[derive(Debug)]
struct RootLease {
    roots: Arc<DashMap<PathBuf, Uuid>>,
    root: PathBuf,
}

impl RootLease {
    fn acquire(roots: &Arc<DashMap<PathBuf, Uuid>>, root: PathBuf, run_id: Uuid) -> Result<Self> {
        match roots.entry(root.clone()) {
            Entry::Occupied(existing) => {
                warn!(root = %root.display(), active_run = %existing.get(), "rejecting overlapping run");
                Err(SortError::RunInProgress(root))
            }
            Entry::Vacant(slot) => {
                slot.insert(run_id);
                Ok(Self {
                    roots: Arc::clone(roots),
                    root,
                })
            }
        }
    }
}

impl Drop for RootLease {
    fn drop(&mut self) {
        self.roots.remove(&self.root);
    }
}

/// Requests cancellation of a run from anywhere (signal handlers, UI
/// callbacks) without holding the [`RunHandle`].
#[derive(Debug, Clone)]
pub struct Canceller(CancellationToken);

impl Canceller {
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Handle to a run started with [`Orchestrator::start_run`].
///
/// Dropping the handle does not stop the run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    root: PathBuf,
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<ProgressEvent>,
    state: watch::Receiver<RunState>,
    task: JoinHandle<BatchResult>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Canonical root folder of the run.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop the run between files. Files already in flight finish probing
    /// but are neither moved nor recorded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn canceller(&self) -> Canceller {
        Canceller(self.cancel.clone())
    }

    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    /// Next progress event, or `None` once the run has ended and every event
    /// was delivered.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Wait for the run to end. The root is free for a new run once this
    /// returns.
    pub async fn wait(self) -> Result<BatchResult> {
        self.task
            .await
            .map_err(|err| SortError::Internal(format!("run task failed: {err}")))
    }
}

struct BatchRun {
    run_id: Uuid,
    root: PathBuf,
    config: SorterConfig,
    fs: Arc<dyn FileSystem>,
    prober: Arc<dyn Prober>,
    relocator: Arc<Relocator>,
    events: mpsc::UnboundedSender<ProgressEvent>,
    state: watch::Sender<RunState>,
    cancel: CancellationToken,
    _lease: RootLease,
}

impl BatchRun {
    async fn execute(self) -> BatchResult {
        let span = info_span!("run", run_id = %self.run_id, root = %self.root.display());
        self.drive().instrument(span).await
    }

    async fn drive(&self) -> BatchResult {
        let mut builder = BatchResultBuilder::new(self.run_id, &self.root);

        self.state.send_replace(RunState::Scanning);
        let discoverer = Discoverer::new(Arc::clone(&self.fs), &self.config.video_extensions)
            .include_tier_folders(self.config.rescan_tier_folders);
        let (files, warnings) = match discoverer.discover(&self.root).await {
            Ok(discovery) => discovery.collect_all().await,
            Err(err) => {
                error!(error = %err, "scan failed");
                return self.finish(builder, RunState::Aborted(AbortReason::ScanFailed(err.to_string())));
            }
        };

        let total = files.len();
        let warning_count = warnings.len();
        builder.set_scan(total, warnings);
        info!(total, warnings = warning_count, "scan complete");
        self.emit(ProgressEvent::Scanned {
            total,
            warnings: warning_count,
        });

        if total == 0 {
            self.emit(ProgressEvent::NoFilesFound);
            return self.finish(builder, RunState::Completed);
        }
        if self.cancel.is_cancelled() {
            return self.finish(builder, RunState::Aborted(AbortReason::Cancelled));
        }
        if let Err(err) = self.prober.preflight().await {
            error!(error = %err, "probe tool unavailable; no files will be probed");
            return self.finish(
                builder,
                RunState::Aborted(AbortReason::ToolUnavailable(err.to_string())),
            );
        }

        self.state.send_replace(RunState::Processing);
        let internal = self.process(files, &mut builder).await;

        let status = match internal {
            Some(reason) => RunState::Aborted(AbortReason::Internal(reason)),
            None if self.cancel.is_cancelled() && builder.processed() < total => {
                RunState::Aborted(AbortReason::Cancelled)
            }
            None => RunState::Completed,
        };
        self.finish(builder, status)
    }

    /// Run the worker pool to completion. Returns a description of the first
    /// worker panic, if any.
    async fn process(&self, files: Vec<VideoFile>, builder: &mut BatchResultBuilder) -> Option<String> {
        let total = files.len();
        let worker_count = self.config.worker_count().min(total);
        let (reports_tx, mut reports_rx) = mpsc::unbounded_channel();

        let ctx = Arc::new(WorkerContext {
            root: self.root.clone(),
            prober: Arc::clone(&self.prober),
            relocator: Arc::clone(&self.relocator),
            cancel: self.cancel.clone(),
            queue: Mutex::new(VecDeque::from(files)),
            reports: reports_tx,
        });

        debug!(workers = worker_count, "spawning workers");
        let mut workers = JoinSet::new();
        for worker in 0..worker_count {
            workers.spawn(worker_loop(Arc::clone(&ctx), worker).in_current_span());
        }
        // Workers hold the only senders now; the channel closes when they exit.
        drop(ctx);

        while let Some(report) = reports_rx.recv().await {
            let completed = builder.record(report.clone());
            self.emit(ProgressEvent::FileCompleted {
                completed,
                total,
                report,
            });
        }

        let mut internal = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "worker task failed");
                internal.get_or_insert_with(|| err.to_string());
            }
        }
        internal
    }

    fn emit(&self, event: ProgressEvent) {
        // The consumer may have dropped the handle; the run carries on.
        let _ = self.events.send(event);
    }

    fn finish(&self, builder: BatchResultBuilder, status: RunState) -> BatchResult {
        self.state.send_replace(status.clone());
        let result = builder.finish(status);
        info!(
            target: "vidtier::summary",
            status = ?result.status,
            total = result.total,
            moved = result.moved,
            already_sorted = result.already_sorted,
            skipped = result.skipped,
            failed = result.failed,
            "run finished"
        );
        result
    }
}

struct WorkerContext {
    root: PathBuf,
    prober: Arc<dyn Prober>,
    relocator: Arc<Relocator>,
    cancel: CancellationToken,
    queue: Mutex<VecDeque<VideoFile>>,
    reports: mpsc::UnboundedSender<FileReport>,
}

impl WorkerContext {
    fn next_file(&self) -> Option<VideoFile> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    /// Probe, classify and relocate one file. `None` when cancellation was
    /// observed after probing; the file is then left untouched and unrecorded.
    async fn process(&self, file: VideoFile) -> Option<FileReport> {
        let probed = self.prober.probe(&file.path).await;
        if self.cancel.is_cancelled() {
            debug!(path = %file.path.display(), "cancelled after probe; leaving file in place");
            return None;
        }

        let height = match probed {
            Ok(height) => Some(height),
            Err(SortError::NoVideoStream(_)) => None,
            Err(err) => {
                warn!(path = %file.path.display(), error = %err, "probe failed");
                return Some(failed(file.path, None, &err));
            }
        };

        let Some(tier) = classify(height) else {
            debug!(path = %file.path.display(), "no video stream; skipping");
            return Some(FileReport {
                path: file.path,
                height,
                outcome: FileOutcome::Skipped {
                    reason: "no video stream".to_string(),
                },
            });
        };

        let dest_dir = tier_dir(&self.root, tier);
        let outcome = match self.relocator.relocate(&file.path, &dest_dir).await {
            Ok(Relocation::Moved {
                destination,
                method,
            }) => {
                debug!(
                    path = %file.path.display(),
                    tier = %tier,
                    destination = %destination.display(),
                    "moved"
                );
                FileOutcome::Moved {
                    tier,
                    destination,
                    method,
                }
            }
            Ok(Relocation::AlreadyInPlace { .. }) => FileOutcome::AlreadySorted { tier },
            Err(err) => {
                warn!(path = %file.path.display(), tier = %tier, error = %err, "move failed");
                return Some(failed(file.path, height, &err));
            }
        };

        Some(FileReport {
            path: file.path,
            height,
            outcome,
        })
    }
}

fn failed(path: PathBuf, height: Option<u32>, err: &SortError) -> FileReport {
    FileReport {
        path,
        height,
        outcome: FileOutcome::Failed {
            kind: err.kind(),
            message: err.to_string(),
        },
    }
}

async fn worker_loop(ctx: Arc<WorkerContext>, worker: usize) {
    loop {
        if ctx.cancel.is_cancelled() {
            debug!(worker, "cancellation observed; stopping");
            break;
        }
        let Some(file) = ctx.next_file() else {
            break;
        };
        let Some(report) = ctx.process(file).await else {
            break;
        };
        if ctx.reports.send(report).is_err() {
            break;
        }
    }
}
