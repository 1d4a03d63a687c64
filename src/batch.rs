use crate::cancel::CancelToken;
use crate::codec::{Compressor, LocalCodecs};
use crate::constants::{DEFAULT_TIMEOUT_SECS, ERROR_PREFIX, SCRATCH_DIR_PREFIX, SUCCESS_PREFIX};
use crate::discover::collect_image_files;
use crate::error::{Result, SqueezeError};
use crate::gifsicle::GifsicleOptimizer;
use crate::processing::{CompressionParams, ImageTask, Outcome, OutcomeStatus, OutputMode};
use crate::remote::{RemoteCompressor, RemoteSettings};
use crate::router::{BackendKind, Codec, Route, Router};
use crate::staging::StagedWriter;
use crate::utils::{calculate_compression_ratio, create_progress_bar, describe_size_change, format_file_size};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Everything a batch needs besides the directory to scan.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub params: CompressionParams,
    pub output_mode: OutputMode,
    /// Upper bound on concurrent tasks.
    pub jobs: usize,
    /// Per backend call; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Staging location; a private temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Enables the remote backend for jpg/jpeg/png/webp.
    pub remote: Option<RemoteSettings>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            params: CompressionParams::default(),
            output_mode: OutputMode::Replace,
            jobs: num_cpus::get(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            scratch_dir: None,
            remote: None,
        }
    }
}

/// The compressor instances a batch can dispatch to.
#[derive(Clone)]
pub struct Backends {
    local: Arc<dyn Compressor>,
    gif_optimizer: Option<Arc<dyn Compressor>>,
    remote: Option<Arc<dyn Compressor>>,
}

impl Backends {
    pub fn new(local: Arc<dyn Compressor>) -> Self {
        Self {
            local,
            gif_optimizer: None,
            remote: None,
        }
    }

    pub fn with_gif_optimizer(mut self, optimizer: Arc<dyn Compressor>) -> Self {
        self.gif_optimizer = Some(optimizer);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn Compressor>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<&Arc<dyn Compressor>> {
        match kind {
            BackendKind::Local => Some(&self.local),
            BackendKind::GifOptimizer => self.gif_optimizer.as_ref(),
            BackendKind::Remote => self.remote.as_ref(),
        }
    }
}

/// Per-file outcomes of one batch, in discovery order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<Outcome>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Bytes before compression, over successful files only.
    pub fn total_original_size(&self) -> u64 {
        self.sizes().map(|(before, _)| before).sum()
    }

    pub fn total_compressed_size(&self) -> u64 {
        self.sizes().map(|(_, after)| after).sum()
    }

    fn sizes(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.outcomes.iter().filter_map(|o| match o.status {
            OutcomeStatus::Success {
                original_size,
                compressed_size,
                ..
            } => Some((original_size, compressed_size)),
            OutcomeStatus::Failure { .. } => None,
        })
    }

    pub fn print_summary(&self) {
        for outcome in &self.outcomes {
            let name = display_name(&outcome.path);
            match &outcome.status {
                OutcomeStatus::Success {
                    original_size,
                    compressed_size,
                    backend,
                    ..
                } => {
                    crate::info!(
                        "{} {}  {} [{}]",
                        SUCCESS_PREFIX,
                        name,
                        describe_size_change(*original_size, *compressed_size),
                        backend
                    );
                }
                OutcomeStatus::Failure { reason } => {
                    crate::error!("{}: {}", name, reason);
                }
            }
        }

        let total_before = self.total_original_size();
        let total_after = self.total_compressed_size();

        crate::info!("\n📊 Batch Compression Summary:");
        crate::info!("  📁 Total files: {}", self.outcomes.len());
        crate::info!("  {} Compressed: {}", SUCCESS_PREFIX, self.succeeded());
        crate::info!(
            "  📊 Total original size: {} ({} bytes)",
            format_file_size(total_before),
            total_before
        );
        crate::info!(
            "  📊 Total compressed size: {} ({} bytes)",
            format_file_size(total_after),
            total_after
        );
        crate::info!(
            "  🎯 Overall compression ratio: {:.1}%",
            calculate_compression_ratio(total_before, total_after)
        );
        crate::info!("  ⏱️  Total time: {:?}", self.elapsed);

        if self.failed() > 0 {
            crate::info!("  {} Failed files: {}", ERROR_PREFIX, self.failed());
        }
        if self.cancelled {
            crate::warn!("Batch cancelled; unstarted files were left untouched");
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Runs every image in a directory through route, compress, stage, commit.
pub struct BatchCompressor {
    options: BatchOptions,
    router: Router,
    backends: Backends,
    writer: StagedWriter,
    cancel: CancelToken,
    // Removed with the compressor; keeps the private scratch dir alive.
    _scratch: Option<TempDir>,
}

impl BatchCompressor {
    /// Builds the backends named by `options`.
    ///
    /// Fails with [`SqueezeError::MissingApiKey`] when the remote backend is
    /// requested without a credential, before any file is looked at.
    pub fn new(options: BatchOptions, cancel: CancelToken) -> Result<Self> {
        let mut backends = Backends::new(Arc::new(LocalCodecs));

        if let Some(settings) = &options.remote {
            let remote = RemoteCompressor::new(settings)?;
            crate::verbose!("Remote compression enabled via {}", settings.endpoint);
            backends = backends.with_remote(Arc::new(remote));
        }

        if options.params.lossy_level > 0 {
            match GifsicleOptimizer::locate(options.timeout) {
                Ok(optimizer) => {
                    crate::verbose!("Using {} for lossy GIFs", optimizer.binary().display());
                    backends = backends.with_gif_optimizer(Arc::new(optimizer));
                }
                Err(err) => {
                    tracing::debug!(error = %err, "gif optimizer unavailable");
                    crate::warn!("gifsicle not found; GIFs fall back to palette quantization");
                }
            }
        }

        Self::with_backends(options, backends, cancel)
    }

    /// Like [`BatchCompressor::new`] with caller-supplied backends. The
    /// remote step is routed to only when `backends` carries one.
    pub fn with_backends(options: BatchOptions, backends: Backends, cancel: CancelToken) -> Result<Self> {
        let router = Router::new(options.params, backends.get(BackendKind::Remote).is_some());

        let (scratch, scratch_path) = match &options.scratch_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .map_err(|_| SqueezeError::DirectoryCreationFailed(dir.clone()))?;
                (None, dir.clone())
            }
            None => {
                let dir = tempfile::Builder::new().prefix(SCRATCH_DIR_PREFIX).tempdir()?;
                let path = dir.path().to_path_buf();
                (Some(dir), path)
            }
        };
        tracing::debug!(scratch = %scratch_path.display(), "staging directory ready");

        Ok(Self {
            options,
            router,
            backends,
            writer: StagedWriter::new(scratch_path),
            cancel,
            _scratch: scratch,
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        self.writer.scratch_dir()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Compresses every image directly inside `dir`.
    ///
    /// Per-file problems become Failure outcomes; only discovery and setup
    /// errors are returned.
    pub fn run(&self, dir: &Path) -> Result<BatchReport> {
        let start_time = Instant::now();

        let image_files = collect_image_files(dir)?;
        let total_files = image_files.len();

        if total_files == 0 {
            crate::info!("No images found in {}", dir.display());
            return Ok(BatchReport {
                outcomes: Vec::new(),
                elapsed: start_time.elapsed(),
                cancelled: self.cancel.is_cancelled(),
            });
        }

        crate::info!("🚀 Compressing {} images in {}", total_files, dir.display());

        let workers = self.options.jobs.max(1).min(total_files);
        crate::verbose!("⚙️  Using {} parallel workers", workers);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("squeeze-worker-{}", i))
            .build()
            .map_err(|e| SqueezeError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;

        let tasks: Vec<ImageTask> = image_files
            .into_iter()
            .map(|path| ImageTask::new(path, self.options.output_mode.clone()))
            .collect();

        let progress = create_progress_bar(total_files as u64);

        // `collect` joins every task and keeps discovery order.
        let outcomes: Vec<Outcome> = pool.install(|| {
            tasks
                .par_iter()
                .map(|task| {
                    progress.set_message(display_name(&task.source_path));
                    let outcome = self.process_task(task, &progress);
                    progress.inc(1);
                    outcome
                })
                .collect()
        });

        progress.finish_and_clear();

        Ok(BatchReport {
            outcomes,
            elapsed: start_time.elapsed(),
            cancelled: self.cancel.is_cancelled(),
        })
    }

    fn process_task(&self, task: &ImageTask, progress: &ProgressBar) -> Outcome {
        if self.cancel.is_cancelled() {
            return Outcome::failure(&task.source_path, &SqueezeError::Cancelled);
        }

        let route = match self.router.select(&task.extension) {
            Ok(route) => route,
            Err(err) => return Outcome::failure(&task.source_path, &err),
        };
        tracing::debug!(path = %task.source_path.display(), ?route, "route selected");

        self.writer.run_cancellable(task, &self.cancel, |source| {
            self.compress_with_route(source, &route, progress)
        })
    }

    /// Tries each step in order; unavailable backends are skipped.
    fn compress_with_route(
        &self,
        source: &Path,
        route: &Route,
        progress: &ProgressBar,
    ) -> Result<(Vec<u8>, &'static str)> {
        let mut last_error = None;

        for (index, step) in route.steps.iter().enumerate() {
            let Some(backend) = self.backends.get(step.backend) else {
                tracing::debug!(backend = %step.backend, "backend unavailable, skipping step");
                continue;
            };

            match run_guarded(Arc::clone(backend), source, step.codec, self.options.timeout) {
                Ok(bytes) => return Ok((bytes, backend.name())),
                Err(err) => {
                    if index + 1 < route.steps.len() {
                        tracing::warn!(path = %source.display(), backend = %step.backend, error = %err, "falling back");
                        progress.suspend(|| {
                            crate::warn!(
                                "{}: {} failed ({}), trying next backend",
                                display_name(source),
                                backend.name(),
                                err
                            );
                        });
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SqueezeError::NoBackendAvailable(route.kind.to_string())))
    }
}

/// Calls `backend` with panics caught and, when `timeout` is set, on a
/// watchdog thread. A timed-out call is abandoned; its result is dropped.
fn run_guarded(
    backend: Arc<dyn Compressor>,
    source: &Path,
    codec: Codec,
    timeout: Option<Duration>,
) -> Result<Vec<u8>> {
    let Some(timeout) = timeout else {
        return panic::catch_unwind(AssertUnwindSafe(|| backend.compress(source, &codec)))
            .unwrap_or(Err(SqueezeError::CodecPanicked));
    };

    let (tx, rx) = mpsc::channel();
    let source = source.to_path_buf();
    thread::Builder::new()
        .name(format!("squeeze-{}", backend.name()))
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| backend.compress(&source, &codec)))
                .unwrap_or(Err(SqueezeError::CodecPanicked));
            // The receiver is gone once the deadline has passed.
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(SqueezeError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(SqueezeError::CodecPanicked),
    }
}
