//! Session orchestration for a single photogrammetry job: submission,
//! ordered event consumption, progress tracking, and terminal outcome
//! classification against any [`PhotogrammetryEngine`].

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use engine::{EngineError, EngineJob, OutputEvent, PhotogrammetryEngine, RequestResult};
use shared::domain::{Configuration, Detail, JobId, RequestId, RequestSpec};

/// Fixed extension of the produced model artifact.
pub const MODEL_FILE_EXTENSION: &str = "usdz";
/// Sibling directory derived output paths are placed under.
pub const OUTPUT_DIR_NAME: &str = "outputs";

/// Idle sleep used when no watchdog is configured; long enough to never fire.
const NO_WATCHDOG: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Submitted,
    Ingesting,
    Processing,
    Succeeded,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Cancelled | Self::Failed)
    }
}

/// One reconstruction run from input images to a terminal outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub configuration: Configuration,
    pub state: JobState,
    pub progress: f64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("input path '{0}' does not exist")]
    InputMissing(PathBuf),
    #[error("input path '{0}' is not a directory")]
    NotADirectory(PathBuf),
    #[error("input directory '{path}' is not readable: {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("input directory '{0}' contains no entries")]
    EmptyInput(PathBuf),
    #[error("failed to prepare output directory '{path}': {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("a job is already in flight")]
    JobInFlight,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A per-request failure recorded during a run. Non-fatal at the job level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestFailure {
    pub request_id: RequestId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TerminalOutcome {
    Succeeded {
        output_path: PathBuf,
        request_errors: Vec<RequestFailure>,
    },
    Cancelled {
        request_errors: Vec<RequestFailure>,
    },
    Failed {
        reason: String,
        request_errors: Vec<RequestFailure>,
    },
}

impl TerminalOutcome {
    pub fn state(&self) -> JobState {
        match self {
            Self::Succeeded { .. } => JobState::Succeeded,
            Self::Cancelled { .. } => JobState::Cancelled,
            Self::Failed { .. } => JobState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JobControllerOptions {
    /// Inactivity watchdog: when no event arrives for this long, the
    /// controller fires the cancel path once. The terminal outcome still
    /// comes from the stream.
    pub watchdog: Option<Duration>,
}

/// Derives the target artifact path from the input directory name:
/// `<parent>/outputs/<dirname>.usdz`.
pub fn derive_output_path(input_dir: &Path) -> PathBuf {
    let mut file_name = input_dir
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("model"));
    file_name.push(".");
    file_name.push(MODEL_FILE_EXTENSION);
    input_dir
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(OUTPUT_DIR_NAME)
        .join(file_name)
}

/// Owns the engine seam and enforces the single-active-job invariant.
pub struct JobController {
    engine: Arc<dyn PhotogrammetryEngine>,
    options: JobControllerOptions,
    busy: Arc<AtomicBool>,
}

impl JobController {
    pub fn new(engine: Arc<dyn PhotogrammetryEngine>) -> Self {
        Self::with_options(engine, JobControllerOptions::default())
    }

    pub fn with_options(engine: Arc<dyn PhotogrammetryEngine>, options: JobControllerOptions) -> Self {
        Self {
            engine,
            options,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Validates inputs, creates the engine job and submits exactly one
    /// request. On any failure the job never starts and no resources are
    /// held. A second submission while a handle is live is rejected.
    pub async fn submit(
        &self,
        input_dir: impl AsRef<Path>,
        output_path: Option<PathBuf>,
        configuration: Configuration,
        detail: Detail,
    ) -> Result<JobHandle, SubmitError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SubmitError::JobInFlight);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        let input_dir = input_dir.as_ref();
        validate_input_dir(input_dir)?;

        let output_path = output_path.unwrap_or_else(|| derive_output_path(input_dir));
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SubmitError::OutputDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let job_id = JobId::new();
        info!(job = %job_id, input = %input_dir.display(), ?configuration, "creating engine job");
        let mut engine_job = self.engine.create_job(input_dir, &configuration).await?;

        let request = RequestSpec {
            output_path: output_path.clone(),
            detail,
        };
        info!(job = %job_id, output = %output_path.display(), ?detail, "submitting request");
        engine_job.submit(vec![request]).await?;

        let (progress_tx, _) = watch::channel(0.0);
        let cancel_tx = Arc::new(watch::channel(false).0);
        let cancel_rx = cancel_tx.subscribe();
        Ok(JobHandle {
            job: Job {
                id: job_id,
                input_path: input_dir.to_path_buf(),
                output_path,
                configuration,
                state: JobState::Submitted,
                progress: 0.0,
                last_error: None,
                created_at: Utc::now(),
                completed_at: None,
            },
            engine_job,
            progress_tx,
            cancel_tx,
            cancel_rx,
            watchdog: self.options.watchdog,
            request_errors: Vec::new(),
            completed_requests: Vec::new(),
            _guard: guard,
        })
    }
}

fn validate_input_dir(input_dir: &Path) -> Result<(), SubmitError> {
    if !input_dir.exists() {
        return Err(SubmitError::InputMissing(input_dir.to_path_buf()));
    }
    if !input_dir.is_dir() {
        return Err(SubmitError::NotADirectory(input_dir.to_path_buf()));
    }
    let mut entries =
        std::fs::read_dir(input_dir).map_err(|source| SubmitError::InputUnreadable {
            path: input_dir.to_path_buf(),
            source,
        })?;
    if entries.next().is_none() {
        return Err(SubmitError::EmptyInput(input_dir.to_path_buf()));
    }
    Ok(())
}

/// Releases the controller's single-job slot when the handle goes away.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Cooperative cancellation trigger for a running job. Cloneable; safe to
/// fire from any thread, before or during `run`.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// A submitted job bound to its engine event stream. Consumed by `run`.
pub struct JobHandle {
    job: Job,
    engine_job: Box<dyn EngineJob>,
    progress_tx: watch::Sender<f64>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    watchdog: Option<Duration>,
    request_errors: Vec<RequestFailure>,
    completed_requests: Vec<(RequestId, RequestResult)>,
    _guard: BusyGuard,
}

impl JobHandle {
    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn id(&self) -> JobId {
        self.job.id
    }

    pub fn output_path(&self) -> &Path {
        &self.job.output_path
    }

    /// Observable progress in [0, 1], non-decreasing across the run. The
    /// sender side drops when the run reaches a terminal state.
    pub fn progress(&self) -> watch::Receiver<f64> {
        self.progress_tx.subscribe()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Drives the job to completion by consuming the engine's event stream
    /// in delivery order. Suspends between events; never busy-waits.
    pub async fn run(mut self) -> TerminalOutcome {
        let Some(mut events) = self.engine_job.take_events() else {
            let outcome = TerminalOutcome::Failed {
                reason: "engine job produced no event stream".to_string(),
                request_errors: std::mem::take(&mut self.request_errors),
            };
            return self.finish(outcome);
        };

        self.transition(JobState::Ingesting);
        let mut cancel_rx = self.cancel_rx.clone();
        let mut cancel_requested = *cancel_rx.borrow_and_update();
        if cancel_requested {
            info!(job = %self.job.id, "cancellation requested before run; forwarding to engine");
            self.engine_job.cancel().await;
        }
        let idle_limit = self.watchdog.unwrap_or(NO_WATCHDOG);

        loop {
            let item = tokio::select! {
                item = events.next() => item,
                changed = cancel_rx.changed(), if !cancel_requested => {
                    if changed.is_ok() && *cancel_rx.borrow_and_update() {
                        cancel_requested = true;
                        info!(job = %self.job.id, "cancellation requested; forwarding to engine");
                        self.engine_job.cancel().await;
                    }
                    continue;
                }
                _ = tokio::time::sleep(idle_limit), if !cancel_requested => {
                    cancel_requested = true;
                    warn!(job = %self.job.id, timeout = ?idle_limit, "watchdog expired without engine activity; requesting cancel");
                    self.engine_job.cancel().await;
                    continue;
                }
            };

            match item {
                Some(Ok(event)) => {
                    if let Some(outcome) = self.apply_event(event) {
                        return self.finish(outcome);
                    }
                }
                Some(Err(fault)) => {
                    error!(job = %self.job.id, %fault, "engine stream fault");
                    let outcome = TerminalOutcome::Failed {
                        reason: fault.to_string(),
                        request_errors: std::mem::take(&mut self.request_errors),
                    };
                    return self.finish(outcome);
                }
                None => {
                    error!(job = %self.job.id, "event stream ended without a terminal event");
                    let outcome = TerminalOutcome::Failed {
                        reason: "event stream ended without a terminal event".to_string(),
                        request_errors: std::mem::take(&mut self.request_errors),
                    };
                    return self.finish(outcome);
                }
            }
        }
    }

    /// Applies one engine event. Returns the terminal outcome once the
    /// stream delivered a terminal event; all other kinds continue the run.
    fn apply_event(&mut self, event: OutputEvent) -> Option<TerminalOutcome> {
        match event {
            OutputEvent::InputIngestionComplete => {
                info!(job = %self.job.id, "input ingestion complete; processing begins");
                self.transition(JobState::Processing);
                None
            }
            OutputEvent::RequestProgress {
                request_id,
                fraction,
            } => {
                let fraction = fraction.clamp(0.0, 1.0).max(self.job.progress);
                self.job.progress = fraction;
                self.progress_tx.send_replace(fraction);
                info!(job = %self.job.id, request = ?request_id, fraction, "request progress");
                None
            }
            OutputEvent::RequestComplete { request_id, result } => {
                match &result {
                    RequestResult::ModelFile { path } => {
                        info!(job = %self.job.id, request = ?request_id, model = %path.display(), "request complete");
                    }
                    RequestResult::Other { description } => {
                        warn!(job = %self.job.id, request = ?request_id, description, "request complete with unexpected result");
                    }
                }
                self.completed_requests.push((request_id, result));
                None
            }
            OutputEvent::RequestError {
                request_id,
                message,
            } => {
                error!(job = %self.job.id, request = ?request_id, message, "request error");
                self.job.last_error = Some(message.clone());
                self.request_errors.push(RequestFailure {
                    request_id,
                    message,
                });
                None
            }
            OutputEvent::InvalidSample { sample_id, reason } => {
                warn!(job = %self.job.id, sample = ?sample_id, reason, "invalid sample");
                None
            }
            OutputEvent::SkippedSample { sample_id } => {
                warn!(job = %self.job.id, sample = ?sample_id, "sample skipped by processing");
                None
            }
            OutputEvent::AutomaticDownsampling => {
                warn!(job = %self.job.id, "automatic downsampling was applied");
                None
            }
            OutputEvent::ProcessingComplete => {
                info!(job = %self.job.id, "processing complete");
                Some(TerminalOutcome::Succeeded {
                    output_path: self.reported_model_path(),
                    request_errors: std::mem::take(&mut self.request_errors),
                })
            }
            OutputEvent::ProcessingCancelled => {
                warn!(job = %self.job.id, "processing was cancelled");
                Some(TerminalOutcome::Cancelled {
                    request_errors: std::mem::take(&mut self.request_errors),
                })
            }
            OutputEvent::Unknown { kind } => {
                error!(job = %self.job.id, kind, "unhandled engine event kind");
                None
            }
        }
    }

    /// Prefers the model file location the engine reported over the
    /// requested target path.
    fn reported_model_path(&self) -> PathBuf {
        self.completed_requests
            .iter()
            .rev()
            .find_map(|(_, result)| match result {
                RequestResult::ModelFile { path } => Some(path.clone()),
                RequestResult::Other { .. } => None,
            })
            .unwrap_or_else(|| self.job.output_path.clone())
    }

    fn finish(mut self, outcome: TerminalOutcome) -> TerminalOutcome {
        self.transition(outcome.state());
        if let TerminalOutcome::Failed { reason, .. } = &outcome {
            self.job.last_error = Some(reason.clone());
        }
        outcome
    }

    fn transition(&mut self, next: JobState) {
        if self.job.state == next || self.job.state.is_terminal() {
            return;
        }
        info!(job = %self.job.id, from = ?self.job.state, to = ?next, "job state changed");
        self.job.state = next;
        if next.is_terminal() {
            self.job.completed_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
