use std::{
    path::{Path, PathBuf},
    pin::Pin,
};

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use shared::domain::{Configuration, RequestId, RequestSpec, SampleId};

pub mod simulated;

/// One item of the asynchronous output stream an engine emits while a job
/// runs. Events are consumed once and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// All inputs have been read; processing begins.
    InputIngestionComplete,
    /// Monotonic progress update for a single request, fraction in [0, 1].
    RequestProgress { request_id: RequestId, fraction: f64 },
    /// A request finished; the result holds the output location or a
    /// description of whatever else the engine produced.
    RequestComplete {
        request_id: RequestId,
        result: RequestResult,
    },
    /// A specific request failed. Non-fatal at the job level.
    RequestError {
        request_id: RequestId,
        message: String,
    },
    /// An input sample was unusable.
    InvalidSample { sample_id: SampleId, reason: String },
    /// An input sample was excluded from processing.
    SkippedSample { sample_id: SampleId },
    /// The engine reduced input resolution due to resource limits.
    AutomaticDownsampling,
    /// Terminal: the entire job succeeded.
    ProcessingComplete,
    /// Terminal: the job was cancelled, externally or by the engine.
    ProcessingCancelled,
    /// Forward-compatibility case for event kinds this build does not know.
    Unknown { kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestResult {
    ModelFile { path: PathBuf },
    Other { description: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine failed to construct job: {0}")]
    Construction(String),
    #[error("engine rejected request submission: {0}")]
    Submission(String),
    #[error("engine fault: {0}")]
    Fault(String),
}

/// Ordered, single-consumer event sequence for one job. An `Err` item is an
/// engine-level fatal fault; the stream closes after it.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<OutputEvent, EngineError>> + Send + Sync>>;

/// Capability contract for an opaque photogrammetry service that turns a
/// directory of images into a 3D model artifact.
#[async_trait]
pub trait PhotogrammetryEngine: Send + Sync {
    async fn create_job(
        &self,
        input_dir: &Path,
        configuration: &Configuration,
    ) -> Result<Box<dyn EngineJob>, EngineError>;
}

#[async_trait]
pub trait EngineJob: Send {
    /// Submits the desired outputs. Starts the underlying run.
    async fn submit(&mut self, requests: Vec<RequestSpec>) -> Result<(), EngineError>;

    /// Hands out the job's event stream. Single consumer: returns `None`
    /// after the first call.
    fn take_events(&mut self) -> Option<EventStream>;

    /// Best-effort cooperative stop; the terminal event still arrives
    /// through the stream.
    async fn cancel(&self);
}

/// Engine stand-in for builds where no reconstruction service is wired up.
pub struct MissingEngine;

#[async_trait]
impl PhotogrammetryEngine for MissingEngine {
    async fn create_job(
        &self,
        input_dir: &Path,
        _configuration: &Configuration,
    ) -> Result<Box<dyn EngineJob>, EngineError> {
        Err(EngineError::Construction(format!(
            "no photogrammetry engine available for input '{}'",
            input_dir.display()
        )))
    }
}
