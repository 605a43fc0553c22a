//! Scripted engine implementation. Paces a plausible reconstruction run so
//! the apps and tests can exercise the full event protocol without the
//! platform service.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use shared::domain::{Configuration, RequestId, RequestSpec, SampleId};

use crate::{EngineError, EngineJob, EventStream, OutputEvent, PhotogrammetryEngine, RequestResult};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "tif", "tiff"];

#[derive(Debug, Clone, Copy)]
pub struct SimulatedEngineOptions {
    /// Pause between emitted events.
    pub step_delay: Duration,
    /// Number of progress updates per request.
    pub progress_steps: u32,
}

impl Default for SimulatedEngineOptions {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(150),
            progress_steps: 5,
        }
    }
}

pub struct SimulatedEngine {
    options: SimulatedEngineOptions,
}

impl SimulatedEngine {
    pub fn new(options: SimulatedEngineOptions) -> Self {
        Self { options }
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new(SimulatedEngineOptions::default())
    }
}

#[async_trait]
impl PhotogrammetryEngine for SimulatedEngine {
    async fn create_job(
        &self,
        input_dir: &Path,
        configuration: &Configuration,
    ) -> Result<Box<dyn EngineJob>, EngineError> {
        if !input_dir.is_dir() {
            return Err(EngineError::Construction(format!(
                "input '{}' is not a readable directory",
                input_dir.display()
            )));
        }
        debug!(input = %input_dir.display(), ?configuration, "simulated engine created job");
        let (cancel_tx, _) = watch::channel(false);
        Ok(Box::new(SimulatedJob {
            input_dir: input_dir.to_path_buf(),
            options: self.options,
            cancel_tx,
            events: None,
            submitted: false,
        }))
    }
}

struct SimulatedJob {
    input_dir: PathBuf,
    options: SimulatedEngineOptions,
    cancel_tx: watch::Sender<bool>,
    events: Option<EventStream>,
    submitted: bool,
}

#[async_trait]
impl EngineJob for SimulatedJob {
    async fn submit(&mut self, requests: Vec<RequestSpec>) -> Result<(), EngineError> {
        if self.submitted {
            return Err(EngineError::Submission(
                "job already has a submitted request set".to_string(),
            ));
        }
        if requests.is_empty() {
            return Err(EngineError::Submission(
                "at least one request is required".to_string(),
            ));
        }
        self.submitted = true;

        let (tx, rx) = mpsc::channel(32);
        let cancel_rx = self.cancel_tx.subscribe();
        let input_dir = self.input_dir.clone();
        let options = self.options;
        tokio::spawn(async move {
            run_script(input_dir, requests, options, cancel_rx, tx).await;
        });
        self.events = Some(Box::pin(ReceiverStream::new(rx)));
        Ok(())
    }

    fn take_events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    async fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

/// Waits one pacing step. Returns true when the job should stop.
async fn paced(cancel: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    if *cancel.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = cancel.changed() => changed.is_err() || *cancel.borrow(),
    }
}

async fn run_script(
    input_dir: PathBuf,
    requests: Vec<RequestSpec>,
    options: SimulatedEngineOptions,
    mut cancel: watch::Receiver<bool>,
    tx: mpsc::Sender<Result<OutputEvent, EngineError>>,
) {
    let emit = |event| {
        let tx = tx.clone();
        async move { tx.send(Ok(event)).await.is_ok() }
    };

    // Ingestion: flag non-image entries the way a real engine reports
    // unusable samples, then announce processing.
    let mut sample_id = 0i64;
    match std::fs::read_dir(&input_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() && !has_image_extension(&path) {
                    let event = OutputEvent::InvalidSample {
                        sample_id: SampleId(sample_id),
                        reason: format!("unsupported file '{}'", path.display()),
                    };
                    if !emit(event).await {
                        return;
                    }
                }
                sample_id += 1;
            }
        }
        Err(err) => {
            let _ = tx
                .send(Err(EngineError::Fault(format!(
                    "failed to enumerate input '{}': {err}",
                    input_dir.display()
                ))))
                .await;
            return;
        }
    }

    if paced(&mut cancel, options.step_delay).await {
        let _ = emit(OutputEvent::ProcessingCancelled).await;
        return;
    }
    if !emit(OutputEvent::InputIngestionComplete).await {
        return;
    }

    for (index, request) in requests.iter().enumerate() {
        let request_id = RequestId(index as i64);
        for step in 1..=options.progress_steps {
            if paced(&mut cancel, options.step_delay).await {
                let _ = emit(OutputEvent::ProcessingCancelled).await;
                return;
            }
            let fraction = f64::from(step) / f64::from(options.progress_steps);
            if !emit(OutputEvent::RequestProgress {
                request_id,
                fraction,
            })
            .await
            {
                return;
            }
        }

        if let Err(err) = tokio::fs::write(
            &request.output_path,
            format!(
                "simulated {:?} reconstruction of {}\n",
                request.detail,
                input_dir.display()
            ),
        )
        .await
        {
            let _ = tx
                .send(Err(EngineError::Fault(format!(
                    "failed to write artifact '{}': {err}",
                    request.output_path.display()
                ))))
                .await;
            return;
        }
        if !emit(OutputEvent::RequestComplete {
            request_id,
            result: RequestResult::ModelFile {
                path: request.output_path.clone(),
            },
        })
        .await
        {
            return;
        }
    }

    let _ = emit(OutputEvent::ProcessingComplete).await;
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use futures::StreamExt;
    use shared::domain::Detail;

    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("simulated_engine_{tag}_{unique}"));
        std::fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    fn fast_options() -> SimulatedEngineOptions {
        SimulatedEngineOptions {
            step_delay: Duration::from_millis(1),
            progress_steps: 3,
        }
    }

    #[tokio::test]
    async fn scripted_run_emits_ordered_protocol_and_writes_artifact() {
        let input = scratch_dir("ok");
        std::fs::write(input.join("a.jpg"), b"x").expect("sample");
        std::fs::write(input.join("b.jpg"), b"x").expect("sample");
        let output = input.join("model.usdz");

        let engine = SimulatedEngine::new(fast_options());
        let mut job = engine
            .create_job(&input, &Configuration::default())
            .await
            .expect("job");
        job.submit(vec![RequestSpec {
            output_path: output.clone(),
            detail: Detail::Full,
        }])
        .await
        .expect("submit");

        let mut events = job.take_events().expect("stream");
        let mut collected = Vec::new();
        while let Some(item) = events.next().await {
            collected.push(item.expect("no fault"));
        }

        assert_eq!(collected.first(), Some(&OutputEvent::InputIngestionComplete));
        assert_eq!(collected.last(), Some(&OutputEvent::ProcessingComplete));
        let fractions: Vec<f64> = collected
            .iter()
            .filter_map(|event| match event {
                OutputEvent::RequestProgress { fraction, .. } => Some(*fraction),
                _ => None,
            })
            .collect();
        assert_eq!(fractions.len(), 3);
        assert!(fractions.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(output.is_file());

        let _ = std::fs::remove_dir_all(input);
    }

    #[tokio::test]
    async fn take_events_is_single_consumer() {
        let input = scratch_dir("single");
        std::fs::write(input.join("a.jpg"), b"x").expect("sample");

        let engine = SimulatedEngine::new(fast_options());
        let mut job = engine
            .create_job(&input, &Configuration::default())
            .await
            .expect("job");
        job.submit(vec![RequestSpec {
            output_path: input.join("model.usdz"),
            detail: Detail::Preview,
        }])
        .await
        .expect("submit");

        assert!(job.take_events().is_some());
        assert!(job.take_events().is_none());

        let _ = std::fs::remove_dir_all(input);
    }

    #[tokio::test]
    async fn cancel_yields_processing_cancelled_terminal() {
        let input = scratch_dir("cancel");
        std::fs::write(input.join("a.jpg"), b"x").expect("sample");

        let engine = SimulatedEngine::new(SimulatedEngineOptions {
            step_delay: Duration::from_millis(50),
            progress_steps: 50,
        });
        let mut job = engine
            .create_job(&input, &Configuration::default())
            .await
            .expect("job");
        job.submit(vec![RequestSpec {
            output_path: input.join("model.usdz"),
            detail: Detail::Full,
        }])
        .await
        .expect("submit");

        let mut events = job.take_events().expect("stream");
        job.cancel().await;

        let mut last = None;
        while let Some(item) = events.next().await {
            last = Some(item.expect("no fault"));
        }
        assert_eq!(last, Some(OutputEvent::ProcessingCancelled));

        let _ = std::fs::remove_dir_all(input);
    }

    #[tokio::test]
    async fn rejects_missing_input_directory() {
        let engine = SimulatedEngine::default();
        let missing = std::env::temp_dir().join("simulated_engine_nope_does_not_exist");
        let err = engine
            .create_job(&missing, &Configuration::default())
            .await
            .err()
            .expect("construction error");
        assert!(matches!(err, EngineError::Construction(_)));
    }
}
