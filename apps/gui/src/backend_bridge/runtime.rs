//! Backend worker: a dedicated thread owning a tokio runtime that drives
//! jobs to completion while the UI thread stays responsive.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender};

use engine::simulated::{SimulatedEngine, SimulatedEngineOptions};
use session_core::{CancelHandle, JobController};

use crate::backend_bridge::commands::BackendCommand;
use crate::config::Settings;
use crate::controller::events::UiEvent;

pub fn launch(settings: Settings, cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(format!(
                    "backend worker startup failure: failed to build runtime: {err}"
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let engine = Arc::new(SimulatedEngine::new(SimulatedEngineOptions {
                step_delay: Duration::from_millis(settings.simulated_step_millis),
                ..SimulatedEngineOptions::default()
            }));
            let controller = Arc::new(JobController::new(engine));
            let _ = ui_tx.try_send(UiEvent::Info("Backend worker ready".to_string()));

            let mut active: Option<(CancelHandle, Arc<AtomicBool>)> = None;
            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    BackendCommand::StartJob { input_dir } => {
                        let handle = match controller
                            .submit(
                                &input_dir,
                                None,
                                settings.configuration(),
                                settings.detail,
                            )
                            .await
                        {
                            Ok(handle) => handle,
                            Err(err) => {
                                let _ = ui_tx.try_send(UiEvent::JobRejected(err.to_string()));
                                continue;
                            }
                        };

                        let folder = input_dir
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_else(|| input_dir.display().to_string());
                        let _ = ui_tx.try_send(UiEvent::JobStarted {
                            folder,
                            output: handle.output_path().to_path_buf(),
                        });
                        let running = Arc::new(AtomicBool::new(true));
                        active = Some((handle.cancel_handle(), Arc::clone(&running)));

                        let mut progress_rx = handle.progress();
                        let progress_tx = ui_tx.clone();
                        tokio::spawn(async move {
                            while progress_rx.changed().await.is_ok() {
                                let fraction = *progress_rx.borrow();
                                let _ = progress_tx.try_send(UiEvent::Progress(fraction));
                            }
                        });

                        let finished_tx = ui_tx.clone();
                        tokio::spawn(async move {
                            let outcome = handle.run().await;
                            running.store(false, Ordering::Release);
                            // Routine events may drop when the UI lags; the
                            // terminal outcome must always reach the window.
                            let _ = finished_tx.send(UiEvent::Finished(outcome));
                        });
                    }
                    BackendCommand::CancelJob => match &active {
                        Some((cancel, running)) if running.load(Ordering::Acquire) => {
                            cancel.cancel();
                        }
                        _ => {
                            active = None;
                            let _ = ui_tx
                                .try_send(UiEvent::Info("No job to cancel".to_string()));
                        }
                    },
                }
            }
        });
    });
}
