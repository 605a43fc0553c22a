use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;

use engine::simulated::{SimulatedEngine, SimulatedEngineOptions};
use session_core::{JobController, JobControllerOptions, TerminalOutcome};
use shared::domain::{Configuration, Detail, FeatureSensitivity, SampleOrdering};

#[derive(Parser, Debug)]
#[command(
    name = "reconstruct",
    about = "Drive one photogrammetry job from a folder of images to a 3D model artifact"
)]
struct Args {
    /// Directory of source images.
    input_dir: PathBuf,
    /// Target artifact path; derived from the input directory name when omitted.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Mesh/texture fidelity: preview, reduced, medium, full, raw.
    #[arg(long, default_value = "full")]
    detail: Detail,
    /// Reconstruction robustness: normal, high.
    #[arg(long, default_value = "high")]
    feature_sensitivity: FeatureSensitivity,
    /// Input ordering assumption: sequential, unordered.
    #[arg(long, default_value = "unordered")]
    ordering: SampleOrdering,
    /// Cancel the job when the engine stays silent for this many seconds.
    #[arg(long)]
    watchdog_secs: Option<u64>,
    /// Print the terminal outcome as JSON on stdout.
    #[arg(long)]
    json: bool,
    /// Pacing of the simulated engine, in milliseconds per step.
    #[arg(long, default_value_t = 150)]
    step_millis: u64,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let engine = Arc::new(SimulatedEngine::new(SimulatedEngineOptions {
        step_delay: Duration::from_millis(args.step_millis),
        ..SimulatedEngineOptions::default()
    }));
    let controller = JobController::with_options(
        engine,
        JobControllerOptions {
            watchdog: args.watchdog_secs.map(Duration::from_secs),
        },
    );

    let configuration = Configuration {
        feature_sensitivity: args.feature_sensitivity,
        sample_ordering: args.ordering,
    };
    let handle = match controller
        .submit(&args.input_dir, args.output, configuration, args.detail)
        .await
    {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!(%err, "submission failed");
            return Ok(ExitCode::from(1));
        }
    };

    let outcome = handle.run().await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    match &outcome {
        TerminalOutcome::Succeeded { output_path, .. } => {
            tracing::info!(model = %output_path.display(), "reconstruction succeeded");
        }
        TerminalOutcome::Failed { reason, .. } => {
            tracing::error!(reason, "reconstruction failed");
        }
        TerminalOutcome::Cancelled { .. } => {
            tracing::warn!("reconstruction cancelled");
        }
    }
    Ok(ExitCode::from(exit_code(&outcome)))
}

fn exit_code(outcome: &TerminalOutcome) -> u8 {
    match outcome {
        TerminalOutcome::Succeeded { .. } => 0,
        TerminalOutcome::Failed { .. } => 1,
        TerminalOutcome::Cancelled { .. } => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_process_exit_codes() {
        assert_eq!(
            exit_code(&TerminalOutcome::Succeeded {
                output_path: PathBuf::from("/captures/outputs/statue.usdz"),
                request_errors: Vec::new(),
            }),
            0
        );
        assert_eq!(
            exit_code(&TerminalOutcome::Failed {
                reason: "engine fault".to_string(),
                request_errors: Vec::new(),
            }),
            1
        );
        assert_eq!(
            exit_code(&TerminalOutcome::Cancelled {
                request_errors: Vec::new(),
            }),
            2
        );
    }
}
