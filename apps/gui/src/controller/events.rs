//! Backend -> UI events and outcome presentation.

use std::path::PathBuf;

use session_core::TerminalOutcome;

pub enum UiEvent {
    Info(String),
    JobStarted { folder: String, output: PathBuf },
    Progress(f64),
    JobRejected(String),
    Finished(TerminalOutcome),
    Error(String),
}

pub fn outcome_summary(outcome: &TerminalOutcome) -> String {
    match outcome {
        TerminalOutcome::Succeeded {
            output_path,
            request_errors,
        } => {
            if request_errors.is_empty() {
                format!("Model ready: {}", output_path.display())
            } else {
                format!(
                    "Model ready: {} ({} request error(s) along the way)",
                    output_path.display(),
                    request_errors.len()
                )
            }
        }
        TerminalOutcome::Cancelled { .. } => "Reconstruction cancelled".to_string(),
        TerminalOutcome::Failed { reason, .. } => format!("Reconstruction failed: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_summary_names_the_model_path() {
        let outcome = TerminalOutcome::Succeeded {
            output_path: PathBuf::from("/captures/outputs/statue.usdz"),
            request_errors: Vec::new(),
        };
        assert_eq!(
            outcome_summary(&outcome),
            "Model ready: /captures/outputs/statue.usdz"
        );
    }

    #[test]
    fn failure_summary_carries_the_reason() {
        let outcome = TerminalOutcome::Failed {
            reason: "engine fault: backend crashed".to_string(),
            request_errors: Vec::new(),
        };
        assert!(outcome_summary(&outcome).contains("backend crashed"));
    }
}
