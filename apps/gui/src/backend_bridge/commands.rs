use std::path::PathBuf;

/// UI -> backend worker commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCommand {
    StartJob { input_dir: PathBuf },
    CancelJob,
}
