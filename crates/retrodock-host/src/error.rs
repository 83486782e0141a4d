use std::path::PathBuf;

/// Error taxonomy of the host.
///
/// Ring-buffer overflow is deliberately absent: dropping audio is a policy,
/// not a failure, because the producing core must never be blocked. Unhandled
/// environment commands likewise never surface here; they return `false` to
/// the core, which has no exception mechanism.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    #[error("failed to load core {path}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("no core is loaded")]
    NoCore,
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("shared memory size mismatch: expected {expected} bytes, got {actual}")]
    Size { expected: usize, actual: usize },
    #[error("shared memory channel: {0}")]
    Channel(String),
    #[error("invalid transition: {request} while {state}")]
    InvalidTransition {
        state: &'static str,
        request: &'static str,
    },
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
    #[error("save state failed: {path}: {reason}")]
    SaveState { path: PathBuf, reason: String },
    #[error("load state failed: {path}: {reason}")]
    LoadState { path: PathBuf, reason: String },
    #[error("input backend: {0}")]
    Input(String),
    #[error("runner control channel disconnected")]
    RunnerGone,
}
