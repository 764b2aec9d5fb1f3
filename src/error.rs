use std::path::PathBuf;

use thiserror::Error;

pub type WxResult<T> = Result<T, WxError>;

#[derive(Debug, Error)]
pub enum WxError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid transcription payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("worker script not found at `{0}`")]
    ScriptNotFound(PathBuf),

    #[error("missing interpreter `{interpreter}` on PATH")]
    InterpreterMissing { interpreter: String },

    #[error("a worker session is already running")]
    AlreadyRunning,

    #[error("no worker session is running")]
    NotRunning,

    #[error("no model loaded; issue load-model first")]
    NoModelLoaded,

    #[error("worker pipe closed: {0}")]
    BrokenPipe(String),

    #[error("worker exited unexpectedly{}", exit_suffix(*code))]
    WorkerExited { code: Option<i32> },

    #[error("gave up after {waited_ms}ms waiting for the worker")]
    DeadlineExceeded { waited_ms: u64 },
}

fn exit_suffix(code: Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {code})"),
        None => String::new(),
    }
}
