#![allow(dead_code)]

//! Shared fixtures: shell scripts standing in for the real WhisperX
//! runner, spawned through the production `SystemSpawner` via `sh`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use whisperx_flow::dispatch::UiModel;
use whisperx_flow::supervisor::{Supervisor, SupervisorConfig};

/// A worker that boots, then answers load-model / transcribe-audio /
/// exit() the way the real runner does.
pub const COOPERATIVE_WORKER: &str = r#"echo "WhisperX Command Line Interface"
echo "Setting up environment..."
echo "progress=5"
echo "Environment setup complete!"
echo "progress=100"
while IFS= read -r line; do
  case "$line" in
    "load-model("*)
      model="${line#load-model(}"
      model="${model%)}"
      echo "Loading model '$model'..."
      echo "progress=50"
      echo "Model '$model' loaded"
      ;;
    "transcribe-audio("*)
      echo "Transcribing audio..."
      echo "progress=60"
      echo "Transcription completed in 0.1s"
      echo "============================================================"
      printf '%s\n' '{"transcript": "hello world", "language": "en", "model_used": "tiny.en", "audio_duration": 1.5, "processing_time": 0.2, "segments": [{"start": 0.0, "end": 1.5, "text": "hello world", "words": [{"word": "hello", "start": 0.0, "end": 0.7, "score": 0.98}, {"word": "world", "start": 0.8, "end": 1.5, "score": 0.95}]}]}'
      echo "============================================================"
      ;;
    "exit()")
      echo "Goodbye!"
      exit 0
      ;;
  esac
done
exit 0
"#;

/// A worker that ignores exit() and the terminate signal; only the kill
/// tier can take it down.
pub const STUBBORN_WORKER: &str = r#"trap '' TERM INT
echo "Setting up environment..."
echo "Environment setup complete!"
while :; do sleep 1; done
"#;

/// A worker that crashes right after booting.
pub const CRASHING_WORKER: &str = r#"echo "Setting up environment..."
echo "Environment setup complete!"
echo "Error: model backend crashed"
exit 3
"#;

/// Write `body` as a worker script and return (tempdir guard, path).
pub fn write_worker_script(body: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("whisperx_runner.py");
    std::fs::write(&script, body).expect("write worker script");
    (dir, script)
}

/// Supervisor wired to run `script` under `sh`.
pub fn supervisor_for(script: PathBuf) -> Supervisor {
    Supervisor::new(SupervisorConfig {
        interpreter: PathBuf::from("sh"),
        script: Some(script),
        ..SupervisorConfig::default()
    })
}

/// Pump until `predicate` holds, panicking after `timeout`.
pub fn pump_until(
    supervisor: &mut Supervisor,
    timeout: Duration,
    what: &str,
    predicate: impl Fn(&UiModel) -> bool,
) {
    let deadline = Instant::now() + timeout;
    loop {
        supervisor.pump();
        if predicate(supervisor.ui()) {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {what}; status={:?} state={:?}",
            supervisor.ui().status,
            supervisor.ui().state
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}
