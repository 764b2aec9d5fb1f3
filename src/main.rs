use std::time::Duration;

use clap::Parser;
use whisperx_flow::cli::{Cli, Command, RunArgs};
use whisperx_flow::model::AVAILABLE_MODELS;
use whisperx_flow::state::UiState;
use whisperx_flow::supervisor::{Supervisor, SupervisorConfig};
use whisperx_flow::{WxError, WxResult};

/// Consumer-side cadence between pumps of the supervisor.
const PUMP_INTERVAL: Duration = Duration::from_millis(50);

fn main() {
    whisperx_flow::logging::init();

    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> WxResult<()> {
    match Cli::parse().command {
        Command::Models => {
            for (model, size) in AVAILABLE_MODELS {
                println!("{model:<12} {size}");
            }
            Ok(())
        }
        Command::Run(args) => run_once(&args),
    }
}

/// Drive one full session: start, wait ready, load, transcribe, print.
fn run_once(args: &RunArgs) -> WxResult<()> {
    let mut supervisor = Supervisor::new(SupervisorConfig {
        interpreter: args.python.clone(),
        script: args.script.clone(),
        ..SupervisorConfig::default()
    });

    supervisor.start()?;
    let outcome = drive(&mut supervisor, args);
    supervisor.stop();
    outcome
}

fn drive(supervisor: &mut Supervisor, args: &RunArgs) -> WxResult<()> {
    let deadline = std::time::Instant::now() + Duration::from_secs(args.timeout_secs);
    let mut load_issued = false;
    let mut transcribe_issued = false;

    loop {
        supervisor.pump();
        let state = supervisor.ui().state;

        match state {
            UiState::Running if !load_issued => {
                supervisor.load_model(&args.model)?;
                load_issued = true;
            }
            UiState::ModelReady if !transcribe_issued => {
                supervisor.transcribe(&args.audio)?;
                transcribe_issued = true;
            }
            UiState::Transcribed => break,
            UiState::Initial => {
                // The session collapsed underneath us.
                return Err(WxError::WorkerExited {
                    code: supervisor.ui().last_exit_code,
                });
            }
            _ => {}
        }

        if std::time::Instant::now() >= deadline {
            tracing::warn!(status = %supervisor.ui().status, "run timed out");
            return Err(WxError::DeadlineExceeded {
                waited_ms: args.timeout_secs * 1_000,
            });
        }
        std::thread::sleep(PUMP_INTERVAL);
    }

    let result = supervisor
        .ui()
        .result
        .as_ref()
        .expect("transcribed state carries a result");
    if args.json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{}", result.transcript);
    }
    Ok(())
}
