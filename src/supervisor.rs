//! The supervisor: owns at most one [`WorkerSession`], feeds caller
//! commands to it, and drains the reader loop's events into the
//! [`UiModel`] on the consumer thread.
//!
//! All shared-state mutation happens inside [`Supervisor::pump`], which
//! the consumer calls on its own schedule (event-loop iteration or
//! timer tick). The reader loop only ever produces immutable event
//! values, so no locks guard the UI model.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use crate::clock::{Clock, SystemClock};
use crate::codec::LineEvent;
use crate::dispatch::{REDRAW_INTERVAL_MS, RedrawTimer, SessionEvent, UiModel, event_channel};
use crate::error::{WxError, WxResult};
use crate::model::{TranscriptionResult, WorkerCommand, is_known_model};
use crate::session::{Spawn, SpawnSpec, SystemSpawner, WorkerSession, find_worker_script};
use crate::shutdown::{ShutdownCoordinator, ShutdownOutcome, ShutdownTiers};
use crate::state::{StateEffect, StateEvent, transition};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Interpreter used to run the worker script.
    pub interpreter: PathBuf,
    /// Worker script path; discovered in conventional locations when
    /// unset.
    pub script: Option<PathBuf>,
    pub tiers: ShutdownTiers,
    pub redraw_interval_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            script: None,
            tiers: ShutdownTiers::default(),
            redraw_interval_ms: REDRAW_INTERVAL_MS,
        }
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    spawner: Box<dyn Spawn>,
    clock: Box<dyn Clock>,
    coordinator: ShutdownCoordinator,
    session: Option<WorkerSession>,
    events: Option<Receiver<SessionEvent>>,
    timer: RedrawTimer,
    ui: UiModel,
}

impl Supervisor {
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_capabilities(config, Box::new(SystemSpawner), Box::new(SystemClock::new()))
    }

    /// Construct with injected spawn and clock capabilities (used by the
    /// tests to run against scripted fakes).
    #[must_use]
    pub fn with_capabilities(
        config: SupervisorConfig,
        spawner: Box<dyn Spawn>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let coordinator = ShutdownCoordinator::new(config.tiers);
        let timer = RedrawTimer::new(config.redraw_interval_ms);
        Self {
            config,
            spawner,
            clock,
            coordinator,
            session: None,
            events: None,
            timer,
            ui: UiModel::default(),
        }
    }

    #[must_use]
    pub fn ui(&self) -> &UiModel {
        &self.ui
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Spawn the worker and begin supervising it.
    ///
    /// Exactly one session may exist at a time; starting while one is
    /// live is rejected outright rather than queued.
    pub fn start(&mut self) -> WxResult<()> {
        if self.session.is_some() {
            return Err(WxError::AlreadyRunning);
        }

        let script = match &self.config.script {
            Some(path) => path.clone(),
            None => find_worker_script()
                .ok_or_else(|| WxError::ScriptNotFound(PathBuf::from("whisperx_runner.py")))?,
        };
        let spec = SpawnSpec::for_script(self.config.interpreter.clone(), script);

        let (tx, rx) = event_channel();
        let session = WorkerSession::start(self.spawner.as_ref(), &spec, tx)?;

        self.session = Some(session);
        self.events = Some(rx);
        self.timer.arm(self.clock.now_ms());
        self.apply_state(&StateEvent::StartSucceeded);
        self.ui.status = "Starting service...".to_owned();
        self.ui.progress = None;
        self.ui.log.push("Initializing WhisperX service...");
        Ok(())
    }

    /// Ask the worker to load `model`.
    pub fn load_model(&mut self, model: &str) -> WxResult<()> {
        if !is_known_model(model) {
            // The worker validates too and reports its own error line;
            // this is only an early heads-up in the supervisor log.
            tracing::warn!(model, "model not in the known catalog");
        }
        self.send(&WorkerCommand::LoadModel(model.to_owned()))?;
        self.apply_state(&StateEvent::LoadModelIssued);
        self.ui.status = "Loading model...".to_owned();
        self.ui.log.push(format!("Loading model: {model}..."));
        Ok(())
    }

    /// Ask the worker to transcribe `audio`. Requires a loaded model.
    pub fn transcribe(&mut self, audio: &Path) -> WxResult<()> {
        if self.ui.loaded_model.is_none() {
            return Err(WxError::NoModelLoaded);
        }
        self.ui.result = None;
        self.send(&WorkerCommand::TranscribeAudio(audio.to_owned()))?;
        self.apply_state(&StateEvent::TranscribeIssued);
        self.ui.status = "Transcribing audio...".to_owned();
        let name = audio
            .file_name()
            .map_or_else(|| audio.display().to_string(), |n| n.display().to_string());
        self.ui.log.push(format!("Transcribing: {name}..."));
        Ok(())
    }

    /// Return to `ModelReady` for another take with the loaded model.
    pub fn try_again(&mut self) {
        self.apply_state(&StateEvent::TryAgain);
        if let Some(model) = &self.ui.loaded_model {
            self.ui.status = format!("Model '{model}' loaded");
        }
    }

    /// Stop the session through the escalation ladder. A no-op when no
    /// session is live.
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.ui.status = "Stopping service...".to_owned();
        self.ui.log.push("Stopping WhisperX service...");

        let (outcome, code) = session.stop(&self.coordinator, self.clock.as_ref());
        self.ui.log.push(match outcome {
            ShutdownOutcome::AlreadyExited => "Service already stopped",
            ShutdownOutcome::Graceful => "Service stopped gracefully",
            ShutdownOutcome::Terminated => "Service terminated",
            ShutdownOutcome::Killed => "Service force killed",
            ShutdownOutcome::Survived => "Warning: Could not kill process",
        });
        self.finish_session(code);
    }

    /// Drain pending events, apply them to the UI model, and poll the
    /// redraw timer. Returns true when the caller should repaint.
    ///
    /// Many queued events coalesce into a single repaint per pump.
    pub fn pump(&mut self) -> bool {
        let drained: Vec<SessionEvent> = self
            .events
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default();

        let mut redraw = !drained.is_empty();
        for event in drained {
            self.apply_session_event(event);
        }

        redraw |= self
            .timer
            .poll(self.clock.now_ms(), self.session.is_some());
        redraw
    }

    // -- internals --------------------------------------------------------

    fn send(&mut self, command: &WorkerCommand) -> WxResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(WxError::NotRunning);
        };
        match session.send(command) {
            Ok(()) => Ok(()),
            Err(WxError::BrokenPipe(detail)) => {
                // The worker is presumed dead; surface the failure and
                // run the ladder's post-mortem cleanup.
                self.ui.status = format!("Error: worker unreachable ({detail})");
                self.stop();
                Err(WxError::BrokenPipe(detail))
            }
            Err(other) => Err(other),
        }
    }

    fn apply_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Line(LineEvent::Log(line)) => self.ui.log.push(line),
            SessionEvent::Line(LineEvent::Progress(percent)) => {
                self.ui.progress = Some(percent);
            }
            SessionEvent::Line(LineEvent::StatusHint(hint)) => self.ui.status = hint,
            SessionEvent::Line(LineEvent::WorkerReady) => {
                self.apply_state(&StateEvent::WorkerReady);
            }
            SessionEvent::Line(LineEvent::ModelLoaded(name)) => {
                self.apply_state(&StateEvent::ModelLoaded(name));
            }
            SessionEvent::Line(LineEvent::JsonBlock(text)) => self.apply_json_block(&text),
            SessionEvent::ReadFailed(detail) => {
                self.ui.log.push(format!("Error reading output: {detail}"));
            }
            SessionEvent::Exited(code) => {
                self.ui.log.push(match code {
                    Some(code) => format!("Process exited with code {code}"),
                    None => "Process exited".to_owned(),
                });
                if let Some(mut session) = self.session.take() {
                    session.mark_exited(code);
                }
                self.finish_session(code);
            }
        }
    }

    fn apply_json_block(&mut self, text: &str) {
        match TranscriptionResult::parse(text) {
            Ok(result) => {
                self.ui.result = Some(result);
                self.apply_state(&StateEvent::ResultReceived);
                self.ui.status = "Transcription complete".to_owned();
            }
            Err(error) => {
                // Advisory: the session stays where it is, the worker
                // already moved on.
                tracing::warn!("discarding malformed transcription payload: {error}");
                self.ui.status = format!("Error: {error}");
            }
        }
    }

    fn finish_session(&mut self, exit_code: Option<i32>) {
        self.events = None;
        self.ui.last_exit_code = exit_code;
        self.apply_state(&StateEvent::SessionEnded { exit_code });
        self.ui.status = match exit_code {
            Some(code) if code != 0 => format!("Service stopped with error (code: {code})"),
            _ => "Service stopped".to_owned(),
        };
    }

    fn apply_state(&mut self, event: &StateEvent) {
        let (next, effects) = transition(self.ui.state, event);
        self.ui.state = next;
        for effect in effects {
            match effect {
                StateEffect::RecordLoadedModel(name) => {
                    self.ui.status = format!("Model '{name}' loaded");
                    self.ui.loaded_model = Some(name);
                }
                StateEffect::ClearLoadedModel => self.ui.loaded_model = None,
            }
        }
    }
}
