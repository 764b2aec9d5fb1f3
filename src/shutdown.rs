//! Three-tier shutdown escalation: graceful exit command, terminate
//! signal, force kill. Each tier polls liveness every 100 ms and is
//! skipped when the worker has already exited. Signal delivery failures
//! are logged and swallowed; the ladder always completes so the caller
//! is never left with a session it cannot close.

use std::io::Write;
use std::time::Duration;

use crate::clock::Clock;
use crate::model::WorkerCommand;
use crate::session::ProcessControl;

/// Per-tier wait budgets in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownTiers {
    pub graceful_ms: u64,
    pub terminate_ms: u64,
    pub kill_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for ShutdownTiers {
    fn default() -> Self {
        Self {
            graceful_ms: 3_000,
            terminate_ms: 2_000,
            kill_ms: 500,
            poll_interval_ms: 100,
        }
    }
}

/// How far up the ladder the coordinator had to climb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The worker was already gone; every tier was skipped.
    AlreadyExited,
    /// The worker honored the `exit()` command.
    Graceful,
    /// The worker left after the terminate signal.
    Terminated,
    /// The worker had to be force-killed.
    Killed,
    /// The worker outlived even the kill tier (best effort exhausted).
    Survived,
}

#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    tiers: ShutdownTiers,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new(tiers: ShutdownTiers) -> Self {
        Self { tiers }
    }

    /// Walk the ladder. Consumes and closes `stdin` (closing the pipe is
    /// part of the graceful tier). Returns the outcome and the exit code
    /// when one was observed.
    pub fn run(
        &self,
        stdin: Option<Box<dyn Write + Send>>,
        control: &mut dyn ProcessControl,
        clock: &dyn Clock,
    ) -> (ShutdownOutcome, Option<i32>) {
        if let Some(code) = control.poll() {
            return (ShutdownOutcome::AlreadyExited, Some(code));
        }

        // Tier 1: ask politely, then close the pipe.
        if let Some(mut stdin) = stdin {
            let line = WorkerCommand::Shutdown.wire_form();
            if let Err(error) = stdin
                .write_all(line.as_bytes())
                .and_then(|()| stdin.flush())
            {
                tracing::debug!("exit command not delivered: {error}");
            }
        }
        if let Some(code) = self.wait_for_exit(control, clock, self.tiers.graceful_ms) {
            tracing::info!(code, "worker stopped gracefully");
            return (ShutdownOutcome::Graceful, Some(code));
        }

        // Tier 2: terminate signal.
        if let Err(error) = control.terminate() {
            tracing::debug!("terminate signal not delivered: {error}");
        }
        if let Some(code) = self.wait_for_exit(control, clock, self.tiers.terminate_ms) {
            tracing::info!(code, "worker terminated");
            return (ShutdownOutcome::Terminated, Some(code));
        }

        // Tier 3: force kill.
        if let Err(error) = control.kill() {
            tracing::debug!("kill not delivered: {error}");
        }
        if let Some(code) = self.wait_for_exit(control, clock, self.tiers.kill_ms) {
            tracing::info!(code, "worker force-killed");
            return (ShutdownOutcome::Killed, Some(code));
        }

        tracing::warn!("worker survived the full shutdown escalation");
        (ShutdownOutcome::Survived, None)
    }

    fn wait_for_exit(
        &self,
        control: &mut dyn ProcessControl,
        clock: &dyn Clock,
        budget_ms: u64,
    ) -> Option<i32> {
        let deadline = clock.now_ms().saturating_add(budget_ms);
        loop {
            if let Some(code) = control.poll() {
                return Some(code);
            }
            if clock.now_ms() >= deadline {
                return None;
            }
            clock.sleep(Duration::from_millis(self.tiers.poll_interval_ms));
        }
    }
}
