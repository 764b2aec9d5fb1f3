//! Marshals reader-loop observations onto the single consumer thread.
//!
//! The reader loop never mutates UI-visible state: it sends immutable
//! [`SessionEvent`] values through a bounded channel and the consumer
//! drains them on its own schedule. A redraw timer forces a repaint
//! every 500 ms while a session is running so polling-based observers
//! stay current even when the worker is quiet, and disarms itself with
//! one final repaint once the session is gone.

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

use crate::codec::LineEvent;
use crate::model::TranscriptionResult;
use crate::state::UiState;

/// Default retained log lines; oldest entries are evicted first.
pub const LOG_CAPACITY: usize = 100;

/// Forced-repaint interval while a session is running.
pub const REDRAW_INTERVAL_MS: u64 = 500;

/// Bound on in-flight events between reader loop and consumer. Commands
/// and log lines are small; if the consumer stalls this long the reader
/// blocking briefly is the intended backpressure.
pub const QUEUE_CAPACITY: usize = 256;

/// One observation crossing from the reader loop to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A decoded output line event.
    Line(LineEvent),
    /// A read failure the loop degraded into a diagnostic.
    ReadFailed(String),
    /// The worker's output stream ended; exit code if observed.
    Exited(Option<i32>),
}

/// Create the bounded reader-to-consumer channel.
#[must_use]
pub fn event_channel() -> (SyncSender<SessionEvent>, Receiver<SessionEvent>) {
    sync_channel(QUEUE_CAPACITY)
}

// ---------------------------------------------------------------------------
// Log buffer
// ---------------------------------------------------------------------------

/// Capacity-bounded FIFO of the most recent worker log lines.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<String>,
    capacity: usize,
}

impl LogBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Newline-joined snapshot, oldest line first.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Redraw timer
// ---------------------------------------------------------------------------

/// Coalesces forced repaints to one per interval while armed.
#[derive(Debug)]
pub struct RedrawTimer {
    interval_ms: u64,
    last_forced_ms: u64,
    armed: bool,
}

impl RedrawTimer {
    #[must_use]
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_forced_ms: 0,
            armed: false,
        }
    }

    /// Arm the timer when a session starts.
    pub fn arm(&mut self, now_ms: u64) {
        self.armed = true;
        self.last_forced_ms = now_ms;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Returns true when a forced repaint is due. Once the session is no
    /// longer running the timer requests one last repaint and disarms.
    pub fn poll(&mut self, now_ms: u64, session_running: bool) -> bool {
        if !self.armed {
            return false;
        }
        if !session_running {
            self.armed = false;
            return true;
        }
        if now_ms.saturating_sub(self.last_forced_ms) >= self.interval_ms {
            self.last_forced_ms = now_ms;
            return true;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// UI model
// ---------------------------------------------------------------------------

/// All UI-visible shared state. Mutated exclusively on the consumer
/// thread, after dispatch; the reader loop never touches it.
#[derive(Debug, Clone)]
pub struct UiModel {
    pub state: UiState,
    pub status: String,
    pub loaded_model: Option<String>,
    pub progress: Option<u8>,
    pub log: LogBuffer,
    pub result: Option<TranscriptionResult>,
    pub last_exit_code: Option<i32>,
}

impl Default for UiModel {
    fn default() -> Self {
        Self {
            state: UiState::Initial,
            status: "Ready to start".to_owned(),
            loaded_model: None,
            progress: None,
            log: LogBuffer::new(),
            result: None,
            last_exit_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_buffer_never_exceeds_capacity() {
        let mut log = LogBuffer::with_capacity(100);
        for i in 0..250 {
            log.push(format!("line {i}"));
            assert!(log.len() <= 100, "overflow after push {i}");
        }
        assert_eq!(log.len(), 100);
    }

    #[test]
    fn log_buffer_keeps_most_recent_lines_in_order() {
        let mut log = LogBuffer::with_capacity(3);
        for line in ["a", "b", "c", "d", "e"] {
            log.push(line);
        }
        let lines: Vec<&str> = log.iter().collect();
        assert_eq!(lines, vec!["c", "d", "e"]);
        assert_eq!(log.to_text(), "c\nd\ne");
    }

    #[test]
    fn log_buffer_clear_empties() {
        let mut log = LogBuffer::new();
        log.push("one");
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.to_text(), "");
    }

    #[test]
    fn event_channel_preserves_fifo_order() {
        let (tx, rx) = event_channel();
        for i in 0..10u8 {
            tx.send(SessionEvent::Line(LineEvent::Progress(i))).unwrap();
        }
        drop(tx);
        let received: Vec<SessionEvent> = rx.iter().collect();
        let expected: Vec<SessionEvent> = (0..10u8)
            .map(|i| SessionEvent::Line(LineEvent::Progress(i)))
            .collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn redraw_timer_disarmed_by_default() {
        let mut timer = RedrawTimer::new(REDRAW_INTERVAL_MS);
        assert!(!timer.poll(0, true));
        assert!(!timer.poll(10_000, false));
    }

    #[test]
    fn redraw_timer_coalesces_within_interval() {
        let mut timer = RedrawTimer::new(500);
        timer.arm(0);
        assert!(!timer.poll(100, true));
        assert!(!timer.poll(499, true));
        assert!(timer.poll(500, true), "due at the interval boundary");
        assert!(!timer.poll(700, true), "just repainted at 500");
        assert!(timer.poll(1000, true));
    }

    #[test]
    fn redraw_timer_final_repaint_then_disarms() {
        let mut timer = RedrawTimer::new(500);
        timer.arm(0);
        assert!(timer.poll(200, false), "one final repaint on stop");
        assert!(!timer.is_armed());
        assert!(!timer.poll(10_000, false), "stays quiet after disarming");
    }

    #[test]
    fn redraw_timer_rearms_for_next_session() {
        let mut timer = RedrawTimer::new(500);
        timer.arm(0);
        let _ = timer.poll(100, false);
        timer.arm(1000);
        assert!(!timer.poll(1200, true));
        assert!(timer.poll(1500, true));
    }

    #[test]
    fn ui_model_defaults_match_fresh_panel() {
        let ui = UiModel::default();
        assert_eq!(ui.state, UiState::Initial);
        assert_eq!(ui.status, "Ready to start");
        assert!(ui.loaded_model.is_none());
        assert!(ui.progress.is_none());
        assert!(ui.log.is_empty());
        assert!(ui.result.is_none());
    }
}
