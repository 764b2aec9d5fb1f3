//! Workflow state machine for the supervisor's UI-visible state.
//!
//! `transition` is a pure function; the supervisor feeds it events and
//! applies the returned effects on the consumer thread. Events that do
//! not match an outgoing edge of the current state are ignored rather
//! than rejected: the worker's text stream carries no ordering
//! guarantee, so the machine is deliberately best-effort.

/// UI-visible workflow state. A session's terminal state is `Initial`;
/// the machine itself is re-enterable for the next session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiState {
    #[default]
    Initial,
    Running,
    ModelReady,
    Processing,
    Transcribed,
}

/// Inputs to the machine: caller actions and decoded worker events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// `start()` succeeded and the worker is booting.
    StartSucceeded,
    /// The worker finished environment setup.
    WorkerReady,
    /// The caller issued a `load-model` command.
    LoadModelIssued,
    /// The worker reported a model as loaded.
    ModelLoaded(String),
    /// The caller issued a `transcribe-audio` command.
    TranscribeIssued,
    /// A fenced JSON block parsed into a valid result.
    ResultReceived,
    /// The caller wants another take with the loaded model.
    TryAgain,
    /// The session is gone: stop requested or process exit observed.
    SessionEnded { exit_code: Option<i32> },
}

/// Bookkeeping the supervisor must perform alongside a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEffect {
    RecordLoadedModel(String),
    ClearLoadedModel,
}

/// Apply one event to the current state.
#[must_use]
pub fn transition(state: UiState, event: &StateEvent) -> (UiState, Vec<StateEffect>) {
    use UiState::{Initial, ModelReady, Processing, Running, Transcribed};

    match (state, event) {
        (Initial, StateEvent::StartSucceeded) => (Processing, Vec::new()),
        (Processing, StateEvent::WorkerReady) => (Running, Vec::new()),
        (Running | ModelReady | Transcribed, StateEvent::LoadModelIssued) => {
            (Processing, Vec::new())
        }
        (Processing, StateEvent::ModelLoaded(name)) => (
            ModelReady,
            vec![StateEffect::RecordLoadedModel(name.clone())],
        ),
        (ModelReady, StateEvent::TranscribeIssued) => (Processing, Vec::new()),
        (Processing, StateEvent::ResultReceived) => (Transcribed, Vec::new()),
        (ModelReady | Transcribed, StateEvent::TryAgain) => (ModelReady, Vec::new()),
        (_, StateEvent::SessionEnded { .. }) => (Initial, vec![StateEffect::ClearLoadedModel]),
        // Everything else is a no-op: the stream is not well-ordered.
        _ => (state, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [UiState; 5] = [
        UiState::Initial,
        UiState::Running,
        UiState::ModelReady,
        UiState::Processing,
        UiState::Transcribed,
    ];

    fn all_events() -> Vec<StateEvent> {
        vec![
            StateEvent::StartSucceeded,
            StateEvent::WorkerReady,
            StateEvent::LoadModelIssued,
            StateEvent::ModelLoaded("tiny.en".to_owned()),
            StateEvent::TranscribeIssued,
            StateEvent::ResultReceived,
            StateEvent::TryAgain,
            StateEvent::SessionEnded { exit_code: None },
        ]
    }

    #[test]
    fn happy_path_walks_the_full_table() {
        let (state, _) = transition(UiState::Initial, &StateEvent::StartSucceeded);
        assert_eq!(state, UiState::Processing);

        let (state, _) = transition(state, &StateEvent::WorkerReady);
        assert_eq!(state, UiState::Running);

        let (state, _) = transition(state, &StateEvent::LoadModelIssued);
        assert_eq!(state, UiState::Processing);

        let (state, effects) =
            transition(state, &StateEvent::ModelLoaded("tiny.en".to_owned()));
        assert_eq!(state, UiState::ModelReady);
        assert_eq!(
            effects,
            vec![StateEffect::RecordLoadedModel("tiny.en".to_owned())]
        );

        let (state, _) = transition(state, &StateEvent::TranscribeIssued);
        assert_eq!(state, UiState::Processing);

        let (state, _) = transition(state, &StateEvent::ResultReceived);
        assert_eq!(state, UiState::Transcribed);
    }

    #[test]
    fn session_ended_returns_to_initial_from_every_state() {
        for state in ALL_STATES {
            let (next, effects) =
                transition(state, &StateEvent::SessionEnded { exit_code: Some(1) });
            assert_eq!(next, UiState::Initial, "from {state:?}");
            assert_eq!(effects, vec![StateEffect::ClearLoadedModel]);
        }
    }

    #[test]
    fn from_initial_only_start_leads_elsewhere() {
        for event in all_events() {
            let (next, _) = transition(UiState::Initial, &event);
            if matches!(event, StateEvent::StartSucceeded) {
                assert_eq!(next, UiState::Processing);
            } else {
                assert_eq!(next, UiState::Initial, "event {event:?} must be a no-op");
            }
        }
    }

    #[test]
    fn no_event_escapes_the_state_set() {
        for state in ALL_STATES {
            for event in all_events() {
                let (next, _) = transition(state, &event);
                assert!(
                    ALL_STATES.contains(&next),
                    "{state:?} + {event:?} produced {next:?}"
                );
            }
        }
    }

    #[test]
    fn reload_is_allowed_from_ready_and_transcribed() {
        for state in [UiState::ModelReady, UiState::Transcribed] {
            let (next, _) = transition(state, &StateEvent::LoadModelIssued);
            assert_eq!(next, UiState::Processing, "from {state:?}");
        }
    }

    #[test]
    fn try_again_returns_to_model_ready() {
        let (next, _) = transition(UiState::Transcribed, &StateEvent::TryAgain);
        assert_eq!(next, UiState::ModelReady);
        // From ModelReady it is a harmless self-loop.
        let (next, _) = transition(UiState::ModelReady, &StateEvent::TryAgain);
        assert_eq!(next, UiState::ModelReady);
        // From anywhere else it is ignored.
        let (next, _) = transition(UiState::Processing, &StateEvent::TryAgain);
        assert_eq!(next, UiState::Processing);
    }

    #[test]
    fn stray_worker_events_are_ignored() {
        // A spontaneous "model loaded" while Running (e.g. the worker
        // repeating itself) must not move the machine.
        let (next, effects) = transition(
            UiState::Running,
            &StateEvent::ModelLoaded("tiny.en".to_owned()),
        );
        assert_eq!(next, UiState::Running);
        assert!(effects.is_empty());

        let (next, _) = transition(UiState::Running, &StateEvent::ResultReceived);
        assert_eq!(next, UiState::Running);

        let (next, _) = transition(UiState::Transcribed, &StateEvent::WorkerReady);
        assert_eq!(next, UiState::Transcribed);
    }

    #[test]
    fn machine_is_reenterable_after_session_end() {
        let (state, _) = transition(UiState::Transcribed, &StateEvent::SessionEnded {
            exit_code: None,
        });
        assert_eq!(state, UiState::Initial);
        let (state, _) = transition(state, &StateEvent::StartSucceeded);
        assert_eq!(state, UiState::Processing);
    }
}
