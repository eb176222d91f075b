//! Application state machine.
//!
//! One tagged enum carries both what the application is doing and the data
//! that phase needs, and one explicit transition table decides which events
//! are legal where. Components never change state directly; the driver feeds
//! events through [`AppStateMachine::apply`] and reacts to the outcome.
//! Illegal events leave the machine untouched, which is also how actions
//! like "start capture" become unreachable from states that must not record.

use crate::orchestrator::DreamArtifact;

/// What the application is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppState {
    /// Startup, before the permission probe has answered.
    Idle,
    /// Waiting for the user to grant microphone access.
    RequestingPermission,
    /// Microphone access denied. Terminal until the process restarts.
    PermissionDenied,
    /// Permission settled; capture may start.
    ReadyToRecord,
    /// A capture session is live.
    Recording,
    /// Both generation branches are in flight for this transcript.
    Processing { transcription: String },
    /// A finished artifact is on display.
    DisplayingResults { artifact: DreamArtifact },
    /// Something unrecoverable short of a reset happened.
    Error { message: String },
}

/// Everything that can move the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The availability probe could not settle access; an explicit request
    /// is needed.
    PermissionUnclear,
    /// The probe or an explicit request granted access.
    PermissionGranted,
    /// The probe itself failed; access status is unknowable.
    PermissionQueryFailed { message: String },
    /// An explicit request was denied.
    PermissionDenied,
    /// A capture session opened.
    CaptureStarted,
    /// Capture finished with the accumulated transcript, possibly empty.
    CaptureStopped { transcription: String },
    /// Capture could not be established or died before a normal stop.
    CaptureFailed,
    ProcessingSucceeded { artifact: DreamArtifact },
    ProcessingFailed { message: String },
    /// The user asked to start over from the results or error screen.
    Reset,
}

/// The transition table. Returns `None` when `event` is illegal in `state`.
///
/// An empty-after-trim transcript routes back to `ReadyToRecord` instead of
/// `Processing`; the driver shows the validation notice. `Reset` lands in
/// `Idle` so the permission check re-runs from the top. No event leaves
/// `PermissionDenied`.
pub fn next_state(state: &AppState, event: AppEvent) -> Option<AppState> {
    match (state, event) {
        (AppState::Idle, AppEvent::PermissionUnclear) => Some(AppState::RequestingPermission),
        (AppState::Idle | AppState::RequestingPermission, AppEvent::PermissionGranted) => {
            Some(AppState::ReadyToRecord)
        }
        (
            AppState::Idle | AppState::RequestingPermission,
            AppEvent::PermissionQueryFailed { message },
        ) => Some(AppState::Error { message }),
        (
            AppState::RequestingPermission | AppState::ReadyToRecord,
            AppEvent::PermissionDenied,
        ) => Some(AppState::PermissionDenied),
        (AppState::ReadyToRecord, AppEvent::CaptureStarted) => Some(AppState::Recording),
        (AppState::Recording, AppEvent::CaptureStopped { transcription }) => {
            if transcription.trim().is_empty() {
                Some(AppState::ReadyToRecord)
            } else {
                Some(AppState::Processing { transcription })
            }
        }
        (AppState::Recording, AppEvent::CaptureFailed) => Some(AppState::ReadyToRecord),
        (AppState::Processing { .. }, AppEvent::ProcessingSucceeded { artifact }) => {
            Some(AppState::DisplayingResults { artifact })
        }
        (AppState::Processing { .. }, AppEvent::ProcessingFailed { message }) => {
            Some(AppState::Error { message })
        }
        (AppState::DisplayingResults { .. } | AppState::Error { .. }, AppEvent::Reset) => {
            Some(AppState::Idle)
        }
        _ => None,
    }
}

/// Holds the current state and applies events through the transition table.
pub struct AppStateMachine {
    state: AppState,
}

impl AppStateMachine {
    pub fn new() -> Self {
        Self {
            state: AppState::Idle,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Feeds one event. Returns the new state for legal events; illegal
    /// events are rejected with `None` and change nothing.
    pub fn apply(&mut self, event: AppEvent) -> Option<&AppState> {
        match next_state(&self.state, event) {
            Some(next) => {
                self.state = next;
                Some(&self.state)
            }
            None => None,
        }
    }
}

impl Default for AppStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> DreamArtifact {
        DreamArtifact {
            transcription: "t".to_string(),
            interpretation: "i".to_string(),
            image_data: vec![1, 2, 3],
            image_format: "image/png".to_string(),
        }
    }

    #[test]
    fn starts_idle() {
        let machine = AppStateMachine::new();
        assert_eq!(*machine.state(), AppState::Idle);
    }

    #[test]
    fn granted_from_idle_skips_the_request_screen() {
        let mut machine = AppStateMachine::new();
        machine.apply(AppEvent::PermissionGranted).unwrap();
        assert_eq!(*machine.state(), AppState::ReadyToRecord);
    }

    #[test]
    fn unclear_probe_requires_an_explicit_request() {
        let mut machine = AppStateMachine::new();
        machine.apply(AppEvent::PermissionUnclear).unwrap();
        assert_eq!(*machine.state(), AppState::RequestingPermission);

        machine.apply(AppEvent::PermissionGranted).unwrap();
        assert_eq!(*machine.state(), AppState::ReadyToRecord);
    }

    #[test]
    fn failed_probe_is_an_error() {
        let mut machine = AppStateMachine::new();
        machine
            .apply(AppEvent::PermissionQueryFailed {
                message: "no audio host".to_string(),
            })
            .unwrap();
        assert_eq!(
            *machine.state(),
            AppState::Error {
                message: "no audio host".to_string()
            }
        );
    }

    #[test]
    fn denied_request_is_terminal() {
        let mut machine = AppStateMachine::new();
        machine.apply(AppEvent::PermissionUnclear).unwrap();
        machine.apply(AppEvent::PermissionDenied).unwrap();
        assert_eq!(*machine.state(), AppState::PermissionDenied);

        // Nothing recovers from a denial in-process, and capture in
        // particular is unreachable.
        let events = [
            AppEvent::PermissionGranted,
            AppEvent::PermissionUnclear,
            AppEvent::CaptureStarted,
            AppEvent::CaptureStopped {
                transcription: "text".to_string(),
            },
            AppEvent::Reset,
        ];
        for event in events {
            assert!(machine.apply(event).is_none());
            assert_eq!(*machine.state(), AppState::PermissionDenied);
        }
    }

    #[test]
    fn empty_transcript_returns_to_ready_never_processing() {
        for transcription in ["", "   ", "\n\t "] {
            let state = next_state(
                &AppState::Recording,
                AppEvent::CaptureStopped {
                    transcription: transcription.to_string(),
                },
            )
            .unwrap();
            assert_eq!(state, AppState::ReadyToRecord);
        }
    }

    #[test]
    fn non_empty_transcript_moves_to_processing() {
        let state = next_state(
            &AppState::Recording,
            AppEvent::CaptureStopped {
                transcription: "I was flying".to_string(),
            },
        )
        .unwrap();
        assert_eq!(
            state,
            AppState::Processing {
                transcription: "I was flying".to_string()
            }
        );
    }

    #[test]
    fn capture_failure_returns_to_ready() {
        let state = next_state(&AppState::Recording, AppEvent::CaptureFailed).unwrap();
        assert_eq!(state, AppState::ReadyToRecord);
    }

    #[test]
    fn full_journal_walk() {
        let mut machine = AppStateMachine::new();
        machine.apply(AppEvent::PermissionGranted).unwrap();
        machine.apply(AppEvent::CaptureStarted).unwrap();
        assert_eq!(*machine.state(), AppState::Recording);

        machine
            .apply(AppEvent::CaptureStopped {
                transcription: "I was flying over a purple ocean".to_string(),
            })
            .unwrap();
        assert_eq!(
            *machine.state(),
            AppState::Processing {
                transcription: "I was flying over a purple ocean".to_string()
            }
        );

        machine
            .apply(AppEvent::ProcessingSucceeded {
                artifact: artifact(),
            })
            .unwrap();
        assert_eq!(
            *machine.state(),
            AppState::DisplayingResults {
                artifact: artifact()
            }
        );

        machine.apply(AppEvent::Reset).unwrap();
        assert_eq!(*machine.state(), AppState::Idle);
    }

    #[test]
    fn processing_failure_lands_in_error_and_resets() {
        let mut machine = AppStateMachine::new();
        machine.apply(AppEvent::PermissionGranted).unwrap();
        machine.apply(AppEvent::CaptureStarted).unwrap();
        machine
            .apply(AppEvent::CaptureStopped {
                transcription: "something".to_string(),
            })
            .unwrap();
        machine
            .apply(AppEvent::ProcessingFailed {
                message: "Failed to interpret the dream.".to_string(),
            })
            .unwrap();
        assert_eq!(
            *machine.state(),
            AppState::Error {
                message: "Failed to interpret the dream.".to_string()
            }
        );

        machine.apply(AppEvent::Reset).unwrap();
        assert_eq!(*machine.state(), AppState::Idle);
    }

    #[test]
    fn illegal_events_are_rejected_without_moving() {
        let mut machine = AppStateMachine::new();
        assert!(machine.apply(AppEvent::CaptureStarted).is_none());
        assert_eq!(*machine.state(), AppState::Idle);

        machine.apply(AppEvent::PermissionGranted).unwrap();
        assert!(machine
            .apply(AppEvent::ProcessingSucceeded {
                artifact: artifact()
            })
            .is_none());
        assert_eq!(*machine.state(), AppState::ReadyToRecord);
    }

    #[test]
    fn stop_events_are_ignored_outside_recording() {
        let outcome = next_state(
            &AppState::ReadyToRecord,
            AppEvent::CaptureStopped {
                transcription: "text".to_string(),
            },
        );
        assert!(outcome.is_none());
    }
}
