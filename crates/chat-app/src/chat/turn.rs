/// Distinguishes why a turn ended in the failed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Upstream,
    Cancelled,
}

/// Lifecycle of a single chat turn.
///
/// `Sending` covers the window between submission and the first chunk;
/// `Streaming` persists across every subsequent chunk. `Completed` and
/// `Failed` are terminal for the turn, and the next submission starts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed(FailureKind),
}

/// State transition input for the turn lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnTransition {
    Begin,
    ChunkReceived,
    Complete,
    Fail(FailureKind),
}

/// Rejection reason for illegal turn transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnTransitionRejection {
    AlreadyInFlight { state: TurnState },
    NoTurnInFlight { state: TurnState },
}

/// Result type for turn transition application.
pub type TurnTransitionResult = Result<TurnState, TurnTransitionRejection>;

impl TurnState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }

    /// Applies one transition deterministically.
    ///
    /// `Begin` is only legal while no turn is in flight. Chunk and terminal
    /// transitions are only legal while one is.
    pub fn apply(&self, transition: TurnTransition) -> TurnTransitionResult {
        match transition {
            TurnTransition::Begin => self.apply_begin(),
            TurnTransition::ChunkReceived => self.apply_chunk(),
            TurnTransition::Complete => self.apply_complete(),
            TurnTransition::Fail(kind) => self.apply_fail(kind),
        }
    }

    fn apply_begin(&self) -> TurnTransitionResult {
        match self {
            Self::Sending | Self::Streaming => {
                Err(TurnTransitionRejection::AlreadyInFlight { state: *self })
            }
            Self::Idle | Self::Completed | Self::Failed(_) => Ok(Self::Sending),
        }
    }

    fn apply_chunk(&self) -> TurnTransitionResult {
        match self {
            Self::Sending | Self::Streaming => Ok(Self::Streaming),
            Self::Idle | Self::Completed | Self::Failed(_) => {
                Err(TurnTransitionRejection::NoTurnInFlight { state: *self })
            }
        }
    }

    fn apply_complete(&self) -> TurnTransitionResult {
        match self {
            // A stream with zero chunks may complete straight from `Sending`.
            Self::Sending | Self::Streaming => Ok(Self::Completed),
            Self::Idle | Self::Completed | Self::Failed(_) => {
                Err(TurnTransitionRejection::NoTurnInFlight { state: *self })
            }
        }
    }

    fn apply_fail(&self, kind: FailureKind) -> TurnTransitionResult {
        match self {
            Self::Sending | Self::Streaming => Ok(Self::Failed(kind)),
            Self::Idle | Self::Completed | Self::Failed(_) => {
                Err(TurnTransitionRejection::NoTurnInFlight { state: *self })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_every_state() {
        let state = TurnState::Idle;
        let state = state.apply(TurnTransition::Begin).unwrap();
        assert_eq!(state, TurnState::Sending);

        let state = state.apply(TurnTransition::ChunkReceived).unwrap();
        assert_eq!(state, TurnState::Streaming);

        // Chunk arrival is a self-loop once streaming.
        let state = state.apply(TurnTransition::ChunkReceived).unwrap();
        assert_eq!(state, TurnState::Streaming);

        let state = state.apply(TurnTransition::Complete).unwrap();
        assert_eq!(state, TurnState::Completed);
        assert!(state.is_terminal());
    }

    #[test]
    fn zero_chunk_stream_completes_from_sending() {
        let state = TurnState::Idle.apply(TurnTransition::Begin).unwrap();
        assert_eq!(state.apply(TurnTransition::Complete), Ok(TurnState::Completed));
    }

    #[test]
    fn begin_is_rejected_while_in_flight() {
        let sending = TurnState::Sending;
        assert_eq!(
            sending.apply(TurnTransition::Begin),
            Err(TurnTransitionRejection::AlreadyInFlight {
                state: TurnState::Sending
            })
        );

        let streaming = TurnState::Streaming;
        assert!(streaming.apply(TurnTransition::Begin).is_err());
    }

    #[test]
    fn terminal_states_reject_stream_transitions_but_allow_begin() {
        for terminal in [
            TurnState::Completed,
            TurnState::Failed(FailureKind::Upstream),
            TurnState::Failed(FailureKind::Cancelled),
        ] {
            assert_eq!(
                terminal.apply(TurnTransition::ChunkReceived),
                Err(TurnTransitionRejection::NoTurnInFlight { state: terminal })
            );
            assert!(terminal.apply(TurnTransition::Complete).is_err());
            assert!(
                terminal
                    .apply(TurnTransition::Fail(FailureKind::Upstream))
                    .is_err()
            );
            // The next turn may begin from any terminal state.
            assert_eq!(terminal.apply(TurnTransition::Begin), Ok(TurnState::Sending));
        }
    }

    #[test]
    fn idle_rejects_everything_but_begin() {
        let idle = TurnState::Idle;
        assert!(idle.apply(TurnTransition::ChunkReceived).is_err());
        assert!(idle.apply(TurnTransition::Complete).is_err());
        assert!(idle.apply(TurnTransition::Fail(FailureKind::Upstream)).is_err());
        assert!(!idle.is_in_flight());
    }

    #[test]
    fn failure_kind_is_recorded_in_the_terminal_state() {
        let state = TurnState::Streaming
            .apply(TurnTransition::Fail(FailureKind::Cancelled))
            .unwrap();
        assert_eq!(state, TurnState::Failed(FailureKind::Cancelled));
    }
}
