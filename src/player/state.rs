//! Player state management

/// Playback state machine
///
/// Transitions are validated so every caller agrees on the lifecycle:
/// `Closed → Opening → Ready → Playing ⇄ Paused → Closed`, with
/// `Previewing` as a transient excursion from Ready or Paused that returns
/// where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No stream bound.
    Closed,

    /// Open in progress (binding the stream handle, fetching metadata).
    Opening,

    /// Stream bound, buffers allocated, not yet playing.
    Ready,

    /// Per-cycle pulls are running.
    Playing,

    /// Pulls stopped, stream still bound.
    Paused,

    /// One decode-display-revert cycle in progress.
    Previewing,
}

impl PlayerState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PlayerState) -> bool {
        use PlayerState::*;

        match (self, target) {
            // From Closed
            (Closed, Opening) => true,

            // From Opening
            (Opening, Ready) => true,
            (Opening, Closed) => true, // open failed

            // From Ready
            (Ready, Playing) => true,
            (Ready, Previewing) => true,
            (Ready, Closed) => true,

            // From Playing
            (Playing, Paused) => true,
            (Playing, Closed) => true,

            // From Paused
            (Paused, Playing) => true,
            (Paused, Previewing) => true,
            (Paused, Closed) => true,

            // Previewing returns where it started
            (Previewing, Ready) => true,
            (Previewing, Paused) => true,

            // Self-transitions
            (a, b) if a == b => true,

            // All other transitions invalid
            _ => false,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PlayerState::Closed => "Closed",
            PlayerState::Opening => "Opening",
            PlayerState::Ready => "Ready",
            PlayerState::Playing => "Playing",
            PlayerState::Paused => "Paused",
            PlayerState::Previewing => "Previewing",
        }
    }

    /// A stream is bound in this state.
    pub fn is_open(&self) -> bool {
        !matches!(self, PlayerState::Closed | PlayerState::Opening)
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::Playing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, PlayerState::Paused)
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use PlayerState::*;

        assert!(Closed.can_transition_to(&Opening));
        assert!(Opening.can_transition_to(&Ready));
        assert!(Opening.can_transition_to(&Closed));
        assert!(Ready.can_transition_to(&Playing));
        assert!(Playing.can_transition_to(&Paused));
        assert!(Paused.can_transition_to(&Playing));
        assert!(Paused.can_transition_to(&Closed));

        // Preview excursions
        assert!(Ready.can_transition_to(&Previewing));
        assert!(Paused.can_transition_to(&Previewing));
        assert!(Previewing.can_transition_to(&Ready));
        assert!(Previewing.can_transition_to(&Paused));

        // Self-transitions
        assert!(Closed.can_transition_to(&Closed));
        assert!(Playing.can_transition_to(&Playing));
    }

    #[test]
    fn test_invalid_transitions() {
        use PlayerState::*;

        assert!(!Closed.can_transition_to(&Playing)); // must open first
        assert!(!Closed.can_transition_to(&Paused));
        assert!(!Playing.can_transition_to(&Ready)); // no way back to Ready
        assert!(!Playing.can_transition_to(&Previewing)); // pause first
        assert!(!Previewing.can_transition_to(&Playing));
    }

    #[test]
    fn test_state_checks() {
        use PlayerState::*;

        assert!(!Closed.is_open());
        assert!(!Opening.is_open());
        assert!(Ready.is_open());
        assert!(Playing.is_open());
        assert!(Playing.is_playing());
        assert!(!Paused.is_playing());
        assert!(Paused.is_paused());
    }
}
