//! Warm-up gate for a monitoring session.
//!
//! The first line read after connecting may be a fragment caught
//! mid-transmission. It is still decoded and reported, but nothing derived
//! from it is persisted. Every later line is eligible for persistence.

/// Lifecycle of one session. `Armed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    WarmingUp,
    Armed,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(self) -> bool {
        matches!(self, SessionState::Armed)
    }

    /// Record that a line has been fully processed, whatever its outcome.
    /// Returns `true` on the transition into `Armed`.
    pub fn mark_processed(&mut self) -> bool {
        match self {
            SessionState::WarmingUp => {
                *self = SessionState::Armed;
                true
            }
            SessionState::Armed => false,
        }
    }
}
