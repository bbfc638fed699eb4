//! Card session lifecycle with validated transitions.

use crate::error::InkError;

/// The current phase of a card session.
///
/// ```text
///  Idle ──► Authenticated ──► Transferring ──► Reconnecting ──► Authenticated
///                 │                 ▲                               │
///                 │                 └─────────── (retry) ───────────┤
///                 ▼                                                 ▼
///          RefreshRequested ◄───────────────────────────────────────┘
///                 │
///                 ▼
///             Polling ──► Complete          (any) ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Connected but not authenticated.
    #[default]
    Idle,
    /// The card accepted the unlock key.
    Authenticated,
    /// Image fragments are being streamed.
    Transferring,
    /// The physical link is being cycled.
    Reconnecting,
    /// The card accepted the refresh trigger.
    RefreshRequested,
    /// Waiting for the panel to finish redrawing.
    Polling,
    /// The panel finished redrawing.
    Complete,
    /// A terminal error occurred; the session cannot continue.
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Authenticated => write!(f, "Authenticated"),
            Self::Transferring => write!(f, "Transferring"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::RefreshRequested => write!(f, "RefreshRequested"),
            Self::Polling => write!(f, "Polling"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Transferring)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Authenticated`.
    ///
    /// Valid from: `Idle`, `Reconnecting`, `Authenticated` (re-auth).
    pub fn authenticated(&mut self) -> Result<(), InkError> {
        match self {
            Self::Idle | Self::Reconnecting | Self::Authenticated => {
                *self = Self::Authenticated;
                Ok(())
            }
            _ => Err(InkError::InvalidTransition(
                "cannot authenticate: not Idle, Authenticated or Reconnecting",
            )),
        }
    }

    /// Transition to `Transferring`.
    ///
    /// Valid from: `Authenticated`.
    pub fn begin_transfer(&mut self) -> Result<(), InkError> {
        match self {
            Self::Authenticated => {
                *self = Self::Transferring;
                Ok(())
            }
            _ => Err(InkError::InvalidTransition(
                "cannot transfer: not Authenticated",
            )),
        }
    }

    /// Transition to `Reconnecting`.
    ///
    /// Valid from: `Transferring`, `Authenticated`.
    pub fn begin_reconnect(&mut self) -> Result<(), InkError> {
        match self {
            Self::Transferring | Self::Authenticated => {
                *self = Self::Reconnecting;
                Ok(())
            }
            _ => Err(InkError::InvalidTransition(
                "cannot reconnect: not Transferring or Authenticated",
            )),
        }
    }

    /// Transition to `RefreshRequested`.
    ///
    /// Valid from: `Authenticated`.
    pub fn refresh_requested(&mut self) -> Result<(), InkError> {
        match self {
            Self::Authenticated => {
                *self = Self::RefreshRequested;
                Ok(())
            }
            _ => Err(InkError::InvalidTransition(
                "cannot refresh: not Authenticated",
            )),
        }
    }

    /// Transition to `Polling`.
    ///
    /// Valid from: `RefreshRequested`.
    pub fn begin_polling(&mut self) -> Result<(), InkError> {
        match self {
            Self::RefreshRequested => {
                *self = Self::Polling;
                Ok(())
            }
            _ => Err(InkError::InvalidTransition(
                "cannot poll: refresh not requested",
            )),
        }
    }

    /// Transition to `Complete`.
    ///
    /// Valid from: `Polling`.
    pub fn complete(&mut self) -> Result<(), InkError> {
        match self {
            Self::Polling => {
                *self = Self::Complete;
                Ok(())
            }
            _ => Err(InkError::InvalidTransition("cannot complete: not Polling")),
        }
    }

    /// Force to `Failed` regardless of current state.
    pub fn fail(&mut self) {
        *self = Self::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut s = SessionState::default();
        assert_eq!(s, SessionState::Idle);
        s.authenticated().unwrap();
        s.begin_transfer().unwrap();
        s.begin_reconnect().unwrap();
        s.authenticated().unwrap();
        s.refresh_requested().unwrap();
        s.begin_polling().unwrap();
        s.complete().unwrap();
        assert!(s.is_terminal());
    }

    #[test]
    fn retry_returns_to_transferring() {
        let mut s = SessionState::Transferring;
        s.begin_reconnect().unwrap();
        s.authenticated().unwrap();
        s.begin_transfer().unwrap();
        assert_eq!(s, SessionState::Transferring);
    }

    #[test]
    fn invalid_transitions() {
        let mut s = SessionState::Idle;
        assert!(s.begin_transfer().is_err());
        assert!(s.refresh_requested().is_err());
        assert!(s.complete().is_err());
        assert_eq!(s, SessionState::Idle);

        let mut s = SessionState::Transferring;
        assert!(s.refresh_requested().is_err());
    }

    #[test]
    fn fail_from_anywhere() {
        for mut s in [
            SessionState::Idle,
            SessionState::Transferring,
            SessionState::Polling,
            SessionState::Complete,
        ] {
            s.fail();
            assert_eq!(s, SessionState::Failed);
            assert!(s.authenticated().is_err());
        }
    }

    #[test]
    fn display() {
        assert_eq!(SessionState::RefreshRequested.to_string(), "RefreshRequested");
    }
}
