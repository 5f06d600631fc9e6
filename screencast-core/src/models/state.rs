use std::fmt;

use serde::{Deserialize, Serialize};

/// Recording session lifecycle.
///
/// State transitions:
/// ```text
/// idle → preparing → recording ↔ paused
///            ↓           ↓        ↓
///          error ← stopping ← ────┘
///                      ↓
///                  completed
/// completed / error → idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Preparing,
    Recording,
    Paused,
    Stopping,
    Completed,
    Error,
}

impl SessionState {
    /// States reachable from `self` in one transition.
    pub fn allowed_next(self) -> &'static [SessionState] {
        use SessionState::*;
        match self {
            Idle => &[Preparing],
            Preparing => &[Recording, Error],
            Recording => &[Paused, Stopping],
            Paused => &[Recording, Stopping],
            Stopping => &[Completed, Error],
            Completed | Error => &[Idle],
        }
    }

    pub fn can_transition_to(self, to: SessionState) -> bool {
        self.allowed_next().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether a session in this state holds capture resources.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Preparing | Self::Recording | Self::Paused | Self::Stopping
        )
    }

    pub fn is_capturing(self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}
