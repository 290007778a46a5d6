use crate::mode::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    InvalidPosition {
        track: u8,
        step: u8,
    },
    InvalidButton(u8),
    /// All lock slots are taken. Recoverable: free a lock and retry.
    PoolExhausted,
    TransitionBlocked {
        from: Mode,
        to: Mode,
    },
    InvalidMode,
    /// A parameter adjustment arrived while no step is held for editing
    NoActiveLock,
    InvalidParameterKind(u8),
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPosition { track, step } => {
                write!(f, "grid position (track {}, step {}) is out of range", track, step)
            }
            Self::InvalidButton(button) => write!(f, "button id {} is out of range", button),
            Self::PoolExhausted => f.write_str("no free parameter lock slot left"),
            Self::TransitionBlocked { from, to } => write!(
                f,
                "mode transition from {} to {} is not allowed",
                from.name(),
                to.name()
            ),
            Self::InvalidMode => f.write_str("operation is not valid in the current mode"),
            Self::NoActiveLock => f.write_str("no parameter lock session is active"),
            Self::InvalidParameterKind(kind) => write!(f, "unknown parameter kind {}", kind),
        }
    }
}

impl std::error::Error for GridError {}
