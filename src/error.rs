//! Error taxonomy shared by every capability

use thiserror::Error;

/// Errors surfaced by query operations and capability initialization.
///
/// Best-effort operations (now playing updates, taskbar redraws) never return
/// these; they log and carry on.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The backend has not produced the queried data yet
    #[error("{0} is not available yet")]
    Unavailable(String),

    /// The backend returned a value of an unexpected shape
    #[error("unexpected property format: {0}")]
    FormatMismatch(String),

    /// The capability is not compiled for this platform
    #[error("{0} is not supported on this platform")]
    PlatformUnsupported(&'static str),

    /// An OS resource could not be acquired at startup
    #[error("failed to initialize {what}: {reason}")]
    InitializationFailure { what: &'static str, reason: String },

    /// A resize request matched zero windows
    #[error("no windows owned by pid {pid}")]
    NoMatchingWindows { pid: u32 },

    /// The windowing system rejected a request or the connection broke
    #[error("window system error: {0}")]
    WindowSystem(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn init(what: &'static str, reason: impl std::fmt::Display) -> Self {
        BridgeError::InitializationFailure {
            what,
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(BridgeError::Unavailable("af-metadata/astats".into()).is_transient());
        assert!(!BridgeError::FormatMismatch("list".into()).is_transient());
        assert!(!BridgeError::PlatformUnsupported("taskbar buttons").is_transient());
        assert!(!BridgeError::NoMatchingWindows { pid: 7 }.is_transient());
    }

    #[test]
    fn test_init_message() {
        let err = BridgeError::init("taskbar buttons", "no window handle");
        assert_eq!(
            err.to_string(),
            "failed to initialize taskbar buttons: no window handle"
        );
    }
}
