//! Error taxonomy for the binding layer.
//!
//! | Variant                          | Raised when                                   |
//! |----------------------------------|-----------------------------------------------|
//! | [`TkError::Interpreter`]         | the interpreter rejected a submitted command  |
//! | [`TkError::TypeConversion`]      | a result could not be read as the asked type  |
//! | [`TkError::Range`]               | list or argument index out of range           |
//! | [`TkError::UnknownCallback`]     | a generated command lost its backing slot     |
//! | [`TkError::Config`]              | an invalid configuration value                |
//! | [`TkError::Io`]                  | reading a script or config file failed        |
//!
//! `UnknownCallback` never reaches host code through the normal call stack:
//! the callback bridge turns it into a failed interpreter command.

use crate::session::ErrorScope;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TkError>;

/// Message the interpreter sees when a stale callback name is invoked.
pub const UNKNOWN_CALLBACK_MSG: &str = "Trying to invoke non-existent callback";

#[derive(Debug, thiserror::Error)]
pub enum TkError {
    /// Non-success status from the embedded interpreter.
    ///
    /// While an `Interpreter` error produced by a session is alive, that
    /// session suppresses drop-time evaluation of pending commands.
    #[error("{message}")]
    Interpreter {
        message: String,
        scope: Option<ErrorScope>,
    },

    #[error("{0}")]
    TypeConversion(String),

    #[error("{0}")]
    Range(String),

    #[error("{}", UNKNOWN_CALLBACK_MSG)]
    UnknownCallback,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TkError {
    /// Interpreter error not tied to any session (no suppression scope).
    pub fn interpreter(message: impl Into<String>) -> Self {
        TkError::Interpreter { message: message.into(), scope: None }
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        TkError::TypeConversion(message.into())
    }

    pub fn range(message: impl Into<String>) -> Self {
        TkError::Range(message.into())
    }

    /// `true` for [`TkError::Interpreter`].
    pub fn is_interpreter(&self) -> bool {
        matches!(self, TkError::Interpreter { .. })
    }

    /// Drop the fatal-error scope but keep the message.
    ///
    /// Use this before storing an interpreter error long-term, otherwise the
    /// owning session keeps skipping deferred evaluations.
    pub fn detach(self) -> Self {
        match self {
            TkError::Interpreter { message, .. } => TkError::interpreter(message),
            other => other,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_raw_interpreter_text() {
        let e = TkError::interpreter("invalid command name \"foo\"");
        assert_eq!(e.to_string(), "invalid command name \"foo\"");
        assert!(e.is_interpreter());
    }

    #[test]
    fn unknown_callback_message() {
        assert_eq!(TkError::UnknownCallback.to_string(), UNKNOWN_CALLBACK_MSG);
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: TkError = io.into();
        assert!(matches!(e, TkError::Io(_)));
        assert!(!e.is_interpreter());
    }

    #[test]
    fn detach_keeps_message() {
        let e = TkError::interpreter("boom").detach();
        assert!(matches!(&e, TkError::Interpreter { scope: None, message } if message == "boom"));
    }
}
