//! Error taxonomy for a single workflow invocation.
//!
//! Every variant is terminal for the action that raised it and never touches
//! the selection state. An optional panel that simply does not apply is not an
//! error; see [`crate::view::PanelState::NotAvailable`].

use thiserror::Error;

use crate::request::RequestKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkbenchError {
    /// A factor must be chosen before this action can be built.
    #[error("select a factor before requesting {action}")]
    MissingSelection { action: RequestKind },

    /// A user input failed validation before any request was issued.
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// Network failure or non-success response code.
    #[error("{}", transport_text(.status, .message))]
    Transport { status: Option<u16>, message: String },

    /// The payload decoded but cannot be interpreted.
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },
}

pub type WorkbenchResult<T> = Result<T, WorkbenchError>;

fn transport_text(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) if message.is_empty() => format!("HTTP {}", code),
        Some(code) => format!("HTTP {}: {}", code, message),
        None => message.to_string(),
    }
}

impl WorkbenchError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Stable tag used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingSelection { .. } => "missing_selection",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Transport { .. } => "transport",
            Self::MalformedResponse { .. } => "malformed_response",
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_message_carries_status() {
        let err = WorkbenchError::transport(Some(500), "meta.json not found after training");
        assert_eq!(err.to_string(), "HTTP 500: meta.json not found after training");

        let bare = WorkbenchError::transport(Some(502), "");
        assert_eq!(bare.to_string(), "HTTP 502");

        let offline = WorkbenchError::transport(None, "connection refused");
        assert_eq!(offline.to_string(), "connection refused");
    }

    #[test]
    fn test_kinds_are_distinct() {
        let missing = WorkbenchError::MissingSelection {
            action: RequestKind::Train,
        };
        assert_eq!(missing.kind(), "missing_selection");
        assert_eq!(missing.to_string(), "select a factor before requesting train");
        assert!(WorkbenchError::malformed("x").is_malformed());
        assert!(!WorkbenchError::malformed("x").is_transport());
    }
}
