use crate::session::SessionId;
use thiserror::Error;

/// Terminal classification of one analysis session or backend call.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("session {0} was cancelled")]
    Cancelled(SessionId),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("backend error: {0}")]
    Domain(String),
}

impl AnalysisError {
    /// Text a front end should show for this outcome. Cancellation is not a
    /// failure and has no message.
    pub fn user_message(&self) -> Option<String> {
        match self {
            AnalysisError::Validation(err) => Some(err.to_string()),
            AnalysisError::Cancelled(_) => None,
            AnalysisError::Transport(_) => {
                Some("An error occurred: communication with the server failed.".to_string())
            }
            AnalysisError::Domain(message) => Some(format!("Error: {message}")),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("select an instrument first")]
    NoInstrument,

    #[error("select at least one topic or enter a keyword")]
    NoMarketTopic,

    #[error("select at least one report from the history")]
    NoReportsSelected,

    #[error("enter a question for the manual re-research")]
    EmptyQuestion,

    #[error("no analysis result to export; run an analysis first")]
    NothingToExport,

    #[error("no history entry at position {0}")]
    UnknownHistoryEntry(usize),

    #[error("no recent instrument at position {0}")]
    UnknownRecentEntry(usize),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response is not the expected JSON shape: {0}")]
    Decode(#[from] serde_json::Error),
}
