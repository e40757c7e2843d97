use std::fmt::{Display, Formatter};

/// Errors surfaced by an observer round.
///
/// Per-action validation failures are not errors; the dispatcher records them as
/// rejected outcomes and keeps the batch going.
#[derive(Debug)]
pub enum ObserverError {
    /// Endpoint, key or model missing from the API configuration.
    Config(String),
    /// Backend answered with a non-2xx status.
    Http { status: u16, body: String },
    /// Backend answered 2xx but no reply text could be extracted.
    EmptyReply,
    /// Model output is not a JSON action array.
    Format(String),
    Transport(reqwest::Error),
    Json(serde_json::Error),
    Storage(String),
    GroupNotFound(String),
    AlreadyGenerating(String),
    /// Group creation input is unusable (empty roster, duplicate names).
    InvalidRoster(String),
}

impl Display for ObserverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ObserverError::Config(s) => write!(f, "API configuration incomplete: {}", s),
            ObserverError::Http { status, body } => {
                write!(f, "API request failed: {} - {}", status, body)
            }
            ObserverError::EmptyReply => write!(f, "API returned an empty reply"),
            ObserverError::Format(s) => write!(f, "Model reply has an invalid format: {}", s),
            ObserverError::Transport(e) => write!(f, "{}", e),
            ObserverError::Json(e) => write!(f, "{}", e),
            ObserverError::Storage(s) => write!(f, "Storage error: {}", s),
            ObserverError::GroupNotFound(id) => write!(f, "Group {} not found", id),
            ObserverError::AlreadyGenerating(id) => {
                write!(f, "Group {} is already generating", id)
            }
            ObserverError::InvalidRoster(s) => write!(f, "Invalid group roster: {}", s),
        }
    }
}

impl std::error::Error for ObserverError {}

impl From<reqwest::Error> for ObserverError {
    fn from(value: reqwest::Error) -> Self {
        ObserverError::Transport(value)
    }
}

impl From<serde_json::Error> for ObserverError {
    fn from(value: serde_json::Error) -> Self {
        ObserverError::Json(value)
    }
}

impl From<rusqlite::Error> for ObserverError {
    fn from(value: rusqlite::Error) -> Self {
        ObserverError::Storage(value.to_string())
    }
}

impl From<String> for ObserverError {
    fn from(value: String) -> Self {
        ObserverError::Storage(value)
    }
}

impl From<&str> for ObserverError {
    fn from(value: &str) -> Self {
        ObserverError::Storage(value.to_string())
    }
}
