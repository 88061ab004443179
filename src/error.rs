use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One rejected operation inside a bulk commit, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkFailure {
    /// Backend id of the row, absent for creates
    #[serde(default)]
    pub id: Option<i64>,
    pub action: String,
    pub error: String,
}

impl std::fmt::Display for BulkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} {}: {}", self.action, id, self.error),
            None => write!(f, "{}: {}", self.action, self.error),
        }
    }
}

/// Errors surfaced by the grid controller and the REST client.
///
/// `Network` and `Schema` are fatal to the initial load; everything else only
/// fails the action that produced it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{action} failed: {message}")]
    Operation { action: String, message: String },

    #[error("bulk save failed: {}", join_failures(.0))]
    BulkRejected(Vec<BulkFailure>),

    #[error("failed to delete row {id}: {message}")]
    DeleteAborted {
        id: i64,
        /// Rows removed before the failure; they stay deleted
        deleted: Vec<i64>,
        message: String,
    },
}

impl Error {
    pub(crate) fn operation(action: &str, message: impl Into<String>) -> Self {
        Error::Operation {
            action: action.to_string(),
            message: message.into(),
        }
    }

    /// True for the errors that block the grid from rendering.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Schema(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

fn join_failures(failures: &[BulkFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
