//! Remote stats API access.
//!
//! Everything that talks to the upstream service lives here: the HTTP
//! client, the batching query pool, and the pagination helper. Remote
//! documents stay as `serde_json::Value` until the pipeline distills
//! them into the crate's own models.

pub mod client;
pub mod pager;
pub mod pool;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{ApiClient, RemoteSource};
pub use pager::collect_paginated;
pub use pool::QueryPool;

use serde_json::Value;
use thiserror::Error;

/// Cache lifetime (minutes) for immutable historical data: group
/// metadata and finished-match reports never change.
pub const TTL_IMMUTABLE: i64 = 720 * 60;

/// Cache lifetime (minutes) for data that moves as people play:
/// accounts, activity histories, roster pages.
pub const TTL_VOLATILE: i64 = 8 * 60;

/// Cache lifetime (minutes) for a page that may still be growing.
pub const TTL_PAGE_TAIL: i64 = 60;

/// Soft business code: the account exists upstream but cannot be
/// resolved. Callers produce a default report instead of an error.
pub const SOFT_UNRESOLVED_ACCOUNT: &str = "UserCannotResolveCentralAccount";

/// Failure taxonomy for the query pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A required input was missing; no network call was issued.
    #[error("missing required input: {0}")]
    MissingInput(&'static str),
    /// The upstream service answered with a business error code.
    #[error("upstream reported {0}")]
    Upstream(String),
    /// The request itself failed (timeout, connection, bad payload).
    #[error("server request failed: {0}")]
    Transport(String),
    /// A paginated walk never saw the exhaustion signal.
    #[error("pagination never reported completion")]
    PageOverflow,
}

impl QueryError {
    /// The error code carried by the result envelope.
    pub fn code(&self) -> String {
        match self {
            QueryError::MissingInput(what) => format!("Internal:{what}"),
            QueryError::Upstream(code) => code.clone(),
            QueryError::Transport(_) => "ServerRequestException".to_string(),
            QueryError::PageOverflow => "Internal:PaginationOverflow".to_string(),
        }
    }
}

/// Read an identifier the upstream emits as either a JSON string or a
/// bare number.
pub fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
