use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the engine. Every variant is scoped to a single
/// request; none of them is fatal to the process.
#[derive(Error, Debug)]
pub enum NextupError {
    #[error("nothing to watch: no eligible content in any category")]
    NoEligibleContent,

    #[error("all episodes of series {series_id} have been watched")]
    AllWatched { series_id: String },

    #[error("an active session already exists for {subject}")]
    Conflict { subject: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Only ever logged; enrichment degrades to an empty result.
    #[error("metadata enrichment timed out after {0:?}")]
    EnrichmentTimeout(Duration),

    #[error("invalid progress update: {0}")]
    InvalidProgress(String),

    #[error("invalid catalog data: {0}")]
    InvalidCatalog(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl NextupError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        NextupError::NotFound { kind, id: id.into() }
    }

    /// Errors the selection engine treats as "this category is empty"
    /// and recovers from by falling back to another category.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, NextupError::NoEligibleContent | NextupError::AllWatched { .. })
    }
}

pub type Result<T, E = NextupError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_errors_are_recoverable() {
        assert!(NextupError::NoEligibleContent.is_exhaustion());
        assert!(NextupError::AllWatched { series_id: "x".into() }.is_exhaustion());
        assert!(!NextupError::Conflict { subject: "x".into() }.is_exhaustion());
        assert!(!NextupError::Store(anyhow::anyhow!("boom")).is_exhaustion());
    }

    #[test]
    fn not_found_message_names_kind() {
        assert_eq!(NextupError::not_found("session", "42").to_string(), "session not found: 42");
    }
}
