//! Error type of the summarize pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummarizeError {
    /// The named collection does not exist for this account.
    #[error("collection not found: {name} (account {account})")]
    CollectionNotFound { name: String, account: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The collection store failed while loading or querying.
    #[error("collection store error: {0:#}")]
    Store(anyhow::Error),

    /// The generation engine failed; surfaced unchanged, never retried.
    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),
}
