//! Error types for the Bank Link Engine
//!
//! This module defines all error types that can occur while linking
//! accounts, synchronizing transactions, and aggregating balances.
//!
//! # Error Categories
//!
//! - **Upstream Errors**: transport failures or missing resources at the
//!   aggregator, payment processor, or persistent store
//! - **Sync Errors**: aborted or stalled incremental transaction sync
//! - **Link Errors**: a failed step of the link-exchange workflow
//! - **Aggregation Errors**: a per-account failure during listing
//! - **Local Errors**: identifier codec misuse, invalid configuration, and
//!   caller-initiated cancellation
//!
//! Propagation policy: every component surfaces these typed errors to its
//! caller. No component converts an error into an empty or zero success
//! value, so "no accounts linked yet" (an empty listing) and "failed to
//! load accounts" (an error) never collapse to the same shape.

use thiserror::Error;

/// Main error type for the link engine
///
/// This enum represents all possible errors that can occur during account
/// linking, transaction sync, and balance aggregation. Each variant
/// includes relevant context to help diagnose and resolve the issue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    /// An external collaborator could not be reached or answered with a
    /// transport-level failure
    ///
    /// Not retried automatically; retries are a concern of the caller or
    /// surrounding middleware.
    #[error("Upstream {service} unavailable: {message}")]
    UpstreamUnavailable {
        /// Which collaborator failed (aggregator, payments, store)
        service: String,
        /// Description of the transport failure
        message: String,
    },

    /// A referenced resource does not exist upstream or in the store
    #[error("{resource} '{id}' not found")]
    NotFound {
        /// The kind of resource (institution, account, bank record)
        resource: String,
        /// The id that was looked up
        id: String,
    },

    /// Transaction sync aborted on a transport error
    ///
    /// Sync is atomic per invocation: partially-accumulated pages are
    /// discarded and no partial result is returned. Callers may retry the
    /// whole sync.
    #[error("Transaction sync failed: {message}")]
    SyncFailed {
        /// Description of the underlying failure
        message: String,
    },

    /// Transaction sync made no progress while the upstream kept reporting
    /// more pages
    ///
    /// Guards against an upstream bug or stall that would otherwise loop
    /// forever.
    #[error("Transaction sync stalled after {pages} consecutive pages without progress")]
    SyncStalled {
        /// Number of consecutive no-progress pages observed
        pages: u32,
    },

    /// The identifier codec was misused or its key is unavailable
    #[error("Identifier encoding failed: {message}")]
    EncodingError {
        /// Description of the codec failure
        message: String,
    },

    /// A step of the link-exchange workflow failed
    ///
    /// The workflow is sequential and non-resumable: any step failing
    /// aborts the whole exchange, and no partial record is persisted.
    #[error("Link exchange failed at {stage}: {message}")]
    LinkExchangeFailed {
        /// The workflow stage that failed
        stage: String,
        /// Description of the failure
        message: String,
    },

    /// Funding-source provisioning succeeded without returning a reference
    ///
    /// A distinct kind so callers can tell "the processor rejected us"
    /// from "the processor answered but handed back nothing usable".
    /// The workflow never persists an incomplete record in this case.
    #[error("Funding source provisioning for account {account_id} returned no reference")]
    MissingFundingSource {
        /// The aggregator-side account id being provisioned
        account_id: String,
    },

    /// One of N accounts failed while listing a user's portfolio
    ///
    /// Listing is fail-fast: a single per-account failure aborts the whole
    /// call rather than silently understating the totals.
    #[error("Aggregation failed for linked account {linked_account_id}: {message}")]
    PartialAggregationFailure {
        /// Document id of the linked account whose fetch failed
        linked_account_id: String,
        /// Description of the per-account failure
        message: String,
    },

    /// The caller's cancellation signal fired
    ///
    /// In-flight upstream calls are abandoned and no partial result is
    /// returned.
    #[error("{operation} cancelled by caller")]
    Cancelled {
        /// The operation that was cancelled
        operation: String,
    },

    /// The engine configuration is unusable
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration problem
        message: String,
    },
}

// Helper functions for creating common errors

impl LinkError {
    /// Create an UpstreamUnavailable error
    pub fn upstream(service: &str, message: impl ToString) -> Self {
        LinkError::UpstreamUnavailable {
            service: service.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(resource: &str, id: &str) -> Self {
        LinkError::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    /// Create a SyncFailed error
    pub fn sync_failed(message: impl ToString) -> Self {
        LinkError::SyncFailed {
            message: message.to_string(),
        }
    }

    /// Create a SyncStalled error
    pub fn sync_stalled(pages: u32) -> Self {
        LinkError::SyncStalled { pages }
    }

    /// Create an EncodingError
    pub fn encoding(message: impl ToString) -> Self {
        LinkError::EncodingError {
            message: message.to_string(),
        }
    }

    /// Create a LinkExchangeFailed error
    pub fn exchange_failed(stage: &str, message: impl ToString) -> Self {
        LinkError::LinkExchangeFailed {
            stage: stage.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a MissingFundingSource error
    pub fn missing_funding_source(account_id: &str) -> Self {
        LinkError::MissingFundingSource {
            account_id: account_id.to_string(),
        }
    }

    /// Create a PartialAggregationFailure error
    pub fn aggregation_failed(linked_account_id: &str, message: impl ToString) -> Self {
        LinkError::PartialAggregationFailure {
            linked_account_id: linked_account_id.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a Cancelled error
    pub fn cancelled(operation: &str) -> Self {
        LinkError::Cancelled {
            operation: operation.to_string(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl ToString) -> Self {
        LinkError::InvalidConfig {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::upstream_unavailable(
        LinkError::UpstreamUnavailable { service: "aggregator".to_string(), message: "connection refused".to_string() },
        "Upstream aggregator unavailable: connection refused"
    )]
    #[case::not_found(
        LinkError::NotFound { resource: "institution".to_string(), id: "ins-9".to_string() },
        "institution 'ins-9' not found"
    )]
    #[case::sync_failed(
        LinkError::SyncFailed { message: "timeout".to_string() },
        "Transaction sync failed: timeout"
    )]
    #[case::sync_stalled(
        LinkError::SyncStalled { pages: 2 },
        "Transaction sync stalled after 2 consecutive pages without progress"
    )]
    #[case::encoding_error(
        LinkError::EncodingError { message: "empty input".to_string() },
        "Identifier encoding failed: empty input"
    )]
    #[case::link_exchange_failed(
        LinkError::LinkExchangeFailed { stage: "public_token_exchange".to_string(), message: "invalid token".to_string() },
        "Link exchange failed at public_token_exchange: invalid token"
    )]
    #[case::missing_funding_source(
        LinkError::MissingFundingSource { account_id: "acct-1".to_string() },
        "Funding source provisioning for account acct-1 returned no reference"
    )]
    #[case::partial_aggregation_failure(
        LinkError::PartialAggregationFailure { linked_account_id: "doc-1".to_string(), message: "institution 'ins-9' not found".to_string() },
        "Aggregation failed for linked account doc-1: institution 'ins-9' not found"
    )]
    #[case::cancelled(
        LinkError::Cancelled { operation: "list_accounts".to_string() },
        "list_accounts cancelled by caller"
    )]
    #[case::invalid_config(
        LinkError::InvalidConfig { message: "codec key must be 32 bytes".to_string() },
        "Invalid configuration: codec key must be 32 bytes"
    )]
    fn test_error_display(#[case] error: LinkError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::upstream(
        LinkError::upstream("payments", "503 Service Unavailable"),
        LinkError::UpstreamUnavailable { service: "payments".to_string(), message: "503 Service Unavailable".to_string() }
    )]
    #[case::not_found(
        LinkError::not_found("bank record", "doc-404"),
        LinkError::NotFound { resource: "bank record".to_string(), id: "doc-404".to_string() }
    )]
    #[case::sync_stalled(
        LinkError::sync_stalled(2),
        LinkError::SyncStalled { pages: 2 }
    )]
    #[case::exchange_failed(
        LinkError::exchange_failed("accounts_get", "no accounts returned"),
        LinkError::LinkExchangeFailed { stage: "accounts_get".to_string(), message: "no accounts returned".to_string() }
    )]
    #[case::cancelled(
        LinkError::cancelled("transaction_sync"),
        LinkError::Cancelled { operation: "transaction_sync".to_string() }
    )]
    fn test_helper_functions(#[case] result: LinkError, #[case] expected: LinkError) {
        assert_eq!(result, expected);
    }
}
