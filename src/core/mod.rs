//! Core business logic module
//!
//! This module contains the core account-linking and synchronization
//! components:
//! - `sync_engine` - Cursor-driven incremental transaction sync
//! - `accounts` - Multi-account balance aggregation and detail reads
//! - `institutions` - Institution metadata resolution with a per-process cache
//! - `link` - The account-linking lifecycle workflow

pub mod accounts;
pub mod institutions;
pub mod link;
pub mod sync_engine;

pub use accounts::AccountAggregator;
pub use institutions::InstitutionResolver;
pub use link::{LinkLifecycleManager, LinkUser};
pub use sync_engine::TransactionSyncEngine;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::types::LinkError;

/// Race an upstream call against the caller's cancellation signal.
///
/// Every upstream network call is a suspension point; when the token fires
/// first, the in-flight call is dropped and [`LinkError::Cancelled`] is
/// surfaced instead of a partial result.
pub(crate) async fn run_cancellable<T, F>(
    cancel: &CancellationToken,
    operation: &str,
    fut: F,
) -> Result<T, LinkError>
where
    F: Future<Output = Result<T, LinkError>>,
{
    tokio::select! {
        // Biased so an already-cancelled token wins over a ready response.
        biased;
        _ = cancel.cancelled() => Err(LinkError::cancelled(operation)),
        result = fut => result,
    }
}
