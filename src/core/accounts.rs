//! Multi-account balance aggregation
//!
//! This module provides the [`AccountAggregator`], which assembles the
//! portfolio view for a user: every linked account's balances and
//! institution metadata, plus order-independent portfolio totals. Detail
//! reads additionally run a full transaction sync for one account.
//!
//! # Fan-out
//!
//! Per-account fetches are independent, so listing fans out on a
//! [`JoinSet`] bounded by the configured concurrency limit to avoid
//! saturating the upstream's rate limits. The returned snapshot list is in
//! task-completion order (callers must not rely on it), but the totals are
//! commutative sums and therefore deterministic for identical underlying
//! data.
//!
//! # Partial-failure policy
//!
//! Listing is fail-fast: the first per-account failure aborts the whole
//! call with [`LinkError::PartialAggregationFailure`] naming the failing
//! linked account, and remaining in-flight fetches are shut down. A partial
//! listing would silently understate the portfolio totals, which is worse
//! than a retryable error. Zero linked accounts is a successful empty
//! listing, never an error.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clients::{AggregatorClient, BankAccountStore};
use crate::config::LinkConfig;
use crate::core::institutions::InstitutionResolver;
use crate::core::run_cancellable;
use crate::core::sync_engine::TransactionSyncEngine;
use crate::types::{AccountDetail, AccountList, AccountSnapshot, LinkError, LinkedAccount};

/// Assembles per-user account listings and per-account detail views
pub struct AccountAggregator {
    aggregator: Arc<dyn AggregatorClient>,
    store: Arc<dyn BankAccountStore>,
    institutions: Arc<InstitutionResolver>,
    sync_engine: TransactionSyncEngine,
    max_concurrency: usize,
}

impl AccountAggregator {
    /// Create an aggregator over the given collaborators
    pub fn new(
        aggregator: Arc<dyn AggregatorClient>,
        store: Arc<dyn BankAccountStore>,
        institutions: Arc<InstitutionResolver>,
        config: &LinkConfig,
    ) -> Self {
        let sync_engine = TransactionSyncEngine::new(Arc::clone(&aggregator));
        AccountAggregator {
            aggregator,
            store,
            institutions,
            sync_engine,
            // A zero limit would deadlock the fan-out loop.
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// List every visible account for a user, with portfolio totals
    ///
    /// Loads the user's non-revoked [`LinkedAccount`] records, fetches each
    /// account's first upstream record and institution metadata
    /// concurrently, and sums current balances into the totals.
    ///
    /// # Errors
    ///
    /// - [`LinkError::PartialAggregationFailure`] if any account's fetch
    ///   fails (fail-fast; names the failing linked account)
    /// - [`LinkError::Cancelled`] when the caller's token fires
    /// - store errors propagate unchanged
    pub async fn list_accounts(
        &self,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AccountList, LinkError> {
        let banks = self.store.get_banks_by_user(user_id).await?;
        let visible: Vec<LinkedAccount> =
            banks.into_iter().filter(|bank| !bank.is_revoked()).collect();

        if visible.is_empty() {
            debug!(user_id, "user has no linked accounts");
            return Ok(AccountList::empty());
        }

        let mut join_set: JoinSet<(String, Result<AccountSnapshot, LinkError>)> = JoinSet::new();
        let mut snapshots: Vec<AccountSnapshot> = Vec::with_capacity(visible.len());

        for bank in visible {
            let aggregator = Arc::clone(&self.aggregator);
            let institutions = Arc::clone(&self.institutions);
            let task_cancel = cancel.clone();
            join_set.spawn(async move {
                let linked_account_id = bank.internal_id.clone();
                let result =
                    snapshot_for(aggregator, institutions, &bank, &task_cancel).await;
                (linked_account_id, result)
            });

            // Limit concurrency: wait for one fetch before spawning more.
            if join_set.len() >= self.max_concurrency {
                if let Some(joined) = join_set.join_next().await {
                    match unpack_snapshot(joined) {
                        Ok(snapshot) => snapshots.push(snapshot),
                        Err(error) => {
                            join_set.shutdown().await;
                            return Err(error);
                        }
                    }
                }
            }
        }

        while let Some(joined) = join_set.join_next().await {
            match unpack_snapshot(joined) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(error) => {
                    join_set.shutdown().await;
                    return Err(error);
                }
            }
        }

        let total_current_balance: Decimal =
            snapshots.iter().map(|snapshot| snapshot.current_balance).sum();

        Ok(AccountList {
            total_banks: snapshots.len(),
            total_current_balance,
            data: snapshots,
        })
    }

    /// Load one account's snapshot plus its full synced transaction history
    ///
    /// Transactions come back sorted by date descending via the sync
    /// engine. Revoked records read as missing.
    ///
    /// # Errors
    ///
    /// - [`LinkError::NotFound`] when no such (visible) record exists
    /// - sync and upstream errors propagate unchanged
    pub async fn get_account_detail(
        &self,
        linked_account_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AccountDetail, LinkError> {
        let bank = self.store.get_bank_by_document_id(linked_account_id).await?;
        if bank.is_revoked() {
            return Err(LinkError::not_found("bank record", linked_account_id));
        }

        let account = snapshot_for(
            Arc::clone(&self.aggregator),
            Arc::clone(&self.institutions),
            &bank,
            cancel,
        )
        .await?;
        let transactions = self.sync_engine.sync(&bank.access_token, cancel).await?;

        Ok(AccountDetail { account, transactions })
    }
}

/// Map one joined fan-out task onto the fail-fast policy.
///
/// Cancellation passes through unchanged; anything else becomes a
/// `PartialAggregationFailure` naming the linked account.
fn unpack_snapshot(
    joined: Result<(String, Result<AccountSnapshot, LinkError>), tokio::task::JoinError>,
) -> Result<AccountSnapshot, LinkError> {
    let (linked_account_id, result) = joined
        .map_err(|error| LinkError::aggregation_failed("unknown", format!("task join error: {error}")))?;

    match result {
        Ok(snapshot) => Ok(snapshot),
        Err(cancelled @ LinkError::Cancelled { .. }) => Err(cancelled),
        Err(other) => Err(LinkError::aggregation_failed(&linked_account_id, other)),
    }
}

/// Fetch one linked account's snapshot: first upstream account record plus
/// resolved institution metadata.
///
/// The upstream account-list call may return several sub-accounts per
/// credential; exactly the first is taken, matching the one-account-per-link
/// invariant enforced at link time.
async fn snapshot_for(
    aggregator: Arc<dyn AggregatorClient>,
    institutions: Arc<InstitutionResolver>,
    bank: &LinkedAccount,
    cancel: &CancellationToken,
) -> Result<AccountSnapshot, LinkError> {
    let response = run_cancellable(
        cancel,
        "accounts_get",
        aggregator.accounts_get(&bank.access_token),
    )
    .await?;

    let account = response
        .accounts
        .into_iter()
        .next()
        .ok_or_else(|| LinkError::not_found("account", &bank.external_account_id))?;
    let institution_id = response.institution_id.ok_or_else(|| {
        LinkError::upstream("aggregator", "account response carried no institution id")
    })?;

    let institution = run_cancellable(
        cancel,
        "institution_resolve",
        institutions.resolve(&institution_id),
    )
    .await?;

    Ok(AccountSnapshot {
        id: account.account_id,
        available_balance: account.available_balance,
        current_balance: account.current_balance,
        institution_id: institution.institution_id,
        name: account.name,
        official_name: account.official_name,
        mask: account.mask,
        kind: account.kind,
        subtype: account.subtype,
        linked_account_id: bank.internal_id.clone(),
        shareable_id: bank.shareable_id.clone(),
    })
}
