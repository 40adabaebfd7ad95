//! Incremental transaction sync engine
//!
//! This module provides the [`TransactionSyncEngine`], which pages the
//! upstream aggregator's transaction deltas into a complete, deduplicated,
//! time-ordered transaction set for one account.
//!
//! # State machine
//!
//! A sync session is an explicit two-state machine:
//!
//! ```text
//! SYNCING --(page with has_more == true)--> SYNCING
//! SYNCING --(page with has_more == false)--> COMPLETE
//! ```
//!
//! Termination would otherwise rely entirely on upstream honesty, so the
//! engine carries a stall guard: a page that reports more data but
//! contributes no previously-unseen transaction id counts as a no-progress
//! page, and two of those in a row abort the session with
//! [`LinkError::SyncStalled`].
//!
//! # Atomicity
//!
//! A session is all-or-nothing: any transport failure discards the pages
//! accumulated so far and surfaces [`LinkError::SyncFailed`]. Callers may
//! retry the whole sync; re-running against identical upstream responses
//! yields an identical final set (upsert-by-id is idempotent).

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clients::AggregatorClient;
use crate::core::run_cancellable;
use crate::types::{LinkError, Transaction};

/// How many consecutive no-progress pages are tolerated before the session
/// aborts with `SyncStalled`.
const MAX_STALLED_PAGES: u32 = 2;

/// Sync session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    /// The cursor has more pages
    Syncing,
    /// The cursor is exhausted
    Complete,
}

/// Cursor-driven incremental transaction sync
///
/// Stateless between sessions: all session state (cursor, accumulated
/// transactions, stall counter) lives on the stack of [`sync`], so one
/// engine can serve any number of accounts. Cursors are scoped to one
/// access credential and never shared across accounts.
///
/// [`sync`]: TransactionSyncEngine::sync
pub struct TransactionSyncEngine {
    aggregator: Arc<dyn AggregatorClient>,
}

impl TransactionSyncEngine {
    /// Create an engine over the given aggregator client
    pub fn new(aggregator: Arc<dyn AggregatorClient>) -> Self {
        TransactionSyncEngine { aggregator }
    }

    /// Build the complete transaction set for one account
    ///
    /// Pages the upstream from the start of the cursor space until it
    /// reports no more data, upserting each added transaction by id
    /// (last-write-wins: an upstream amendment re-sends an id and the
    /// latest version replaces the earlier one).
    ///
    /// # Returns
    ///
    /// Transactions sorted by date descending. Equal dates keep their
    /// first-insertion order (stable sort), so reruns over the same data
    /// produce the same sequence.
    ///
    /// # Errors
    ///
    /// - [`LinkError::SyncFailed`] on any transport failure; accumulated
    ///   pages are discarded
    /// - [`LinkError::SyncStalled`] when the upstream keeps reporting more
    ///   data without making progress
    /// - [`LinkError::Cancelled`] when the caller's token fires
    pub async fn sync(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Transaction>, LinkError> {
        let mut session = SyncSession::new();
        let mut cursor: Option<String> = None;
        let mut state = SyncState::Syncing;
        let mut stalled_pages: u32 = 0;
        let mut page_count: u32 = 0;

        while state == SyncState::Syncing {
            let page = run_cancellable(
                cancel,
                "transaction_sync",
                self.aggregator.transactions_sync(access_token, cursor.as_deref()),
            )
            .await
            .map_err(|error| match error {
                cancelled @ LinkError::Cancelled { .. } => cancelled,
                other => LinkError::sync_failed(other),
            })?;

            page_count += 1;
            let newly_inserted = session.upsert_page(page.added);
            debug!(page = page_count, newly_inserted, has_more = page.has_more, "sync page");

            if page.has_more && newly_inserted == 0 {
                stalled_pages += 1;
                if stalled_pages >= MAX_STALLED_PAGES {
                    return Err(LinkError::sync_stalled(stalled_pages));
                }
            } else {
                stalled_pages = 0;
            }

            if page.has_more {
                cursor = Some(page.next_cursor);
            } else {
                state = SyncState::Complete;
            }
        }

        Ok(session.finish())
    }
}

/// Insertion-ordered upsert map keyed by transaction id
///
/// Tracks first-insertion order separately from the id-keyed values so the
/// final sort can break date ties deterministically.
struct SyncSession {
    order: Vec<String>,
    transactions: HashMap<String, Transaction>,
}

impl SyncSession {
    fn new() -> Self {
        SyncSession {
            order: Vec::new(),
            transactions: HashMap::new(),
        }
    }

    /// Upsert one page of added transactions, overwriting any prior entry
    /// with the same id (last-write-wins within a session).
    ///
    /// Returns how many previously-unseen ids the page contributed, which
    /// is the progress measure the stall guard keys on.
    fn upsert_page(&mut self, added: Vec<Transaction>) -> usize {
        let mut newly_inserted = 0;
        for transaction in added {
            if self
                .transactions
                .insert(transaction.id.clone(), transaction.clone())
                .is_none()
            {
                self.order.push(transaction.id);
                newly_inserted += 1;
            }
        }
        newly_inserted
    }

    /// Produce the final set, newest first
    ///
    /// The sort is stable over first-insertion order, so transactions with
    /// equal dates come out in the order their ids first appeared.
    fn finish(mut self) -> Vec<Transaction> {
        let mut result: Vec<Transaction> = self
            .order
            .iter()
            .filter_map(|id| self.transactions.remove(id))
            .collect();
        result.sort_by(|left, right| right.date.cmp(&left.date));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{AccountsResponse, TokenExchange};
    use crate::types::{InstitutionMetadata, TransactionPage};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Aggregator double that serves a scripted sequence of sync pages.
    struct PagedAggregator {
        pages: Mutex<VecDeque<Result<TransactionPage, LinkError>>>,
    }

    impl PagedAggregator {
        fn new(pages: Vec<Result<TransactionPage, LinkError>>) -> Arc<Self> {
            Arc::new(PagedAggregator {
                pages: Mutex::new(pages.into()),
            })
        }
    }

    #[async_trait]
    impl AggregatorClient for PagedAggregator {
        async fn accounts_get(&self, _access_token: &str) -> Result<AccountsResponse, LinkError> {
            unimplemented!("not used by sync tests")
        }

        async fn institutions_get_by_id(
            &self,
            _institution_id: &str,
            _country_codes: &[String],
        ) -> Result<InstitutionMetadata, LinkError> {
            unimplemented!("not used by sync tests")
        }

        async fn transactions_sync(
            &self,
            _access_token: &str,
            _cursor: Option<&str>,
        ) -> Result<TransactionPage, LinkError> {
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .expect("sync requested more pages than scripted")
        }

        async fn link_token_create(
            &self,
            _client_user_id: &str,
            _client_name: &str,
        ) -> Result<String, LinkError> {
            unimplemented!("not used by sync tests")
        }

        async fn item_public_token_exchange(
            &self,
            _public_token: &str,
        ) -> Result<TokenExchange, LinkError> {
            unimplemented!("not used by sync tests")
        }

        async fn processor_token_create(
            &self,
            _access_token: &str,
            _account_id: &str,
            _processor: &str,
        ) -> Result<String, LinkError> {
            unimplemented!("not used by sync tests")
        }
    }

    fn tx(id: &str, date: (i32, u32, u32), amount: i64) -> Transaction {
        Transaction {
            id: id.to_string(),
            account_id: "acct-1".to_string(),
            name: format!("merchant for {id}"),
            amount: Decimal::new(amount, 2),
            channel: "online".to_string(),
            category: None,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            pending: false,
            image_url: None,
        }
    }

    fn page(added: Vec<Transaction>, has_more: bool, next_cursor: &str) -> TransactionPage {
        TransactionPage {
            added,
            has_more,
            next_cursor: next_cursor.to_string(),
        }
    }

    #[tokio::test]
    async fn single_page_completes() {
        let aggregator = PagedAggregator::new(vec![Ok(page(
            vec![tx("t1", (2024, 3, 1), -500), tx("t2", (2024, 3, 2), -750)],
            false,
            "c1",
        ))]);
        let engine = TransactionSyncEngine::new(aggregator);

        let result = engine.sync("access-1", &CancellationToken::new()).await.unwrap();
        assert_eq!(result.len(), 2);
        // Newest first.
        assert_eq!(result[0].id, "t2");
        assert_eq!(result[1].id, "t1");
    }

    #[tokio::test]
    async fn amendment_in_later_page_wins() {
        // page1 {T1, T2, has_more}, page2 {T2 amended, final} => {T1, T2'}
        let aggregator = PagedAggregator::new(vec![
            Ok(page(
                vec![tx("t1", (2024, 3, 1), -500), tx("t2", (2024, 3, 2), -750)],
                true,
                "c1",
            )),
            Ok(page(vec![tx("t2", (2024, 3, 2), -999)], false, "c2")),
        ]);
        let engine = TransactionSyncEngine::new(aggregator);

        let result = engine.sync("access-1", &CancellationToken::new()).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "t2");
        assert_eq!(result[0].amount, Decimal::new(-999, 2));
        assert_eq!(result[1].id, "t1");
    }

    #[tokio::test]
    async fn transport_error_aborts_with_sync_failed() {
        let aggregator = PagedAggregator::new(vec![
            Ok(page(vec![tx("t1", (2024, 3, 1), -500)], true, "c1")),
            Err(LinkError::upstream("aggregator", "connection reset")),
        ]);
        let engine = TransactionSyncEngine::new(aggregator);

        let err = engine.sync("access-1", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, LinkError::SyncFailed { .. }));
    }

    #[tokio::test]
    async fn two_empty_pages_with_more_data_stall() {
        let aggregator = PagedAggregator::new(vec![
            Ok(page(vec![tx("t1", (2024, 3, 1), -500)], true, "c1")),
            Ok(page(vec![], true, "c1")),
            Ok(page(vec![], true, "c1")),
            // Never reached: the guard aborts after the second empty page.
            Ok(page(vec![], true, "c1")),
        ]);
        let engine = TransactionSyncEngine::new(aggregator);

        let err = engine.sync("access-1", &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, LinkError::sync_stalled(2));
    }

    #[tokio::test]
    async fn one_empty_page_then_progress_recovers() {
        let aggregator = PagedAggregator::new(vec![
            Ok(page(vec![tx("t1", (2024, 3, 1), -500)], true, "c1")),
            Ok(page(vec![], true, "c2")),
            Ok(page(vec![tx("t2", (2024, 3, 4), -250)], false, "c3")),
        ]);
        let engine = TransactionSyncEngine::new(aggregator);

        let result = engine.sync("access-1", &CancellationToken::new()).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn rerunning_identical_pages_is_idempotent() {
        let script = || {
            vec![
                Ok(page(
                    vec![tx("t1", (2024, 3, 1), -500), tx("t2", (2024, 3, 2), -750)],
                    true,
                    "c1",
                )),
                Ok(page(vec![tx("t3", (2024, 3, 2), -100)], false, "c2")),
            ]
        };
        let first = TransactionSyncEngine::new(PagedAggregator::new(script()))
            .sync("access-1", &CancellationToken::new())
            .await
            .unwrap();
        let second = TransactionSyncEngine::new(PagedAggregator::new(script()))
            .sync("access-1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn equal_dates_keep_insertion_order() {
        let aggregator = PagedAggregator::new(vec![Ok(page(
            vec![
                tx("first", (2024, 3, 2), -1),
                tx("second", (2024, 3, 2), -2),
                tx("older", (2024, 3, 1), -3),
            ],
            false,
            "c1",
        ))]);
        let engine = TransactionSyncEngine::new(aggregator);

        let result = engine.sync("access-1", &CancellationToken::new()).await.unwrap();
        let ids: Vec<&str> = result.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "older"]);
    }

    #[tokio::test]
    async fn cancellation_surfaces_cancelled() {
        let aggregator = PagedAggregator::new(vec![Ok(page(vec![], false, "c1"))]);
        let engine = TransactionSyncEngine::new(aggregator);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine.sync("access-1", &cancel).await.unwrap_err();
        assert_eq!(err, LinkError::cancelled("transaction_sync"));
    }
}
