//! In-memory bank-account store
//!
//! This module provides [`MemoryBankAccountStore`], a DashMap-backed
//! reference implementation of the [`BankAccountStore`] contract. It backs
//! the integration tests and local development; production deployments plug
//! in a document-store implementation behind the same trait.
//!
//! # Idempotent creation
//!
//! Records are keyed by the aggregator item id, and creation goes through a
//! single `entry` call, so concurrent duplicate-exchange attempts for the
//! same external item collapse into one record: the first writer wins and
//! every caller observes that one record. This is the concurrency contract
//! the [`BankAccountStore`] trait documents.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::clients::BankAccountStore;
use crate::types::{LinkError, LinkedAccount, NewLinkedAccount};

/// Thread-safe in-memory implementation of [`BankAccountStore`]
///
/// DashMap provides fine-grained locking through internal sharding, so
/// concurrent creates for different items never contend and duplicate
/// creates for the same item serialize on one shard entry.
#[derive(Debug, Default)]
pub struct MemoryBankAccountStore {
    /// Records keyed by aggregator item id (the idempotency key)
    by_item: DashMap<String, LinkedAccount>,

    /// Monotonic counter backing document-id assignment
    next_id: AtomicU64,
}

impl MemoryBankAccountStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BankAccountStore for MemoryBankAccountStore {
    async fn create_bank_account(
        &self,
        record: NewLinkedAccount,
    ) -> Result<LinkedAccount, LinkError> {
        let assigned_id = format!("bank_{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        let stored = self
            .by_item
            .entry(record.external_item_id.clone())
            .or_insert_with(|| LinkedAccount {
                internal_id: assigned_id,
                owner_user_id: record.owner_user_id,
                external_item_id: record.external_item_id.clone(),
                external_account_id: record.external_account_id,
                access_token: record.access_token,
                funding_source_ref: record.funding_source_ref,
                shareable_id: record.shareable_id,
                created_at: Utc::now(),
                revoked_at: None,
            })
            .clone();

        Ok(stored)
    }

    async fn get_banks_by_user(&self, user_id: &str) -> Result<Vec<LinkedAccount>, LinkError> {
        let mut records: Vec<LinkedAccount> = self
            .by_item
            .iter()
            .filter(|entry| entry.value().owner_user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();

        // DashMap iteration order is unstable; sort for deterministic reads.
        records.sort_by(|left, right| left.internal_id.cmp(&right.internal_id));
        Ok(records)
    }

    async fn get_bank_by_document_id(&self, id: &str) -> Result<LinkedAccount, LinkError> {
        self.by_item
            .iter()
            .find(|entry| entry.value().internal_id == id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LinkError::not_found("bank record", id))
    }
}
