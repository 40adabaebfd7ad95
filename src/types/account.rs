//! Account-related types for the Bank Link Engine
//!
//! This module defines the durable [`LinkedAccount`] record that binds a user
//! to one external financial account, and the transient snapshot shapes that
//! are recomputed on every read and returned to the surrounding application.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::transaction::Transaction;

/// Durable record binding a user to one external financial account
///
/// Created exactly once when a link exchange completes, and immutable
/// thereafter except for soft revocation. Owned by the persistent store;
/// the access token it carries is a capability-scoped secret and must never
/// appear in any externally-returned structure (only the derived
/// `shareable_id` is public-safe).
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedAccount {
    /// Store-assigned document id for this record
    pub internal_id: String,

    /// Application user that owns this link
    pub owner_user_id: String,

    /// Aggregator-side item id produced by the credential exchange
    pub external_item_id: String,

    /// Aggregator-side account id for the linked account
    pub external_account_id: String,

    /// Durable access credential for the aggregator (secret)
    ///
    /// Read-only at this layer. Never logged, never serialized into a
    /// response shape; `Debug` output redacts it.
    pub access_token: String,

    /// Reference to the provisioned funding source at the payment processor
    pub funding_source_ref: String,

    /// Deterministic, reversible, public-safe encoding of
    /// `external_account_id`
    pub shareable_id: String,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// When the link was soft-revoked, if ever
    ///
    /// Revoked records are kept for audit but excluded from account
    /// listings and detail reads.
    pub revoked_at: Option<DateTime<Utc>>,
}

impl LinkedAccount {
    /// Whether this link has been soft-revoked
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

// Manual Debug so the access token cannot leak through logging.
impl std::fmt::Debug for LinkedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkedAccount")
            .field("internal_id", &self.internal_id)
            .field("owner_user_id", &self.owner_user_id)
            .field("external_item_id", &self.external_item_id)
            .field("external_account_id", &self.external_account_id)
            .field("access_token", &"<redacted>")
            .field("funding_source_ref", &self.funding_source_ref)
            .field("shareable_id", &self.shareable_id)
            .field("created_at", &self.created_at)
            .field("revoked_at", &self.revoked_at)
            .finish()
    }
}

/// Create-input shape for a new [`LinkedAccount`]
///
/// Everything except the document id and timestamps, which the store assigns
/// at commit time.
#[derive(Clone, PartialEq)]
pub struct NewLinkedAccount {
    /// Application user that owns this link
    pub owner_user_id: String,

    /// Aggregator-side item id produced by the credential exchange
    pub external_item_id: String,

    /// Aggregator-side account id for the linked account
    pub external_account_id: String,

    /// Durable access credential for the aggregator (secret)
    pub access_token: String,

    /// Reference to the provisioned funding source
    pub funding_source_ref: String,

    /// Public-safe encoding of `external_account_id`
    pub shareable_id: String,
}

impl std::fmt::Debug for NewLinkedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewLinkedAccount")
            .field("owner_user_id", &self.owner_user_id)
            .field("external_item_id", &self.external_item_id)
            .field("external_account_id", &self.external_account_id)
            .field("access_token", &"<redacted>")
            .field("funding_source_ref", &self.funding_source_ref)
            .field("shareable_id", &self.shareable_id)
            .finish()
    }
}

/// Point-in-time view of one linked account
///
/// Transient: recomputed on every read from upstream data and never
/// persisted. `current_balance` is always present; `available_balance` may
/// be absent for credit-type accounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    /// Aggregator-side account id
    pub id: String,

    /// Balance available for spending, absent for credit-type accounts
    pub available_balance: Option<Decimal>,

    /// Current balance, always present
    pub current_balance: Decimal,

    /// Institution the account is held at
    pub institution_id: String,

    /// Display name reported by the institution
    pub name: String,

    /// Official account name, when the institution provides one
    pub official_name: Option<String>,

    /// Last digits of the account number, for display
    pub mask: String,

    /// Account type reported by the aggregator (e.g. depository, credit)
    #[serde(rename = "type")]
    pub kind: String,

    /// Account subtype reported by the aggregator (e.g. checking, savings)
    pub subtype: String,

    /// Document id of the owning [`LinkedAccount`]
    pub linked_account_id: String,

    /// Public-safe shareable id of the account
    pub shareable_id: String,
}

/// Aggregate listing of every visible account for one user
///
/// The stable list-endpoint shape: snapshot data plus portfolio totals.
/// `total_current_balance` is the exact sum of `current_balance` over
/// `data`, order-independent by construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountList {
    /// One snapshot per non-revoked linked account
    pub data: Vec<AccountSnapshot>,

    /// Number of snapshots in `data`
    pub total_banks: usize,

    /// Exact sum of current balances across `data`
    pub total_current_balance: Decimal,
}

impl AccountList {
    /// The empty listing: zero accounts is a successful response, never an
    /// error shape.
    pub fn empty() -> Self {
        AccountList {
            data: Vec::new(),
            total_banks: 0,
            total_current_balance: Decimal::ZERO,
        }
    }
}

/// One account plus its full synced transaction history
///
/// Transactions are sorted by date descending; ties keep their sync
/// insertion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDetail {
    /// Snapshot of the requested account
    pub account: AccountSnapshot,

    /// Complete deduplicated transaction history, newest first
    pub transactions: Vec<Transaction>,
}
