//! Transaction-related types for the Bank Link Engine
//!
//! This module defines the synced transaction shape exposed to the
//! surrounding application and the delta page returned by the upstream
//! aggregator's incremental sync endpoint.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// One synchronized transaction
///
/// Transactions are values owned by the calling request scope: they are
/// rebuilt on every sync and discarded after response construction. The id
/// is assigned by the upstream aggregator and is globally unique there; an
/// id may reappear in a later page only as an upstream amendment, in which
/// case the latest version wins within a sync session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Upstream-assigned transaction id
    pub id: String,

    /// Aggregator-side id of the account the transaction belongs to
    pub account_id: String,

    /// Merchant or counterparty name
    pub name: String,

    /// Signed amount, currency-agnostic
    pub amount: Decimal,

    /// Payment channel reported upstream (e.g. online, in store)
    pub channel: String,

    /// Primary category, the first of the upstream category list when one
    /// is present
    pub category: Option<String>,

    /// Transaction date
    pub date: NaiveDate,

    /// Whether the transaction is still pending settlement
    pub pending: bool,

    /// Merchant logo URL, when the upstream provides one
    pub image_url: Option<String>,
}

/// One delta page from the aggregator's incremental sync endpoint
///
/// `next_cursor` is an opaque position token scoped to a single account's
/// access credential; it is never reused across accounts. Advancing past
/// `has_more == false` terminates a sync session with no error.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPage {
    /// Transactions added (or amended) since the cursor position
    pub added: Vec<Transaction>,

    /// Whether further pages remain
    pub has_more: bool,

    /// Cursor for the next page request
    pub next_cursor: String,
}
