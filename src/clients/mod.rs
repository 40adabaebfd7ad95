//! External collaborator seams
//!
//! This module defines the trait abstractions for the three external systems
//! the engine talks to, so that HTTP implementations and test doubles are
//! interchangeable:
//!
//! - `AggregatorClient` - the account-aggregation provider (credential
//!   exchange, account/institution reads, incremental transaction sync)
//! - `FundingSourceClient` - the payment processor that turns a processor
//!   token into a funding source
//! - `BankAccountStore` - the persistent document store owning
//!   [`LinkedAccount`] records
//!
//! HTTP implementations live in [`aggregator`] and [`payments`]; a
//! DashMap-backed reference store lives in [`store`].

pub mod aggregator;
pub mod payments;
pub mod store;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{InstitutionMetadata, LinkedAccount, NewLinkedAccount, TransactionPage};
use crate::types::LinkError;

pub use aggregator::HttpAggregatorClient;
pub use payments::{resource_id_from_url, HttpFundingSourceClient};
pub use store::MemoryBankAccountStore;

/// One account record as reported by the aggregator's account-list call
///
/// The aggregator may report several of these per access credential; the
/// engine's one-account-per-link invariant means callers normally consume
/// only the first.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamAccount {
    /// Aggregator-side account id
    pub account_id: String,

    /// Display name reported by the institution
    pub name: String,

    /// Official account name, when present
    pub official_name: Option<String>,

    /// Last digits of the account number
    pub mask: String,

    /// Account type (e.g. depository, credit)
    pub kind: String,

    /// Account subtype (e.g. checking, savings)
    pub subtype: String,

    /// Balance available for spending; absent for credit-type accounts
    pub available_balance: Option<Decimal>,

    /// Current balance, always present
    pub current_balance: Decimal,
}

/// Response of the aggregator's account-list call
#[derive(Debug, Clone, PartialEq)]
pub struct AccountsResponse {
    /// Accounts reachable through the access credential
    pub accounts: Vec<UpstreamAccount>,

    /// Institution the credential's item belongs to, when reported
    pub institution_id: Option<String>,
}

/// Result of exchanging a public token for durable credentials
#[derive(Clone, PartialEq)]
pub struct TokenExchange {
    /// Durable access credential (secret)
    pub access_token: String,

    /// Aggregator-side item id for the new link
    pub item_id: String,
}

impl std::fmt::Debug for TokenExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchange")
            .field("access_token", &"<redacted>")
            .field("item_id", &self.item_id)
            .finish()
    }
}

/// Client for the account-aggregation provider
///
/// Implementations map transport failures to
/// [`LinkError::UpstreamUnavailable`] and missing resources to
/// [`LinkError::NotFound`]; they never retry automatically.
#[async_trait]
pub trait AggregatorClient: Send + Sync {
    /// List the accounts reachable through an access credential
    async fn accounts_get(&self, access_token: &str) -> Result<AccountsResponse, LinkError>;

    /// Look up institution metadata by id within a fixed country scope
    async fn institutions_get_by_id(
        &self,
        institution_id: &str,
        country_codes: &[String],
    ) -> Result<InstitutionMetadata, LinkError>;

    /// Fetch one incremental transaction delta page
    ///
    /// `cursor` is `None` for the first page of a sync session; subsequent
    /// requests pass the `next_cursor` of the previous page. Cursors are
    /// scoped to one access credential and never reused across accounts.
    async fn transactions_sync(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<TransactionPage, LinkError>;

    /// Create a short-lived link token for a user identity
    async fn link_token_create(
        &self,
        client_user_id: &str,
        client_name: &str,
    ) -> Result<String, LinkError>;

    /// Exchange a short-lived public token for durable credentials
    async fn item_public_token_exchange(
        &self,
        public_token: &str,
    ) -> Result<TokenExchange, LinkError>;

    /// Request a processor token scoped to one account and target processor
    async fn processor_token_create(
        &self,
        access_token: &str,
        account_id: &str,
        processor: &str,
    ) -> Result<String, LinkError>;
}

/// Client for the external payment collaborator
#[async_trait]
pub trait FundingSourceClient: Send + Sync {
    /// Provision a funding source for a customer from a processor token
    ///
    /// Returns `Ok(None)` when the collaborator accepts the request but
    /// hands back no funding-source reference; callers must treat that as
    /// a failure ([`LinkError::MissingFundingSource`]), never as success.
    async fn create_funding_source(
        &self,
        customer_ref: &str,
        processor_token: &str,
        display_name: &str,
    ) -> Result<Option<String>, LinkError>;
}

/// Persistent document store owning [`LinkedAccount`] records
///
/// # Concurrency contract
///
/// `create_bank_account` must be safe to call concurrently: duplicate
/// exchange attempts for the same external item id must be deduplicated (or
/// idempotently rejected) so that no two records ever exist for one item.
/// Reads never mutate.
#[async_trait]
pub trait BankAccountStore: Send + Sync {
    /// Persist a newly linked account, assigning its document id
    async fn create_bank_account(
        &self,
        record: NewLinkedAccount,
    ) -> Result<LinkedAccount, LinkError>;

    /// Load every linked-account record owned by a user
    async fn get_banks_by_user(&self, user_id: &str) -> Result<Vec<LinkedAccount>, LinkError>;

    /// Load one linked-account record by document id
    async fn get_bank_by_document_id(&self, id: &str) -> Result<LinkedAccount, LinkError>;
}
