//! Bank Link Engine Library
//! # Overview
//!
//! This library links end-user bank accounts to an application identity through
//! an account-aggregation provider, synchronizes transaction history
//! incrementally, and maintains a consistent view of linked accounts and their
//! balances for a payments application.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (LinkedAccount, AccountSnapshot, Transaction, etc.)
//! - [`config`] - Immutable configuration passed to component constructors
//! - [`codec`] - Reversible encoding of account identifiers into shareable ids
//! - [`clients`] - Collaborator seams for the aggregator, the payment processor,
//!   and the bank-account store, with HTTP implementations
//! - [`core`] - Business logic components:
//!   - [`core::sync_engine`] - Cursor-driven incremental transaction sync
//!   - [`core::accounts`] - Multi-account balance aggregation
//!   - [`core::institutions`] - Institution metadata resolution
//!   - [`core::link`] - Account-linking lifecycle (credential exchange,
//!     funding-source provisioning, record persistence)
//!
//! # Linking Flow
//!
//! A user initiates linking; the [`core::link::LinkLifecycleManager`] exchanges
//! the short-lived public token for a durable access token, provisions a funding
//! source with the payment collaborator, and persists a [`types::LinkedAccount`].
//! Later reads go through [`core::accounts::AccountAggregator`], which fans out
//! across the user's linked accounts, resolves balances and institution
//! metadata, and computes portfolio totals. Per-account transaction history is
//! built by [`core::sync_engine::TransactionSyncEngine`].
//!
//! # Failure Model
//!
//! Every component surfaces a typed [`types::LinkError`] to its caller; no
//! component converts a failure into an empty or zero success value. An empty
//! account list is a successful response, never an error shape.

// Module declarations
pub mod clients;
pub mod codec;
pub mod config;
pub mod core;
pub mod types;

pub use clients::{
    AggregatorClient, BankAccountStore, FundingSourceClient, HttpAggregatorClient,
    HttpFundingSourceClient, MemoryBankAccountStore,
};
pub use codec::ShareableIdCodec;
pub use config::LinkConfig;
// `crate::` disambiguates from the built-in `core` crate.
pub use crate::core::{
    AccountAggregator, InstitutionResolver, LinkLifecycleManager, LinkUser, TransactionSyncEngine,
};
pub use types::{
    AccountDetail, AccountList, AccountSnapshot, InstitutionMetadata, LinkError, LinkedAccount,
    NewLinkedAccount, Transaction, TransactionPage,
};
