//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Linked-account records and read-side snapshot shapes
//! - `transaction`: Synced transactions and sync delta pages
//! - `institution`: Institution display metadata
//! - `error`: Error types for the link engine
pub mod account;
pub mod error;
pub mod institution;
pub mod transaction;

pub use account::{AccountDetail, AccountList, AccountSnapshot, LinkedAccount, NewLinkedAccount};
pub use error::LinkError;
pub use institution::InstitutionMetadata;
pub use transaction::{Transaction, TransactionPage};
