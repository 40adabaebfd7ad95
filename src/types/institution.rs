//! Institution metadata types

use serde::{Deserialize, Serialize};

/// Descriptive metadata for a financial institution
///
/// Resolved from the aggregator's institution lookup and attached to
/// account snapshots for display. Static per institution id, which is why
/// the resolver may cache it per process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionMetadata {
    /// Aggregator-side institution id
    pub institution_id: String,

    /// Institution display name
    pub name: String,

    /// Institution homepage, when known
    pub url: Option<String>,

    /// Institution logo, when known
    pub logo: Option<String>,
}
