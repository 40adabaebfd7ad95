//! Institution metadata resolution
//!
//! Maps an institution id to descriptive metadata through the aggregator's
//! institution lookup, within the fixed country scope the engine is
//! configured for. Metadata is static per id, so successful lookups are
//! cached per process; failures are reported to the caller and never
//! cached, and the resolver never retries on its own.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::clients::AggregatorClient;
use crate::config::LinkConfig;
use crate::types::{InstitutionMetadata, LinkError};

/// Resolves institution ids to display metadata
pub struct InstitutionResolver {
    aggregator: Arc<dyn AggregatorClient>,
    country_codes: Vec<String>,
    cache: DashMap<String, InstitutionMetadata>,
}

impl InstitutionResolver {
    /// Create a resolver over the given aggregator client
    pub fn new(aggregator: Arc<dyn AggregatorClient>, config: &LinkConfig) -> Self {
        InstitutionResolver {
            aggregator,
            country_codes: config.country_codes.clone(),
            cache: DashMap::new(),
        }
    }

    /// Resolve metadata for one institution
    ///
    /// # Errors
    ///
    /// - [`LinkError::UpstreamUnavailable`] on transport failure
    /// - [`LinkError::NotFound`] when the aggregator has no institution for
    ///   the id
    pub async fn resolve(&self, institution_id: &str) -> Result<InstitutionMetadata, LinkError> {
        if let Some(hit) = self.cache.get(institution_id) {
            return Ok(hit.clone());
        }

        let metadata = self
            .aggregator
            .institutions_get_by_id(institution_id, &self.country_codes)
            .await?;

        debug!(institution_id, "resolved institution metadata");
        self.cache.insert(institution_id.to_string(), metadata.clone());
        Ok(metadata)
    }
}
