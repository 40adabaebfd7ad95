//! HTTP client for the external payment collaborator
//!
//! Provisions funding sources from processor tokens. The collaborator
//! follows the Location-header convention: a successful provisioning call
//! answers 201 with the new funding source's URL in the `Location` header
//! and an empty body. An accepted call without a `Location` header is
//! reported as `Ok(None)` so the caller can fail the link workflow with a
//! distinct error kind instead of persisting an incomplete record.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::clients::FundingSourceClient;
use crate::config::LinkConfig;
use crate::types::LinkError;

const SERVICE: &str = "payments";

/// Reqwest-backed implementation of [`FundingSourceClient`]
pub struct HttpFundingSourceClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl HttpFundingSourceClient {
    /// Build a client from the engine configuration
    pub fn new(config: &LinkConfig) -> Result<Self, LinkError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| LinkError::upstream(SERVICE, error))?;

        Ok(HttpFundingSourceClient {
            http,
            base_url: config.payments_url.trim_end_matches('/').to_string(),
            api_key: config.payments_api_key.clone(),
        })
    }
}

#[derive(Serialize)]
struct CreateFundingSourceRequest<'a> {
    #[serde(rename = "plaidToken")]
    processor_token: &'a str,
    name: &'a str,
}

#[async_trait]
impl FundingSourceClient for HttpFundingSourceClient {
    async fn create_funding_source(
        &self,
        customer_ref: &str,
        processor_token: &str,
        display_name: &str,
    ) -> Result<Option<String>, LinkError> {
        // Customer references may arrive as full resource URLs; only the
        // trailing id belongs in the request path.
        let customer_id = resource_id_from_url(customer_ref)
            .ok_or_else(|| LinkError::upstream(SERVICE, "customer reference is empty"))?;

        debug!(customer_id, "provisioning funding source");

        let request = CreateFundingSourceRequest {
            processor_token,
            name: display_name,
        };
        let response = self
            .http
            .post(format!("{}/customers/{customer_id}/funding-sources", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| LinkError::upstream(SERVICE, error))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LinkError::upstream(SERVICE, format!("HTTP {status}: {detail}")));
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        Ok(location)
    }
}

/// Extract the trailing resource id from a Location-style URL
///
/// `https://pay.example.com/customers/cus-1` yields `cus-1`; a bare id is
/// returned unchanged. Returns `None` for empty input.
pub fn resource_id_from_url(url: &str) -> Option<&str> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::full_url("https://pay.example.com/customers/cus-1", Some("cus-1"))]
    #[case::trailing_slash("https://pay.example.com/customers/cus-1/", Some("cus-1"))]
    #[case::bare_id("cus-1", Some("cus-1"))]
    #[case::empty("", None)]
    fn resource_id_extraction(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(resource_id_from_url(input), expected);
    }
}
