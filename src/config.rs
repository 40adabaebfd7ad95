//! Engine configuration
//!
//! Configuration is an explicitly constructed, immutable value passed to
//! component constructors; there is no ambient global state. Credentials and
//! the codec key are capability-scoped secrets: they are redacted from
//! `Debug` output and must never be logged.

use std::env;
use std::time::Duration;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use dotenvy::dotenv;

use crate::types::LinkError;

/// Immutable configuration for the link engine
///
/// Construct directly for tests, or load from the process environment with
/// [`LinkConfig::from_env`].
#[derive(Clone)]
pub struct LinkConfig {
    /// Base URL of the account-aggregation provider
    pub aggregator_url: String,

    /// Aggregator API client id
    pub aggregator_client_id: String,

    /// Aggregator API secret (never logged)
    pub aggregator_secret: String,

    /// Base URL of the payment collaborator
    pub payments_url: String,

    /// Payment collaborator API key (never logged)
    pub payments_api_key: String,

    /// Processor name passed to the aggregator when requesting a processor
    /// token (e.g. "dwolla")
    pub processor_name: String,

    /// Fixed country scope for institution lookups and link tokens
    pub country_codes: Vec<String>,

    /// Product scope requested when creating link tokens
    pub link_products: Vec<String>,

    /// 32-byte key for the shareable-id codec (never logged)
    pub codec_key: [u8; 32],

    /// Per-request timeout for upstream HTTP calls
    pub request_timeout: Duration,

    /// Upper bound on concurrent per-account fetches during aggregation
    pub max_concurrency: usize,
}

impl LinkConfig {
    /// Load configuration from the process environment
    ///
    /// Reads a `.env` file when present. Endpoints, scopes, and tuning knobs
    /// all have defaults; the aggregator credentials, the payments API key,
    /// and the codec key are required.
    ///
    /// # Environment
    ///
    /// - `AGGREGATOR_URL` (default: aggregator sandbox)
    /// - `AGGREGATOR_CLIENT_ID`, `AGGREGATOR_SECRET` (required)
    /// - `PAYMENTS_URL` (default: payments sandbox)
    /// - `PAYMENTS_API_KEY` (required)
    /// - `PROCESSOR_NAME` (default: "dwolla")
    /// - `COUNTRY_CODES` (comma-separated, default: "US")
    /// - `LINK_PRODUCTS` (comma-separated, default: "auth")
    /// - `SHAREABLE_ID_KEY` (required, base64-encoded 32-byte key)
    /// - `REQUEST_TIMEOUT_SECS` (default: 15)
    /// - `MAX_CONCURRENCY` (default: number of CPUs)
    pub fn from_env() -> Result<Self, LinkError> {
        dotenv().ok();

        let aggregator_url = env::var("AGGREGATOR_URL")
            .unwrap_or_else(|_| "https://sandbox.plaid.com".to_string());
        let aggregator_client_id = required_var("AGGREGATOR_CLIENT_ID")?;
        let aggregator_secret = required_var("AGGREGATOR_SECRET")?;

        let payments_url = env::var("PAYMENTS_URL")
            .unwrap_or_else(|_| "https://api-sandbox.dwolla.com".to_string());
        let payments_api_key = required_var("PAYMENTS_API_KEY")?;

        let processor_name =
            env::var("PROCESSOR_NAME").unwrap_or_else(|_| "dwolla".to_string());

        let country_codes = list_var("COUNTRY_CODES", "US");
        let link_products = list_var("LINK_PRODUCTS", "auth");

        let codec_key = decode_codec_key(&required_var("SHAREABLE_ID_KEY")?)?;

        let request_timeout = Duration::from_secs(
            env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .unwrap_or(15),
        );

        let max_concurrency = env::var("MAX_CONCURRENCY")
            .unwrap_or_default()
            .parse()
            .unwrap_or_else(|_| num_cpus::get());

        Ok(LinkConfig {
            aggregator_url,
            aggregator_client_id,
            aggregator_secret,
            payments_url,
            payments_api_key,
            processor_name,
            country_codes,
            link_products,
            codec_key,
            request_timeout,
            max_concurrency,
        })
    }
}

// Manual Debug so credentials and the codec key cannot leak through logging.
impl std::fmt::Debug for LinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkConfig")
            .field("aggregator_url", &self.aggregator_url)
            .field("aggregator_client_id", &self.aggregator_client_id)
            .field("aggregator_secret", &"<redacted>")
            .field("payments_url", &self.payments_url)
            .field("payments_api_key", &"<redacted>")
            .field("processor_name", &self.processor_name)
            .field("country_codes", &self.country_codes)
            .field("link_products", &self.link_products)
            .field("codec_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

fn required_var(key: &str) -> Result<String, LinkError> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LinkError::invalid_config(format!("{key} is required")))
}

fn list_var(key: &str, default: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Decode the base64 codec key, accepting both URL-safe and standard
/// alphabets, and insist on exactly 32 bytes of key material.
fn decode_codec_key(encoded: &str) -> Result<[u8; 32], LinkError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(encoded.as_bytes())
        .or_else(|_| STANDARD.decode(encoded.as_bytes()))
        .map_err(|_| LinkError::invalid_config("SHAREABLE_ID_KEY is not valid base64"))?;

    if decoded.len() != 32 {
        return Err(LinkError::invalid_config(format!(
            "SHAREABLE_ID_KEY must decode to 32 bytes, got {}",
            decoded.len()
        )));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&decoded);
    Ok(key)
}
