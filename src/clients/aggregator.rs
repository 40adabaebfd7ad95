//! HTTP client for the account-aggregation provider
//!
//! Speaks the aggregator's JSON-over-POST API. Credentials ride in the
//! request body on every call; responses are deserialized into the wire
//! structs below and converted to the engine's domain types at the edge, so
//! nothing upstream-shaped leaks past this module.

use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clients::{AccountsResponse, AggregatorClient, TokenExchange, UpstreamAccount};
use crate::config::LinkConfig;
use crate::types::{InstitutionMetadata, LinkError, Transaction, TransactionPage};

use async_trait::async_trait;

const SERVICE: &str = "aggregator";

/// Reqwest-backed implementation of [`AggregatorClient`]
pub struct HttpAggregatorClient {
    http: Client,
    base_url: String,
    client_id: String,
    secret: String,
    link_products: Vec<String>,
    country_codes: Vec<String>,
}

impl HttpAggregatorClient {
    /// Build a client from the engine configuration
    ///
    /// The per-request timeout comes from `config.request_timeout`.
    pub fn new(config: &LinkConfig) -> Result<Self, LinkError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| LinkError::upstream(SERVICE, error))?;

        Ok(HttpAggregatorClient {
            http,
            base_url: config.aggregator_url.trim_end_matches('/').to_string(),
            client_id: config.aggregator_client_id.clone(),
            secret: config.aggregator_secret.clone(),
            link_products: config.link_products.clone(),
            country_codes: config.country_codes.clone(),
        })
    }

    async fn post_raw<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, LinkError> {
        debug!(path, "aggregator request");
        self.http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|error| LinkError::upstream(SERVICE, error))
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, LinkError> {
        let response = self.post_raw(path, body).await?;
        read_json(response).await
    }
}

async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, LinkError> {
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(LinkError::upstream(SERVICE, format!("HTTP {status}: {detail}")));
    }
    response
        .json::<R>()
        .await
        .map_err(|error| LinkError::upstream(SERVICE, format!("invalid response body: {error}")))
}

#[async_trait]
impl AggregatorClient for HttpAggregatorClient {
    async fn accounts_get(&self, access_token: &str) -> Result<AccountsResponse, LinkError> {
        let request = AccountsGetRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            access_token,
        };
        let response: AccountsGetResponse = self.post_json("/accounts/get", &request).await?;

        Ok(AccountsResponse {
            accounts: response.accounts.into_iter().map(UpstreamAccount::from).collect(),
            institution_id: response.item.institution_id,
        })
    }

    async fn institutions_get_by_id(
        &self,
        institution_id: &str,
        country_codes: &[String],
    ) -> Result<InstitutionMetadata, LinkError> {
        let request = InstitutionsGetByIdRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            institution_id,
            country_codes,
        };
        let response = self.post_raw("/institutions/get_by_id", &request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(LinkError::not_found("institution", institution_id));
        }

        let body: InstitutionsGetByIdResponse = read_json(response).await?;
        Ok(body.institution)
    }

    async fn transactions_sync(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<TransactionPage, LinkError> {
        let request = TransactionsSyncRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            access_token,
            cursor,
        };
        let response: TransactionsSyncResponse =
            self.post_json("/transactions/sync", &request).await?;

        Ok(TransactionPage {
            added: response.added.into_iter().map(Transaction::from).collect(),
            has_more: response.has_more,
            next_cursor: response.next_cursor,
        })
    }

    async fn link_token_create(
        &self,
        client_user_id: &str,
        client_name: &str,
    ) -> Result<String, LinkError> {
        let request = LinkTokenCreateRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            user: LinkTokenUser { client_user_id },
            client_name,
            products: &self.link_products,
            language: "en",
            country_codes: &self.country_codes,
        };
        let response: LinkTokenCreateResponse =
            self.post_json("/link/token/create", &request).await?;
        Ok(response.link_token)
    }

    async fn item_public_token_exchange(
        &self,
        public_token: &str,
    ) -> Result<TokenExchange, LinkError> {
        let request = PublicTokenExchangeRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            public_token,
        };
        let response: PublicTokenExchangeResponse =
            self.post_json("/item/public_token/exchange", &request).await?;

        Ok(TokenExchange {
            access_token: response.access_token,
            item_id: response.item_id,
        })
    }

    async fn processor_token_create(
        &self,
        access_token: &str,
        account_id: &str,
        processor: &str,
    ) -> Result<String, LinkError> {
        let request = ProcessorTokenCreateRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            access_token,
            account_id,
            processor,
        };
        let response: ProcessorTokenCreateResponse =
            self.post_json("/processor/token/create", &request).await?;
        Ok(response.processor_token)
    }
}

// Wire shapes. Requests carry credentials, so none of them derive Debug.

#[derive(Serialize)]
struct AccountsGetRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    access_token: &'a str,
}

#[derive(Deserialize)]
struct AccountsGetResponse {
    accounts: Vec<WireAccount>,
    item: WireItem,
}

#[derive(Deserialize)]
struct WireItem {
    institution_id: Option<String>,
}

#[derive(Deserialize)]
struct WireAccount {
    account_id: String,
    name: String,
    official_name: Option<String>,
    mask: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    subtype: Option<String>,
    balances: WireBalances,
}

#[derive(Deserialize)]
struct WireBalances {
    available: Option<Decimal>,
    current: Decimal,
}

impl From<WireAccount> for UpstreamAccount {
    fn from(wire: WireAccount) -> Self {
        UpstreamAccount {
            account_id: wire.account_id,
            name: wire.name,
            official_name: wire.official_name,
            mask: wire.mask.unwrap_or_default(),
            kind: wire.kind,
            subtype: wire.subtype.unwrap_or_default(),
            available_balance: wire.balances.available,
            current_balance: wire.balances.current,
        }
    }
}

#[derive(Serialize)]
struct InstitutionsGetByIdRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    institution_id: &'a str,
    country_codes: &'a [String],
}

#[derive(Deserialize)]
struct InstitutionsGetByIdResponse {
    institution: InstitutionMetadata,
}

#[derive(Serialize)]
struct TransactionsSyncRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    access_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

#[derive(Deserialize)]
struct TransactionsSyncResponse {
    added: Vec<WireTransaction>,
    has_more: bool,
    next_cursor: String,
}

#[derive(Deserialize)]
struct WireTransaction {
    transaction_id: String,
    account_id: String,
    name: String,
    amount: Decimal,
    payment_channel: String,
    category: Option<Vec<String>>,
    date: NaiveDate,
    pending: bool,
    logo_url: Option<String>,
}

impl From<WireTransaction> for Transaction {
    fn from(wire: WireTransaction) -> Self {
        Transaction {
            id: wire.transaction_id,
            account_id: wire.account_id,
            name: wire.name,
            amount: wire.amount,
            channel: wire.payment_channel,
            // The upstream reports a category hierarchy; only the broadest
            // entry is kept.
            category: wire.category.and_then(|list| list.into_iter().next()),
            date: wire.date,
            pending: wire.pending,
            image_url: wire.logo_url,
        }
    }
}

#[derive(Serialize)]
struct LinkTokenUser<'a> {
    client_user_id: &'a str,
}

#[derive(Serialize)]
struct LinkTokenCreateRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    user: LinkTokenUser<'a>,
    client_name: &'a str,
    products: &'a [String],
    language: &'a str,
    country_codes: &'a [String],
}

#[derive(Deserialize)]
struct LinkTokenCreateResponse {
    link_token: String,
}

#[derive(Serialize)]
struct PublicTokenExchangeRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    public_token: &'a str,
}

#[derive(Deserialize)]
struct PublicTokenExchangeResponse {
    access_token: String,
    item_id: String,
}

#[derive(Serialize)]
struct ProcessorTokenCreateRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    access_token: &'a str,
    account_id: &'a str,
    processor: &'a str,
}

#[derive(Deserialize)]
struct ProcessorTokenCreateResponse {
    processor_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_transaction_takes_first_category() {
        let wire = WireTransaction {
            transaction_id: "tx-1".to_string(),
            account_id: "acct-1".to_string(),
            name: "Grocery Store".to_string(),
            amount: Decimal::new(3250, 2),
            payment_channel: "in store".to_string(),
            category: Some(vec!["Shops".to_string(), "Supermarkets".to_string()]),
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            pending: false,
            logo_url: Some("https://img.example.com/logo.png".to_string()),
        };

        let tx = Transaction::from(wire);
        assert_eq!(tx.category.as_deref(), Some("Shops"));
        assert_eq!(tx.image_url.as_deref(), Some("https://img.example.com/logo.png"));
    }

    #[test]
    fn wire_transaction_without_categories_maps_to_none() {
        let wire = WireTransaction {
            transaction_id: "tx-2".to_string(),
            account_id: "acct-1".to_string(),
            name: "Transfer".to_string(),
            amount: Decimal::new(-10000, 2),
            payment_channel: "other".to_string(),
            category: Some(Vec::new()),
            date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            pending: true,
            logo_url: None,
        };

        let tx = Transaction::from(wire);
        assert_eq!(tx.category, None);
        assert!(tx.pending);
    }

    #[test]
    fn wire_account_defaults_missing_mask_and_subtype() {
        let wire = WireAccount {
            account_id: "acct-1".to_string(),
            name: "Everyday Checking".to_string(),
            official_name: None,
            mask: None,
            kind: "depository".to_string(),
            subtype: None,
            balances: WireBalances {
                available: Some(Decimal::new(50000, 2)),
                current: Decimal::new(52500, 2),
            },
        };

        let account = UpstreamAccount::from(wire);
        assert_eq!(account.mask, "");
        assert_eq!(account.subtype, "");
        assert_eq!(account.current_balance, Decimal::new(52500, 2));
    }

    #[test]
    fn sync_request_omits_absent_cursor() {
        let request = TransactionsSyncRequest {
            client_id: "client-1",
            secret: "secret-1",
            access_token: "access-1",
            cursor: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("cursor").is_none());
    }
}
