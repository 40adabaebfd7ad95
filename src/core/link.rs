//! Account-linking lifecycle
//!
//! This module provides the [`LinkLifecycleManager`], which turns a
//! short-lived link credential into a durable [`LinkedAccount`] record:
//!
//! 1. exchange the public token for a durable access token and item id
//! 2. fetch the linked account's record (id, display name)
//! 3. request a processor token scoped to the account and target processor
//! 4. provision a funding source with the payment collaborator
//! 5. compute the shareable id
//! 6. persist the record
//!
//! The workflow is sequential and non-resumable. Steps 1 through 5 are
//! side-effect-free on the persistent store; only step 6 commits, so a
//! failure at any step leaves zero records behind. Concurrent duplicate
//! exchanges for one item are deduplicated by the store (see the
//! [`BankAccountStore`] contract).
//!
//! One-account-per-link is a permanent invariant: an exchange whose
//! account-list response carries more than one account fails outright
//! rather than silently dropping data.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::clients::{AggregatorClient, BankAccountStore, FundingSourceClient};
use crate::codec::ShareableIdCodec;
use crate::config::LinkConfig;
use crate::core::run_cancellable;
use crate::types::{LinkError, LinkedAccount, NewLinkedAccount};

/// Identity of the user a link is being created for
#[derive(Debug, Clone, PartialEq)]
pub struct LinkUser {
    /// Application user id
    pub user_id: String,

    /// Display name shown by the aggregator's link flow
    pub display_name: String,

    /// The user's customer reference at the payment collaborator
    pub payment_customer_ref: String,
}

/// Orchestrates the one-time exchange of a link credential into a durable
/// linked-account record
pub struct LinkLifecycleManager {
    aggregator: Arc<dyn AggregatorClient>,
    funding: Arc<dyn FundingSourceClient>,
    store: Arc<dyn BankAccountStore>,
    codec: ShareableIdCodec,
    processor_name: String,
}

impl LinkLifecycleManager {
    /// Create a manager over the given collaborators
    pub fn new(
        aggregator: Arc<dyn AggregatorClient>,
        funding: Arc<dyn FundingSourceClient>,
        store: Arc<dyn BankAccountStore>,
        config: &LinkConfig,
    ) -> Self {
        LinkLifecycleManager {
            aggregator,
            funding,
            store,
            codec: ShareableIdCodec::new(config.codec_key),
            processor_name: config.processor_name.clone(),
        }
    }

    /// Create a short-lived link token for a user identity
    ///
    /// The token parameterizes the aggregator's link flow with the product
    /// scope and country codes the engine is configured for.
    pub async fn create_link_token(&self, user: &LinkUser) -> Result<String, LinkError> {
        self.aggregator
            .link_token_create(&user.user_id, &user.display_name)
            .await
    }

    /// Exchange a public token for a persisted [`LinkedAccount`]
    ///
    /// Runs the six-step workflow described in the module docs. Any step
    /// failing aborts the whole exchange; no partial record is ever
    /// persisted.
    ///
    /// # Errors
    ///
    /// - [`LinkError::LinkExchangeFailed`] naming the failed stage
    /// - [`LinkError::MissingFundingSource`] when provisioning succeeds
    ///   without a funding-source reference
    /// - [`LinkError::Cancelled`] when the caller's token fires
    pub async fn exchange_public_token(
        &self,
        public_token: &str,
        user: &LinkUser,
        cancel: &CancellationToken,
    ) -> Result<LinkedAccount, LinkError> {
        // Step 1: durable credentials.
        let exchange = run_cancellable(
            cancel,
            "public_token_exchange",
            self.aggregator.item_public_token_exchange(public_token),
        )
        .await
        .map_err(|error| stage_error("public_token_exchange", error))?;

        // Step 2: the linked account's id and display name.
        let accounts = run_cancellable(
            cancel,
            "accounts_get",
            self.aggregator.accounts_get(&exchange.access_token),
        )
        .await
        .map_err(|error| stage_error("accounts_get", error))?;

        if accounts.accounts.len() > 1 {
            return Err(LinkError::exchange_failed(
                "accounts_get",
                format!(
                    "expected one account per link, upstream returned {}",
                    accounts.accounts.len()
                ),
            ));
        }
        let account = accounts
            .accounts
            .into_iter()
            .next()
            .ok_or_else(|| LinkError::exchange_failed("accounts_get", "no accounts returned"))?;

        // Step 3: processor token scoped to this account.
        let processor_token = run_cancellable(
            cancel,
            "processor_token_create",
            self.aggregator.processor_token_create(
                &exchange.access_token,
                &account.account_id,
                &self.processor_name,
            ),
        )
        .await
        .map_err(|error| stage_error("processor_token_create", error))?;

        // Step 4: funding source at the payment collaborator.
        let funding_source_ref = run_cancellable(
            cancel,
            "funding_source",
            self.funding.create_funding_source(
                &user.payment_customer_ref,
                &processor_token,
                &account.name,
            ),
        )
        .await
        .map_err(|error| stage_error("funding_source", error))?
        .ok_or_else(|| LinkError::missing_funding_source(&account.account_id))?;

        // Step 5: public-safe shareable id.
        let shareable_id = self
            .codec
            .encode(&account.account_id)
            .map_err(|error| stage_error("shareable_id", error))?;

        // Step 6: the only write.
        let record = run_cancellable(
            cancel,
            "persist",
            self.store.create_bank_account(NewLinkedAccount {
                owner_user_id: user.user_id.clone(),
                external_item_id: exchange.item_id.clone(),
                external_account_id: account.account_id.clone(),
                access_token: exchange.access_token.clone(),
                funding_source_ref,
                shareable_id,
            }),
        )
        .await
        .map_err(|error| stage_error("persist", error))?;

        info!(
            user_id = %user.user_id,
            linked_account_id = %record.internal_id,
            "linked account persisted"
        );
        Ok(record)
    }
}

/// Wrap a step failure with its stage name, letting cancellation pass
/// through unchanged.
fn stage_error(stage: &str, error: LinkError) -> LinkError {
    match error {
        cancelled @ LinkError::Cancelled { .. } => cancelled,
        other => LinkError::exchange_failed(stage, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        AccountsResponse, MemoryBankAccountStore, TokenExchange, UpstreamAccount,
    };
    use crate::types::{InstitutionMetadata, TransactionPage};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Aggregator double for the exchange flow.
    struct ExchangeAggregator {
        accounts_per_link: usize,
    }

    #[async_trait]
    impl AggregatorClient for ExchangeAggregator {
        async fn accounts_get(&self, access_token: &str) -> Result<AccountsResponse, LinkError> {
            assert_eq!(access_token, "access-1");
            let accounts = (0..self.accounts_per_link)
                .map(|i| UpstreamAccount {
                    account_id: format!("acct-{i}"),
                    name: "Everyday Checking".to_string(),
                    official_name: None,
                    mask: "4321".to_string(),
                    kind: "depository".to_string(),
                    subtype: "checking".to_string(),
                    available_balance: Some(Decimal::new(10_000, 2)),
                    current_balance: Decimal::new(10_500, 2),
                })
                .collect();
            Ok(AccountsResponse {
                accounts,
                institution_id: Some("ins-1".to_string()),
            })
        }

        async fn institutions_get_by_id(
            &self,
            _institution_id: &str,
            _country_codes: &[String],
        ) -> Result<InstitutionMetadata, LinkError> {
            unimplemented!("not used by exchange tests")
        }

        async fn transactions_sync(
            &self,
            _access_token: &str,
            _cursor: Option<&str>,
        ) -> Result<TransactionPage, LinkError> {
            unimplemented!("not used by exchange tests")
        }

        async fn link_token_create(
            &self,
            client_user_id: &str,
            client_name: &str,
        ) -> Result<String, LinkError> {
            Ok(format!("link-{client_user_id}-{client_name}"))
        }

        async fn item_public_token_exchange(
            &self,
            public_token: &str,
        ) -> Result<TokenExchange, LinkError> {
            if public_token == "public-good" {
                Ok(TokenExchange {
                    access_token: "access-1".to_string(),
                    item_id: "item-1".to_string(),
                })
            } else {
                Err(LinkError::upstream("aggregator", "invalid public token"))
            }
        }

        async fn processor_token_create(
            &self,
            _access_token: &str,
            account_id: &str,
            processor: &str,
        ) -> Result<String, LinkError> {
            assert_eq!(processor, "dwolla");
            Ok(format!("processor-{account_id}"))
        }
    }

    /// Funding double that can return a reference, nothing, or an error.
    struct ScriptedFunding {
        response: Result<Option<String>, LinkError>,
        calls: AtomicUsize,
    }

    impl ScriptedFunding {
        fn returning(response: Result<Option<String>, LinkError>) -> Arc<Self> {
            Arc::new(ScriptedFunding {
                response,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FundingSourceClient for ScriptedFunding {
        async fn create_funding_source(
            &self,
            _customer_ref: &str,
            _processor_token: &str,
            _display_name: &str,
        ) -> Result<Option<String>, LinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    fn config() -> LinkConfig {
        LinkConfig {
            aggregator_url: "https://sandbox.plaid.com".to_string(),
            aggregator_client_id: "client-1".to_string(),
            aggregator_secret: "secret-1".to_string(),
            payments_url: "https://api-sandbox.dwolla.com".to_string(),
            payments_api_key: "pay-key".to_string(),
            processor_name: "dwolla".to_string(),
            country_codes: vec!["US".to_string()],
            link_products: vec!["auth".to_string()],
            codec_key: [5u8; 32],
            request_timeout: Duration::from_secs(15),
            max_concurrency: 4,
        }
    }

    fn user() -> LinkUser {
        LinkUser {
            user_id: "user-1".to_string(),
            display_name: "Ada Lovelace".to_string(),
            payment_customer_ref: "https://pay.example.com/customers/cus-1".to_string(),
        }
    }

    fn manager(
        accounts_per_link: usize,
        funding: Arc<ScriptedFunding>,
        store: Arc<MemoryBankAccountStore>,
    ) -> LinkLifecycleManager {
        LinkLifecycleManager::new(
            Arc::new(ExchangeAggregator { accounts_per_link }),
            funding,
            store,
            &config(),
        )
    }

    #[tokio::test]
    async fn successful_exchange_persists_a_complete_record() {
        let store = Arc::new(MemoryBankAccountStore::new());
        let funding = ScriptedFunding::returning(Ok(Some(
            "https://pay.example.com/funding-sources/fs-1".to_string(),
        )));
        let manager = manager(1, funding, Arc::clone(&store));

        let record = manager
            .exchange_public_token("public-good", &user(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(record.owner_user_id, "user-1");
        assert_eq!(record.external_item_id, "item-1");
        assert_eq!(record.external_account_id, "acct-0");
        assert_eq!(
            record.funding_source_ref,
            "https://pay.example.com/funding-sources/fs-1"
        );
        // The shareable id decodes back to the account id.
        let codec = ShareableIdCodec::new(config().codec_key);
        assert_eq!(codec.decode(&record.shareable_id).unwrap(), "acct-0");
        // And the record is actually in the store.
        assert_eq!(store.get_banks_by_user("user-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_exchange_persists_nothing() {
        let store = Arc::new(MemoryBankAccountStore::new());
        let funding = ScriptedFunding::returning(Ok(Some("fs-1".to_string())));
        let manager = manager(1, funding, Arc::clone(&store));

        let err = manager
            .exchange_public_token("public-bad", &user(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LinkError::LinkExchangeFailed { ref stage, .. } if stage == "public_token_exchange"
        ));
        assert!(store.get_banks_by_user("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_funding_source_reference_aborts_before_persist() {
        let store = Arc::new(MemoryBankAccountStore::new());
        let funding = ScriptedFunding::returning(Ok(None));
        let manager = manager(1, Arc::clone(&funding), Arc::clone(&store));

        let err = manager
            .exchange_public_token("public-good", &user(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, LinkError::missing_funding_source("acct-0"));
        assert_eq!(funding.calls.load(Ordering::SeqCst), 1);
        assert!(store.get_banks_by_user("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn funding_failure_aborts_before_persist() {
        let store = Arc::new(MemoryBankAccountStore::new());
        let funding =
            ScriptedFunding::returning(Err(LinkError::upstream("payments", "503 unavailable")));
        let manager = manager(1, funding, Arc::clone(&store));

        let err = manager
            .exchange_public_token("public-good", &user(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LinkError::LinkExchangeFailed { ref stage, .. } if stage == "funding_source"
        ));
        assert!(store.get_banks_by_user("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn multi_account_exchange_is_rejected() {
        let store = Arc::new(MemoryBankAccountStore::new());
        let funding = ScriptedFunding::returning(Ok(Some("fs-1".to_string())));
        let manager = manager(2, funding, Arc::clone(&store));

        let err = manager
            .exchange_public_token("public-good", &user(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LinkError::LinkExchangeFailed { ref stage, .. } if stage == "accounts_get"
        ));
        assert!(store.get_banks_by_user("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_surfaces_cancelled_and_persists_nothing() {
        let store = Arc::new(MemoryBankAccountStore::new());
        let funding = ScriptedFunding::returning(Ok(Some("fs-1".to_string())));
        let manager = manager(1, funding, Arc::clone(&store));

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = manager
            .exchange_public_token("public-good", &user(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, LinkError::cancelled("public_token_exchange"));
        assert!(store.get_banks_by_user("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn link_token_creation_passes_user_identity() {
        let manager = manager(
            1,
            ScriptedFunding::returning(Ok(Some("fs-1".to_string()))),
            Arc::new(MemoryBankAccountStore::new()),
        );

        let token = manager.create_link_token(&user()).await.unwrap();
        assert_eq!(token, "link-user-1-Ada Lovelace");
    }
}
