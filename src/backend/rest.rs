//! REST API client for the funding-arbitrage backend

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::auth::BearerAuth;
use super::messages::*;
use crate::common::errors::{HedgeError, Result};
use crate::common::traits::{BalanceSource, OpportunitySource, SubscriptionBackend};
use crate::common::types::{Credential, Opportunity};
use crate::config::types::BackendConfig;
use crate::history::dto::TradeHistoryResponse;
use crate::history::query::TradeHistoryQuery;

/// Default request timeout; the backend itself imposes none
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

const SUBSCRIBE_PATH: &str = "/funding-arbitrage/subscribe";
const EXECUTE_PATH: &str = "/funding-arbitrage/execute";
const OPPORTUNITIES_PATH: &str = "/funding-arbitrage/opportunities";
const TRADE_HISTORY_PATH: &str = "/arbitrage/trade-history";

/// REST API client for the subscription backend
#[derive(Debug, Clone)]
pub struct BackendRestClient {
    /// HTTP client
    client: Client,
    /// Base URL for the backend API
    base_url: String,
    /// Session token for authenticated endpoints
    auth: Option<BearerAuth>,
}

impl BackendRestClient {
    /// Create a new REST client (unauthenticated)
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a new REST client with custom timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HedgeError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: None,
        })
    }

    /// Build a client from configuration, attaching the token when present
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let client = Self::with_timeout(
            &config.base_url,
            Duration::from_secs(config.request_timeout_seconds),
        )?;
        match config.auth_token.as_deref() {
            Some(token) => Ok(client.with_auth(BearerAuth::new(token)?)),
            None => Ok(client),
        }
    }

    /// Set the bearer token for authenticated requests
    pub fn with_auth(mut self, auth: BearerAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Every backend route requires a session
    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        match &self.auth {
            Some(auth) => Ok(auth.apply_to_request(request)),
            None => Err(HedgeError::AuthRequired),
        }
    }

    /// Turn a non-success response into a typed error
    async fn error_from_response(response: Response) -> HedgeError {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return HedgeError::AuthRequired;
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorResponse>(&body)
            .ok()
            .and_then(|e| e.describe())
            .unwrap_or(body);
        HedgeError::Backend {
            status: status.as_u16(),
            message,
        }
    }

    /// Fetch the raw wallet-balance payload for a credential
    #[instrument(skip(self, credential), fields(exchange = %credential.exchange, credential_id = %credential.id))]
    pub async fn wallet_balance(&self, credential: &Credential) -> Result<Value> {
        let url = self.url(&format!("/{}/wallet-balance", credential.exchange.path_segment()));
        debug!("Fetching wallet balance from: {}", url);

        let environment = credential.environment.to_string();
        let request = self.client.get(&url).query(&[
            ("environment", environment.as_str()),
            ("credentialId", credential.id.as_str()),
        ]);
        let response = self.authorized(request)?.send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: Value = response.json().await?;
        // Some routes wrap the payload in `data`
        Ok(match body.get("data") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => body,
        })
    }

    /// Query closed positions through the trade-history endpoint
    #[instrument(skip(self))]
    pub async fn trade_history(&self, query: &TradeHistoryQuery) -> Result<TradeHistoryResponse> {
        let url = self.url(TRADE_HISTORY_PATH);
        let mut params = vec![("limit", query.limit.to_string())];
        if let Some(symbol) = &query.symbol {
            params.push(("symbol", symbol.clone()));
        }
        if let Some(exchange) = &query.exchange {
            params.push(("exchange", exchange.clone()));
        }
        debug!("Fetching trade history from: {}", url);

        let response = self
            .authorized(self.client.get(&url).query(&params))?
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl SubscriptionBackend for BackendRestClient {
    #[instrument(skip(self))]
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionRecord>> {
        let url = self.url(SUBSCRIBE_PATH);
        debug!("Fetching subscriptions from: {}", url);

        let response = self.authorized(self.client.get(&url))?.send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let listing: SubscriptionsResponse = response.json().await?;
        let records = listing
            .into_values()
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<SubscriptionRecord>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Dropping undecodable subscription record: {}", e);
                    None
                }
            })
            .collect();
        Ok(records)
    }

    #[instrument(skip(self, request), fields(symbol = %request.symbol))]
    async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> Result<SubscriptionRecord> {
        let url = self.url(SUBSCRIBE_PATH);
        debug!("Creating subscription at: {}", url);

        let response = self
            .authorized(self.client.post(&url).json(request))?
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let created: CreateSubscriptionResponse = response.json().await?;
        Ok(created.into_record())
    }

    #[instrument(skip(self))]
    async fn delete_subscription(&self, subscription_id: &str) -> Result<DeleteOutcome> {
        let url = self.url(SUBSCRIBE_PATH);
        debug!("Deleting subscription {} at: {}", subscription_id, url);

        let request = self
            .client
            .delete(&url)
            .query(&[("subscriptionId", subscription_id)]);
        let response = self.authorized(request)?.send().await?;

        if response.status().is_success() {
            return Ok(DeleteOutcome::Deleted);
        }

        let err = Self::error_from_response(response).await;
        if err.is_not_found() {
            debug!("Subscription {} already gone on the backend", subscription_id);
            return Ok(DeleteOutcome::NotFound);
        }
        Err(err)
    }

    #[instrument(skip(self))]
    async fn execute_subscription(&self, subscription_id: &str) -> Result<()> {
        let url = self.url(&format!("{}/{}", EXECUTE_PATH, subscription_id));
        debug!("Triggering execution at: {}", url);

        let response = self.authorized(self.client.post(&url))?.send().await?;

        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            if err.is_not_found() {
                return Err(HedgeError::SubscriptionNotFound(subscription_id.to_string()));
            }
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl BalanceSource for BackendRestClient {
    async fn available_margin(&self, credential: &Credential) -> Result<Decimal> {
        let body = self.wallet_balance(credential).await?;
        normalize_available_margin(&body).ok_or_else(|| {
            HedgeError::InvalidResponse(format!(
                "Unrecognized {} wallet-balance response",
                credential.exchange
            ))
        })
    }
}

#[async_trait]
impl OpportunitySource for BackendRestClient {
    #[instrument(skip(self))]
    async fn fetch_opportunities(&self) -> Result<Vec<Opportunity>> {
        let url = self.url(OPPORTUNITIES_PATH);
        debug!("Fetching opportunities from: {}", url);

        let response = self.authorized(self.client.get(&url))?.send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let listing: OpportunitiesResponse = response.json().await?;
        Ok(listing.into_vec())
    }
}
