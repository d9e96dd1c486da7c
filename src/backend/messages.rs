//! Wire types for the subscription backend

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::common::timestamp;
use crate::common::types::{
    CompletedDeal, Exchange, Opportunity, PositionType, Subscription, SubscriptionStatus,
};

/// Subscription as returned by the list and create endpoints
///
/// Every field except `id` and `status` is optional so that one malformed
/// record can be inspected and dropped without failing the whole listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub id: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub position_type: Option<PositionType>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub leverage: Option<u32>,
    #[serde(default)]
    pub margin: Option<Decimal>,
    #[serde(default)]
    pub primary_credential_id: Option<String>,
    #[serde(default)]
    pub primary_exchange: Option<Exchange>,
    #[serde(default)]
    pub hedge_exchange: Option<Exchange>,
    #[serde(default)]
    pub hedge_credential_id: Option<String>,
    #[serde(default)]
    pub funding_rate: Option<Decimal>,
    #[serde(default, with = "timestamp::option")]
    pub next_funding_time: Option<DateTime<Utc>>,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub execution_delay: Option<u32>,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub hedge_entry_price: Option<Decimal>,
    #[serde(default)]
    pub funding_earned: Option<Decimal>,
    #[serde(default)]
    pub realized_pnl: Option<Decimal>,
    #[serde(default, with = "timestamp::option")]
    pub executed_at: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    /// Whether this record closed with a fill
    pub fn is_completed_with_fill(&self) -> bool {
        self.status == SubscriptionStatus::Completed && self.entry_price.is_some()
    }

    /// Convert into a registry entry, naming the first missing field on failure
    pub fn to_subscription(&self) -> std::result::Result<Subscription, String> {
        fn require<T: Clone>(value: &Option<T>, field: &str) -> std::result::Result<T, String> {
            value.clone().ok_or_else(|| format!("missing {}", field))
        }

        Ok(Subscription {
            id: self.id.clone(),
            symbol: require(&self.symbol, "symbol")?,
            position_type: require(&self.position_type, "positionType")?,
            quantity: require(&self.quantity, "quantity")?,
            leverage: require(&self.leverage, "leverage")?,
            margin: self.margin,
            primary_credential_id: require(&self.primary_credential_id, "primaryCredentialId")?,
            primary_exchange: self.primary_exchange,
            hedge_exchange: require(&self.hedge_exchange, "hedgeExchange")?,
            hedge_credential_id: require(&self.hedge_credential_id, "hedgeCredentialId")?,
            funding_rate: self.funding_rate.unwrap_or_default(),
            next_funding_time: require(&self.next_funding_time, "nextFundingTime")?,
            status: self.status,
            execution_delay: self.execution_delay,
            countdown: None,
        })
    }

    /// Historical record for a completed, filled subscription
    pub fn to_completed_deal(&self) -> Option<CompletedDeal> {
        if !self.is_completed_with_fill() {
            return None;
        }
        Some(CompletedDeal {
            subscription_id: self.id.clone(),
            symbol: self.symbol.clone()?,
            position_type: self.position_type?,
            quantity: self.quantity.unwrap_or_default(),
            entry_price: self.entry_price?,
            hedge_entry_price: self.hedge_entry_price,
            funding_earned: self.funding_earned,
            realized_pnl: self.realized_pnl,
            executed_at: self.executed_at,
        })
    }
}

/// Body of `POST /funding-arbitrage/subscribe`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub funding_rate: Decimal,
    #[serde(with = "timestamp")]
    pub next_funding_time: DateTime<Utc>,
    pub position_type: PositionType,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    pub primary_credential_id: String,
    pub hedge_exchange: Exchange,
    pub hedge_credential_id: String,
    pub leverage: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub margin: Decimal,
    pub execution_delay: u32,
}

/// Result of a delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The backend no longer knows the subscription; callers treat it as success
    NotFound,
}

/// Error payload returned by the backend
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl ApiErrorResponse {
    pub fn describe(&self) -> Option<String> {
        self.message.clone().or_else(|| self.error.clone())
    }
}

/// Opportunity listing; the backend answers either with a bare array or
/// with a `data` envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OpportunitiesResponse {
    List(Vec<Opportunity>),
    Envelope {
        #[serde(default)]
        data: Option<Vec<Opportunity>>,
        #[serde(default)]
        opportunities: Option<Vec<Opportunity>>,
    },
}

impl OpportunitiesResponse {
    pub fn into_vec(self) -> Vec<Opportunity> {
        match self {
            OpportunitiesResponse::List(list) => list,
            OpportunitiesResponse::Envelope {
                data,
                opportunities,
            } => data.or(opportunities).unwrap_or_default(),
        }
    }
}

/// Subscription listing; bare array or `data`/`subscriptions` envelope
///
/// Items are kept as raw JSON so each one can be decoded on its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SubscriptionsResponse {
    List(Vec<Value>),
    Envelope {
        #[serde(default)]
        data: Option<Vec<Value>>,
        #[serde(default)]
        subscriptions: Option<Vec<Value>>,
    },
}

impl SubscriptionsResponse {
    pub fn into_values(self) -> Vec<Value> {
        match self {
            SubscriptionsResponse::List(list) => list,
            SubscriptionsResponse::Envelope {
                data,
                subscriptions,
            } => data.or(subscriptions).unwrap_or_default(),
        }
    }
}

/// Create response; some deployments wrap the record in `data` or `subscription`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CreateSubscriptionResponse {
    Record(SubscriptionRecord),
    Data { data: SubscriptionRecord },
    Subscription { subscription: SubscriptionRecord },
}

impl CreateSubscriptionResponse {
    pub fn into_record(self) -> SubscriptionRecord {
        match self {
            CreateSubscriptionResponse::Record(r) => r,
            CreateSubscriptionResponse::Data { data } => data,
            CreateSubscriptionResponse::Subscription { subscription } => subscription,
        }
    }
}

/// Extract the available margin from a wallet-balance response
///
/// Known shapes, tried in order:
/// - `list[0].totalAvailableBalance` (optionally under `result`)
/// - `balance.availableMargin`, falling back to `balance.balance`
/// - top-level `availableBalance` or `available`
pub fn normalize_available_margin(body: &Value) -> Option<Decimal> {
    let list_entry = body
        .pointer("/list/0/totalAvailableBalance")
        .or_else(|| body.pointer("/result/list/0/totalAvailableBalance"));
    if let Some(value) = list_entry.and_then(decimal_from_value) {
        return Some(value);
    }

    if let Some(balance) = body.get("balance") {
        if let Some(value) = balance
            .get("availableMargin")
            .and_then(decimal_from_value)
            .or_else(|| balance.get("balance").and_then(decimal_from_value))
        {
            return Some(value);
        }
    }

    ["availableBalance", "available"]
        .iter()
        .find_map(|key| body.get(*key).and_then(decimal_from_value))
}

/// Numeric JSON value or numeric string as a Decimal
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) if !s.trim().is_empty() => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()
        }
        _ => None,
    }
}
