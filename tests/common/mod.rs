//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use funding_hedge::backend::messages::{CreateSubscriptionRequest, DeleteOutcome, SubscriptionRecord};
use funding_hedge::common::clock::ManualClock;
use funding_hedge::common::errors::{HedgeError, Result};
use funding_hedge::common::traits::SubscriptionBackend;
use funding_hedge::common::types::{
    Credential, Environment, Exchange, PositionType, SubscriptionStatus, TickerPrice,
};
use funding_hedge::engine::{NotificationBus, PositionSizer, SubscriptionCoordinator, SubscriptionRequest};

/// Backend call observed by [`FakeBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Create(String),
    Delete(String),
    Execute(String),
}

#[derive(Default)]
struct FakeState {
    records: Vec<SubscriptionRecord>,
    calls: Vec<Call>,
    next_id: u64,
    fail_create: Option<(u16, String)>,
    fail_delete: Option<(u16, String)>,
    /// Highest number of ACTIVE records ever held for one (symbol, primary, hedge)
    max_active_per_key: usize,
}

/// In-memory stand-in for the subscription backend
///
/// Records every call in order and tracks how many active subscriptions
/// existed at once for each tuple.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, record: SubscriptionRecord) {
        self.state.lock().unwrap().records.push(record);
    }

    /// Drop a record without going through the API
    pub fn remove(&self, id: &str) {
        self.state.lock().unwrap().records.retain(|r| r.id != id);
    }

    pub fn fail_next_create(&self, status: u16, message: &str) {
        self.state.lock().unwrap().fail_create = Some((status, message.to_string()));
    }

    pub fn fail_next_delete(&self, status: u16, message: &str) {
        self.state.lock().unwrap().fail_delete = Some((status, message.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn record_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().records.iter().map(|r| r.id.clone()).collect()
    }

    pub fn max_active_per_key(&self) -> usize {
        self.state.lock().unwrap().max_active_per_key
    }
}

fn key_of(record: &SubscriptionRecord) -> (Option<String>, Option<String>, Option<String>) {
    (
        record.symbol.clone(),
        record.primary_credential_id.clone(),
        record.hedge_credential_id.clone(),
    )
}

#[async_trait]
impl SubscriptionBackend for FakeBackend {
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionRecord>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List);
        Ok(state.records.clone())
    }

    async fn create_subscription(&self, request: &CreateSubscriptionRequest) -> Result<SubscriptionRecord> {
        // Yield so a concurrently scheduled task could interleave here
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(request.symbol.clone()));
        if let Some((status, message)) = state.fail_create.take() {
            return Err(HedgeError::Backend { status, message });
        }

        state.next_id += 1;
        let record = SubscriptionRecord {
            id: format!("sub_{}", state.next_id),
            symbol: Some(request.symbol.clone()),
            position_type: Some(request.position_type),
            quantity: Some(request.quantity),
            leverage: Some(request.leverage),
            margin: Some(request.margin),
            primary_credential_id: Some(request.primary_credential_id.clone()),
            primary_exchange: None,
            hedge_exchange: Some(request.hedge_exchange),
            hedge_credential_id: Some(request.hedge_credential_id.clone()),
            funding_rate: Some(request.funding_rate),
            next_funding_time: Some(request.next_funding_time),
            status: SubscriptionStatus::Active,
            execution_delay: Some(request.execution_delay),
            entry_price: None,
            hedge_entry_price: None,
            funding_earned: None,
            realized_pnl: None,
            executed_at: None,
        };
        state.records.push(record.clone());

        let key = key_of(&record);
        let active_for_key = state
            .records
            .iter()
            .filter(|r| r.status == SubscriptionStatus::Active && key_of(r) == key)
            .count();
        state.max_active_per_key = state.max_active_per_key.max(active_for_key);
        Ok(record)
    }

    async fn delete_subscription(&self, subscription_id: &str) -> Result<DeleteOutcome> {
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(subscription_id.to_string()));
        if let Some((status, message)) = state.fail_delete.take() {
            return Err(HedgeError::Backend { status, message });
        }
        let before = state.records.len();
        state.records.retain(|r| r.id != subscription_id);
        if state.records.len() == before {
            Ok(DeleteOutcome::NotFound)
        } else {
            Ok(DeleteOutcome::Deleted)
        }
    }

    async fn execute_subscription(&self, subscription_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Execute(subscription_id.to_string()));
        if state.records.iter().any(|r| r.id == subscription_id) {
            Ok(())
        } else {
            Err(HedgeError::SubscriptionNotFound(subscription_id.to_string()))
        }
    }
}

/// Fixed starting instant for clock-driven tests
pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200, 0).unwrap()
}

pub fn credential(id: &str, exchange: Exchange) -> Credential {
    Credential {
        id: id.to_string(),
        exchange,
        environment: Environment::Mainnet,
        is_active: true,
    }
}

/// Coordinator wired to a fake backend, a manual clock and a long-lived bus
pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub clock: Arc<ManualClock>,
    pub bus: NotificationBus,
    pub coordinator: Arc<SubscriptionCoordinator>,
}

pub fn harness() -> Harness {
    let backend = FakeBackend::new();
    let clock = Arc::new(ManualClock::new(start_time()));
    let bus = NotificationBus::new(std::time::Duration::from_secs(300), 100, clock.clone());
    let coordinator = Arc::new(SubscriptionCoordinator::new(
        backend.clone(),
        bus.clone(),
        clock.clone(),
    ));
    Harness {
        backend,
        clock,
        bus,
        coordinator,
    }
}

/// A valid request for `symbol` on the Bybit/BingX credential pair
pub fn request(symbol: &str, margin: Decimal, leverage: u32, funding_in_secs: i64) -> SubscriptionRequest {
    let calculation = PositionSizer::default()
        .compute(symbol, TickerPrice::new(Some(dec!(50000)), None), Some(margin), leverage)
        .unwrap();
    SubscriptionRequest {
        symbol: symbol.to_string(),
        position_type: PositionType::Long,
        calculation: Some(calculation),
        primary_credential: Some(credential("cred_bybit", Exchange::Bybit)),
        hedge_credential: Some(credential("cred_bingx", Exchange::Bingx)),
        leverage,
        margin: Some(margin),
        execution_delay: 5,
        funding_rate: dec!(0.0003),
        next_funding_time: start_time() + Duration::seconds(funding_in_secs),
    }
}

/// Raw backend record as it appears in the listing
pub fn record_json(id: &str, symbol: &str, status: &str) -> Value {
    json!({
        "id": id,
        "symbol": symbol,
        "positionType": "short",
        "quantity": 0.02,
        "leverage": 5,
        "margin": 200,
        "primaryCredentialId": "cred_bybit",
        "primaryExchange": "BYBIT",
        "hedgeExchange": "BINGX",
        "hedgeCredentialId": "cred_bingx",
        "fundingRate": 0.0004,
        "nextFundingTime": start_time().timestamp_millis() + 3_600_000,
        "status": status
    })
}

pub fn record(id: &str, symbol: &str, status: &str) -> SubscriptionRecord {
    serde_json::from_value(record_json(id, symbol, status)).unwrap()
}

/// Sample wallet-balance payloads in the shapes the backend relays
pub mod balance_responses {
    pub const LIST_SHAPE: &str = r#"{"data": {"list": [{"totalAvailableBalance": "152.37"}]}}"#;

    pub const BALANCE_SHAPE: &str = r#"{"balance": {"availableMargin": "48.1", "balance": "60"}}"#;

    pub const SENTINEL: &str = r#"{"balance": {"availableMargin": 999999999}}"#;
}

/// Number of calls matching `pred`
pub fn count_calls(calls: &[Call], pred: impl Fn(&Call) -> bool) -> usize {
    calls.iter().filter(|c| pred(c)).count()
}
