//! Integration tests for the trade-history handler over the in-memory store

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use std::sync::Arc;

use funding_hedge::common::errors::{HedgeError, Result};
use funding_hedge::common::types::{Exchange, PositionType, SubscriptionStatus};
use funding_hedge::history::{
    ClosedPosition, ClosedPositionStore, InMemoryClosedPositionStore, TradeHistoryQuery,
    TradeHistoryService,
};

const USER: &str = "user_1";

fn closed_at(minutes_ago: i64) -> Option<DateTime<Utc>> {
    Some(DateTime::from_timestamp(1_704_067_200, 0).unwrap() - Duration::minutes(minutes_ago))
}

fn position(id: &str, symbol: &str, status: SubscriptionStatus, minutes_ago: Option<i64>) -> ClosedPosition {
    ClosedPosition {
        id: id.to_string(),
        symbol: symbol.to_string(),
        position_type: PositionType::Long,
        status,
        primary_exchange: Exchange::Bybit,
        hedge_exchange: Exchange::Bingx,
        quantity: dec!(0.5),
        leverage: 3,
        margin: None,
        entry_price: Some(dec!(3000)),
        exit_price: Some(dec!(3010)),
        primary_fees: Some(dec!(1.5)),
        hedge_fees: Some(dec!(1.2)),
        funding_earned: Some(dec!(2.4)),
        realized_pnl: Some(dec!(8.3)),
        opened_at: None,
        closed_at: minutes_ago.and_then(closed_at),
    }
}

fn service_with(rows: Vec<ClosedPosition>) -> TradeHistoryService {
    let store = InMemoryClosedPositionStore::new();
    for row in rows {
        store.insert(USER, row);
    }
    TradeHistoryService::new(Arc::new(store))
}

#[tokio::test]
async fn test_only_closed_rows_newest_first() {
    let service = service_with(vec![
        position("old", "ETHUSDT", SubscriptionStatus::Completed, Some(60)),
        position("new", "ETHUSDT", SubscriptionStatus::Cancelled, Some(5)),
        position("failed", "BTCUSDT", SubscriptionStatus::Error, Some(30)),
        position("open", "ETHUSDT", SubscriptionStatus::Active, Some(1)),
        position("no_close", "ETHUSDT", SubscriptionStatus::Completed, None),
    ]);

    let response = service.handle(Some(USER), None, None, None).await.unwrap();

    let ids: Vec<&str> = response.data.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "failed", "old"]);
    assert_eq!(response.count, 3);
}

#[tokio::test]
async fn test_entry_figures() {
    let service = service_with(vec![position("p", "ETHUSDT", SubscriptionStatus::Completed, Some(1))]);

    let response = service.handle(Some(USER), None, None, None).await.unwrap();
    let entry = &response.data[0];

    // No margin recorded: size falls back to quantity * entry price
    assert_eq!(entry.position_size_usdt, Some(dec!(1500)));
    assert_eq!(entry.total_fees, dec!(2.7));
    assert_eq!(entry.net_pnl, Some(dec!(5.6)));
}

#[tokio::test]
async fn test_filters_and_limit() {
    let mut rows = Vec::new();
    for i in 0..5 {
        rows.push(position(&format!("eth_{}", i), "ETHUSDT", SubscriptionStatus::Completed, Some(i)));
    }
    let mut okx = position("btc_okx", "BTCUSDT", SubscriptionStatus::Completed, Some(2));
    okx.hedge_exchange = Exchange::Okx;
    rows.push(okx);
    let service = service_with(rows);

    let eth = service
        .handle(Some(USER), Some("ethusdt"), None, Some("2"))
        .await
        .unwrap();
    assert_eq!(eth.count, 2);
    assert_eq!(eth.data[0].id, "eth_0");

    let by_exchange = service
        .handle(Some(USER), None, Some("okx"), None)
        .await
        .unwrap();
    assert_eq!(by_exchange.count, 1);
    assert_eq!(by_exchange.data[0].id, "btc_okx");
}

#[tokio::test]
async fn test_auth_and_limit_errors_map_to_http() {
    let service = service_with(Vec::new());

    let unauthenticated = service.handle(None, None, None, None).await;
    let (status, body) = TradeHistoryService::to_http(&unauthenticated);
    assert_eq!(status, 401);
    assert_eq!(body["code"], "AUTH_REQUIRED");

    let bad_limit = service.handle(Some(USER), None, None, Some("-10")).await;
    let (status, body) = TradeHistoryService::to_http(&bad_limit);
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_LIMIT");

    let ok = service.handle(Some(USER), None, None, Some("500")).await;
    let (status, body) = TradeHistoryService::to_http(&ok);
    assert_eq!(status, 200);
    assert_eq!(body["count"], 0);
}

struct BrokenStore;

#[async_trait]
impl ClosedPositionStore for BrokenStore {
    async fn closed_positions(&self, _user_id: &str, _query: &TradeHistoryQuery) -> Result<Vec<ClosedPosition>> {
        Err(HedgeError::Network("connection refused".into()))
    }
}

#[tokio::test]
async fn test_store_failure_is_internal_error() {
    let service = TradeHistoryService::new(Arc::new(BrokenStore));

    let result = service.handle(Some(USER), None, None, None).await;
    let (status, body) = TradeHistoryService::to_http(&result);

    assert_eq!(status, 500);
    assert_eq!(body["code"], "INTERNAL_ERROR");
    assert_eq!(body["error"], "Failed to fetch trade history");
}
