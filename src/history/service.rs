//! Trade-history read path: store port, in-memory store and request handler

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, instrument};

use super::dto::{ClosedPosition, TradeHistoryEntry, TradeHistoryResponse};
use super::query::TradeHistoryQuery;
use crate::common::errors::{ErrorBody, HedgeError, Result};

/// Source of closed positions for one user
///
/// Implementations return only closed rows (terminal status with a close
/// time) matching the query, newest close first, at most `query.limit`.
#[async_trait]
pub trait ClosedPositionStore: Send + Sync {
    async fn closed_positions(
        &self,
        user_id: &str,
        query: &TradeHistoryQuery,
    ) -> Result<Vec<ClosedPosition>>;
}

/// Store backed by a map of user id to rows
#[derive(Debug, Default)]
pub struct InMemoryClosedPositionStore {
    rows: RwLock<HashMap<String, Vec<ClosedPosition>>>,
}

impl InMemoryClosedPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: &str, position: ClosedPosition) {
        self.rows
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(user_id.to_string())
            .or_default()
            .push(position);
    }
}

#[async_trait]
impl ClosedPositionStore for InMemoryClosedPositionStore {
    async fn closed_positions(
        &self,
        user_id: &str,
        query: &TradeHistoryQuery,
    ) -> Result<Vec<ClosedPosition>> {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<ClosedPosition> = rows
            .get(user_id)
            .map(|list| {
                list.iter()
                    .filter(|p| p.is_closed())
                    .filter(|p| query.symbol.as_ref().map_or(true, |s| p.symbol.eq_ignore_ascii_case(s)))
                    .filter(|p| query.exchange.as_ref().map_or(true, |e| p.involves_exchange(e)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        matching.sort_by(|a, b| b.closed_at.cmp(&a.closed_at));
        matching.truncate(query.limit as usize);
        Ok(matching)
    }
}

/// Handles `GET /arbitrage/trade-history`
pub struct TradeHistoryService {
    store: Arc<dyn ClosedPositionStore>,
}

impl TradeHistoryService {
    pub fn new(store: Arc<dyn ClosedPositionStore>) -> Self {
        Self { store }
    }

    /// Authenticate, validate parameters, query and map to DTOs
    ///
    /// Store failures surface as `Internal` so the caller answers 500 with
    /// `INTERNAL_ERROR`; the underlying message is only logged.
    #[instrument(skip(self))]
    pub async fn handle(
        &self,
        user_id: Option<&str>,
        symbol: Option<&str>,
        exchange: Option<&str>,
        limit: Option<&str>,
    ) -> Result<TradeHistoryResponse> {
        let user_id = user_id
            .filter(|u| !u.trim().is_empty())
            .ok_or(HedgeError::AuthRequired)?;
        let query = TradeHistoryQuery::from_params(symbol, exchange, limit)?;

        let rows = self
            .store
            .closed_positions(user_id, &query)
            .await
            .map_err(|e| {
                error!("Trade history query failed: {}", e);
                HedgeError::Internal(e.to_string())
            })?;

        let entries: Vec<TradeHistoryEntry> = rows
            .iter()
            .filter(|p| p.is_closed())
            .take(query.limit as usize)
            .map(TradeHistoryEntry::from)
            .collect();
        Ok(TradeHistoryResponse::new(entries))
    }

    /// HTTP status and JSON body for a `handle` result
    pub fn to_http(result: &Result<TradeHistoryResponse>) -> (u16, Value) {
        match result {
            Ok(response) => (200, serde_json::to_value(response).unwrap_or(Value::Null)),
            Err(e) => (
                e.http_status(),
                serde_json::to_value(ErrorBody::from(e)).unwrap_or(Value::Null),
            ),
        }
    }
}
