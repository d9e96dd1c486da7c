//! Trade-history reporting
//!
//! A filtered query over closed positions plus the DTO mapping served to
//! clients. The store is a port so the same handler runs against a database
//! or the in-memory store.

pub mod dto;
pub mod query;
pub mod service;

pub use dto::{ClosedPosition, TradeHistoryEntry, TradeHistoryResponse};
pub use query::TradeHistoryQuery;
pub use service::{ClosedPositionStore, InMemoryClosedPositionStore, TradeHistoryService};
