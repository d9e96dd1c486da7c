//! Trade-history query parameters

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::common::errors::{HedgeError, Result};

/// Page size when no limit is given
pub const DEFAULT_LIMIT: u32 = 50;

/// Largest page size; bigger requests are clamped, not rejected
pub const MAX_LIMIT: u32 = 200;

/// Validated filters for the trade-history endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeHistoryQuery {
    pub symbol: Option<String>,
    /// Matches either leg's exchange
    pub exchange: Option<String>,
    pub limit: u32,
}

impl Default for TradeHistoryQuery {
    fn default() -> Self {
        Self {
            symbol: None,
            exchange: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl TradeHistoryQuery {
    /// Build a query from raw request parameters
    ///
    /// Blank values count as absent. A limit that is not a number or is
    /// below 1 is rejected with `InvalidLimit`; fractions are truncated.
    pub fn from_params(
        symbol: Option<&str>,
        exchange: Option<&str>,
        limit: Option<&str>,
    ) -> Result<Self> {
        let limit = match non_blank(limit) {
            None => DEFAULT_LIMIT,
            Some(raw) => {
                let value: Decimal = raw
                    .parse()
                    .map_err(|_| HedgeError::InvalidLimit(raw.to_string()))?;
                if value < Decimal::ONE {
                    return Err(HedgeError::InvalidLimit(raw.to_string()));
                }
                value
                    .trunc()
                    .min(Decimal::from(MAX_LIMIT))
                    .to_u32()
                    .unwrap_or(MAX_LIMIT)
            }
        };

        Ok(Self {
            symbol: non_blank(symbol).map(|s| s.to_uppercase()),
            exchange: non_blank(exchange).map(|e| e.to_uppercase()),
            limit,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
