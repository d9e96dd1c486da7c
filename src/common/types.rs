//! Domain types shared by the engine, backend client and history layer

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Exchange hosting one leg of a hedged position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    Bybit,
    Bingx,
    Mexc,
    Binance,
    Okx,
    Gateio,
    Bitget,
    Kucoin,
}

impl Exchange {
    /// Path segment used by the per-exchange backend routes
    pub fn path_segment(&self) -> &'static str {
        match self {
            Exchange::Bybit => "bybit",
            Exchange::Bingx => "bingx",
            Exchange::Mexc => "mexc",
            Exchange::Binance => "binance",
            Exchange::Okx => "okx",
            Exchange::Gateio => "gateio",
            Exchange::Bitget => "bitget",
            Exchange::Kucoin => "kucoin",
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path_segment().to_uppercase())
    }
}

impl std::str::FromStr for Exchange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bybit" => Ok(Exchange::Bybit),
            "bingx" => Ok(Exchange::Bingx),
            "mexc" => Ok(Exchange::Mexc),
            "binance" => Ok(Exchange::Binance),
            "okx" => Ok(Exchange::Okx),
            "gateio" | "gate" => Ok(Exchange::Gateio),
            "bitget" => Ok(Exchange::Bitget),
            "kucoin" => Ok(Exchange::Kucoin),
            other => Err(format!("unknown exchange: {}", other)),
        }
    }
}

/// Account environment a credential belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Environment {
    Mainnet,
    Testnet,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Mainnet => write!(f, "MAINNET"),
            Environment::Testnet => write!(f, "TESTNET"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" => Ok(Environment::Mainnet),
            "testnet" | "demo" => Ok(Environment::Testnet),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

/// Exchange account used for one leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    pub exchange: Exchange,
    pub environment: Environment,
    pub is_active: bool,
}

/// Direction of the primary leg; the hedge leg takes the opposite side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    Long,
    Short,
}

impl PositionType {
    pub fn opposite(&self) -> Self {
        match self {
            PositionType::Long => PositionType::Short,
            PositionType::Short => PositionType::Long,
        }
    }
}

impl std::fmt::Display for PositionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionType::Long => write!(f, "long"),
            PositionType::Short => write!(f, "short"),
        }
    }
}

impl std::str::FromStr for PositionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" => Ok(PositionType::Long),
            "short" => Ok(PositionType::Short),
            other => Err(format!("unknown position type: {}", other)),
        }
    }
}

/// Lifecycle status reported by the backend
///
/// `Active` is the only non-terminal state; the others are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionStatus {
    Active,
    Completed,
    Cancelled,
    Error,
}

impl SubscriptionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubscriptionStatus::Active)
    }

    /// Whether moving from `self` to `next` respects the state machine
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        match self {
            SubscriptionStatus::Active => true,
            terminal => *terminal == next,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionStatus::Active => write!(f, "ACTIVE"),
            SubscriptionStatus::Completed => write!(f, "COMPLETED"),
            SubscriptionStatus::Cancelled => write!(f, "CANCELLED"),
            SubscriptionStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Funding quote for one exchange within an opportunity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeQuote {
    pub exchange: Exchange,
    #[serde(default)]
    pub credential_id: Option<String>,
    pub funding_rate: Decimal,
    #[serde(with = "crate::common::timestamp")]
    pub next_funding_time: DateTime<Utc>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Cross-exchange funding opportunity for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub symbol: String,
    pub exchanges: Vec<ExchangeQuote>,
    #[serde(default)]
    pub best_long: Option<Exchange>,
    #[serde(default)]
    pub best_short: Option<Exchange>,
    #[serde(default)]
    pub spread: Option<Decimal>,
}

impl Opportunity {
    /// Quote for a specific exchange
    pub fn quote(&self, exchange: Exchange) -> Option<&ExchangeQuote> {
        self.exchanges.iter().find(|q| q.exchange == exchange)
    }
}

/// Latest prices for a symbol on one exchange
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickerPrice {
    pub last_price: Option<Decimal>,
    pub mark_price: Option<Decimal>,
}

impl TickerPrice {
    pub fn new(last_price: Option<Decimal>, mark_price: Option<Decimal>) -> Self {
        Self {
            last_price,
            mark_price,
        }
    }

    /// First non-zero price, preferring the last traded price
    pub fn usable_price(&self) -> Option<Decimal> {
        [self.last_price, self.mark_price]
            .into_iter()
            .flatten()
            .find(|p| *p > Decimal::ZERO)
    }
}

/// Sizing result for a prospective position; never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct PositionCalculation {
    pub symbol: String,
    pub quantity: Decimal,
    pub estimated_price: Decimal,
    pub position_value: Decimal,
    pub required_margin: Decimal,
    pub estimated_fee: Decimal,
    pub leverage: u32,
}

impl PositionCalculation {
    pub fn is_valid(&self) -> bool {
        self.quantity > Decimal::ZERO
            && self.estimated_price > Decimal::ZERO
            && self.required_margin > Decimal::ZERO
            && self.leverage > 0
    }
}

/// Key under which at most one subscription may be active
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub symbol: String,
    pub primary_credential_id: String,
    pub hedge_credential_id: String,
}

/// Active (or not yet reconciled) hedged subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub symbol: String,
    pub position_type: PositionType,
    pub quantity: Decimal,
    pub leverage: u32,
    #[serde(default)]
    pub margin: Option<Decimal>,
    pub primary_credential_id: String,
    #[serde(default)]
    pub primary_exchange: Option<Exchange>,
    pub hedge_exchange: Exchange,
    pub hedge_credential_id: String,
    pub funding_rate: Decimal,
    #[serde(with = "crate::common::timestamp")]
    pub next_funding_time: DateTime<Utc>,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub execution_delay: Option<u32>,
    /// Seconds until funding, maintained by the countdown scheduler
    #[serde(skip)]
    pub countdown: Option<i64>,
}

impl Subscription {
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey {
            symbol: self.symbol.clone(),
            primary_credential_id: self.primary_credential_id.clone(),
            hedge_credential_id: self.hedge_credential_id.clone(),
        }
    }

    /// Whole seconds until the next funding timestamp (floored)
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        seconds_until(self.next_funding_time, now)
    }
}

/// Floored whole seconds from `now` until `target`
pub fn seconds_until(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (target - now).num_milliseconds().div_euclid(1000)
}

/// Filled subscription observed as completed during reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedDeal {
    pub subscription_id: String,
    pub symbol: String,
    pub position_type: PositionType,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub hedge_entry_price: Option<Decimal>,
    pub funding_earned: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
    pub executed_at: Option<DateTime<Utc>>,
}
