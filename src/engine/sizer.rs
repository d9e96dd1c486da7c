use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::common::errors::{HedgeError, Result};
use crate::common::types::{PositionCalculation, TickerPrice};
use crate::config::types::SizingConfig;

/// Taker fee applied once on entry and once on exit
pub const DEFAULT_TAKER_FEE_RATE: Decimal = dec!(0.0005);

/// Highest leverage observed across supported markets
pub const MAX_LEVERAGE: u32 = 125;

/// Position sizing from margin, leverage and live price
///
/// Pure and cheap, so it can run on every keystroke or ticker update.
///
/// The fee estimate charges the taker rate twice on the notional (entry and
/// exit). It is not a per-exchange, per-leg fee model.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    taker_fee_rate: Decimal,
    max_leverage: u32,
}

impl PositionSizer {
    pub fn new(taker_fee_rate: Decimal, max_leverage: u32) -> Self {
        Self {
            taker_fee_rate,
            max_leverage: max_leverage.max(1),
        }
    }

    pub fn from_config(config: &SizingConfig) -> Self {
        Self::new(config.taker_fee_rate, config.max_leverage)
    }

    pub fn taker_fee_rate(&self) -> Decimal {
        self.taker_fee_rate
    }

    /// Size a position
    ///
    /// # Arguments
    /// * `symbol` - Market symbol, e.g. `BTCUSDT`
    /// * `price` - Latest ticker; the last traded price wins, the mark price is the fallback
    /// * `margin` - Collateral in USDT, before leverage
    /// * `leverage` - Integer multiplier, `1..=max_leverage`
    ///
    /// # Errors
    /// * `PriceUnavailable` when neither price is a positive number
    /// * `InvalidPosition` when margin is missing or not positive, or leverage is out of range
    pub fn compute(
        &self,
        symbol: &str,
        price: TickerPrice,
        margin: Option<Decimal>,
        leverage: u32,
    ) -> Result<PositionCalculation> {
        let estimated_price = price
            .usable_price()
            .ok_or_else(|| HedgeError::PriceUnavailable(symbol.to_string()))?;

        let margin = match margin {
            Some(m) if m > Decimal::ZERO => m,
            _ => {
                return Err(HedgeError::InvalidPosition(
                    "margin must be greater than zero".to_string(),
                ))
            }
        };

        if leverage == 0 || leverage > self.max_leverage {
            return Err(HedgeError::InvalidPosition(format!(
                "leverage {} outside 1..={}",
                leverage, self.max_leverage
            )));
        }

        let position_value = margin * Decimal::from(leverage);
        let quantity = position_value / estimated_price;
        let estimated_fee = position_value * self.taker_fee_rate * dec!(2);

        Ok(PositionCalculation {
            symbol: symbol.to_string(),
            quantity,
            estimated_price,
            position_value,
            required_margin: margin,
            estimated_fee,
            leverage,
        })
    }
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self::new(DEFAULT_TAKER_FEE_RATE, MAX_LEVERAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(last: Option<Decimal>, mark: Option<Decimal>) -> TickerPrice {
        TickerPrice::new(last, mark)
    }

    #[test]
    fn test_basic_sizing() {
        let calc = PositionSizer::default()
            .compute("BTCUSDT", ticker(Some(dec!(50000)), None), Some(dec!(100)), 10)
            .unwrap();

        // 100 * 10 = 1000 notional, 1000 / 50000 = 0.02 BTC
        assert_eq!(calc.position_value, dec!(1000));
        assert_eq!(calc.quantity, dec!(0.02));
        assert_eq!(calc.required_margin, dec!(100));
        // 1000 * 0.0005 * 2
        assert_eq!(calc.estimated_fee, dec!(1.0));
        assert_eq!(calc.leverage, 10);
        assert!(calc.is_valid());
    }

    #[test]
    fn test_quantity_identity_holds() {
        let sizer = PositionSizer::default();
        for (price, margin, leverage) in [
            (dec!(3000), dec!(150), 10u32),
            (dec!(0.1234), dec!(33.3), 3),
            (dec!(98765.4), dec!(12), 125),
        ] {
            let calc = sizer
                .compute("ETHUSDT", ticker(Some(price), None), Some(margin), leverage)
                .unwrap();
            let expected = margin * Decimal::from(leverage) / price;
            assert!((calc.quantity - expected).abs() < dec!(0.000000001));
        }
    }

    #[test]
    fn test_mark_price_fallback() {
        let calc = PositionSizer::default()
            .compute("ETHUSDT", ticker(Some(Decimal::ZERO), Some(dec!(2000))), Some(dec!(50)), 4)
            .unwrap();
        assert_eq!(calc.estimated_price, dec!(2000));
        assert_eq!(calc.quantity, dec!(0.1));
    }

    #[test]
    fn test_price_unavailable() {
        let err = PositionSizer::default()
            .compute("DEADUSDT", ticker(None, Some(Decimal::ZERO)), Some(dec!(10)), 1)
            .unwrap_err();
        assert!(matches!(err, HedgeError::PriceUnavailable(s) if s == "DEADUSDT"));
    }

    #[test]
    fn test_invalid_margin() {
        let sizer = PositionSizer::default();
        let price = ticker(Some(dec!(1)), None);
        assert!(matches!(
            sizer.compute("XRPUSDT", price, None, 2),
            Err(HedgeError::InvalidPosition(_))
        ));
        assert!(matches!(
            sizer.compute("XRPUSDT", price, Some(dec!(-5)), 2),
            Err(HedgeError::InvalidPosition(_))
        ));
    }

    #[test]
    fn test_leverage_bounds() {
        let sizer = PositionSizer::default();
        let price = ticker(Some(dec!(1)), None);
        assert!(sizer.compute("XRPUSDT", price, Some(dec!(5)), 0).is_err());
        assert!(sizer.compute("XRPUSDT", price, Some(dec!(5)), 126).is_err());
        assert!(sizer.compute("XRPUSDT", price, Some(dec!(5)), 125).is_ok());
    }
}
