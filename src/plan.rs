//! CURRENT→TARGET trade planning.
//!
//! Computes the USD trades needed to move deposited holdings to target
//! weights, pairs sells with buys into direct swap legs, and sizes each leg
//! in raw native token units. Pure functions over slices; nothing here
//! touches the chain.

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::gateway::PriceRound;

/// Swap legs below this notional are residual rounding, not trades.
const DUST_USD: f64 = 0.01;

/// One portfolio asset's current state, normalized to human units.
#[derive(Debug, Clone)]
pub struct Holding {
    pub symbol: String,
    /// Receipt-token balance scaled down by 10^decimals.
    pub balance: f64,
    pub price_usd: f64,
    pub decimals: u8,
}

impl Holding {
    pub fn value_usd(&self) -> f64 {
        self.balance * self.price_usd
    }
}

/// Signed USD trade needed to reach target. Positive buys, negative sells.
#[derive(Debug, Clone, Serialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub value_usd: f64,
}

/// An unsized swap leg: sell one asset to buy another, in USD terms.
#[derive(Debug, Clone, Serialize)]
pub struct SwapLeg {
    pub sell: String,
    pub buy: String,
    pub value_usd: f64,
}

/// A fully sized swap ready for execution.
#[derive(Debug, Clone, Serialize)]
pub struct SizedSwap {
    pub sell: String,
    pub buy: String,
    pub value_usd: f64,
    /// Native units of the sell asset to withdraw and swap.
    pub amount_in: u128,
    /// Native units of the buy asset at the oracle price.
    pub target_out: u128,
    /// `target_out` floored by the slippage allowance.
    pub min_out: u128,
}

/// Normalize a raw oracle round to a USD price.
pub fn normalize_price(symbol: &str, round: &PriceRound) -> Result<f64> {
    if round.answer <= 0 {
        return Err(Error::PriceFeed(format!(
            "{symbol}: non-positive answer {}",
            round.answer
        )));
    }
    Ok(round.answer as f64 / 10f64.powi(round.decimals as i32))
}

/// Total portfolio value in USD.
pub fn total_value(holdings: &[Holding]) -> f64 {
    holdings.iter().map(|h| h.value_usd()).sum()
}

/// Compute per-asset USD trades from current holdings to target weights.
///
/// Callers pass one holding per portfolio asset, including zero balances, so
/// an asset absent from `targets` gets weight 0 and is fully sold. For
/// weights summing to 1 the returned trades sum to ~0.
pub fn compute_trades(holdings: &[Holding], targets: &[(String, f64)]) -> Result<Vec<TradeIntent>> {
    let total = total_value(holdings);
    if total <= 0.0 {
        return Err(Error::EmptyPortfolio);
    }

    let target_map: FxHashMap<&str, f64> = targets
        .iter()
        .map(|(sym, weight)| (sym.as_str(), *weight))
        .collect();

    Ok(holdings
        .iter()
        .map(|h| {
            let weight = target_map.get(h.symbol.as_str()).copied().unwrap_or(0.0);
            TradeIntent {
                symbol: h.symbol.clone(),
                value_usd: total * weight - h.value_usd(),
            }
        })
        .collect())
}

/// Pair sell intents with buy intents into direct swap legs.
///
/// Both sides are walked largest-USD-first (symbol breaks ties, so the
/// result is deterministic), each leg taking `min(remaining sell, remaining
/// buy)` until a side is exhausted. Two assets always produce a single leg.
/// Legs below `min_value_usd` are dropped.
pub fn pair_swap_legs(trades: &[TradeIntent], min_value_usd: f64) -> Vec<SwapLeg> {
    let mut sells: Vec<(&str, f64)> = trades
        .iter()
        .filter(|t| t.value_usd < 0.0)
        .map(|t| (t.symbol.as_str(), -t.value_usd))
        .collect();
    let mut buys: Vec<(&str, f64)> = trades
        .iter()
        .filter(|t| t.value_usd > 0.0)
        .map(|t| (t.symbol.as_str(), t.value_usd))
        .collect();

    fn by_value_desc(a: &(&str, f64), b: &(&str, f64)) -> std::cmp::Ordering {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    }
    sells.sort_by(by_value_desc);
    buys.sort_by(by_value_desc);

    let mut legs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < sells.len() && j < buys.len() {
        let amount = sells[i].1.min(buys[j].1);
        if amount >= DUST_USD && amount >= min_value_usd {
            legs.push(SwapLeg {
                sell: sells[i].0.to_string(),
                buy: buys[j].0.to_string(),
                value_usd: amount,
            });
        }
        sells[i].1 -= amount;
        buys[j].1 -= amount;
        if sells[i].1 < DUST_USD {
            i += 1;
        }
        if buys[j].1 < DUST_USD {
            j += 1;
        }
    }
    legs
}

/// Size a leg into native integer units of both assets.
pub fn size_leg(leg: &SwapLeg, holdings: &[Holding], slippage_bps: u32) -> Result<SizedSwap> {
    let sell = find_holding(holdings, &leg.sell)?;
    let buy = find_holding(holdings, &leg.buy)?;

    let amount_in = to_native_units(&leg.sell, leg.value_usd / sell.price_usd, sell.decimals)?;
    let target_out = to_native_units(&leg.buy, leg.value_usd / buy.price_usd, buy.decimals)?;

    Ok(SizedSwap {
        sell: leg.sell.clone(),
        buy: leg.buy.clone(),
        value_usd: leg.value_usd,
        amount_in,
        target_out,
        min_out: apply_slippage(target_out, slippage_bps)?,
    })
}

/// Convert a human-unit amount to raw native units, truncating toward zero.
/// Fractional native units cannot exist on chain. Amounts the token's
/// u128 unit space cannot hold are an error, never a saturated cast.
pub fn to_native_units(symbol: &str, amount: f64, decimals: u8) -> Result<u128> {
    let scaled = amount * 10f64.powi(decimals as i32);
    if scaled <= 0.0 {
        return Ok(0);
    }
    if !scaled.is_finite() || scaled >= u128::MAX as f64 {
        return Err(Error::SizingOverflow(format!(
            "{symbol}: {amount} at {decimals} decimals exceeds the native unit range"
        )));
    }
    Ok(scaled as u128)
}

/// Floor `amount` by `slippage_bps` basis points in integer arithmetic.
pub fn apply_slippage(amount: u128, slippage_bps: u32) -> Result<u128> {
    amount
        .checked_mul(10_000 - slippage_bps as u128)
        .map(|scaled| scaled / 10_000)
        .ok_or_else(|| {
            Error::SizingOverflow(format!(
                "slippage floor for amount {amount} overflows u128"
            ))
        })
}

fn find_holding<'a>(holdings: &'a [Holding], symbol: &str) -> Result<&'a Holding> {
    let holding = holdings
        .iter()
        .find(|h| h.symbol == symbol)
        .ok_or_else(|| Error::Allocation(format!("unknown symbol in swap leg: {symbol}")))?;
    if holding.price_usd <= 0.0 {
        return Err(Error::PriceFeed(format!(
            "{symbol}: no positive price for sizing"
        )));
    }
    Ok(holding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc(balance: f64, price: f64) -> Holding {
        Holding {
            symbol: "USDC".into(),
            balance,
            price_usd: price,
            decimals: 6,
        }
    }

    fn weth(balance: f64, price: f64) -> Holding {
        Holding {
            symbol: "WETH".into(),
            balance,
            price_usd: price,
            decimals: 18,
        }
    }

    fn targets(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(s, w)| (s.to_string(), *w)).collect()
    }

    #[test]
    fn worked_example_trades() {
        let holdings = vec![usdc(1000.0, 1.0), weth(0.0, 3000.0)];
        let trades =
            compute_trades(&holdings, &targets(&[("USDC", 0.3), ("WETH", 0.7)])).unwrap();

        assert_eq!(trades.len(), 2);
        assert!((trades[0].value_usd - (-700.0)).abs() < 1e-9);
        assert!((trades[1].value_usd - 700.0).abs() < 1e-9);
    }

    #[test]
    fn trades_sum_to_zero() {
        let holdings = vec![
            Holding {
                symbol: "A".into(),
                balance: 3.0,
                price_usd: 1234.567,
                decimals: 18,
            },
            Holding {
                symbol: "B".into(),
                balance: 2.0,
                price_usd: 777.77,
                decimals: 8,
            },
            Holding {
                symbol: "C".into(),
                balance: 10.0,
                price_usd: 0.999,
                decimals: 6,
            },
        ];
        let trades =
            compute_trades(&holdings, &targets(&[("A", 0.2), ("B", 0.3), ("C", 0.5)])).unwrap();

        let sum: f64 = trades.iter().map(|t| t.value_usd).sum();
        assert!(sum.abs() < 1e-6, "trades sum to {sum}");
    }

    #[test]
    fn empty_portfolio_is_an_error() {
        let holdings = vec![usdc(0.0, 1.0), weth(0.0, 3000.0)];
        let result = compute_trades(&holdings, &targets(&[("USDC", 0.3), ("WETH", 0.7)]));
        assert!(matches!(result, Err(Error::EmptyPortfolio)));
    }

    #[test]
    fn holding_without_target_is_fully_sold() {
        let holdings = vec![usdc(400.0, 1.0), weth(0.2, 3000.0)];
        let trades = compute_trades(&holdings, &targets(&[("WETH", 1.0)])).unwrap();

        let usdc_trade = trades.iter().find(|t| t.symbol == "USDC").unwrap();
        assert!((usdc_trade.value_usd - (-400.0)).abs() < 1e-9);
    }

    #[test]
    fn pair_two_assets_single_leg() {
        let trades = vec![
            TradeIntent {
                symbol: "USDC".into(),
                value_usd: -700.0,
            },
            TradeIntent {
                symbol: "WETH".into(),
                value_usd: 700.0,
            },
        ];
        let legs = pair_swap_legs(&trades, 0.0);

        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].sell, "USDC");
        assert_eq!(legs[0].buy, "WETH");
        assert!((legs[0].value_usd - 700.0).abs() < 1e-9);
    }

    #[test]
    fn pair_multi_asset_largest_first() {
        let trades = vec![
            TradeIntent {
                symbol: "A".into(),
                value_usd: -500.0,
            },
            TradeIntent {
                symbol: "B".into(),
                value_usd: 600.0,
            },
            TradeIntent {
                symbol: "C".into(),
                value_usd: -200.0,
            },
            TradeIntent {
                symbol: "D".into(),
                value_usd: 100.0,
            },
        ];
        let legs = pair_swap_legs(&trades, 0.0);

        assert_eq!(legs.len(), 3);
        assert_eq!((legs[0].sell.as_str(), legs[0].buy.as_str()), ("A", "B"));
        assert!((legs[0].value_usd - 500.0).abs() < 1e-9);
        assert_eq!((legs[1].sell.as_str(), legs[1].buy.as_str()), ("C", "B"));
        assert!((legs[1].value_usd - 100.0).abs() < 1e-9);
        assert_eq!((legs[2].sell.as_str(), legs[2].buy.as_str()), ("C", "D"));
        assert!((legs[2].value_usd - 100.0).abs() < 1e-9);
    }

    #[test]
    fn pair_drops_legs_below_min() {
        let trades = vec![
            TradeIntent {
                symbol: "A".into(),
                value_usd: -500.0,
            },
            TradeIntent {
                symbol: "B".into(),
                value_usd: 600.0,
            },
            TradeIntent {
                symbol: "C".into(),
                value_usd: -200.0,
            },
            TradeIntent {
                symbol: "D".into(),
                value_usd: 100.0,
            },
        ];
        let legs = pair_swap_legs(&trades, 150.0);

        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].sell, "A");
    }

    #[test]
    fn pair_nothing_without_sells() {
        let trades = vec![
            TradeIntent {
                symbol: "A".into(),
                value_usd: 300.0,
            },
            TradeIntent {
                symbol: "B".into(),
                value_usd: 200.0,
            },
        ];
        assert!(pair_swap_legs(&trades, 0.0).is_empty());
    }

    #[test]
    fn size_leg_exact_amounts() {
        let holdings = vec![usdc(1000.0, 1.0), weth(0.0, 3000.0)];
        let leg = SwapLeg {
            sell: "USDC".into(),
            buy: "WETH".into(),
            value_usd: 750.0,
        };
        let sized = size_leg(&leg, &holdings, 500).unwrap();

        // $750 of USDC at $1 with 6 decimals.
        assert_eq!(sized.amount_in, 750_000_000);
        // $750 of WETH at $3000 = 0.25 WETH with 18 decimals.
        assert_eq!(sized.target_out, 250_000_000_000_000_000);
        assert_eq!(sized.min_out, 237_500_000_000_000_000);
    }

    #[test]
    fn slippage_floor_truncates() {
        // floor(37.05)
        assert_eq!(apply_slippage(39, 500).unwrap(), 37);
        // floor(950000.95)
        assert_eq!(apply_slippage(1_000_001, 500).unwrap(), 950_000);
        assert_eq!(apply_slippage(100, 0).unwrap(), 100);
    }

    #[test]
    fn slippage_floor_rejects_overflowing_amount() {
        assert!(matches!(
            apply_slippage(u128::MAX, 500),
            Err(Error::SizingOverflow(_))
        ));
    }

    #[test]
    fn native_units_truncate_toward_zero() {
        assert_eq!(to_native_units("USDC", 0.2333333333, 6).unwrap(), 233_333);
        assert_eq!(to_native_units("X", 1.5, 0).unwrap(), 1);
        assert_eq!(to_native_units("USDC", -2.0, 6).unwrap(), 0);
    }

    #[test]
    fn native_units_reject_out_of_range_amounts() {
        assert!(matches!(
            to_native_units("SHIB", 1e30, 18),
            Err(Error::SizingOverflow(_))
        ));
        assert!(matches!(
            to_native_units("SHIB", f64::INFINITY, 18),
            Err(Error::SizingOverflow(_))
        ));
    }

    #[test]
    fn size_leg_rejects_untradeable_prices() {
        // A 1e-18 USD price at 18 decimals would need more native units
        // than u128 can hold; the leg must fail, not saturate.
        let holdings = vec![
            usdc(1000.0, 1.0),
            Holding {
                symbol: "SHIB".into(),
                balance: 0.0,
                price_usd: 1e-18,
                decimals: 18,
            },
        ];
        let leg = SwapLeg {
            sell: "USDC".into(),
            buy: "SHIB".into(),
            value_usd: 700.0,
        };
        assert!(matches!(
            size_leg(&leg, &holdings, 500),
            Err(Error::SizingOverflow(_))
        ));
    }

    #[test]
    fn normalize_price_scales_by_decimals() {
        let round = PriceRound {
            answer: 345_000_000_000,
            decimals: 8,
            updated_at: 0,
        };
        let price = normalize_price("WETH", &round).unwrap();
        assert!((price - 3450.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_price_rejects_non_positive() {
        let round = PriceRound {
            answer: 0,
            decimals: 8,
            updated_at: 0,
        };
        assert!(normalize_price("USDC", &round).is_err());

        let negative = PriceRound {
            answer: -1,
            decimals: 8,
            updated_at: 0,
        };
        assert!(normalize_price("USDC", &negative).is_err());
    }
}
