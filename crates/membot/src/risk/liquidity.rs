//! Route liquidity heuristics from the quote's price impact.

use membot_chain::Quote;
use rust_decimal::Decimal;

/// Routes moving the price more than this are treated as illiquid.
const MAX_PRICE_IMPACT: Decimal = Decimal::from_parts(95, 0, 0, false, 2);

/// Smallest impact used when dividing.
const MIN_IMPACT: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

/// False when the reported price impact exceeds 95%.
pub fn looks_liquid_enough(quote: &Quote) -> bool {
    quote.price_impact_pct.is_none_or(|impact| impact <= MAX_PRICE_IMPACT)
}

/// Rough pool depth: a trade of `trade_usd` moving price by `impact` implies
/// about `trade_usd / impact` of liquidity. None means unbounded.
pub fn estimated_liquidity_usd(quote: &Quote, trade_usd: Decimal) -> Option<Decimal> {
    match quote.price_impact_pct {
        Some(impact) if impact > Decimal::ZERO => Some(trade_usd / impact.max(MIN_IMPACT)),
        _ => None,
    }
}

/// Combined buy-side check. Returns the rejection reason, if any.
pub fn quote_is_usable(quote: &Quote, trade_usd: Decimal, min_liquidity_usd: Decimal) -> Result<(), String> {
    if !looks_liquid_enough(quote) {
        return Err("route illiquid / extreme price impact".to_string());
    }
    if let Some(depth) = estimated_liquidity_usd(quote, trade_usd)
        && depth < min_liquidity_usd
    {
        return Err(format!(
            "estimated pool depth {depth:.2} USD < min liquidity {min_liquidity_usd:.2}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn quote(impact: Option<Decimal>) -> Quote {
        Quote {
            input_mint: "A".to_string(),
            output_mint: "B".to_string(),
            in_amount: 1,
            out_amount: 1,
            price_impact_pct: impact,
            raw: json!({}),
        }
    }

    #[test]
    fn test_liquid_enough() {
        assert!(looks_liquid_enough(&quote(None)));
        assert!(looks_liquid_enough(&quote(Some(dec!(0.95)))));
        assert!(!looks_liquid_enough(&quote(Some(dec!(0.96)))));
    }

    #[test]
    fn test_estimated_liquidity() {
        assert_eq!(estimated_liquidity_usd(&quote(Some(dec!(0.01))), dec!(10)), Some(dec!(1000)));
        assert_eq!(estimated_liquidity_usd(&quote(Some(Decimal::ZERO)), dec!(10)), None);
        assert_eq!(estimated_liquidity_usd(&quote(None), dec!(10)), None);
    }

    #[test]
    fn test_quote_is_usable() {
        assert!(quote_is_usable(&quote(Some(dec!(0.01))), dec!(10), dec!(500)).is_ok());
        assert!(quote_is_usable(&quote(Some(dec!(0.1))), dec!(10), dec!(500)).is_err());
        assert!(quote_is_usable(&quote(Some(dec!(0.99))), dec!(10), Decimal::ZERO).is_err());
        assert!(quote_is_usable(&quote(None), dec!(10), dec!(1_000_000)).is_ok());
    }
}
