//! Priority fee (tip) sizing.

use membot_chain::usd_to_lamports;
use rust_decimal::Decimal;

/// Floor on the SOL price used for USD tips.
const MIN_SOL_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Configured lamports when positive, otherwise `fee_usd` converted at `sol_usd`.
pub fn priority_fee_lamports(config_lamports: u64, fee_usd: Decimal, sol_usd: Decimal) -> u64 {
    if config_lamports > 0 {
        return config_lamports;
    }
    usd_to_lamports(fee_usd, sol_usd.max(MIN_SOL_PRICE))
}

/// Sell tip: the sell-only override wins, then the sell lamports, then USD.
pub fn sell_tip_lamports(override_lamports: u64, sell_lamports: u64, fee_usd: Decimal, sol_usd: Decimal) -> u64 {
    if override_lamports > 0 {
        return override_lamports;
    }
    priority_fee_lamports(sell_lamports, fee_usd, sol_usd)
}
