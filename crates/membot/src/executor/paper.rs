//! Paper trading executor with simulated fills.
//!
//! Quotes come from the real Jupiter API; the fills do not. Each swap moves
//! exactly the quoted in/out amounts between simulated SOL and token
//! balances, and the priority tip is charged in lamports.
//!
//! ## Limitations
//!
//! - No slippage: fills land exactly at `out_amount`
//! - No confirmation latency

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use membot_chain::Quote;
use membot_common::{LAMPORTS_PER_SOL, SOL_MINT};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::info;
use uuid::Uuid;

use super::{Executor, ExecutorError};

const SIGNATURE_PREFIX: &str = "paper-";

/// Simulated wallet.
#[derive(Debug)]
pub struct PaperExecutor {
    owner: String,
    lamports: AtomicU64,
    tokens: DashMap<String, u64>,
}

impl PaperExecutor {
    pub fn new(starting_sol: Decimal) -> Self {
        let lamports = (starting_sol * Decimal::from(LAMPORTS_PER_SOL))
            .floor()
            .to_u64()
            .unwrap_or(0);
        Self::with_lamports(lamports)
    }

    pub fn with_lamports(lamports: u64) -> Self {
        Self {
            owner: "PaperWa11et1111111111111111111111111111111".to_string(),
            lamports: AtomicU64::new(lamports),
            tokens: DashMap::new(),
        }
    }

    fn debit_lamports(&self, amount: u64) -> Result<(), ExecutorError> {
        self.lamports
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| current.checked_sub(amount))
            .map(|_| ())
            .map_err(|available| ExecutorError::InsufficientFunds {
                available,
                required: amount,
            })
    }

    fn debit_tokens(&self, mint: &str, amount: u64) -> Result<(), ExecutorError> {
        let mut entry = self.tokens.entry(mint.to_string()).or_insert(0);
        if *entry < amount {
            return Err(ExecutorError::InsufficientFunds {
                available: *entry,
                required: amount,
            });
        }
        *entry -= amount;
        Ok(())
    }

    fn credit(&self, mint: &str, amount: u64) {
        if mint == SOL_MINT {
            self.lamports.fetch_add(amount, Ordering::AcqRel);
        } else {
            *self.tokens.entry(mint.to_string()).or_insert(0) += amount;
        }
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    fn owner(&self) -> String {
        self.owner.clone()
    }

    async fn swap(&self, quote: &Quote, tip_lamports: u64, _max_slippage_bps: u16) -> Result<String, ExecutorError> {
        if quote.out_amount == 0 {
            return Err(ExecutorError::Rejected("quote has zero output".to_string()));
        }

        if quote.input_mint == SOL_MINT {
            self.debit_lamports(quote.in_amount.saturating_add(tip_lamports))?;
        } else {
            self.debit_lamports(tip_lamports)?;
            if let Err(e) = self.debit_tokens(&quote.input_mint, quote.in_amount) {
                self.lamports.fetch_add(tip_lamports, Ordering::AcqRel);
                return Err(e);
            }
        }
        self.credit(&quote.output_mint, quote.out_amount);

        let signature = format!("{SIGNATURE_PREFIX}{}", Uuid::new_v4());
        info!(
            "[PAPER] swap {} {} -> {} {} ({})",
            quote.in_amount, quote.input_mint, quote.out_amount, quote.output_mint, signature
        );
        Ok(signature)
    }

    async fn token_balance(&self, mint: &str) -> Result<u64, ExecutorError> {
        Ok(self.tokens.get(mint).map(|v| *v).unwrap_or(0))
    }

    async fn lamports(&self) -> Result<u64, ExecutorError> {
        Ok(self.lamports.load(Ordering::Acquire))
    }

    async fn ensure_token_account(&self, mint: &str) -> Result<(), ExecutorError> {
        self.tokens.entry(mint.to_string()).or_insert(0);
        Ok(())
    }

    async fn confirm(&self, signature: &str, _timeout: Duration) -> bool {
        signature.starts_with(SIGNATURE_PREFIX)
    }

    fn name(&self) -> &'static str {
        "paper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    const MINT: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";

    fn quote(input: &str, output: &str, in_amount: u64, out_amount: u64) -> Quote {
        Quote {
            input_mint: input.to_string(),
            output_mint: output.to_string(),
            in_amount,
            out_amount,
            price_impact_pct: None,
            raw: json!({}),
        }
    }

    #[tokio::test]
    async fn test_starting_balance() {
        let paper = PaperExecutor::new(dec!(1.5));
        assert_eq!(paper.lamports().await.unwrap(), 1_500_000_000);
        assert_eq!(paper.token_balance(MINT).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_buy_then_sell_round_trip() {
        let paper = PaperExecutor::with_lamports(1_000_000_000);

        let sig = paper
            .swap(&quote(SOL_MINT, MINT, 100_000_000, 5_000_000), 10_000, 9000)
            .await
            .unwrap();
        assert!(sig.starts_with("paper-"));
        assert!(paper.confirm(&sig, Duration::from_secs(1)).await);
        assert_eq!(paper.lamports().await.unwrap(), 899_990_000);
        assert_eq!(paper.token_balance(MINT).await.unwrap(), 5_000_000);

        paper
            .swap(&quote(MINT, SOL_MINT, 5_000_000, 120_000_000), 10_000, 800)
            .await
            .unwrap();
        assert_eq!(paper.lamports().await.unwrap(), 1_019_980_000);
        assert_eq!(paper.token_balance(MINT).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_sol() {
        let paper = PaperExecutor::with_lamports(1_000);
        let err = paper
            .swap(&quote(SOL_MINT, MINT, 5_000, 1), 0, 9000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::InsufficientFunds {
                available: 1_000,
                required: 5_000
            }
        ));
        assert_eq!(paper.lamports().await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn test_insufficient_tokens_refunds_tip() {
        let paper = PaperExecutor::with_lamports(1_000_000);
        let err = paper
            .swap(&quote(MINT, SOL_MINT, 10, 100), 5_000, 800)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InsufficientFunds { .. }));
        assert_eq!(paper.lamports().await.unwrap(), 1_000_000);
    }

    #[tokio::test]
    async fn test_zero_output_rejected() {
        let paper = PaperExecutor::with_lamports(1_000_000);
        let err = paper.swap(&quote(SOL_MINT, MINT, 10, 0), 0, 9000).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_foreign_signature_not_confirmed() {
        let paper = PaperExecutor::with_lamports(0);
        assert!(!paper.confirm("5xyz", Duration::from_millis(1)).await);
        paper.ensure_token_account(MINT).await.unwrap();
        assert_eq!(paper.token_balance(MINT).await.unwrap(), 0);
    }
}
