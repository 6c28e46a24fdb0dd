//! Live executor: Jupiter swap transactions signed by the bot wallet.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use membot_chain::{JupiterClient, Pubkey, Quote, Wallet};
use membot_common::Commitment;
use tracing::{debug, info};

use super::{Executor, ExecutorError};

/// Executes swaps on mainnet through the configured wallet.
#[derive(Debug, Clone)]
pub struct LiveExecutor {
    wallet: Arc<Wallet>,
    jupiter: JupiterClient,
}

impl LiveExecutor {
    pub fn new(wallet: Arc<Wallet>, jupiter: JupiterClient) -> Self {
        Self { wallet, jupiter }
    }

    pub fn wallet(&self) -> &Arc<Wallet> {
        &self.wallet
    }
}

#[async_trait]
impl Executor for LiveExecutor {
    fn owner(&self) -> String {
        self.wallet.pubkey().to_string()
    }

    async fn swap(&self, quote: &Quote, tip_lamports: u64, max_slippage_bps: u16) -> Result<String, ExecutorError> {
        let tx = self
            .jupiter
            .swap_transaction(quote, &self.owner(), tip_lamports, max_slippage_bps)
            .await?;
        let signature = self.wallet.send_serialized_tx(&tx).await?;
        debug!(
            "Swap sent {} -> {} in={} tip={} sig={}",
            quote.input_mint, quote.output_mint, quote.in_amount, tip_lamports, signature
        );
        Ok(signature)
    }

    async fn token_balance(&self, mint: &str) -> Result<u64, ExecutorError> {
        let mint: Pubkey = mint.parse()?;
        Ok(self.wallet.token_balance(&mint).await?.unwrap_or(0))
    }

    async fn lamports(&self) -> Result<u64, ExecutorError> {
        Ok(self.wallet.lamports().await?)
    }

    async fn ensure_token_account(&self, mint: &str) -> Result<(), ExecutorError> {
        let mint: Pubkey = mint.parse()?;
        if let Some(signature) = self.wallet.ensure_ata(&mint).await? {
            info!("Token account created for {mint}: {signature}");
        }
        Ok(())
    }

    async fn confirm(&self, signature: &str, timeout: Duration) -> bool {
        self.wallet.confirm(signature, Commitment::Confirmed, timeout).await
    }

    fn name(&self) -> &'static str {
        "live"
    }
}
