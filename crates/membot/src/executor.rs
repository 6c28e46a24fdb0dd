//! Swap execution abstraction for live and paper trading.
//!
//! Strategies fetch quotes from Jupiter themselves and hand them to an
//! `Executor`, so the same entry and exit logic runs against:
//! - `LiveExecutor`: Jupiter-built transactions signed by the wallet
//! - `PaperExecutor`: simulated balances filled at the quoted amounts

pub mod live;
pub mod paper;

use std::time::Duration;

use async_trait::async_trait;
use membot_chain::{JupiterError, PubkeyError, Quote, WalletError};
use thiserror::Error;

pub use live::LiveExecutor;
pub use paper::PaperExecutor;

/// Errors that can occur during swap execution.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Invalid mint: {0}")]
    InvalidMint(#[from] PubkeyError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Jupiter error: {0}")]
    Jupiter(#[from] JupiterError),

    #[error("Insufficient funds: available={available}, required={required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Swap rejected: {0}")]
    Rejected(String),
}

impl ExecutorError {
    /// One-line form suitable for retry logs.
    pub fn short(&self) -> String {
        short_error(&self.to_string())
    }
}

/// Reduce a verbose RPC or simulation error to its useful part.
pub fn short_error(message: &str) -> String {
    const PROGRAM_ERROR: &str = "custom program error";
    if let Some(idx) = message.rfind(PROGRAM_ERROR) {
        let tail = message[idx + PROGRAM_ERROR.len()..].trim_start_matches(':').trim();
        return format!("{PROGRAM_ERROR}: {tail}");
    }
    if message.contains("Transaction simulation failed") {
        return "Transaction simulation failed".to_string();
    }
    message.lines().next().unwrap_or_default().to_string()
}

/// Trait for swap execution backends.
///
/// Implementations are shared across tasks, so all methods take `&self`.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Wallet address swaps are built for.
    fn owner(&self) -> String;

    /// Execute `quote` and return the transaction signature.
    async fn swap(&self, quote: &Quote, tip_lamports: u64, max_slippage_bps: u16) -> Result<String, ExecutorError>;

    /// Raw token balance held for `mint`, zero when there is no account.
    async fn token_balance(&self, mint: &str) -> Result<u64, ExecutorError>;

    /// Native SOL balance in lamports.
    async fn lamports(&self) -> Result<u64, ExecutorError>;

    /// Make sure a token account exists for `mint`.
    async fn ensure_token_account(&self, mint: &str) -> Result<(), ExecutorError>;

    /// Best-effort wait for `signature` to confirm.
    async fn confirm(&self, signature: &str, timeout: Duration) -> bool;

    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_error_program_error() {
        let msg = "RPC error -32002: Transaction simulation failed: Error processing Instruction 3: custom program error: 0x1771";
        assert_eq!(short_error(msg), "custom program error: 0x1771");
    }

    #[test]
    fn test_short_error_simulation() {
        let msg = "Transaction simulation failed: Blockhash not found";
        assert_eq!(short_error(msg), "Transaction simulation failed");
    }

    #[test]
    fn test_short_error_first_line() {
        assert_eq!(short_error("connection reset\nat line 2"), "connection reset");
        assert_eq!(short_error(""), "");
    }

    #[test]
    fn test_executor_error_short() {
        let err = ExecutorError::Rejected("slippage exceeded\ndetails".to_string());
        assert_eq!(err.short(), "Swap rejected: slippage exceeded");
    }
}
