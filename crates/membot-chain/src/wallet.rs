//! Wallet operations: balances, associated token accounts, sending signed
//! transactions and waiting for confirmation.

use std::sync::Arc;
use std::time::Duration;

use membot_common::{ASSOCIATED_TOKEN_PROGRAM_ID, Commitment, RENT_SYSVAR_ID, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::keypair::Keypair;
use crate::pubkey::{Pubkey, PubkeyError, associated_token_address};
use crate::rpc::{RpcClient, RpcError, TokenAccount};
use crate::transaction::{AccountMeta, Instruction, LegacyMessage, TransactionError, sign_legacy, sign_serialized};

/// SPL token `CloseAccount` instruction tag.
const CLOSE_ACCOUNT_TAG: u8 = 9;

/// How often `confirm` polls signature status.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Node-side resend attempts for maintenance transactions.
const MAINTENANCE_MAX_RETRIES: u32 = 3;

/// Errors from wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Pubkey(#[from] PubkeyError),

    #[error("token account still holds {0} units")]
    NonZeroBalance(u64),
}

/// Associated-token-account `Create` instruction (empty data).
pub fn create_ata_instruction(payer: &Pubkey, ata: &Pubkey, owner: &Pubkey, mint: &Pubkey) -> Instruction {
    Instruction {
        program_id: Pubkey::from_static(ASSOCIATED_TOKEN_PROGRAM_ID),
        accounts: vec![
            AccountMeta::writable(*payer, true),
            AccountMeta::writable(*ata, false),
            AccountMeta::readonly(*owner, false),
            AccountMeta::readonly(*mint, false),
            AccountMeta::readonly(Pubkey::from_static(SYSTEM_PROGRAM_ID), false),
            AccountMeta::readonly(Pubkey::from_static(TOKEN_PROGRAM_ID), false),
            AccountMeta::readonly(Pubkey::from_static(RENT_SYSVAR_ID), false),
        ],
        data: Vec::new(),
    }
}

/// SPL token `CloseAccount`: rent goes back to the owner.
pub fn close_account_instruction(account: &Pubkey, owner: &Pubkey) -> Instruction {
    Instruction {
        program_id: Pubkey::from_static(TOKEN_PROGRAM_ID),
        accounts: vec![
            AccountMeta::writable(*account, false),
            AccountMeta::writable(*owner, false),
            AccountMeta::readonly(*owner, true),
        ],
        data: vec![CLOSE_ACCOUNT_TAG],
    }
}

/// A signing wallet bound to an RPC endpoint.
#[derive(Debug)]
pub struct Wallet {
    keypair: Keypair,
    rpc: Arc<RpcClient>,
}

impl Wallet {
    pub fn new(keypair: Keypair, rpc: Arc<RpcClient>) -> Self {
        Self { keypair, rpc }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub async fn lamports(&self) -> Result<u64, WalletError> {
        Ok(self.rpc.get_balance(&self.pubkey().to_string()).await?)
    }

    /// The wallet's associated token account for `mint` (classic token program).
    pub fn ata(&self, mint: &Pubkey) -> Result<Pubkey, WalletError> {
        let token_program = Pubkey::from_static(TOKEN_PROGRAM_ID);
        Ok(associated_token_address(&self.pubkey(), mint, &token_program)?)
    }

    /// Raw balance of `mint`, None if the token account does not exist yet.
    pub async fn token_balance(&self, mint: &Pubkey) -> Result<Option<u64>, WalletError> {
        let ata = self.ata(mint)?;
        Ok(self.rpc.get_token_account_balance(&ata.to_string()).await?)
    }

    /// Create the associated token account for `mint` if missing.
    ///
    /// Returns the creation signature, or None if it already existed.
    pub async fn ensure_ata(&self, mint: &Pubkey) -> Result<Option<String>, WalletError> {
        let ata = self.ata(mint)?;
        if self.rpc.account_exists(&ata.to_string()).await? {
            return Ok(None);
        }
        let owner = self.pubkey();
        let ix = create_ata_instruction(&owner, &ata, &owner, mint);
        let signature = self.send_legacy(&[ix]).await?;
        info!("Created ATA {ata} for mint {mint}: {signature}");
        Ok(Some(signature))
    }

    /// Close an empty token account and reclaim its rent.
    pub async fn close_empty_account(&self, account: &TokenAccount) -> Result<String, WalletError> {
        let address: Pubkey = account.address.parse()?;
        if let Some(balance) = self.rpc.get_token_account_balance(&account.address).await?
            && balance > 0
        {
            return Err(WalletError::NonZeroBalance(balance));
        }
        let ix = close_account_instruction(&address, &self.pubkey());
        self.send_legacy(&[ix]).await
    }

    /// Token accounts under the classic token program.
    pub async fn token_accounts(&self) -> Result<Vec<TokenAccount>, WalletError> {
        Ok(self
            .rpc
            .get_parsed_token_accounts(&self.pubkey().to_string(), TOKEN_PROGRAM_ID)
            .await?)
    }

    /// Sign a pre-built transaction and submit it without preflight.
    pub async fn send_serialized_tx(&self, tx: &[u8]) -> Result<String, WalletError> {
        let signed = sign_serialized(tx, &self.keypair)?;
        Ok(self.rpc.send_transaction(&signed, true, None).await?)
    }

    /// Poll until `signature` reaches `commitment` or `wait` elapses.
    pub async fn confirm(&self, signature: &str, commitment: Commitment, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        while Instant::now() < deadline {
            match self.rpc.get_signature_status(signature).await {
                Ok(Some(level)) if level.satisfies(commitment) => return true,
                Ok(_) => {}
                Err(e) => debug!("Status poll for {signature} failed: {e}"),
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
        false
    }

    async fn send_legacy(&self, instructions: &[Instruction]) -> Result<String, WalletError> {
        let blockhash: Pubkey = self.rpc.get_latest_blockhash().await?.parse()?;
        let message = LegacyMessage::compile(&self.pubkey(), instructions, blockhash.to_bytes())?;
        let tx = sign_legacy(&message, &[&self.keypair])?;
        Ok(self.rpc.send_transaction(&tx, true, Some(MAINTENANCE_MAX_RETRIES)).await?)
    }
}
