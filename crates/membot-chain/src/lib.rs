//! Solana integration library for membot.
//!
//! Provides the chain-facing plumbing:
//! - Base58 keys, PDA and associated token account derivation
//! - Keypair loading and ed25519 signing
//! - Transaction wire format (legacy compile/sign, signing pre-built swaps)
//! - JSON-RPC client and PubSub log subscriptions
//! - Jupiter v6 quote/swap client with shared rate limiting
//! - SOL/USD price oracle and wallet operations

pub mod jupiter;
pub mod keypair;
pub mod logs;
pub mod price;
pub mod pubkey;
pub mod rate_limit;
pub mod rpc;
pub mod transaction;
pub mod wallet;

pub use jupiter::{JupiterClient, JupiterConfig, JupiterError, Quote};
pub use keypair::{Keypair, KeypairError};
pub use logs::{LogNotification, LogsSubscriber, LogsSubscriberConfig, MintLogStream, SubscriptionError};
pub use price::{SolPriceOracle, lamports_to_usd, usd_to_lamports};
pub use pubkey::{Pubkey, PubkeyError, associated_token_address};
pub use rate_limit::{AsyncTokenBucket, TokenBucket};
pub use rpc::{RpcClient, RpcConfig, RpcError, SignatureInfo, TokenAccount, TransactionAccounts};
pub use transaction::TransactionError;
pub use wallet::{Wallet, WalletError};
