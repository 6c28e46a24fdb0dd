//! Solana JSON-RPC client.
//!
//! Thin typed wrapper over the HTTP endpoint for the handful of methods the
//! bot needs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use membot_common::Commitment;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

/// JSON-RPC error code for "account not found / invalid param" responses.
const INVALID_PARAMS: i64 = -32602;

/// Errors that can occur talking to the RPC node.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("RPC response had no result")]
    MissingResult,

    #[error("failed to decode RPC result: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RpcError {
    /// True for "could not find account" style failures.
    pub fn is_missing_account(&self) -> bool {
        match self {
            RpcError::Rpc { code, message } => {
                *code == INVALID_PARAMS || message.contains("could not find account")
            }
            _ => false,
        }
    }
}

/// Configuration for the RPC client.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub request_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "https://api.mainnet-beta.solana.com".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

/// SPL token account as reported by `getTokenAccountsByOwner` (jsonParsed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    pub address: String,
    pub mint: String,
    pub amount: u64,
}

/// One entry of `getSignaturesForAddress`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
}

/// Account keys and instructions of a fetched transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionAccounts {
    /// Static keys followed by loaded writable then readonly addresses.
    pub account_keys: Vec<String>,
    pub instructions: Vec<InstructionIndices>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionIndices {
    pub program_id_index: usize,
    pub accounts: Vec<usize>,
}

/// Solana JSON-RPC client.
#[derive(Debug)]
pub struct RpcClient {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(config: RpcConfig) -> Result<Self, RpcError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            url: config.url,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue a raw JSON-RPC call and decode its `result`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        debug!(method, id, "RPC call");

        let response = self.http.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Status { status: status.as_u16(), body });
        }

        let envelope: Envelope = response.json().await?;
        if let Some(err) = envelope.error {
            return Err(RpcError::Rpc { code: err.code, message: err.message });
        }
        // `null` is a legitimate result for lookups such as getTransaction.
        let result = envelope.result.unwrap_or(Value::Null);
        if result.is_null() {
            return serde_json::from_value(Value::Null).map_err(|_| RpcError::MissingResult);
        }
        Ok(serde_json::from_value(result)?)
    }

    pub async fn get_balance(&self, address: &str) -> Result<u64, RpcError> {
        let res: WithContext<u64> = self
            .call("getBalance", json!([address, {"commitment": "confirmed"}]))
            .await?;
        Ok(res.value)
    }

    pub async fn get_latest_blockhash(&self) -> Result<String, RpcError> {
        #[derive(Deserialize)]
        struct Blockhash {
            blockhash: String,
        }
        let res: WithContext<Blockhash> = self
            .call("getLatestBlockhash", json!([{"commitment": "confirmed"}]))
            .await?;
        Ok(res.value.blockhash)
    }

    /// Raw token amount held by a token account, or None if it does not exist.
    pub async fn get_token_account_balance(&self, account: &str) -> Result<Option<u64>, RpcError> {
        #[derive(Deserialize)]
        struct UiAmount {
            amount: String,
        }
        let res: Result<WithContext<UiAmount>, RpcError> = self
            .call("getTokenAccountBalance", json!([account, {"commitment": "confirmed"}]))
            .await;
        match res {
            Ok(v) => Ok(Some(v.value.amount.parse().unwrap_or(0))),
            Err(e) if e.is_missing_account() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn account_exists(&self, address: &str) -> Result<bool, RpcError> {
        let res: WithContext<Option<Value>> = self
            .call("getAccountInfo", json!([address, {"encoding": "base64", "commitment": "confirmed"}]))
            .await?;
        Ok(res.value.is_some())
    }

    /// Token accounts owned by `owner` under `token_program`, with parsed balances.
    pub async fn get_parsed_token_accounts(&self, owner: &str, token_program: &str) -> Result<Vec<TokenAccount>, RpcError> {
        let res: WithContext<Vec<Value>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([owner, {"programId": token_program}, {"encoding": "jsonParsed"}]),
            )
            .await?;
        Ok(res.value.iter().filter_map(parse_token_account).collect())
    }

    /// Submit a signed wire transaction, returning its signature.
    ///
    /// `max_retries` of None leaves resending to the node's default policy.
    pub async fn send_transaction(&self, tx: &[u8], skip_preflight: bool, max_retries: Option<u32>) -> Result<String, RpcError> {
        let encoded = BASE64.encode(tx);
        let mut opts = json!({"encoding": "base64", "skipPreflight": skip_preflight});
        if let Some(retries) = max_retries {
            opts["maxRetries"] = json!(retries);
        }
        self.call("sendTransaction", json!([encoded, opts])).await
    }

    /// Current confirmation level of `signature`, or None if unknown to the node.
    ///
    /// A transaction that landed with an error reports as None.
    pub async fn get_signature_status(&self, signature: &str) -> Result<Option<Commitment>, RpcError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Status {
            confirmation_status: Option<String>,
            err: Option<Value>,
        }
        let res: WithContext<Vec<Option<Status>>> = self
            .call("getSignatureStatuses", json!([[signature], {"searchTransactionHistory": false}]))
            .await?;
        let status = res.value.into_iter().next().flatten();
        Ok(status.and_then(|s| {
            if s.err.is_some() {
                return None;
            }
            s.confirmation_status.and_then(|c| c.parse().ok())
        }))
    }

    pub async fn get_slot(&self) -> Result<u64, RpcError> {
        self.call("getSlot", json!([{"commitment": "processed"}])).await
    }

    /// Signatures touching `address`, newest first, optionally before `before`.
    pub async fn get_signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        let mut opts = json!({"limit": limit, "commitment": "confirmed"});
        if let Some(before) = before {
            opts["before"] = json!(before);
        }
        self.call("getSignaturesForAddress", json!([address, opts])).await
    }

    pub async fn get_block_time(&self, slot: u64) -> Result<Option<i64>, RpcError> {
        self.call("getBlockTime", json!([slot])).await
    }

    /// Account keys and instruction indices of a transaction, if the node has it.
    pub async fn get_transaction_accounts(&self, signature: &str) -> Result<Option<TransactionAccounts>, RpcError> {
        let res: Option<Value> = self
            .call(
                "getTransaction",
                json!([signature, {"encoding": "json", "maxSupportedTransactionVersion": 0}]),
            )
            .await?;
        Ok(res.map(|tx| parse_transaction_accounts(&tx)))
    }

    /// Mint authority of `mint`. `Ok(None)` means renounced (or not a mint).
    pub async fn get_mint_authority(&self, mint: &str) -> Result<Option<String>, RpcError> {
        let res: WithContext<Option<Value>> = self
            .call("getAccountInfo", json!([mint, {"encoding": "jsonParsed"}]))
            .await?;
        Ok(res.value.and_then(|account| {
            account
                .pointer("/data/parsed/info/mintAuthority")
                .and_then(Value::as_str)
                .map(str::to_string)
        }))
    }
}

fn parse_token_account(entry: &Value) -> Option<TokenAccount> {
    let address = entry.get("pubkey")?.as_str()?.to_string();
    let info = entry.pointer("/account/data/parsed/info")?;
    let mint = info.get("mint")?.as_str()?.to_string();
    let amount = info.pointer("/tokenAmount/amount")?.as_str()?.parse().ok()?;
    Some(TokenAccount { address, mint, amount })
}

fn parse_transaction_accounts(tx: &Value) -> TransactionAccounts {
    let strings = |v: Option<&Value>| -> Vec<String> {
        v.and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    };

    let message = tx.pointer("/transaction/message");
    let mut account_keys = strings(message.and_then(|m| m.get("accountKeys")));
    account_keys.extend(strings(tx.pointer("/meta/loadedAddresses/writable")));
    account_keys.extend(strings(tx.pointer("/meta/loadedAddresses/readonly")));

    let instructions = message
        .and_then(|m| m.get("instructions"))
        .and_then(Value::as_array)
        .map(|ixs| {
            ixs.iter()
                .filter_map(|ix| {
                    let program_id_index = ix.get("programIdIndex")?.as_u64()? as usize;
                    let accounts = ix
                        .get("accounts")
                        .and_then(Value::as_array)
                        .map(|a| a.iter().filter_map(Value::as_u64).map(|i| i as usize).collect())
                        .unwrap_or_default();
                    Some(InstructionIndices { program_id_index, accounts })
                })
                .collect()
        })
        .unwrap_or_default();

    TransactionAccounts { account_keys, instructions }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_account() {
        let entry = json!({
            "pubkey": "Ata111",
            "account": {"data": {"parsed": {"info": {
                "mint": "Mint111",
                "tokenAmount": {"amount": "0", "decimals": 6}
            }}}}
        });
        assert_eq!(
            parse_token_account(&entry),
            Some(TokenAccount {
                address: "Ata111".to_string(),
                mint: "Mint111".to_string(),
                amount: 0,
            })
        );
        assert_eq!(parse_token_account(&json!({"pubkey": "x"})), None);
    }

    #[test]
    fn test_parse_transaction_accounts_with_loaded_addresses() {
        let tx = json!({
            "transaction": {"message": {
                "accountKeys": ["A", "B", "C"],
                "instructions": [
                    {"programIdIndex": 2, "accounts": [1, 0], "data": ""},
                    {"programIdIndex": 4, "accounts": []}
                ]
            }},
            "meta": {"loadedAddresses": {"writable": ["D"], "readonly": ["E"]}}
        });
        let parsed = parse_transaction_accounts(&tx);
        assert_eq!(parsed.account_keys, vec!["A", "B", "C", "D", "E"]);
        assert_eq!(
            parsed.instructions,
            vec![
                InstructionIndices { program_id_index: 2, accounts: vec![1, 0] },
                InstructionIndices { program_id_index: 4, accounts: vec![] },
            ]
        );
    }

    #[test]
    fn test_missing_account_detection() {
        let err = RpcError::Rpc {
            code: -32602,
            message: "Invalid param: could not find account".to_string(),
        };
        assert!(err.is_missing_account());
        assert!(!RpcError::MissingResult.is_missing_account());
    }

    #[test]
    fn test_signature_info_decode() {
        let info: SignatureInfo =
            serde_json::from_value(json!({"signature": "s", "slot": 7, "blockTime": null, "err": null})).unwrap();
        assert_eq!(info.block_time, None);
        assert_eq!(info.slot, 7);
    }
}
