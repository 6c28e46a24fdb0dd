//! Jupiter v6 swap API client.
//!
//! All requests share one token bucket so quote polling from many tasks
//! stays under the public API's rate limit. Throttling (429) and server
//! errors are retried with exponential backoff and jitter.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::rate_limit::AsyncTokenBucket;

/// Public Jupiter v6 endpoint.
pub const DEFAULT_JUPITER_URL: &str = "https://quote-api.jup.ag/v6";

/// Upper bound on random jitter added to each backoff.
const MAX_JITTER: Duration = Duration::from_millis(200);

/// Errors from the Jupiter API.
#[derive(Debug, Error)]
pub enum JupiterError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Jupiter returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid base64 transaction: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Configuration for the Jupiter client.
#[derive(Debug, Clone)]
pub struct JupiterConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_rps: f64,
    pub max_burst: f64,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub use_jito: bool,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_JUPITER_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            max_rps: 6.0,
            max_burst: 6.0,
            max_retries: 5,
            backoff_base: Duration::from_millis(200),
            use_jito: true,
        }
    }
}

/// A swap quote. `raw` is passed back verbatim when building the swap.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    /// Fractional price impact (0.01 = 1%), when the route reports one.
    pub price_impact_pct: Option<Decimal>,
    pub raw: Value,
}

impl Quote {
    pub fn from_json(raw: Value) -> Result<Self, JupiterError> {
        let text = |key: &str| -> Result<String, JupiterError> {
            raw.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| JupiterError::Malformed(format!("missing {key}")))
        };
        let amount = |key: &str| -> Result<u64, JupiterError> {
            text(key)?
                .parse()
                .map_err(|_| JupiterError::Malformed(format!("non-integer {key}")))
        };
        let price_impact_pct = match raw.get("priceImpactPct") {
            Some(Value::String(s)) => Decimal::from_str(s).ok(),
            Some(Value::Number(n)) => n.as_f64().and_then(|f| Decimal::try_from(f).ok()),
            _ => None,
        };
        Ok(Self {
            input_mint: text("inputMint")?,
            output_mint: text("outputMint")?,
            in_amount: amount("inAmount")?,
            out_amount: amount("outAmount")?,
            price_impact_pct,
            raw,
        })
    }
}

/// Backoff before retry number `attempt` (1-based), without jitter.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Jupiter v6 client. Cheap to clone; clones share the rate limiter.
#[derive(Debug, Clone)]
pub struct JupiterClient {
    http: Client,
    config: Arc<JupiterConfig>,
    limiter: Arc<AsyncTokenBucket>,
}

impl JupiterClient {
    pub fn new(config: JupiterConfig) -> Result<Self, JupiterError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        let limiter = Arc::new(AsyncTokenBucket::new(config.max_rps, config.max_burst));
        Ok(Self {
            http,
            config: Arc::new(config),
            limiter,
        })
    }

    pub fn config(&self) -> &JupiterConfig {
        &self.config
    }

    /// Quote an ExactIn swap of `amount` raw units of `input_mint`.
    pub async fn quote(&self, input_mint: &str, output_mint: &str, amount: u64, slippage_bps: u16) -> Result<Quote, JupiterError> {
        let url = format!("{}/quote", self.config.base_url);
        let amount = amount.to_string();
        let slippage = slippage_bps.to_string();
        let params = [
            ("inputMint", input_mint),
            ("outputMint", output_mint),
            ("amount", amount.as_str()),
            ("slippageBps", slippage.as_str()),
            ("onlyDirectRoutes", "false"),
            ("asLegacyTransaction", "false"),
            ("restrictIntermediateTokens", "true"),
            ("swapMode", "ExactIn"),
        ];
        let raw = self.send_with_retry(|| self.http.get(&url).query(&params)).await?;
        Quote::from_json(raw)
    }

    /// Build an unsigned swap transaction for `quote`, returned as wire bytes.
    pub async fn swap_transaction(
        &self,
        quote: &Quote,
        user: &str,
        priority_fee_lamports: u64,
        max_slippage_bps: u16,
    ) -> Result<Vec<u8>, JupiterError> {
        let url = format!("{}/swap", self.config.base_url);
        let payload = json!({
            "userPublicKey": user,
            "quoteResponse": quote.raw,
            "dynamicSlippage": {"maxBps": max_slippage_bps},
            "asLegacyTransaction": false,
            "wrapAndUnwrapSol": true,
            "useSharedAccounts": false,
            "useTokenLedger": false,
            "prioritizationFeeLamports": priority_fee_lamports,
            "useJito": self.config.use_jito,
            "useAtaProgramId": true,
        });
        let raw = self.send_with_retry(|| self.http.post(&url).json(&payload)).await?;
        let encoded = raw
            .get("swapTransaction")
            .and_then(Value::as_str)
            .ok_or_else(|| JupiterError::Malformed("missing swapTransaction".to_string()))?;
        Ok(BASE64.decode(encoded)?)
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<Value, JupiterError>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempts = self.config.max_retries.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            self.limiter.acquire().await;

            let mut delay = backoff_delay(self.config.backoff_base, attempt) + jitter();
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if let Some(secs) = retry_after_secs(&response) {
                            delay = Duration::from_secs_f64(secs);
                        }
                        last = "429 Too Many Requests".to_string();
                    } else if status.is_server_error() {
                        last = format!("server error {status}");
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        return Err(JupiterError::Status { status: status.as_u16(), body });
                    }
                }
                Err(e) => {
                    last = e.to_string();
                }
            }

            if attempt < attempts {
                debug!("Jupiter request failed ({last}), retry {attempt}/{attempts} in {delay:?}");
                tokio::time::sleep(delay).await;
            }
        }

        warn!("Jupiter request gave up after {attempts} attempts: {last}");
        Err(JupiterError::RetriesExhausted { attempts, last })
    }
}

fn retry_after_secs(response: &reqwest::Response) -> Option<f64> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
}

fn jitter() -> Duration {
    let max = MAX_JITTER.as_secs_f64();
    Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_quote() -> Value {
        json!({
            "inputMint": "So11111111111111111111111111111111111111112",
            "outputMint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "inAmount": "1000000000",
            "outAmount": "152340000",
            "priceImpactPct": "0.0012",
            "routePlan": []
        })
    }

    #[test]
    fn test_quote_from_json() {
        let quote = Quote::from_json(sample_quote()).unwrap();
        assert_eq!(quote.in_amount, 1_000_000_000);
        assert_eq!(quote.out_amount, 152_340_000);
        assert_eq!(quote.price_impact_pct, Some(dec!(0.0012)));
        assert_eq!(quote.raw["routePlan"], json!([]));
    }

    #[test]
    fn test_quote_missing_fields() {
        let mut raw = sample_quote();
        raw.as_object_mut().unwrap().remove("outAmount");
        assert!(matches!(Quote::from_json(raw), Err(JupiterError::Malformed(_))));

        let mut raw = sample_quote();
        raw["inAmount"] = json!("abc");
        assert!(matches!(Quote::from_json(raw), Err(JupiterError::Malformed(_))));
    }

    #[test]
    fn test_quote_price_impact_variants() {
        let mut raw = sample_quote();
        raw["priceImpactPct"] = json!(0.5);
        assert_eq!(Quote::from_json(raw).unwrap().price_impact_pct, Some(dec!(0.5)));

        let mut raw = sample_quote();
        raw.as_object_mut().unwrap().remove("priceImpactPct");
        assert_eq!(Quote::from_json(raw).unwrap().price_impact_pct, None);
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(200);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, 4), Duration::from_millis(1600));
    }

    #[test]
    fn test_jitter_bounded() {
        for _ in 0..100 {
            assert!(jitter() < MAX_JITTER);
        }
    }

    #[test]
    fn test_default_config() {
        let config = JupiterConfig::default();
        assert_eq!(config.base_url, DEFAULT_JUPITER_URL);
        assert_eq!(config.max_retries, 5);
        assert!(config.use_jito);
    }
}
