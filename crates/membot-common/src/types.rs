//! Shared types for the membot sniper.
//!
//! Amounts on the wire are raw integer units (lamports, token base units).
//! USD figures live in `rust_decimal::Decimal` in the bot crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of a swap relative to the traded token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// SOL in, token out.
    Buy,
    /// Token in, SOL out.
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown commitment level.
#[derive(Debug, Error)]
#[error("unknown commitment level: {0}")]
pub struct ParseCommitmentError(String);

/// Solana commitment level.
///
/// Ordered so that a stronger level compares greater: a transaction that is
/// `Finalized` also satisfies `Confirmed` and `Processed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }

    /// Returns true if this observed level meets `target`.
    pub fn satisfies(&self, target: Commitment) -> bool {
        *self >= target
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Commitment {
    type Err = ParseCommitmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(ParseCommitmentError(other.to_string())),
        }
    }
}

/// A possible new token mint surfaced by the log watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Signature of the transaction that surfaced the mint (`manual` when forced).
    pub signature: String,
    /// Base58 mint address.
    pub mint: String,
    /// Unix time (seconds) when the watcher saw it.
    pub detected_at: f64,
    /// Slot of the notification, 0 when unknown.
    pub slot: u64,
}

impl Candidate {
    pub fn new(signature: impl Into<String>, mint: impl Into<String>, detected_at: f64, slot: u64) -> Self {
        Self {
            signature: signature.into(),
            mint: mint.into(),
            detected_at,
            slot,
        }
    }

    /// Seconds since detection, relative to `now` (unix seconds).
    pub fn age_secs(&self, now: f64) -> f64 {
        (now - self.detected_at).max(0.0)
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_side_display() {
        assert_eq!(TradeSide::Buy.to_string(), "buy");
        assert_eq!(TradeSide::Sell.to_string(), "sell");
    }

    #[test]
    fn test_commitment_ordering() {
        assert!(Commitment::Finalized.satisfies(Commitment::Confirmed));
        assert!(Commitment::Finalized.satisfies(Commitment::Processed));
        assert!(Commitment::Confirmed.satisfies(Commitment::Confirmed));
        assert!(!Commitment::Processed.satisfies(Commitment::Confirmed));
    }

    #[test]
    fn test_commitment_from_str() {
        assert_eq!("processed".parse::<Commitment>().unwrap(), Commitment::Processed);
        assert_eq!("FINALIZED".parse::<Commitment>().unwrap(), Commitment::Finalized);
        assert!("max".parse::<Commitment>().is_err());
        assert_eq!(Commitment::default(), Commitment::Confirmed);
    }

    #[test]
    fn test_candidate_age() {
        let c = Candidate::new("sig", "mint", 100.0, 5);
        assert_eq!(c.age_secs(105.5), 5.5);
        assert_eq!(c.age_secs(90.0), 0.0);
    }
}
