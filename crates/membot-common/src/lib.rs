//! Shared types and well-known addresses for the membot sniper.
//!
//! This crate contains:
//! - Well-known Solana program and mint addresses
//! - Unit constants (lamports, token decimals, rent)
//! - Common types (TradeSide, Commitment, Candidate)

pub mod addresses;
pub mod types;

pub use addresses::*;
pub use types::*;
