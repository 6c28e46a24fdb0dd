//! Base58 public keys and program-derived addresses.

use std::fmt;
use std::str::FromStr;

use curve25519_dalek::edwards::CompressedEdwardsY;
use membot_common::ASSOCIATED_TOKEN_PROGRAM_ID;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Suffix mixed into every program-derived address hash.
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Maximum length of a single PDA seed.
pub const MAX_SEED_LEN: usize = 32;

/// Errors produced when parsing or deriving keys.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PubkeyError {
    #[error("invalid base58: {0}")]
    Base58(String),

    #[error("expected 32 bytes, got {0}")]
    WrongLength(usize),

    #[error("seed longer than {MAX_SEED_LEN} bytes")]
    SeedTooLong,

    #[error("no viable bump seed")]
    NoViableBump,
}

/// A 32-byte ed25519 public key or program address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pubkey([u8; 32]);

impl Pubkey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a compile-time constant address.
    ///
    /// Only for addresses from `membot_common::addresses`, which are known
    /// to be valid.
    pub fn from_static(s: &'static str) -> Self {
        match s.parse() {
            Ok(pk) => pk,
            Err(e) => panic!("invalid static pubkey {s}: {e}"),
        }
    }

    /// Whether the bytes decode to a point on the ed25519 curve.
    ///
    /// Program-derived addresses must be off-curve so that no private key
    /// can sign for them.
    pub fn is_on_curve(&self) -> bool {
        CompressedEdwardsY(self.0).decompress().is_some()
    }

    /// Hash seeds into a candidate address, returning None if it lands on the curve.
    pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<Option<Pubkey>, PubkeyError> {
        let mut hasher = Sha256::new();
        for seed in seeds {
            if seed.len() > MAX_SEED_LEN {
                return Err(PubkeyError::SeedTooLong);
            }
            hasher.update(seed);
        }
        hasher.update(program_id.as_bytes());
        hasher.update(PDA_MARKER);
        let hash: [u8; 32] = hasher.finalize().into();
        let candidate = Pubkey(hash);
        if candidate.is_on_curve() {
            Ok(None)
        } else {
            Ok(Some(candidate))
        }
    }

    /// Find the canonical program address: the first off-curve result
    /// searching bump seeds from 255 downwards.
    pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8), PubkeyError> {
        for bump in (0..=u8::MAX).rev() {
            let bump_seed = [bump];
            let mut with_bump: Vec<&[u8]> = seeds.to_vec();
            with_bump.push(&bump_seed);
            if let Some(address) = Self::create_program_address(&with_bump, program_id)? {
                return Ok((address, bump));
            }
        }
        Err(PubkeyError::NoViableBump)
    }
}

/// Associated token account for `owner` holding `mint` under `token_program`.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Result<Pubkey, PubkeyError> {
    let ata_program = Pubkey::from_static(ASSOCIATED_TOKEN_PROGRAM_ID);
    let (address, _bump) = Pubkey::find_program_address(
        &[owner.as_bytes(), token_program.as_bytes(), mint.as_bytes()],
        &ata_program,
    )?;
    Ok(address)
}

impl FromStr for Pubkey {
    type Err = PubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| PubkeyError::Base58(e.to_string()))?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| PubkeyError::WrongLength(bytes.len()))?;
        Ok(Pubkey(array))
    }
}

impl TryFrom<&[u8]> for Pubkey {
    type Error = PubkeyError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| PubkeyError::WrongLength(bytes.len()))?;
        Ok(Pubkey(array))
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({self})")
    }
}

impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use membot_common::{SOL_MINT, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID, USDC_MINT};

    #[test]
    fn test_parse_and_display() {
        let pk: Pubkey = USDC_MINT.parse().unwrap();
        assert_eq!(pk.to_string(), USDC_MINT);
        assert_eq!(Pubkey::from_static(SYSTEM_PROGRAM_ID).to_bytes(), [0u8; 32]);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!("0OIl".parse::<Pubkey>(), Err(PubkeyError::Base58(_))));
        assert_eq!("1111".parse::<Pubkey>(), Err(PubkeyError::WrongLength(4)));
    }

    #[test]
    fn test_find_program_address_is_off_curve() {
        let program = Pubkey::from_static(TOKEN_PROGRAM_ID);
        let (address, bump) = Pubkey::find_program_address(&[b"seed"], &program).unwrap();
        assert!(!address.is_on_curve());

        // The canonical bump recreates the same address.
        let again = Pubkey::create_program_address(&[b"seed", &[bump]], &program).unwrap();
        assert_eq!(again, Some(address));
    }

    #[test]
    fn test_seed_too_long() {
        let program = Pubkey::from_static(TOKEN_PROGRAM_ID);
        let long = [7u8; 33];
        assert_eq!(
            Pubkey::find_program_address(&[&long], &program),
            Err(PubkeyError::SeedTooLong)
        );
    }

    #[test]
    fn test_associated_token_address_depends_on_mint() {
        let owner: Pubkey = "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R".parse().unwrap();
        let token_program = Pubkey::from_static(TOKEN_PROGRAM_ID);
        let a = associated_token_address(&owner, &Pubkey::from_static(SOL_MINT), &token_program).unwrap();
        let b = associated_token_address(&owner, &Pubkey::from_static(USDC_MINT), &token_program).unwrap();
        assert_ne!(a, b);
        assert!(!a.is_on_curve());
        assert_eq!(
            a,
            associated_token_address(&owner, &Pubkey::from_static(SOL_MINT), &token_program).unwrap()
        );
    }

    #[test]
    fn test_find_program_address_matches_mainnet_accounts() {
        // pump.fun bonding-curve program and its singleton accounts.
        let program: Pubkey = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P".parse().unwrap();
        let cases: [(&[u8], &str); 3] = [
            (b"global", "4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf"),
            (b"mint-authority", "TSLvdd1pWpHVjahSpsvCXUbgwsL3JAcvokwaKt1eokM"),
            (b"__event_authority", "Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1"),
        ];
        for (seed, expected) in cases {
            let (address, bump) = Pubkey::find_program_address(&[seed], &program).unwrap();
            assert_eq!(address.to_string(), expected);
            assert_eq!(bump, 255);
        }
    }

    #[test]
    fn test_associated_token_address_vectors() {
        let owner: Pubkey = "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R".parse().unwrap();
        let token_program = Pubkey::from_static(TOKEN_PROGRAM_ID);
        let cases = [
            (USDC_MINT, "FXVFF5WhfpYC38x2oa5hrkHeWUpXeZXa2ViHdg2b2Y55"),
            (SOL_MINT, "F7oWrj3gVjT2HeTBbJv4HQEY3a2UcPtFNFSPZSY5UQy3"),
            ("DezXAZ8z7PfnVsKXcE4cYGP33aDDoa5zQPKcTgUX5bC9", "8mQMDEZw9utsYkJaSej6F9pAEiH8sM8SQXxdbNdZPmDE"),
        ];
        for (mint, expected) in cases {
            let mint: Pubkey = mint.parse().unwrap();
            let ata = associated_token_address(&owner, &mint, &token_program).unwrap();
            assert_eq!(ata.to_string(), expected);
        }
    }

    #[test]
    fn test_bump_search_skips_on_curve_candidates() {
        let owner: Pubkey = "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R".parse().unwrap();
        let mint: Pubkey = "DezXAZ8z7PfnVsKXcE4cYGP33aDDoa5zQPKcTgUX5bC9".parse().unwrap();
        let token_program = Pubkey::from_static(TOKEN_PROGRAM_ID);
        let ata_program = Pubkey::from_static(ASSOCIATED_TOKEN_PROGRAM_ID);
        let seeds: [&[u8]; 3] = [owner.as_bytes(), token_program.as_bytes(), mint.as_bytes()];

        let (address, bump) = Pubkey::find_program_address(&seeds, &ata_program).unwrap();
        assert_eq!(bump, 252);
        assert_eq!(address.to_string(), "8mQMDEZw9utsYkJaSej6F9pAEiH8sM8SQXxdbNdZPmDE");
        for skipped in [255u8, 254, 253] {
            let candidate = Pubkey::create_program_address(&[seeds[0], seeds[1], seeds[2], &[skipped]], &ata_program);
            assert_eq!(candidate, Ok(None), "bump {skipped}");
        }
    }

    #[test]
    fn test_serde_as_string() {
        let pk = Pubkey::from_static(USDC_MINT);
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{USDC_MINT}\""));
        let back: Pubkey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);
    }
}
