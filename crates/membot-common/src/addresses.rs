//! Well-known Solana addresses and unit constants.

/// Wrapped SOL mint.
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// USDC mint.
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";
pub const COMPUTE_BUDGET_PROGRAM_ID: &str = "ComputeBudget111111111111111111111111111111";
pub const RENT_SYSVAR_ID: &str = "SysvarRent111111111111111111111111111111111";
pub const JUPITER_V6_PROGRAM_ID: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";

pub const RAYDIUM_AMM_V4_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const RAYDIUM_CLMM_PROGRAM_ID: &str = "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK";
pub const RAYDIUM_CPMM_PROGRAM_ID: &str = "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C";

/// Default program watched for token creations.
pub const PUMPFUN_PROGRAM_ID: &str = "DezXAZ8z7PfnVsKXcE4cYGP33aDDoa5zQPKcTgUX5bC9";

/// Both SPL token programs. A token-program instruction's first account is
/// the mint for `InitializeMint`.
pub const TOKEN_PROGRAMS: [&str; 2] = [TOKEN_PROGRAM_ID, TOKEN_2022_PROGRAM_ID];

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// USDC has 6 decimals.
pub const USDC_DECIMALS: u32 = 6;

/// Rent-exempt minimum for an SPL token account (165 bytes).
pub const ATA_RENT_LAMPORTS: u64 = 2_039_280;

/// Addresses that show up in program logs but are never new mints.
pub fn is_well_known(address: &str) -> bool {
    matches!(
        address,
        SOL_MINT
            | USDC_MINT
            | SYSTEM_PROGRAM_ID
            | TOKEN_PROGRAM_ID
            | TOKEN_2022_PROGRAM_ID
            | ASSOCIATED_TOKEN_PROGRAM_ID
            | COMPUTE_BUDGET_PROGRAM_ID
            | RENT_SYSVAR_ID
            | JUPITER_V6_PROGRAM_ID
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known() {
        assert!(is_well_known(SOL_MINT));
        assert!(is_well_known(TOKEN_2022_PROGRAM_ID));
        assert!(is_well_known(JUPITER_V6_PROGRAM_ID));
        assert!(!is_well_known(PUMPFUN_PROGRAM_ID));
        assert!(!is_well_known("4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R"));
    }

    #[test]
    fn test_token_programs() {
        assert!(TOKEN_PROGRAMS.contains(&TOKEN_PROGRAM_ID));
        assert!(TOKEN_PROGRAMS.contains(&TOKEN_2022_PROGRAM_ID));
        assert!(!TOKEN_PROGRAMS.contains(&SYSTEM_PROGRAM_ID));
    }
}
