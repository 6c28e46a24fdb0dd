//! Rug-pull heuristic: a mint with no mint authority is treated as suspicious.

use std::sync::Arc;

use membot_chain::{RpcClient, RpcError};
use tracing::debug;

/// Checks a mint's authority over RPC.
#[derive(Debug, Clone)]
pub struct RugpullCheck {
    rpc: Arc<RpcClient>,
}

impl RugpullCheck {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }

    /// True when the mint looks unsafe to buy.
    pub async fn is_suspicious(&self, mint: &str) -> Result<bool, RpcError> {
        let authority = self.rpc.get_mint_authority(mint).await?;
        debug!("Mint authority for {mint}: {authority:?}");
        Ok(authority_is_suspicious(authority.as_deref()))
    }
}

/// Missing authority (renounced or not a mint) is suspicious.
pub fn authority_is_suspicious(authority: Option<&str>) -> bool {
    authority.is_none_or(|a| a.is_empty())
}
