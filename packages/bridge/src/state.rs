//! State definitions for the B52 bridge
//!
//! Everything here lives in the replicated store. The processed-deposit set is only
//! written through [`crate::ledger`].

use cosmwasm_schema::cw_serde;
use cosmwasm_std::Empty;
use cw_storage_plus::{Item, Map};

// ============================================================================
// Core Configuration
// ============================================================================

/// Bridge configuration, fixed at instantiation
#[cw_serde]
pub struct Config {
    /// Address allowed to pin the source block height
    pub authority: String,
    /// Deposit contract on the source chain, exactly as used in identifiers
    pub deposit_contract: String,
    /// Denom minted for deposits
    pub denom: String,
    /// Module account that receives mints before the transfer to the recipient
    pub module_account: String,
    /// Bech32 prefix of ledger addresses
    pub address_prefix: String,
}

pub const CONFIG: Item<Config> = Item::new("config");

// ============================================================================
// Processed Deposits
// ============================================================================

/// Processed source identifiers; presence alone means "already minted"
pub const PROCESSED_DEPOSITS: Map<&str, Empty> = Map::new("processed_deposits");

/// Processed deposit index -> source block height the deposit was read at
pub const PROCESSED_DEPOSIT_INDICES: Map<u64, u64> = Map::new("processed_deposit_indices");

// ============================================================================
// Source Chain Tracking
// ============================================================================

/// Source block height pinned by the authority (0 = follow latest)
pub const LAST_ETH_BLOCK_HEIGHT: Item<u64> = Item::new("last_eth_block_height");

// ============================================================================
// Constants
// ============================================================================

/// Contract name for cw2 version info
pub const CONTRACT_NAME: &str = "crates.io:b52-bridge";

/// Contract version for cw2 version info
pub const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default denom of minted deposits
pub const DEFAULT_DENOM: &str = "usdc";

/// Default module account name
pub const DEFAULT_MODULE_ACCOUNT: &str = "bridge";

/// Default page size for list queries
pub const DEFAULT_LIMIT: u32 = 10;

/// Maximum page size for list queries
pub const MAX_LIMIT: u32 = 50;
