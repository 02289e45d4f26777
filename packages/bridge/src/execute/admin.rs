//! Authority operations.

use cosmwasm_std::{Response, Storage};

use crate::error::BridgeError;
use crate::state::{CONFIG, LAST_ETH_BLOCK_HEIGHT};

// ============================================================================
// Source Block Height
// ============================================================================

/// Pin the source block height used by index lookups. 0 means "follow latest".
pub fn execute_update_eth_block_height(
    store: &mut dyn Storage,
    authority: String,
    eth_block_height: u64,
) -> Result<Response, BridgeError> {
    let config = CONFIG.load(store)?;
    if authority != config.authority {
        return Err(BridgeError::Unauthorized);
    }

    let previous = LAST_ETH_BLOCK_HEIGHT.may_load(store)?.unwrap_or(0);
    LAST_ETH_BLOCK_HEIGHT.save(store, &eth_block_height)?;

    Ok(Response::new()
        .add_attribute("method", "update_eth_block_height")
        .add_attribute("previous_eth_block_height", previous.to_string())
        .add_attribute("eth_block_height", eth_block_height.to_string()))
}
