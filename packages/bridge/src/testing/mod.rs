//! Testing Utilities
//!
//! In-memory source chain and fixtures for exercising the deposit transition
//! without a JSON-RPC endpoint.

mod mock_source;

pub use mock_source::{deposit_log, MockSourceChain, DEPOSIT_UNDERLYING_SIGNATURE};

use cosmwasm_std::MemoryStorage;

use crate::contract::instantiate;
use crate::msg::InstantiateMsg;

/// Deposit contract used by the fixtures
pub const TEST_DEPOSIT_CONTRACT: &str = "0xcc391c8f1aFd6DB5D8b0e064BA81b1383b14FE5B";

/// Authority / creator address used by the fixtures
pub const TEST_AUTHORITY: &str = "b52168ketml7jed9gl7t2quelfkktr0zuuescapgde";

/// Instantiate a fresh bridge with the fixture contract and defaults.
pub fn setup_bridge() -> MemoryStorage {
    let mut store = MemoryStorage::new();
    let msg = InstantiateMsg {
        authority: TEST_AUTHORITY.to_string(),
        deposit_contract: TEST_DEPOSIT_CONTRACT.to_string(),
        denom: None,
        module_account: None,
        address_prefix: None,
    };
    if let Err(e) = instantiate(&mut store, msg) {
        panic!("fixture instantiate failed: {}", e);
    }
    store
}
