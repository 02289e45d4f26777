//! Deposit identifiers and source-chain hashes
//!
//! A processed deposit is remembered by its `source_identifier`:
//! - event path: the real source transaction hash, `0x`-prefixed lowercase hex
//! - index path: `0x` + hex(sha256("<contract>-<index>")), see [`deterministic_identifier`]
//!
//! The contract address is hashed exactly as configured (no case folding), so every
//! replica must be configured with the same string.
//!
//! # Source ABI
//! ```solidity
//! event Deposited(string indexed account, uint256 amount, uint256 index);
//! function deposits(uint256) external view returns (string memory account, uint256 amount);
//! function depositUnderlying(uint256 amount, string calldata receiver) external;
//! ```

use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

/// Canonical signature of the deposit event
pub const DEPOSITED_EVENT_SIGNATURE: &str = "Deposited(string,uint256,uint256)";

/// `keccak256(DEPOSITED_EVENT_SIGNATURE)`, topic[0] of every deposit log
pub const DEPOSITED_EVENT_TOPIC: &str =
    "0x46008385c8bcecb546cb0a96e5b409f34ac1a8ece8f3ea98488282519372bdf2";

/// Signature of the contract's deposit lookup accessor
pub const DEPOSITS_FUNCTION_SIGNATURE: &str = "deposits(uint256)";

/// Compute keccak256 hash of arbitrary data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Topic hash of the `Deposited` event as raw bytes
pub fn deposited_event_topic() -> [u8; 32] {
    keccak256(DEPOSITED_EVENT_SIGNATURE.as_bytes())
}

/// 4-byte selector of `deposits(uint256)`
pub fn deposits_selector() -> [u8; 4] {
    let hash = keccak256(DEPOSITS_FUNCTION_SIGNATURE.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Derive the idempotency key of a deposit that is referenced by index only.
///
/// Pure function of its inputs; every replica computes the same value.
pub fn deterministic_identifier(contract_address: &str, deposit_index: u64) -> String {
    let input = format!("{}-{}", contract_address, deposit_index);
    let digest = Sha256::digest(input.as_bytes());
    format!("0x{}", hex::encode(digest))
}

/// Identifier of a deposit referenced by its source transaction hash
pub fn tx_hash_identifier(tx_hash: &[u8; 32]) -> String {
    bytes32_to_hex(tx_hash)
}

/// Convert bytes32 to `0x`-prefixed lowercase hex
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}
