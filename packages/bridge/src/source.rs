//! Source-chain access.
//!
//! [`SourceChainClient`] is the only non-deterministic input of a deposit transition.
//! The node implements it over JSON-RPC; tests implement it in memory.

use async_trait::async_trait;
use cosmwasm_schema::cw_serde;

use crate::error::BridgeError;

/// A deposit, verified and decoded, ready for validation. Never persisted.
#[cw_serde]
pub struct DepositRecord {
    pub deposit_index: u64,
    /// Recipient exactly as written on the source chain
    pub recipient: String,
    /// Amount in base units of the minted denom
    pub amount: u64,
    /// Idempotency key: source tx hash, or the deterministic identifier
    pub source_identifier: String,
    /// Source block height the record was read at
    pub eth_block_height: u64,
}

/// `(account, amount)` as stored by the deposit contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainDeposit {
    pub account: String,
    pub amount: u64,
}

/// Inclusive block range of a log query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from_block: u64,
    pub to_block: u64,
}

impl BlockRange {
    pub fn new(from_block: u64, to_block: u64) -> Result<Self, BridgeError> {
        if from_block > to_block {
            return Err(BridgeError::InvalidRequest {
                reason: format!("from_block {} is after to_block {}", from_block, to_block),
            });
        }
        Ok(Self {
            from_block,
            to_block,
        })
    }

    /// Split into consecutive windows of at most `max_span` blocks.
    pub fn chunks(&self, max_span: u64) -> Vec<BlockRange> {
        let span = max_span.max(1);
        let mut chunks = Vec::new();
        let mut from = self.from_block;
        loop {
            let to = from.saturating_add(span - 1).min(self.to_block);
            chunks.push(BlockRange {
                from_block: from,
                to_block: to,
            });
            if to >= self.to_block {
                break;
            }
            from = to + 1;
        }
        chunks
    }
}

/// A `Deposited` log as returned by the log query, without its transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositLog {
    pub tx_hash: [u8; 32],
    pub block_number: u64,
    pub log_index: u64,
    /// Non-indexed event data
    pub data: Vec<u8>,
}

/// A matching log together with the input of the transaction that emitted it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEventLog {
    pub tx_hash: [u8; 32],
    pub block_number: u64,
    pub log_index: u64,
    /// Non-indexed event data
    pub data: Vec<u8>,
    /// `to` of the emitting transaction, `0x`-prefixed hex
    pub tx_to: Option<String>,
    /// `input` of the emitting transaction
    pub calldata: Vec<u8>,
}

/// Read-only source-chain queries.
///
/// Implementations map transport failures and timeouts to
/// [`BridgeError::SourceUnavailable`] and undecodable replies to
/// [`BridgeError::InvalidResponse`].
#[async_trait]
pub trait SourceChainClient: Send + Sync {
    /// Latest block height known to the provider.
    async fn latest_block(&self) -> Result<u64, BridgeError>;

    /// `deposits(uint256)` on `contract` at `block`, decoded as `(string, uint256)`.
    async fn deposit_by_index(
        &self,
        contract: &str,
        deposit_index: u64,
        block: u64,
    ) -> Result<OnChainDeposit, BridgeError>;

    /// Logs of `contract` with `topic` in `range`. An empty range is `Ok(vec![])`.
    async fn deposit_logs(
        &self,
        topic: [u8; 32],
        contract: &str,
        range: BlockRange,
    ) -> Result<Vec<DepositLog>, BridgeError>;

    /// Logs of `contract` with `topic` in `range`, each with its transaction input.
    /// Fails with [`BridgeError::NotFound`] when no log matches.
    async fn event_and_calldata(
        &self,
        topic: [u8; 32],
        contract: &str,
        range: BlockRange,
    ) -> Result<Vec<DepositEventLog>, BridgeError>;
}
