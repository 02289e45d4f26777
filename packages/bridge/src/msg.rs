//! Message types for the B52 bridge
//!
//! Instantiation, execution and query messages, plus their responses.

use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Coin, Uint128};

// ============================================================================
// Instantiate
// ============================================================================

/// Instantiate message
#[cw_serde]
pub struct InstantiateMsg {
    /// Address allowed to pin the source block height
    pub authority: String,
    /// Deposit contract address on the source chain
    pub deposit_contract: String,
    /// Minted denom (default: usdc)
    pub denom: Option<String>,
    /// Module account receiving mints (default: bridge)
    pub module_account: Option<String>,
    /// Bech32 prefix of ledger addresses (default: b52)
    pub address_prefix: Option<String>,
}

// ============================================================================
// Execute Messages
// ============================================================================

/// Execute messages
#[cw_serde]
pub enum ExecuteMsg {
    /// Mint a deposit looked up by index through `deposits(uint256)`.
    ///
    /// The source identifier is derived from the contract address and index.
    ProcessDeposit {
        creator: String,
        deposit_index: u64,
        /// Source block to read at; unset or 0 uses the pinned height, then latest
        eth_block_height: Option<u64>,
    },

    /// Mint a deposit located through its `Deposited` log in a block range.
    ///
    /// The source identifier is the emitting transaction hash.
    ProcessDepositEvent {
        creator: String,
        deposit_index: u64,
        from_block: u64,
        to_block: u64,
    },

    /// Pin the source block height used for index lookups (authority only).
    UpdateEthBlockHeight {
        authority: String,
        eth_block_height: u64,
    },
}

/// Data returned by a successful `ProcessDeposit` / `ProcessDepositEvent`
#[cw_serde]
pub struct ProcessDepositResponse {
    /// Normalized bech32 recipient
    pub recipient: String,
    pub amount: Coin,
    pub deposit_index: u64,
    /// Source block height the deposit was read at
    pub eth_block_height: u64,
    pub source_identifier: String,
}

// ============================================================================
// Query Messages
// ============================================================================

#[cw_serde]
#[derive(QueryResponses)]
pub enum QueryMsg {
    /// Whether a source identifier has been minted
    #[returns(IsTxProcessedResponse)]
    IsTxProcessed { identifier: String },

    /// Processed identifiers, ascending
    #[returns(ProcessedDepositsResponse)]
    ProcessedDeposits {
        start_after: Option<String>,
        limit: Option<u32>,
    },

    /// Processing status of a deposit index
    #[returns(DepositIndexStatusResponse)]
    DepositIndexStatus { deposit_index: u64 },

    /// Deterministic identifier of a deposit index for the configured contract
    #[returns(DepositIdentifierResponse)]
    DepositIdentifier { deposit_index: u64 },

    /// Pinned source block height
    #[returns(EthBlockHeightResponse)]
    EthBlockHeight {},

    #[returns(ConfigResponse)]
    Config {},

    /// Ledger balance of an address
    #[returns(BalanceResponse)]
    Balance {
        address: String,
        denom: Option<String>,
    },
}

// ============================================================================
// Query Responses
// ============================================================================

#[cw_serde]
pub struct IsTxProcessedResponse {
    pub processed: bool,
}

#[cw_serde]
pub struct ProcessedDepositsResponse {
    pub identifiers: Vec<String>,
}

#[cw_serde]
pub struct DepositIndexStatusResponse {
    pub deposit_index: u64,
    pub processed: bool,
    pub eth_block_height: Option<u64>,
}

#[cw_serde]
pub struct DepositIdentifierResponse {
    pub deposit_index: u64,
    pub identifier: String,
    pub processed: bool,
}

#[cw_serde]
pub struct EthBlockHeightResponse {
    pub eth_block_height: u64,
}

#[cw_serde]
pub struct ConfigResponse {
    pub authority: String,
    pub deposit_contract: String,
    pub denom: String,
    pub module_account: String,
    pub address_prefix: String,
}

#[cw_serde]
pub struct BalanceResponse {
    pub address: String,
    pub denom: String,
    pub amount: Uint128,
}
