//! Query handlers for the B52 bridge.
//!
//! Queries are read-only and never consult the source chain.

use cosmwasm_std::{StdResult, Storage};

use crate::bank::MintAuthority;
use crate::hash::deterministic_identifier;
use crate::ledger;
use crate::msg::{
    BalanceResponse, ConfigResponse, DepositIdentifierResponse, DepositIndexStatusResponse,
    EthBlockHeightResponse, IsTxProcessedResponse, ProcessedDepositsResponse,
};
use crate::state::{CONFIG, DEFAULT_LIMIT, LAST_ETH_BLOCK_HEIGHT, MAX_LIMIT};

// ============================================================================
// Core Queries
// ============================================================================

/// Query bridge configuration.
pub fn query_config(store: &dyn Storage) -> StdResult<ConfigResponse> {
    let config = CONFIG.load(store)?;
    Ok(ConfigResponse {
        authority: config.authority,
        deposit_contract: config.deposit_contract,
        denom: config.denom,
        module_account: config.module_account,
        address_prefix: config.address_prefix,
    })
}

/// Query the pinned source block height (0 when unpinned).
pub fn query_eth_block_height(store: &dyn Storage) -> StdResult<EthBlockHeightResponse> {
    Ok(EthBlockHeightResponse {
        eth_block_height: LAST_ETH_BLOCK_HEIGHT.may_load(store)?.unwrap_or(0),
    })
}

// ============================================================================
// Processed Deposit Queries
// ============================================================================

pub fn query_is_tx_processed(
    store: &dyn Storage,
    identifier: String,
) -> StdResult<IsTxProcessedResponse> {
    Ok(IsTxProcessedResponse {
        processed: ledger::has(store, &identifier),
    })
}

/// Page through processed identifiers.
pub fn query_processed_deposits(
    store: &dyn Storage,
    start_after: Option<String>,
    limit: Option<u32>,
) -> StdResult<ProcessedDepositsResponse> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let identifiers = ledger::processed_identifiers(store, start_after.as_deref(), limit)?;
    Ok(ProcessedDepositsResponse { identifiers })
}

pub fn query_deposit_index_status(
    store: &dyn Storage,
    deposit_index: u64,
) -> StdResult<DepositIndexStatusResponse> {
    let eth_block_height = ledger::deposit_index_height(store, deposit_index)?;
    Ok(DepositIndexStatusResponse {
        deposit_index,
        processed: eth_block_height.is_some(),
        eth_block_height,
    })
}

/// Compute the deterministic identifier of `deposit_index` and whether it was minted.
pub fn query_deposit_identifier(
    store: &dyn Storage,
    deposit_index: u64,
) -> StdResult<DepositIdentifierResponse> {
    let config = CONFIG.load(store)?;
    let identifier = deterministic_identifier(&config.deposit_contract, deposit_index);
    Ok(DepositIdentifierResponse {
        deposit_index,
        processed: ledger::has(store, &identifier),
        identifier,
    })
}

// ============================================================================
// Bank Queries
// ============================================================================

/// Query a ledger balance; `denom` defaults to the bridged denom.
pub fn query_balance<M: MintAuthority + ?Sized>(
    store: &dyn Storage,
    mint: &M,
    address: String,
    denom: Option<String>,
) -> StdResult<BalanceResponse> {
    let denom = match denom {
        Some(denom) => denom,
        None => CONFIG.load(store)?.denom,
    };
    let amount = mint.balance(store, &address, &denom)?;
    Ok(BalanceResponse {
        address,
        denom,
        amount,
    })
}
