//! B52 Bridge - Entry Points
//!
//! The host (the node, or a test harness) owns the store and the source-chain client
//! and dispatches messages through these functions:
//! - `execute/` - Execute message handlers
//! - `query` - Query message handlers

use cosmwasm_std::{to_json_binary, Binary, Response, StdResult, Storage};
use cw2::set_contract_version;

use crate::address_codec::{validate_signer, DEFAULT_ADDRESS_PREFIX};
use crate::bank::MintAuthority;
use crate::error::BridgeError;
use crate::execute::{
    execute_process_deposit, execute_process_deposit_event, execute_update_eth_block_height,
};
use crate::msg::{ExecuteMsg, InstantiateMsg, QueryMsg};
use crate::processor::BridgeDepositProcessor;
use crate::query::{
    query_balance, query_config, query_deposit_identifier, query_deposit_index_status,
    query_eth_block_height, query_is_tx_processed, query_processed_deposits,
};
use crate::source::SourceChainClient;
use crate::state::{
    Config, CONFIG, CONTRACT_NAME, CONTRACT_VERSION, DEFAULT_DENOM, DEFAULT_MODULE_ACCOUNT,
    LAST_ETH_BLOCK_HEIGHT,
};

// ============================================================================
// Instantiate
// ============================================================================

pub fn instantiate(store: &mut dyn Storage, msg: InstantiateMsg) -> Result<Response, BridgeError> {
    set_contract_version(store, CONTRACT_NAME, CONTRACT_VERSION)?;

    let address_prefix = non_empty_or(msg.address_prefix, DEFAULT_ADDRESS_PREFIX);
    let denom = non_empty_or(msg.denom, DEFAULT_DENOM);
    let module_account = non_empty_or(msg.module_account, DEFAULT_MODULE_ACCOUNT);

    // Validate authority address
    validate_signer(&msg.authority, &address_prefix)?;

    // Validate deposit contract: 0x followed by 20 hex-encoded bytes
    let contract_hex = msg
        .deposit_contract
        .strip_prefix("0x")
        .or_else(|| msg.deposit_contract.strip_prefix("0X"));
    let contract_ok = contract_hex
        .is_some_and(|body| body.len() == 40 && body.bytes().all(|b| b.is_ascii_hexdigit()));
    if !contract_ok {
        return Err(BridgeError::InvalidRequest {
            reason: format!("invalid deposit contract address {}", msg.deposit_contract),
        });
    }

    let config = Config {
        authority: msg.authority,
        deposit_contract: msg.deposit_contract,
        denom,
        module_account,
        address_prefix,
    };
    CONFIG.save(store, &config)?;
    LAST_ETH_BLOCK_HEIGHT.save(store, &0u64)?;

    Ok(Response::new()
        .add_attribute("method", "instantiate")
        .add_attribute("authority", config.authority)
        .add_attribute("deposit_contract", config.deposit_contract)
        .add_attribute("denom", config.denom)
        .add_attribute("version", CONTRACT_VERSION))
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

// ============================================================================
// Execute
// ============================================================================

pub async fn execute<S, C, M>(
    store: &mut S,
    processor: &BridgeDepositProcessor<'_, C, M>,
    msg: ExecuteMsg,
) -> Result<Response, BridgeError>
where
    S: Storage,
    C: SourceChainClient + ?Sized,
    M: MintAuthority + ?Sized,
{
    match msg {
        ExecuteMsg::ProcessDeposit {
            creator,
            deposit_index,
            eth_block_height,
        } => {
            execute_process_deposit(store, processor, creator, deposit_index, eth_block_height)
                .await
        }
        ExecuteMsg::ProcessDepositEvent {
            creator,
            deposit_index,
            from_block,
            to_block,
        } => {
            execute_process_deposit_event(
                store,
                processor,
                creator,
                deposit_index,
                from_block,
                to_block,
            )
            .await
        }
        ExecuteMsg::UpdateEthBlockHeight {
            authority,
            eth_block_height,
        } => execute_update_eth_block_height(store, authority, eth_block_height),
    }
}

// ============================================================================
// Query
// ============================================================================

pub fn query<M: MintAuthority + ?Sized>(
    store: &dyn Storage,
    mint: &M,
    msg: QueryMsg,
) -> StdResult<Binary> {
    match msg {
        QueryMsg::IsTxProcessed { identifier } => {
            to_json_binary(&query_is_tx_processed(store, identifier)?)
        }
        QueryMsg::ProcessedDeposits { start_after, limit } => {
            to_json_binary(&query_processed_deposits(store, start_after, limit)?)
        }
        QueryMsg::DepositIndexStatus { deposit_index } => {
            to_json_binary(&query_deposit_index_status(store, deposit_index)?)
        }
        QueryMsg::DepositIdentifier { deposit_index } => {
            to_json_binary(&query_deposit_identifier(store, deposit_index)?)
        }
        QueryMsg::EthBlockHeight {} => to_json_binary(&query_eth_block_height(store)?),
        QueryMsg::Config {} => to_json_binary(&query_config(store)?),
        QueryMsg::Balance { address, denom } => {
            to_json_binary(&query_balance(store, mint, address, denom)?)
        }
    }
}
