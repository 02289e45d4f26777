//! Deposit processing handlers.
//!
//! Both handlers validate the signer, then hand the request to the
//! [`BridgeDepositProcessor`]; they differ only in how the deposit is referenced.

use cosmwasm_std::{Response, Storage};

use crate::bank::MintAuthority;
use crate::error::BridgeError;
use crate::processor::{prepare_deposit, BridgeDepositProcessor, DepositRequest};
use crate::source::{BlockRange, SourceChainClient};

// ============================================================================
// ProcessDeposit (by index)
// ============================================================================

/// Mint the deposit stored at `deposit_index` in the source contract.
pub async fn execute_process_deposit<S, C, M>(
    store: &mut S,
    processor: &BridgeDepositProcessor<'_, C, M>,
    creator: String,
    deposit_index: u64,
    eth_block_height: Option<u64>,
) -> Result<Response, BridgeError>
where
    S: Storage,
    C: SourceChainClient + ?Sized,
    M: MintAuthority + ?Sized,
{
    let request = DepositRequest::ByIndex {
        deposit_index,
        eth_block_height,
    };
    let prepared = prepare_deposit(&*store, creator, request)?;
    processor.process_prepared(store, prepared).await
}

// ============================================================================
// ProcessDepositEvent (by log)
// ============================================================================

/// Mint the deposit whose `Deposited` log carries `deposit_index` within the range.
pub async fn execute_process_deposit_event<S, C, M>(
    store: &mut S,
    processor: &BridgeDepositProcessor<'_, C, M>,
    creator: String,
    deposit_index: u64,
    from_block: u64,
    to_block: u64,
) -> Result<Response, BridgeError>
where
    S: Storage,
    C: SourceChainClient + ?Sized,
    M: MintAuthority + ?Sized,
{
    let request = DepositRequest::ByEvent {
        deposit_index,
        range: BlockRange::new(from_block, to_block)?,
    };
    let prepared = prepare_deposit(&*store, creator, request)?;
    processor.process_prepared(store, prepared).await
}
