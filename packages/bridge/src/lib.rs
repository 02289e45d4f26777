//! B52 Bridge - Verified, Exactly-Once Minting of Source-Chain Deposits
//!
//! A deposit made into the source-chain (EVM) deposit contract is minted as a
//! balance on the B52 ledger once and only once.
//!
//! # Deposit Flow
//! 1. A user calls `depositUnderlying(amount, recipient)` on the source contract
//! 2. A relayer (or anyone) submits `ProcessDeposit` / `ProcessDepositEvent`
//! 3. The processor reads the deposit from the source chain through [`SourceChainClient`]
//! 4. The recipient is validated and normalized to bech32
//! 5. The amount is minted to the module account and sent to the recipient,
//!    and the source identifier is recorded, in one storage transaction
//!
//! # Guarantees
//! - A source identifier is minted at most once; a deposit index at most once
//! - A rejected deposit leaves the store untouched
//! - Source-chain reads are bounded by a timeout and never happen during queries

pub mod abi;
pub mod address_codec;
pub mod bank;
pub mod contract;
pub mod error;
mod execute;
pub mod hash;
pub mod ledger;
pub mod msg;
pub mod processor;
mod query;
pub mod source;
pub mod state;
pub mod transaction;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::bank::{BankKeeper, MintAuthority};
pub use crate::error::BridgeError;
pub use crate::hash::{deterministic_identifier, keccak256};
pub use crate::processor::{BridgeDepositProcessor, DepositRequest};
pub use crate::source::{
    BlockRange, DepositEventLog, DepositLog, DepositRecord, OnChainDeposit, SourceChainClient,
};
