//! Source-chain client over EVM JSON-RPC
//!
//! Implements [`SourceChainClient`] with a read-only alloy provider:
//! - `eth_blockNumber` for the latest block
//! - `eth_call` of `deposits(uint256)` at a fixed block
//! - `eth_getLogs` filtered by contract and topic, then `eth_getTransactionByHash`
//!   for the input and `to` of each emitting transaction
//!
//! Transport failures map to `SourceUnavailable`, undecodable replies to
//! `InvalidResponse`. The caller bounds every call with a timeout.

use std::str::FromStr;

use alloy::consensus::Transaction as _;
use alloy::eips::BlockId;
use alloy::primitives::{Address, Bytes, FixedBytes, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::sol;
use alloy::sol_types::SolCall;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use tracing::debug;

use bridge::abi::decode_deposit_tuple;
use bridge::error::BridgeError;
use bridge::source::{BlockRange, DepositEventLog, DepositLog, OnChainDeposit, SourceChainClient};

sol! {
    /// Source-chain deposit contract
    contract DepositContract {
        /// Stored deposit by index; unset indices return the zero tuple
        function deposits(uint256 index) external view returns (string account, uint256 amount);

        /// Lock `amount` for `recipient` on the B52 ledger
        function depositUnderlying(uint256 amount, string recipient) external;
    }
}

/// Read-only EVM client for the deposit contract
pub struct EvmSourceClient {
    provider: RootProvider<Http<Client>>,
}

impl EvmSourceClient {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider =
            ProviderBuilder::new().on_http(rpc_url.parse().wrap_err("Invalid RPC URL")?);
        Ok(Self { provider })
    }

    /// Raw `eth_getLogs` for `contract` and `topic` in `range`.
    pub async fn logs(
        &self,
        topic: [u8; 32],
        contract: &str,
        range: BlockRange,
    ) -> Result<Vec<Log>, BridgeError> {
        let filter = Filter::new()
            .address(parse_address(contract)?)
            .event_signature(FixedBytes::from(topic))
            .from_block(range.from_block)
            .to_block(range.to_block);

        self.provider.get_logs(&filter).await.map_err(|e| {
            BridgeError::SourceUnavailable {
                reason: format!(
                    "eth_getLogs {}..={} failed: {}",
                    range.from_block, range.to_block, e
                ),
            }
        })
    }

    /// Hash, position and data of a log. Fails on logs the provider has not mined yet.
    fn deposit_log(log: &Log) -> Result<DepositLog, BridgeError> {
        let tx_hash = log.transaction_hash.ok_or_else(|| BridgeError::InvalidResponse {
            reason: "log without transaction hash".to_string(),
        })?;
        let block_number = log.block_number.ok_or_else(|| BridgeError::InvalidResponse {
            reason: format!("log of {} without block number", tx_hash),
        })?;
        Ok(DepositLog {
            tx_hash: tx_hash.0,
            block_number,
            log_index: log.log_index.unwrap_or_default(),
            data: log.data().data.to_vec(),
        })
    }

    /// Attach the emitting transaction's `to` and input to a log.
    async fn with_transaction(&self, log: Log) -> Result<DepositEventLog, BridgeError> {
        let DepositLog {
            tx_hash,
            block_number,
            log_index,
            data,
        } = Self::deposit_log(&log)?;
        let tx_hash = FixedBytes::from(tx_hash);

        let tx = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await
            .map_err(|e| BridgeError::SourceUnavailable {
                reason: format!("eth_getTransactionByHash {} failed: {}", tx_hash, e),
            })?
            .ok_or_else(|| BridgeError::NotFound {
                what: format!("transaction {}", tx_hash),
            })?;

        Ok(DepositEventLog {
            tx_hash: tx_hash.0,
            block_number,
            log_index,
            data,
            tx_to: tx.to().map(|to| format!("{:#x}", to)),
            calldata: tx.input().to_vec(),
        })
    }
}

fn parse_address(value: &str) -> Result<Address, BridgeError> {
    Address::from_str(value).map_err(|e| BridgeError::InvalidRequest {
        reason: format!("invalid contract address {}: {}", value, e),
    })
}

#[async_trait]
impl SourceChainClient for EvmSourceClient {
    async fn latest_block(&self) -> Result<u64, BridgeError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| BridgeError::SourceUnavailable {
                reason: format!("eth_blockNumber failed: {}", e),
            })
    }

    async fn deposit_by_index(
        &self,
        contract: &str,
        deposit_index: u64,
        block: u64,
    ) -> Result<OnChainDeposit, BridgeError> {
        let call = DepositContract::depositsCall {
            index: U256::from(deposit_index),
        };
        let tx = TransactionRequest::default()
            .to(parse_address(contract)?)
            .input(Bytes::from(call.abi_encode()).into());

        let output = self
            .provider
            .call(&tx)
            .block(BlockId::number(block))
            .await
            .map_err(|e| BridgeError::SourceUnavailable {
                reason: format!("deposits({}) at block {} failed: {}", deposit_index, block, e),
            })?;

        let (account, amount) = decode_deposit_tuple(&output)?;
        debug!(deposit_index, block, account = %account, amount, "Read deposit");
        Ok(OnChainDeposit { account, amount })
    }

    async fn deposit_logs(
        &self,
        topic: [u8; 32],
        contract: &str,
        range: BlockRange,
    ) -> Result<Vec<DepositLog>, BridgeError> {
        self.logs(topic, contract, range)
            .await?
            .iter()
            .map(Self::deposit_log)
            .collect()
    }

    async fn event_and_calldata(
        &self,
        topic: [u8; 32],
        contract: &str,
        range: BlockRange,
    ) -> Result<Vec<DepositEventLog>, BridgeError> {
        let logs = self.logs(topic, contract, range).await?;
        if logs.is_empty() {
            return Err(BridgeError::NotFound {
                what: format!(
                    "logs of {} in blocks {}..={}",
                    contract, range.from_block, range.to_block
                ),
            });
        }

        let mut out = Vec::with_capacity(logs.len());
        for log in logs {
            out.push(self.with_transaction(log).await?);
        }
        Ok(out)
    }
}
