//! Mock Source Chain

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::abi::{encode_deposit_calldata, encode_event_data};
use crate::error::BridgeError;
use crate::hash::{deposited_event_topic, keccak256};
use crate::source::{BlockRange, DepositEventLog, DepositLog, OnChainDeposit, SourceChainClient};

/// Function used by depositors on the source contract
pub const DEPOSIT_UNDERLYING_SIGNATURE: &str = "depositUnderlying(uint256,string)";

#[derive(Debug, Clone)]
struct StoredDeposit {
    contract: String,
    deposit: OnChainDeposit,
    /// First block at which `deposits(index)` returns the record
    visible_from: u64,
}

#[derive(Debug, Clone)]
struct StoredLog {
    contract: String,
    topic: [u8; 32],
    log: DepositEventLog,
}

#[derive(Debug, Default)]
struct Inner {
    latest_block: u64,
    deposits: BTreeMap<u64, StoredDeposit>,
    logs: Vec<StoredLog>,
    failure: Option<String>,
    log_failure: Option<String>,
    transactions_missing: bool,
    delay: Option<Duration>,
    queried_blocks: Vec<u64>,
}

/// In-memory [`SourceChainClient`].
///
/// Unknown indices answer with an empty account, like an unset mapping slot.
#[derive(Debug, Default)]
pub struct MockSourceChain {
    inner: Mutex<Inner>,
    calls: AtomicUsize,
}

impl MockSourceChain {
    pub fn new(latest_block: u64) -> Self {
        let source = Self::default();
        source.set_latest_block(latest_block);
        source
    }

    pub fn set_latest_block(&self, block: u64) {
        self.inner().latest_block = block;
    }

    /// Store a deposit visible from block 0.
    pub fn add_deposit(&self, contract: &str, deposit_index: u64, account: &str, amount: u64) {
        self.add_deposit_at(contract, deposit_index, account, amount, 0);
    }

    /// Store a deposit that only exists from `visible_from` onwards.
    pub fn add_deposit_at(
        &self,
        contract: &str,
        deposit_index: u64,
        account: &str,
        amount: u64,
        visible_from: u64,
    ) {
        self.inner().deposits.insert(
            deposit_index,
            StoredDeposit {
                contract: contract.to_string(),
                deposit: OnChainDeposit {
                    account: account.to_string(),
                    amount,
                },
                visible_from,
            },
        );
    }

    /// Store a `Deposited` log emitted by `contract`.
    pub fn add_log(&self, contract: &str, log: DepositEventLog) {
        self.add_log_with_topic(contract, deposited_event_topic(), log);
    }

    pub fn add_log_with_topic(&self, contract: &str, topic: [u8; 32], log: DepositEventLog) {
        self.inner().logs.push(StoredLog {
            contract: contract.to_string(),
            topic,
            log,
        });
    }

    /// Make every call fail with `SourceUnavailable(reason)`.
    pub fn fail_with(&self, reason: &str) {
        self.inner().failure = Some(reason.to_string());
    }

    /// Make only log queries fail with `SourceUnavailable(reason)`.
    pub fn fail_logs_with(&self, reason: &str) {
        self.inner().log_failure = Some(reason.to_string());
    }

    /// Answer transaction lookups as if the provider had not seen the transactions.
    pub fn hide_transactions(&self) {
        self.inner().transactions_missing = true;
    }

    pub fn recover(&self) {
        let mut inner = self.inner();
        inner.failure = None;
        inner.log_failure = None;
        inner.transactions_missing = false;
    }

    /// Delay every reply by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.inner().delay = Some(delay);
    }

    /// Number of calls made through the trait.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Block heights passed to `deposit_by_index`, in call order.
    pub fn queried_blocks(&self) -> Vec<u64> {
        self.inner().queried_blocks.clone()
    }

    fn matching_logs(
        &self,
        topic: [u8; 32],
        contract: &str,
        range: BlockRange,
    ) -> Vec<DepositEventLog> {
        self.inner()
            .logs
            .iter()
            .filter(|stored| {
                stored.topic == topic
                    && stored.contract.eq_ignore_ascii_case(contract)
                    && (range.from_block..=range.to_block).contains(&stored.log.block_number)
            })
            .map(|stored| stored.log.clone())
            .collect()
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Count the call, apply the configured delay and failure.
    async fn enter(&self) -> Result<(), BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, failure) = {
            let inner = self.inner();
            (inner.delay, inner.failure.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(reason) => Err(BridgeError::SourceUnavailable { reason }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SourceChainClient for MockSourceChain {
    async fn latest_block(&self) -> Result<u64, BridgeError> {
        self.enter().await?;
        Ok(self.inner().latest_block)
    }

    async fn deposit_by_index(
        &self,
        contract: &str,
        deposit_index: u64,
        block: u64,
    ) -> Result<OnChainDeposit, BridgeError> {
        self.enter().await?;
        let mut inner = self.inner();
        inner.queried_blocks.push(block);
        if block > inner.latest_block {
            return Err(BridgeError::NotFound {
                what: format!("block {}", block),
            });
        }

        let found = inner.deposits.get(&deposit_index).filter(|stored| {
            stored.contract.eq_ignore_ascii_case(contract) && block >= stored.visible_from
        });
        Ok(match found {
            Some(stored) => stored.deposit.clone(),
            None => OnChainDeposit {
                account: String::new(),
                amount: 0,
            },
        })
    }

    async fn deposit_logs(
        &self,
        topic: [u8; 32],
        contract: &str,
        range: BlockRange,
    ) -> Result<Vec<DepositLog>, BridgeError> {
        self.enter().await?;
        if let Some(reason) = self.inner().log_failure.clone() {
            return Err(BridgeError::SourceUnavailable { reason });
        }
        Ok(self
            .matching_logs(topic, contract, range)
            .into_iter()
            .map(|log| DepositLog {
                tx_hash: log.tx_hash,
                block_number: log.block_number,
                log_index: log.log_index,
                data: log.data,
            })
            .collect())
    }

    async fn event_and_calldata(
        &self,
        topic: [u8; 32],
        contract: &str,
        range: BlockRange,
    ) -> Result<Vec<DepositEventLog>, BridgeError> {
        self.enter().await?;
        let (log_failure, transactions_missing) = {
            let inner = self.inner();
            (inner.log_failure.clone(), inner.transactions_missing)
        };
        if let Some(reason) = log_failure {
            return Err(BridgeError::SourceUnavailable { reason });
        }

        let logs = self.matching_logs(topic, contract, range);
        if logs.is_empty() {
            return Err(BridgeError::NotFound {
                what: format!(
                    "logs of {} in blocks {}..={}",
                    contract, range.from_block, range.to_block
                ),
            });
        }
        if transactions_missing {
            return Err(BridgeError::NotFound {
                what: format!("transaction 0x{}", hex::encode(logs[0].tx_hash)),
            });
        }
        Ok(logs)
    }
}

/// A well-formed `Deposited` log sent to `contract` through `depositUnderlying`.
pub fn deposit_log(
    contract: &str,
    tx_hash: [u8; 32],
    block_number: u64,
    deposit_index: u64,
    amount: u64,
    recipient: &str,
) -> DepositEventLog {
    let hash = keccak256(DEPOSIT_UNDERLYING_SIGNATURE.as_bytes());
    let selector = [hash[0], hash[1], hash[2], hash[3]];
    DepositEventLog {
        tx_hash,
        block_number,
        log_index: 0,
        data: encode_event_data(amount, deposit_index),
        tx_to: Some(contract.to_string()),
        calldata: encode_deposit_calldata(selector, amount, recipient),
    }
}
