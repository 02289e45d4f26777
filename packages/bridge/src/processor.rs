//! Bridge deposit processor: the deposit state transition.
//!
//! ```text
//! Received -> Fetched -> Decoded -> Validated -> CheckedForDuplicate -> Minted -> MarkedProcessed
//!     \__________\__________\___________\_______________\__________> Rejected (no side effects)
//! ```
//!
//! Fetching is the only step that leaves the process. It runs before anything touches
//! storage and is bounded by a timeout; a timeout is a `SourceUnavailable` rejection.
//! Minting, transferring and marking run inside one storage transaction, so either all
//! of them are committed or none is.

use std::future::Future;
use std::time::Duration;

use cosmwasm_std::{to_json_binary, Coin, Event, Response, Storage};
use tracing::{debug, info, warn};

use crate::abi::{decode_event_data, decode_recipient_from_calldata};
use crate::address_codec::{normalize_recipient, validate_signer};
use crate::bank::MintAuthority;
use crate::error::BridgeError;
use crate::hash::{deposited_event_topic, deterministic_identifier, tx_hash_identifier};
use crate::ledger;
use crate::msg::ProcessDepositResponse;
use crate::source::{BlockRange, DepositEventLog, DepositRecord, SourceChainClient};
use crate::state::{Config, CONFIG, LAST_ETH_BLOCK_HEIGHT};
use crate::transaction::transactional;

/// Default bound on a single source-chain call
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Type of the event emitted for every minted deposit
pub const DEPOSIT_PROCESSED_EVENT: &str = "bridge_deposit_processed";

/// How a deposit is referenced by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositRequest {
    /// Look up `deposits(index)`; identifier derived from contract + index
    ByIndex {
        deposit_index: u64,
        eth_block_height: Option<u64>,
    },
    /// Locate the `Deposited` log in `range`; identifier is the tx hash
    ByEvent {
        deposit_index: u64,
        range: BlockRange,
    },
}

impl DepositRequest {
    pub fn deposit_index(&self) -> u64 {
        match self {
            DepositRequest::ByIndex { deposit_index, .. }
            | DepositRequest::ByEvent { deposit_index, .. } => *deposit_index,
        }
    }
}

/// A deposit request checked against the ledger state and ready to be fetched.
///
/// Preparing only reads storage, so a host can prepare under a short lock, fetch
/// without holding it, and take the lock again for [`PreparedDeposit::apply`].
#[derive(Debug, Clone)]
pub struct PreparedDeposit {
    pub creator: String,
    pub request: DepositRequest,
    pub config: Config,
    /// `LastEthBlockHeight` at preparation time
    pub pinned_height: u64,
}

/// Validate the signer and capture the config and pinned height for `request`.
pub fn prepare_deposit(
    store: &dyn Storage,
    creator: String,
    request: DepositRequest,
) -> Result<PreparedDeposit, BridgeError> {
    let config = CONFIG.load(store)?;
    validate_signer(&creator, &config.address_prefix)?;
    let pinned_height = LAST_ETH_BLOCK_HEIGHT.may_load(store)?.unwrap_or(0);

    info!(creator = %creator, ?request, pinned_height, "Processing deposit");
    Ok(PreparedDeposit {
        creator,
        request,
        config,
        pinned_height,
    })
}

impl PreparedDeposit {
    /// Mint a record fetched for this request. Runs the same checks as any other
    /// transition, so a deposit minted while this one was being fetched is rejected.
    pub fn apply<M>(
        self,
        store: &mut dyn Storage,
        mint: &M,
        record: DepositRecord,
    ) -> Result<Response, BridgeError>
    where
        M: MintAuthority + ?Sized,
    {
        let response = apply_deposit(store, mint, &self.config, record)?;
        Ok(response.add_attribute("creator", self.creator))
    }
}

pub struct BridgeDepositProcessor<'a, C: ?Sized, M: ?Sized> {
    source: &'a C,
    mint: &'a M,
    timeout: Duration,
}

impl<'a, C, M> BridgeDepositProcessor<'a, C, M>
where
    C: SourceChainClient + ?Sized,
    M: MintAuthority + ?Sized,
{
    pub fn new(source: &'a C, mint: &'a M) -> Self {
        Self {
            source,
            mint,
            timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch the deposit of a prepared request. Does not touch storage.
    pub async fn fetch_prepared(
        &self,
        prepared: &PreparedDeposit,
    ) -> Result<DepositRecord, BridgeError> {
        self.fetch(&prepared.config, prepared.pinned_height, &prepared.request)
            .await
    }

    /// Run one deposit transition against `store`.
    ///
    /// On any error the store is left exactly as it was.
    pub async fn process_prepared<S: Storage>(
        &self,
        store: &mut S,
        prepared: PreparedDeposit,
    ) -> Result<Response, BridgeError> {
        let record = self.fetch_prepared(&prepared).await?;
        prepared.apply(store, self.mint, record)
    }

    /// Fetch and decode the referenced deposit. Does not touch storage.
    pub async fn fetch(
        &self,
        config: &Config,
        pinned_height: u64,
        request: &DepositRequest,
    ) -> Result<DepositRecord, BridgeError> {
        let fetched = match request {
            DepositRequest::ByIndex {
                deposit_index,
                eth_block_height,
            } => {
                self.fetch_by_index(config, *deposit_index, *eth_block_height, pinned_height)
                    .await
            }
            DepositRequest::ByEvent {
                deposit_index,
                range,
            } => self.fetch_by_event(config, *deposit_index, *range).await,
        };
        if let Err(e) = &fetched {
            warn!(deposit_index = request.deposit_index(), error = %e, "Deposit fetch failed");
        }
        fetched
    }

    async fn bounded<T, F>(&self, call: &str, fut: F) -> Result<T, BridgeError>
    where
        F: Future<Output = Result<T, BridgeError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                BridgeError::source_unavailable(format!(
                    "{} timed out after {}ms",
                    call,
                    self.timeout.as_millis()
                ))
            })?
    }

    async fn fetch_by_index(
        &self,
        config: &Config,
        deposit_index: u64,
        requested_height: Option<u64>,
        pinned_height: u64,
    ) -> Result<DepositRecord, BridgeError> {
        let height = match requested_height
            .filter(|h| *h > 0)
            .or((pinned_height > 0).then_some(pinned_height))
        {
            Some(height) => height,
            None => self.bounded("eth_blockNumber", self.source.latest_block()).await?,
        };

        let deposit = self
            .bounded(
                "deposits(uint256)",
                self.source
                    .deposit_by_index(&config.deposit_contract, deposit_index, height),
            )
            .await?;

        if deposit.account.is_empty() {
            return Err(BridgeError::NotFound {
                what: format!(
                    "deposit index {} in contract {} at block {}",
                    deposit_index, config.deposit_contract, height
                ),
            });
        }

        let source_identifier = deterministic_identifier(&config.deposit_contract, deposit_index);
        debug!(
            deposit_index,
            eth_block_height = height,
            identifier = %source_identifier,
            "Deposit fetched by index"
        );

        Ok(DepositRecord {
            deposit_index,
            recipient: deposit.account,
            amount: deposit.amount,
            source_identifier,
            eth_block_height: height,
        })
    }

    async fn fetch_by_event(
        &self,
        config: &Config,
        deposit_index: u64,
        range: BlockRange,
    ) -> Result<DepositRecord, BridgeError> {
        let logs = self
            .bounded(
                "eth_getLogs",
                self.source.event_and_calldata(
                    deposited_event_topic(),
                    &config.deposit_contract,
                    range,
                ),
            )
            .await?;

        let (log, amount) = select_deposit_log(logs, deposit_index)?.ok_or_else(|| {
            BridgeError::NotFound {
                what: format!(
                    "Deposited log for index {} in blocks {}..={}",
                    deposit_index, range.from_block, range.to_block
                ),
            }
        })?;

        let sent_to_contract = log
            .tx_to
            .as_deref()
            .is_some_and(|to| to.eq_ignore_ascii_case(&config.deposit_contract));
        if !sent_to_contract {
            return Err(BridgeError::invalid_deposit(format!(
                "transaction {} was not sent to deposit contract {} (got {})",
                tx_hash_identifier(&log.tx_hash),
                config.deposit_contract,
                log.tx_to.as_deref().unwrap_or("contract creation")
            )));
        }

        let recipient = decode_recipient_from_calldata(&log.calldata)?;
        let source_identifier = tx_hash_identifier(&log.tx_hash);
        debug!(
            deposit_index,
            block = log.block_number,
            identifier = %source_identifier,
            "Deposit fetched by event"
        );

        Ok(DepositRecord {
            deposit_index,
            recipient,
            amount,
            source_identifier,
            eth_block_height: log.block_number,
        })
    }
}

/// Pick the log whose event data carries `deposit_index`, in (block, log index) order.
///
/// Logs that fail to decode are skipped while searching; if nothing matches and at
/// least one log was malformed, that decode error is returned instead of `None`.
fn select_deposit_log(
    mut logs: Vec<DepositEventLog>,
    deposit_index: u64,
) -> Result<Option<(DepositEventLog, u64)>, BridgeError> {
    logs.sort_by_key(|log| (log.block_number, log.log_index));

    let mut first_error = None;
    for log in logs {
        match decode_event_data(&log.data) {
            Ok((amount, index)) if index == deposit_index => return Ok(Some((log, amount))),
            Ok(_) => {}
            Err(e) => {
                warn!(
                    tx_hash = %tx_hash_identifier(&log.tx_hash),
                    log_index = log.log_index,
                    error = %e,
                    "Skipping undecodable deposit log"
                );
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

/// Validate, duplicate-check, mint and mark a fetched deposit.
///
/// Deterministic: given the same store and record every replica reaches the same result.
pub fn apply_deposit<M>(
    store: &mut dyn Storage,
    mint: &M,
    config: &Config,
    record: DepositRecord,
) -> Result<Response, BridgeError>
where
    M: MintAuthority + ?Sized,
{
    // Validate
    if record.amount == 0 {
        return Err(BridgeError::invalid_deposit(format!(
            "deposit index {} has zero amount",
            record.deposit_index
        )));
    }
    let recipient = normalize_recipient(&record.recipient, &config.address_prefix)?;
    if recipient != record.recipient {
        info!(
            original = %record.recipient,
            normalized = %recipient,
            "Converted hex recipient to bech32"
        );
    }

    // Duplicate check
    if ledger::has(store, &record.source_identifier) {
        warn!(identifier = %record.source_identifier, "Deposit already processed");
        return Err(BridgeError::AlreadyProcessed {
            identifier: record.source_identifier,
        });
    }
    if let Some(height) = ledger::deposit_index_height(store, record.deposit_index)? {
        warn!(
            deposit_index = record.deposit_index,
            processed_at = height,
            "Deposit index already processed"
        );
        return Err(BridgeError::AlreadyProcessed {
            identifier: format!("deposit index {}", record.deposit_index),
        });
    }

    // Mint, transfer and mark as one unit
    let coin = Coin::new(u128::from(record.amount), config.denom.clone());
    transactional(store, |tx| {
        mint.mint(tx, &config.module_account, &coin)?;
        mint.transfer(tx, &config.module_account, &recipient, &coin)?;
        ledger::mark_processed(tx, &record.source_identifier)?;
        ledger::mark_index_processed(tx, record.deposit_index, record.eth_block_height)
    })?;

    info!(
        identifier = %record.source_identifier,
        recipient = %recipient,
        amount = %coin,
        deposit_index = record.deposit_index,
        eth_block_height = record.eth_block_height,
        "Deposit processed"
    );

    let data = ProcessDepositResponse {
        recipient: recipient.clone(),
        amount: coin.clone(),
        deposit_index: record.deposit_index,
        eth_block_height: record.eth_block_height,
        source_identifier: record.source_identifier.clone(),
    };

    Ok(Response::new()
        .add_event(
            Event::new(DEPOSIT_PROCESSED_EVENT)
                .add_attribute("source_identifier", record.source_identifier)
                .add_attribute("recipient", recipient)
                .add_attribute("amount", coin.to_string())
                .add_attribute("deposit_index", record.deposit_index.to_string())
                .add_attribute("eth_block_height", record.eth_block_height.to_string()),
        )
        .add_attribute("method", "process_deposit")
        .set_data(to_json_binary(&data)?))
}

/// Whether `identifier` has already been minted.
pub fn is_processed(store: &dyn Storage, identifier: &str) -> bool {
    ledger::has(store, identifier)
}
