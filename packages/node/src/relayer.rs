//! Deposit relayer
//!
//! Polls `Deposited` logs of the deposit contract and submits `ProcessDeposit` for
//! every deposit index the node has not minted yet.
//!
//! # Polling
//!
//! 1. Retry deposits whose submission failed on an earlier poll
//! 2. Scan `next_block..=latest` in windows of at most `max_block_range` blocks
//! 3. For each decoded index: skip if seen recently or already processed on the
//!    node, otherwise submit it pinned to the block its log was emitted in
//!
//! A window whose log query fails is scanned again on the next poll.
//!
//! # Failures
//!
//! A submission the node rejects for good (invalid deposit, malformed data) is
//! dropped at once. Transient failures (node or source chain unreachable, source
//! lagging) are retried on later polls, at most [`MAX_SUBMIT_ATTEMPTS`] times.
//! Dropped deposit indices are kept in [`DepositRelayer::dead_letters`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{eyre, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use bridge::abi::decode_event_data;
use bridge::hash::{deposited_event_topic, tx_hash_identifier};
use bridge::msg::ProcessDepositResponse;
use bridge::source::{BlockRange, SourceChainClient};

use crate::bounded_cache::BoundedCache;
use crate::client::{NodeClient, NodeError};
use crate::config::RelayerConfig;

/// Blocks scanned behind the tip when no start block is configured
const DEFAULT_LOOKBACK_BLOCKS: u64 = 10;

/// Submission attempts of one deposit before it is dropped
pub const MAX_SUBMIT_ATTEMPTS: u32 = 10;

/// Deposit indices remembered as handled
const SEEN_CACHE_SIZE: usize = 10_000;
const SEEN_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of one submission
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Minted(ProcessDepositResponse),
    AlreadyProcessed,
}

/// How a failed submission is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Node or source chain unavailable; retry on a later poll
    Transient,
    /// Rejected by the ledger; resubmitting cannot succeed
    Permanent,
}

/// Classify a submission error. Transport errors are transient.
pub fn classify_error(err: &eyre::Report) -> ErrorClass {
    match err.downcast_ref::<NodeError>() {
        Some(node_err) if !node_err.is_retryable() => ErrorClass::Permanent,
        _ => ErrorClass::Transient,
    }
}

/// Where the relayer sends deposits
#[async_trait]
pub trait DepositSubmitter: Send + Sync {
    /// Whether the ledger has already minted `deposit_index`.
    async fn is_index_processed(&self, deposit_index: u64) -> Result<bool>;

    /// Submit `ProcessDeposit` for `deposit_index` read at `eth_block_height`.
    async fn submit(&self, deposit_index: u64, eth_block_height: u64) -> Result<SubmitOutcome>;
}

/// Submits deposits to a running node over HTTP
pub struct NodeSubmitter {
    client: NodeClient,
    creator: String,
}

impl NodeSubmitter {
    pub fn new(client: NodeClient, creator: String) -> Self {
        Self { client, creator }
    }
}

#[async_trait]
impl DepositSubmitter for NodeSubmitter {
    async fn is_index_processed(&self, deposit_index: u64) -> Result<bool> {
        Ok(self.client.deposit_status(deposit_index).await?.processed)
    }

    async fn submit(&self, deposit_index: u64, eth_block_height: u64) -> Result<SubmitOutcome> {
        match self
            .client
            .process_deposit(&self.creator, deposit_index, Some(eth_block_height))
            .await
        {
            Ok(res) => Ok(SubmitOutcome::Minted(res)),
            Err(e) => match e.downcast_ref::<NodeError>() {
                Some(node_err) if node_err.is_already_processed() => {
                    Ok(SubmitOutcome::AlreadyProcessed)
                }
                _ => Err(e),
            },
        }
    }
}

/// Counts from one poll
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub submitted: usize,
    pub skipped: usize,
    /// Failed, will be retried
    pub failed: usize,
    /// Failed, given up
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy)]
struct PendingDeposit {
    eth_block_height: u64,
    attempts: u32,
}

pub struct DepositRelayer<C: ?Sized, S> {
    source: Arc<C>,
    submitter: S,
    contract: String,
    config: RelayerConfig,
    /// Next block to scan; 0 until resolved on the first poll
    next_block: u64,
    seen: BoundedCache<u64>,
    /// Failed submissions by deposit index
    pending: BTreeMap<u64, PendingDeposit>,
    dead_letters: Vec<u64>,
}

impl<C, S> DepositRelayer<C, S>
where
    C: SourceChainClient + ?Sized,
    S: DepositSubmitter,
{
    pub fn new(source: Arc<C>, submitter: S, contract: String, config: RelayerConfig) -> Self {
        Self {
            source,
            submitter,
            contract,
            next_block: config.start_block,
            config,
            seen: BoundedCache::new(SEEN_CACHE_SIZE, SEEN_CACHE_TTL),
            pending: BTreeMap::new(),
            dead_letters: Vec::new(),
        }
    }

    /// Next block the relayer will scan.
    pub fn next_block(&self) -> u64 {
        self.next_block
    }

    /// Deposit indices waiting for a retry.
    pub fn pending(&self) -> Vec<u64> {
        self.pending.keys().copied().collect()
    }

    /// Deposit indices given up on, in the order they were dropped.
    pub fn dead_letters(&self) -> &[u64] {
        &self.dead_letters
    }

    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!(
            contract = %self.contract,
            poll_interval_secs = self.config.poll_interval_secs,
            max_block_range = self.config.max_block_range,
            "Deposit relayer starting"
        );

        let poll_interval = Duration::from_secs(self.config.poll_interval_secs.max(1));

        loop {
            match self.poll_once().await {
                Ok(summary) if summary != PollSummary::default() => {
                    info!(
                        submitted = summary.submitted,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        dropped = summary.dropped,
                        next_block = self.next_block,
                        "Poll complete"
                    );
                }
                Ok(_) => debug!(next_block = self.next_block, "Poll complete, nothing new"),
                Err(e) => error!(error = %e, "Error polling deposits"),
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        Ok(())
    }

    /// Retry failed deposits, then scan new blocks.
    pub async fn poll_once(&mut self) -> Result<PollSummary> {
        let mut summary = PollSummary::default();

        let latest = self
            .source
            .latest_block()
            .await
            .map_err(|e| eyre!("Failed to get latest block: {}", e))?;

        if self.next_block == 0 {
            self.next_block = latest.saturating_sub(DEFAULT_LOOKBACK_BLOCKS);
            info!(start_block = self.next_block, latest, "Relayer start block resolved");
        }

        let retries: Vec<(u64, u64)> = self
            .pending
            .iter()
            .map(|(index, pending)| (*index, pending.eth_block_height))
            .collect();
        for (deposit_index, block) in retries {
            self.handle_deposit(deposit_index, block, &mut summary).await;
        }

        if self.next_block > latest {
            return Ok(summary);
        }

        let range = BlockRange::new(self.next_block, latest)?;
        for window in range.chunks(self.config.max_block_range) {
            let logs = self
                .source
                .deposit_logs(deposited_event_topic(), &self.contract, window)
                .await
                .map_err(|e| {
                    eyre!(
                        "Failed to get logs {}..={}: {}",
                        window.from_block,
                        window.to_block,
                        e
                    )
                })?;

            for log in logs {
                match decode_event_data(&log.data) {
                    Ok((_, deposit_index)) => {
                        self.handle_deposit(deposit_index, log.block_number, &mut summary)
                            .await
                    }
                    Err(e) => warn!(
                        tx_hash = %tx_hash_identifier(&log.tx_hash),
                        error = %e,
                        "Skipping undecodable deposit log"
                    ),
                }
            }

            self.next_block = window.to_block + 1;
        }

        Ok(summary)
    }

    async fn handle_deposit(
        &mut self,
        deposit_index: u64,
        eth_block_height: u64,
        summary: &mut PollSummary,
    ) {
        if self.seen.contains(&deposit_index) {
            summary.skipped += 1;
            return;
        }

        match self.submitter.is_index_processed(deposit_index).await {
            Ok(true) => {
                debug!(deposit_index, "Deposit already processed on node");
                self.mark_done(deposit_index);
                summary.skipped += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                self.record_failure(deposit_index, eth_block_height, &e, summary);
                return;
            }
        }

        match self.submitter.submit(deposit_index, eth_block_height).await {
            Ok(SubmitOutcome::Minted(res)) => {
                info!(
                    deposit_index,
                    recipient = %res.recipient,
                    amount = %res.amount,
                    identifier = %res.source_identifier,
                    "Deposit relayed"
                );
                self.mark_done(deposit_index);
                summary.submitted += 1;
            }
            Ok(SubmitOutcome::AlreadyProcessed) => {
                self.mark_done(deposit_index);
                summary.skipped += 1;
            }
            Err(e) => self.record_failure(deposit_index, eth_block_height, &e, summary),
        }
    }

    fn record_failure(
        &mut self,
        deposit_index: u64,
        eth_block_height: u64,
        err: &eyre::Report,
        summary: &mut PollSummary,
    ) {
        let attempts = self
            .pending
            .get(&deposit_index)
            .map_or(0, |pending| pending.attempts)
            + 1;

        match classify_error(err) {
            ErrorClass::Permanent => {
                warn!(deposit_index, error = %err, "Deposit rejected by the node, dropping it");
                self.drop_deposit(deposit_index);
                summary.dropped += 1;
            }
            ErrorClass::Transient if attempts >= MAX_SUBMIT_ATTEMPTS => {
                error!(deposit_index, attempts, error = %err, "Deposit keeps failing, dropping it");
                self.drop_deposit(deposit_index);
                summary.dropped += 1;
            }
            ErrorClass::Transient => {
                warn!(
                    deposit_index,
                    attempts,
                    error = %err,
                    "Deposit submission failed, will retry"
                );
                self.pending.insert(
                    deposit_index,
                    PendingDeposit {
                        eth_block_height,
                        attempts,
                    },
                );
                summary.failed += 1;
            }
        }
    }

    fn drop_deposit(&mut self, deposit_index: u64) {
        self.mark_done(deposit_index);
        self.dead_letters.push(deposit_index);
    }

    fn mark_done(&mut self, deposit_index: u64) {
        self.seen.insert(deposit_index);
        self.pending.remove(&deposit_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use bridge::testing::{deposit_log, MockSourceChain, TEST_DEPOSIT_CONTRACT};
    use cosmwasm_std::coin;

    const RECIPIENT: &str = "b52168ketml7jed9gl7t2quelfkktr0zuuescapgde";

    #[derive(Default)]
    struct RecordingSubmitter {
        processed: Mutex<Vec<u64>>,
        submitted: Mutex<Vec<(u64, u64)>>,
        fail_once: Mutex<Vec<u64>>,
        /// Always rejected by the ledger as invalid
        rejected: Mutex<Vec<u64>>,
        /// Always answered with "source unavailable"
        unavailable: Mutex<Vec<u64>>,
        submit_calls: Mutex<usize>,
    }

    #[async_trait]
    impl DepositSubmitter for RecordingSubmitter {
        async fn is_index_processed(&self, deposit_index: u64) -> Result<bool> {
            Ok(self.processed.lock().unwrap().contains(&deposit_index))
        }

        async fn submit(&self, deposit_index: u64, eth_block_height: u64) -> Result<SubmitOutcome> {
            *self.submit_calls.lock().unwrap() += 1;
            if self.rejected.lock().unwrap().contains(&deposit_index) {
                return Err(eyre::Report::new(NodeError {
                    status: 400,
                    code: 1102,
                    message: "Invalid deposit: zero amount".to_string(),
                }));
            }
            if self.unavailable.lock().unwrap().contains(&deposit_index) {
                return Err(eyre::Report::new(NodeError {
                    status: 503,
                    code: 1107,
                    message: "Source chain unavailable: timeout".to_string(),
                }));
            }
            let mut fail_once = self.fail_once.lock().unwrap();
            if let Some(pos) = fail_once.iter().position(|i| *i == deposit_index) {
                fail_once.remove(pos);
                return Err(eyre!("node unavailable"));
            }
            self.submitted
                .lock()
                .unwrap()
                .push((deposit_index, eth_block_height));
            self.processed.lock().unwrap().push(deposit_index);
            Ok(SubmitOutcome::Minted(ProcessDepositResponse {
                recipient: RECIPIENT.to_string(),
                amount: coin(1, "usdc"),
                deposit_index,
                eth_block_height,
                source_identifier: format!("id-{}", deposit_index),
            }))
        }
    }

    fn config(start_block: u64, max_block_range: u64) -> RelayerConfig {
        RelayerConfig {
            creator: Some(RECIPIENT.to_string()),
            start_block,
            poll_interval_secs: 60,
            max_block_range,
        }
    }

    fn add_deposit(source: &MockSourceChain, index: u64, block: u64) {
        source.add_log(
            TEST_DEPOSIT_CONTRACT,
            deposit_log(
                TEST_DEPOSIT_CONTRACT,
                [index as u8 + 1; 32],
                block,
                index,
                1,
                RECIPIENT,
            ),
        );
    }

    fn relayer(
        source: Arc<MockSourceChain>,
        config: RelayerConfig,
    ) -> DepositRelayer<MockSourceChain, RecordingSubmitter> {
        DepositRelayer::new(
            source,
            RecordingSubmitter::default(),
            TEST_DEPOSIT_CONTRACT.to_string(),
            config,
        )
    }

    #[tokio::test]
    async fn test_scans_in_windows_and_submits_new_deposits() {
        let source = Arc::new(MockSourceChain::new(2_500));
        add_deposit(&source, 0, 100);
        add_deposit(&source, 1, 1_200);
        add_deposit(&source, 2, 2_400);
        let mut relayer = relayer(source.clone(), config(1, 999));

        let summary = relayer.poll_once().await.unwrap();

        assert_eq!(summary.submitted, 3);
        assert_eq!(relayer.next_block(), 2_501);
        assert_eq!(
            *relayer.submitter.submitted.lock().unwrap(),
            vec![(0, 100), (1, 1_200), (2, 2_400)]
        );
    }

    #[tokio::test]
    async fn test_default_start_is_behind_tip() {
        let source = Arc::new(MockSourceChain::new(500));
        add_deposit(&source, 0, 485);
        add_deposit(&source, 1, 495);
        let mut relayer = relayer(source, config(0, 999));

        let summary = relayer.poll_once().await.unwrap();

        assert_eq!(summary.submitted, 1);
        assert_eq!(*relayer.submitter.submitted.lock().unwrap(), vec![(1, 495)]);
    }

    #[tokio::test]
    async fn test_skips_seen_and_processed() {
        let source = Arc::new(MockSourceChain::new(100));
        add_deposit(&source, 0, 10);
        add_deposit(&source, 1, 20);
        let mut relayer = relayer(source.clone(), config(1, 999));
        relayer.submitter.processed.lock().unwrap().push(0);

        let first = relayer.poll_once().await.unwrap();
        assert_eq!(first.submitted, 1);
        assert_eq!(first.skipped, 1);

        // Same logs again in a new window
        source.set_latest_block(150);
        add_deposit(&source, 1, 120);
        let second = relayer.poll_once().await.unwrap();
        assert_eq!(second.submitted, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(relayer.submitter.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_submission_is_retried() {
        let source = Arc::new(MockSourceChain::new(100));
        add_deposit(&source, 5, 50);
        let mut relayer = relayer(source, config(1, 999));
        relayer.submitter.fail_once.lock().unwrap().push(5);

        let first = relayer.poll_once().await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(relayer.pending(), vec![5]);

        let second = relayer.poll_once().await.unwrap();
        assert_eq!(second.submitted, 1);
        assert!(relayer.pending().is_empty());
        assert_eq!(*relayer.submitter.submitted.lock().unwrap(), vec![(5, 50)]);
    }

    #[tokio::test]
    async fn test_rejected_deposit_is_dropped_not_retried() {
        let source = Arc::new(MockSourceChain::new(100));
        add_deposit(&source, 7, 40);
        let mut relayer = relayer(source, config(1, 999));
        relayer.submitter.rejected.lock().unwrap().push(7);

        let first = relayer.poll_once().await.unwrap();
        assert_eq!(first.dropped, 1);
        assert_eq!(first.failed, 0);

        for _ in 0..20 {
            relayer.poll_once().await.unwrap();
        }
        assert_eq!(*relayer.submitter.submit_calls.lock().unwrap(), 1);
        assert!(relayer.pending().is_empty());
        assert_eq!(relayer.dead_letters(), &[7]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_capped() {
        let source = Arc::new(MockSourceChain::new(100));
        add_deposit(&source, 3, 40);
        let mut relayer = relayer(source, config(1, 999));
        relayer.submitter.unavailable.lock().unwrap().push(3);

        for _ in 0..MAX_SUBMIT_ATTEMPTS - 1 {
            let summary = relayer.poll_once().await.unwrap();
            assert_eq!(summary.failed, 1);
            assert_eq!(relayer.pending(), vec![3]);
        }

        let last = relayer.poll_once().await.unwrap();
        assert_eq!(last.dropped, 1);
        assert!(relayer.pending().is_empty());
        assert_eq!(relayer.dead_letters(), &[3]);

        relayer.poll_once().await.unwrap();
        assert_eq!(
            *relayer.submitter.submit_calls.lock().unwrap(),
            MAX_SUBMIT_ATTEMPTS as usize
        );
    }

    #[test]
    fn test_classify_error() {
        let node_err = |status: u16, code: u32| {
            eyre::Report::new(NodeError {
                status,
                code,
                message: String::new(),
            })
        };
        assert_eq!(classify_error(&node_err(400, 1102)), ErrorClass::Permanent);
        assert_eq!(classify_error(&node_err(400, 1111)), ErrorClass::Permanent);
        assert_eq!(classify_error(&node_err(503, 1107)), ErrorClass::Transient);
        assert_eq!(classify_error(&node_err(404, 1108)), ErrorClass::Transient);
        assert_eq!(
            classify_error(&eyre!("connection refused")),
            ErrorClass::Transient
        );
    }

    #[tokio::test]
    async fn test_missing_transactions_do_not_skip_window() {
        let source = Arc::new(MockSourceChain::new(100));
        add_deposit(&source, 4, 60);
        source.hide_transactions();
        let mut relayer = relayer(source, config(1, 999));

        let summary = relayer.poll_once().await.unwrap();

        assert_eq!(summary.submitted, 1);
        assert_eq!(*relayer.submitter.submitted.lock().unwrap(), vec![(4, 60)]);
        assert_eq!(relayer.next_block(), 101);
    }

    #[tokio::test]
    async fn test_log_query_failure_keeps_position() {
        let source = Arc::new(MockSourceChain::new(100));
        add_deposit(&source, 2, 30);
        let mut relayer = relayer(source.clone(), config(1, 999));
        source.fail_logs_with("eth_getLogs timed out");

        assert!(relayer.poll_once().await.is_err());
        assert_eq!(relayer.next_block(), 1);
        assert!(relayer.submitter.submitted.lock().unwrap().is_empty());

        source.recover();
        let summary = relayer.poll_once().await.unwrap();
        assert_eq!(summary.submitted, 1);
        assert_eq!(relayer.next_block(), 101);
    }

    #[tokio::test]
    async fn test_source_failure_keeps_position() {
        let source = Arc::new(MockSourceChain::new(100));
        let mut relayer = relayer(source.clone(), config(1, 999));
        source.fail_with("rate limited");

        assert!(relayer.poll_once().await.is_err());
        assert_eq!(relayer.next_block(), 1);

        source.recover();
        relayer.poll_once().await.unwrap();
        assert_eq!(relayer.next_block(), 101);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let source = Arc::new(MockSourceChain::new(100));
        let mut relayer = relayer(source, config(1, 999));
        let (tx, rx) = mpsc::channel(1);
        tx.send(()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), relayer.run(rx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(relayer.next_block(), 101);
    }
}
