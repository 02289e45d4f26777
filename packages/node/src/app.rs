//! In-process bridge ledger
//!
//! Owns the store and the bank behind one async mutex. A deposit takes the lock twice:
//! briefly to prepare the request, then again to apply the fetched record. The
//! source-chain fetch in between runs unlocked, so queries never wait on the RPC,
//! while the duplicate check and its mark still run as one locked step.

use std::sync::Arc;
use std::time::Duration;

use cosmwasm_std::{from_json, MemoryStorage, Response};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use bridge::bank::BankKeeper;
use bridge::contract;
use bridge::error::BridgeError;
use bridge::msg::{ExecuteMsg, InstantiateMsg, QueryMsg};
use bridge::processor::{prepare_deposit, BridgeDepositProcessor, DepositRequest};
use bridge::source::{BlockRange, SourceChainClient};

pub struct BridgeApp {
    store: Mutex<MemoryStorage>,
    bank: BankKeeper,
    source: Arc<dyn SourceChainClient>,
    rpc_timeout: Duration,
}

impl BridgeApp {
    /// Instantiate a fresh ledger.
    pub fn new(
        source: Arc<dyn SourceChainClient>,
        rpc_timeout: Duration,
        msg: InstantiateMsg,
    ) -> Result<Self, BridgeError> {
        let mut store = MemoryStorage::new();
        contract::instantiate(&mut store, msg)?;
        Ok(Self {
            store: Mutex::new(store),
            bank: BankKeeper::new(),
            source,
            rpc_timeout,
        })
    }

    /// Run one transition.
    pub async fn execute(&self, msg: ExecuteMsg) -> Result<Response, BridgeError> {
        let processor = BridgeDepositProcessor::new(self.source.as_ref(), &self.bank)
            .with_timeout(self.rpc_timeout);

        let (creator, request) = match msg {
            ExecuteMsg::ProcessDeposit {
                creator,
                deposit_index,
                eth_block_height,
            } => (
                creator,
                DepositRequest::ByIndex {
                    deposit_index,
                    eth_block_height,
                },
            ),
            ExecuteMsg::ProcessDepositEvent {
                creator,
                deposit_index,
                from_block,
                to_block,
            } => (
                creator,
                DepositRequest::ByEvent {
                    deposit_index,
                    range: BlockRange::new(from_block, to_block)?,
                },
            ),
            other => {
                let mut store = self.store.lock().await;
                return contract::execute(&mut *store, &processor, other).await;
            }
        };

        let prepared = {
            let store = self.store.lock().await;
            prepare_deposit(&*store, creator, request)?
        };
        let record = processor.fetch_prepared(&prepared).await?;

        let mut store = self.store.lock().await;
        prepared.apply(&mut *store, &self.bank, record)
    }

    /// Run a query and decode its response.
    pub async fn query<T: DeserializeOwned>(&self, msg: QueryMsg) -> Result<T, BridgeError> {
        let store = self.store.lock().await;
        let binary = contract::query(&*store, &self.bank, msg)?;
        Ok(from_json(&binary)?)
    }

    /// Source-chain reachability, bounded by the RPC timeout.
    pub async fn source_reachable(&self) -> bool {
        matches!(
            tokio::time::timeout(self.rpc_timeout, self.source.latest_block()).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge::msg::{BalanceResponse, IsTxProcessedResponse};
    use bridge::testing::{MockSourceChain, TEST_AUTHORITY, TEST_DEPOSIT_CONTRACT};
    use cosmwasm_std::Uint128;

    fn app(source: Arc<MockSourceChain>) -> BridgeApp {
        BridgeApp::new(
            source,
            Duration::from_secs(1),
            InstantiateMsg {
                authority: TEST_AUTHORITY.to_string(),
                deposit_contract: TEST_DEPOSIT_CONTRACT.to_string(),
                denom: None,
                module_account: None,
                address_prefix: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_mint_once() {
        let source = Arc::new(MockSourceChain::new(10));
        source.add_deposit(TEST_DEPOSIT_CONTRACT, 0, TEST_AUTHORITY, 10_000);
        let app = Arc::new(app(source));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let app = app.clone();
            handles.push(tokio::spawn(async move {
                app.execute(ExecuteMsg::ProcessDeposit {
                    creator: TEST_AUTHORITY.to_string(),
                    deposit_index: 0,
                    eth_block_height: None,
                })
                .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(matches!(e, BridgeError::AlreadyProcessed { .. })),
            }
        }
        assert_eq!(ok, 1);

        let balance: BalanceResponse = app
            .query(QueryMsg::Balance {
                address: TEST_AUTHORITY.to_string(),
                denom: None,
            })
            .await
            .unwrap();
        assert_eq!(balance.amount, Uint128::new(10_000));

        let processed: IsTxProcessedResponse = app
            .query(QueryMsg::IsTxProcessed {
                identifier: bridge::deterministic_identifier(TEST_DEPOSIT_CONTRACT, 0),
            })
            .await
            .unwrap();
        assert!(processed.processed);
    }

    #[tokio::test]
    async fn test_queries_do_not_wait_on_source_fetch() {
        let source = Arc::new(MockSourceChain::new(10));
        source.add_deposit(TEST_DEPOSIT_CONTRACT, 0, TEST_AUTHORITY, 10_000);
        source.set_delay(Duration::from_millis(500));
        let app = Arc::new(app(source));

        let deposit = {
            let app = app.clone();
            tokio::spawn(async move {
                app.execute(ExecuteMsg::ProcessDeposit {
                    creator: TEST_AUTHORITY.to_string(),
                    deposit_index: 0,
                    eth_block_height: Some(10),
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let processed: IsTxProcessedResponse = tokio::time::timeout(
            Duration::from_millis(200),
            app.query(QueryMsg::IsTxProcessed {
                identifier: bridge::deterministic_identifier(TEST_DEPOSIT_CONTRACT, 0),
            }),
        )
        .await
        .expect("query blocked behind the source fetch")
        .unwrap();
        assert!(!processed.processed);

        deposit.await.unwrap().unwrap();
        let processed: IsTxProcessedResponse = app
            .query(QueryMsg::IsTxProcessed {
                identifier: bridge::deterministic_identifier(TEST_DEPOSIT_CONTRACT, 0),
            })
            .await
            .unwrap();
        assert!(processed.processed);
    }

    #[tokio::test]
    async fn test_source_reachable() {
        let source = Arc::new(MockSourceChain::new(10));
        let app = app(source.clone());
        assert!(app.source_reachable().await);

        source.fail_with("down");
        assert!(!app.source_reachable().await);
    }
}
