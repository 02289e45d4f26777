//! Processed-deposit ledger: the append-only set of source identifiers already minted.
//!
//! Entries are created once, at the end of a successful deposit transition, and are
//! never updated or removed.

use cosmwasm_std::{Empty, Order, StdResult, Storage};
use cw_storage_plus::Bound;

use crate::error::BridgeError;
use crate::state::{PROCESSED_DEPOSITS, PROCESSED_DEPOSIT_INDICES};

/// Whether `identifier` has already been minted.
pub fn has(store: &dyn Storage, identifier: &str) -> bool {
    PROCESSED_DEPOSITS.has(store, identifier)
}

/// Record `identifier` as minted. Fails if it is already present.
pub fn mark_processed(store: &mut dyn Storage, identifier: &str) -> Result<(), BridgeError> {
    if has(store, identifier) {
        return Err(BridgeError::AlreadyProcessed {
            identifier: identifier.to_string(),
        });
    }
    PROCESSED_DEPOSITS.save(store, identifier, &Empty {})?;
    Ok(())
}

/// Source block height a deposit index was processed at, if it was processed.
pub fn deposit_index_height(store: &dyn Storage, deposit_index: u64) -> StdResult<Option<u64>> {
    PROCESSED_DEPOSIT_INDICES.may_load(store, deposit_index)
}

/// Record a processed deposit index. Fails if the index is already present.
pub fn mark_index_processed(
    store: &mut dyn Storage,
    deposit_index: u64,
    eth_block_height: u64,
) -> Result<(), BridgeError> {
    if PROCESSED_DEPOSIT_INDICES.has(store, deposit_index) {
        return Err(BridgeError::AlreadyProcessed {
            identifier: format!("deposit index {}", deposit_index),
        });
    }
    PROCESSED_DEPOSIT_INDICES.save(store, deposit_index, &eth_block_height)?;
    Ok(())
}

/// Page through processed identifiers in ascending order.
pub fn processed_identifiers(
    store: &dyn Storage,
    start_after: Option<&str>,
    limit: usize,
) -> StdResult<Vec<String>> {
    let start = start_after.map(Bound::exclusive);
    PROCESSED_DEPOSITS
        .keys(store, start, None, Order::Ascending)
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::MemoryStorage;

    #[test]
    fn test_mark_then_has() {
        let mut store = MemoryStorage::new();
        assert!(!has(&store, "0xabc"));
        mark_processed(&mut store, "0xabc").unwrap();
        assert!(has(&store, "0xabc"));
        assert!(!has(&store, "0xabd"));
    }

    #[test]
    fn test_mark_twice_fails() {
        let mut store = MemoryStorage::new();
        mark_processed(&mut store, "0xabc").unwrap();
        let err = mark_processed(&mut store, "0xabc").unwrap_err();
        assert_eq!(
            err,
            BridgeError::AlreadyProcessed {
                identifier: "0xabc".to_string()
            }
        );
    }

    #[test]
    fn test_index_tracking() {
        let mut store = MemoryStorage::new();
        assert_eq!(deposit_index_height(&store, 3).unwrap(), None);
        mark_index_processed(&mut store, 3, 1_200).unwrap();
        assert_eq!(deposit_index_height(&store, 3).unwrap(), Some(1_200));
        assert!(mark_index_processed(&mut store, 3, 1_300).is_err());
        assert_eq!(deposit_index_height(&store, 3).unwrap(), Some(1_200));
    }

    #[test]
    fn test_processed_identifiers_pagination() {
        let mut store = MemoryStorage::new();
        for id in ["0x03", "0x01", "0x02", "0x04"] {
            mark_processed(&mut store, id).unwrap();
        }
        assert_eq!(
            processed_identifiers(&store, None, 2).unwrap(),
            vec!["0x01", "0x02"]
        );
        assert_eq!(
            processed_identifiers(&store, Some("0x02"), 10).unwrap(),
            vec!["0x03", "0x04"]
        );
        assert!(processed_identifiers(&store, Some("0x04"), 10)
            .unwrap()
            .is_empty());
    }
}
