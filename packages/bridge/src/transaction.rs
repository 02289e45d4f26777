//! Buffered storage transaction.
//!
//! Writes made through a [`StorageTransaction`] stay in memory until [`commit`]
//! is called; dropping the transaction discards them. Reads see the buffered writes
//! layered over the base store. This gives a deposit transition all-or-nothing
//! semantics over any `cosmwasm_std::Storage`.
//!
//! [`commit`]: StorageTransaction::commit

use std::collections::BTreeMap;
use std::ops::Bound;

use cosmwasm_std::{Order, Record, Storage};

/// Pending writes over a base store. `None` marks a removal.
pub struct StorageTransaction<'a, S: Storage + ?Sized> {
    base: &'a mut S,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, S: Storage + ?Sized> StorageTransaction<'a, S> {
    pub fn new(base: &'a mut S) -> Self {
        Self {
            base,
            pending: BTreeMap::new(),
        }
    }

    /// Number of buffered writes (sets and removals).
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Flush all buffered writes to the base store, in key order.
    pub fn commit(self) {
        for (key, value) in self.pending {
            match value {
                Some(value) => self.base.set(&key, &value),
                None => self.base.remove(&key),
            }
        }
    }
}

impl<S: Storage + ?Sized> Storage for StorageTransaction<'_, S> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.pending.get(key) {
            Some(value) => value.clone(),
            None => self.base.get(key),
        }
    }

    fn range<'b>(
        &'b self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> Box<dyn Iterator<Item = Record> + 'b> {
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Box::new(std::iter::empty());
            }
        }

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.range(start, end, Order::Ascending).collect();

        let lower = start.map_or(Bound::Unbounded, |s| Bound::Included(s.to_vec()));
        let upper = end.map_or(Bound::Unbounded, |e| Bound::Excluded(e.to_vec()));
        for (key, value) in self.pending.range((lower, upper)) {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        match order {
            Order::Ascending => Box::new(merged.into_iter()),
            Order::Descending => Box::new(merged.into_iter().rev()),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.pending.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn remove(&mut self, key: &[u8]) {
        self.pending.insert(key.to_vec(), None);
    }
}

/// Run `action` against a transaction over `base`; commit only if it succeeds.
pub fn transactional<S, T, E, F>(base: &mut S, action: F) -> Result<T, E>
where
    S: Storage + ?Sized,
    F: FnOnce(&mut dyn Storage) -> Result<T, E>,
{
    let mut tx = StorageTransaction::new(base);
    let result = action(&mut tx)?;
    tx.commit();
    Ok(result)
}
