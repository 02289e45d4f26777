//! Mint authority seam and the storage-backed bank keeper used by the node.
//!
//! The deposit processor only needs `mint` and `transfer`; any host ledger that can
//! provide them over the same store can be plugged in through [`MintAuthority`].

use cosmwasm_std::{Coin, Order, StdResult, Storage, Uint128};
use cw_storage_plus::Map;

use crate::error::BridgeError;

/// Mint/transfer capability of the host ledger.
///
/// Both operations write through `store`, so they take part in the caller's
/// storage transaction and roll back with it.
pub trait MintAuthority: Send + Sync {
    /// Create `coin` out of thin air and credit it to `module_account`.
    fn mint(
        &self,
        store: &mut dyn Storage,
        module_account: &str,
        coin: &Coin,
    ) -> Result<(), BridgeError>;

    /// Move `coin` from `from` to `to`.
    fn transfer(
        &self,
        store: &mut dyn Storage,
        from: &str,
        to: &str,
        coin: &Coin,
    ) -> Result<(), BridgeError>;

    /// Current balance of `address` in `denom`.
    fn balance(&self, store: &dyn Storage, address: &str, denom: &str) -> StdResult<Uint128>;
}

/// (address, denom) -> amount
const BALANCES: Map<(&str, &str), Uint128> = Map::new("bank_balances");

/// denom -> total supply
const SUPPLY: Map<&str, Uint128> = Map::new("bank_supply");

/// Minimal bank: balances and supply kept in the bridge store.
#[derive(Debug, Clone, Copy, Default)]
pub struct BankKeeper;

impl BankKeeper {
    pub fn new() -> Self {
        Self
    }

    /// Total minted supply of `denom`.
    pub fn supply(&self, store: &dyn Storage, denom: &str) -> StdResult<Uint128> {
        Ok(SUPPLY.may_load(store, denom)?.unwrap_or_default())
    }

    /// All non-zero balances of `address`.
    pub fn all_balances(&self, store: &dyn Storage, address: &str) -> StdResult<Vec<Coin>> {
        BALANCES
            .prefix(address)
            .range(store, None, None, Order::Ascending)
            .map(|item| item.map(|(denom, amount)| Coin { denom, amount }))
            .collect()
    }

    fn credit(
        &self,
        store: &mut dyn Storage,
        address: &str,
        coin: &Coin,
    ) -> Result<(), BridgeError> {
        let current = self.balance(store, address, &coin.denom)?;
        let updated = current
            .checked_add(coin.amount)
            .map_err(|e| mint_failure(format!("balance overflow for {}: {}", address, e)))?;
        BALANCES.save(store, (address, coin.denom.as_str()), &updated)?;
        Ok(())
    }

    fn debit(
        &self,
        store: &mut dyn Storage,
        address: &str,
        coin: &Coin,
    ) -> Result<(), BridgeError> {
        let current = self.balance(store, address, &coin.denom)?;
        let updated = current.checked_sub(coin.amount).map_err(|_| {
            mint_failure(format!(
                "insufficient funds in {}: have {}{}, need {}",
                address, current, coin.denom, coin
            ))
        })?;
        if updated.is_zero() {
            BALANCES.remove(store, (address, coin.denom.as_str()));
        } else {
            BALANCES.save(store, (address, coin.denom.as_str()), &updated)?;
        }
        Ok(())
    }
}

fn mint_failure(reason: String) -> BridgeError {
    BridgeError::MintFailure { reason }
}

impl MintAuthority for BankKeeper {
    fn mint(
        &self,
        store: &mut dyn Storage,
        module_account: &str,
        coin: &Coin,
    ) -> Result<(), BridgeError> {
        if coin.amount.is_zero() {
            return Err(mint_failure("cannot mint zero coins".to_string()));
        }
        let supply = self.supply(store, &coin.denom)?;
        let supply = supply
            .checked_add(coin.amount)
            .map_err(|e| mint_failure(format!("supply overflow for {}: {}", coin.denom, e)))?;
        SUPPLY.save(store, coin.denom.as_str(), &supply)?;
        self.credit(store, module_account, coin)
    }

    fn transfer(
        &self,
        store: &mut dyn Storage,
        from: &str,
        to: &str,
        coin: &Coin,
    ) -> Result<(), BridgeError> {
        self.debit(store, from, coin)?;
        self.credit(store, to, coin)
    }

    fn balance(&self, store: &dyn Storage, address: &str, denom: &str) -> StdResult<Uint128> {
        Ok(BALANCES
            .may_load(store, (address, denom))?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::{coin, MemoryStorage};

    #[test]
    fn test_mint_and_transfer() {
        let mut store = MemoryStorage::new();
        let bank = BankKeeper::new();
        bank.mint(&mut store, "bridge", &coin(10_000, "usdc")).unwrap();
        assert_eq!(bank.supply(&store, "usdc").unwrap(), Uint128::new(10_000));
        assert_eq!(
            bank.balance(&store, "bridge", "usdc").unwrap(),
            Uint128::new(10_000)
        );

        bank.transfer(&mut store, "bridge", "b52alice", &coin(10_000, "usdc"))
            .unwrap();
        assert_eq!(bank.balance(&store, "bridge", "usdc").unwrap(), Uint128::zero());
        assert_eq!(
            bank.balance(&store, "b52alice", "usdc").unwrap(),
            Uint128::new(10_000)
        );
        assert_eq!(
            bank.all_balances(&store, "b52alice").unwrap(),
            vec![coin(10_000, "usdc")]
        );
        assert!(bank.all_balances(&store, "bridge").unwrap().is_empty());
    }

    #[test]
    fn test_transfer_insufficient_funds() {
        let mut store = MemoryStorage::new();
        let bank = BankKeeper::new();
        bank.mint(&mut store, "bridge", &coin(5, "usdc")).unwrap();
        let err = bank
            .transfer(&mut store, "bridge", "b52alice", &coin(6, "usdc"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::MintFailure { .. }));
        assert_eq!(bank.balance(&store, "bridge", "usdc").unwrap(), Uint128::new(5));
    }

    #[test]
    fn test_mint_zero_rejected() {
        let mut store = MemoryStorage::new();
        let err = BankKeeper::new()
            .mint(&mut store, "bridge", &coin(0, "usdc"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::MintFailure { .. }));
    }

    #[test]
    fn test_supply_overflow() {
        let mut store = MemoryStorage::new();
        let bank = BankKeeper::new();
        bank.mint(&mut store, "bridge", &Coin::new(u128::MAX, "usdc"))
            .unwrap();
        let err = bank.mint(&mut store, "bridge", &coin(1, "usdc")).unwrap_err();
        assert!(matches!(err, BridgeError::MintFailure { .. }));
    }
}
