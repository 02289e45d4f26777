//! Execute handlers for the B52 bridge.
//!
//! - `deposit` - ProcessDeposit and ProcessDepositEvent
//! - `admin` - authority operations (source block height pinning)

mod admin;
mod deposit;

pub use admin::*;
pub use deposit::*;
