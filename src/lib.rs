//! Crypto Perx (CPRX) token ledger.
//!
//! A fixed-supply fungible token: the whole supply is minted once to a
//! wallet at deployment, after which it can only move between holders or be
//! burned. The crate is split into small pieces:
//!
//! * [`ledger`]: balances, allowances, the event log and the state root.
//! * [`access`]: the single owner recorded at deployment.
//! * [`token`]: deployment plus the caller-oriented operation surface.
//! * [`calls`]: serializable call descriptions and their receipts.
//! * [`auth`]: ed25519 signed calls and key-derived addresses.
//! * [`store`]: the JSON state file used by the `cprx` binary.

pub mod access;
pub mod auth;
pub mod calls;
pub mod ledger;
pub mod store;
pub mod token;

pub use access::AccessControl;
pub use calls::{CallReceipt, TokenCall};
pub use ledger::{Ledger, LedgerError, LedgerEvent, INITIAL_SUPPLY};
pub use token::Token;
