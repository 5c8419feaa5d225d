//! Shared Ledger Primitives
//!
//! Accounts, referral links, and per-account wallets split into purses.
//! Every balance mutation goes through a typed credit/debit operation that
//! records an append-only `LedgerEntry` with a resulting-balance snapshot,
//! so the transaction log and the balances can always be reconciled.

mod account;
mod wallet;

pub use account::{Account, AccountKind, AccountStatus, ReferralLink};
pub use wallet::{LedgerEntry, Purse, Wallet};
