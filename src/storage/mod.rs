//! Storage Interface
//!
//! The persistent storage driver is an external collaborator consumed
//! through this narrow interface. Commits that must be atomic (accrual,
//! cycle expansion, commission uniqueness) are store operations so the
//! implementation can enforce them in one critical section or database
//! transaction rather than a racy check-then-act in the engines.

mod memory;

pub use memory::MemoryStore;

use crate::commission::CommissionTransaction;
use crate::error::LedgerError;
use crate::ledger::{Account, LedgerEntry, Purse, ReferralLink, Wallet};
use crate::milestone::{Cycle, MilestoneAward, Voucher};
use crate::sequence::SequenceTicket;
use async_trait::async_trait;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // Accounts

    async fn account(&self, id: &str) -> Result<Option<Account>, LedgerError>;

    async fn upsert_account(&self, account: Account) -> Result<(), LedgerError>;

    // Referral links (one referrer per referee, permanent)

    async fn referral_for(&self, referee_id: &str) -> Result<Option<ReferralLink>, LedgerError>;

    /// Fails with `ReferralAlreadyLinked` if the referee already has a
    /// referrer.
    async fn link_referral(&self, link: ReferralLink) -> Result<(), LedgerError>;

    // Wallets. Credit/debit are typed ledger operations: the balance
    // mutation and the append-only entry land in the same commit, never one
    // without the other.

    async fn credit(
        &self,
        account_id: &str,
        purse: Purse,
        amount: f64,
        reason: &str,
    ) -> Result<LedgerEntry, LedgerError>;

    async fn debit(
        &self,
        account_id: &str,
        purse: Purse,
        amount: f64,
        reason: &str,
    ) -> Result<LedgerEntry, LedgerError>;

    async fn wallet(&self, account_id: &str) -> Result<Wallet, LedgerError>;

    async fn ledger_entries(&self, account_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;

    // Sequence tickets

    /// Commit one accrual atomically: verify the account version, persist the
    /// updated account, and allocate + persist `ticket_count` base-track
    /// tickets of `ticket_value` points each. Returns `Conflict` (and applies
    /// nothing) if the account changed concurrently.
    async fn commit_accrual(
        &self,
        account: Account,
        expected_version: u64,
        ticket_count: u32,
        ticket_value: u64,
    ) -> Result<Vec<SequenceTicket>, LedgerError>;

    /// Commit one infinity cycle atomically: verify the account version,
    /// persist the updated account, allocate + persist the ticket batch,
    /// credit the income purse, and record the cycle. All or nothing.
    async fn commit_cycle(
        &self,
        account: Account,
        expected_version: u64,
        cycle: Cycle,
        ticket_value: u64,
        income_credit: f64,
    ) -> Result<(Cycle, Vec<SequenceTicket>), LedgerError>;

    async fn ticket_by_sequence(
        &self,
        sequence: u64,
    ) -> Result<Option<SequenceTicket>, LedgerError>;

    async fn highest_sequence(&self) -> Result<u64, LedgerError>;

    // Milestone awards (idempotent on the recipient/trigger/multiplier triple)

    async fn award_exists(
        &self,
        recipient_sequence: u64,
        trigger_sequence: u64,
        multiplier: u64,
    ) -> Result<bool, LedgerError>;

    /// Returns false without inserting if the triple already has an award.
    async fn append_award(&self, award: MilestoneAward) -> Result<bool, LedgerError>;

    async fn awards_for(&self, account_id: &str) -> Result<Vec<MilestoneAward>, LedgerError>;

    // Commission transactions

    /// Insert iff no transaction exists for the same
    /// `(original_transaction_id, referrer_id, referee_id)`. The uniqueness
    /// check and the insert happen in one critical section; this is the
    /// commit-time guard that closes the duplicate race.
    async fn commit_commission(
        &self,
        transaction: CommissionTransaction,
    ) -> Result<bool, LedgerError>;

    async fn has_approved_commission(
        &self,
        original_transaction_id: &str,
        referrer_id: &str,
        referee_id: &str,
    ) -> Result<bool, LedgerError>;

    async fn commissions_for(
        &self,
        account_id: &str,
    ) -> Result<Vec<CommissionTransaction>, LedgerError>;

    // Historical trade volume and vouchers

    async fn record_trade(
        &self,
        account_id: &str,
        counterparty_id: &str,
        amount: f64,
    ) -> Result<(), LedgerError>;

    async fn counterparty_volumes(
        &self,
        account_id: &str,
    ) -> Result<Vec<(String, f64)>, LedgerError>;

    async fn append_vouchers(&self, vouchers: Vec<Voucher>) -> Result<(), LedgerError>;

    async fn vouchers_for(&self, account_id: &str) -> Result<Vec<Voucher>, LedgerError>;

    // Earn-event idempotency

    /// Claim an inbound earn event. Returns true exactly once per
    /// `(original_transaction_id, account_id)`; later claims return false so
    /// retried events cannot double-apply.
    async fn claim_earn_event(
        &self,
        original_transaction_id: &str,
        account_id: &str,
    ) -> Result<bool, LedgerError>;

    /// Release a claim taken by `claim_earn_event`. Called when processing
    /// fails after the claim, so the caller's retry is not swallowed as a
    /// duplicate. Releasing an unclaimed pair is a no-op.
    async fn release_earn_event(
        &self,
        original_transaction_id: &str,
        account_id: &str,
    ) -> Result<(), LedgerError>;
}
