//! In-memory store.
//!
//! Backs tests and single-process deployments. One `RwLock` over the whole
//! state gives every commit operation a single critical section, which is
//! what makes the accrual, cycle, and commission commits atomic and the
//! uniqueness checks race-free. A persistent implementation would map these
//! to database transactions and unique indexes.

use crate::commission::CommissionTransaction;
use crate::error::LedgerError;
use crate::ledger::{Account, LedgerEntry, Purse, ReferralLink, Wallet};
use crate::milestone::{Cycle, MilestoneAward, Voucher};
use crate::sequence::{AtomicSequenceAllocator, SequenceAllocator, SequenceTicket, TicketOrigin};
use crate::storage::LedgerStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    referrals: HashMap<String, ReferralLink>,
    wallets: HashMap<String, Wallet>,
    entries: Vec<LedgerEntry>,
    tickets: BTreeMap<u64, SequenceTicket>,
    award_keys: HashSet<(u64, u64, u64)>,
    awards: Vec<MilestoneAward>,
    commission_keys: HashSet<(String, String, String)>,
    commissions: Vec<CommissionTransaction>,
    cycles: Vec<Cycle>,
    trades: HashMap<String, BTreeMap<String, f64>>,
    vouchers: Vec<Voucher>,
    earn_events: HashSet<(String, String)>,
}

impl State {
    fn credit_locked(
        &mut self,
        account_id: &str,
        purse: Purse,
        amount: f64,
        reason: &str,
    ) -> LedgerEntry {
        let wallet = self
            .wallets
            .entry(account_id.to_string())
            .or_insert_with(|| Wallet::new(account_id));
        let balance_after = wallet.apply(purse, amount);
        let entry = LedgerEntry::new(account_id, purse, amount, balance_after, reason);
        self.entries.push(entry.clone());
        entry
    }

    fn check_version(&self, account: &Account, expected: u64) -> Result<(), LedgerError> {
        let stored = self.accounts.get(&account.id).map(|a| a.version);
        match stored {
            Some(v) if v == expected => Ok(()),
            Some(_) => Err(LedgerError::Conflict {
                account_id: account.id.clone(),
            }),
            None => Err(LedgerError::AccountNotFound(account.id.clone())),
        }
    }

    fn insert_ticket(&mut self, ticket: SequenceTicket) -> Result<(), LedgerError> {
        let sequence = ticket.sequence_number;
        if self.tickets.insert(sequence, ticket).is_some() {
            return Err(LedgerError::DuplicateSequence { sequence });
        }
        Ok(())
    }
}

pub struct MemoryStore {
    allocator: Arc<dyn SequenceAllocator>,
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_allocator(Arc::new(AtomicSequenceAllocator::default()))
    }

    pub fn with_allocator(allocator: Arc<dyn SequenceAllocator>) -> Self {
        Self {
            allocator,
            state: RwLock::new(State::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn account(&self, id: &str) -> Result<Option<Account>, LedgerError> {
        let state = self.state.read().await;
        Ok(state.accounts.get(id).cloned())
    }

    async fn upsert_account(&self, mut account: Account) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.accounts.get(&account.id) {
            account.version = existing.version + 1;
        }
        account.updated_at = Utc::now();
        state.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    async fn referral_for(&self, referee_id: &str) -> Result<Option<ReferralLink>, LedgerError> {
        let state = self.state.read().await;
        Ok(state.referrals.get(referee_id).cloned())
    }

    async fn link_referral(&self, link: ReferralLink) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        if state.referrals.contains_key(&link.referee_id) {
            return Err(LedgerError::ReferralAlreadyLinked {
                referee_id: link.referee_id,
            });
        }
        state.referrals.insert(link.referee_id.clone(), link);
        Ok(())
    }

    async fn credit(
        &self,
        account_id: &str,
        purse: Purse,
        amount: f64,
        reason: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut state = self.state.write().await;
        let entry = state.credit_locked(account_id, purse, amount, reason);
        debug!(account_id = %account_id, purse = %purse, amount = amount, "Wallet credited");
        Ok(entry)
    }

    async fn debit(
        &self,
        account_id: &str,
        purse: Purse,
        amount: f64,
        reason: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut state = self.state.write().await;
        let balance = state
            .wallets
            .get(account_id)
            .map(|w| w.balance(purse))
            .unwrap_or(0.0);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account_id: account_id.to_string(),
                purse: purse.to_string(),
            });
        }
        Ok(state.credit_locked(account_id, purse, -amount, reason))
    }

    async fn wallet(&self, account_id: &str) -> Result<Wallet, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .wallets
            .get(account_id)
            .cloned()
            .unwrap_or_else(|| Wallet::new(account_id)))
    }

    async fn ledger_entries(&self, account_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn commit_accrual(
        &self,
        mut account: Account,
        expected_version: u64,
        ticket_count: u32,
        ticket_value: u64,
    ) -> Result<Vec<SequenceTicket>, LedgerError> {
        let mut state = self.state.write().await;
        state.check_version(&account, expected_version)?;

        account.version = expected_version + 1;
        account.updated_at = Utc::now();
        let owner = account.id.clone();
        state.accounts.insert(owner.clone(), account);

        // Allocation happens inside the critical section; insertion cannot
        // fail afterwards, so the issued range stays contiguous.
        let mut tickets = Vec::with_capacity(ticket_count as usize);
        for _ in 0..ticket_count {
            let ticket = SequenceTicket {
                sequence_number: self.allocator.allocate(),
                owner_account_id: owner.clone(),
                points_value_at_issue: ticket_value,
                issued_from: TicketOrigin::Base,
                issued_at: Utc::now(),
            };
            state.insert_ticket(ticket.clone())?;
            tickets.push(ticket);
        }
        Ok(tickets)
    }

    async fn commit_cycle(
        &self,
        mut account: Account,
        expected_version: u64,
        mut cycle: Cycle,
        ticket_value: u64,
        income_credit: f64,
    ) -> Result<(Cycle, Vec<SequenceTicket>), LedgerError> {
        let mut state = self.state.write().await;
        state.check_version(&account, expected_version)?;

        account.version = expected_version + 1;
        account.updated_at = Utc::now();
        let owner = account.id.clone();
        state.accounts.insert(owner.clone(), account);

        let mut tickets = Vec::with_capacity(cycle.tickets_issued as usize);
        for _ in 0..cycle.tickets_issued {
            let ticket = SequenceTicket {
                sequence_number: self.allocator.allocate(),
                owner_account_id: owner.clone(),
                points_value_at_issue: ticket_value,
                issued_from: TicketOrigin::Infinity {
                    cycle_id: cycle.id.clone(),
                },
                issued_at: Utc::now(),
            };
            state.insert_ticket(ticket.clone())?;
            tickets.push(ticket);
        }

        state.credit_locked(
            &owner,
            Purse::Income,
            income_credit,
            &format!("cycle {} infinity tickets", cycle.id),
        );

        cycle.completed = true;
        state.cycles.push(cycle.clone());
        Ok((cycle, tickets))
    }

    async fn ticket_by_sequence(
        &self,
        sequence: u64,
    ) -> Result<Option<SequenceTicket>, LedgerError> {
        let state = self.state.read().await;
        Ok(state.tickets.get(&sequence).cloned())
    }

    async fn highest_sequence(&self) -> Result<u64, LedgerError> {
        let state = self.state.read().await;
        Ok(state.tickets.keys().next_back().copied().unwrap_or(0))
    }

    async fn award_exists(
        &self,
        recipient_sequence: u64,
        trigger_sequence: u64,
        multiplier: u64,
    ) -> Result<bool, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .award_keys
            .contains(&(recipient_sequence, trigger_sequence, multiplier)))
    }

    async fn append_award(&self, award: MilestoneAward) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        let key = (
            award.recipient_sequence_number,
            award.triggering_sequence_number,
            award.multiplier,
        );
        if !state.award_keys.insert(key) {
            return Ok(false);
        }
        state.awards.push(award);
        Ok(true)
    }

    async fn awards_for(&self, account_id: &str) -> Result<Vec<MilestoneAward>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .awards
            .iter()
            .filter(|a| a.recipient_account_id == account_id)
            .cloned()
            .collect())
    }

    async fn commit_commission(
        &self,
        transaction: CommissionTransaction,
    ) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        let key = (
            transaction.original_transaction_id.clone(),
            transaction.referrer_id.clone(),
            transaction.referee_id.clone(),
        );
        if !state.commission_keys.insert(key) {
            return Ok(false);
        }
        state.commissions.push(transaction);
        Ok(true)
    }

    async fn has_approved_commission(
        &self,
        original_transaction_id: &str,
        referrer_id: &str,
        referee_id: &str,
    ) -> Result<bool, LedgerError> {
        let state = self.state.read().await;
        Ok(state.commission_keys.contains(&(
            original_transaction_id.to_string(),
            referrer_id.to_string(),
            referee_id.to_string(),
        )))
    }

    async fn commissions_for(
        &self,
        account_id: &str,
    ) -> Result<Vec<CommissionTransaction>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .commissions
            .iter()
            .filter(|t| t.referrer_id == account_id || t.referee_id == account_id)
            .cloned()
            .collect())
    }

    async fn record_trade(
        &self,
        account_id: &str,
        counterparty_id: &str,
        amount: f64,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        *state
            .trades
            .entry(account_id.to_string())
            .or_default()
            .entry(counterparty_id.to_string())
            .or_insert(0.0) += amount;
        Ok(())
    }

    async fn counterparty_volumes(
        &self,
        account_id: &str,
    ) -> Result<Vec<(String, f64)>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .trades
            .get(account_id)
            .map(|volumes| {
                volumes
                    .iter()
                    .map(|(counterparty, volume)| (counterparty.clone(), *volume))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_vouchers(&self, vouchers: Vec<Voucher>) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state.vouchers.extend(vouchers);
        Ok(())
    }

    async fn vouchers_for(&self, account_id: &str) -> Result<Vec<Voucher>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .vouchers
            .iter()
            .filter(|v| v.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn claim_earn_event(
        &self,
        original_transaction_id: &str,
        account_id: &str,
    ) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        Ok(state.earn_events.insert((
            original_transaction_id.to_string(),
            account_id.to_string(),
        )))
    }

    async fn release_earn_event(
        &self,
        original_transaction_id: &str,
        account_id: &str,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state.earn_events.remove(&(
            original_transaction_id.to_string(),
            account_id.to_string(),
        ));
        Ok(())
    }
}
