use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, Timestamp};
use crate::config::{LedgerConfig, LookupPolicy, RegistrationPolicy};

pub mod snapshot;

pub use snapshot::{LedgerSnapshot, SnapshotMetadata};

pub type AccountId = String;
pub type Amount = u64;
pub type EventSeq = u64;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("burn amount must be between 1 and {max}, got {amount}", max = Amount::MAX)]
    InvalidAmount { amount: i128 },
    #[error("account identifier must not be empty")]
    EmptyAccount,
    #[error("unknown account {account}")]
    UnknownAccount { account: AccountId },
    #[error("burned total of account {account} would overflow")]
    Overflow { account: AccountId },
    #[error("snapshot root mismatch: recorded {recorded}, computed {computed}")]
    CorruptSnapshot { recorded: String, computed: String },
    #[error("inconsistent snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Converts a signed amount from an outer boundary into a burnable one.
pub fn parse_amount(raw: i128) -> Result<Amount, LedgerError> {
    match Amount::try_from(raw) {
        Ok(amount) if amount > 0 => Ok(amount),
        _ => Err(LedgerError::InvalidAmount { amount: raw }),
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BurnStatus {
    Pending,
    Matured,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BurnEvent {
    pub seq: EventSeq,
    pub account: AccountId,
    pub amount: Amount,
    pub timestamp: Timestamp,
}

impl BurnEvent {
    pub fn matures_at(&self, window_ms: u64) -> Timestamp {
        self.timestamp.saturating_add(window_ms)
    }

    pub fn status_at(&self, now: Timestamp, window_ms: u64) -> BurnStatus {
        if self.matures_at(window_ms) <= now {
            BurnStatus::Matured
        } else {
            BurnStatus::Pending
        }
    }
}

/// Append-only burn history of one account.
///
/// Events are kept in submission order, which is also timestamp order, so
/// the matured events at any instant form a prefix of `events`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccountHistory {
    pub events: Vec<BurnEvent>,
    pub total_burned: Amount,
}

impl AccountHistory {
    fn matured_len(&self, now: Timestamp, window_ms: u64) -> usize {
        self.events
            .partition_point(|event| event.matures_at(window_ms) <= now)
    }

    /// Reward units accrued at `now`: one per matured burn.
    pub fn rewards_at(&self, now: Timestamp, window_ms: u64) -> u64 {
        self.matured_len(now, window_ms) as u64
    }

    pub fn matured(&self, now: Timestamp, window_ms: u64) -> &[BurnEvent] {
        &self.events[..self.matured_len(now, window_ms)]
    }

    pub fn pending(&self, now: Timestamp, window_ms: u64) -> &[BurnEvent] {
        &self.events[self.matured_len(now, window_ms)..]
    }

    pub fn matured_amount(&self, now: Timestamp, window_ms: u64) -> Amount {
        // bounded by total_burned, which is checked on every append
        self.matured(now, window_ms).iter().map(|e| e.amount).sum()
    }
}

/// Diagnostic view of the whole ledger.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerStatus {
    pub now: Timestamp,
    pub maturation_window_ms: u64,
    pub accounts: usize,
    pub events: u64,
    pub total_burned: u128,
    pub next_seq: EventSeq,
    pub merkle_root: String,
}

/// Burn-and-reward ledger.
///
/// Writes to one account are serialised by that account's lock; writes to
/// different accounts only meet on the outer map while an entry is created.
pub struct BurnLedger<C: Clock> {
    config: LedgerConfig,
    clock: C,
    high_water: AtomicU64,
    next_seq: AtomicU64,
    accounts: RwLock<BTreeMap<AccountId, Arc<RwLock<AccountHistory>>>>,
    registered: RwLock<BTreeSet<AccountId>>,
}

impl<C: Clock> BurnLedger<C> {
    pub fn new(config: LedgerConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            high_water: AtomicU64::new(0),
            next_seq: AtomicU64::new(1),
            accounts: RwLock::new(BTreeMap::new()),
            registered: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn maturation_window_ms(&self) -> u64 {
        self.config.maturation_window_ms
    }

    /// Current time, clamped so it never runs backwards.
    pub fn now(&self) -> Timestamp {
        let reading = self.clock.now();
        let prev = self.high_water.fetch_max(reading, Ordering::SeqCst);
        prev.max(reading)
    }

    /// Marks `account` as allowed to burn. Idempotent.
    pub fn register(&self, account: &str) -> Result<bool, LedgerError> {
        if account.is_empty() {
            return Err(LedgerError::EmptyAccount);
        }
        self.account_entry(account);
        let inserted = self.registered.write().insert(account.to_string());
        if inserted {
            info!(account, "account registered");
        }
        Ok(inserted)
    }

    pub fn is_registered(&self, account: &str) -> bool {
        self.registered.read().contains(account)
    }

    /// Records a burn of `amount` by `account` at the current time.
    pub fn burn(&self, account: &str, amount: Amount) -> Result<BurnEvent, LedgerError> {
        if account.is_empty() {
            warn!("rejected burn without account");
            return Err(LedgerError::EmptyAccount);
        }
        if amount == 0 {
            warn!(account, "rejected zero burn");
            return Err(LedgerError::InvalidAmount { amount: 0 });
        }
        if self.config.registration == RegistrationPolicy::PreRegistered
            && !self.is_registered(account)
        {
            warn!(account, "rejected burn from unregistered account");
            return Err(LedgerError::UnknownAccount {
                account: account.to_string(),
            });
        }

        let entry = self.account_entry(account);
        let mut history = entry.write();
        let total_burned =
            history
                .total_burned
                .checked_add(amount)
                .ok_or_else(|| LedgerError::Overflow {
                    account: account.to_string(),
                })?;
        let event = BurnEvent {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            account: account.to_string(),
            amount,
            timestamp: self.now(),
        };
        history.total_burned = total_burned;
        history.events.push(event.clone());
        info!(
            account,
            amount,
            seq = event.seq,
            timestamp = event.timestamp,
            total_burned,
            "burn recorded"
        );
        Ok(event)
    }

    /// Number of matured burns of `account` as of now.
    pub fn rewards_count(&self, account: &str) -> Result<u64, LedgerError> {
        let window = self.config.maturation_window_ms;
        let count = self
            .read_account(account, None, |h, now| h.rewards_at(now, window))?
            .unwrap_or(0);
        debug!(account, count, "rewards count");
        Ok(count)
    }

    /// Number of matured burns of `account` as of `at`.
    pub fn rewards_count_at(&self, account: &str, at: Timestamp) -> Result<u64, LedgerError> {
        let window = self.config.maturation_window_ms;
        Ok(self
            .read_account(account, Some(at), |h, now| h.rewards_at(now, window))?
            .unwrap_or(0))
    }

    /// Matured burns of `account`, oldest first.
    pub fn claim_list(&self, account: &str) -> Result<Vec<BurnEvent>, LedgerError> {
        let window = self.config.maturation_window_ms;
        Ok(self
            .read_account(account, None, |h, now| h.matured(now, window).to_vec())?
            .unwrap_or_default())
    }

    /// Burns of `account` still inside the maturation window.
    pub fn pending(&self, account: &str) -> Result<Vec<BurnEvent>, LedgerError> {
        let window = self.config.maturation_window_ms;
        Ok(self
            .read_account(account, None, |h, now| h.pending(now, window).to_vec())?
            .unwrap_or_default())
    }

    pub fn burned_total(&self, account: &str) -> Result<Amount, LedgerError> {
        Ok(self
            .read_account(account, None, |h, _| h.total_burned)?
            .unwrap_or(0))
    }

    pub fn matured_amount(&self, account: &str) -> Result<Amount, LedgerError> {
        let window = self.config.maturation_window_ms;
        Ok(self
            .read_account(account, None, |h, now| h.matured_amount(now, window))?
            .unwrap_or(0))
    }

    pub fn history(&self, account: &str) -> Option<AccountHistory> {
        let entry = self.accounts.read().get(account).cloned()?;
        let history = entry.read().clone();
        Some(history)
    }

    pub fn status_of(&self, event: &BurnEvent) -> BurnStatus {
        event.status_at(self.now(), self.config.maturation_window_ms)
    }

    /// Diagnostic summary taken from one consistent snapshot.
    pub fn status(&self) -> LedgerStatus {
        let snapshot = self.snapshot();
        let events = snapshot
            .accounts
            .values()
            .map(|h| h.events.len() as u64)
            .sum();
        let total_burned = snapshot
            .accounts
            .values()
            .map(|h| h.total_burned as u128)
            .sum();
        LedgerStatus {
            now: snapshot.meta.last_timestamp,
            maturation_window_ms: self.maturation_window_ms(),
            accounts: snapshot.accounts.len(),
            events,
            total_burned,
            next_seq: snapshot.meta.next_seq,
            merkle_root: hex::encode(snapshot.merkle_root),
        }
    }

    fn account_entry(&self, account: &str) -> Arc<RwLock<AccountHistory>> {
        if let Some(entry) = self.accounts.read().get(account) {
            return Arc::clone(entry);
        }
        let mut accounts = self.accounts.write();
        Arc::clone(accounts.entry(account.to_string()).or_default())
    }

    /// Runs `f` on the account's history under its read lock. The clock is
    /// read after the lock is taken, so every event visible to `f` was
    /// recorded at or before the time it is given.
    fn read_account<T>(
        &self,
        account: &str,
        at: Option<Timestamp>,
        f: impl FnOnce(&AccountHistory, Timestamp) -> T,
    ) -> Result<Option<T>, LedgerError> {
        let entry = self.accounts.read().get(account).cloned();
        match entry {
            Some(entry) => {
                let history = entry.read();
                let now = at.unwrap_or_else(|| self.now());
                Ok(Some(f(&history, now)))
            }
            None => match self.config.lookup {
                LookupPolicy::Lenient => Ok(None),
                LookupPolicy::Strict => {
                    warn!(account, "lookup of unknown account");
                    Err(LedgerError::UnknownAccount {
                        account: account.to_string(),
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn ledger_at(start: Timestamp, window: u64) -> (BurnLedger<Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        let config = LedgerConfig {
            maturation_window_ms: window,
            ..LedgerConfig::default()
        };
        (BurnLedger::new(config, Arc::clone(&clock)), clock)
    }

    #[test]
    fn burns_mature_after_the_window() {
        let (ledger, clock) = ledger_at(1_000, 5_000);
        for amount in [500, 10, 20, 30] {
            ledger.burn("alice", amount).unwrap();
        }
        assert_eq!(ledger.rewards_count("alice").unwrap(), 0);
        clock.advance(6_000);
        assert_eq!(ledger.rewards_count("alice").unwrap(), 4);
        assert_eq!(ledger.burned_total("alice").unwrap(), 560);
    }

    #[test]
    fn maturation_boundary_is_inclusive() {
        let (ledger, clock) = ledger_at(10_000, 5_000);
        let event = ledger.burn("alice", 7).unwrap();
        assert_eq!(event.timestamp, 10_000);
        assert_eq!(ledger.rewards_count_at("alice", 14_999).unwrap(), 0);
        assert_eq!(ledger.rewards_count_at("alice", 15_000).unwrap(), 1);

        clock.advance_to(14_999);
        assert_eq!(ledger.status_of(&event), BurnStatus::Pending);
        clock.advance_to(15_000);
        assert_eq!(ledger.status_of(&event), BurnStatus::Matured);
    }

    #[test]
    fn zero_burn_is_rejected_without_side_effects() {
        let (ledger, _clock) = ledger_at(0, 10);
        ledger.burn("alice", 3).unwrap();
        let before = ledger.snapshot();
        let err = ledger.burn("alice", 0).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { amount: 0 }));
        let after = ledger.snapshot();
        assert_eq!(before.accounts, after.accounts);
        assert_eq!(before.meta.next_seq, after.meta.next_seq);
    }

    #[test]
    fn negative_and_oversized_amounts_fail_to_parse() {
        assert!(matches!(
            parse_amount(-5),
            Err(LedgerError::InvalidAmount { amount: -5 })
        ));
        assert!(parse_amount(0).is_err());
        assert!(parse_amount(Amount::MAX as i128 + 1).is_err());
        assert_eq!(parse_amount(500).unwrap(), 500);
    }

    #[test]
    fn overflowing_total_leaves_history_untouched() {
        let (ledger, _clock) = ledger_at(0, 10);
        ledger.burn("whale", Amount::MAX).unwrap();
        let err = ledger.burn("whale", 1).unwrap_err();
        assert!(matches!(err, LedgerError::Overflow { .. }));
        let history = ledger.history("whale").unwrap();
        assert_eq!(history.events.len(), 1);
        assert_eq!(history.total_burned, Amount::MAX);
    }

    #[test]
    fn empty_account_is_rejected() {
        let (ledger, _clock) = ledger_at(0, 10);
        assert!(matches!(ledger.burn("", 1), Err(LedgerError::EmptyAccount)));
        assert!(matches!(ledger.register(""), Err(LedgerError::EmptyAccount)));
    }

    #[test]
    fn lookup_policy_decides_unknown_accounts() {
        let (lenient, _clock) = ledger_at(0, 10);
        assert_eq!(lenient.rewards_count("nobody").unwrap(), 0);
        assert!(lenient.claim_list("nobody").unwrap().is_empty());

        let strict = BurnLedger::new(
            LedgerConfig {
                lookup: LookupPolicy::Strict,
                ..LedgerConfig::default()
            },
            ManualClock::new(0),
        );
        match strict.rewards_count("nobody").unwrap_err() {
            LedgerError::UnknownAccount { account } => assert_eq!(account, "nobody"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn registration_gates_burns_when_required() {
        let ledger = BurnLedger::new(
            LedgerConfig {
                registration: RegistrationPolicy::PreRegistered,
                lookup: LookupPolicy::Strict,
                ..LedgerConfig::default()
            },
            ManualClock::new(0),
        );
        assert!(matches!(
            ledger.burn("alice", 5),
            Err(LedgerError::UnknownAccount { .. })
        ));
        assert!(ledger.register("alice").unwrap());
        assert!(!ledger.register("alice").unwrap());
        // registered accounts are known even before their first burn
        assert_eq!(ledger.rewards_count("alice").unwrap(), 0);
        ledger.burn("alice", 5).unwrap();
        assert_eq!(ledger.history("alice").unwrap().events.len(), 1);
    }

    #[test]
    fn claim_list_and_pending_split_history() {
        let (ledger, clock) = ledger_at(0, 100);
        ledger.burn("alice", 500).unwrap();
        clock.advance(60);
        ledger.burn("alice", 10).unwrap();
        clock.advance(60);

        let claims = ledger.claim_list("alice").unwrap();
        let pending = ledger.pending("alice").unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].amount, 500);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].amount, 10);
        assert_eq!(ledger.matured_amount("alice").unwrap(), 500);
    }

    #[test]
    fn reads_are_idempotent_and_monotonic() {
        let (ledger, clock) = ledger_at(0, 50);
        let mut last = 0;
        for step in 0..20u64 {
            if step % 3 == 0 {
                ledger.burn("alice", step + 1).unwrap();
            }
            clock.advance(17);
            let first = ledger.rewards_count("alice").unwrap();
            let second = ledger.rewards_count("alice").unwrap();
            assert_eq!(first, second);
            assert!(first >= last);
            last = first;
        }
    }

    #[test]
    fn sequence_numbers_span_accounts() {
        let (ledger, _clock) = ledger_at(0, 0);
        let a = ledger.burn("alice", 1).unwrap();
        let b = ledger.burn("bob", 1).unwrap();
        let c = ledger.burn("alice", 1).unwrap();
        assert_eq!((a.seq, b.seq, c.seq), (1, 2, 3));
    }

    #[test]
    fn status_summarises_all_accounts() {
        let (ledger, _clock) = ledger_at(42, 10);
        ledger.burn("alice", 500).unwrap();
        ledger.burn("bob", 30).unwrap();
        let status = ledger.status();
        assert_eq!(status.now, 42);
        assert_eq!(status.accounts, 2);
        assert_eq!(status.events, 2);
        assert_eq!(status.total_burned, 530);
        assert_eq!(status.next_seq, 3);
        assert_eq!(status.merkle_root.len(), 64);
    }
}
