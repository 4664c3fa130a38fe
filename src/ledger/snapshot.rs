use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
    sync::{atomic::AtomicU64, Arc},
};

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::{AccountHistory, AccountId, BurnLedger, EventSeq, LedgerError};
use crate::clock::{Clock, Timestamp};
use crate::config::LedgerConfig;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    /// Ledger time at which the snapshot was taken.
    pub last_timestamp: Timestamp,
    pub next_seq: EventSeq,
    pub maturation_window_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: SnapshotMetadata,
    pub accounts: BTreeMap<AccountId, AccountHistory>,
    pub registered: BTreeSet<AccountId>,
    #[serde(with = "hex_root")]
    pub merkle_root: [u8; 32],
}

impl LedgerSnapshot {
    pub fn compute_root(&self) -> [u8; 32] {
        compute_merkle_root(&self.accounts, &self.registered)
    }

    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        write_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        read_json(path)
    }

    fn validate(&self) -> Result<(), LedgerError> {
        let recorded = self.merkle_root;
        let computed = self.compute_root();
        if recorded != computed {
            return Err(LedgerError::CorruptSnapshot {
                recorded: hex::encode(recorded),
                computed: hex::encode(computed),
            });
        }
        for (account, history) in &self.accounts {
            let mut total: u128 = 0;
            let mut last_ts = 0;
            for event in &history.events {
                if &event.account != account {
                    return Err(LedgerError::InvalidSnapshot(format!(
                        "event {} filed under {account} belongs to {}",
                        event.seq, event.account
                    )));
                }
                if event.amount == 0 {
                    return Err(LedgerError::InvalidSnapshot(format!(
                        "event {} has zero amount",
                        event.seq
                    )));
                }
                if event.timestamp < last_ts {
                    return Err(LedgerError::InvalidSnapshot(format!(
                        "events of {account} are out of time order at {}",
                        event.seq
                    )));
                }
                if event.seq >= self.meta.next_seq {
                    return Err(LedgerError::InvalidSnapshot(format!(
                        "event {} is not below next_seq {}",
                        event.seq, self.meta.next_seq
                    )));
                }
                last_ts = event.timestamp;
                total += event.amount as u128;
            }
            if total != history.total_burned as u128 {
                return Err(LedgerError::InvalidSnapshot(format!(
                    "burned total of {account} is {}, events sum to {total}",
                    history.total_burned
                )));
            }
            if last_ts > self.meta.last_timestamp {
                return Err(LedgerError::InvalidSnapshot(format!(
                    "events of {account} are newer than the snapshot"
                )));
            }
        }
        Ok(())
    }
}

impl<C: Clock> BurnLedger<C> {
    /// Consistent image of every account at a single instant.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let accounts = self.accounts.read();
        let guards: Vec<_> = accounts
            .iter()
            .map(|(account, entry)| (account, entry.read()))
            .collect();
        let registered = self.registered.read().clone();
        let now = self.now();
        let next_seq = self.next_seq.load(std::sync::atomic::Ordering::SeqCst);
        let histories: BTreeMap<AccountId, AccountHistory> = guards
            .iter()
            .map(|(account, history)| ((*account).clone(), (**history).clone()))
            .collect();
        drop(guards);
        drop(accounts);

        let merkle_root = compute_merkle_root(&histories, &registered);
        LedgerSnapshot {
            meta: SnapshotMetadata {
                last_timestamp: now,
                next_seq,
                maturation_window_ms: self.config.maturation_window_ms,
            },
            accounts: histories,
            registered,
            merkle_root,
        }
    }

    /// Rebuilds a ledger from `snapshot`. The ledger's clock is clamped to
    /// the snapshot time so restored events never lie in the future.
    ///
    /// The maturation window recorded in the snapshot wins over the one in
    /// `config`: a different window would move already counted burns back to
    /// pending, or count burns early.
    pub fn restore(
        snapshot: LedgerSnapshot,
        config: LedgerConfig,
        clock: C,
    ) -> Result<Self, LedgerError> {
        snapshot.validate()?;
        let recorded_window = snapshot.meta.maturation_window_ms;
        if recorded_window != config.maturation_window_ms {
            warn!(
                recorded = recorded_window,
                configured = config.maturation_window_ms,
                "ignoring configured maturation window, keeping the recorded one"
            );
        }
        let config = LedgerConfig {
            maturation_window_ms: recorded_window,
            ..config
        };
        let LedgerSnapshot {
            meta,
            mut accounts,
            registered,
            ..
        } = snapshot;
        // registered accounts are known even if the snapshot caught them
        // before their history entry existed
        for account in &registered {
            accounts.entry(account.clone()).or_default();
        }
        let accounts = accounts
            .into_iter()
            .map(|(account, history)| (account, Arc::new(RwLock::new(history))))
            .collect::<BTreeMap<_, _>>();
        info!(
            accounts = accounts.len(),
            next_seq = meta.next_seq,
            "ledger restored"
        );
        Ok(Self {
            config,
            clock,
            high_water: AtomicU64::new(meta.last_timestamp),
            next_seq: AtomicU64::new(meta.next_seq),
            accounts: RwLock::new(accounts),
            registered: RwLock::new(registered),
        })
    }
}

/// Writes `value` as pretty JSON next to `path` and renames it into place.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LedgerError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn compute_merkle_root(
    accounts: &BTreeMap<AccountId, AccountHistory>,
    registered: &BTreeSet<AccountId>,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for (account, history) in accounts {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update((account.len() as u64).to_le_bytes());
        hasher.update(account.as_bytes());
        hasher.update(history.total_burned.to_le_bytes());
        for event in &history.events {
            hasher.update(event.seq.to_le_bytes());
            hasher.update(event.amount.to_le_bytes());
            hasher.update(event.timestamp.to_le_bytes());
        }
        leaves.push(hasher.finalize().into());
    }
    for account in registered {
        let mut hasher = Sha256::new();
        hasher.update(b"reg");
        hasher.update(account.as_bytes());
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"burn-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

pub(crate) mod hex_root {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("merkle root must be 32 bytes"))
    }
}
