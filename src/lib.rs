//! Burn-and-reward ledger.
//!
//! Accounts submit burns; every burn becomes an immutable [`BurnEvent`] and
//! turns into one reward unit once its maturation window has elapsed.
//!
//! * [`ledger`] — the append-only ledger, reward derivation and snapshots.
//! * [`clock`] — wall-clock and manual time sources.
//! * [`contracts`] — contract-shaped facade with an implicit caller.
//! * [`config`] — maturation window and lookup/registration policies.

pub mod clock;
pub mod config;
pub mod contracts;
pub mod ledger;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::{ConfigError, LedgerConfig, LookupPolicy, RegistrationPolicy};
pub use contracts::{BurnContract, CallContext, ContractAction, ContractError, ContractOutcome};
pub use ledger::{
    AccountHistory, AccountId, Amount, BurnEvent, BurnLedger, BurnStatus, LedgerError,
    LedgerSnapshot, LedgerStatus,
};
