use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::ledger::{
    parse_amount, snapshot, AccountId, Amount, BurnEvent, BurnLedger, LedgerError,
    LedgerSnapshot, LedgerStatus,
};

/// Identity of whoever submitted a call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallContext {
    pub caller: AccountId,
}

impl CallContext {
    pub fn new(caller: impl Into<AccountId>) -> Self {
        Self {
            caller: caller.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContractAction {
    Initialize { owner: AccountId },
    Register { account: AccountId },
    Burn { amount: i128 },
    RewardsCount { account: AccountId },
    ClaimList { account: AccountId },
    Pending { account: AccountId },
    Status,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContractOutcome {
    Initialized {
        owner: AccountId,
    },
    Registered {
        account: AccountId,
        newly_registered: bool,
    },
    Burned {
        event: BurnEvent,
    },
    RewardsCount {
        account: AccountId,
        count: u64,
    },
    Claims {
        account: AccountId,
        events: Vec<BurnEvent>,
    },
    Pending {
        account: AccountId,
        events: Vec<BurnEvent>,
    },
    Status {
        status: LedgerStatus,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("contract already initialized with owner {owner}")]
    AlreadyInitialized { owner: AccountId },
    #[error("{caller} is not the contract owner")]
    Unauthorized { caller: AccountId },
}

/// Persisted form of a [`BurnContract`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractState {
    pub owner: Option<AccountId>,
    pub ledger: LedgerSnapshot,
}

impl ContractState {
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        snapshot::write_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        snapshot::read_json(path)
    }
}

/// Contract-shaped front of a [`BurnLedger`]: the caller of `burn` is taken
/// from the call context instead of being passed explicitly.
pub struct BurnContract<C: Clock> {
    owner: RwLock<Option<AccountId>>,
    ledger: BurnLedger<C>,
}

impl<C: Clock> BurnContract<C> {
    pub fn new(ledger: BurnLedger<C>) -> Self {
        Self {
            owner: RwLock::new(None),
            ledger,
        }
    }

    pub fn restore(
        state: ContractState,
        config: LedgerConfig,
        clock: C,
    ) -> Result<Self, ContractError> {
        let ledger = BurnLedger::restore(state.ledger, config, clock)?;
        Ok(Self {
            owner: RwLock::new(state.owner),
            ledger,
        })
    }

    pub fn state(&self) -> ContractState {
        ContractState {
            owner: self.owner(),
            ledger: self.ledger.snapshot(),
        }
    }

    pub fn ledger(&self) -> &BurnLedger<C> {
        &self.ledger
    }

    pub fn owner(&self) -> Option<AccountId> {
        self.owner.read().clone()
    }

    /// One-shot owner assignment.
    pub fn initialize(&self, ctx: &CallContext, owner: AccountId) -> Result<(), ContractError> {
        if owner.is_empty() {
            return Err(LedgerError::EmptyAccount.into());
        }
        let mut slot = self.owner.write();
        if let Some(existing) = slot.as_ref() {
            warn!(caller = %ctx.caller, "repeated initialize");
            return Err(ContractError::AlreadyInitialized {
                owner: existing.clone(),
            });
        }
        info!(caller = %ctx.caller, owner = %owner, "contract initialized");
        *slot = Some(owner);
        Ok(())
    }

    pub fn register(&self, ctx: &CallContext, account: &str) -> Result<bool, ContractError> {
        if let Some(owner) = self.owner.read().as_ref() {
            if owner != &ctx.caller {
                warn!(caller = %ctx.caller, account, "unauthorized register");
                return Err(ContractError::Unauthorized {
                    caller: ctx.caller.clone(),
                });
            }
        }
        Ok(self.ledger.register(account)?)
    }

    pub fn burn(&self, ctx: &CallContext, amount: Amount) -> Result<BurnEvent, ContractError> {
        Ok(self.ledger.burn(&ctx.caller, amount)?)
    }

    pub fn rewards_count(&self, account: &str) -> Result<u64, ContractError> {
        Ok(self.ledger.rewards_count(account)?)
    }

    pub fn claim_list(&self, account: &str) -> Result<Vec<BurnEvent>, ContractError> {
        Ok(self.ledger.claim_list(account)?)
    }

    /// Diagnostic accessor.
    pub fn t1(&self) -> LedgerStatus {
        self.ledger.status()
    }

    pub fn apply_action(
        &self,
        ctx: &CallContext,
        action: ContractAction,
    ) -> Result<ContractOutcome, ContractError> {
        match action {
            ContractAction::Initialize { owner } => {
                self.initialize(ctx, owner.clone())?;
                Ok(ContractOutcome::Initialized { owner })
            }
            ContractAction::Register { account } => {
                let newly_registered = self.register(ctx, &account)?;
                Ok(ContractOutcome::Registered {
                    account,
                    newly_registered,
                })
            }
            ContractAction::Burn { amount } => {
                let amount = parse_amount(amount).map_err(|err| {
                    warn!(caller = %ctx.caller, %err, "rejected burn");
                    err
                })?;
                let event = self.burn(ctx, amount)?;
                Ok(ContractOutcome::Burned { event })
            }
            ContractAction::RewardsCount { account } => {
                let count = self.rewards_count(&account)?;
                Ok(ContractOutcome::RewardsCount { account, count })
            }
            ContractAction::ClaimList { account } => {
                let events = self.claim_list(&account)?;
                Ok(ContractOutcome::Claims { account, events })
            }
            ContractAction::Pending { account } => {
                let events = self.ledger().pending(&account)?;
                Ok(ContractOutcome::Pending { account, events })
            }
            ContractAction::Status => Ok(ContractOutcome::Status { status: self.t1() }),
        }
    }
}
