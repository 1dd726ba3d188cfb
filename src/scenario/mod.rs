//! Host environment: replays calls one at a time against a ledger, committing
//! each call's effects only when the whole call succeeds.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::identity::Address;
use crate::ledger::{
    Amount, CallContext, LedgerError, LedgerEvent, LedgerSnapshot, Timestamp, TokenLedger,
};
use crate::policy::TokenConfig;

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("deployment failed: {0}")]
    Deploy(#[source] LedgerError),
    #[error("ledger invariant broken after step {step}: {source}")]
    Ledger {
        step: usize,
        #[source]
        source: LedgerError,
    },
    #[error("step {step} at {at} is earlier than previous time {previous}")]
    TimeWentBackwards {
        step: usize,
        at: Timestamp,
        previous: Timestamp,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerCall {
    Transfer {
        to: Address,
        #[serde(with = "crate::ledger::serde_amount")]
        amount: Amount,
    },
    TransferFrom {
        from: Address,
        to: Address,
        #[serde(with = "crate::ledger::serde_amount")]
        amount: Amount,
    },
    Approve {
        spender: Address,
        #[serde(with = "crate::ledger::serde_amount")]
        amount: Amount,
    },
    DistributeTokens {
        recipients: Vec<Address>,
        #[serde(with = "crate::ledger::serde_amount::vec")]
        amounts: Vec<Amount>,
    },
    LockLiquidity {
        #[serde(with = "crate::ledger::serde_amount")]
        amount: Amount,
        target: Address,
    },
    EnableTrading,
    RemoveLimits,
    EmergencyPause {
        paused: bool,
    },
    SetBlacklist {
        account: Address,
        blacklisted: bool,
    },
    RenounceOwnership,
}

impl LedgerCall {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCall::Transfer { .. } => "transfer",
            LedgerCall::TransferFrom { .. } => "transfer_from",
            LedgerCall::Approve { .. } => "approve",
            LedgerCall::DistributeTokens { .. } => "distribute_tokens",
            LedgerCall::LockLiquidity { .. } => "lock_liquidity",
            LedgerCall::EnableTrading => "enable_trading",
            LedgerCall::RemoveLimits => "remove_limits",
            LedgerCall::EmergencyPause { .. } => "emergency_pause",
            LedgerCall::SetBlacklist { .. } => "set_blacklist",
            LedgerCall::RenounceOwnership => "renounce_ownership",
        }
    }

    fn apply(&self, ledger: &mut TokenLedger, ctx: &CallContext) -> Result<(), LedgerError> {
        match self {
            LedgerCall::Transfer { to, amount } => ledger.transfer(ctx, *to, *amount).map(|_| ()),
            LedgerCall::TransferFrom { from, to, amount } => {
                ledger.transfer_from(ctx, *from, *to, *amount).map(|_| ())
            }
            LedgerCall::Approve { spender, amount } => ledger.approve(ctx, *spender, *amount),
            LedgerCall::DistributeTokens {
                recipients,
                amounts,
            } => ledger.distribute_tokens(ctx, recipients, amounts),
            LedgerCall::LockLiquidity { amount, target } => {
                ledger.lock_liquidity(ctx, *amount, *target)
            }
            LedgerCall::EnableTrading => ledger.enable_trading(ctx),
            LedgerCall::RemoveLimits => ledger.remove_limits(ctx),
            LedgerCall::EmergencyPause { paused } => ledger.emergency_pause(ctx, *paused),
            LedgerCall::SetBlacklist {
                account,
                blacklisted,
            } => ledger.set_blacklist(ctx, *account, *blacklisted),
            LedgerCall::RenounceOwnership => ledger.renounce_ownership(ctx),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub caller: Address,
    pub at: Timestamp,
    pub call: LedgerCall,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scenario {
    #[serde(default)]
    pub config: Option<TokenConfig>,
    pub deployer: Address,
    pub contract: Address,
    pub dev_wallet: Address,
    pub liquidity_wallet: Address,
    #[serde(default)]
    pub deployed_at: Timestamp,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Accepted { events: Vec<LedgerEvent> },
    Rejected { reason: String },
}

impl StepOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, StepOutcome::Accepted { .. })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepReport {
    pub index: usize,
    pub caller: Address,
    pub at: Timestamp,
    pub call: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioReport {
    pub outcomes: Vec<StepReport>,
    pub snapshot: LedgerSnapshot,
}

impl ScenarioReport {
    pub fn accepted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|step| step.outcome.is_accepted())
            .count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes.len() - self.accepted()
    }
}

/// Owns the ledger and serializes access to it: one call, one exclusive borrow.
pub struct Host {
    ledger: TokenLedger,
    clock: Timestamp,
}

impl Host {
    pub fn new(ledger: TokenLedger, clock: Timestamp) -> Self {
        Self { ledger, clock }
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn into_ledger(self) -> TokenLedger {
        self.ledger
    }

    /// Runs `step.call` against a copy of the ledger and keeps the copy only
    /// if the call succeeded. A failed call leaves no trace.
    pub fn execute(&mut self, index: usize, step: &Step) -> Result<StepOutcome, ScenarioError> {
        if step.at < self.clock {
            return Err(ScenarioError::TimeWentBackwards {
                step: index,
                at: step.at,
                previous: self.clock,
            });
        }
        self.clock = step.at;

        let ctx = CallContext::new(step.caller, step.at);
        let mut working = self.ledger.clone();
        let seen = working.events().len();
        match step.call.apply(&mut working, &ctx) {
            Ok(()) => {
                working
                    .verify_conservation()
                    .map_err(|source| ScenarioError::Ledger {
                        step: index,
                        source,
                    })?;
                let events = working.events()[seen..].to_vec();
                self.ledger = working;
                info!(
                    step = index,
                    call = step.call.name(),
                    caller = %step.caller,
                    events = events.len(),
                    "accepted"
                );
                Ok(StepOutcome::Accepted { events })
            }
            Err(err) => {
                warn!(
                    step = index,
                    call = step.call.name(),
                    caller = %step.caller,
                    error = %err,
                    "rejected"
                );
                Ok(StepOutcome::Rejected {
                    reason: err.to_string(),
                })
            }
        }
    }
}

pub fn run_scenario(scenario: &Scenario) -> Result<ScenarioReport, ScenarioError> {
    let config = scenario.config.clone().unwrap_or_default();
    let ctx = CallContext::new(scenario.deployer, scenario.deployed_at);
    let ledger = TokenLedger::deploy(
        &config,
        &ctx,
        scenario.contract,
        scenario.dev_wallet,
        scenario.liquidity_wallet,
    )
    .map_err(ScenarioError::Deploy)?;

    let mut host = Host::new(ledger, scenario.deployed_at);
    let mut outcomes = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let outcome = host.execute(index, step)?;
        outcomes.push(StepReport {
            index,
            caller: step.caller,
            at: step.at,
            call: step.call.name().to_string(),
            outcome,
        });
    }
    Ok(ScenarioReport {
        outcomes,
        snapshot: host.ledger().snapshot(),
    })
}
