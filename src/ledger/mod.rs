use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::identity::Address;
use crate::policy::{
    ConfigError, FeeSplit, TokenConfig, TransferLimits, LIQUIDITY_LOCK_DURATION, PAUSE_COOLDOWN,
};

pub type Amount = u128;
/// Seconds, as reported by the host.
pub type Timestamp = u64;

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("caller {caller} is not the owner")]
    Unauthorized { caller: Address },
    #[error("null address not allowed")]
    InvalidAddress,
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("{recipients} recipients but {amounts} amounts")]
    LengthMismatch { recipients: usize, amounts: usize },
    #[error("liquidity is already locked")]
    AlreadyLocked,
    #[error("trading is already enabled")]
    TradingAlreadyEnabled,
    #[error("liquidity is not locked")]
    LiquidityNotLocked,
    #[error("trading is not enabled")]
    TradingNotEnabled,
    #[error("contract is paused")]
    ContractPaused,
    #[error("account {account} is blacklisted")]
    Blacklisted { account: Address },
    #[error("trading is disabled")]
    TradingDisabled,
    #[error("amount {amount} exceeds max transaction amount {max}")]
    ExceedsMaxTx { amount: Amount, max: Amount },
    #[error("resulting balance {resulting} exceeds max wallet amount {max}")]
    ExceedsMaxWallet { resulting: Amount, max: Amount },
    #[error("insufficient balance in {account}: have {have}, need {need}")]
    InsufficientBalance {
        account: Address,
        have: Amount,
        need: Amount,
    },
    #[error("insufficient allowance from {owner} to {spender}: have {have}, need {need}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        have: Amount,
        need: Amount,
    },
    #[error("pause cooldown active for another {remaining}s")]
    PauseCooldownActive { remaining: u64 },
    #[error("cannot blacklist the token contract")]
    CannotBlacklistSelf,
    #[error("cannot blacklist the owner")]
    CannotBlacklistOwner,
    #[error("reentrant call rejected")]
    Reentrancy,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("conservation violated: balances sum to {sum}, supply is {supply}")]
    ConservationViolated { sum: Amount, supply: Amount },
    #[error("invalid token config: {0}")]
    InvalidConfig(#[from] ConfigError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Who is calling and when. Supplied by the host for every call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub now: Timestamp,
}

impl CallContext {
    pub fn new(caller: Address, now: Timestamp) -> Self {
        Self { caller, now }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Account {
    #[serde(with = "crate::ledger::serde_amount")]
    pub balance: Amount,
    pub excluded_from_fees: bool,
    pub excluded_from_limits: bool,
    pub blacklisted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Allocation {
    pub recipient: Address,
    #[serde(with = "crate::ledger::serde_amount")]
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Emission {
        to: Address,
        #[serde(with = "crate::ledger::serde_amount")]
        amount: Amount,
    },
    Transfer {
        from: Address,
        to: Address,
        #[serde(with = "crate::ledger::serde_amount")]
        amount: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        #[serde(with = "crate::ledger::serde_amount")]
        amount: Amount,
    },
    FeesCollected {
        from: Address,
        #[serde(with = "crate::ledger::serde_amount")]
        liquidity: Amount,
        #[serde(with = "crate::ledger::serde_amount")]
        dev: Amount,
        #[serde(with = "crate::ledger::serde_amount")]
        holders: Amount,
    },
    TokensDistributed {
        recipients: Vec<Allocation>,
    },
    LiquidityLocked {
        target: Address,
        #[serde(with = "crate::ledger::serde_amount")]
        amount: Amount,
        unlock_time: Timestamp,
    },
    TradingEnabled {
        at: Timestamp,
    },
    LimitsRemoved,
    PauseChanged {
        paused: bool,
        at: Timestamp,
    },
    BlacklistUpdated {
        account: Address,
        blacklisted: bool,
    },
    OwnershipRenounced {
        previous_owner: Address,
    },
}

/// Outcome of a transfer that went through the policy pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferReceipt {
    pub from: Address,
    pub to: Address,
    pub gross: Amount,
    /// Amount credited to `to`.
    pub net: Amount,
    pub fees: Option<FeeSplit>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowanceEntry {
    pub owner: Address,
    pub spender: Address,
    #[serde(with = "crate::ledger::serde_amount")]
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(with = "crate::ledger::serde_amount")]
    pub total_supply: Amount,
    pub contract: Address,
    pub owner: Option<Address>,
    pub dev_wallet: Address,
    pub liquidity_wallet: Address,
    pub trading_enabled: bool,
    pub limits_enabled: bool,
    pub paused: bool,
    pub pause_activated_at: Option<Timestamp>,
    pub liquidity_lock_target: Option<Address>,
    pub liquidity_lock_end_time: Option<Timestamp>,
    #[serde(with = "crate::ledger::serde_amount")]
    pub holder_fees_accrued: Amount,
    pub accounts: BTreeMap<Address, Account>,
    pub allowances: Vec<AllowanceEntry>,
    pub event_count: usize,
    pub state_root: String,
}

/// The whole token: balances, flags and policy, mutated only through its methods.
#[derive(Clone, Debug)]
pub struct TokenLedger {
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: Amount,
    limits: TransferLimits,
    contract: Address,
    owner: Option<Address>,
    dev_wallet: Address,
    liquidity_wallet: Address,
    liquidity_lock_target: Option<Address>,
    liquidity_lock_end_time: Option<Timestamp>,
    trading_enabled: bool,
    limits_enabled: bool,
    paused: bool,
    pause_activated_at: Option<Timestamp>,
    holder_fees_accrued: Amount,
    accounts: BTreeMap<Address, Account>,
    allowances: BTreeMap<(Address, Address), Amount>,
    events: Vec<LedgerEvent>,
    entered: bool,
}

impl TokenLedger {
    /// Mints the full supply to `contract` and makes `ctx.caller` the owner.
    pub fn deploy(
        config: &TokenConfig,
        ctx: &CallContext,
        contract: Address,
        dev_wallet: Address,
        liquidity_wallet: Address,
    ) -> LedgerResult<Self> {
        if [ctx.caller, contract, dev_wallet, liquidity_wallet]
            .iter()
            .any(Address::is_null)
        {
            return Err(LedgerError::InvalidAddress);
        }
        config.validate()?;
        let total_supply = config.total_supply()?;

        let mut ledger = Self {
            name: config.name.clone(),
            symbol: config.symbol.clone(),
            decimals: config.decimals,
            total_supply,
            limits: TransferLimits::for_supply(total_supply),
            contract,
            owner: Some(ctx.caller),
            dev_wallet,
            liquidity_wallet,
            liquidity_lock_target: None,
            liquidity_lock_end_time: None,
            trading_enabled: false,
            limits_enabled: true,
            paused: false,
            pause_activated_at: None,
            holder_fees_accrued: 0,
            accounts: BTreeMap::new(),
            allowances: BTreeMap::new(),
            events: Vec::new(),
            entered: false,
        };
        for exempt in [contract, ctx.caller, dev_wallet, liquidity_wallet] {
            let account = ledger.account_mut(exempt);
            account.excluded_from_fees = true;
            account.excluded_from_limits = true;
        }
        ledger.credit(contract, total_supply)?;
        ledger.events.push(LedgerEvent::Emission {
            to: contract,
            amount: total_supply,
        });
        info!(
            symbol = %ledger.symbol,
            supply = %total_supply,
            owner = %ctx.caller,
            "token deployed"
        );
        Ok(ledger)
    }

    /// Moves pre-launch allocations out of the contract balance, fee and limit free.
    pub fn distribute_tokens(
        &mut self,
        ctx: &CallContext,
        recipients: &[Address],
        amounts: &[Amount],
    ) -> LedgerResult<()> {
        self.non_reentrant(|ledger| {
            ledger.only_owner(ctx)?;
            if ledger.trading_enabled {
                return Err(LedgerError::TradingAlreadyEnabled);
            }
            if recipients.len() != amounts.len() {
                return Err(LedgerError::LengthMismatch {
                    recipients: recipients.len(),
                    amounts: amounts.len(),
                });
            }
            if recipients.iter().any(Address::is_null) {
                return Err(LedgerError::InvalidAddress);
            }

            // Dry run first so a shortfall at index n leaves indices 0..n untouched.
            let contract = ledger.contract;
            let mut available = ledger.balance_of(contract);
            for (recipient, &amount) in recipients.iter().zip(amounts) {
                if amount > available {
                    return Err(LedgerError::InsufficientBalance {
                        account: contract,
                        have: available,
                        need: amount,
                    });
                }
                if *recipient != contract {
                    available -= amount;
                }
            }

            for (recipient, &amount) in recipients.iter().zip(amounts) {
                ledger.move_balance(contract, *recipient, amount)?;
            }
            ledger.events.push(LedgerEvent::TokensDistributed {
                recipients: recipients
                    .iter()
                    .zip(amounts)
                    .map(|(recipient, &amount)| Allocation {
                        recipient: *recipient,
                        amount,
                    })
                    .collect(),
            });
            info!(recipients = recipients.len(), "tokens distributed");
            Ok(())
        })
    }

    pub fn lock_liquidity(
        &mut self,
        ctx: &CallContext,
        amount: Amount,
        target: Address,
    ) -> LedgerResult<()> {
        self.only_owner(ctx)?;
        if self.liquidity_lock_end_time.is_some() {
            return Err(LedgerError::AlreadyLocked);
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if target.is_null() {
            return Err(LedgerError::InvalidAddress);
        }
        let unlock_time = ctx
            .now
            .checked_add(LIQUIDITY_LOCK_DURATION)
            .ok_or(LedgerError::Overflow)?;

        self.move_balance(self.contract, target, amount)?;
        self.liquidity_lock_target = Some(target);
        self.liquidity_lock_end_time = Some(unlock_time);
        self.events.push(LedgerEvent::LiquidityLocked {
            target,
            amount,
            unlock_time,
        });
        info!(%target, %amount, unlock_time, "liquidity locked");
        Ok(())
    }

    pub fn enable_trading(&mut self, ctx: &CallContext) -> LedgerResult<()> {
        self.only_owner(ctx)?;
        if self.trading_enabled {
            return Err(LedgerError::TradingAlreadyEnabled);
        }
        if self.liquidity_lock_end_time.is_none() {
            return Err(LedgerError::LiquidityNotLocked);
        }
        self.trading_enabled = true;
        self.events.push(LedgerEvent::TradingEnabled { at: ctx.now });
        info!(at = ctx.now, "trading enabled");
        Ok(())
    }

    pub fn remove_limits(&mut self, ctx: &CallContext) -> LedgerResult<()> {
        self.only_owner(ctx)?;
        self.limits_enabled = false;
        self.events.push(LedgerEvent::LimitsRemoved);
        info!("transfer limits removed");
        Ok(())
    }

    /// Pausing is throttled by [`PAUSE_COOLDOWN`]; unpausing never is.
    pub fn emergency_pause(&mut self, ctx: &CallContext, paused: bool) -> LedgerResult<()> {
        self.only_owner(ctx)?;
        if paused {
            if let Some(last) = self.pause_activated_at {
                let elapsed = ctx.now.saturating_sub(last);
                if elapsed < PAUSE_COOLDOWN {
                    return Err(LedgerError::PauseCooldownActive {
                        remaining: PAUSE_COOLDOWN - elapsed,
                    });
                }
            }
            self.pause_activated_at = Some(ctx.now);
        }
        self.paused = paused;
        self.events.push(LedgerEvent::PauseChanged {
            paused,
            at: ctx.now,
        });
        info!(paused, at = ctx.now, "pause state changed");
        Ok(())
    }

    pub fn set_blacklist(
        &mut self,
        ctx: &CallContext,
        account: Address,
        blacklisted: bool,
    ) -> LedgerResult<()> {
        let owner = self.only_owner(ctx)?;
        if account == self.contract {
            return Err(LedgerError::CannotBlacklistSelf);
        }
        if account == owner {
            return Err(LedgerError::CannotBlacklistOwner);
        }
        self.account_mut(account).blacklisted = blacklisted;
        self.events.push(LedgerEvent::BlacklistUpdated {
            account,
            blacklisted,
        });
        info!(%account, blacklisted, "blacklist updated");
        Ok(())
    }

    /// Terminal: no owner-gated operation succeeds afterwards.
    pub fn renounce_ownership(&mut self, ctx: &CallContext) -> LedgerResult<()> {
        let previous_owner = self.only_owner(ctx)?;
        if !self.trading_enabled {
            return Err(LedgerError::TradingNotEnabled);
        }
        if self.liquidity_lock_end_time.is_none() {
            return Err(LedgerError::LiquidityNotLocked);
        }
        self.owner = None;
        self.events
            .push(LedgerEvent::OwnershipRenounced { previous_owner });
        info!(%previous_owner, "ownership renounced");
        Ok(())
    }

    pub fn transfer(
        &mut self,
        ctx: &CallContext,
        to: Address,
        amount: Amount,
    ) -> LedgerResult<TransferReceipt> {
        self.transfer_between(ctx.caller, to, amount)
    }

    pub fn approve(
        &mut self,
        ctx: &CallContext,
        spender: Address,
        amount: Amount,
    ) -> LedgerResult<()> {
        if ctx.caller.is_null() || spender.is_null() {
            return Err(LedgerError::InvalidAddress);
        }
        self.allowances.insert((ctx.caller, spender), amount);
        self.events.push(LedgerEvent::Approval {
            owner: ctx.caller,
            spender,
            amount,
        });
        Ok(())
    }

    /// Spends `ctx.caller`'s allowance over `from`. `Amount::MAX` allowances are not decremented.
    pub fn transfer_from(
        &mut self,
        ctx: &CallContext,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> LedgerResult<TransferReceipt> {
        let allowed = self.allowance(from, ctx.caller);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: from,
                spender: ctx.caller,
                have: allowed,
                need: amount,
            });
        }
        let receipt = self.transfer_between(from, to, amount)?;
        if allowed != Amount::MAX {
            self.allowances.insert((from, ctx.caller), allowed - amount);
        }
        Ok(receipt)
    }

    /// The policy pipeline every public balance move runs through:
    /// address check, pause, blacklist, trading gate, limits, balance, fee split.
    ///
    /// No authorization check is made on `from`: anyone holding `&mut TokenLedger`
    /// can move funds out of any account through this method. Hosts exposing the
    /// ledger to untrusted callers must route them through [`TokenLedger::transfer`]
    /// or [`TokenLedger::transfer_from`]. Validation completes before any balance
    /// changes, so a rejected transfer changes nothing.
    pub fn transfer_between(
        &mut self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> LedgerResult<TransferReceipt> {
        if from.is_null() || to.is_null() {
            return Err(LedgerError::InvalidAddress);
        }
        if self.paused {
            return Err(LedgerError::ContractPaused);
        }
        for party in [from, to] {
            if self.is_blacklisted(party) {
                return Err(LedgerError::Blacklisted { account: party });
            }
        }
        if !self.trading_enabled {
            let owner_involved = self.owner.is_some_and(|owner| owner == from || owner == to);
            if !owner_involved && from != self.contract {
                return Err(LedgerError::TradingDisabled);
            }
        }
        if self.limits_enabled
            && !self.is_excluded_from_limits(from)
            && !self.is_excluded_from_limits(to)
        {
            if amount > self.limits.max_tx {
                return Err(LedgerError::ExceedsMaxTx {
                    amount,
                    max: self.limits.max_tx,
                });
            }
            if to != self.contract {
                let resulting = self
                    .balance_of(to)
                    .checked_add(amount)
                    .ok_or(LedgerError::Overflow)?;
                if resulting > self.limits.max_wallet {
                    return Err(LedgerError::ExceedsMaxWallet {
                        resulting,
                        max: self.limits.max_wallet,
                    });
                }
            }
        }
        let have = self.balance_of(from);
        if have < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from,
                have,
                need: amount,
            });
        }

        let taxed = self.trading_enabled
            && !self.is_excluded_from_fees(from)
            && !self.is_excluded_from_fees(to)
            && from != self.contract
            && to != self.contract;
        if !taxed {
            self.move_balance(from, to, amount)?;
            debug!(%from, %to, %amount, "transfer");
            return Ok(TransferReceipt {
                from,
                to,
                gross: amount,
                net: amount,
                fees: None,
            });
        }

        let split = FeeSplit::compute(amount).ok_or(LedgerError::Overflow)?;
        self.move_balance(from, to, split.net)?;
        for (recipient, share) in [
            (self.liquidity_wallet, split.liquidity),
            (self.dev_wallet, split.dev),
            (self.contract, split.holders),
        ] {
            if share > 0 {
                self.move_balance(from, recipient, share)?;
            }
        }
        self.holder_fees_accrued = self
            .holder_fees_accrued
            .checked_add(split.holders)
            .ok_or(LedgerError::Overflow)?;
        self.events.push(LedgerEvent::FeesCollected {
            from,
            liquidity: split.liquidity,
            dev: split.dev,
            holders: split.holders,
        });
        debug!(%from, %to, %amount, fee = %split.total, "taxed transfer");
        Ok(TransferReceipt {
            from,
            to,
            gross: amount,
            net: split.net,
            fees: Some(split),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn contract_address(&self) -> Address {
        self.contract
    }

    pub fn owner(&self) -> Option<Address> {
        self.owner
    }

    pub fn dev_wallet(&self) -> Address {
        self.dev_wallet
    }

    pub fn liquidity_wallet(&self) -> Address {
        self.liquidity_wallet
    }

    pub fn balance_of(&self, account: Address) -> Amount {
        self.accounts
            .get(&account)
            .map(|acct| acct.balance)
            .unwrap_or(0)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_blacklisted(&self, account: Address) -> bool {
        self.accounts
            .get(&account)
            .is_some_and(|acct| acct.blacklisted)
    }

    pub fn is_excluded_from_fees(&self, account: Address) -> bool {
        self.accounts
            .get(&account)
            .is_some_and(|acct| acct.excluded_from_fees)
    }

    pub fn is_excluded_from_limits(&self, account: Address) -> bool {
        self.accounts
            .get(&account)
            .is_some_and(|acct| acct.excluded_from_limits)
    }

    pub fn trading_enabled(&self) -> bool {
        self.trading_enabled
    }

    pub fn limits_enabled(&self) -> bool {
        self.limits_enabled
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn pause_activated_at(&self) -> Option<Timestamp> {
        self.pause_activated_at
    }

    pub fn liquidity_lock_target(&self) -> Option<Address> {
        self.liquidity_lock_target
    }

    pub fn liquidity_lock_end_time(&self) -> Option<Timestamp> {
        self.liquidity_lock_end_time
    }

    pub fn is_liquidity_locked(&self, now: Timestamp) -> bool {
        self.liquidity_lock_end_time.is_some_and(|end| now < end)
    }

    /// Zero when never locked or already past the unlock time.
    pub fn time_until_unlock(&self, now: Timestamp) -> u64 {
        self.liquidity_lock_end_time
            .map(|end| end.saturating_sub(now))
            .unwrap_or(0)
    }

    pub fn max_tx_amount(&self) -> Amount {
        self.limits.max_tx
    }

    pub fn max_wallet_amount(&self) -> Amount {
        self.limits.max_wallet
    }

    /// Holder-share fees retained in the contract balance.
    pub fn holder_fees_accrued(&self) -> Amount {
        self.holder_fees_accrued
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn verify_conservation(&self) -> LedgerResult<()> {
        let sum = self
            .accounts
            .values()
            .try_fold(0u128, |acc, acct| acc.checked_add(acct.balance))
            .ok_or(LedgerError::Overflow)?;
        if sum != self.total_supply {
            return Err(LedgerError::ConservationViolated {
                sum,
                supply: self.total_supply,
            });
        }
        Ok(())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            total_supply: self.total_supply,
            contract: self.contract,
            owner: self.owner,
            dev_wallet: self.dev_wallet,
            liquidity_wallet: self.liquidity_wallet,
            trading_enabled: self.trading_enabled,
            limits_enabled: self.limits_enabled,
            paused: self.paused,
            pause_activated_at: self.pause_activated_at,
            liquidity_lock_target: self.liquidity_lock_target,
            liquidity_lock_end_time: self.liquidity_lock_end_time,
            holder_fees_accrued: self.holder_fees_accrued,
            accounts: self.accounts.clone(),
            allowances: self
                .allowances
                .iter()
                .map(|(&(owner, spender), &amount)| AllowanceEntry {
                    owner,
                    spender,
                    amount,
                })
                .collect(),
            event_count: self.events.len(),
            state_root: hex::encode(self.state_root()),
        }
    }

    pub fn state_root(&self) -> [u8; 32] {
        let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(self.accounts.len() + 1);

        let mut hasher = Sha256::new();
        hasher.update(b"state");
        hasher.update(self.total_supply.to_le_bytes());
        hasher.update(self.contract.as_bytes());
        hasher.update(self.owner.unwrap_or(Address::ZERO).as_bytes());
        hasher.update([
            self.trading_enabled as u8,
            self.limits_enabled as u8,
            self.paused as u8,
        ]);
        hasher.update(self.pause_activated_at.unwrap_or(0).to_le_bytes());
        hasher.update(self.liquidity_lock_target.unwrap_or(Address::ZERO).as_bytes());
        hasher.update(self.liquidity_lock_end_time.unwrap_or(0).to_le_bytes());
        hasher.update(self.holder_fees_accrued.to_le_bytes());
        leaves.push(hasher.finalize().into());

        for (address, account) in &self.accounts {
            let mut hasher = Sha256::new();
            hasher.update(b"acct");
            hasher.update(address.as_bytes());
            hasher.update(account.balance.to_le_bytes());
            hasher.update([
                account.excluded_from_fees as u8,
                account.excluded_from_limits as u8,
                account.blacklisted as u8,
            ]);
            leaves.push(hasher.finalize().into());
        }
        for ((owner, spender), amount) in &self.allowances {
            let mut hasher = Sha256::new();
            hasher.update(b"allow");
            hasher.update(owner.as_bytes());
            hasher.update(spender.as_bytes());
            hasher.update(amount.to_le_bytes());
            leaves.push(hasher.finalize().into());
        }
        build_merkle(leaves)
    }

    fn only_owner(&self, ctx: &CallContext) -> LedgerResult<Address> {
        match self.owner {
            Some(owner) if owner == ctx.caller => Ok(owner),
            _ => Err(LedgerError::Unauthorized { caller: ctx.caller }),
        }
    }

    fn non_reentrant<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        if self.entered {
            return Err(LedgerError::Reentrancy);
        }
        self.entered = true;
        let result = op(self);
        self.entered = false;
        result
    }

    fn account_mut(&mut self, account: Address) -> &mut Account {
        self.accounts.entry(account).or_default()
    }

    fn credit(&mut self, account: Address, amount: Amount) -> LedgerResult<()> {
        let acct = self.account_mut(account);
        acct.balance = acct
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    fn debit(&mut self, account: Address, amount: Amount) -> LedgerResult<()> {
        let have = self.balance_of(account);
        if have < amount {
            return Err(LedgerError::InsufficientBalance {
                account,
                have,
                need: amount,
            });
        }
        if let Some(acct) = self.accounts.get_mut(&account) {
            acct.balance = have - amount;
        }
        Ok(())
    }

    /// Fee- and limit-free move used by the pipeline's sub-transfers and by
    /// the owner's distribution and lock paths.
    fn move_balance(&mut self, from: Address, to: Address, amount: Amount) -> LedgerResult<()> {
        self.debit(from, amount)?;
        self.credit(to, amount)?;
        self.events.push(LedgerEvent::Transfer { from, to, amount });
        Ok(())
    }
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"fairlaunch-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

/// Amounts travel as decimal strings in JSON so 18-decimal values survive
/// tagged enums and JavaScript consumers. Plain JSON integers are accepted too.
pub mod serde_amount {
    use std::fmt;

    use serde::de::{self, Unexpected, Visitor};
    use serde::{Deserializer, Serializer};

    use super::Amount;

    pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AmountVisitor)
    }

    /// Accepts `_` digit separators, e.g. `"1_000_000"`.
    pub fn parse(text: &str) -> Option<Amount> {
        let digits: String = text.trim().chars().filter(|c| *c != '_').collect();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = Amount;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
            Ok(v as Amount)
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
            Amount::try_from(v).map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
            parse(v).ok_or_else(|| E::invalid_value(Unexpected::Str(v), &self))
        }
    }

    pub mod vec {
        use serde::{Deserialize, Deserializer, Serializer};

        use super::Amount;

        #[derive(Deserialize)]
        struct Wrapped(#[serde(with = "crate::ledger::serde_amount")] Amount);

        pub fn serialize<S>(values: &[Amount], serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.collect_seq(values.iter().map(|v| v.to_string()))
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Amount>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let wrapped = Vec::<Wrapped>::deserialize(deserializer)?;
            Ok(wrapped.into_iter().map(|w| w.0).collect())
        }
    }
}
