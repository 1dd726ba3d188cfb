use serde::{Deserialize, Serialize};

use crate::ledger::Amount;

pub const BPS_DENOMINATOR: u128 = 10_000;

pub const TOTAL_FEE_BPS: u128 = 400;
pub const LIQUIDITY_FEE_BPS: u128 = 200;
pub const DEV_FEE_BPS: u128 = 100;
pub const HOLDER_FEE_BPS: u128 = 100;

pub const MAX_TX_BPS: u128 = 100;
pub const MAX_WALLET_BPS: u128 = 200;

pub const SECONDS_PER_DAY: u64 = 86_400;
pub const LIQUIDITY_LOCK_DURATION: u64 = 730 * SECONDS_PER_DAY;
pub const PAUSE_COOLDOWN: u64 = 48 * 3_600;

pub const MAX_DECIMALS: u8 = 30;

/// How a taxed transfer's gross amount is split between the parties.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeSplit {
    pub total: Amount,
    pub liquidity: Amount,
    pub dev: Amount,
    /// Remainder of the fee after the liquidity and dev shares; absorbs rounding.
    pub holders: Amount,
    pub net: Amount,
}

impl FeeSplit {
    pub fn compute(amount: Amount) -> Option<Self> {
        let total = amount.checked_mul(TOTAL_FEE_BPS)? / BPS_DENOMINATOR;
        let liquidity = total * LIQUIDITY_FEE_BPS / TOTAL_FEE_BPS;
        let dev = total * DEV_FEE_BPS / TOTAL_FEE_BPS;
        let holders = total - liquidity - dev;
        Some(Self {
            total,
            liquidity,
            dev,
            holders,
            net: amount - total,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferLimits {
    pub max_tx: Amount,
    pub max_wallet: Amount,
}

impl TransferLimits {
    pub fn for_supply(total_supply: Amount) -> Self {
        // supply * bps / 10_000 without the intermediate product
        Self {
            max_tx: total_supply / BPS_DENOMINATOR * MAX_TX_BPS
                + total_supply % BPS_DENOMINATOR * MAX_TX_BPS / BPS_DENOMINATOR,
            max_wallet: total_supply / BPS_DENOMINATOR * MAX_WALLET_BPS
                + total_supply % BPS_DENOMINATOR * MAX_WALLET_BPS / BPS_DENOMINATOR,
        }
    }
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("token {0} must not be empty")]
    Empty(&'static str),
    #[error("decimals {0} exceed the supported maximum of {max}", max = MAX_DECIMALS)]
    TooManyDecimals(u8),
    #[error("initial supply must be positive")]
    ZeroSupply,
    #[error("initial supply overflows the fee arithmetic")]
    SupplyTooLarge,
}

/// Token metadata and initial supply, loadable from JSON.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Whole tokens; scaled by `10^decimals` at deployment.
    pub initial_supply: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "Fairlaunch".into(),
            symbol: "FAIR".into(),
            decimals: 18,
            initial_supply: 1_000_000_000,
        }
    }
}

impl TokenConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Empty("name"));
        }
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Empty("symbol"));
        }
        if self.decimals > MAX_DECIMALS {
            return Err(ConfigError::TooManyDecimals(self.decimals));
        }
        if self.initial_supply == 0 {
            return Err(ConfigError::ZeroSupply);
        }
        self.total_supply().map(|_| ())
    }

    /// Supply in base units. Bounded so `amount * TOTAL_FEE_BPS` never overflows.
    pub fn total_supply(&self) -> Result<Amount, ConfigError> {
        let scale = 10u128
            .checked_pow(self.decimals as u32)
            .ok_or(ConfigError::TooManyDecimals(self.decimals))?;
        let supply = (self.initial_supply as u128)
            .checked_mul(scale)
            .ok_or(ConfigError::SupplyTooLarge)?;
        if supply > u128::MAX / TOTAL_FEE_BPS {
            return Err(ConfigError::SupplyTooLarge);
        }
        Ok(supply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_split_matches_reference_amounts() {
        let split = FeeSplit::compute(1_000).unwrap();
        assert_eq!(split.total, 40);
        assert_eq!(split.liquidity, 20);
        assert_eq!(split.dev, 10);
        assert_eq!(split.holders, 10);
        assert_eq!(split.net, 960);
    }

    #[test]
    fn fee_split_rounding_lands_in_holder_share() {
        // 4% of 99 = 3 (floor); 3 * 200/400 = 1, 3 * 100/400 = 0
        let split = FeeSplit::compute(99).unwrap();
        assert_eq!(split.total, 3);
        assert_eq!(split.liquidity, 1);
        assert_eq!(split.dev, 0);
        assert_eq!(split.holders, 2);
        assert_eq!(split.net + split.liquidity + split.dev + split.holders, 99);
    }

    #[test]
    fn small_amounts_pay_no_fee() {
        let split = FeeSplit::compute(24).unwrap();
        assert_eq!(split.total, 0);
        assert_eq!(split.net, 24);
        assert!(FeeSplit::compute(u128::MAX).is_none());
    }

    #[test]
    fn limits_are_one_and_two_percent() {
        let limits = TransferLimits::for_supply(1_000_000);
        assert_eq!(limits.max_tx, 10_000);
        assert_eq!(limits.max_wallet, 20_000);
    }

    #[test]
    fn default_config_is_valid() {
        let config = TokenConfig::default();
        config.validate().unwrap();
        assert_eq!(
            config.total_supply().unwrap(),
            1_000_000_000u128 * 10u128.pow(18)
        );
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let mut config = TokenConfig {
            symbol: " ".into(),
            ..TokenConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Empty("symbol")));
        config.symbol = "FAIR".into();
        config.decimals = 31;
        assert_eq!(config.validate(), Err(ConfigError::TooManyDecimals(31)));
        config.decimals = 30;
        config.initial_supply = u64::MAX;
        assert_eq!(config.validate(), Err(ConfigError::SupplyTooLarge));
        config.initial_supply = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroSupply));
    }

    #[test]
    fn partial_config_json_falls_back_to_defaults() {
        let config: TokenConfig = serde_json::from_str(r#"{"symbol":"LOCK"}"#).unwrap();
        assert_eq!(config.symbol, "LOCK");
        assert_eq!(config.decimals, 18);
    }
}
