use crate::contract::FeeSource;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    warn,
};

pub const GWEI: u128 = 1_000_000_000;

pub const DEFAULT_SPIN_GAS_LIMIT: u64 = 300_000;
pub const DEFAULT_FALLBACK_MAX_FEE: u128 = 50 * GWEI;
pub const DEFAULT_FALLBACK_PRIORITY_FEE: u128 = 2 * GWEI;
pub const DEFAULT_MIN_MAX_FEE: u128 = 20 * GWEI;
pub const DEFAULT_MIN_PRIORITY_FEE: u128 = GWEI;
pub const DEFAULT_FEE_HEADROOM_PERCENT: u128 = 120;

/// Fee parameters attached to a single spin transaction. Fees are in wei.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasPolicy {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub gas_limit: u64,
    pub fallback_max_fee_per_gas: u128,
    pub fallback_max_priority_fee_per_gas: u128,
    pub min_max_fee_per_gas: u128,
    pub min_max_priority_fee_per_gas: u128,
    pub headroom_percent: u128,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_SPIN_GAS_LIMIT,
            fallback_max_fee_per_gas: DEFAULT_FALLBACK_MAX_FEE,
            fallback_max_priority_fee_per_gas: DEFAULT_FALLBACK_PRIORITY_FEE,
            min_max_fee_per_gas: DEFAULT_MIN_MAX_FEE,
            min_max_priority_fee_per_gas: DEFAULT_MIN_PRIORITY_FEE,
            headroom_percent: DEFAULT_FEE_HEADROOM_PERCENT,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct GasPolicyEstimator {
    config: GasConfig,
}

impl GasPolicyEstimator {
    pub fn new(config: GasConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GasConfig {
        &self.config
    }

    pub fn fallback(&self) -> GasPolicy {
        GasPolicy {
            gas_limit: self.config.gas_limit,
            max_fee_per_gas: self.config.fallback_max_fee_per_gas,
            max_priority_fee_per_gas: self.config.fallback_max_priority_fee_per_gas,
        }
    }

    /// Never fails: with no source, or when the fee query errors, the
    /// fallback policy is returned.
    pub async fn estimate<F: FeeSource>(&self, source: Option<&F>) -> GasPolicy {
        let Some(source) = source else {
            warn!("no provider available for gas estimation, using fallback fees");
            return self.fallback();
        };

        match source.fee_data().await {
            Ok(fees) => {
                let policy = self.policy_from_network(
                    fees.max_fee_per_gas,
                    fees.max_priority_fee_per_gas,
                );
                debug!(
                    network_max_fee = ?fees.max_fee_per_gas,
                    network_priority_fee = ?fees.max_priority_fee_per_gas,
                    ?policy,
                    "derived gas policy from network fee data"
                );
                policy
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch fee data, using fallback fees");
                self.fallback()
            }
        }
    }

    /// Present values get the configured headroom, absent ones fall back to
    /// defaults, and both are raised to their floors.
    pub fn policy_from_network(
        &self,
        max_fee_per_gas: Option<u128>,
        max_priority_fee_per_gas: Option<u128>,
    ) -> GasPolicy {
        let max_fee = max_fee_per_gas
            .map(|fee| self.with_headroom(fee))
            .unwrap_or(self.config.fallback_max_fee_per_gas);
        let priority_fee = max_priority_fee_per_gas
            .map(|fee| self.with_headroom(fee))
            .unwrap_or(self.config.fallback_max_priority_fee_per_gas);

        GasPolicy {
            gas_limit: self.config.gas_limit,
            max_fee_per_gas: max_fee.max(self.config.min_max_fee_per_gas),
            max_priority_fee_per_gas: priority_fee
                .max(self.config.min_max_priority_fee_per_gas),
        }
    }

    fn with_headroom(&self, fee: u128) -> u128 {
        fee.saturating_mul(self.config.headroom_percent) / 100
    }
}
