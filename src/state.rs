use crate::{
    contract::SpinContract,
    network::{
        NATIVE_SYMBOL,
        format_native,
    },
    observer::SpinObserver,
    session::SessionHandle,
};
use alloy::primitives::{
    U256,
    utils::parse_ether,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    sync::{
        Arc,
        PoisonError,
        RwLock,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    time::Duration,
};
use tracing::{
    debug,
    info,
    warn,
};

/// 0.1 MON
pub const DEFAULT_STANDARD_PRICE_WEI: u128 = 100_000_000_000_000_000;
/// 0.01 MON
pub const DEFAULT_DISCOUNTED_PRICE_WEI: u128 = 10_000_000_000_000_000;

/// Per-account bonus counters, mirrored from the contract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountBonusState {
    pub free_spins: u64,
    pub discounted_spins: u64,
    pub has_discount: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpinCost {
    Free,
    Discounted(U256),
    Standard(U256),
}

impl SpinCost {
    pub fn amount(&self) -> U256 {
        match self {
            SpinCost::Free => U256::ZERO,
            SpinCost::Discounted(amount) | SpinCost::Standard(amount) => *amount,
        }
    }

    pub fn label(&self) -> String {
        match self {
            SpinCost::Free => String::from("Free"),
            SpinCost::Discounted(amount) | SpinCost::Standard(amount) => {
                format!("{} {NATIVE_SYMBOL}", format_native(*amount))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinPrices {
    pub standard_wei: u128,
    pub discounted_wei: u128,
}

impl SpinPrices {
    /// Parses decimal MON amounts such as `"0.1"`.
    pub fn from_ether(standard: &str, discounted: &str) -> Option<Self> {
        let standard_wei = parse_ether(standard).ok()?.try_into().ok()?;
        let discounted_wei = parse_ether(discounted).ok()?.try_into().ok()?;
        Some(Self {
            standard_wei,
            discounted_wei,
        })
    }
}

impl Default for SpinPrices {
    fn default() -> Self {
        Self {
            standard_wei: DEFAULT_STANDARD_PRICE_WEI,
            discounted_wei: DEFAULT_DISCOUNTED_PRICE_WEI,
        }
    }
}

pub fn compute_spin_cost(state: &AccountBonusState, prices: &SpinPrices) -> SpinCost {
    if state.free_spins > 0 {
        SpinCost::Free
    } else if state.has_discount && state.discounted_spins > 0 {
        SpinCost::Discounted(U256::from(prices.discounted_wei))
    } else {
        SpinCost::Standard(U256::from(prices.standard_wei))
    }
}

/// Process-wide "the chain is unreachable" flag. Set by any failed provider
/// read, cleared by the next successful one.
#[derive(Clone, Debug, Default)]
pub struct NetworkStatus {
    unavailable: Arc<AtomicBool>,
}

impl NetworkStatus {
    pub fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::Acquire)
    }

    pub fn mark_unavailable(&self) {
        if !self.unavailable.swap(true, Ordering::AcqRel) {
            warn!("network marked unavailable");
        }
    }

    pub fn mark_available(&self) {
        if self.unavailable.swap(false, Ordering::AcqRel) {
            info!("network available again");
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub balance_wei: U256,
    pub balance: String,
    pub bonus: AccountBonusState,
    pub reward_pool_wei: U256,
    pub reward_pool: String,
    pub refreshed: bool,
}

impl AccountSnapshot {
    pub fn empty() -> Self {
        Self {
            balance: format_native(U256::ZERO),
            reward_pool: format_native(U256::ZERO),
            ..Self::default()
        }
    }

    pub fn can_afford(&self, cost: &SpinCost) -> bool {
        match cost {
            SpinCost::Free => true,
            _ => self.balance_wei >= cost.amount(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FundsCheck {
    Sufficient,
    Insufficient { balance: U256, cost: SpinCost },
}

/// Mirrors account-scoped contract state and the native balance.
///
/// The cache is written only here. Each read is applied on its own, so one
/// failed read leaves its field stale without discarding the others.
pub struct StateSynchronizer<C> {
    session: SessionHandle<C>,
    cache: Arc<RwLock<AccountSnapshot>>,
    network: NetworkStatus,
    prices: SpinPrices,
    observer: Arc<dyn SpinObserver>,
}

impl<C> Clone for StateSynchronizer<C> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            cache: self.cache.clone(),
            network: self.network.clone(),
            prices: self.prices,
            observer: self.observer.clone(),
        }
    }
}

impl<C: SpinContract> StateSynchronizer<C> {
    pub fn new(
        session: SessionHandle<C>,
        network: NetworkStatus,
        prices: SpinPrices,
        observer: Arc<dyn SpinObserver>,
    ) -> Self {
        Self {
            session,
            cache: Arc::new(RwLock::new(AccountSnapshot::empty())),
            network,
            prices,
            observer,
        }
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn bonus_state(&self) -> AccountBonusState {
        self.snapshot().bonus
    }

    pub fn spin_cost(&self) -> SpinCost {
        compute_spin_cost(&self.bonus_state(), &self.prices)
    }

    pub fn prices(&self) -> &SpinPrices {
        &self.prices
    }

    /// Best effort: never fails, and does nothing without a ready session.
    pub async fn refresh(&self) {
        let Some(session) = self.session.current() else {
            debug!("skipping state refresh, session not ready");
            return;
        };
        let contract = session.contract.as_ref();
        let account = session.account;

        let (balance, free_spins, discounted_spins, has_discount, reward_pool) = tokio::join!(
            contract.native_balance(account),
            contract.free_spins(account),
            contract.discounted_spins(account),
            contract.has_discount(account),
            contract.reward_pool(),
        );

        match &balance {
            Ok(_) => self.network.mark_available(),
            Err(e) => {
                warn!(error = %e, "failed to fetch native balance");
                self.network.mark_unavailable();
            }
        }

        let snapshot = {
            let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            if let Ok(balance) = balance {
                cache.balance_wei = balance;
                cache.balance = format_native(balance);
            }
            match free_spins {
                Ok(count) => cache.bonus.free_spins = count.saturating_to(),
                Err(e) => warn!(error = %e, "failed to fetch free spins"),
            }
            match discounted_spins {
                Ok(count) => cache.bonus.discounted_spins = count.saturating_to(),
                Err(e) => warn!(error = %e, "failed to fetch discounted spins"),
            }
            match has_discount {
                Ok(flag) => cache.bonus.has_discount = flag,
                Err(e) => warn!(error = %e, "failed to fetch discount flag"),
            }
            match reward_pool {
                Ok(pool) => {
                    cache.reward_pool_wei = pool;
                    cache.reward_pool = format_native(pool);
                }
                Err(e) => warn!(error = %e, "failed to fetch reward pool"),
            }
            cache.refreshed = true;
            cache.clone()
        };

        debug!(
            balance = %snapshot.balance,
            free_spins = snapshot.bonus.free_spins,
            discounted_spins = snapshot.bonus.discounted_spins,
            has_discount = snapshot.bonus.has_discount,
            reward_pool = %snapshot.reward_pool,
            "state refreshed"
        );
        self.observer.state_refreshed(&snapshot);
    }

    /// Runs a refresh in the background once `delay` has passed, giving the
    /// node time to settle state written by a just-mined spin.
    pub fn schedule_refresh(&self, delay: Duration) {
        let synchronizer = self.clone();
        debug!(?delay, "scheduling state refresh");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            synchronizer.refresh().await;
        });
    }

    /// Refreshes, then reports whether the balance covers the next spin. A
    /// sufficient result lowers the insufficient-funds signal.
    pub async fn check_funds(&self) -> FundsCheck {
        self.refresh().await;
        let snapshot = self.snapshot();
        let cost = compute_spin_cost(&snapshot.bonus, &self.prices);
        if snapshot.can_afford(&cost) {
            info!(balance = %snapshot.balance, cost = %cost.label(), "funds cover next spin");
            self.observer.insufficient_funds(false);
            FundsCheck::Sufficient
        } else {
            info!(balance = %snapshot.balance, cost = %cost.label(), "still insufficient funds");
            FundsCheck::Insufficient {
                balance: snapshot.balance_wei,
                cost,
            }
        }
    }
}
