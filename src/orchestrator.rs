use crate::{
    contract::SpinContract,
    decoder::{
        SpinOutcome,
        decode_outcome,
    },
    error::{
        FailureKind,
        ProviderError,
        classify,
    },
    gas::GasPolicyEstimator,
    observer::SpinObserver,
    session::SessionHandle,
    state::{
        NetworkStatus,
        SpinPrices,
        StateSynchronizer,
    },
};
use alloy::primitives::B256;
use futures::future::{
    Either,
    ready,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    time::Duration,
};
use tracing::{
    error,
    info,
    warn,
};

pub const DEFAULT_REFRESH_DELAY_MS: u64 = 2_000;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;
pub const REVERTED_ON_CHAIN: &str = "transaction reverted on-chain";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    InsufficientFunds,
    UserCancelled,
    SpinInFlight,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InsufficientFunds => "insufficient-funds",
            RejectReason::UserCancelled => "user-cancelled",
            RejectReason::SpinInFlight => "spin-in-flight",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of one `submit_spin` call. Orchestration failures are reported
/// here rather than as errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpinAttemptResult {
    Success(SpinOutcome),
    Rejected(RejectReason),
    Reverted(String),
    /// The spin was mined and paid for, but no `SpinResult` event was found.
    NoOutcomeEvent { transaction_hash: B256 },
    NetworkUnavailable,
    /// Broadcast, but no receipt was obtained: the confirmation timeout ran
    /// out or the node failed while it was awaited.
    Unconfirmed { transaction_hash: B256 },
}

impl SpinAttemptResult {
    pub fn transaction_hash(&self) -> Option<B256> {
        match self {
            SpinAttemptResult::Success(outcome) => Some(outcome.transaction_hash),
            SpinAttemptResult::NoOutcomeEvent { transaction_hash }
            | SpinAttemptResult::Unconfirmed { transaction_hash } => Some(*transaction_hash),
            _ => None,
        }
    }

    /// True when the transaction reached the chain, so account state has
    /// likely changed.
    fn touched_chain(&self) -> bool {
        matches!(
            self,
            SpinAttemptResult::Success(_)
                | SpinAttemptResult::NoOutcomeEvent { .. }
                | SpinAttemptResult::Unconfirmed { .. }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinSettings {
    pub prices: SpinPrices,
    pub refresh_delay_ms: u64,
    pub confirmation_timeout_secs: u64,
}

impl SpinSettings {
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

impl Default for SpinSettings {
    fn default() -> Self {
        Self {
            prices: SpinPrices::default(),
            refresh_delay_ms: DEFAULT_REFRESH_DELAY_MS,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
        }
    }
}

/// Held for the lifetime of one spin. Dropping it, on any path, frees the
/// orchestrator for the next spin.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct SpinOrchestrator<C> {
    session: SessionHandle<C>,
    state: StateSynchronizer<C>,
    gas: GasPolicyEstimator,
    network: NetworkStatus,
    settings: SpinSettings,
    observer: Arc<dyn SpinObserver>,
    in_flight: Arc<AtomicBool>,
}

impl<C: SpinContract> SpinOrchestrator<C> {
    pub fn new(
        session: SessionHandle<C>,
        state: StateSynchronizer<C>,
        gas: GasPolicyEstimator,
        network: NetworkStatus,
        settings: SpinSettings,
        observer: Arc<dyn SpinObserver>,
    ) -> Self {
        Self {
            session,
            state,
            gas,
            network,
            settings,
            observer,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settings(&self) -> &SpinSettings {
        &self.settings
    }

    pub fn is_spinning(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs one spin end to end.
    ///
    /// The in-flight check happens when this is called, not when the returned
    /// future is first polled: a second call made while a spin is outstanding
    /// gets a future that is already resolved to
    /// `Rejected(RejectReason::SpinInFlight)`, and nothing is sent to the chain.
    pub fn submit_spin(&self) -> impl Future<Output = SpinAttemptResult> + Send + '_ {
        match InFlightGuard::acquire(&self.in_flight) {
            Some(guard) => Either::Left(self.run_spin(guard)),
            None => {
                warn!("spin already in flight, rejecting");
                Either::Right(ready(SpinAttemptResult::Rejected(
                    RejectReason::SpinInFlight,
                )))
            }
        }
    }

    async fn run_spin(&self, guard: InFlightGuard) -> SpinAttemptResult {
        let result = self.attempt().await;
        drop(guard);

        if result.touched_chain() {
            self.state.schedule_refresh(self.settings.refresh_delay());
        }
        self.observer.spin_settled(&result);
        result
    }

    async fn attempt(&self) -> SpinAttemptResult {
        let Some(session) = self.session.current() else {
            warn!("spin requested without a ready session");
            return SpinAttemptResult::NetworkUnavailable;
        };
        if !self.network.is_available() {
            warn!("spin requested while network is unavailable");
            return SpinAttemptResult::NetworkUnavailable;
        }
        let contract = session.contract.as_ref();

        let cost = self.state.spin_cost();
        let gas = self.gas.estimate(Some(contract)).await;
        info!(cost = %cost.label(), ?gas, "submitting spin");

        let tx_hash = match contract.send_spin(cost.amount(), &gas).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => return self.failed(&e),
        };
        info!(%tx_hash, "spin broadcast, waiting for confirmation");

        let timeout = self.settings.confirmation_timeout();
        let confirmation = tokio::time::timeout(timeout, contract.wait_for_receipt(tx_hash));
        let receipt = match confirmation.await {
            Ok(Ok(receipt)) => receipt,
            // Already broadcast, so it may still be mined.
            Ok(Err(e)) => {
                warn!(%tx_hash, error = %e, "lost track of broadcast spin");
                return SpinAttemptResult::Unconfirmed {
                    transaction_hash: tx_hash,
                };
            }
            Err(_) => {
                warn!(%tx_hash, ?timeout, "spin not confirmed in time");
                return SpinAttemptResult::Unconfirmed {
                    transaction_hash: tx_hash,
                };
            }
        };

        if !receipt.success {
            warn!(%tx_hash, "spin reverted on-chain");
            return SpinAttemptResult::Reverted(REVERTED_ON_CHAIN.to_string());
        }

        match decode_outcome(&receipt) {
            Some(outcome) => {
                info!(
                    %tx_hash,
                    combination = ?outcome.combination,
                    mon_reward = %outcome.mon_reward,
                    extra_spins = outcome.extra_spins_granted,
                    nft_won = outcome.nft_won,
                    "spin settled"
                );
                SpinAttemptResult::Success(outcome)
            }
            None => {
                error!(
                    %tx_hash,
                    logs = receipt.logs.len(),
                    "spin confirmed but no SpinResult event found"
                );
                SpinAttemptResult::NoOutcomeEvent {
                    transaction_hash: tx_hash,
                }
            }
        }
    }

    fn failed(&self, err: &ProviderError) -> SpinAttemptResult {
        match classify(err) {
            FailureKind::InsufficientFunds => {
                warn!(error = %err, "spin rejected, insufficient funds");
                self.observer.insufficient_funds(true);
                SpinAttemptResult::Rejected(RejectReason::InsufficientFunds)
            }
            FailureKind::UserCancelled => {
                info!("spin cancelled by user");
                SpinAttemptResult::Rejected(RejectReason::UserCancelled)
            }
            FailureKind::Reverted(message) => {
                warn!(%message, "spin reverted");
                SpinAttemptResult::Reverted(message)
            }
            FailureKind::Network => {
                error!(error = %err, code = ?err.code, "spin failed");
                SpinAttemptResult::NetworkUnavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        gas::GasPolicyEstimator,
        state::StateSynchronizer,
        test_helpers::{
            FakeSpinContract,
            RecordingObserver,
            SessionSender,
            fake_session,
            spin_result_event,
            spin_result_log,
            unrelated_log,
        },
    };
    use alloy::primitives::U256;
    use futures::FutureExt;

    struct Harness {
        orchestrator: SpinOrchestrator<FakeSpinContract>,
        observer: Arc<RecordingObserver>,
        network: NetworkStatus,
        _session: SessionSender<FakeSpinContract>,
    }

    async fn harness(contract: FakeSpinContract) -> Harness {
        let network = NetworkStatus::default();
        let observer = Arc::new(RecordingObserver::default());
        let (sender, session) = fake_session(contract);
        let state = StateSynchronizer::new(
            session.clone(),
            network.clone(),
            SpinPrices::default(),
            observer.clone(),
        );
        state.refresh().await;
        let orchestrator = SpinOrchestrator::new(
            session,
            state,
            GasPolicyEstimator::default(),
            network.clone(),
            SpinSettings::default(),
            observer.clone(),
        );
        Harness {
            orchestrator,
            observer,
            network,
            _session: sender,
        }
    }

    fn one_mon() -> U256 {
        U256::from(1_000_000_000_000_000_000u128)
    }

    #[tokio::test]
    async fn submit_spin__decodes_outcome_from_receipt() {
        // given
        let contract = FakeSpinContract::new()
            .with_balance(one_mon())
            .with_receipt_logs(vec![
                unrelated_log(7),
                spin_result_log(spin_result_event(
                    "CHERRY|CHERRY|CHERRY",
                    450_000_000_000_000_000,
                    2,
                )),
            ]);
        let sent = contract.sent_spins();
        let harness = harness(contract).await;

        // when
        let result = harness.orchestrator.submit_spin().await;

        // then
        let SpinAttemptResult::Success(outcome) = &result else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!(outcome.combination, vec!["CHERRY", "CHERRY", "CHERRY"]);
        assert_eq!(outcome.mon_reward, "0.45");
        assert_eq!(outcome.extra_spins_granted, 2);
        let sent = sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].value, U256::from(100_000_000_000_000_000u128));
        assert_eq!(harness.observer.settled(), vec![result]);
        assert!(!harness.orchestrator.is_spinning());
    }

    #[tokio::test]
    async fn submit_spin__free_spin_sends_no_value() {
        let contract = FakeSpinContract::new()
            .with_free_spins(1)
            .with_receipt_logs(vec![spin_result_log(spin_result_event(
                "LEMON|GRAPE|BANANA",
                0,
                0,
            ))]);
        let sent = contract.sent_spins();
        let harness = harness(contract).await;

        let result = harness.orchestrator.submit_spin().await;

        assert!(matches!(result, SpinAttemptResult::Success(_)));
        assert_eq!(sent.lock().unwrap()[0].value, U256::ZERO);
    }

    #[tokio::test]
    async fn submit_spin__insufficient_balance_is_rejected_and_signalled() {
        // given
        let contract = FakeSpinContract::new().with_balance(U256::from(1_000u64));
        let harness = harness(contract).await;

        // when
        let result = harness.orchestrator.submit_spin().await;

        // then
        assert_eq!(
            result,
            SpinAttemptResult::Rejected(RejectReason::InsufficientFunds)
        );
        assert_eq!(harness.observer.insufficient_funds_signals(), vec![true]);
    }

    #[tokio::test]
    async fn submit_spin__user_rejection_is_not_an_error() {
        let contract = FakeSpinContract::new()
            .with_balance(one_mon())
            .with_send_error(ProviderError::new(Some(4001), "User rejected the request."));
        let harness = harness(contract).await;

        let result = harness.orchestrator.submit_spin().await;

        assert_eq!(result, SpinAttemptResult::Rejected(RejectReason::UserCancelled));
        assert!(harness.observer.insufficient_funds_signals().is_empty());
    }

    #[tokio::test]
    async fn submit_spin__revert_carries_message() {
        let contract = FakeSpinContract::new()
            .with_balance(one_mon())
            .with_send_error(ProviderError::new(
                Some(3),
                "execution reverted: Insufficient reward pool",
            ));
        let harness = harness(contract).await;

        let result = harness.orchestrator.submit_spin().await;

        assert_eq!(
            result,
            SpinAttemptResult::Reverted("execution reverted: Insufficient reward pool".into())
        );
    }

    #[tokio::test]
    async fn submit_spin__failed_receipt_status_is_reverted() {
        let contract = FakeSpinContract::new()
            .with_balance(one_mon())
            .with_failed_receipt();
        let harness = harness(contract).await;

        let result = harness.orchestrator.submit_spin().await;

        assert_eq!(result, SpinAttemptResult::Reverted(REVERTED_ON_CHAIN.into()));
    }

    #[tokio::test]
    async fn submit_spin__receipt_without_event_is_no_outcome() {
        // given
        let contract = FakeSpinContract::new()
            .with_balance(one_mon())
            .with_receipt_logs(vec![unrelated_log(1), unrelated_log(2)]);
        let harness = harness(contract).await;

        // when
        let result = harness.orchestrator.submit_spin().await;

        // then
        assert_eq!(
            result,
            SpinAttemptResult::NoOutcomeEvent {
                transaction_hash: FakeSpinContract::TX_HASH
            }
        );
    }

    #[tokio::test]
    async fn submit_spin__unknown_send_error_is_network_unavailable() {
        let contract = FakeSpinContract::new()
            .with_balance(one_mon())
            .with_send_error(ProviderError::transport("connection reset by peer"));
        let harness = harness(contract).await;

        let result = harness.orchestrator.submit_spin().await;

        assert_eq!(result, SpinAttemptResult::NetworkUnavailable);
        assert!(!harness.orchestrator.is_spinning());
    }

    #[tokio::test]
    async fn submit_spin__network_flagged_down_does_not_touch_chain() {
        // given
        let contract = FakeSpinContract::new().with_balance(one_mon());
        let sent = contract.sent_spins();
        let harness = harness(contract).await;
        harness.network.mark_unavailable();

        // when
        let result = harness.orchestrator.submit_spin().await;

        // then
        assert_eq!(result, SpinAttemptResult::NetworkUnavailable);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_spin__second_call_while_pending_is_rejected_synchronously() {
        // given
        let contract = FakeSpinContract::new()
            .with_balance(one_mon())
            .holding_receipt();
        let release = contract.receipt_gate();
        let sent = contract.sent_spins();
        let harness = harness(contract).await;

        // when
        let first = harness.orchestrator.submit_spin();
        let second = harness.orchestrator.submit_spin().now_or_never();

        // then
        assert!(harness.orchestrator.is_spinning());
        assert_eq!(
            second,
            Some(SpinAttemptResult::Rejected(RejectReason::SpinInFlight))
        );
        release.notify_one();
        let first = first.await;
        assert_eq!(first.transaction_hash(), Some(FakeSpinContract::TX_HASH));
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert!(!harness.orchestrator.is_spinning());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_spin__confirmation_timeout_releases_latch() {
        // given
        let contract = FakeSpinContract::new()
            .with_balance(one_mon())
            .holding_receipt();
        let harness = harness(contract).await;

        // when
        let result = harness.orchestrator.submit_spin().await;

        // then
        assert_eq!(
            result,
            SpinAttemptResult::Unconfirmed {
                transaction_hash: FakeSpinContract::TX_HASH
            }
        );
        assert!(!harness.orchestrator.is_spinning());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_spin__receipt_error_after_broadcast_keeps_tx_hash() {
        // given
        let contract = FakeSpinContract::new()
            .with_balance(one_mon())
            .with_receipt_error(ProviderError::transport(
                "connection reset by peer: insufficient funds",
            ));
        let harness = harness(contract).await;
        let refreshes_before = harness.observer.snapshots().len();

        // when
        let result = harness.orchestrator.submit_spin().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        // then
        assert_eq!(
            result,
            SpinAttemptResult::Unconfirmed {
                transaction_hash: FakeSpinContract::TX_HASH
            }
        );
        assert!(harness.observer.insufficient_funds_signals().is_empty());
        assert_eq!(harness.observer.snapshots().len(), refreshes_before + 1);
        assert!(!harness.orchestrator.is_spinning());
    }

    #[test]
    fn reject_reason__strings() {
        assert_eq!(RejectReason::InsufficientFunds.as_str(), "insufficient-funds");
        assert_eq!(RejectReason::UserCancelled.as_str(), "user-cancelled");
        assert_eq!(RejectReason::SpinInFlight.to_string(), "spin-in-flight");
    }
}
