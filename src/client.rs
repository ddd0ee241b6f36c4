use crate::{
    error::SessionError,
    gas::{
        GasConfig,
        GasPolicyEstimator,
    },
    network::ChainDescriptor,
    observer::SpinObserver,
    orchestrator::{
        SpinAttemptResult,
        SpinOrchestrator,
        SpinSettings,
    },
    session::{
        SessionManager,
        WalletProvider,
        WalletSession,
    },
    state::{
        AccountSnapshot,
        FundsCheck,
        NetworkStatus,
        SpinCost,
        StateSynchronizer,
    },
};
use alloy::primitives::Address;
use std::sync::Arc;
use tracing::info;

/// One player's view of the slot machine: the session, the mirrored account
/// state and the spin pipeline, wired to share one network flag and observer.
pub struct SlotClient<P: WalletProvider> {
    session: SessionManager<P>,
    state: StateSynchronizer<P::Contract>,
    orchestrator: SpinOrchestrator<P::Contract>,
    network: NetworkStatus,
}

impl<P: WalletProvider> SlotClient<P> {
    pub fn new(
        provider: Arc<P>,
        chain: ChainDescriptor,
        contract_address: Address,
        gas: GasConfig,
        settings: SpinSettings,
        observer: Arc<dyn SpinObserver>,
    ) -> Self {
        let network = NetworkStatus::default();
        let session = SessionManager::new(provider, chain, contract_address, network.clone());
        let state = StateSynchronizer::new(
            session.subscribe(),
            network.clone(),
            settings.prices,
            observer.clone(),
        );
        let orchestrator = SpinOrchestrator::new(
            session.subscribe(),
            state.clone(),
            GasPolicyEstimator::new(gas),
            network.clone(),
            settings,
            observer,
        );
        Self {
            session,
            state,
            orchestrator,
            network,
        }
    }

    /// Establishes the session, then loads account state straight away.
    pub async fn connect(&self) -> Result<Arc<WalletSession<P::Contract>>, SessionError> {
        let session = self.session.establish().await?;
        self.state.refresh().await;
        info!(account = %session.account, "slot client connected");
        Ok(session)
    }

    /// See [`SpinOrchestrator::submit_spin`]; a concurrent call is rejected
    /// at call time.
    pub fn spin(&self) -> impl Future<Output = SpinAttemptResult> + Send + '_ {
        self.orchestrator.submit_spin()
    }

    pub async fn refresh(&self) {
        self.state.refresh().await;
    }

    pub async fn check_funds(&self) -> FundsCheck {
        self.state.check_funds().await
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        self.state.snapshot()
    }

    pub fn spin_cost(&self) -> SpinCost {
        self.state.spin_cost()
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    pub fn is_spinning(&self) -> bool {
        self.orchestrator.is_spinning()
    }

    pub fn network_available(&self) -> bool {
        self.network.is_available()
    }

    pub fn chain(&self) -> &ChainDescriptor {
        self.session.chain()
    }

    pub fn explorer_url(&self, result: &SpinAttemptResult) -> Option<String> {
        let tx_hash = result.transaction_hash()?;
        self.chain().explorer_tx_url(&tx_hash)
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
    }
}
