use crate::{
    contract::SpinContract,
    error::{
        ProviderError,
        SessionError,
    },
    network::ChainDescriptor,
    state::NetworkStatus,
};
use alloy::primitives::Address;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{
    error,
    info,
};

/// The wallet side of a session: network selection, signer identity, and a
/// contract binding scoped to that signer.
pub trait WalletProvider: Send + Sync + 'static {
    type Contract: SpinContract;

    fn active_chain_id(&self) -> impl Future<Output = Result<u64, ProviderError>> + Send;

    fn request_chain_switch(
        &self,
        chain_id: u64,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn request_add_chain(
        &self,
        chain: &ChainDescriptor,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn signer_address(&self) -> impl Future<Output = Result<Address, ProviderError>> + Send;

    fn bind_contract(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<Self::Contract, ProviderError>> + Send;
}

/// A ready session. Only exists once the wallet is on the target chain and
/// the contract is bound, so holding one means the session is ready.
#[derive(Debug)]
pub struct WalletSession<C> {
    pub chain_id: u64,
    pub account: Address,
    pub contract: Arc<C>,
}

/// Read side of the session, shared by the synchronizer and orchestrator.
pub struct SessionHandle<C> {
    receiver: watch::Receiver<Option<Arc<WalletSession<C>>>>,
}

impl<C> Clone for SessionHandle<C> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
        }
    }
}

impl<C> SessionHandle<C> {
    #[cfg(any(test, feature = "test-helpers"))]
    pub(crate) fn from_receiver(
        receiver: watch::Receiver<Option<Arc<WalletSession<C>>>>,
    ) -> Self {
        Self { receiver }
    }

    pub fn current(&self) -> Option<Arc<WalletSession<C>>> {
        self.receiver.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.receiver.borrow().is_some()
    }
}

pub struct SessionManager<P: WalletProvider> {
    provider: Arc<P>,
    chain: ChainDescriptor,
    contract_address: Address,
    sender: watch::Sender<Option<Arc<WalletSession<P::Contract>>>>,
    network: NetworkStatus,
}

impl<P: WalletProvider> SessionManager<P> {
    pub fn new(
        provider: Arc<P>,
        chain: ChainDescriptor,
        contract_address: Address,
        network: NetworkStatus,
    ) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            provider,
            chain,
            contract_address,
            sender,
            network,
        }
    }

    pub fn subscribe(&self) -> SessionHandle<P::Contract> {
        SessionHandle {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    pub fn is_ready(&self) -> bool {
        self.sender.borrow().is_some()
    }

    /// Puts the wallet on the target chain and binds the contract. On failure
    /// the session is left not-ready and the network is flagged unavailable;
    /// calling again retries from scratch.
    pub async fn establish(&self) -> Result<Arc<WalletSession<P::Contract>>, SessionError> {
        match self.try_establish().await {
            Ok(session) => {
                info!(
                    chain_id = session.chain_id,
                    account = %session.account,
                    contract = %self.contract_address,
                    "wallet session ready"
                );
                self.sender.send_replace(Some(session.clone()));
                self.network.mark_available();
                Ok(session)
            }
            Err(e) => {
                error!(error = %e, "failed to set up wallet session");
                self.sender.send_replace(None);
                self.network.mark_unavailable();
                Err(e)
            }
        }
    }

    pub fn disconnect(&self) {
        if self.sender.send_replace(None).is_some() {
            info!("wallet session closed");
        }
    }

    async fn try_establish(&self) -> Result<Arc<WalletSession<P::Contract>>, SessionError> {
        self.ensure_target_chain().await?;
        let account = self
            .provider
            .signer_address()
            .await
            .map_err(SessionError::Signer)?;
        let contract = self
            .provider
            .bind_contract(self.contract_address)
            .await
            .map_err(SessionError::Binding)?;
        Ok(Arc::new(WalletSession {
            chain_id: self.chain.chain_id,
            account,
            contract: Arc::new(contract),
        }))
    }

    async fn ensure_target_chain(&self) -> Result<(), SessionError> {
        let target = self.chain.chain_id;
        let active = self
            .provider
            .active_chain_id()
            .await
            .map_err(SessionError::ActiveChain)?;
        if active == target {
            return Ok(());
        }

        info!(active, target, "requesting wallet chain switch");
        let switch_failed = |source| SessionError::ChainSwitch {
            chain_id: target,
            source,
        };
        match self.provider.request_chain_switch(target).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unrecognized_chain() => {
                info!(
                    chain = %self.chain.chain_name,
                    chain_id = %self.chain.hex_chain_id(),
                    "chain unknown to wallet, requesting it be added"
                );
                self.provider
                    .request_add_chain(&self.chain)
                    .await
                    .map_err(|source| SessionError::AddChain {
                        chain_id: target,
                        source,
                    })?;
                self.provider
                    .request_chain_switch(target)
                    .await
                    .map_err(switch_failed)
            }
            Err(e) => Err(switch_failed(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::{
        FakeWallet,
        WalletCall,
    };

    fn manager(wallet: FakeWallet) -> (SessionManager<FakeWallet>, NetworkStatus) {
        let network = NetworkStatus::default();
        let manager = SessionManager::new(
            Arc::new(wallet),
            ChainDescriptor::monad_testnet(),
            Address::repeat_byte(0xaa),
            network.clone(),
        );
        (manager, network)
    }

    #[tokio::test]
    async fn establish__on_target_chain_skips_switch() {
        // given
        let wallet = FakeWallet::on_chain(10143);
        let calls = wallet.calls();
        let (manager, network) = manager(wallet);
        let handle = manager.subscribe();

        // when
        let session = manager.establish().await.unwrap();

        // then
        assert_eq!(session.chain_id, 10143);
        assert_eq!(session.account, FakeWallet::ACCOUNT);
        assert!(handle.is_ready());
        assert!(network.is_available());
        assert_eq!(
            calls.lock().unwrap().clone(),
            vec![WalletCall::ActiveChain, WalletCall::Signer, WalletCall::Bind]
        );
    }

    #[tokio::test]
    async fn establish__unknown_chain_is_added_then_switched() {
        // given
        let wallet = FakeWallet::on_chain(1);
        let calls = wallet.calls();
        let (manager, _) = manager(wallet);

        // when
        let session = manager.establish().await.unwrap();

        // then
        assert_eq!(session.chain_id, 10143);
        assert_eq!(
            calls.lock().unwrap().clone(),
            vec![
                WalletCall::ActiveChain,
                WalletCall::Switch(10143),
                WalletCall::AddChain(10143),
                WalletCall::Switch(10143),
                WalletCall::Signer,
                WalletCall::Bind,
            ]
        );
    }

    #[tokio::test]
    async fn establish__rejected_switch_leaves_session_not_ready() {
        // given
        let wallet = FakeWallet::on_chain(1).knowing(10143).rejecting_switch();
        let (manager, network) = manager(wallet);
        let handle = manager.subscribe();

        // when
        let result = manager.establish().await;

        // then
        assert!(matches!(
            result,
            Err(SessionError::ChainSwitch { chain_id: 10143, .. })
        ));
        assert!(!handle.is_ready());
        assert!(!network.is_available());
    }

    #[tokio::test]
    async fn disconnect__clears_session() {
        let (manager, _) = manager(FakeWallet::on_chain(10143));
        let handle = manager.subscribe();
        manager.establish().await.unwrap();

        manager.disconnect();

        assert!(handle.current().is_none());
        assert!(!manager.is_ready());
    }
}
