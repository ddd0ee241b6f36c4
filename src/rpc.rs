//! alloy-backed implementations of the wallet and contract seams.

use crate::{
    contract::{
        FeeData,
        FeeSource,
        SpinContract,
        SpinReceipt,
    },
    error::ProviderError,
    gas::GasPolicy,
    network::{
        ChainDescriptor,
        UNRECOGNIZED_CHAIN_CODE,
    },
    session::WalletProvider,
    slot_types::SlotMachine::{
        self,
        SlotMachineInstance,
    },
};
use alloy::{
    network::EthereumWallet,
    primitives::{
        Address,
        B256,
        U256,
    },
    providers::{
        DynProvider,
        PendingTransactionBuilder,
        PendingTransactionError,
        Provider,
        ProviderBuilder,
    },
    signers::local::PrivateKeySigner,
    transports::{
        RpcError,
        TransportError,
        http::reqwest::Url,
    },
};
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        PoisonError,
    },
};
use tracing::{
    debug,
    info,
};

/// JSON-RPC "invalid params", used for add-chain requests that cannot be honoured.
const INVALID_PARAMS_CODE: i64 = -32602;

pub fn from_transport_error(err: TransportError) -> ProviderError {
    match err {
        RpcError::ErrorResp(payload) => ProviderError {
            code: Some(payload.code),
            message: payload.message.to_string(),
            data: payload.data.map(|data| data.get().to_string()),
        },
        other => ProviderError::transport(other.to_string()),
    }
}

pub fn from_contract_error(err: alloy::contract::Error) -> ProviderError {
    match err {
        alloy::contract::Error::TransportError(err) => from_transport_error(err),
        other => ProviderError::transport(other.to_string()),
    }
}

fn from_pending_error(err: PendingTransactionError) -> ProviderError {
    match err {
        PendingTransactionError::TransportError(err) => from_transport_error(err),
        other => ProviderError::transport(other.to_string()),
    }
}

fn parse_rpc_url(url: &str) -> Result<Url, ProviderError> {
    url.parse().map_err(|e| {
        ProviderError::new(Some(INVALID_PARAMS_CODE), format!("invalid RPC URL {url}: {e}"))
    })
}

pub struct RpcSpinContract {
    provider: DynProvider,
    instance: SlotMachineInstance<DynProvider>,
}

impl RpcSpinContract {
    pub fn new(address: Address, provider: DynProvider) -> Self {
        let instance = SlotMachine::new(address, provider.clone());
        Self { provider, instance }
    }

    pub fn address(&self) -> Address {
        *self.instance.address()
    }
}

impl FeeSource for RpcSpinContract {
    async fn fee_data(&self) -> Result<FeeData, ProviderError> {
        let (max_fee_per_gas, max_priority_fee_per_gas) =
            match self.provider.estimate_eip1559_fees().await {
                Ok(fees) => (Some(fees.max_fee_per_gas), Some(fees.max_priority_fee_per_gas)),
                Err(e) => {
                    debug!(error = %e, "node reported no EIP-1559 fee data");
                    (None, None)
                }
            };
        Ok(FeeData {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        })
    }
}

impl SpinContract for RpcSpinContract {
    async fn native_balance(&self, account: Address) -> Result<U256, ProviderError> {
        self.provider
            .get_balance(account)
            .await
            .map_err(from_transport_error)
    }

    async fn free_spins(&self, account: Address) -> Result<U256, ProviderError> {
        self.instance
            .freeSpins(account)
            .call()
            .await
            .map_err(from_contract_error)
    }

    async fn discounted_spins(&self, account: Address) -> Result<U256, ProviderError> {
        self.instance
            .discountedSpins(account)
            .call()
            .await
            .map_err(from_contract_error)
    }

    async fn has_discount(&self, account: Address) -> Result<bool, ProviderError> {
        self.instance
            .hasDiscount(account)
            .call()
            .await
            .map_err(from_contract_error)
    }

    async fn reward_pool(&self) -> Result<U256, ProviderError> {
        self.instance
            .getRewardPool()
            .call()
            .await
            .map_err(from_contract_error)
    }

    async fn send_spin(&self, value: U256, gas: &GasPolicy) -> Result<B256, ProviderError> {
        let pending = self
            .instance
            .spin()
            .value(value)
            .gas(gas.gas_limit)
            .max_fee_per_gas(gas.max_fee_per_gas)
            .max_priority_fee_per_gas(gas.max_priority_fee_per_gas)
            .send()
            .await
            .map_err(from_contract_error)?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<SpinReceipt, ProviderError> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .get_receipt()
            .await
            .map_err(from_pending_error)?;
        Ok(SpinReceipt {
            transaction_hash: receipt.transaction_hash,
            success: receipt.status(),
            logs: receipt
                .inner
                .logs()
                .iter()
                .map(|log| log.inner.clone())
                .collect(),
        })
    }
}

/// A wallet backed by a decrypted local keystore.
///
/// Behaves like a browser wallet towards the session manager: it starts on no
/// chain (reported as chain 0), refuses to switch to chains it has not been
/// told about, and only learns a chain after checking that the chain's RPC
/// endpoint really serves that chain id.
pub struct KeystoreWallet {
    signer: PrivateKeySigner,
    chains: Mutex<HashMap<u64, ChainDescriptor>>,
    active_chain: Mutex<u64>,
}

impl KeystoreWallet {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self {
            signer,
            chains: Mutex::new(HashMap::new()),
            active_chain: Mutex::new(0),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    fn active_descriptor(&self) -> Option<ChainDescriptor> {
        let active = *self.active_chain.lock().unwrap_or_else(PoisonError::into_inner);
        self.chains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&active)
            .cloned()
    }

    fn active_rpc_url(&self) -> Result<Url, ProviderError> {
        let chain = self.active_descriptor().ok_or_else(|| {
            ProviderError::new(Some(UNRECOGNIZED_CHAIN_CODE), "wallet is not on a known chain")
        })?;
        let url = chain.primary_rpc_url().ok_or_else(|| {
            ProviderError::new(Some(INVALID_PARAMS_CODE), "active chain has no RPC URL")
        })?;
        parse_rpc_url(url)
    }
}

impl WalletProvider for KeystoreWallet {
    type Contract = RpcSpinContract;

    async fn active_chain_id(&self) -> Result<u64, ProviderError> {
        Ok(*self.active_chain.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn request_chain_switch(&self, chain_id: u64) -> Result<(), ProviderError> {
        let known = self
            .chains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&chain_id);
        if !known {
            return Err(ProviderError::new(
                Some(UNRECOGNIZED_CHAIN_CODE),
                format!("Unrecognized chain ID \"0x{chain_id:x}\""),
            ));
        }
        *self.active_chain.lock().unwrap_or_else(PoisonError::into_inner) = chain_id;
        info!(chain_id, "keystore wallet switched chain");
        Ok(())
    }

    async fn request_add_chain(&self, chain: &ChainDescriptor) -> Result<(), ProviderError> {
        let url = chain.primary_rpc_url().ok_or_else(|| {
            ProviderError::new(Some(INVALID_PARAMS_CODE), "add-chain request has no RPC URL")
        })?;
        let provider = ProviderBuilder::new().connect_http(parse_rpc_url(url)?);
        let served = provider
            .get_chain_id()
            .await
            .map_err(from_transport_error)?;
        if served != chain.chain_id {
            return Err(ProviderError::new(
                Some(INVALID_PARAMS_CODE),
                format!(
                    "RPC endpoint {url} serves chain {served}, not {}",
                    chain.chain_id
                ),
            ));
        }

        info!(
            chain = %chain.chain_name,
            chain_id = %chain.hex_chain_id(),
            %url,
            "keystore wallet added chain"
        );
        self.chains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chain.chain_id, chain.clone());
        Ok(())
    }

    async fn signer_address(&self) -> Result<Address, ProviderError> {
        Ok(self.signer.address())
    }

    async fn bind_contract(&self, address: Address) -> Result<RpcSpinContract, ProviderError> {
        let url = self.active_rpc_url()?;
        debug!(%address, %url, "binding slot machine contract");
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .connect_http(url)
            .erased();
        Ok(RpcSpinContract::new(address, provider))
    }
}
