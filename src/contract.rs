//! The chain-facing seam of the engine.
//!
//! Everything the engine needs from a node and from the slot machine contract
//! goes through [`SpinContract`]. The alloy-backed implementation lives in
//! [`crate::rpc`]; tests use the in-memory fake from `test_helpers`.

use crate::{
    error::ProviderError,
    gas::GasPolicy,
};
use alloy::primitives::{
    Address,
    B256,
    Log,
    U256,
};

/// Fee market data as reported by the node. A field is `None` when the node
/// cannot report it (for example a chain without a base fee).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeeData {
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

pub trait FeeSource: Send + Sync {
    fn fee_data(&self) -> impl Future<Output = Result<FeeData, ProviderError>> + Send;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpinReceipt {
    pub transaction_hash: B256,
    pub success: bool,
    pub logs: Vec<Log>,
}

pub trait SpinContract: FeeSource + Send + Sync + 'static {
    fn native_balance(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<U256, ProviderError>> + Send;

    fn free_spins(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<U256, ProviderError>> + Send;

    fn discounted_spins(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<U256, ProviderError>> + Send;

    fn has_discount(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<bool, ProviderError>> + Send;

    fn reward_pool(&self) -> impl Future<Output = Result<U256, ProviderError>> + Send;

    /// Signs and broadcasts `spin()` with `value` attached. Resolves once the
    /// node has accepted the transaction, not once it is mined.
    fn send_spin(
        &self,
        value: U256,
        gas: &GasPolicy,
    ) -> impl Future<Output = Result<B256, ProviderError>> + Send;

    /// Waits for the transaction to be included in a block.
    fn wait_for_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<SpinReceipt, ProviderError>> + Send;
}
