//! In-memory stand-ins for the wallet, the node and the front end.

use crate::{
    contract::{
        FeeData,
        FeeSource,
        SpinContract,
        SpinReceipt,
    },
    error::ProviderError,
    gas::{
        GWEI,
        GasPolicy,
    },
    network::ChainDescriptor,
    observer::SpinObserver,
    orchestrator::SpinAttemptResult,
    session::{
        SessionHandle,
        WalletProvider,
        WalletSession,
    },
    slot_types::SlotMachine::SpinResult,
    state::AccountSnapshot,
};
use alloy::{
    primitives::{
        Address,
        B256,
        Bytes,
        Log,
        U256,
        address,
    },
    sol_types::SolEvent,
};
use std::{
    collections::HashSet,
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::{
    Notify,
    watch,
};

pub const SLOT_MACHINE: Address = address!("0x5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a");

pub fn spin_result_event(combination: &str, mon_reward_wei: u128, extra_spins: u64) -> SpinResult {
    SpinResult {
        combination: combination.to_string(),
        monReward: U256::from(mon_reward_wei),
        extraSpins: U256::from(extra_spins),
        poppiesNftWon: false,
        rarestPending: false,
        discountApplied: false,
        newDiscountGranted: false,
    }
}

pub fn spin_result_log(event: SpinResult) -> Log {
    Log {
        address: SLOT_MACHINE,
        data: event.encode_log_data(),
    }
}

/// A log from some other contract, with a topic that matches no known event.
pub fn unrelated_log(seed: u8) -> Log {
    Log::new_unchecked(
        Address::repeat_byte(seed),
        vec![B256::repeat_byte(seed)],
        Bytes::from(vec![seed; 32]),
    )
}

pub type SessionSender<C> = watch::Sender<Option<Arc<WalletSession<C>>>>;

/// Publishes a ready session around `contract` without going through a
/// wallet. Keep the sender alive for as long as the session should stay ready.
pub fn fake_session<C>(contract: C) -> (SessionSender<C>, SessionHandle<C>) {
    let session = WalletSession {
        chain_id: ChainDescriptor::monad_testnet().chain_id,
        account: FakeWallet::ACCOUNT,
        contract: Arc::new(contract),
    };
    let (sender, receiver) = watch::channel(Some(Arc::new(session)));
    (sender, SessionHandle::from_receiver(receiver))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FakeRead {
    Balance,
    FreeSpins,
    DiscountedSpins,
    HasDiscount,
    RewardPool,
    Fees,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentSpin {
    pub value: U256,
    pub gas: GasPolicy,
}

struct FakeChain {
    balance: U256,
    free_spins: u64,
    discounted_spins: u64,
    has_discount: bool,
    reward_pool: U256,
    fees: FeeData,
    failing: HashSet<FakeRead>,
    send_error: Option<ProviderError>,
    receipt_success: bool,
    receipt_logs: Vec<Log>,
    receipt_error: Option<ProviderError>,
    hold_receipt: bool,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            balance: U256::ZERO,
            free_spins: 0,
            discounted_spins: 0,
            has_discount: false,
            reward_pool: U256::ZERO,
            fees: FeeData {
                max_fee_per_gas: Some(60 * GWEI),
                max_priority_fee_per_gas: Some(2 * GWEI),
            },
            failing: HashSet::new(),
            send_error: None,
            receipt_success: true,
            receipt_logs: Vec::new(),
            receipt_error: None,
            hold_receipt: false,
        }
    }
}

/// A slot machine and node in one. Clones share state, so a test can keep a
/// clone to change the chain after the original is bound into a session.
#[derive(Clone, Default)]
pub struct FakeSpinContract {
    chain: Arc<Mutex<FakeChain>>,
    sent: Arc<Mutex<Vec<SentSpin>>>,
    receipt_gate: Arc<Notify>,
}

impl FakeSpinContract {
    pub const TX_HASH: B256 = B256::repeat_byte(0x77);

    pub fn new() -> Self {
        Self::default()
    }

    fn update(self, f: impl FnOnce(&mut FakeChain)) -> Self {
        f(&mut self.chain.lock().unwrap());
        self
    }

    pub fn with_balance(self, balance: U256) -> Self {
        self.update(|chain| chain.balance = balance)
    }

    pub fn with_free_spins(self, count: u64) -> Self {
        self.update(|chain| chain.free_spins = count)
    }

    pub fn with_discount(self, discounted_spins: u64) -> Self {
        self.update(|chain| {
            chain.discounted_spins = discounted_spins;
            chain.has_discount = true;
        })
    }

    pub fn with_reward_pool(self, pool: U256) -> Self {
        self.update(|chain| chain.reward_pool = pool)
    }

    pub fn with_fees(self, fees: FeeData) -> Self {
        self.update(|chain| chain.fees = fees)
    }

    pub fn with_send_error(self, err: ProviderError) -> Self {
        self.update(|chain| chain.send_error = Some(err))
    }

    pub fn with_receipt_logs(self, logs: Vec<Log>) -> Self {
        self.update(|chain| chain.receipt_logs = logs)
    }

    /// The spin is broadcast, then the node errors while it is awaited.
    pub fn with_receipt_error(self, err: ProviderError) -> Self {
        self.update(|chain| chain.receipt_error = Some(err))
    }

    pub fn with_failed_receipt(self) -> Self {
        self.update(|chain| chain.receipt_success = false)
    }

    /// Receipts are withheld until [`Self::receipt_gate`] is notified.
    pub fn holding_receipt(self) -> Self {
        self.update(|chain| chain.hold_receipt = true)
    }

    pub fn set_balance(&self, balance: U256) {
        self.chain.lock().unwrap().balance = balance;
    }

    pub fn set_bonus(&self, free_spins: u64, discounted_spins: u64, has_discount: bool) {
        let mut chain = self.chain.lock().unwrap();
        chain.free_spins = free_spins;
        chain.discounted_spins = discounted_spins;
        chain.has_discount = has_discount;
    }

    pub fn set_reward_pool(&self, pool: U256) {
        self.chain.lock().unwrap().reward_pool = pool;
    }

    pub fn fail(&self, read: FakeRead) {
        self.chain.lock().unwrap().failing.insert(read);
    }

    pub fn recover(&self, read: FakeRead) {
        self.chain.lock().unwrap().failing.remove(&read);
    }

    pub fn sent_spins(&self) -> Arc<Mutex<Vec<SentSpin>>> {
        self.sent.clone()
    }

    pub fn receipt_gate(&self) -> Arc<Notify> {
        self.receipt_gate.clone()
    }

    fn read<T>(&self, read: FakeRead, f: impl FnOnce(&FakeChain) -> T) -> Result<T, ProviderError> {
        let chain = self.chain.lock().unwrap();
        if chain.failing.contains(&read) {
            return Err(ProviderError::transport(format!("{read:?} read timed out")));
        }
        Ok(f(&chain))
    }
}

impl FeeSource for FakeSpinContract {
    async fn fee_data(&self) -> Result<FeeData, ProviderError> {
        self.read(FakeRead::Fees, |chain| chain.fees)
    }
}

impl SpinContract for FakeSpinContract {
    async fn native_balance(&self, _account: Address) -> Result<U256, ProviderError> {
        self.read(FakeRead::Balance, |chain| chain.balance)
    }

    async fn free_spins(&self, _account: Address) -> Result<U256, ProviderError> {
        self.read(FakeRead::FreeSpins, |chain| U256::from(chain.free_spins))
    }

    async fn discounted_spins(&self, _account: Address) -> Result<U256, ProviderError> {
        self.read(FakeRead::DiscountedSpins, |chain| {
            U256::from(chain.discounted_spins)
        })
    }

    async fn has_discount(&self, _account: Address) -> Result<bool, ProviderError> {
        self.read(FakeRead::HasDiscount, |chain| chain.has_discount)
    }

    async fn reward_pool(&self) -> Result<U256, ProviderError> {
        self.read(FakeRead::RewardPool, |chain| chain.reward_pool)
    }

    async fn send_spin(&self, value: U256, gas: &GasPolicy) -> Result<B256, ProviderError> {
        let chain = self.chain.lock().unwrap();
        if let Some(err) = &chain.send_error {
            return Err(err.clone());
        }
        if chain.balance < value {
            return Err(ProviderError::new(
                Some(-32000),
                format!(
                    "insufficient funds for gas * price + value: have {} want {value}",
                    chain.balance
                ),
            ));
        }
        self.sent.lock().unwrap().push(SentSpin { value, gas: *gas });
        Ok(Self::TX_HASH)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<SpinReceipt, ProviderError> {
        let held = self.chain.lock().unwrap().hold_receipt;
        if held {
            self.receipt_gate.notified().await;
        }
        let chain = self.chain.lock().unwrap();
        if let Some(err) = &chain.receipt_error {
            return Err(err.clone());
        }
        Ok(SpinReceipt {
            transaction_hash: tx_hash,
            success: chain.receipt_success,
            logs: chain.receipt_logs.clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletCall {
    ActiveChain,
    Switch(u64),
    AddChain(u64),
    Signer,
    Bind,
}

struct FakeWalletState {
    active_chain: u64,
    known_chains: HashSet<u64>,
    reject_switch: bool,
}

/// A browser-style wallet: it only switches to chains it knows, and learns a
/// chain when asked to add it. Clones share state.
#[derive(Clone)]
pub struct FakeWallet {
    state: Arc<Mutex<FakeWalletState>>,
    contract: FakeSpinContract,
    calls: Arc<Mutex<Vec<WalletCall>>>,
}

impl FakeWallet {
    pub const ACCOUNT: Address = address!("0x1111111111111111111111111111111111111111");

    pub fn on_chain(chain_id: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeWalletState {
                active_chain: chain_id,
                known_chains: HashSet::from([chain_id]),
                reject_switch: false,
            })),
            contract: FakeSpinContract::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn knowing(self, chain_id: u64) -> Self {
        self.state.lock().unwrap().known_chains.insert(chain_id);
        self
    }

    pub fn rejecting_switch(self) -> Self {
        self.state.lock().unwrap().reject_switch = true;
        self
    }

    /// The player approves chain switches from now on.
    pub fn accept_switch(&self) {
        self.state.lock().unwrap().reject_switch = false;
    }

    pub fn with_contract(mut self, contract: FakeSpinContract) -> Self {
        self.contract = contract;
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<WalletCall>>> {
        self.calls.clone()
    }

    fn record(&self, call: WalletCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl WalletProvider for FakeWallet {
    type Contract = FakeSpinContract;

    async fn active_chain_id(&self) -> Result<u64, ProviderError> {
        self.record(WalletCall::ActiveChain);
        Ok(self.state.lock().unwrap().active_chain)
    }

    async fn request_chain_switch(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.record(WalletCall::Switch(chain_id));
        let mut state = self.state.lock().unwrap();
        if state.reject_switch {
            return Err(ProviderError::new(Some(4001), "User rejected the request."));
        }
        if !state.known_chains.contains(&chain_id) {
            return Err(ProviderError::new(
                Some(4902),
                format!("Unrecognized chain ID \"0x{chain_id:x}\""),
            ));
        }
        state.active_chain = chain_id;
        Ok(())
    }

    async fn request_add_chain(&self, chain: &ChainDescriptor) -> Result<(), ProviderError> {
        self.record(WalletCall::AddChain(chain.chain_id));
        self.state.lock().unwrap().known_chains.insert(chain.chain_id);
        Ok(())
    }

    async fn signer_address(&self) -> Result<Address, ProviderError> {
        self.record(WalletCall::Signer);
        Ok(Self::ACCOUNT)
    }

    async fn bind_contract(&self, _address: Address) -> Result<FakeSpinContract, ProviderError> {
        self.record(WalletCall::Bind);
        Ok(self.contract.clone())
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    insufficient_funds: Mutex<Vec<bool>>,
    snapshots: Mutex<Vec<AccountSnapshot>>,
    settled: Mutex<Vec<SpinAttemptResult>>,
}

impl RecordingObserver {
    pub fn insufficient_funds_signals(&self) -> Vec<bool> {
        self.insufficient_funds.lock().unwrap().clone()
    }

    pub fn snapshots(&self) -> Vec<AccountSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn settled(&self) -> Vec<SpinAttemptResult> {
        self.settled.lock().unwrap().clone()
    }
}

impl SpinObserver for RecordingObserver {
    fn insufficient_funds(&self, raised: bool) {
        self.insufficient_funds.lock().unwrap().push(raised);
    }

    fn state_refreshed(&self, snapshot: &AccountSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn spin_settled(&self, result: &SpinAttemptResult) {
        self.settled.lock().unwrap().push(result.clone());
    }
}
