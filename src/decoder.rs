use crate::{
    contract::SpinReceipt,
    network::format_native,
    slot_types::SlotMachine::SpinResult,
};
use alloy::{
    primitives::{
        B256,
        Log,
        U256,
    },
    sol_types::SolEvent,
};
use tracing::debug;

/// A decoded spin result. Values are taken from the event as emitted, with
/// no range checks: the contract is the authority on what a spin paid out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpinOutcome {
    pub combination: Vec<String>,
    pub mon_reward: String,
    pub mon_reward_wei: U256,
    pub extra_spins_granted: u64,
    pub nft_won: bool,
    pub rarest_pending: bool,
    pub discount_applied: bool,
    pub new_discount_granted: bool,
    pub transaction_hash: B256,
}

impl SpinOutcome {
    fn from_event(event: SpinResult, transaction_hash: B256) -> Self {
        Self {
            combination: event.combination.split('|').map(str::to_owned).collect(),
            mon_reward: format_native(event.monReward),
            mon_reward_wei: event.monReward,
            extra_spins_granted: event.extraSpins.saturating_to(),
            nft_won: event.poppiesNftWon,
            rarest_pending: event.rarestPending,
            discount_applied: event.discountApplied,
            new_discount_granted: event.newDiscountGranted,
            transaction_hash,
        }
    }

    pub fn is_win(&self) -> bool {
        !self.mon_reward_wei.is_zero()
            || self.extra_spins_granted > 0
            || self.nft_won
            || self.rarest_pending
            || self.new_discount_granted
    }
}

pub fn decode_outcome(receipt: &SpinReceipt) -> Option<SpinOutcome> {
    decode_logs(&receipt.logs, receipt.transaction_hash)
}

/// Scans logs in node order and decodes the first `SpinResult`. Logs that do
/// not decode as `SpinResult` are skipped.
pub fn decode_logs(logs: &[Log], transaction_hash: B256) -> Option<SpinOutcome> {
    logs.iter().enumerate().find_map(|(index, log)| {
        match SpinResult::decode_log_data(&log.data) {
            Ok(event) => {
                debug!(index, "found SpinResult log");
                Some(SpinOutcome::from_event(event, transaction_hash))
            }
            Err(e) => {
                debug!(index, address = %log.address, error = %e, "skipping log");
                None
            }
        }
    })
}
