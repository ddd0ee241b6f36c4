pub mod client;
pub mod config;
pub mod contract;
pub mod decoder;
pub mod error;
pub mod gas;
pub mod network;
pub mod observer;
pub mod orchestrator;
pub mod rpc;
pub mod session;
pub mod state;
pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub mod slot_types {
    use alloy::sol;

    sol! {
        #[derive(Debug, PartialEq, Eq)]
        #[sol(rpc)]
        contract SlotMachine {
            event SpinResult(
                string combination,
                uint256 monReward,
                uint256 extraSpins,
                bool poppiesNftWon,
                bool rarestPending,
                bool discountApplied,
                bool newDiscountGranted
            );

            function spin() external payable;
            function freeSpins(address player) external view returns (uint256);
            function discountedSpins(address player) external view returns (uint256);
            function hasDiscount(address player) external view returns (bool);
            function getRewardPool() external view returns (uint256);
        }
    }
}

pub use client::SlotClient;
pub use decoder::SpinOutcome;
pub use orchestrator::{
    RejectReason,
    SpinAttemptResult,
};
pub use state::{
    AccountBonusState,
    SpinCost,
    compute_spin_cost,
};
