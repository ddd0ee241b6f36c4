use crate::{
    orchestrator::SpinAttemptResult,
    state::AccountSnapshot,
};

/// Receives the engine's outbound signals. Every method defaults to a no-op
/// so front ends implement only what they display.
pub trait SpinObserver: Send + Sync {
    /// Raised when a spin was refused for lack of funds, lowered once a funds
    /// check finds the balance covers the next spin.
    fn insufficient_funds(&self, _raised: bool) {}

    fn state_refreshed(&self, _snapshot: &AccountSnapshot) {}

    fn spin_settled(&self, _result: &SpinAttemptResult) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl SpinObserver for NoopObserver {}
