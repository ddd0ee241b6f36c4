use crate::network::UNRECOGNIZED_CHAIN_CODE;

/// EIP-1193 code for a request the user declined in their wallet.
pub const USER_REJECTED_CODE: i64 = 4001;
/// JSON-RPC code nodes attach to `eth_call`/`eth_estimateGas` reverts.
pub const EXECUTION_REVERTED_CODE: i64 = 3;

/// An error as reported by a wallet, node or transport, before it is
/// interpreted. Provider-specific encodings are flattened into this shape.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub code: Option<i64>,
    pub message: String,
    pub data: Option<String>,
}

impl ProviderError {
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Some(UNRECOGNIZED_CHAIN_CODE)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to read the wallet's active chain: {0}")]
    ActiveChain(#[source] ProviderError),
    #[error("failed to switch wallet to chain {chain_id}: {source}")]
    ChainSwitch {
        chain_id: u64,
        #[source]
        source: ProviderError,
    },
    #[error("failed to add chain {chain_id} to wallet: {source}")]
    AddChain {
        chain_id: u64,
        #[source]
        source: ProviderError,
    },
    #[error("failed to resolve signer: {0}")]
    Signer(#[source] ProviderError),
    #[error("failed to bind slot machine contract: {0}")]
    Binding(#[source] ProviderError),
}

/// How a failed spin submission is reported to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureKind {
    InsufficientFunds,
    UserCancelled,
    Reverted(String),
    Network,
}

/// Maps every provider error shape onto the spin failure taxonomy.
///
/// Codes are checked before messages; message matching is case-insensitive
/// and covers the wording used by common node and wallet implementations.
pub fn classify(err: &ProviderError) -> FailureKind {
    let message = err.message.to_ascii_lowercase();

    if err.code == Some(USER_REJECTED_CODE)
        || message.contains("user rejected")
        || message.contains("user denied")
        || message.contains("action_rejected")
        || message.contains("user_rejected")
    {
        return FailureKind::UserCancelled;
    }

    if message.contains("insufficient funds")
        || message.contains("insufficient balance")
        || message.contains("insufficient_funds")
    {
        return FailureKind::InsufficientFunds;
    }

    if err.code == Some(EXECUTION_REVERTED_CODE) || message.contains("execution reverted") {
        return FailureKind::Reverted(err.message.clone());
    }

    FailureKind::Network
}
