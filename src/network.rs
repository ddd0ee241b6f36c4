use alloy::primitives::{
    B256,
    U256,
    utils::format_ether,
};
use serde::{
    Deserialize,
    Serialize,
};

pub const MONAD_TESTNET_CHAIN_ID: u64 = 10143;
pub const MONAD_TESTNET_NAME: &str = "Monad Testnet";
pub const DEFAULT_MONAD_TESTNET_RPC_URL: &str = "https://testnet-rpc.monad.xyz";
pub const DEFAULT_MONAD_TESTNET_EXPLORER_URL: &str = "https://testnet.monadexplorer.com";
pub const NATIVE_SYMBOL: &str = "MON";
pub const NATIVE_DECIMALS: u8 = 18;

/// Wallet error code for a switch request naming a chain the wallet has never seen.
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Everything a wallet needs to add (and then switch to) a network.
///
/// Serializes to the parameter object of an add-chain request, with the
/// numeric id rendered as hex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDescriptor {
    #[serde(with = "hex_chain_id")]
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl ChainDescriptor {
    pub fn monad_testnet() -> Self {
        Self {
            chain_id: MONAD_TESTNET_CHAIN_ID,
            chain_name: MONAD_TESTNET_NAME.to_string(),
            native_currency: NativeCurrency {
                name: NATIVE_SYMBOL.to_string(),
                symbol: NATIVE_SYMBOL.to_string(),
                decimals: NATIVE_DECIMALS,
            },
            rpc_urls: vec![DEFAULT_MONAD_TESTNET_RPC_URL.to_string()],
            block_explorer_urls: vec![DEFAULT_MONAD_TESTNET_EXPLORER_URL.to_string()],
        }
    }

    pub fn hex_chain_id(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    pub fn primary_rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(String::as_str)
    }

    pub fn explorer_tx_url(&self, tx_hash: &B256) -> Option<String> {
        self.block_explorer_urls
            .first()
            .map(|base| format!("{}/tx/{tx_hash}", base.trim_end_matches('/')))
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_urls = vec![url.into()];
        self
    }
}

impl Default for ChainDescriptor {
    fn default() -> Self {
        Self::monad_testnet()
    }
}

/// Renders a wei amount as a decimal native-currency amount, trimming
/// trailing zeros but keeping at least one fractional digit.
pub fn format_native(amount: U256) -> String {
    let mut formatted = format_ether(amount).trim_end_matches('0').to_string();
    if formatted.ends_with('.') {
        formatted.push('0');
    }
    formatted
}

mod hex_chain_id {
    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
        de::Error,
    };

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{id:x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(D::Error::custom),
            None => raw.parse().map_err(D::Error::custom),
        }
    }
}
