use crate::{
    gas::GasConfig,
    network::ChainDescriptor,
    orchestrator::SpinSettings,
    wallets,
};
use alloy::primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEFAULT_CONFIG_FILE: &str = "poppies.json";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Everything a front end needs to build a [`crate::SlotClient`]. Every field
/// has a default, so a config file only lists what it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: ChainDescriptor,
    pub contract_address: Option<String>,
    pub gas: GasConfig,
    pub spin: SpinSettings,
    pub wallet_dir: Option<String>,
    pub wallet: Option<String>,
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: ChainDescriptor::monad_testnet(),
            contract_address: None,
            gas: GasConfig::default(),
            spin: SpinSettings::default(),
            wallet_dir: None,
            wallet: None,
            log_dir: DEFAULT_LOG_DIR.to_string(),
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub rpc_url: Option<String>,
    pub contract_address: Option<String>,
    pub wallet: Option<String>,
    pub wallet_dir: Option<String>,
    pub log_dir: Option<String>,
}

impl AppConfig {
    /// Reads `path` if given. Without a path, `poppies.json` in the working
    /// directory is used when present, and defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&raw).wrap_err_with(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).wrap_err("Failed to parse config JSON")
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(url) = overrides.rpc_url {
            self.network = self.network.with_rpc_url(url);
        }
        if let Some(address) = overrides.contract_address {
            self.contract_address = Some(address);
        }
        if let Some(wallet) = overrides.wallet {
            self.wallet = Some(wallet);
        }
        if let Some(dir) = overrides.wallet_dir {
            self.wallet_dir = Some(dir);
        }
        if let Some(dir) = overrides.log_dir {
            self.log_dir = dir;
        }
        self
    }

    pub fn contract_address(&self) -> Result<Address> {
        let raw = self.contract_address.as_deref().ok_or_else(|| {
            eyre!("No slot machine contract configured; set contract_address or pass --contract")
        })?;
        raw.parse::<Address>()
            .map_err(|e| eyre!("Invalid contract address '{raw}': {e}"))
    }

    pub fn wallet_name(&self) -> Result<&str> {
        self.wallet
            .as_deref()
            .ok_or_else(|| eyre!("Specify --wallet <name> to select a keystore"))
    }

    pub fn wallet_dir(&self) -> Result<PathBuf> {
        wallets::resolve_wallet_dir(self.wallet_dir.as_deref())
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.log_dir).into_owned())
    }
}
