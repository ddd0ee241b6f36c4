use alloy::{
    primitives::Address,
    signers::local::PrivateKeySigner,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use serde::Deserialize;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};
use tracing::debug;

pub const DEFAULT_WALLET_DIR: &str = "~/.poppies/wallets";
const KEYSTORE_EXTENSIONS: [&str; 2] = ["json", "wallet"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
    /// Account the keystore says it holds, read without decrypting.
    pub address: Option<Address>,
}

/// The unencrypted part of a Web3 secret-storage file.
#[derive(Deserialize)]
struct KeystoreHeader {
    address: Option<String>,
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    let raw = dir.unwrap_or(DEFAULT_WALLET_DIR);
    let expanded = shellexpand::full(raw)
        .wrap_err_with(|| format!("Failed to expand wallet directory {raw}"))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

fn keystore_name(path: &Path) -> Option<&str> {
    let ext = path.extension()?.to_str()?;
    if !KEYSTORE_EXTENSIONS.contains(&ext) {
        return None;
    }
    path.file_stem()?.to_str()
}

// Geth writes the address without a 0x prefix; both forms parse.
fn keystore_address(path: &Path) -> Option<Address> {
    let raw = fs::read_to_string(path).ok()?;
    let header: KeystoreHeader = serde_json::from_str(&raw).ok()?;
    header.address?.parse().ok()
}

/// Keystores in `dir`, sorted by file name. A missing directory has no
/// wallets.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir)
        .wrap_err_with(|| format!("Failed to read wallet directory {}", dir.display()))?;
    let mut wallets = Vec::new();
    for entry in entries {
        let path = entry.wrap_err("Failed to read wallet entry")?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = keystore_name(&path).map(str::to_owned) else {
            continue;
        };
        let address = keystore_address(&path);
        wallets.push(WalletDescriptor {
            name,
            path,
            address,
        });
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

/// Looks a keystore up by file name, or by account address since
/// eth-keystore names its files by UUID.
pub fn find_wallet(dir: &Path, wanted: &str) -> Result<WalletDescriptor> {
    let address = wanted.parse::<Address>().ok();
    list_wallets(dir)?
        .into_iter()
        .find(|w| w.name == wanted || (address.is_some() && w.address == address))
        .ok_or_else(|| eyre!("Wallet '{wanted}' not found in {}", dir.display()))
}

pub fn unlock_wallet(descriptor: &WalletDescriptor) -> Result<PrivateKeySigner> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read wallet password")?;
    decrypt_signer(descriptor, &password)
}

pub fn decrypt_signer(descriptor: &WalletDescriptor, password: &str) -> Result<PrivateKeySigner> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;
    let signer = PrivateKeySigner::from_slice(&secret).map_err(|_| {
        eyre!(
            "Wallet '{}' contained unsupported key material",
            descriptor.name
        )
    })?;
    if let Some(expected) = descriptor.address {
        if expected != signer.address() {
            return Err(eyre!(
                "Wallet '{}' decrypted to {}, but its header names {expected}",
                descriptor.name,
                signer.address()
            ));
        }
    }
    debug!(wallet = %descriptor.name, address = %signer.address(), "unlocked wallet");
    Ok(signer)
}
