use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use poppies_slot::{
    SlotClient,
    SpinAttemptResult,
    config::{
        AppConfig,
        ConfigOverrides,
    },
    observer::SpinObserver,
    rpc::KeystoreWallet,
    state::FundsCheck,
    wallets,
};
use std::{
    path::PathBuf,
    sync::Arc,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Spin the Poppies slot machine from a terminal", long_about = None)]
struct Args {
    /// JSON config file (defaults to ./poppies.json when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    rpc_url: Option<String>,

    /// Slot machine contract address
    #[arg(long)]
    contract: Option<String>,

    /// Keystore file name or account address inside the wallet directory
    #[arg(short, long)]
    wallet: Option<String>,

    /// Override the keystore directory (defaults to ~/.poppies/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,

    #[arg(long)]
    log_dir: Option<String>,

    /// Log to stderr instead of the rolling log file
    #[arg(long)]
    log_stderr: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show balance, bonus spins, next spin cost and the reward pool
    Status,
    /// Spin the slot machine
    Spin {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
    /// Refresh and report whether the balance covers the next spin
    CheckFunds,
    /// List keystores in the wallet directory
    Wallets,
}

struct ConsoleObserver;

impl SpinObserver for ConsoleObserver {
    fn insufficient_funds(&self, raised: bool) {
        if raised {
            println!("Not enough MON for this spin. Top up, then run `poppies check-funds`.");
        } else {
            println!("Balance covers the next spin again.");
        }
    }
}

fn init_tracing(config: &AppConfig, log_stderr: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| eyre!("Failed to install tracing subscriber: {e}"))?;
        return Ok(None);
    }

    let dir = config.log_dir();
    std::fs::create_dir_all(&dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(&dir, "poppies.log"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("Failed to install tracing subscriber: {e}"))?;
    Ok(Some(guard))
}

fn build_client(config: &AppConfig) -> Result<SlotClient<KeystoreWallet>> {
    let dir = config.wallet_dir()?;
    let descriptor = wallets::find_wallet(&dir, config.wallet_name()?)?;
    let signer = wallets::unlock_wallet(&descriptor)?;
    let wallet = KeystoreWallet::new(signer);
    Ok(SlotClient::new(
        Arc::new(wallet),
        config.network.clone(),
        config.contract_address()?,
        config.gas,
        config.spin,
        Arc::new(ConsoleObserver),
    ))
}

fn print_status(client: &SlotClient<KeystoreWallet>) {
    let snapshot = client.snapshot();
    println!("Network:        {}", client.chain().chain_name);
    println!("Balance:        {} MON", snapshot.balance);
    println!("Free spins:     {}", snapshot.bonus.free_spins);
    println!(
        "Discount:       {} ({} discounted spins)",
        if snapshot.bonus.has_discount { "yes" } else { "no" },
        snapshot.bonus.discounted_spins
    );
    println!("Next spin:      {}", client.spin_cost().label());
    println!("Reward pool:    {} MON", snapshot.reward_pool);
    if !client.network_available() {
        println!("Network unavailable, values may be stale.");
    }
}

fn print_result(client: &SlotClient<KeystoreWallet>, result: &SpinAttemptResult) {
    match result {
        SpinAttemptResult::Success(outcome) => {
            println!("[ {} ]", outcome.combination.join(" | "));
            if outcome.is_win() {
                println!("Won {} MON", outcome.mon_reward);
                if outcome.extra_spins_granted > 0 {
                    println!("+{} free spins", outcome.extra_spins_granted);
                }
                if outcome.nft_won {
                    println!("Poppies NFT won!");
                }
                if outcome.rarest_pending {
                    println!("Rarest NFT pending");
                }
                if outcome.new_discount_granted {
                    println!("Discount unlocked");
                }
            } else {
                println!("No win this time.");
            }
        }
        SpinAttemptResult::Rejected(reason) => println!("Spin rejected: {reason}"),
        SpinAttemptResult::Reverted(message) => println!("Spin reverted: {message}"),
        SpinAttemptResult::NoOutcomeEvent { .. } => {
            println!("Spin was paid for but its result could not be read.")
        }
        SpinAttemptResult::Unconfirmed { .. } => {
            println!("Spin not confirmed yet; check the explorer before spinning again.")
        }
        SpinAttemptResult::NetworkUnavailable => println!("Network unavailable, try again."),
    }
    if let Some(url) = client.explorer_url(result) {
        println!("Transaction:    {url}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?.with_overrides(ConfigOverrides {
        rpc_url: args.rpc_url,
        contract_address: args.contract,
        wallet: args.wallet,
        wallet_dir: args.wallet_dir,
        log_dir: args.log_dir,
    });
    let _guard = init_tracing(&config, args.log_stderr)?;
    tracing::info!("starting poppies client");

    if let Command::Wallets = args.command {
        let dir = config.wallet_dir()?;
        for wallet in wallets::list_wallets(&dir)? {
            let address = wallet
                .address
                .map_or_else(|| "unknown".to_string(), |a| a.to_string());
            println!("{}\t{address}\t{}", wallet.name, wallet.path.display());
        }
        return Ok(());
    }

    let client = build_client(&config)?;
    client
        .connect()
        .await
        .wrap_err("Failed to set up wallet session")?;

    match args.command {
        Command::Status => print_status(&client),
        Command::Spin { count } => {
            for round in 1..=count {
                println!("Spin {round}/{count} for {}", client.spin_cost().label());
                let result = client.spin().await;
                print_result(&client, &result);
                if !matches!(result, SpinAttemptResult::Success(_)) {
                    break;
                }
                if round < count {
                    tokio::time::sleep(config.spin.refresh_delay()).await;
                    client.refresh().await;
                }
            }
        }
        Command::CheckFunds => match client.check_funds().await {
            FundsCheck::Sufficient => print_status(&client),
            FundsCheck::Insufficient { cost, .. } => {
                println!(
                    "Balance {} MON does not cover the next spin ({}).",
                    client.snapshot().balance,
                    cost.label()
                );
            }
        },
        Command::Wallets => {}
    }
    client.disconnect();
    Ok(())
}
