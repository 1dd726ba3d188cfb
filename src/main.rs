use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fairlaunch::{
    identity::{generate_keypair, Address},
    run_scenario, Scenario, TokenConfig,
};

#[derive(Parser)]
#[command(name = "fairlaunch", version, about = "Fair-launch token ledger tools")]
struct Cli {
    /// Log filter; RUST_LOG takes precedence when set.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSON scenario of ledger calls and report each outcome.
    Run {
        scenario: PathBuf,
        /// Token config overriding the one embedded in the scenario.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the JSON report here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the address derived from a label.
    Address { label: String },
    /// Generate an ed25519 keypair and its address.
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Print or write the default token config.
    Config {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run {
            scenario,
            config,
            out,
        } => run_cmd(&scenario, config.as_deref(), out.as_deref()),
        Command::Address { label } => {
            println!("{}", Address::from_label(&label));
            Ok(())
        }
        Command::Keygen { out_dir } => keygen_cmd(&out_dir),
        Command::Config { out } => config_cmd(out.as_deref()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

fn run_cmd(path: &Path, config: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let mut scenario: Scenario = read_json(path)?;
    if let Some(config_path) = config {
        scenario.config = Some(read_json(config_path)?);
    }
    let report = run_scenario(&scenario)
        .with_context(|| format!("scenario {} aborted", path.display()))?;

    tracing::info!(
        accepted = report.accepted(),
        rejected = report.rejected(),
        state_root = %report.snapshot.state_root,
        "scenario finished"
    );

    let json = serde_json::to_string_pretty(&report)?;
    match out {
        Some(out) => {
            write_file(out, json.as_bytes())?;
            println!("report written → {}", out.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn keygen_cmd(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    let (sk, address) = generate_keypair();

    write_file(&out_dir.join("sk.hex"), hex::encode(sk.to_bytes()).as_bytes())?;
    write_file(
        &out_dir.join("pk.hex"),
        hex::encode(sk.verifying_key().as_bytes()).as_bytes(),
    )?;
    write_file(&out_dir.join("address.txt"), address.to_hex().as_bytes())?;
    println!("keypair written → {}", out_dir.display());
    Ok(())
}

fn config_cmd(out: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(&TokenConfig::default())?;
    match out {
        Some(out) => write_file(out, json.as_bytes()),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
