//! DS3OS Loader entry point.
//!
//! Loads configuration, wires the infrastructure adapters into a
//! [`LoaderSession`], and runs one CLI command against it.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config_from()        -- settings, manual imports, known builds
//!  └─ detect_machine_addresses() -- public override or HTTP echo, LAN address
//!  └─ LoaderSession::from_config()
//!       ├─ LaunchPipeline       (NativeProcessLauncher, FingerprintRecognizer)
//!       ├─ MasterServerClient   (OfflineMasterServer)
//!       └─ SystemHostLookup
//!  └─ command
//!       ├─ list / sort          -- refresh, filter, print
//!       ├─ import / remove      -- edit manual imports, save config
//!       ├─ export               -- write one server to an import file
//!       └─ launch               -- run the pipeline, then poll liveness
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use ds3os_core::{HostLookup, ServerEntry, SortColumn};
use ds3os_loader::application::launch::{
    LaunchPipeline, LaunchSettings, LaunchWarning, PasswordPrompt,
};
use ds3os_loader::application::session::LoaderSession;
use ds3os_loader::infrastructure::master_server::{MasterServerClient, OfflineMasterServer};
use ds3os_loader::infrastructure::network::{
    detect_machine_addresses, HttpEchoProvider, NoPublicAddress, PublicAddressProvider,
    SystemHostLookup,
};
use ds3os_loader::infrastructure::process::{NativeProcessLauncher, ProcessLauncher};
use ds3os_loader::infrastructure::recognizer::FingerprintRecognizer;
use ds3os_loader::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, BuildEntry, LoaderConfig,
};

#[derive(Debug, Parser)]
#[command(name = "ds3os-loader", version, about = "Launch the game connected to a community server")]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, env = "DS3OS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Refresh and print the server list.
    List {
        /// Only show servers whose name or description contains TEXT.
        #[arg(long, value_name = "TEXT")]
        search: Option<String>,
    },
    /// Import a server from a `.ds3osconfig` file.
    Import { file: PathBuf },
    /// Remove a manually imported server.
    Remove { hostname: String },
    /// Write a server to a `.ds3osconfig` file for sharing.
    Export { hostname: String, file: PathBuf },
    /// Launch the game connected to a server and wait for it to exit.
    Launch {
        hostname: String,
        /// Game executable; remembered for later launches.
        #[arg(long, value_name = "PATH")]
        exe: Option<PathBuf>,
    },
    /// Print the server list sorted by a column.
    Sort {
        column: Column,
        /// Sort descending instead of ascending.
        #[arg(long)]
        descending: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Column {
    Name,
    Players,
    Description,
}

impl From<Column> for SortColumn {
    fn from(column: Column) -> Self {
        match column {
            Column::Name => SortColumn::Name,
            Column::Players => SortColumn::PlayerCount,
            Column::Description => SortColumn::Description,
        }
    }
}

/// Reads the password from stdin; an empty line cancels.
struct StdinPasswordPrompt;

#[async_trait]
impl PasswordPrompt for StdinPasswordPrompt {
    async fn request_password(&self, entry: &ServerEntry) -> Option<String> {
        let name = if entry.display_name.is_empty() {
            entry.hostname.clone()
        } else {
            entry.display_name.clone()
        };
        eprint!("Password for {name} (empty to cancel): ");

        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .ok()?
        .ok()?;

        let password = line.trim_end_matches(['\r', '\n']).to_string();
        (!password.is_empty()).then_some(password)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path().context("locating config file")?,
    };
    let config = load_config_from(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.loader.log_level)),
        )
        .init();

    info!(config = %config_path.display(), "DS3OS loader starting");

    let public_override = config.network.public_ip;
    let provider = public_address_provider(&config);
    let machine =
        tokio::task::spawn_blocking(move || detect_machine_addresses(public_override, provider.as_ref()))
            .await
            .context("detecting machine addresses")?;
    let lookup: Arc<dyn HostLookup> = Arc::new(SystemHostLookup);
    let master: Arc<dyn MasterServerClient> = Arc::new(OfflineMasterServer);
    let recognizer = Arc::new(FingerprintRecognizer::new(
        config.builds.iter().map(BuildEntry::to_recognizer_entry),
    ));
    if recognizer.is_empty() {
        warn!("no executable builds are configured; launching will be refused");
    }

    let pipeline = LaunchPipeline::new(
        NativeProcessLauncher::new(),
        Arc::clone(&master),
        recognizer,
        Arc::clone(&lookup),
    )
    .with_machine_addresses(machine)
    .with_settings(LaunchSettings {
        steam_app_id: config.loader.steam_app_id,
        single_instance_guard: config.loader.single_instance_guard.clone(),
    });
    let mut session = LoaderSession::from_config(&config, pipeline, master, lookup);

    match cli.command {
        Command::List { search } => {
            session.refresh().await;
            if let Some(search) = search {
                let mut filter = session.filter().clone();
                filter.search = search;
                session.set_filter(filter);
            }
            print_servers(&session, &config);
        }
        Command::Sort { column, descending } => {
            session.refresh().await;
            session.cycle_sort(column.into());
            if descending {
                session.cycle_sort(column.into());
            }
            print_servers(&session, &config);
        }
        Command::Import { file } => {
            let entry = session
                .import(&file)
                .with_context(|| format!("importing {}", file.display()))?;
            println!("Imported {} ({})", entry.display_name, entry.hostname);
            save(&session, &config, &config_path)?;
        }
        Command::Remove { hostname } => {
            session
                .remove(&hostname)
                .with_context(|| format!("removing {hostname}"))?;
            println!("Removed {hostname}");
            save(&session, &config, &config_path)?;
        }
        Command::Export { hostname, file } => {
            session
                .export(&hostname, &file)
                .with_context(|| format!("exporting {hostname}"))?;
            println!("Exported {hostname} to {}", file.display());
        }
        Command::Launch { hostname, exe } => {
            if let Some(exe) = exe {
                session.set_exe_location(exe);
            }
            session.refresh().await;
            let result = session.launch(&hostname, &StdinPasswordPrompt).await;
            // Persist the exe location and any fetched key even on failure.
            save(&session, &config, &config_path)?;
            let outcome = result.with_context(|| format!("launching {hostname}"))?;

            println!(
                "Started {} (pid {}) connecting to {}",
                outcome.version_name, outcome.process_id, outcome.connection_hostname
            );
            for warning in &outcome.warnings {
                match warning {
                    LaunchWarning::PatchIncomplete { written, expected } => println!(
                        "Warning: only {written} of {expected} patch bytes were written; \
                         the game may or may not work"
                    ),
                }
            }
            wait_for_exit(&mut session, &config).await;
        }
    }

    Ok(())
}

/// An empty echo URL switches public address detection off.
fn public_address_provider(config: &LoaderConfig) -> Box<dyn PublicAddressProvider> {
    let url = config.network.public_ip_echo_url.trim();
    if url.is_empty() {
        return Box::new(NoPublicAddress);
    }
    let provider = HttpEchoProvider::new(
        url,
        Duration::from_secs(config.network.public_ip_timeout_secs.max(1)),
    );
    debug!(url = provider.url(), "public address echo enabled");
    Box::new(provider)
}

fn print_servers<L: ProcessLauncher>(session: &LoaderSession<L>, config: &LoaderConfig) {
    let sorter = session.registry().sorter();
    println!(
        "{:<10} {:<32} {:>14}  {:<40} {}",
        "",
        sorter.header_label(SortColumn::Name),
        sorter.header_label(SortColumn::PlayerCount),
        sorter.header_label(SortColumn::Description),
        "Hostname"
    );
    for entry in session.visible_servers() {
        let badge = entry.badge(Some(config.loader.official_hostname.as_str()));
        println!(
            "{:<10} {:<32} {:>14}  {:<40} {}",
            format!("{badge:?}"),
            entry.display_name,
            entry.player_count,
            entry.description,
            entry.hostname
        );
    }
}

fn save<L: ProcessLauncher>(
    session: &LoaderSession<L>,
    config: &LoaderConfig,
    path: &std::path::Path,
) -> anyhow::Result<()> {
    save_config_to(path, &session.to_config(config))
        .with_context(|| format!("saving config to {}", path.display()))
}

/// Polls liveness until the game exits, refreshing the directory on the
/// configured interval.  Ctrl-C stops waiting without touching the game.
async fn wait_for_exit<L: ProcessLauncher>(session: &mut LoaderSession<L>, config: &LoaderConfig) {
    let mut liveness =
        tokio::time::interval(Duration::from_secs(config.network.liveness_interval_secs.max(1)));
    let mut refresh =
        tokio::time::interval(Duration::from_secs(config.network.refresh_interval_secs.max(1)));
    // The first tick of each interval completes immediately.
    refresh.tick().await;

    loop {
        tokio::select! {
            _ = liveness.tick() => {
                if !session.poll_liveness() {
                    println!("Game exited");
                    break;
                }
            }
            _ = refresh.tick() => {
                session.request_refresh();
            }
            Some(event) = session.next_event() => {
                session.apply(event);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("stopped waiting for the game");
                break;
            }
        }
    }
}
