//! WolfGuard - WireGuard Peer Registry
//!
//! Command-line front end and API daemon for the peer registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfguard::api::HttpServer;
use wolfguard::config::{KeyBackend, KeysConfig, WolfGuardConfig};
use wolfguard::error::{Error, Result};
use wolfguard::keys;
use wolfguard::privilege;
use wolfguard::registry::PeerRegistry;

/// WolfGuard - WireGuard Peer Registry
#[derive(Parser)]
#[command(name = "wolfguard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/wolfguard/wolfguard.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides logging.level
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the server interface file with fresh server keys
    Init,

    /// Serve the access-key HTTP API
    Serve,

    /// Add a peer and print its client profile
    Add {
        /// Peer username (letters, digits, underscore)
        username: String,
    },

    /// Remove a peer
    Remove {
        /// Peer username
        username: String,
    },

    /// List peers
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the client profile of a peer
    Show {
        /// Peer username
        username: String,
    },

    /// Restart the interface so it matches the config file
    Reconcile,

    /// Validate configuration file
    Validate,

    /// Generate and print a key triple
    Genkey {
        /// Key backend (defaults to keys.backend from the configuration)
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Tool,
    Native,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = WolfGuardConfig::from_file(&cli.config);

    // Initialize logging
    let (level, format) = match &loaded {
        Ok(config) => (
            cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone()),
            config.logging.format.clone(),
        ),
        Err(_) => (
            cli.log_level.clone().unwrap_or_else(|| "info".to_string()),
            "pretty".to_string(),
        ),
    };
    init_logging(&level, &format);

    let result = match cli.command {
        Commands::Validate => run_validate(&cli.config, loaded),
        Commands::Genkey { backend } => run_genkey(backend, loaded.ok()).await,
        command => match loaded {
            Ok(config) => run_command(command, config).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        if e.is_fatal() {
            tracing::error!("Fatal: {}", e);
        }
        eprintln!("✗ {}", e);
        if matches!(e, Error::PrivilegeRequired) {
            privilege::print_sudo_hint();
        }
        std::process::exit(1);
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "compact" {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Run a command that needs the registry
async fn run_command(command: Commands, config: WolfGuardConfig) -> Result<()> {
    // Every registry command touches root-owned files or the interface
    privilege::require_root()?;

    let registry = PeerRegistry::from_config(&config)?;

    match command {
        Commands::Init => run_init(&config, &registry).await,
        Commands::Serve => run_serve(&config, registry).await,
        Commands::Add { username } => run_add(&registry, &username).await,
        Commands::Remove { username } => run_remove(&registry, &username).await,
        Commands::List { json } => run_list(&registry, json).await,
        Commands::Show { username } => run_show(&registry, &username).await,
        Commands::Reconcile => run_reconcile(&registry).await,
        Commands::Validate | Commands::Genkey { .. } => {
            Err(Error::Internal("command does not use the registry".into()))
        }
    }
}

/// Initialize the server interface file
async fn run_init(config: &WolfGuardConfig, registry: &PeerRegistry) -> Result<()> {
    let report = registry.initialize(&config.obfuscation.lines()).await?;

    println!("✓ Server interface initialized");
    println!("  Config File:    {}", report.config_file.display());
    println!("  Address:        {}/32", report.server_address);
    println!("  Listen Port:    {}", config.interface.listen_port);
    println!("  Public Key:     {}", report.server_public_key);
    println!("  Profiles:       {}", registry.profiles().dir().display());
    println!();
    println!("Bring the interface up, then add peers with: wolfguard add <username>");

    Ok(())
}

/// Serve the HTTP API until shutdown
async fn run_serve(config: &WolfGuardConfig, registry: PeerRegistry) -> Result<()> {
    tracing::info!("Starting WolfGuard");
    tracing::info!("Interface: {}", registry.interface_name());
    tracing::info!("Config file: {:?}", config.config_file());

    let peers = registry.check().await?;
    tracing::info!("Loaded {} peers", peers);

    if !config.api.enabled {
        tracing::warn!("HTTP API disabled, nothing to serve");
        return Ok(());
    }

    let server = HttpServer::new(config, Arc::new(registry));
    server.start().await?;

    tracing::info!("WolfGuard stopped");
    Ok(())
}

/// Add a peer
async fn run_add(registry: &PeerRegistry, username: &str) -> Result<()> {
    let peer = match registry.add_peer(username).await {
        Ok(peer) => peer,
        Err(e) if e.is_committed() => {
            eprintln!("! Peer {} was written but the interface was not updated", username);
            eprintln!("  Retry with: wolfguard reconcile");
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    println!("✓ Added peer {}", peer.record.username);
    println!("  Address:        {}/32", peer.record.address);
    println!("  Public Key:     {}", peer.record.public_key);
    println!("  Profile:        {}", peer.config_file.display());
    println!();
    print!("{}", peer.profile.text);

    Ok(())
}

/// Remove a peer
async fn run_remove(registry: &PeerRegistry, username: &str) -> Result<()> {
    match registry.remove_peer(username).await {
        Ok(()) => {
            println!("✓ Removed peer {}", username);
            Ok(())
        }
        Err(e) if e.is_committed() => {
            eprintln!("! Peer {} was removed but the interface was not updated", username);
            eprintln!("  Retry with: wolfguard reconcile");
            Err(e)
        }
        Err(e) => Err(e),
    }
}

/// List peers
async fn run_list(registry: &PeerRegistry, json: bool) -> Result<()> {
    let peers = registry.list_peers().await?;

    if json {
        let out = serde_json::to_string_pretty(&peers)
            .map_err(|e| Error::Internal(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    if peers.is_empty() {
        println!("No peers configured");
        return Ok(());
    }

    println!("{:<20} {:<16} {:<46} {}", "USERNAME", "ADDRESS", "PUBLIC KEY", "PROFILE");
    for peer in &peers {
        println!(
            "{:<20} {:<16} {:<46} {}",
            peer.username,
            peer.ip,
            peer.public_key,
            if peer.has_config { "yes" } else { "missing" }
        );
    }
    println!();
    println!("{} peer(s)", peers.len());

    Ok(())
}

/// Print a peer's client profile
async fn run_show(registry: &PeerRegistry, username: &str) -> Result<()> {
    let peer = registry.get_peer(username).await?;
    match peer.config {
        Some(text) => print!("{}", text),
        None => {
            eprintln!("Peer {} has no stored profile at {}", username, peer.config_file.display());
            println!("Address:        {}/32", peer.ip);
            println!("Public Key:     {}", peer.public_key);
        }
    }
    Ok(())
}

/// Restart the interface
async fn run_reconcile(registry: &PeerRegistry) -> Result<()> {
    registry.reconcile().await?;
    println!("✓ Interface {} reconciled", registry.interface_name());
    Ok(())
}

/// Validate configuration
fn run_validate(config_path: &Path, loaded: Result<WolfGuardConfig>) -> Result<()> {
    match loaded {
        Ok(config) => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!("  Interface:      {}", config.interface.name);
            println!("  Config File:    {}", config.config_file().display());
            println!("  Subnet:         {}", config.network.subnet);
            println!("  Endpoint:       {}", config.endpoint());
            println!("  Obfuscation:    {}", config.obfuscation.enabled);
            println!("  Key Backend:    {:?}", config.keys.backend);
            println!("  Reconcile:      {}", config.reconcile.enabled);
            println!("  API:            {} ({})", config.api.enabled, config.api.bind_address);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Generate a key triple
async fn run_genkey(backend: Option<BackendArg>, config: Option<WolfGuardConfig>) -> Result<()> {
    let mut keys_config = config.map(|c| c.keys).unwrap_or_else(KeysConfig::default);
    match backend {
        Some(BackendArg::Tool) => keys_config.backend = KeyBackend::Tool,
        Some(BackendArg::Native) => keys_config.backend = KeyBackend::Native,
        None => {}
    }

    let triple = keys::provider_from_config(&keys_config)
        .generate_key_triple()
        .await?;

    println!("PrivateKey = {}", triple.private_key);
    println!("PublicKey = {}", triple.public_key);
    println!("PresharedKey = {}", triple.preshared_key);

    Ok(())
}
