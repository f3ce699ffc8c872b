//! WolfGuardCtl - Command line tool for a running WolfGuard API
//!
//! Usage:
//!   wolfguardctl list            - List access keys
//!   wolfguardctl add [name]      - Create an access key
//!   wolfguardctl remove <name>   - Delete an access key
//!   wolfguardctl show <name>     - Print the client profile of a key
//!   wolfguardctl health          - Check the API is up

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use wolfguard::api::{AccessKey, AccessKeyList, CreateAccessKeyRequest, ErrorResponse};

/// WolfGuard Control Tool
#[derive(Parser)]
#[command(name = "wolfguardctl")]
#[command(about = "Manage peers through the WolfGuard HTTP API", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "/etc/wolfguard/wolfguard.toml")]
    config: PathBuf,

    /// API base URL including the secret path (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List access keys
    List,
    /// Create an access key (random name when omitted)
    Add {
        name: Option<String>,
    },
    /// Delete an access key
    Remove {
        name: String,
    },
    /// Print the client profile of an access key
    Show {
        name: String,
    },
    /// Check the API is reachable
    Health,
}

// ============ Config ============

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    api: ApiConfig,
}

#[derive(Debug, Deserialize)]
struct ApiConfig {
    #[serde(default = "default_api_bind")]
    bind_address: String,
    #[serde(default)]
    secret_path: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_api_bind(),
            secret_path: None,
        }
    }
}

fn default_api_bind() -> String {
    "0.0.0.0:8443".to_string()
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    message: String,
}

/// Build the base URL from the API section of the service config
fn endpoint_from_api(api: &ApiConfig) -> String {
    // Listening on all interfaces, talk to loopback
    let addr = match api.bind_address.strip_prefix("0.0.0.0:") {
        Some(port) => format!("127.0.0.1:{}", port),
        None => api.bind_address.clone(),
    };

    match &api.secret_path {
        Some(secret) => format!("http://{}/{}", addr, secret),
        None => format!("http://{}", addr),
    }
}

fn resolve_endpoint(cli_endpoint: Option<&str>, config_path: &Path) -> String {
    if let Some(endpoint) = cli_endpoint {
        return endpoint.trim_end_matches('/').to_string();
    }

    let api = std::fs::read_to_string(config_path)
        .ok()
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.api)
        .unwrap_or_default();

    endpoint_from_api(&api)
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let endpoint = resolve_endpoint(cli.endpoint.as_deref(), &cli.config);
    let client = reqwest::Client::new();

    let result = match &cli.command {
        Commands::List => list_keys(&client, &endpoint).await,
        Commands::Add { name } => add_key(&client, &endpoint, name.clone()).await,
        Commands::Remove { name } => remove_key(&client, &endpoint, name).await,
        Commands::Show { name } => show_key(&client, &endpoint, name).await,
        Commands::Health => health(&client, &endpoint).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

// ============ Commands ============

/// Turn a non-success response into an error carrying the API message
async fn check(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match response.json::<ErrorResponse>().await {
        Ok(err) if err.committed => bail!(
            "{} ({}): {}; the config file was changed, run `wolfguard reconcile` on the server",
            status, err.code, err.message
        ),
        Ok(err) => bail!("{} ({}): {}", status, err.code, err.message),
        Err(_) => bail!("API error: {}", status),
    }
}

async fn list_keys(client: &reqwest::Client, endpoint: &str) -> anyhow::Result<()> {
    let url = format!("{}/access-keys", endpoint);
    let response = client.get(&url).send().await.with_context(|| format!("GET {}", url))?;
    let list: AccessKeyList = check(response).await?.json().await?;

    if list.access_keys.is_empty() {
        println!("No access keys");
        return Ok(());
    }

    println!("{:<20} {:<8} {}", "NAME", "PORT", "ADDRESS");
    println!("{}", "-".repeat(45));
    for key in &list.access_keys {
        println!("{:<20} {:<8} {}", key.name, key.port, profile_address(&key.access_url));
    }
    println!();
    println!("{} key(s)", list.access_keys.len());

    Ok(())
}

async fn add_key(client: &reqwest::Client, endpoint: &str, name: Option<String>) -> anyhow::Result<()> {
    let url = format!("{}/access-keys", endpoint);
    let response = client
        .post(&url)
        .json(&CreateAccessKeyRequest { name })
        .send()
        .await
        .with_context(|| format!("POST {}", url))?;
    let key: AccessKey = check(response).await?.json().await?;

    eprintln!("✓ Created access key {}", key.name);
    print!("{}", key.access_url);

    Ok(())
}

async fn remove_key(client: &reqwest::Client, endpoint: &str, name: &str) -> anyhow::Result<()> {
    let url = format!("{}/access-keys/{}", endpoint, name);
    let response = client.delete(&url).send().await.with_context(|| format!("DELETE {}", url))?;
    check(response).await?;

    println!("✓ Removed access key {}", name);
    Ok(())
}

async fn show_key(client: &reqwest::Client, endpoint: &str, name: &str) -> anyhow::Result<()> {
    let url = format!("{}/access-keys/{}", endpoint, name);
    let response = client.get(&url).send().await.with_context(|| format!("GET {}", url))?;
    let key: AccessKey = check(response).await?.json().await?;

    if key.access_url.is_empty() {
        bail!("access key {} has no stored profile", name);
    }
    print!("{}", key.access_url);

    Ok(())
}

async fn health(client: &reqwest::Client, endpoint: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", endpoint);
    let response = client.get(&url).send().await.with_context(|| format!("GET {}", url))?;
    let health: HealthResponse = check(response).await?.json().await?;

    println!("{}: {}", health.status, health.message);
    Ok(())
}

/// `Address = ...` value of a profile, for display
fn profile_address(profile: &str) -> &str {
    profile
        .lines()
        .filter_map(|line| line.split_once('='))
        .find(|(key, _)| key.trim() == "Address")
        .map(|(_, value)| value.trim())
        .unwrap_or("-")
}
