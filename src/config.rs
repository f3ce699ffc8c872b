//! WolfGuard Configuration
//!
//! Service configuration for the peer registry. Everything the registry needs
//! to know (file locations, client subnet, tunnel parameters) is carried in
//! one explicit value built from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::allocator::ClientSubnet;

/// Main WolfGuard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolfGuardConfig {
    /// Server interface configuration
    #[serde(default)]
    pub interface: InterfaceConfig,

    /// Client addressing and endpoint configuration
    pub network: NetworkConfig,

    /// Tunnel obfuscation parameters
    #[serde(default)]
    pub obfuscation: ObfuscationConfig,

    /// Client profile storage
    #[serde(default)]
    pub profiles: ProfilesConfig,

    /// Key generation backend
    #[serde(default)]
    pub keys: KeysConfig,

    /// Live interface reconciliation
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server interface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Interface name
    #[serde(default = "default_interface_name")]
    pub name: String,

    /// Path of the server interface file (the source of truth for peers)
    #[serde(default = "default_interface_config_file")]
    pub config_file: PathBuf,

    /// UDP listen port
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Server public key file. Derived from the interface private key when unset.
    #[serde(default)]
    pub public_key_file: Option<PathBuf>,

    /// Copy of the server private key written by `init` (mode 0600)
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
}

/// Client addressing and endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Client subnet, host octet allocation requires a /24
    #[serde(default = "default_subnet")]
    pub subnet: String,

    /// DNS servers handed to clients
    #[serde(default = "default_dns")]
    pub dns: String,

    /// Public host clients connect to
    pub endpoint_host: String,

    /// Public port clients connect to (defaults to interface.listen_port)
    #[serde(default)]
    pub endpoint_port: Option<u16>,
}

/// AmneziaWG junk packet and header obfuscation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_jc")]
    pub jc: u32,
    #[serde(default = "default_jmin")]
    pub jmin: u32,
    #[serde(default = "default_jmax")]
    pub jmax: u32,
    #[serde(default = "default_s1")]
    pub s1: u32,
    #[serde(default = "default_s2")]
    pub s2: u32,
    #[serde(default = "default_h1")]
    pub h1: u32,
    #[serde(default = "default_h2")]
    pub h2: u32,
    #[serde(default = "default_h3")]
    pub h3: u32,
    #[serde(default = "default_h4")]
    pub h4: u32,
}

/// Client profile storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesConfig {
    /// Directory holding one `<username>.conf` per peer
    #[serde(default = "default_profiles_dir")]
    pub dir: PathBuf,
}

/// Key generation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyBackend {
    /// Shell out to the tunnel tool (`awg genkey` ...)
    Tool,
    /// Generate X25519 keys in-process
    Native,
}

/// Key generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    #[serde(default = "default_key_backend")]
    pub backend: KeyBackend,

    /// Tool binary used by the `tool` backend
    #[serde(default = "default_key_tool")]
    pub tool: String,
}

/// Live interface reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Bring the interface down and up after every change
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quick tool binary (`awg-quick`, `wg-quick`)
    #[serde(default = "default_quick_tool")]
    pub tool: String,

    /// Hard limit for a single down/up invocation
    #[serde(default = "default_reconcile_timeout")]
    pub timeout_secs: u64,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Secret path prefix all routes are nested under
    #[serde(default)]
    pub secret_path: Option<String>,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,

    /// Port reported in access keys (defaults to the endpoint port)
    #[serde(default)]
    pub access_key_port: Option<u16>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_interface_name() -> String {
    "awg0".to_string()
}

fn default_interface_config_file() -> PathBuf {
    PathBuf::from("/etc/amnezia/amneziawg/awg0.conf")
}

fn default_listen_port() -> u16 {
    51820
}

fn default_subnet() -> String {
    "192.168.200.0/24".to_string()
}

fn default_dns() -> String {
    "8.8.8.8, 8.8.4.4".to_string()
}

fn default_jc() -> u32 {
    7
}

fn default_jmin() -> u32 {
    50
}

fn default_jmax() -> u32 {
    1000
}

fn default_s1() -> u32 {
    68
}

fn default_s2() -> u32 {
    149
}

fn default_h1() -> u32 {
    1106457265
}

fn default_h2() -> u32 {
    249455488
}

fn default_h3() -> u32 {
    1209847463
}

fn default_h4() -> u32 {
    1646644382
}

fn default_profiles_dir() -> PathBuf {
    PathBuf::from("/var/lib/wolfguard/user-keys")
}

fn default_key_backend() -> KeyBackend {
    KeyBackend::Tool
}

fn default_key_tool() -> String {
    "awg".to_string()
}

fn default_quick_tool() -> String {
    "awg-quick".to_string()
}

fn default_reconcile_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            name: default_interface_name(),
            config_file: default_interface_config_file(),
            listen_port: default_listen_port(),
            public_key_file: None,
            private_key_file: None,
        }
    }
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jc: default_jc(),
            jmin: default_jmin(),
            jmax: default_jmax(),
            s1: default_s1(),
            s2: default_s2(),
            h1: default_h1(),
            h2: default_h2(),
            h3: default_h3(),
            h4: default_h4(),
        }
    }
}

impl ObfuscationConfig {
    /// Render as `Key = value` lines, empty when disabled
    pub fn lines(&self) -> Vec<String> {
        if !self.enabled {
            return Vec::new();
        }
        [
            ("Jc", self.jc),
            ("Jmin", self.jmin),
            ("Jmax", self.jmax),
            ("S1", self.s1),
            ("S2", self.s2),
            ("H1", self.h1),
            ("H2", self.h2),
            ("H3", self.h3),
            ("H4", self.h4),
        ]
        .iter()
        .map(|(key, value)| format!("{} = {}", key, value))
        .collect()
    }
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            dir: default_profiles_dir(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            backend: default_key_backend(),
            tool: default_key_tool(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tool: default_quick_tool(),
            timeout_secs: default_reconcile_timeout(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            secret_path: None,
            cors_enabled: false,
            access_key_port: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WolfGuardConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfGuardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.interface.name.is_empty() {
            return Err(crate::Error::Config("interface.name cannot be empty".into()));
        }

        if self.interface.config_file.as_os_str().is_empty() {
            return Err(crate::Error::Config("interface.config_file cannot be empty".into()));
        }

        if self.network.endpoint_host.is_empty() {
            return Err(crate::Error::Config("network.endpoint_host cannot be empty".into()));
        }

        self.client_subnet()?;

        if self.reconcile.timeout_secs == 0 {
            return Err(crate::Error::Config("reconcile.timeout_secs must be positive".into()));
        }

        if let Some(secret) = &self.api.secret_path {
            if secret.is_empty() || secret.contains('/') {
                return Err(crate::Error::Config(
                    "api.secret_path must be a single non-empty path segment".into(),
                ));
            }
        }

        Ok(())
    }

    /// Get the parsed client subnet
    pub fn client_subnet(&self) -> crate::Result<ClientSubnet> {
        self.network.subnet.parse()
    }

    /// Get the port clients connect to
    pub fn endpoint_port(&self) -> u16 {
        self.network
            .endpoint_port
            .unwrap_or(self.interface.listen_port)
    }

    /// Get the `host:port` endpoint written into client profiles
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.network.endpoint_host, self.endpoint_port())
    }

    /// Get the server interface file path
    pub fn config_file(&self) -> &PathBuf {
        &self.interface.config_file
    }

    /// Get the profile directory path
    pub fn profiles_dir(&self) -> &PathBuf {
        &self.profiles.dir
    }

    /// Get reconciliation timeout as Duration
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile.timeout_secs)
    }

    /// Get the port reported in access keys
    pub fn access_key_port(&self) -> u16 {
        self.api.access_key_port.unwrap_or_else(|| self.endpoint_port())
    }
}
