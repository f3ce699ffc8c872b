//! Key Provisioning
//!
//! Supplies the private/public/preshared key triple for a new peer. The
//! default backend shells out to the tunnel tool (`awg genkey`, `awg pubkey`,
//! `awg genpsk`); the native backend generates X25519 keys in-process.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::config::{KeyBackend, KeysConfig};
use crate::error::{Error, Result};

/// Upper bound for a single key tool invocation
const TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Key material for one peer, base64 encoded
#[derive(Clone, PartialEq, Eq)]
pub struct KeyTriple {
    pub private_key: String,
    pub public_key: String,
    pub preshared_key: String,
}

impl std::fmt::Debug for KeyTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyTriple")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .field("preshared_key", &"<redacted>")
            .finish()
    }
}

/// Source of peer key material
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Generate a fresh private/public/preshared key triple
    async fn generate_key_triple(&self) -> Result<KeyTriple>;
}

/// Build the provider selected in the configuration
pub fn provider_from_config(config: &KeysConfig) -> Arc<dyn KeyProvider> {
    match config.backend {
        KeyBackend::Tool => Arc::new(ToolKeyProvider::new(config.tool.clone())),
        KeyBackend::Native => Arc::new(NativeKeyProvider),
    }
}

/// Check that a base64 string decodes to a 32-byte key
pub fn is_valid_key(b64: &str) -> bool {
    BASE64
        .decode(b64.trim())
        .map(|bytes| bytes.len() == 32)
        .unwrap_or(false)
}

/// Derive the base64 public key of a base64 X25519 private key
pub fn public_key_from_private(private_b64: &str) -> Result<String> {
    let bytes = BASE64
        .decode(private_b64.trim())
        .map_err(|e| Error::KeyGenerationFailed(format!("private key is not base64: {}", e)))?;
    let key_bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::KeyGenerationFailed("private key must be 32 bytes".into()))?;

    let secret = StaticSecret::from(key_bytes);
    Ok(BASE64.encode(PublicKey::from(&secret).as_bytes()))
}

/// Generates keys with the tunnel tool binary
#[derive(Debug, Clone)]
pub struct ToolKeyProvider {
    tool: String,
}

impl ToolKeyProvider {
    pub fn new(tool: String) -> Self {
        Self { tool }
    }

    /// Run `<tool> <subcommand>`, optionally feeding stdin, and return the
    /// trimmed stdout
    async fn run(&self, subcommand: &str, input: Option<&str>) -> Result<String> {
        let command = format!("{} {}", self.tool, subcommand);
        let fail = |detail: String| Error::KeyGenerationFailed(format!("{}: {}", command, detail));

        let mut child = Command::new(&self.tool)
            .arg(subcommand)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| fail(e.to_string()))?;

        if let Some(input) = input {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| fail("stdin unavailable".into()))?;
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| fail(e.to_string()))?;
            drop(stdin);
        }

        let output = tokio::time::timeout(TOOL_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| fail(format!("timed out after {:?}", TOOL_TIMEOUT)))?
            .map_err(|e| fail(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(fail(if detail.is_empty() {
                format!("exited with {}", output.status)
            } else {
                detail.to_string()
            }));
        }

        let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !is_valid_key(&key) {
            return Err(fail("returned an invalid key".into()));
        }
        Ok(key)
    }
}

#[async_trait]
impl KeyProvider for ToolKeyProvider {
    async fn generate_key_triple(&self) -> Result<KeyTriple> {
        let private_key = self.run("genkey", None).await?;
        let public_key = self.run("pubkey", Some(&private_key)).await?;
        let preshared_key = self.run("genpsk", None).await?;

        Ok(KeyTriple {
            private_key,
            public_key,
            preshared_key,
        })
    }
}

/// Generates X25519 keys in-process
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeKeyProvider;

impl NativeKeyProvider {
    pub fn generate(&self) -> KeyTriple {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = PublicKey::from(&secret);

        let mut psk = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut psk);

        KeyTriple {
            private_key: BASE64.encode(secret.to_bytes()),
            public_key: BASE64.encode(public.as_bytes()),
            preshared_key: BASE64.encode(psk),
        }
    }
}

#[async_trait]
impl KeyProvider for NativeKeyProvider {
    async fn generate_key_triple(&self) -> Result<KeyTriple> {
        Ok(self.generate())
    }
}
