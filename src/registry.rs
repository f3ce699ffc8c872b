//! Peer Registry
//!
//! Orchestrates peer provisioning: validates the request, allocates keys and
//! an address, writes the client profile, appends the peer to the server
//! interface file and reconciles the live interface.
//!
//! Mutations are serialized twice: a process-wide `RwLock` for concurrent
//! requests inside the daemon, and an exclusive `flock` on the config's lock
//! file for other processes. Reads take the shared side of both.
//!
//! Once the config file has been written the operation is committed. A
//! failing reconciliation afterwards is returned as
//! [`Error::InterfaceSyncFailed`] and the file is left as is; the caller can
//! retry with [`PeerRegistry::reconcile`]. The reconciliation itself runs
//! on its own task holding both locks, so dropping the caller (a client
//! disconnecting mid-request) cannot leave a half-restarted interface.

use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::allocator::AddressAllocator;
use crate::config::WolfGuardConfig;
use crate::error::{Error, Result};
use crate::interface::{self, InterfaceControl, InterfaceReconciler};
use crate::keys::{self, KeyProvider};
use crate::profile::{ClientProfile, ProfileStore, ServerProfile};
use crate::store::{validate_username, ConfigStore, FileLock, InterfaceSection, PeerRecord, ServerInterfaceConfig};

/// Result of a successful `add_peer`
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedPeer {
    pub record: PeerRecord,
    pub profile: ClientProfile,
    pub config_file: PathBuf,
}

/// One peer as reported by `list_peers`
#[derive(Debug, Clone, Serialize)]
pub struct PeerListing {
    pub username: String,
    pub ip: Ipv4Addr,
    pub public_key: String,
    pub config_file: PathBuf,
    pub config: Option<String>,
    pub has_config: bool,
}

/// Outcome of initializing a new server interface file
#[derive(Debug, Clone)]
pub struct InitReport {
    pub config_file: PathBuf,
    pub server_public_key: String,
    pub server_address: Ipv4Addr,
}

/// Where the server public key comes from
#[derive(Debug, Clone)]
enum ServerKeySource {
    File(PathBuf),
    DerivedFromInterface,
}

/// Peer registry over one server interface file
pub struct PeerRegistry {
    store: ConfigStore,
    allocator: AddressAllocator,
    profiles: ProfileStore,
    profile_template: ServerProfile,
    server_key: ServerKeySource,
    private_key_file: Option<PathBuf>,
    listen_port: u16,
    interface_name: String,
    keys: Arc<dyn KeyProvider>,
    reconciler: InterfaceReconciler,
    lock: Arc<RwLock<()>>,
}

impl PeerRegistry {
    /// Build a registry with the collaborators selected in `config`
    pub fn from_config(config: &WolfGuardConfig) -> Result<Self> {
        Self::with_collaborators(
            config,
            keys::provider_from_config(&config.keys),
            interface::control_from_config(config),
        )
    }

    /// Build a registry with explicit key and interface collaborators
    pub fn with_collaborators(
        config: &WolfGuardConfig,
        keys: Arc<dyn KeyProvider>,
        control: Arc<dyn InterfaceControl>,
    ) -> Result<Self> {
        let server_key = match &config.interface.public_key_file {
            Some(path) => ServerKeySource::File(path.clone()),
            None => ServerKeySource::DerivedFromInterface,
        };

        Ok(Self {
            store: ConfigStore::new(config.config_file().clone()),
            allocator: AddressAllocator::new(config.client_subnet()?),
            profiles: ProfileStore::new(config.profiles_dir().clone()),
            profile_template: ServerProfile::new(config, String::new(), Vec::new()),
            server_key,
            private_key_file: config.interface.private_key_file.clone(),
            listen_port: config.interface.listen_port,
            interface_name: config.interface.name.clone(),
            keys,
            reconciler: InterfaceReconciler::new(control, config.reconcile_timeout()),
            lock: Arc::new(RwLock::new(())),
        })
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    async fn file_lock(&self, exclusive: bool) -> Result<FileLock> {
        let path = self.store.lock_path();
        tokio::task::spawn_blocking(move || {
            if exclusive {
                FileLock::exclusive(&path)
            } else {
                FileLock::shared(&path)
            }
        })
        .await
        .map_err(|e| Error::Internal(format!("lock task failed: {}", e)))?
    }

    /// Take the process-wide write lock as an owned guard
    async fn write_lock(&self) -> OwnedRwLockWriteGuard<()> {
        Arc::clone(&self.lock).write_owned().await
    }

    /// Reconcile after a committed change. Runs on a separate task that owns
    /// both locks until the interface is back up; the caller only waits.
    async fn apply_committed(
        &self,
        subject: &str,
        guard: OwnedRwLockWriteGuard<()>,
        flock: FileLock,
    ) -> Result<()> {
        let reconciler = self.reconciler.clone();
        let owned_subject = subject.to_string();

        let task = tokio::spawn(async move {
            let result = reconciler.apply(&owned_subject).await;
            drop(flock);
            drop(guard);
            result
        });

        task.await.map_err(|e| Error::InterfaceSyncFailed {
            username: subject.to_string(),
            reason: format!("reconcile task failed: {}", e),
        })?
    }

    /// Public key the clients pin for the server
    fn server_public_key(&self, config: &ServerInterfaceConfig) -> Result<String> {
        match &self.server_key {
            ServerKeySource::File(path) => {
                let key = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read server public key {:?}: {}", path, e))
                })?;
                Ok(key.trim().to_string())
            }
            ServerKeySource::DerivedFromInterface => {
                let private = config.interface.private_key().ok_or_else(|| Error::ConfigCorrupt {
                    line: 0,
                    reason: "[Interface] section has no PrivateKey".into(),
                })?;
                keys::public_key_from_private(private).map_err(|e| Error::ConfigCorrupt {
                    line: 0,
                    reason: format!("[Interface] PrivateKey is unusable: {}", e),
                })
            }
        }
    }

    /// Check that the server interface file exists and parses
    pub async fn check(&self) -> Result<usize> {
        let _guard = self.lock.read().await;
        let _flock = self.file_lock(false).await?;
        Ok(self.store.load()?.peers.len())
    }

    /// Provision a new peer
    pub async fn add_peer(&self, username: &str) -> Result<ProvisionedPeer> {
        validate_username(username)?;

        let guard = self.write_lock().await;
        let flock = self.file_lock(true).await?;

        let config = self.store.load()?;
        if config.contains(username) {
            return Err(Error::PeerAlreadyExists(username.to_string()));
        }

        tracing::info!("Generating keys for {}", username);
        let keys = self.keys.generate_key_triple().await.map_err(|e| match e {
            Error::KeyGenerationFailed(_) => e,
            other => Error::KeyGenerationFailed(other.to_string()),
        })?;

        let address = self.allocator.next_after(config.addresses())?;

        let record = PeerRecord {
            username: username.to_string(),
            public_key: keys.public_key,
            preshared_key: keys.preshared_key,
            address,
        };

        let server = ServerProfile {
            public_key: self.server_public_key(&config)?,
            tunnel_lines: config.interface.tunnel_lines(),
            ..self.profile_template.clone()
        };
        let profile = ClientProfile::render(&record, &keys.private_key, &server);
        let config_file = self.profiles.write(&profile)?;

        if let Err(e) = self.store.append_peer(&record) {
            self.profiles.remove(username);
            return Err(e);
        }
        tracing::info!("Added peer {} with address {}", username, address);

        self.apply_committed(username, guard, flock).await?;

        Ok(ProvisionedPeer {
            record,
            profile,
            config_file,
        })
    }

    /// Revoke a peer and delete its client profile
    pub async fn remove_peer(&self, username: &str) -> Result<()> {
        if validate_username(username).is_err() {
            return Err(Error::PeerNotFound(username.to_string()));
        }

        let guard = self.write_lock().await;
        let flock = self.file_lock(true).await?;

        let removed = self.store.remove_peer(username)?;
        if !self.profiles.remove(username) {
            tracing::debug!("No client profile to delete for {}", username);
        }
        tracing::info!("Removed peer {} ({})", username, removed.address);

        self.apply_committed(username, guard, flock).await
    }

    /// All peers in file order, with their client profiles
    pub async fn list_peers(&self) -> Result<Vec<PeerListing>> {
        let _guard = self.lock.read().await;
        let _flock = self.file_lock(false).await?;

        self.store
            .list_peers()?
            .into_iter()
            .map(|record| self.listing(record))
            .collect()
    }

    /// One peer by username
    pub async fn get_peer(&self, username: &str) -> Result<PeerListing> {
        if validate_username(username).is_err() {
            return Err(Error::PeerNotFound(username.to_string()));
        }

        let _guard = self.lock.read().await;
        let _flock = self.file_lock(false).await?;

        let record = self
            .store
            .load()?
            .remove_peer(username)
            .ok_or_else(|| Error::PeerNotFound(username.to_string()))?;
        self.listing(record)
    }

    fn listing(&self, record: PeerRecord) -> Result<PeerListing> {
        let config = self.profiles.read(&record.username)?;
        Ok(PeerListing {
            config_file: self.profiles.path_for(&record.username),
            has_config: config.is_some(),
            config,
            ip: record.address,
            public_key: record.public_key,
            username: record.username,
        })
    }

    /// Re-apply the current file to the live interface
    pub async fn reconcile(&self) -> Result<()> {
        let guard = self.write_lock().await;
        let flock = self.file_lock(true).await?;

        self.store.load()?;
        self.apply_committed(&self.interface_name, guard, flock).await
    }

    /// Create the server interface file with fresh server keys
    pub async fn initialize(&self, obfuscation_lines: &[String]) -> Result<InitReport> {
        let _guard = self.lock.write().await;
        let _flock = self.file_lock(true).await?;

        let keys = self.keys.generate_key_triple().await?;
        let server_address = self.allocator.subnet().server_address();
        let interface = InterfaceSection::new(
            &keys.private_key,
            server_address,
            self.listen_port,
            obfuscation_lines,
        );

        self.store.initialize(interface)?;
        self.profiles.ensure_dir()?;

        if let ServerKeySource::File(path) = &self.server_key {
            write_key_file(path, &keys.public_key)?;
        }
        // Written owner-only, like the interface file that already holds it
        if let Some(path) = &self.private_key_file {
            write_key_file(path, &keys.private_key)?;
        }

        tracing::info!("Initialized server interface config at {:?}", self.store.path());
        Ok(InitReport {
            config_file: self.store.path().to_path_buf(),
            server_public_key: keys.public_key,
            server_address,
        })
    }
}

fn write_key_file(path: &std::path::Path, key: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    crate::store::write_atomic(path, format!("{}\n", key).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::NoopControl;
    use crate::keys::KeyTriple;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    #[derive(Default)]
    struct CountingKeys {
        issued: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl KeyProvider for CountingKeys {
        async fn generate_key_triple(&self) -> Result<KeyTriple> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::KeyGenerationFailed("awg genkey: not found".into()));
            }
            let n = self.issued.fetch_add(1, Ordering::SeqCst) as u8;
            Ok(KeyTriple {
                private_key: BASE64.encode([n; 32]),
                public_key: BASE64.encode([n.wrapping_add(100); 32]),
                preshared_key: BASE64.encode([n.wrapping_add(200); 32]),
            })
        }
    }

    #[derive(Default)]
    struct FlakyControl {
        fail_up: AtomicBool,
        slow_up: AtomicBool,
        up_started: tokio::sync::Notify,
        ups: AtomicUsize,
    }

    #[async_trait]
    impl InterfaceControl for FlakyControl {
        async fn down(&self) -> std::result::Result<(), String> {
            Err("interface awg0 is not up".into())
        }

        async fn up(&self) -> std::result::Result<(), String> {
            self.up_started.notify_one();
            if self.slow_up.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            }
            self.ups.fetch_add(1, Ordering::SeqCst);
            if self.fail_up.load(Ordering::SeqCst) {
                Err("awg-quick up: exit status 1".into())
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        dir: TempDir,
        registry: PeerRegistry,
        keys: Arc<CountingKeys>,
        control: Arc<FlakyControl>,
    }

    impl Fixture {
        fn config_path(&self) -> std::path::PathBuf {
            self.dir.path().join("awg0.conf")
        }

        fn config_bytes(&self) -> Vec<u8> {
            std::fs::read(self.config_path()).unwrap()
        }
    }

    fn test_config(dir: &Path) -> WolfGuardConfig {
        let toml = format!(
            r#"
[interface]
config_file = "{}"

[network]
endpoint_host = "vpn.example.com"

[profiles]
dir = "{}"
"#,
            dir.join("awg0.conf").display(),
            dir.join("user-keys").display()
        );
        WolfGuardConfig::from_str(&toml).unwrap()
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let server_private = BASE64.encode([7u8; 32]);
        std::fs::write(
            dir.path().join("awg0.conf"),
            format!(
                "[Interface]\nPrivateKey = {}\nAddress = 192.168.200.1/32\nListenPort = 51820\n\nJc = 7\n",
                server_private
            ),
        )
        .unwrap();

        let keys = Arc::new(CountingKeys::default());
        let control = Arc::new(FlakyControl::default());
        let registry =
            PeerRegistry::with_collaborators(&test_config(dir.path()), keys.clone(), control.clone())
                .unwrap();

        Fixture {
            dir,
            registry,
            keys,
            control,
        }
    }

    fn summary(peers: &[PeerListing]) -> Vec<(String, String)> {
        peers
            .iter()
            .map(|p| (p.username.clone(), p.ip.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_alice_bob_scenario() {
        let fx = fixture();

        fx.registry.add_peer("alice").await.unwrap();
        let peers = fx.registry.list_peers().await.unwrap();
        assert_eq!(summary(&peers), vec![("alice".into(), "192.168.200.2".into())]);

        let bob = fx.registry.add_peer("bob").await.unwrap();
        assert_eq!(bob.record.address, Ipv4Addr::new(192, 168, 200, 3));

        fx.registry.remove_peer("alice").await.unwrap();
        let peers = fx.registry.list_peers().await.unwrap();
        assert_eq!(summary(&peers), vec![("bob".into(), "192.168.200.3".into())]);
        assert!(!fx.registry.profiles().path_for("alice").exists());
        assert_eq!(fx.control.ups.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_add_persists_profile() {
        let fx = fixture();
        let added = fx.registry.add_peer("john_2").await.unwrap();

        let listing = fx.registry.get_peer("john_2").await.unwrap();
        assert!(listing.has_config);
        assert_eq!(listing.config.as_deref(), Some(added.profile.text.as_str()));
        assert_eq!(listing.public_key, added.record.public_key);

        let text = &added.profile.text;
        assert!(text.contains(&format!("PrivateKey = {}\n", BASE64.encode([0u8; 32]))));
        assert!(text.contains("Address = 192.168.200.2/32\n"));
        assert!(text.contains("Endpoint = vpn.example.com:51820\n"));
        assert!(text.contains(&format!(
            "PublicKey = {}\n",
            keys::public_key_from_private(&BASE64.encode([7u8; 32])).unwrap()
        )));
        assert!(text.contains(&format!("PresharedKey = {}\n", added.record.preshared_key)));
    }

    #[tokio::test]
    async fn test_add_allocates_above_existing() {
        let fx = fixture();
        for name in ["a", "b", "c"] {
            fx.registry.add_peer(name).await.unwrap();
        }
        fx.registry.remove_peer("b").await.unwrap();

        let added = fx.registry.add_peer("d").await.unwrap();
        assert_eq!(added.record.address, Ipv4Addr::new(192, 168, 200, 5));
    }

    #[tokio::test]
    async fn test_duplicate_add_leaves_file_identical() {
        let fx = fixture();
        fx.registry.add_peer("alice").await.unwrap();
        let before = fx.config_bytes();
        let issued = fx.keys.issued.load(Ordering::SeqCst);

        assert!(matches!(
            fx.registry.add_peer("alice").await,
            Err(Error::PeerAlreadyExists(_))
        ));
        assert_eq!(fx.config_bytes(), before);
        assert_eq!(fx.keys.issued.load(Ordering::SeqCst), issued);
    }

    #[tokio::test]
    async fn test_invalid_usernames_rejected_without_side_effects() {
        let fx = fixture();
        let before = fx.config_bytes();
        for name in ["bad name", "user!", "", "../etc"] {
            assert!(matches!(
                fx.registry.add_peer(name).await,
                Err(Error::InvalidUsername(_))
            ));
        }
        assert_eq!(fx.config_bytes(), before);
        assert_eq!(fx.control.ups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remove_absent_leaves_file_unchanged() {
        let fx = fixture();
        fx.registry.add_peer("alice").await.unwrap();
        let before = fx.config_bytes();

        assert!(matches!(
            fx.registry.remove_peer("mallory").await,
            Err(Error::PeerNotFound(_))
        ));
        assert!(matches!(
            fx.registry.remove_peer("../alice").await,
            Err(Error::PeerNotFound(_))
        ));
        assert_eq!(fx.config_bytes(), before);
    }

    #[tokio::test]
    async fn test_add_then_remove_restores_peer_set() {
        let fx = fixture();
        fx.registry.add_peer("alice").await.unwrap();
        let before = fx.registry.store().load().unwrap().peers;

        fx.registry.add_peer("bob").await.unwrap();
        fx.registry.remove_peer("bob").await.unwrap();
        assert_eq!(fx.registry.store().load().unwrap().peers, before);
    }

    #[tokio::test]
    async fn test_remove_without_profile_is_ok() {
        let fx = fixture();
        fx.registry.add_peer("alice").await.unwrap();
        std::fs::remove_file(fx.registry.profiles().path_for("alice")).unwrap();

        let listing = fx.registry.get_peer("alice").await.unwrap();
        assert!(!listing.has_config);
        fx.registry.remove_peer("alice").await.unwrap();
    }

    #[tokio::test]
    async fn test_key_failure_has_no_side_effects() {
        let fx = fixture();
        let before = fx.config_bytes();
        fx.keys.fail.store(true, Ordering::SeqCst);

        assert!(matches!(
            fx.registry.add_peer("alice").await,
            Err(Error::KeyGenerationFailed(_))
        ));
        assert_eq!(fx.config_bytes(), before);
        assert!(!fx.registry.profiles().path_for("alice").exists());
    }

    #[tokio::test]
    async fn test_sync_failure_is_reported_but_committed() {
        let fx = fixture();
        fx.control.fail_up.store(true, Ordering::SeqCst);

        let err = fx.registry.add_peer("alice").await.unwrap_err();
        assert!(err.is_committed());

        let peers = fx.registry.list_peers().await.unwrap();
        assert_eq!(summary(&peers), vec![("alice".into(), "192.168.200.2".into())]);
        assert!(peers[0].has_config);

        assert!(fx.registry.reconcile().await.is_err());
        fx.control.fail_up.store(false, Ordering::SeqCst);
        fx.registry.reconcile().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_add_still_brings_interface_up() {
        let fx = fixture();
        fx.control.slow_up.store(true, Ordering::SeqCst);

        // The add future is dropped as soon as `up` is running
        tokio::select! {
            _ = fx.registry.add_peer("alice") => panic!("add finished before up started"),
            _ = fx.control.up_started.notified() => {}
        }
        assert_eq!(fx.control.ups.load(Ordering::SeqCst), 0);

        // Waits for the write lock, which the reconcile task holds until `up` ends
        let peers = fx.registry.list_peers().await.unwrap();
        assert_eq!(summary(&peers), vec![("alice".into(), "192.168.200.2".into())]);
        assert_eq!(fx.control.ups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_profile_mirrors_server_tunnel_parameters() {
        let fx = fixture();
        std::fs::write(
            fx.config_path(),
            format!(
                "[Interface]\nPrivateKey = {}\nAddress = 192.168.200.1/32\nListenPort = 51820\nPostUp = iptables -A FORWARD -i awg0 -j ACCEPT\n\nJc = 3\nS1 = 20\nH1 = 111\n",
                BASE64.encode([7u8; 32])
            ),
        )
        .unwrap();

        let added = fx.registry.add_peer("alice").await.unwrap();
        let text = &added.profile.text;
        assert!(text.contains("\nJc = 3\nS1 = 20\nH1 = 111\n"));
        assert!(!text.contains("H1 = 1106457265"));
        assert!(!text.contains("Jmin"));
        assert!(!text.contains("PostUp"));
    }

    #[tokio::test]
    async fn test_profile_without_tunnel_parameters_for_plain_server() {
        let fx = fixture();
        std::fs::write(
            fx.config_path(),
            format!(
                "[Interface]\nPrivateKey = {}\nAddress = 192.168.200.1/32\nListenPort = 51820\n",
                BASE64.encode([7u8; 32])
            ),
        )
        .unwrap();

        let added = fx.registry.add_peer("alice").await.unwrap();
        assert!(added.profile.text.contains("DNS = 8.8.8.8, 8.8.4.4\n\n[Peer]\n"));
        assert!(!added.profile.text.contains("Jc ="));
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_config() {
        let fx = fixture();
        std::fs::write(fx.config_path(), "ListenPort = 51820\n").unwrap();
        assert!(matches!(
            fx.registry.add_peer("alice").await,
            Err(Error::ConfigCorrupt { .. })
        ));

        std::fs::remove_file(fx.config_path()).unwrap();
        assert!(matches!(
            fx.registry.list_peers().await,
            Err(Error::ConfigMissing(_))
        ));
        assert!(fx.registry.check().await.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_concurrent_adds_get_distinct_addresses() {
        let fx = fixture();
        let registry = Arc::new(fx.registry);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.add_peer(&format!("user_{}", i)).await })
            })
            .collect();

        let mut addresses = Vec::new();
        for task in tasks {
            addresses.push(task.await.unwrap().unwrap().record.address);
        }
        addresses.sort();
        addresses.dedup();
        assert_eq!(addresses.len(), 8);
        assert_eq!(registry.list_peers().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_initialize_fresh_server() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.interface.public_key_file = Some(dir.path().join("server-keys").join("public.key"));
        let registry =
            PeerRegistry::with_collaborators(&config, Arc::new(keys::NativeKeyProvider), Arc::new(NoopControl))
                .unwrap();

        let report = registry.initialize(&config.obfuscation.lines()).await.unwrap();
        assert_eq!(report.server_address, Ipv4Addr::new(192, 168, 200, 1));
        assert_eq!(registry.check().await.unwrap(), 0);
        assert!(registry.initialize(&[]).await.is_err());

        let stored = std::fs::read_to_string(dir.path().join("server-keys").join("public.key")).unwrap();
        assert_eq!(stored.trim(), report.server_public_key);

        let added = registry.add_peer("alice").await.unwrap();
        assert!(added
            .profile
            .text
            .contains(&format!("PublicKey = {}\n", report.server_public_key)));
        assert!(added.profile.text.contains("H4 = 1646644382\n"));
    }

    #[tokio::test]
    async fn test_initialize_writes_private_key_file() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        let private_path = dir.path().join("server-keys").join("private.key");
        config.interface.private_key_file = Some(private_path.clone());
        let registry =
            PeerRegistry::with_collaborators(&config, Arc::new(keys::NativeKeyProvider), Arc::new(NoopControl))
                .unwrap();

        let report = registry.initialize(&[]).await.unwrap();

        let stored = std::fs::read_to_string(&private_path).unwrap();
        assert_eq!(keys::public_key_from_private(stored.trim()).unwrap(), report.server_public_key);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&private_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
