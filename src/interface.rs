//! Live Interface Reconciliation
//!
//! Makes the running interface match the server interface file with a
//! down/up cycle. The actual process invocation sits behind
//! [`InterfaceControl`] so tests can swap it out.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::WolfGuardConfig;
use crate::error::{Error, Result};

/// Control over the live interface
#[async_trait]
pub trait InterfaceControl: Send + Sync {
    /// Bring the interface down. Callers tolerate failure (it may not be up).
    async fn down(&self) -> std::result::Result<(), String>;

    /// Bring the interface up from the current configuration file
    async fn up(&self) -> std::result::Result<(), String>;
}

/// `awg-quick` / `wg-quick` driven control
#[derive(Debug, Clone)]
pub struct QuickControl {
    tool: String,
    target: String,
}

impl QuickControl {
    /// `target` is an interface name or a path to its `.conf` file
    pub fn new(tool: String, target: String) -> Self {
        Self { tool, target }
    }

    async fn run(&self, action: &str) -> std::result::Result<(), String> {
        tracing::debug!("Running {} {} {}", self.tool, action, self.target);

        let output = Command::new(&self.tool)
            .arg(action)
            .arg(&self.target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.tool, e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        Err(if detail.is_empty() {
            format!("{} {} exited with {}", self.tool, action, output.status)
        } else {
            format!("{} {}: {}", self.tool, action, detail)
        })
    }
}

#[async_trait]
impl InterfaceControl for QuickControl {
    async fn down(&self) -> std::result::Result<(), String> {
        self.run("down").await
    }

    async fn up(&self) -> std::result::Result<(), String> {
        self.run("up").await
    }
}

/// Control that does nothing, used when reconciliation is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopControl;

#[async_trait]
impl InterfaceControl for NoopControl {
    async fn down(&self) -> std::result::Result<(), String> {
        Ok(())
    }

    async fn up(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Build the control selected in the configuration
pub fn control_from_config(config: &WolfGuardConfig) -> Arc<dyn InterfaceControl> {
    if !config.reconcile.enabled {
        return Arc::new(NoopControl);
    }
    Arc::new(QuickControl::new(
        config.reconcile.tool.clone(),
        quick_target(config.config_file(), &config.interface.name),
    ))
}

/// Quick tools accept either a bare interface name (resolved in their own
/// config directory) or a path. A path is used unless the file already sits
/// where the tool would look for it under the interface name.
fn quick_target(config_file: &std::path::Path, name: &str) -> String {
    let default_dirs = [
        PathBuf::from("/etc/amnezia/amneziawg"),
        PathBuf::from("/etc/wireguard"),
    ];
    let file_name = format!("{}.conf", name);

    let in_default_dir = config_file.file_name().is_some_and(|f| f == file_name.as_str())
        && config_file
            .parent()
            .is_some_and(|p| default_dirs.iter().any(|d| d == p));

    if in_default_dir {
        name.to_string()
    } else {
        config_file.display().to_string()
    }
}

/// Applies committed configuration changes to the live interface
#[derive(Clone)]
pub struct InterfaceReconciler {
    control: Arc<dyn InterfaceControl>,
    timeout: Duration,
}

impl InterfaceReconciler {
    pub fn new(control: Arc<dyn InterfaceControl>, timeout: Duration) -> Self {
        Self { control, timeout }
    }

    /// Down (failure tolerated), then up (failure reported). `subject`
    /// names the change being applied, for error reporting.
    pub async fn apply(&self, subject: &str) -> Result<()> {
        let sync_failed = |reason: String| Error::InterfaceSyncFailed {
            username: subject.to_string(),
            reason,
        };

        match tokio::time::timeout(self.timeout, self.control.down()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Interface down failed (continuing): {}", e),
            Err(_) => tracing::warn!("Interface down timed out after {:?} (continuing)", self.timeout),
        }

        match tokio::time::timeout(self.timeout, self.control.up()).await {
            Ok(Ok(())) => {
                tracing::info!("Interface reconciled for {}", subject);
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!("Interface up failed for {}: {}", subject, e);
                Err(sync_failed(e))
            }
            Err(_) => {
                tracing::error!("Interface up timed out after {:?} for {}", self.timeout, subject);
                Err(sync_failed(format!("bring-up timed out after {:?}", self.timeout)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Scripted {
        fail_down: bool,
        fail_up: bool,
        hang_up: bool,
        downs: AtomicUsize,
        ups: AtomicUsize,
    }

    #[async_trait]
    impl InterfaceControl for Scripted {
        async fn down(&self) -> std::result::Result<(), String> {
            self.downs.fetch_add(1, Ordering::SeqCst);
            if self.fail_down {
                Err("not up".into())
            } else {
                Ok(())
            }
        }

        async fn up(&self) -> std::result::Result<(), String> {
            self.ups.fetch_add(1, Ordering::SeqCst);
            if self.hang_up {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail_up {
                Err("RTNETLINK answers: Operation not permitted".into())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_down_failure_is_tolerated() {
        let control = Arc::new(Scripted {
            fail_down: true,
            ..Default::default()
        });
        let reconciler = InterfaceReconciler::new(control.clone(), Duration::from_secs(1));
        reconciler.apply("alice").await.unwrap();
        assert_eq!(control.downs.load(Ordering::SeqCst), 1);
        assert_eq!(control.ups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_up_failure_is_reported() {
        let control = Arc::new(Scripted {
            fail_up: true,
            ..Default::default()
        });
        let reconciler = InterfaceReconciler::new(control, Duration::from_secs(1));
        let err = reconciler.apply("alice").await.unwrap_err();
        assert!(err.is_committed());
        assert!(err.to_string().contains("Operation not permitted"));
    }

    #[tokio::test]
    async fn test_up_timeout_is_reported() {
        let control = Arc::new(Scripted {
            hang_up: true,
            ..Default::default()
        });
        let reconciler = InterfaceReconciler::new(control, Duration::from_millis(50));
        assert!(matches!(
            reconciler.apply("bob").await,
            Err(Error::InterfaceSyncFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_tool_fails_up() {
        let control = QuickControl::new("wolfguard-no-such-quick".into(), "awg0".into());
        assert!(control.up().await.is_err());
    }

    #[test]
    fn test_quick_target() {
        assert_eq!(quick_target(Path::new("/etc/amnezia/amneziawg/awg0.conf"), "awg0"), "awg0");
        assert_eq!(quick_target(Path::new("/etc/wireguard/wg0.conf"), "wg0"), "wg0");
        assert_eq!(
            quick_target(Path::new("/data/awg0.conf"), "awg0"),
            "/data/awg0.conf"
        );
    }
}
