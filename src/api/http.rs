//! HTTP API Server
//!
//! REST API exposing the peer registry as access keys.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, State, Json},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{ApiConfig, WolfGuardConfig};
use crate::registry::{PeerListing, PeerRegistry, ProvisionedPeer};
use crate::error::{Error, Result};

/// Cipher name reported in access keys
const ACCESS_KEY_METHOD: &str = "chacha20-ietf-poly1305";

/// Shared application state
pub struct AppState {
    /// Peer registry
    pub registry: Arc<PeerRegistry>,
    /// Interface name, reported as server id
    pub server_id: String,
    /// Port reported in access keys
    pub access_key_port: u16,
    /// Server start time in unix milliseconds
    pub started_at_ms: u64,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: &WolfGuardConfig, registry: Arc<PeerRegistry>) -> Self {
        let started_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        let state = Arc::new(AppState {
            registry,
            server_id: config.interface.name.clone(),
            access_key_port: config.access_key_port(),
            started_at_ms,
        });

        Self {
            config: config.api.clone(),
            state,
        }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router
    pub fn router(&self) -> Router {
        let routes = Router::new()
            .route("/health", get(handle_health))
            .route("/server", get(handle_server_info))
            .route("/access-keys", get(handle_list_keys).post(handle_create_key))
            .route("/access-keys/:id", get(handle_get_key).delete(handle_delete_key));

        let app = match &self.config.secret_path {
            Some(secret) => Router::new().nest(&format!("/{}", secret), routes),
            None => routes,
        };

        let app = app
            .fallback(handle_not_found)
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http());

        if self.config.cors_enabled {
            app.layer(CorsLayer::permissive())
        } else {
            app
        }
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping HTTP API");
}

// ============ Request/Response Types ============

/// Create access key request
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CreateAccessKeyRequest {
    pub name: Option<String>,
}

/// Access key, one per peer
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    pub id: String,
    pub name: String,
    pub password: String,
    pub port: u16,
    pub method: String,
    pub access_url: String,
}

impl AccessKey {
    fn new(username: String, profile: String, port: u16) -> Self {
        Self {
            id: username.clone(),
            name: username,
            password: String::new(),
            port,
            method: ACCESS_KEY_METHOD.to_string(),
            access_url: profile,
        }
    }

    fn from_listing(listing: PeerListing, port: u16) -> Self {
        Self::new(listing.username, listing.config.unwrap_or_default(), port)
    }

    fn from_provisioned(peer: ProvisionedPeer, port: u16) -> Self {
        Self::new(peer.record.username, peer.profile.text, port)
    }
}

/// Access key list response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyList {
    pub access_keys: Vec<AccessKey>,
}

/// Server info response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfoResponse {
    pub name: String,
    pub server_id: String,
    pub metrics_enabled: bool,
    pub created_timestamp_ms: u64,
    pub port_for_new_access_keys: u16,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    /// Set when the config file was changed despite the error
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub committed: bool,
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::InvalidUsername(_) => StatusCode::BAD_REQUEST,
        Error::PeerNotFound(_) => StatusCode::NOT_FOUND,
        Error::PeerAlreadyExists(_) => StatusCode::CONFLICT,
        Error::InterfaceSyncFailed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: Error) -> Response {
    let status = status_for(&error);
    if error.is_client_error() {
        tracing::debug!("Request rejected: {}", error);
    } else {
        tracing::error!("Request failed: {}", error);
    }

    (
        status,
        Json(ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
            committed: error.is_committed(),
        }),
    )
        .into_response()
}

/// Random base-36 name for keys created without one
fn random_name() -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut n: u32 = rand::thread_rng().gen_range(1..1_000_000_000);
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

// ============ Handlers ============

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "WireGuard API server is running".to_string(),
    })
}

async fn handle_server_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ServerInfoResponse {
        name: "WolfGuard VPN Server".to_string(),
        server_id: state.server_id.clone(),
        metrics_enabled: false,
        created_timestamp_ms: state.started_at_ms,
        port_for_new_access_keys: state.access_key_port,
    })
}

async fn handle_create_key(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateAccessKeyRequest>>,
) -> Response {
    let name = body
        .and_then(|Json(req)| req.name)
        .unwrap_or_else(random_name);
    tracing::info!("Creating access key for {}", name);

    match state.registry.add_peer(&name).await {
        Ok(peer) => (
            StatusCode::CREATED,
            Json(AccessKey::from_provisioned(peer, state.access_key_port)),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_list_keys(State(state): State<Arc<AppState>>) -> Response {
    match state.registry.list_peers().await {
        Ok(peers) => Json(AccessKeyList {
            access_keys: peers
                .into_iter()
                .map(|p| AccessKey::from_listing(p, state.access_key_port))
                .collect(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_get_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.registry.get_peer(&id).await {
        Ok(peer) => Json(AccessKey::from_listing(peer, state.access_key_port)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_delete_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.registry.remove_peer(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_not_found(method: Method, uri: Uri) -> Response {
    tracing::info!("Unimplemented endpoint: {} {}", method, uri);
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            code: "ENDPOINT_NOT_FOUND".to_string(),
            message: format!("Endpoint {} {} not implemented", method, uri),
            committed: false,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::NoopControl;
    use crate::keys::NativeKeyProvider;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn server(secret: Option<&str>) -> (TempDir, HttpServer) {
        let dir = tempdir().unwrap();
        let mut toml = format!(
            "[interface]\nconfig_file = \"{}\"\n[network]\nendpoint_host = \"203.0.113.7\"\n[profiles]\ndir = \"{}\"\n[api]\naccess_key_port = 12345\n",
            dir.path().join("awg0.conf").display(),
            dir.path().join("user-keys").display()
        );
        if let Some(secret) = secret {
            toml.push_str(&format!("secret_path = \"{}\"\n", secret));
        }
        let config = WolfGuardConfig::from_str(&toml).unwrap();
        let registry = PeerRegistry::with_collaborators(
            &config,
            Arc::new(NativeKeyProvider),
            Arc::new(NoopControl),
        )
        .unwrap();

        let native = NativeKeyProvider.generate();
        std::fs::write(
            dir.path().join("awg0.conf"),
            format!("[Interface]\nPrivateKey = {}\nAddress = 192.168.200.1/32\nListenPort = 51820\n", native.private_key),
        )
        .unwrap();

        (dir, HttpServer::new(&config, Arc::new(registry)))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_access_key_lifecycle() {
        let (_dir, server) = server(None);
        let app = server.router();

        let (status, body) = send(&app, "POST", "/access-keys", Some(r#"{"name":"alice"}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        let key: AccessKey = serde_json::from_slice(&body).unwrap();
        assert_eq!(key.id, "alice");
        assert_eq!(key.port, 12345);
        assert_eq!(key.method, ACCESS_KEY_METHOD);
        assert!(key.access_url.contains("Endpoint = 203.0.113.7:51820"));

        let (status, body) = send(&app, "GET", "/access-keys", None).await;
        assert_eq!(status, StatusCode::OK);
        let list: AccessKeyList = serde_json::from_slice(&body).unwrap();
        assert_eq!(list.access_keys.len(), 1);
        assert_eq!(list.access_keys[0].access_url, key.access_url);

        let (status, _) = send(&app, "GET", "/access-keys/alice", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "POST", "/access-keys", Some(r#"{"name":"alice"}"#)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.code, "PEER_ALREADY_EXISTS");

        let (status, _) = send(&app, "DELETE", "/access-keys/alice", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, "GET", "/access-keys/alice", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.code, "PEER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_create_without_body_uses_random_name() {
        let (_dir, server) = server(None);
        let app = server.router();

        let (status, body) = send(&app, "POST", "/access-keys", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let key: AccessKey = serde_json::from_slice(&body).unwrap();
        assert!(!key.name.is_empty());
        assert!(crate::store::validate_username(&key.name).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_name_is_bad_request() {
        let (_dir, server) = server(None);
        let app = server.router();

        let (status, body) = send(&app, "POST", "/access-keys", Some(r#"{"name":"bad name"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.code, "INVALID_USERNAME");
        assert!(!err.committed);
    }

    #[tokio::test]
    async fn test_secret_path_prefix() {
        let (_dir, server) = server(Some("s3cr3t"));
        let app = server.router();

        let (status, _) = send(&app, "GET", "/s3cr3t/health", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.code, "ENDPOINT_NOT_FOUND");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&Error::InterfaceSyncFailed {
                username: "a".into(),
                reason: "r".into()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status_for(&Error::ConfigMissing("x".into())), StatusCode::INTERNAL_SERVER_ERROR);

        for error in [
            Error::InvalidUsername("a b".into()),
            Error::PeerAlreadyExists("alice".into()),
            Error::PeerNotFound("bob".into()),
            Error::AddressPoolExhausted("192.168.200.0/24".into()),
        ] {
            assert_eq!(status_for(&error).is_client_error(), error.is_client_error());
        }
    }

    #[test]
    fn test_random_name_is_base36() {
        for _ in 0..100 {
            let name = random_name();
            assert!(!name.is_empty() && name.len() <= 6);
            assert!(name.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
        }
    }
}
