use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    extract::{ConnectInfo, Path, Request, State},
    http::{HeaderMap, Method, Uri},
    middleware::{self, Next},
    response::Response,
    routing::{any, get},
    Extension, Json, Router,
};
use chrono::Utc;
use tokio::sync::watch;
use shared::protocol::{BOOTSTRAP_PATH, MANAGE_DIGEST_PATH, MANAGE_HOST_PATH, MANAGE_PATH};
use shared::types::{HostRecord, HostUpdate, MacAddress};
use crate::config::PxeConfig;
use crate::error::{BtyError, Result};
use crate::pxe::BootArtifactInstaller;
use crate::registry::RegistryHandle;
use crate::render::Templates;
use crate::resolver::AddressResolver;
use crate::store::Hosts;

#[derive(Clone)]
pub struct AppState {
    pub registry: RegistryHandle,
    pub digest_rx: watch::Receiver<String>,
    pub resolver: Arc<AddressResolver>,
    pub templates: Arc<Templates>,
    pub installer: Arc<BootArtifactInstaller>,
    pub pxe: Arc<PxeConfig>,
}

/// Hardware address of the host that sent the current request
#[derive(Debug, Clone, Copy)]
pub struct CallerHwa(pub MacAddress);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(BOOTSTRAP_PATH, any(bootstrap))
        .route(MANAGE_PATH, get(list_hosts))
        .route(MANAGE_DIGEST_PATH, get(get_digest))
        .route(MANAGE_HOST_PATH, get(get_host).put(update_host).patch(update_host))
        .fallback(diagnostics)
        .layer(middleware::from_fn_with_state(state.clone(), resolve_caller))
        .with_state(state)
}

/// Every request must come from a host we can find in the neighbour table.
async fn resolve_caller(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let address = peer.ip().to_canonical().to_string();
    let hwa = state
        .resolver
        .resolve(&address)
        .await
        .ok_or(BtyError::AddressResolution(address))?;

    tracing::info!("{} {} from {}", request.method(), request.uri(), hwa);
    request.extensions_mut().insert(CallerHwa(hwa));
    Ok(next.run(request).await)
}

async fn bootstrap(
    State(state): State<AppState>,
    Extension(CallerHwa(hwa)): Extension<CallerHwa>,
) -> Result<String> {
    let host = state.registry.get_or_create(hwa).await?;
    let script = state.templates.bootstrap(&host).await?;

    if host.managed {
        install_pxe_config(&state, &host).await;
    }

    Ok(script)
}

/// Generate and install the host's PXE config. Failures are logged only; the
/// host still receives its bootstrap script.
async fn install_pxe_config(state: &AppState, host: &HostRecord) {
    let rendered = match state.templates.pxe_config(host, &state.pxe.default_label).await {
        Ok(rendered) => rendered,
        Err(e @ BtyError::InvalidHostState { .. }) => {
            tracing::warn!("Skipping PXE config: {}", e);
            return;
        }
        Err(e) => {
            tracing::error!("Failed to generate PXE config for {}: {}", host.hwa, e);
            return;
        }
    };

    if let Err(e) = state.installer.install(host.hwa, rendered).await {
        tracing::error!("PXE config for {} not installed: {}", host.hwa, e);
    }
}

async fn list_hosts(State(state): State<AppState>) -> Result<Json<Hosts>> {
    state.registry.snapshot().await.map(Json)
}

/// Reloads the store first so hand edits to the file show up in the digest.
async fn get_digest(State(state): State<AppState>) -> Result<String> {
    state.registry.snapshot().await?;
    Ok(state.digest_rx.borrow().clone())
}

fn parse_hwa(raw: &str) -> Result<MacAddress> {
    raw.parse()
        .map_err(|e: shared::types::ParseMacError| BtyError::InvalidRequest(e.to_string()))
}

async fn get_host(
    State(state): State<AppState>,
    Path(hwa): Path<String>,
) -> Result<Json<HostRecord>> {
    let hwa = parse_hwa(&hwa)?;
    state
        .registry
        .get(hwa)
        .await?
        .map(Json)
        .ok_or(BtyError::UnknownHost(hwa))
}

async fn update_host(
    State(state): State<AppState>,
    Path(hwa): Path<String>,
    Json(update): Json<HostUpdate>,
) -> Result<Json<HostRecord>> {
    let hwa = parse_hwa(&hwa)?;

    if let Some(Some(label)) = &update.pxe_default {
        if !state.pxe.labels.contains(label) {
            return Err(BtyError::InvalidRequest(format!(
                "unknown PXE label {:?}, expected one of {:?}",
                label, state.pxe.labels
            )));
        }
    }

    state.registry.update(hwa, update).await.map(Json)
}

/// Anything unrouted gets a dump of the request and the store for operators.
async fn diagnostics(
    State(state): State<AppState>,
    Extension(CallerHwa(hwa)): Extension<CallerHwa>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<String> {
    let hosts = state.registry.snapshot().await?;
    let store = serde_json::to_string_pretty(&hosts)
        .map_err(|e| BtyError::PersistenceUnavailable(e.into()))?;
    let digest = state.digest_rx.borrow().clone();

    let headers: String = headers
        .iter()
        .map(|(name, value)| format!("  {}: {}\n", name, String::from_utf8_lossy(value.as_bytes())))
        .collect();

    Ok(format!(
        "TIME: {}\n\
         REQUEST: {} {}\n\
         REMOTE_ADDR: {}\n\
         REMOTE_HWA: {}\n\
         HEADERS:\n{}\n\
         STORE ({}): {}\n",
        Utc::now().to_rfc3339(),
        method,
        uri,
        peer,
        hwa,
        headers,
        digest,
        store
    ))
}
