//! HTTP server accepting inbound webhooks, one route per configured
//! endpoint.
//!
//! Grounded on the teacher's `gateway/daemon.rs` (axum router + bind loop)
//! and `gateway/routes.rs` (state-threaded handlers), adapted from a
//! bearer-token-gated local control API to public per-endpoint HMAC
//! signature validation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{body::Bytes, http::{HeaderMap, StatusCode}, routing::post, Router};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::WebhookEndpointConfig;
use crate::error::{Result, ShannonError};
use crate::event_bus::{Event, EventBus};
use crate::pause::PauseManager;

use super::extractors::normalize;
use super::signature::authenticate;

struct ServerState {
    bus: Arc<dyn EventBus>,
    pause: Arc<PauseManager>,
}

/// Starts listening and returns immediately; the accept loop runs on a
/// spawned task. Call [`WebhookServer::stop`] (via the returned handle) to
/// shut the listener down as part of the shutdown sequence.
pub struct WebhookServer {
    stop_tx: tokio::sync::watch::Sender<bool>,
    local_addr: SocketAddr,
}

impl WebhookServer {
    pub async fn start(
        bind: &str,
        port: u16,
        endpoints: Vec<WebhookEndpointConfig>,
        bus: Arc<dyn EventBus>,
        pause: Arc<PauseManager>,
    ) -> Result<Self> {
        for ep in &endpoints {
            if ep.secret.is_empty() {
                warn!(endpoint = %ep.name, "webhook endpoint configured with empty secret; all requests to it will be rejected");
            }
        }

        let state = Arc::new(ServerState { bus, pause });

        let mut app = Router::new();
        for ep in endpoints {
            let shared = state.clone();
            app = app.route(
                &ep.path,
                post(move |headers: HeaderMap, body: Bytes| {
                    let shared = shared.clone();
                    let ep = ep.clone();
                    async move { handle_webhook(shared, ep, headers, body).await }
                }),
            );
        }

        let addr: SocketAddr = format!("{bind}:{port}")
            .parse()
            .map_err(|e| ShannonError::InvalidInput(format!("invalid webhook bind address: {e}")))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ShannonError::Internal(format!("failed to bind webhook server: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ShannonError::Internal(e.to_string()))?;

        let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            let serve = axum::serve(listener, app);
            tokio::select! {
                res = serve => {
                    if let Err(e) = res {
                        warn!(error = %e, "webhook server exited");
                    }
                }
                _ = stop_rx.changed() => {}
            }
        });

        info!(%local_addr, "webhook server listening");
        Ok(Self { stop_tx, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

async fn handle_webhook(
    state: Arc<ServerState>,
    endpoint: WebhookEndpointConfig,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let parsed: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return StatusCode::BAD_REQUEST,
    };

    let Some(provider) = authenticate(&endpoint.secret, &headers, &body) else {
        return StatusCode::UNAUTHORIZED;
    };

    let event = normalize(provider, &endpoint.channel, parsed);

    if state.pause.is_paused() {
        state.pause.queue_event(Event::WebhookReceived {
            event,
            prompt_template: endpoint.prompt_template.clone(),
        });
    } else {
        state.bus.publish(Event::WebhookReceived {
            event,
            prompt_template: endpoint.prompt_template.clone(),
        });
    }

    StatusCode::OK
}
