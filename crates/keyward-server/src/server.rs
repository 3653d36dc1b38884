use std::net::SocketAddr;
use std::time::Duration;

use axum::{Router, routing::get};
use keyward_auth::http::AuthStores;
use keyward_auth::token::{JwtService, SigningKeyPair};
use keyward_auth::{AuthState, SweepTargets, auth_router, spawn_sweeper};
use tower_http::trace::TraceLayer;

use crate::{config::AppConfig, handlers};

pub struct KeywardServer {
    addr: SocketAddr,
    app: Router,
    sweep_targets: SweepTargets,
    sweep_interval: Duration,
}

/// Wires the authorization core from configuration over in-memory stores.
pub fn build_state(cfg: &AppConfig) -> anyhow::Result<AuthState> {
    let clients = cfg.registered_clients().map_err(anyhow::Error::msg)?;
    let signing_key = SigningKeyPair::from_config(&cfg.auth.signing)?;
    tracing::info!(
        algorithm = %signing_key.algorithm.as_str(),
        kid = %signing_key.kid,
        "Signing key loaded"
    );

    let jwt = JwtService::new(signing_key, &cfg.auth.issuer, &cfg.auth.audience);
    let stores = AuthStores::in_memory(clients);
    tracing::info!(clients = cfg.clients.len(), "Client store seeded");

    Ok(AuthState::new(cfg.auth.clone(), stores, jwt)?)
}

pub fn build_app(state: AuthState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        // Health endpoint
        .route("/healthz", get(handlers::healthz))
        // Token introspection for relying services
        .route("/whoami", get(handlers::whoami))
        // OAuth endpoints
        .merge(auth_router::<AuthState>())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    // Query strings carry codes and states; log the path only.
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.path = %req.uri().path(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<KeywardServer> {
        let state = build_state(&self.config)?;
        let sweep_targets = state.sweep_targets();
        let app = build_app(state, &self.config);

        Ok(KeywardServer {
            addr: self.addr,
            app,
            sweep_targets,
            sweep_interval: self.config.auth.sweep.interval,
        })
    }
}

impl KeywardServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let sweeper = spawn_sweeper(self.sweep_targets, self.sweep_interval);
        let result = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        sweeper.abort();

        result?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
