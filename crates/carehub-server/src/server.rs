use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{Json, Router, routing::get};
use carehub_auth::http::AuthState;
use carehub_auth::oauth::JwtProvider;
use carehub_auth::storage::{
    CredentialStore, MemoryCredentialStore, MemoryProgramDirectory, MemorySessionStore,
    ProgramDirectory,
};
use carehub_auth_postgres::PostgresAuthStorage;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, StorageBackend};
use crate::seed;

/// Interval between sweeps of expired flow sessions and token records.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

pub struct CarehubServer {
    addr: SocketAddr,
    app: Router,
}

/// Wires the stores, the OAuth provider and the routes.
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let (credentials, directory) = build_stores(config).await?;

    let sessions = Arc::new(MemorySessionStore::new(config.auth.session.ttl));
    let provider = Arc::new(JwtProvider::new(&config.auth.oauth)?);
    spawn_purge_task(sessions.clone(), provider.clone());

    let state = AuthState::new(
        credentials,
        sessions,
        directory,
        provider,
        &config.auth,
        config.server.request_timeout(),
    );

    Ok(carehub_auth::router(state)
        .route("/healthz", get(healthz))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
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
        ))
}

async fn build_stores(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn CredentialStore>, Arc<dyn ProgramDirectory>)> {
    match config.storage.backend {
        StorageBackend::Memory => {
            let credentials = Arc::new(MemoryCredentialStore::new());
            let directory = Arc::new(MemoryProgramDirectory::new(credentials.clone()));
            seed::apply(&config.seed, &credentials, &directory)?;
            tracing::info!("Using in-memory auth storage");
            Ok((
                credentials as Arc<dyn CredentialStore>,
                directory as Arc<dyn ProgramDirectory>,
            ))
        }
        StorageBackend::Postgres => {
            let pg = config
                .storage
                .postgres
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("storage.postgres is not configured"))?;
            let storage = PostgresAuthStorage::connect(&pg.url, pg.max_connections).await?;
            storage.migrate().await?;
            if !config.seed.users.is_empty() || !config.seed.programs.is_empty() {
                tracing::warn!("Seed data is only applied to the memory backend; ignoring");
            }
            let credentials: Arc<dyn CredentialStore> = Arc::new(storage.credentials());
            let directory: Arc<dyn ProgramDirectory> = Arc::new(storage.directory());
            Ok((credentials, directory))
        }
    }
}

fn spawn_purge_task(sessions: Arc<MemorySessionStore>, provider: Arc<JwtProvider>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let sessions_removed = sessions.purge_expired();
            let tokens_removed = provider.purge_expired();
            if sessions_removed > 0 || tokens_removed > 0 {
                tracing::debug!(sessions_removed, tokens_removed, "Purged expired auth state");
            }
        }
    });
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
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

    pub async fn build(self) -> anyhow::Result<CarehubServer> {
        let app = build_app(&self.config).await?;
        Ok(CarehubServer {
            addr: self.addr,
            app,
        })
    }
}

impl CarehubServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
