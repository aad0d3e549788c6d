//! # Server
//!
//! Owns the store, the change bus and the coordinator, and serves them
//! over HTTP and WebSocket.
//!
//! Lifecycle: `new` → `start(addr)` (binds and serves on a spawned task)
//! → `wait_close` (returns after `close()` or Ctrl-C). Closing stops
//! accepting connections and deregisters every live session.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::config::ServerConfig;
use super::realtime_routes::realtime_routes;
use super::routes::document_routes;
use crate::auth::AccessFilter;
use crate::core::{RequestRouter, WriteCoordinator};
use crate::realtime::{ChangeBus, SessionConfig};
use crate::storage::{KeyStore, StorageError};

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Server lifecycle errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Server already started")]
    AlreadyStarted,

    #[error("Server not started")]
    NotStarted,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Server task failed: {0}")]
    Task(String),
}

/// State shared by every handler
pub struct AppState {
    pub router: RequestRouter,
    pub tick_interval: Duration,
    pub shutdown: watch::Receiver<bool>,
}

/// Real-time document server
pub struct Server {
    config: ServerConfig,
    store: Arc<KeyStore>,
    bus: Arc<ChangeBus>,
    coordinator: Arc<WriteCoordinator>,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl Server {
    /// Build a server from configuration, replaying the journal if a data
    /// directory is configured. `force_patch` is fixed from here on.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;

        let store = match &config.data_dir {
            Some(dir) => KeyStore::open(dir)?,
            None => KeyStore::new(),
        };
        let store = Arc::new(store);
        let bus = Arc::new(ChangeBus::new(SessionConfig {
            queue_capacity: config.session_queue_capacity,
            max_subscriptions: config.max_subscriptions_per_session,
        }));
        let coordinator = Arc::new(WriteCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            config.force_patch,
        ));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            bus,
            coordinator,
            shutdown,
            started: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// Install an access filter for every operation.
    pub fn with_filter(mut self, filter: Arc<dyn AccessFilter>) -> Self {
        self.coordinator = Arc::new(
            WriteCoordinator::new(
                Arc::clone(&self.store),
                Arc::clone(&self.bus),
                self.config.force_patch,
            )
            .with_filter(filter),
        );
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<WriteCoordinator> {
        &self.coordinator
    }

    /// Build the HTTP router (also used directly by tests)
    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            router: RequestRouter::new(Arc::clone(&self.coordinator)),
            tick_interval: Duration::from_millis(self.config.tick_interval_ms),
            shutdown: self.shutdown.subscribe(),
        });

        let cors = if self.config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = self
                .config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(document_routes(Arc::clone(&state)))
            .merge(realtime_routes(state))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Bind `addr` and serve in the background. Returns the bound address.
    pub async fn start(&self, addr: SocketAddr) -> ServerResult<SocketAddr> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ServerError::AlreadyStarted);
        }

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.started.store(false, Ordering::Release);
                return Err(ServerError::Bind { addr, source });
            }
        };
        let local = listener.local_addr()?;

        let app = self.router();
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.wait_for(|closed| *closed).await;
                })
                .await
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }

        info!(
            addr = %local,
            force_patch = self.config.force_patch,
            keys = self.store.len(),
            "Server started"
        );
        Ok(local)
    }

    /// Block until the server is closed (by `close()` or Ctrl-C) and the
    /// serving task has finished.
    pub async fn wait_close(&self) -> ServerResult<()> {
        let handle = self
            .task
            .lock()
            .ok()
            .and_then(|mut task| task.take())
            .ok_or(ServerError::NotStarted)?;

        let mut closed = self.shutdown.subscribe();
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Interrupt received, shutting down");
                self.close();
            }
            _ = closed.wait_for(|closed| *closed) => {}
        }

        match handle.await {
            Ok(result) => result.map_err(ServerError::from),
            Err(e) => Err(ServerError::Task(e.to_string())),
        }
    }

    /// Stop accepting connections and drop every session.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
        let sessions = self.bus.sessions().shutdown();
        info!(sessions, "Server closing");
    }
}
