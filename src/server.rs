//! Server Orchestrator
//!
//! Owns the listening socket, the shared [`ServerContext`] and the
//! [`TaskScheduler`], and drives the main loop:
//!
//! ```text
//!            ┌──────────────────── loop ────────────────────┐
//!            │                                              │
//!            │   select! {                                  │
//!            │     shutdown   => break                      │
//!            │     sweep tick => housekeeping()             │
//!            │     accept     => scheduler.submit(NORMAL,   │
//!            │                     handle_connection(..))   │
//!            │   }                                          │
//!            └──────────────────────────────────────────────┘
//!                                │ break
//!                                ▼
//!    stop accepting ─> signal handlers ─> wait up to 5s ─> stop workers
//! ```
//!
//! Each accepted connection holds one worker for as long as it stays open.
//! When every worker is busy, new connections queue up until one frees.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::connection::{handle_connection, ConnectionStats};
use crate::scheduler::{Priority, TaskScheduler};
use crate::storage::{StorageEngine, StoreError};

/// How often expired keys are swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Pause after a failed `accept` before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// How long shutdown waits for open connections to finish.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid cache configuration: {0}")]
    Storage(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by the accept loop and every connection.
#[derive(Debug)]
pub struct ServerContext {
    pub storage: StorageEngine,
    pub stats: ConnectionStats,
    started_at: Instant,
    shutdown: watch::Sender<bool>,
}

impl ServerContext {
    pub fn new(storage: StorageEngine) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            storage,
            stats: ConnectionStats::new(),
            started_at: Instant::now(),
            shutdown,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// A receiver that observes `true` once shutdown begins.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Tells every connection to close at its next read.
    pub fn signal_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// A bound, not yet running, cache server.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
    scheduler: TaskScheduler,
}

impl Server {
    /// Builds the cache from `config` and binds the listener.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let storage = StorageEngine::new(config.effective_capacity())?;
        info!(
            capacity = config.effective_capacity(),
            "Storage engine initialized"
        );

        Self::with_storage(&config.bind_address(), storage, config.worker_threads()).await
    }

    /// Binds `addr` and serves `storage` with `threads` workers.
    pub async fn with_storage(
        addr: &str,
        storage: StorageEngine,
        threads: usize,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            context: Arc::new(ServerContext::new(storage)),
            scheduler: TaskScheduler::new(threads),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.context)
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Serves clients until `shutdown` completes, then shuts down cleanly.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            context,
            scheduler,
        } = self;

        info!(
            addr = %listener.local_addr()?,
            workers = scheduler.thread_count(),
            "Server listening"
        );

        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
                _ = sweep.tick() => housekeeping(&context, &scheduler),
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        context.stats.connection_accepted();
                        trace!(client = %addr, queued = scheduler.pending_count(), "Accepted connection");

                        let connection = handle_connection(stream, addr, Arc::clone(&context));
                        if let Err(e) = scheduler.submit(Priority::Normal, connection) {
                            error!(client = %addr, error = %e, "Failed to queue connection");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }

        drop(listener);
        context.signal_shutdown();

        if !scheduler.wait_all(Some(SHUTDOWN_GRACE)).await {
            warn!(
                active = scheduler.active_count(),
                queued = scheduler.pending_count(),
                "Connections still open after grace period"
            );
        }
        scheduler.shutdown().await;

        info!(
            connections = context.stats.connections_accepted(),
            commands = context.stats.commands_processed(),
            "Server shutdown complete"
        );
        Ok(())
    }
}

/// Work done on every sweep tick: drop expired keys and forget the ids of
/// connections that have finished.
fn housekeeping(context: &ServerContext, scheduler: &TaskScheduler) {
    let expired = context.storage.sweep_expired();
    if expired > 0 {
        debug!(
            expired = expired,
            keys_remaining = context.storage.len(),
            "Expired keys cleaned up"
        );
    }

    let reclaimed = scheduler.cleanup_completed();
    if reclaimed > 0 {
        trace!(reclaimed = reclaimed, "Finished connection tasks reclaimed");
    }
}
