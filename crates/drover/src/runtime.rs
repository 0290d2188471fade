//! Drover runtime host.
//!
//! One process hosts, side by side:
//! - a queue worker per configured queue that has a handler
//! - the delay promoter
//! - the heartbeat monitor (orphan recovery, registry pruning, retention)
//! - the worker registry heartbeat
//!
//! They share nothing but the store.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use drover_core::cluster::{WorkerId, WorkerInfo};
use drover_core::config::{DroverConfig, LoggingConfig, StoreBackend};
use drover_core::error::{DroverError, Result};
use drover_core::job::{DroverJob, JobContext, JobHandler, JobLogRecorder};
use drover_core::store::QueueStore;
use drover_runtime::cluster::{HeartbeatMonitor, WorkerHeartbeat};
use drover_runtime::db::Database;
use drover_runtime::jobs::{DelayPromoter, JobDispatcher, JobRegistry, QueueAdmin, WorkerPool};
use drover_runtime::migrations::MigrationRunner;
use drover_runtime::store::{MemoryStore, PgStore};

/// Prelude module for common imports.
pub mod prelude {
    pub use chrono::{DateTime, Utc};

    pub use drover_core::config::DroverConfig;
    pub use drover_core::error::{DroverError, Result};
    pub use drover_core::job::{Collection, DroverJob, HandlerFuture, JobContext, JobId};
    pub use drover_runtime::jobs::{JobDispatcher, QueueAdmin};

    pub use crate::{Drover, DroverBuilder};
}

/// The Drover runtime.
pub struct Drover {
    config: DroverConfig,
    store: Arc<dyn QueueStore>,
    db: Option<Database>,
    registry: JobRegistry,
    info: WorkerInfo,
    shutdown: CancellationToken,
}

impl Drover {
    /// Create a new builder for configuring Drover.
    pub fn builder() -> DroverBuilder {
        DroverBuilder::new()
    }

    pub fn worker_id(&self) -> WorkerId {
        self.info.id
    }

    pub fn config(&self) -> &DroverConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn QueueStore> {
        self.store.clone()
    }

    /// Producer for the configured queues.
    pub fn dispatcher(&self) -> JobDispatcher {
        JobDispatcher::new(self.store.clone(), self.config.queue_names())
    }

    /// Admin and observability API for the configured queues.
    pub fn admin(&self) -> QueueAdmin {
        QueueAdmin::new(self.store.clone(), self.logger(), &self.config)
    }

    fn logger(&self) -> JobLogRecorder {
        JobLogRecorder::new(self.store.clone(), self.config.logging.job_logs)
    }

    /// Apply the internal schema. A no-op for the memory store.
    pub async fn migrate(&self) -> Result<Vec<String>> {
        match &self.db {
            Some(db) => MigrationRunner::new(db.pool().clone()).run().await,
            None => Ok(Vec::new()),
        }
    }

    /// Token that stops [`Drover::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run until Ctrl-C or [`Drover::shutdown`], then drain and deregister.
    pub async fn run(self) -> Result<()> {
        tracing::info!(worker_id = %self.info.id, cluster = %self.config.cluster.name, "Drover runtime starting");

        if let Some(db) = &self.db {
            db.health_check().await?;
            let applied = self.migrate().await?;
            tracing::info!(applied = applied.len(), "Migrations completed");
        }

        if self.registry.is_empty() {
            tracing::info!("No job handlers registered; serving no queues");
        } else {
            tracing::debug!(handlers = self.registry.len(), "Job handlers registered");
        }

        let logger = self.logger();
        let pool = WorkerPool::new(
            &self.config,
            &self.registry,
            self.store.clone(),
            logger.clone(),
            self.info.id,
        );

        let mut info = self.info.clone();
        info.queues = pool.queues();
        let served = info.queues.clone();

        let heartbeat = Arc::new(WorkerHeartbeat::new(
            self.store.clone(),
            self.config.cluster.name.clone(),
            info,
            self.config.cluster.heartbeat_interval(),
        ));
        let monitor = HeartbeatMonitor::new(self.store.clone(), logger, &self.config);
        let promoter = DelayPromoter::new(
            self.store.clone(),
            self.config.queue_names(),
            self.config.promoter.interval(),
        );

        let mut tasks = JoinSet::new();
        {
            let heartbeat = heartbeat.clone();
            let shutdown = self.shutdown.clone();
            tasks.spawn(async move { heartbeat.run(shutdown).await });
        }
        {
            let shutdown = self.shutdown.clone();
            tasks.spawn(async move { monitor.run(shutdown).await });
        }
        {
            let shutdown = self.shutdown.clone();
            tasks.spawn(async move { promoter.run(shutdown).await });
        }
        let workers = tokio::spawn(pool.run(self.shutdown.clone()));

        tracing::info!(queues = ?served, "Drover runtime started");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("Received shutdown notification");
            }
        }
        self.shutdown.cancel();

        if let Err(e) = workers.await {
            tracing::error!(error = %e, "Worker pool task failed");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Background task failed");
            }
        }

        heartbeat.deregister().await;
        if let Some(db) = &self.db {
            db.close().await;
        }

        tracing::info!("Drover runtime stopped");
        Ok(())
    }
}

/// Builder for configuring the Drover runtime.
pub struct DroverBuilder {
    config: Option<DroverConfig>,
    registry: JobRegistry,
    store: Option<Arc<dyn QueueStore>>,
}

impl DroverBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            registry: JobRegistry::new(),
            store: None,
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: DroverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this store instead of the one the configuration selects.
    pub fn store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register a typed job.
    pub fn job<J: DroverJob>(mut self) -> Self {
        self.registry.register::<J>();
        self
    }

    /// Register a raw-payload handler for `queue`.
    pub fn handler(mut self, queue: impl Into<String>, handler: impl JobHandler) -> Self {
        self.registry.register_handler(queue, handler);
        self
    }

    /// Register a closure for `queue`.
    pub fn handler_fn<F, Fut>(mut self, queue: impl Into<String>, f: F) -> Self
    where
        F: Fn(JobContext, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.registry.register_fn(queue, f);
        self
    }

    /// Get mutable access to the job registry.
    pub fn registry_mut(&mut self) -> &mut JobRegistry {
        &mut self.registry
    }

    /// Build the runtime.
    ///
    /// A PostgreSQL pool is created lazily and must be built inside a tokio
    /// runtime; the first connection is made by [`Drover::run`] or
    /// [`Drover::migrate`].
    pub fn build(self) -> Result<Drover> {
        let config = self
            .config
            .ok_or_else(|| DroverError::Config("Configuration is required".to_string()))?;

        let (store, db): (Arc<dyn QueueStore>, Option<Database>) = match self.store {
            Some(store) => (store, None),
            None => match config.store.backend {
                StoreBackend::Memory => (Arc::new(MemoryStore::new()), None),
                StoreBackend::Postgres => {
                    let db = Database::connect_lazy(&config.database)?;
                    (Arc::new(PgStore::new(db.pool().clone())), Some(db))
                }
            },
        };

        Ok(Drover {
            config,
            store,
            db,
            registry: self.registry,
            info: WorkerInfo::new_local(local_hostname(), Vec::new()),
            shutdown: CancellationToken::new(),
        })
    }
}

impl Default for DroverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides `level`.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
