//! Bridge runtime
//!
//! Wires the watcher, dispatcher, retention sweeper and HTTP listener
//! around one [`SpoolEngine`] and runs them until shutdown.

use crate::config::BridgeConfig;
use crate::engine::{EngineSettings, EventOutcome, SpoolEngine};
use crate::http;
use crate::metrics::METRICS;
use crate::spool::SpoolDir;
use crate::transport::{FaxTransport, TransportConfig, WebhookTransport};
use crate::watcher::{SpoolEvent, SpoolWatcher, WatchConfig};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Bridge instance: configuration plus the shared engine.
pub struct Bridge<T> {
    config: BridgeConfig,
    engine: Arc<SpoolEngine<T>>,
}

impl Bridge<WebhookTransport> {
    /// Build a bridge that submits through the configured webhook.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let transport = WebhookTransport::new(TransportConfig {
            endpoint: config.webhook_url.clone(),
            username: config.webhook_user.clone(),
            password: config.webhook_pass.clone(),
            timeout: config.submit_timeout,
        })
        .context("Failed to build webhook client")?;
        Self::with_transport(config, transport)
    }
}

impl<T: FaxTransport> Bridge<T> {
    pub fn with_transport(config: BridgeConfig, transport: T) -> Result<Self> {
        let spool = SpoolDir::open(&config.spool_dir, config.status_prefix.clone())
            .context("Spool directory is not usable")?;
        let engine = SpoolEngine::new(
            spool,
            transport,
            EngineSettings {
                caller_number: config.fax_number.clone(),
                document_extensions: config.document_extensions.clone(),
                correlation_field: config.correlation_field,
                retention: config.retention,
            },
        );
        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }

    pub fn engine(&self) -> &Arc<SpoolEngine<T>> {
        &self.engine
    }

    /// Run until `shutdown` flips to true. Fails only on startup errors
    /// (spool not listable, listener not bindable).
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let watcher = SpoolWatcher::open(
            &self.config.spool_dir,
            WatchConfig {
                poll_interval: self.config.poll_interval,
                scan_existing: self.config.scan_existing,
            },
        )
        .await
        .with_context(|| {
            format!(
                "Failed to watch spool directory {}",
                self.config.spool_dir.display()
            )
        })?;

        let listener = TcpListener::bind(self.config.http_bind)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.http_bind))?;

        info!("FaxSpool bridge starting");
        info!("  Spool: {}", self.config.spool_dir.display());
        info!("  Webhook: {}", self.config.webhook_url);
        info!("  Listening: {}", self.config.http_bind);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let watcher_task = tokio::spawn(watcher.run(tx, shutdown.clone()));
        let dispatcher_task = tokio::spawn(dispatch_events(
            Arc::clone(&self.engine),
            rx,
            shutdown.clone(),
            self.config.shutdown_grace,
        ));
        let sweeper_task = tokio::spawn(sweep_loop(Arc::clone(&self.engine), shutdown.clone()));

        let app = http::router(Arc::clone(&self.engine));
        let mut server_shutdown = shutdown.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                wait_for_shutdown(&mut server_shutdown).await;
            })
            .await;
        if let Err(err) = served {
            error!("HTTP server error: {}", err);
        }

        for (name, task) in [
            ("watcher", watcher_task),
            ("dispatcher", dispatcher_task),
            ("sweeper", sweeper_task),
        ] {
            if let Err(err) = task.await {
                error!(task = name, "Background task failed: {}", err);
            }
        }

        info!("{}", METRICS.snapshot().summary());
        info!("FaxSpool bridge stopped");
        Ok(())
    }
}

/// Resolves once the shutdown flag is set (or its sender is gone).
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Spawn one task per spool event. On shutdown, stop taking events and
/// give in-flight submissions `grace` to finish.
pub async fn dispatch_events<T: FaxTransport>(
    engine: Arc<SpoolEngine<T>>,
    mut rx: mpsc::Receiver<SpoolEvent>,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
) {
    let mut tasks: JoinSet<EventOutcome> = JoinSet::new();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let engine = Arc::clone(&engine);
                tasks.spawn(async move { engine.handle_event(&event).await });
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                log_join(joined);
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }

    if tasks.is_empty() {
        return;
    }
    info!(in_flight = tasks.len(), "Waiting for in-flight submissions");
    let drained = tokio::time::timeout(grace, async {
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            abandoned = tasks.len(),
            "Shutdown grace period elapsed with submissions still running"
        );
        tasks.abort_all();
    }
}

fn log_join(joined: std::result::Result<EventOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => debug!(?outcome, "Spool event handled"),
        Err(err) => error!("Spool event task failed: {}", err),
    }
}

/// Periodically evict unpaired artifacts past the retention window.
pub async fn sweep_loop<T: FaxTransport>(
    engine: Arc<SpoolEngine<T>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let retention = engine.retention();
    if retention.is_zero() {
        return;
    }
    let period = (retention / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.sweep_expired(chrono::Utc::now()).await;
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
}
