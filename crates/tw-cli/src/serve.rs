//! # `trustwipe serve`
//!
//! Wires the orchestrator to its backends, runs the anchor and delivery
//! worker pools, and serves the probe router until Ctrl-C.
//!
//! Backend selection follows [`Config`]: PostgreSQL or in-memory
//! store/queue, EVM or mock ledger, SMTP or disabled mailer, loaded or
//! degraded trust store. Every fallback is announced with a `warn`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::watch;
use tw_anchor::{AnchorService, EvmLedgerClient, EvmLedgerConfig, LedgerClient, MockLedger};
use tw_crypto::{Pkcs7Verifier, TrustStore};
use tw_delivery::{DeliveryService, DisabledMailer, HttpTransport, Mailer, SmtpMailer};
use tw_orchestrator::JobOrchestrator;
use tw_queue::{MemoryQueue, PgQueue, QueueName, TaskQueue, WorkerConfig, WorkerPool};
use tw_store::{
    AuditSink, FanoutAuditSink, JobStore, MemoryStore, PgAuditSink, PgStore, TracingAuditSink,
};

use crate::config::Config;
use crate::probes::{self, ProbeState};

/// Arguments for `trustwipe serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address for probes and metrics. Overrides `BIND_ADDR`.
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

/// Everything a running process holds.
pub struct Services {
    pub orchestrator: JobOrchestrator,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub anchor_pool: WorkerPool,
    pub delivery_pool: WorkerPool,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("orchestrator", &self.orchestrator)
            .field("anchor_pool", &self.anchor_pool)
            .field("delivery_pool", &self.delivery_pool)
            .finish_non_exhaustive()
    }
}

/// Build the service graph described by `config`.
pub async fn build_services(config: &Config) -> Result<Services> {
    let (store, queue, audit) = backends(config).await?;

    let trust = trust_store(config)?;
    let verifier = Arc::new(Pkcs7Verifier::new(Arc::new(trust)));

    let ledger: Arc<dyn LedgerClient> = match &config.ledger {
        Some(settings) => {
            let client = EvmLedgerClient::new(
                EvmLedgerConfig::new(
                    &settings.rpc_url,
                    &settings.contract_address,
                    &settings.from_address,
                )
                .with_timeout(config.rpc_timeout),
            )
            .context("configuring EVM ledger client")?;
            tracing::info!(rpc_url = %settings.rpc_url, "EVM ledger configured");
            Arc::new(client)
        }
        None => {
            tracing::warn!(
                "BLOCKCHAIN_RPC_URL not set, anchoring against an in-process mock ledger"
            );
            Arc::new(MockLedger::new())
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp).context("configuring SMTP transport")?),
        None => {
            tracing::warn!("SMTP_HOST not set, email deliveries will fail");
            Arc::new(DisabledMailer)
        }
    };
    let http = HttpTransport::new(config.delivery_timeout).context("building HTTP transport")?;

    let anchors = AnchorService::new(store.clone(), queue.clone(), ledger, audit.clone());
    let deliveries =
        DeliveryService::new(store.clone(), queue.clone(), http, mailer, audit.clone());

    let anchor_handler = Arc::new(anchors.clone());
    let anchor_pool = WorkerPool::new(
        QueueName::Anchor,
        queue.clone(),
        anchor_handler.clone(),
        WorkerConfig {
            concurrency: config.anchor_concurrency,
            poll_interval: config.poll_interval,
            ..WorkerConfig::anchor()
        },
    )
    .with_observer(anchor_handler);

    let delivery_handler = Arc::new(deliveries.clone());
    let delivery_pool = WorkerPool::new(
        QueueName::Delivery,
        queue.clone(),
        delivery_handler.clone(),
        WorkerConfig {
            concurrency: config.delivery_concurrency,
            poll_interval: config.poll_interval,
            ..WorkerConfig::delivery()
        },
    )
    .with_observer(delivery_handler);

    let orchestrator = JobOrchestrator::new(store.clone(), verifier, anchors, deliveries, audit);

    Ok(Services {
        orchestrator,
        store,
        queue,
        anchor_pool,
        delivery_pool,
    })
}

type Backends = (Arc<dyn JobStore>, Arc<dyn TaskQueue>, Arc<dyn AuditSink>);

async fn backends(config: &Config) -> Result<Backends> {
    let Some(url) = &config.database_url else {
        tracing::warn!(
            "DATABASE_URL not set, running with in-memory store and queue; state is lost on exit"
        );
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let queue: Arc<dyn TaskQueue> = Arc::new(MemoryQueue::new());
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        return Ok((store, queue, audit));
    };

    let pool = tw_store::init_pool(url)
        .await
        .context("connecting to PostgreSQL")?;
    let sinks: Vec<Arc<dyn AuditSink>> = vec![
        Arc::new(PgAuditSink::new(pool.clone())),
        Arc::new(TracingAuditSink),
    ];
    let store: Arc<dyn JobStore> = Arc::new(PgStore::new(pool.clone()));
    let queue: Arc<dyn TaskQueue> = Arc::new(PgQueue::new(pool));
    let audit: Arc<dyn AuditSink> = Arc::new(FanoutAuditSink::new(sinks));
    Ok((store, queue, audit))
}

/// Load the CA bundle. Strict mode refuses to start without one.
pub fn trust_store(config: &Config) -> Result<TrustStore> {
    if config.require_ca_bundle {
        TrustStore::load(&config.ca_bundle_path).with_context(|| {
            format!(
                "REQUIRE_CA_BUNDLE is set but {} could not be loaded",
                config.ca_bundle_path.display()
            )
        })
    } else {
        Ok(TrustStore::load_or_degraded(&config.ca_bundle_path))
    }
}

/// Execute `trustwipe serve`.
pub async fn run_serve(args: &ServeArgs, config: Config, metrics: PrometheusHandle) -> Result<u8> {
    tracing::debug!(?config, "starting");
    let services = build_services(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let anchor_workers = tokio::spawn(services.anchor_pool.clone().run(shutdown_rx.clone()));
    let delivery_workers = tokio::spawn(services.delivery_pool.clone().run(shutdown_rx));

    let app = probes::router(ProbeState {
        store: services.store.clone(),
        queue: services.queue.clone(),
        metrics,
    });
    let addr = args.bind.unwrap_or(config.bind_addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "trustwipe listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await;

    for (queue, handle) in [("anchor", anchor_workers), ("delivery", delivery_workers)] {
        if let Err(e) = handle.await {
            tracing::error!(queue, error = %e, "worker pool task failed");
        }
    }
    served.context("probe server failed")?;
    tracing::info!("shutdown complete");
    Ok(0)
}

async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received, draining workers");
    let _ = shutdown.send(true);
}
