use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use lib_notify::connections::{Database, PgStore};
use lib_notify::core::{ready_channel, ChangeDetector, FanoutDispatcher, NoticeAdmin, RebaselineFlag, Scheduler};
use lib_notify::delivery::webhook::WebhookTransport;
use lib_notify::delivery::MessageTemplate;
use lib_notify::ingestors::{NoticePageSource, SourceClient};
use lib_notify::repository::memory::{MemoryAuditLog, MemorySeenNotices, MemorySubscribers, MemoryTenants};
use lib_notify::repository::{AuditLog, SeenNoticeStore, SubscriberStore, TenantRegistry};
use lib_notify::retrieve::ky_http::ApiClient;
use tokio::signal;

mod notices_logic;
use notices_logic::{config, logger, ops};

/// The four repositories, backed either by PostgreSQL or by process memory.
struct Storage {
    seen: Arc<dyn SeenNoticeStore>,
    tenants: Arc<dyn TenantRegistry>,
    subscribers: Arc<dyn SubscriberStore>,
    audit: Arc<dyn AuditLog>,
    database: Option<Arc<Database>>,
}

async fn open_storage(config: &config::Config) -> Result<Storage> {
    let Some(url) = config.database_url.as_deref() else {
        log::warn!("event=storage backend=memory reason=no_database_url");
        return Ok(Storage {
            seen: Arc::new(MemorySeenNotices::new()),
            tenants: Arc::new(MemoryTenants::new()),
            subscribers: Arc::new(MemorySubscribers::new()),
            audit: Arc::new(MemoryAuditLog::new()),
            database: None,
        });
    };

    let database = Database::connect(url, config.db_max_connections())?;
    database.ping().await.context("database is unreachable")?;
    database.setup_schema().await.context("schema setup failed")?;
    log::info!("event=storage backend=postgres max_connections={}", config.db_max_connections());

    let store = Arc::new(PgStore::new(database.pool().clone()));
    Ok(Storage {
        seen: store.clone(),
        tenants: store.clone(),
        subscribers: store.clone(),
        audit: store,
        database: Some(Arc::new(database)),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let config = config::load_config();
    logger::setup_logging(config.log_dir(), config.log_level())?;
    let settings = config.engine_settings()?;
    log::info!(
        "event=startup source={} interval_secs={} pacing_ms={} max_concurrent={}",
        config.source_url(),
        settings.check_interval.as_secs(),
        settings.delivery_pacing.as_millis(),
        settings.max_concurrent_tenants
    );

    let storage = open_storage(&config).await?;

    let client = Arc::new(ApiClient::new(config.source_url())?);
    let source: Arc<dyn SourceClient> = Arc::new(NoticePageSource::new(
        client.clone(),
        config.max_notices_per_fetch(),
    )?);
    let transport = WebhookTransport::new(client);

    let mut template = MessageTemplate::default();
    if let Some(footer) = &config.message_footer {
        template.footer = footer.clone();
    }

    let dispatcher = FanoutDispatcher::new(
        storage.tenants.clone(),
        storage.subscribers.clone(),
        storage.audit.clone(),
        Arc::new(transport),
    )
    .with_template(template)
    .with_pacing(settings.delivery_pacing)
    .with_max_concurrent(settings.max_concurrent_tenants);

    let rebaseline = RebaselineFlag::new();
    let detector = ChangeDetector::new(
        source.clone(),
        storage.seen.clone(),
        dispatcher,
        rebaseline.clone(),
    );
    let (scheduler, handle) = Scheduler::new(detector, settings.check_interval);
    let status = scheduler.status();

    let admin = Arc::new(NoticeAdmin::new(
        storage.tenants.clone(),
        storage.subscribers.clone(),
        storage.seen.clone(),
        storage.audit.clone(),
        rebaseline,
        handle,
    ));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let (ready_signal, ready_gate) = ready_channel();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.ops_port()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind ops port {}", addr))?;

    let ops_state = ops::OpsState {
        admin,
        status,
        source,
        database: storage.database.clone(),
    };
    let ops_handle = tokio::spawn(ops::serve(listener, ops_state, shutdown_tx.subscribe()));

    let scheduler_shutdown = shutdown_tx.subscribe();
    let scheduler_handle = tokio::spawn(async move {
        match scheduler.await_ready(ready_gate).await {
            Ok(ready) => ready.run_forever(scheduler_shutdown).await,
            Err(e) => log::error!("event=scheduler_not_started error={}", e),
        }
    });

    // Storage is open and the ops surface is listening; polling may begin.
    ready_signal.mark_ready();
    log::info!("event=ready");

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("SIGTERM handler unavailable: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let (ops_result, _) = tokio::try_join!(ops_handle, scheduler_handle)?;
    if let Err(e) = ops_result {
        log::error!("event=ops_server_failed error={}", e);
    }

    log::info!("Shutdown complete.");
    Ok(())
}
