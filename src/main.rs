use heartline::application::events::LifecycleBus;
use heartline::config::Config;
use heartline::domain::presence::PresenceOracle;
use heartline::domain::session::{CallStatus, SessionRepository};
use heartline::infrastructure::credential::CredentialMinter;
use heartline::interface::api::{build_router, init_metrics, AppState};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "postgres")]
use heartline::infrastructure::persistence::{
    create_pool, run_migrations, DatabaseConfig, PgMatchDirectory, PgSessionRepository,
};
#[cfg(not(feature = "postgres"))]
use heartline::infrastructure::persistence::{MemoryMatchDirectory, MemorySessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting heartline signaling core");

    let config = Config::load()?;
    debug!(?config, "configuration loaded");

    // Install the metrics recorder before anything records
    let prometheus = init_metrics()?;

    let minter = Arc::new(CredentialMinter::new(
        config.media.app_id.clone(),
        config.media.credential_secret.clone(),
        config.media.credential_ttl_secs,
    )?);

    let presence = Arc::new(PresenceOracle::new(chrono::Duration::seconds(
        config.call.presence_staleness_secs,
    )));
    let bus = LifecycleBus::new(256);

    // Session store: Postgres when the feature is on, in-memory otherwise
    #[cfg(feature = "postgres")]
    let store: Arc<dyn SessionRepository> = {
        let db_config = DatabaseConfig {
            url: config.database.url.clone(),
            max_connections: config.database.max_connections,
            min_connections: config.database.min_connections,
            ..Default::default()
        };

        let pool = create_pool(&db_config).await?;
        run_migrations(&pool).await?;
        info!("database ready");

        let matches = Arc::new(PgMatchDirectory::new(pool.clone()));
        Arc::new(PgSessionRepository::new(pool, matches))
    };

    #[cfg(not(feature = "postgres"))]
    let store: Arc<dyn SessionRepository> = {
        info!("running with the in-memory session store");
        let matches = Arc::new(MemoryMatchDirectory::new());
        Arc::new(MemorySessionStore::new(matches))
    };

    // Track how many sessions are currently ringing or active
    {
        let mut changes = store.subscribe_changes();
        tokio::spawn(async move {
            let open_sessions = metrics::gauge!("heartline_open_sessions");
            loop {
                match changes.recv().await {
                    Ok(change) => match change.new_status {
                        CallStatus::Ringing => open_sessions.increment(1.0),
                        CallStatus::Active => {}
                        _ => open_sessions.decrement(1.0),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "change feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    // Periodic presence sweep: lower stale online flags
    {
        let presence = presence.clone();
        let interval = config.call.heartbeat_interval_secs;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
                let swept = presence.sweep_stale();
                if swept > 0 {
                    debug!(swept, "stale presence flags lowered");
                }
            }
        });
    }

    let state = AppState {
        minter,
        presence,
        bus,
        default_credential_ttl_secs: config.media.credential_ttl_secs,
    };
    let app = build_router(state, prometheus);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
