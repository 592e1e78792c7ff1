use lifeos::{
    application::{reconcile::spawn_reconciler, task_list::TaskListManager},
    config::AppConfig,
    domain::store::TaskStore,
    http::routing::{self, tasks},
    infrastructure::{broadcast_feed::BroadcastChangeFeed, sqlite_store::SqliteTaskStore},
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env()?;
    let feed = BroadcastChangeFeed::default();
    let store = SqliteTaskStore::connect(&config.database_url, feed.clone()).await?;
    store.init().await?;

    let manager = TaskListManager::new(store, config.owner);
    // A failed first load is reported and leaves an empty list; keep serving.
    let _ = manager.load().await;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let reconciler = spawn_reconciler(manager.clone(), &feed, shutdown_rx);

    let router = routing::app(tasks::router(tasks::AppState { manager }));
    tracing::info!(addr = %config.bind_addr, owner = %config.owner, "listening");
    axum::serve(tokio::net::TcpListener::bind(config.bind_addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    reconciler.await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::ctrl_c;
    let _ = ctrl_c().await;
    tracing::info!("shutdown");
}
