use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use visitchain::config::EngineConfig;
use visitchain::engine::{Engine, InMemoryStore, Snapshot};
use visitchain::notify::NotifyHub;
use visitchain::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    visitchain::observability::init_logging();

    let metrics_port: Option<u16> = std::env::var("VISITCHAIN_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    visitchain::observability::init(metrics_port)?;

    let config = EngineConfig::from_env();
    let snapshot_path = std::env::var("VISITCHAIN_SNAPSHOT").unwrap_or_else(|_| "./snapshot.json".into());
    let snapshot_path = PathBuf::from(snapshot_path);

    let snapshot: Snapshot = if snapshot_path.exists() {
        let file = std::fs::File::open(&snapshot_path)?;
        serde_json::from_reader(std::io::BufReader::new(file))?
    } else {
        tracing::warn!("snapshot {} not found, starting empty", snapshot_path.display());
        Snapshot::default()
    };

    let store = Arc::new(InMemoryStore::from_snapshot(snapshot).await?);
    let sites = store.site_ids();
    let engine = Arc::new(Engine::in_memory(store, Arc::new(NotifyHub::new()), config.clone()));

    info!("visitchain started");
    info!("  snapshot: {}", snapshot_path.display());
    info!("  sites: {}", sites.len());
    info!("  slot step: {} min", config.slot_step_minutes);
    info!("  reaper interval: {}s", config.reaper_interval_secs);
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let reaper_task = tokio::spawn(reaper::run_reaper(engine.clone(), sites));

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received, stopping reaper");
    reaper_task.abort();
    info!("visitchain stopped");
    Ok(())
}
