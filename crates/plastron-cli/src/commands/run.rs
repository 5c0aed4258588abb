use crate::commands::EXIT_SUCCESS;
use crate::config::DaemonConfig;
use plastron_core::{LogNotifier, Orchestrator};
use plastron_remote::HttpControlClient;
use plastron_store::{FileStore, StoreLock};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub async fn run(config_path: &Path) -> Result<u8, String> {
    let config = DaemonConfig::load(config_path)?;

    // One active instance per store root.
    let lock_path = config.lock_path();
    let Some(_lock) = StoreLock::try_acquire(&lock_path).map_err(|e| e.to_string())? else {
        return Err(format!(
            "another plastron instance holds {}",
            lock_path.display()
        ));
    };

    let control = HttpControlClient::new(config.control()).map_err(|e| e.to_string())?;
    let store = Arc::new(FileStore::new(&config.store_root));
    let orchestrator =
        Orchestrator::with_notifier(Arc::new(control), store, Arc::new(LogNotifier))
            .with_poll_interval(Duration::from_secs(config.poll_interval_secs));

    let restored = orchestrator.restore().await.map_err(|e| e.to_string())?;
    if restored > 0 {
        info!("resuming {restored} tracked container(s)");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .map_err(|e| e.to_string())?;

    info!(
        "plastron daemon running against {}",
        config.control().base_url
    );
    orchestrator.run(shutdown_rx).await;

    Ok(EXIT_SUCCESS)
}
