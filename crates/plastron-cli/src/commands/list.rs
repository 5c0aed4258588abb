use crate::commands::{json_pretty, EXIT_SUCCESS};
use crate::config::DaemonConfig;
use plastron_store::{FileStore, SnapshotStore};
use std::path::Path;
use std::sync::Arc;

pub fn run(config_path: &Path, user: Option<&str>, json: bool) -> Result<u8, String> {
    let config = DaemonConfig::load(config_path)?;
    let snapshots = SnapshotStore::new(Arc::new(FileStore::new(&config.store_root)));
    let mut containers = snapshots.load().map_err(|e| e.to_string())?;
    if let Some(user) = user {
        containers.retain(|c| c.user == user);
    }

    if json {
        println!("{}", json_pretty(&containers)?);
    } else if containers.is_empty() {
        println!("no tracked containers");
    } else {
        println!(
            "{:<16} {:<8} {:<12} {:<14} {:<10} PARENT",
            "ID", "KIND", "NAME", "USER", "STATE"
        );
        for c in &containers {
            println!(
                "{:<16} {:<8} {:<12} {:<14} {:<10} {}",
                c.id,
                c.kind.to_string(),
                c.name,
                c.user,
                c.state.to_string(),
                c.parent_id.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
