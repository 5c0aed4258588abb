use crate::{StateStore, StoreError};
use plastron_schema::ContainerContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fixed logical key the tracked container set is persisted under.
pub const SNAPSHOT_KEY: &str = "containers";

/// On-disk snapshot document: the container array plus a blake3 checksum
/// over its serialized form. `checksum` is `None` for legacy snapshots.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDoc {
    containers: Vec<ContainerContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

fn compute_checksum(containers: &[ContainerContext]) -> Result<String, StoreError> {
    let json = serde_json::to_string(containers)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

/// Typed wrapper over a `StateStore` for the tracked container set.
pub struct SnapshotStore {
    store: Arc<dyn StateStore>,
    key: String,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            key: SNAPSHOT_KEY.to_owned(),
        }
    }

    pub fn save(&self, containers: &[ContainerContext]) -> Result<(), StoreError> {
        let doc = SnapshotDoc {
            checksum: Some(compute_checksum(containers)?),
            containers: containers.to_vec(),
        };
        let value = serde_json::to_value(&doc)?;
        self.store.set(&self.key, &value)
    }

    /// Load the persisted container set. An absent key is an empty set.
    pub fn load(&self) -> Result<Vec<ContainerContext>, StoreError> {
        let Some(value) = self.store.get(&self.key)? else {
            return Ok(Vec::new());
        };
        let doc: SnapshotDoc = serde_json::from_value(value)?;

        if let Some(ref expected) = doc.checksum {
            let actual = compute_checksum(&doc.containers)?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    key: self.key.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(doc.containers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use plastron_schema::{ContainerContext, ContainerState};

    fn store() -> (Arc<MemoryStore>, SnapshotStore) {
        let mem = Arc::new(MemoryStore::new());
        let snap = SnapshotStore::new(mem.clone());
        (mem, snap)
    }

    fn sample_set() -> Vec<ContainerContext> {
        let mut session = ContainerContext::session("s1", "1", "u1");
        session.state = ContainerState::Running;
        let mut app = ContainerContext::app("a1", "jupyter", "u1", "s1", None);
        app.state = ContainerState::Loading;
        vec![session, app]
    }

    #[test]
    fn empty_store_loads_empty_set() {
        let (_mem, snap) = store();
        assert!(snap.load().unwrap().is_empty());
    }

    #[test]
    fn roundtrip_preserves_ids_kinds_links_and_states() {
        let (_mem, snap) = store();
        let set = sample_set();
        snap.save(&set).unwrap();

        let restored = snap.load().unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].id, "s1");
        assert_eq!(restored[0].state, ContainerState::Running);
        assert_eq!(restored[1].id, "a1");
        assert_eq!(restored[1].kind, set[1].kind);
        assert_eq!(restored[1].parent_id.as_deref(), Some("s1"));
        assert_eq!(restored[1].state, ContainerState::Loading);
    }

    #[test]
    fn save_embeds_checksum() {
        let (mem, snap) = store();
        snap.save(&sample_set()).unwrap();
        let raw = mem.get(SNAPSHOT_KEY).unwrap().unwrap();
        assert!(raw.get("checksum").and_then(serde_json::Value::as_str).is_some());
    }

    #[test]
    fn tampered_snapshot_fails_integrity() {
        let (mem, snap) = store();
        snap.save(&sample_set()).unwrap();

        let mut raw = mem.get(SNAPSHOT_KEY).unwrap().unwrap();
        raw["containers"][0]["user"] = serde_json::json!("mallory");
        mem.set(SNAPSHOT_KEY, &raw).unwrap();

        assert!(matches!(
            snap.load(),
            Err(StoreError::IntegrityFailure { .. })
        ));
    }

    #[test]
    fn legacy_snapshot_without_checksum_loads() {
        let (mem, snap) = store();
        let containers = serde_json::to_value(sample_set()).unwrap();
        mem.set(SNAPSHOT_KEY, &serde_json::json!({ "containers": containers }))
            .unwrap();
        assert_eq!(snap.load().unwrap().len(), 2);
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let (_mem, snap) = store();
        snap.save(&sample_set()).unwrap();
        snap.save(&[]).unwrap();
        assert!(snap.load().unwrap().is_empty());
    }
}
