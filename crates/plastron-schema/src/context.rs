use crate::state::{ContainerError, ContainerKind, ContainerState, NextAction};
use serde::{Deserialize, Serialize};

/// Everything tracked for one remote container.
///
/// Contexts are handed out to callers only as clones; the orchestrator owns
/// the single mutable copy inside each container service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerContext {
    /// Stable identifier, unique among currently tracked containers.
    pub id: String,
    /// Display label: sessions carry a per-user sequence number rendered as
    /// a string, apps carry the application name.
    pub name: String,
    /// Owning user identifier.
    pub user: String,
    /// Remote endpoint, populated once the container is reachable.
    #[serde(default)]
    pub url: Option<String>,
    pub kind: ContainerKind,
    /// Parent session id, present only for apps. A lookup key, never an
    /// ownership pointer: children are discovered by scanning for it.
    #[serde(default)]
    pub parent_id: Option<String>,
    pub state: ContainerState,
    /// Queued action used to sequence deferred cascades.
    #[serde(default)]
    pub next_action: Option<NextAction>,
    #[serde(default)]
    pub error: Option<ContainerError>,
    pub created_at: String,
    pub updated_at: String,
    /// Transient webdav credential for the app start request. In-memory
    /// only: never written to the snapshot.
    #[serde(skip)]
    pub webdav_password: Option<String>,
}

impl ContainerContext {
    /// New session context in `Uninitialized`, ready to receive `Start`.
    pub fn session(id: &str, name: &str, user: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            user: user.to_owned(),
            url: None,
            kind: ContainerKind::Session,
            parent_id: None,
            state: ContainerState::Uninitialized,
            next_action: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
            webdav_password: None,
        }
    }

    /// New app context in `Uninitialized`, nested under `parent_id`.
    pub fn app(id: &str, name: &str, user: &str, parent_id: &str, password: Option<&str>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            user: user.to_owned(),
            url: None,
            kind: ContainerKind::App,
            parent_id: Some(parent_id.to_owned()),
            state: ContainerState::Uninitialized,
            next_action: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
            webdav_password: password.map(ToOwned::to_owned),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
