use serde::{Deserialize, Serialize};

/// Canonical lifecycle state of a tracked container.
///
/// `Destroyed` is terminal: a container that reaches it is removed from the
/// tracked set entirely.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContainerState {
    Uninitialized,
    Created,
    Loading,
    Running,
    Pausing,
    Paused,
    Resuming,
    Stopping,
    Exited,
    Destroyed,
}

impl ContainerState {
    /// Every state, for exhaustive table checks.
    pub const ALL: [ContainerState; 10] = [
        ContainerState::Uninitialized,
        ContainerState::Created,
        ContainerState::Loading,
        ContainerState::Running,
        ContainerState::Pausing,
        ContainerState::Paused,
        ContainerState::Resuming,
        ContainerState::Stopping,
        ContainerState::Exited,
        ContainerState::Destroyed,
    ];

    pub fn is_terminal(self) -> bool {
        self == ContainerState::Destroyed
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerState::Uninitialized => write!(f, "uninitialized"),
            ContainerState::Created => write!(f, "created"),
            ContainerState::Loading => write!(f, "loading"),
            ContainerState::Running => write!(f, "running"),
            ContainerState::Pausing => write!(f, "pausing"),
            ContainerState::Paused => write!(f, "paused"),
            ContainerState::Resuming => write!(f, "resuming"),
            ContainerState::Stopping => write!(f, "stopping"),
            ContainerState::Exited => write!(f, "exited"),
            ContainerState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Container flavor: a top-level remote desktop session, or an application
/// launched inside one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContainerKind {
    Session,
    App,
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerKind::Session => write!(f, "session"),
            ContainerKind::App => write!(f, "app"),
        }
    }
}

/// Deferred action queued on a container to sequence cascading teardown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NextAction {
    Stop,
    Destroy,
}

/// Structured error carried on a container context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerError {
    pub code: String,
    pub message: String,
}

impl ContainerError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_owned(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ContainerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}
