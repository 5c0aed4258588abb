//! Remote control API boundary for Plastron.
//!
//! This crate talks to the platform's container control endpoint: it builds
//! one request per container operation, classifies the endpoint's free-text
//! status output into a canonical state, and exposes the whole thing behind
//! the async `ControlBackend` trait so the orchestrator can run against the
//! HTTP client or the scripted mock interchangeably.

pub mod classify;
pub mod config;
pub mod http;
pub mod mock;

pub use classify::classify_output;
pub use config::ControlConfig;
pub use http::HttpControlClient;
pub use mock::MockControlBackend;

use plastron_schema::{ContainerContext, ContainerError, ContainerKind, ContainerState};
use thiserror::Error;

/// Error codes surfaced on container contexts.
pub mod codes {
    pub const REMOTE_UNREACHABLE: &str = "remote-unreachable";
    pub const REMOTE_PROTOCOL: &str = "remote-protocol";
    pub const AMBIGUOUS_STATUS: &str = "ambiguous-status";
}

#[derive(Debug, Clone, Error)]
pub enum ControlError {
    /// Transport failure or non-success HTTP status. Callers must treat this
    /// as "remote unreachable" and leave retry to the next tick.
    #[error("control endpoint unreachable: {0}")]
    Unreachable(String),
    /// Success status but the response omits expected fields.
    #[error("control protocol error: {0}")]
    Protocol(String),
    #[error("control config error: {0}")]
    Config(String),
}

impl ControlError {
    pub fn to_container_error(&self) -> ContainerError {
        match self {
            ControlError::Unreachable(msg) => {
                ContainerError::new(codes::REMOTE_UNREACHABLE, msg.clone())
            }
            ControlError::Protocol(msg) | ControlError::Config(msg) => {
                ContainerError::new(codes::REMOTE_PROTOCOL, msg.clone())
            }
        }
    }
}

/// Operation requested from the control endpoint, lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
    Pause,
    Resume,
    Destroy,
    Status,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Destroy => "destroy",
            ControlAction::Status => "status",
        }
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the control endpoint needs to address one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    pub id: String,
    pub kind: ContainerKind,
    pub user: String,
    /// Parent session id, required for app requests.
    pub parent_id: Option<String>,
    /// Application name, required for app requests.
    pub app: Option<String>,
    /// Transient webdav credential, sent only on app start.
    pub password: Option<String>,
}

impl ControlRequest {
    pub fn for_container(ctx: &ContainerContext) -> Self {
        Self {
            id: ctx.id.clone(),
            kind: ctx.kind,
            user: ctx.user.clone(),
            parent_id: ctx.parent_id.clone(),
            app: match ctx.kind {
                ContainerKind::App => Some(ctx.name.clone()),
                ContainerKind::Session => None,
            },
            password: ctx.webdav_password.clone(),
        }
    }
}

/// Classified result of one control invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOutcome {
    pub url: Option<String>,
    pub state: ContainerState,
    pub error: Option<ContainerError>,
}

impl ControlOutcome {
    pub fn with_state(state: ContainerState) -> Self {
        Self {
            url: None,
            state,
            error: None,
        }
    }

    pub fn running(url: &str) -> Self {
        Self {
            url: Some(url.to_owned()),
            state: ContainerState::Running,
            error: None,
        }
    }
}

/// Async boundary to the remote control endpoint.
///
/// Implementations never retry: a failed call is reported as-is and the
/// reconciliation tick is the sole retry mechanism.
#[async_trait::async_trait]
pub trait ControlBackend: Send + Sync {
    async fn invoke(
        &self,
        request: &ControlRequest,
        action: ControlAction,
    ) -> Result<ControlOutcome, ControlError>;
}
