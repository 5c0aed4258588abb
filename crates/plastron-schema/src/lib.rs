//! Shared data model for Plastron container orchestration.
//!
//! This crate defines the canonical container state taxonomy, the
//! `ContainerContext` tracked for every remote session/app container, and
//! the id validation rules shared by every other crate in the workspace.

pub mod context;
pub mod state;

pub use context::ContainerContext;
pub use state::{ContainerError, ContainerKind, ContainerState, NextAction};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid container id: {0}")]
    InvalidId(String),
}

pub fn validate_container_id(id: &str) -> Result<(), SchemaError> {
    if id.is_empty() || id.len() > 64 {
        return Err(SchemaError::InvalidId(
            "container id must be 1-64 characters".to_owned(),
        ));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(SchemaError::InvalidId(
            "container id must match [a-zA-Z0-9_-]".to_owned(),
        ));
    }
    Ok(())
}
