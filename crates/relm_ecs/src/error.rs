//! Error type shared by every runtime operation.

use relm_schema::SchemaError;
use thiserror::Error;

use crate::entity::EntityId;

#[derive(Debug, Error)]
pub enum EcsError {
    #[error("unknown component kind: {0}")]
    UnknownKind(String),
    #[error("component kind '{0}' is already registered with a different schema")]
    DuplicateKind(String),
    #[error("component kinds '{name}' and '{existing}' hash to the same id")]
    KindIdCollision { name: String, existing: String },
    #[error("{entity} already has component '{kind}'")]
    DuplicateComponent { entity: EntityId, kind: String },
    #[error("{entity} has no component '{kind}'")]
    MissingComponent { entity: EntityId, kind: String },
    #[error("parenting {entity} under {parent} would create a cycle")]
    CyclicHierarchy { entity: EntityId, parent: EntityId },
    #[error("invalid query: {0}")]
    InvalidQuerySpec(String),
    #[error("{0} does not exist")]
    NoSuchEntity(EntityId),
    #[error("invalid field '{field}' on '{kind}': {message}")]
    InvalidField {
        kind: String,
        field: String,
        message: String,
    },
    #[error("system '{system}' has no query named '{query}'")]
    UnknownQuery { system: String, query: String },
    #[error("system '{0}' is already registered")]
    DuplicateSystem(String),
    #[error("no system named '{0}'")]
    UnknownSystem(String),
    #[error("missing service: {0}")]
    MissingService(&'static str),
    #[error("world updated before init")]
    NotInitialized,
    #[error("system '{system}' failed: {source}")]
    SystemFailed {
        system: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl EcsError {
    pub(crate) fn system_failed(system: &str, err: anyhow::Error) -> Self {
        EcsError::SystemFailed {
            system: system.to_string(),
            source: err.into(),
        }
    }
}
