//! Error taxonomy for hierarchy operations
//!
//! Storage and collaborator traits speak `anyhow::Result`; everything a caller
//! of [`HierarchyManager`](crate::hierarchy::HierarchyManager) sees is an
//! [`OrchestratorError`].

use crate::neo4j::models::EntityKind;
use serde_json::json;
use uuid::Uuid;

/// Errors surfaced by the public operation surface
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Caller input violates an invariant. Nothing was written.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// Entity missing or owned by someone else. The two cases are indistinguishable.
    #[error("{kind} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    /// Any storage or collaborator failure. The transaction was rolled back.
    #[error("operation failed")]
    Operation(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: EntityKind, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    /// Stable label for the error class (used by the CLI and in logs)
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Operation(_) => "operation_failed",
        }
    }

    /// User-visible rendering. Internal causes of `Operation` are never included.
    pub fn to_response(&self) -> serde_json::Value {
        match self {
            Self::Validation { field, message } => json!({
                "error": self.code(),
                "field": field,
                "message": message,
            }),
            Self::NotFound { kind, id } => json!({
                "error": self.code(),
                "kind": kind,
                "id": id,
            }),
            Self::Operation(_) => json!({
                "error": self.code(),
                "message": self.to_string(),
            }),
        }
    }
}

pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;
