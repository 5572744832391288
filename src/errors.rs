use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Entity not set")]
    EntityNotSet,

    #[error("Entity key not set")]
    EntityKeyNotSet,

    #[error("Object ID not set")]
    ObjectIdNotSet,

    #[error("Object ID invalid")]
    ObjectIdInvalid,

    #[error("Save failed")]
    SaveFailed(#[source] StoreError),

    #[error("Save failed because of a duplicate key")]
    SaveFailedDuplicateKey(#[source] StoreError),

    #[error("Delete failed")]
    DeleteFailed(#[source] StoreError),

    #[error("Refresh failed")]
    RefreshFailed(Option<StoreError>),

    #[error("Query failed")]
    QueryFailed(#[source] StoreError),

    #[error("Index failed")]
    IndexFailed(#[source] StoreError),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Destroy not allowed")]
    DestroyNotAllowed,

    #[error("Destroy failed")]
    DestroyFailed(#[source] StoreError),

    #[error("Config error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Numeric wire status for the failure envelope.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::EntityNotSet => 100,
            Self::EntityKeyNotSet => 101,
            Self::ObjectIdNotSet => 102,
            Self::ObjectIdInvalid => 103,
            Self::SaveFailed(_) => 200,
            Self::SaveFailedDuplicateKey(_) => 201,
            Self::DeleteFailed(_) => 300,
            Self::RefreshFailed(_) => 400,
            Self::QueryFailed(_) => 500,
            Self::IndexFailed(_) => 600,
            Self::PublishFailed(_) => 700,
            Self::DestroyNotAllowed => 800,
            Self::DestroyFailed(_) => 801,
            Self::Config(_) => 900,
        }
    }

    fn cause(&self) -> Option<&StoreError> {
        match self {
            Self::SaveFailed(e)
            | Self::SaveFailedDuplicateKey(e)
            | Self::DeleteFailed(e)
            | Self::QueryFailed(e)
            | Self::IndexFailed(e)
            | Self::DestroyFailed(e) => Some(e),
            Self::RefreshFailed(e) => e.as_ref(),
            _ => None,
        }
    }

    /// Builds the wire envelope `{status, message, err?}`. When the store
    /// exposed a structured error code it is prefixed onto the cause text.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let err = self.cause().map(|c| match c.code() {
            Some(code) => format!("[{code}] {c}"),
            None => c.to_string(),
        });
        ErrorBody { status: self.status(), message: self.to_string(), err }
    }

    /// Classifies a store failure on the save path, distinguishing the
    /// duplicate-key sub-kind.
    #[must_use]
    pub fn save_failed(e: StoreError) -> Self {
        if matches!(e, StoreError::DuplicateKey { .. }) {
            Self::SaveFailedDuplicateKey(e)
        } else {
            Self::SaveFailed(e)
        }
    }
}

/// Failure response envelope sent back over the wire.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}
