//! Errors raised by reconciliation passes.

use fvtt_crd::CrdError;
use fvtt_store::StoreError;
use thiserror::Error;

use crate::secrets::SecretError;

/// Failure of one reconciliation pass. The worker logs it and retries on the
/// next tick.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid record {name}: {source}")]
    InvalidRecord {
        name: String,
        #[source]
        source: CrdError,
    },

    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

impl ControllerError {
    pub fn invalid(name: impl Into<String>, source: CrdError) -> Self {
        Self::InvalidRecord {
            name: name.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;
