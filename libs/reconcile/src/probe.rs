//! Occupancy probe interface.
//!
//! The probe is the safety oracle for `block` mode: it asks a running
//! Instance how many users are connected right now. Implementations must
//! report every failure as an error; a failure is never read as "zero".

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Live occupancy of one Instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupancy {
    /// Number of connected users.
    pub connected_users: u32,

    /// Name of the world currently loaded, if any.
    pub active_world: Option<String>,

    /// When the probe answered.
    pub checked_at: DateTime<Utc>,
}

impl Occupancy {
    pub fn new(connected_users: u32) -> Self {
        Self {
            connected_users,
            active_world: None,
            checked_at: Utc::now(),
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.connected_users > 0
    }
}

/// Probe failures. All of them mean "cannot verify safety".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("no admin credentials available to check player count")]
    MissingCredentials,

    #[error("connection failed: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("status endpoint returned HTTP {0}")]
    Status(u16),

    #[error("malformed status response: {0}")]
    Malformed(String),
}

/// Live query against a running Instance.
#[async_trait]
pub trait OccupancyProbe: Send + Sync {
    /// Ask `instance` in `namespace` how many users it currently serves.
    async fn probe(&self, namespace: &str, instance: &str) -> Result<Occupancy, ProbeError>;
}
