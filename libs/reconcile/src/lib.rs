//! License arbitration and routing primitives.
//!
//! This library holds the decision logic of the license reconciliation pass
//! and the client-side helper that observes its outcome. Key concepts:
//!
//! - **Desired holder**: the Instance the admin workflow asked to activate
//!   (`spec.activeInstanceName`).
//! - **Current holder**: the Instance the last pass confirmed
//!   (`status.activeInstance`).
//! - **Actual holder**: what this pass decides, after the switch policy,
//!   the live occupancy probe, and the pending-deletion rule.
//! - **Convergence**: the requesting side polling until the store reflects
//!   its intent.
//!
//! # Invariants
//!
//! - At most one route per License is `active`.
//! - A pending-deletion Instance is never the actual holder.
//! - Arbitration is deterministic given the same inputs and probe result,
//!   and probes at most once per pass.
//! - A probe that fails or times out denies the switch; it never allows it.

use std::time::Duration;

mod arbitration;
mod probe;
mod routes;
mod watch;

pub use arbitration::{Arbiter, ArbitrationInput, Decision, Verdict};
pub use probe::{Occupancy, OccupancyProbe, ProbeError};
pub use routes::{
    active_count, generate_routes, registered_instances, BackendRef, DnsBinding, RouteConfig,
    RouteDescriptor,
};
pub use watch::{wait_for, WaitConfig};

/// Convergence status of a submitted intent, as seen by the requesting side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// The store reflects the intent.
    Converged,

    /// Accepted but not yet confirmed; the pass may still apply it.
    Converging,

    /// The pass has seen the intent and refused it (e.g. a denied switch).
    Diverged,

    /// Status is unknown (insufficient data).
    Unknown,
}

impl ConvergenceStatus {
    /// Returns true if the resource has converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }

    /// Returns true if the resource is still converging.
    pub fn is_converging(&self) -> bool {
        matches!(self, Self::Converging)
    }
}

/// Default upper bound on one occupancy probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between license reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

/// Budget for waiting on an activation or deactivation.
pub const ACTIVATION_WAIT: WaitConfig = WaitConfig {
    timeout: Duration::from_secs(60),
    interval: Duration::from_secs(5),
};
