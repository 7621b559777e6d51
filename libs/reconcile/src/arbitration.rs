//! Arbitration of a License's actual holder.

use std::collections::BTreeSet;
use std::time::Duration;

use fvtt_crd::SwitchMode;
use tracing::{debug, warn};

use crate::probe::{OccupancyProbe, ProbeError};
use crate::DEFAULT_PROBE_TIMEOUT;

/// Everything one arbitration needs, read fresh from the store.
#[derive(Debug, Clone)]
pub struct ArbitrationInput<'a> {
    /// Namespace the Instances live in; passed through to the probe.
    pub namespace: &'a str,
    pub desired: Option<&'a str>,
    pub current: Option<&'a str>,
    pub mode: SwitchMode,
    pub pending_deletion: &'a BTreeSet<String>,
}

/// How the actual holder was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Desired and current already agree.
    Unchanged,
    /// The holder was cleared on request.
    Deactivated,
    /// A vacant License was given a holder.
    Activated,
    /// Switched without probing.
    Forced,
    /// Switched after the current holder reported no users.
    Allowed,
    /// Switch refused; the current holder keeps the License.
    Denied,
}

/// Outcome of one arbitration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub holder: Option<String>,
    pub warning: Option<String>,
    pub verdict: Verdict,
    /// Set when the pending-deletion rule changed the holder.
    pub deletion_override: bool,
}

/// Decides the actual holder of a License.
///
/// The arbiter holds no state between calls; the probe is the only external
/// input and is invoked at most once per call, bounded by `probe_timeout`.
#[derive(Debug, Clone)]
pub struct Arbiter {
    probe_timeout: Duration,
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl Arbiter {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    pub async fn arbitrate(
        &self,
        input: &ArbitrationInput<'_>,
        probe: &dyn OccupancyProbe,
    ) -> Decision {
        let (holder, warning, verdict) = match (input.desired, input.current) {
            (desired, current) if desired == current => {
                (desired.map(str::to_string), None, Verdict::Unchanged)
            }
            (None, _) => (None, None, Verdict::Deactivated),
            (Some(desired), None) => (Some(desired.to_string()), None, Verdict::Activated),
            (Some(desired), Some(current)) => match input.mode {
                SwitchMode::Force => (Some(desired.to_string()), None, Verdict::Forced),
                SwitchMode::Block => self.check_occupancy(input, desired, current, probe).await,
            },
        };

        apply_deletion_rule(
            Decision {
                holder,
                warning,
                verdict,
                deletion_override: false,
            },
            input,
        )
    }

    async fn check_occupancy(
        &self,
        input: &ArbitrationInput<'_>,
        desired: &str,
        current: &str,
        probe: &dyn OccupancyProbe,
    ) -> (Option<String>, Option<String>, Verdict) {
        let result = tokio::time::timeout(self.probe_timeout, probe.probe(input.namespace, current))
            .await
            .unwrap_or(Err(ProbeError::Timeout(self.probe_timeout)));

        match result {
            Ok(occupancy) if occupancy.is_occupied() => {
                debug!(
                    current = %current,
                    desired = %desired,
                    users = occupancy.connected_users,
                    "Switch denied: holder in use"
                );
                (
                    Some(current.to_string()),
                    Some(format!(
                        "Switch to '{desired}' blocked: {} players connected to '{current}'",
                        occupancy.connected_users
                    )),
                    Verdict::Denied,
                )
            }
            Ok(_) => (Some(desired.to_string()), None, Verdict::Allowed),
            Err(e) => {
                warn!(current = %current, error = %e, "Occupancy probe failed; denying switch");
                (
                    Some(current.to_string()),
                    Some(format!(
                        "Switch to '{desired}' blocked: unable to verify player count on '{current}': {e}"
                    )),
                    Verdict::Denied,
                )
            }
        }
    }
}

fn apply_deletion_rule(mut decision: Decision, input: &ArbitrationInput<'_>) -> Decision {
    let Some(holder) = decision.holder.as_deref() else {
        return decision;
    };
    if !input.pending_deletion.contains(holder) {
        return decision;
    }

    let warning = format!("Instance '{holder}' is scheduled for deletion and cannot be active");
    decision.holder = input
        .current
        .filter(|c| !input.pending_deletion.contains(*c))
        .map(str::to_string);
    decision.warning = Some(warning);
    decision.deletion_override = true;
    decision
}
