//! # fvtt-crd
//!
//! Typed records for the foundry license arbiter.
//!
//! ## Records
//!
//! - **License** (`foundrylicenses`): the exclusive resource. Its spec carries
//!   the desired active holder and switch policy; its status is written only
//!   by the license reconciliation pass.
//! - **Instance** (`foundryinstances`): a contender for a License. Bound to
//!   exactly one License for its whole life.
//! - **Password** (`foundrypasswords`): the record backing an admin secret,
//!   either a per-owner default or a per-instance credential.
//!
//! All records share the `foundry.platform/v1alpha1` group/version and are
//! (de)serialized with the camelCase field names the store uses.

mod error;
pub mod names;
mod types;

pub use error::CrdError;
pub use types::*;

/// Default namespace records live in.
pub const DEFAULT_NAMESPACE: &str = "foundry-vtt";

/// Annotation and label keys understood by the arbiter.
pub mod annotations {
    /// RFC 3339 timestamp; presence marks the Instance as pending removal.
    pub const SCHEDULED_DELETE_AT: &str = "foundry.platform/scheduled-delete-at";
    pub const OWNER_ID: &str = "foundry.platform/owner-id";
    pub const OWNER_NAME: &str = "foundry.platform/owner-name";

    /// Monotonic refresh token (unix seconds) requesting a new secret value.
    pub const FORCE_SYNC: &str = "force-sync";

    /// Label carried by every generated route object.
    pub const LICENSE_LABEL: &str = "foundry.platform/license";
}
