//! Record definitions.
//!
//! Field names follow the store's camelCase wire format. Status blocks are
//! optional because freshly created records have none.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotations;
use crate::names;
use crate::CrdError;

/// Default gateway used when a License does not name one.
pub const DEFAULT_GATEWAY_NAME: &str = "default-gateway";

/// Default base domain for public hostnames.
pub const DEFAULT_BASE_DOMAIN: &str = "k8s.orb.local";

// =============================================================================
// Shared
// =============================================================================

/// Identity and bookkeeping shared by every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    /// Create metadata for a named record.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Look up an annotation value.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// Reference to a record in the same namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRef {
    pub name: String,
}

/// Reference to a key inside a secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Treat empty strings as absent; the store uses both for "no holder".
fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

// =============================================================================
// License
// =============================================================================

/// Whether a live occupancy check may veto a change of active holder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchMode {
    /// Deny a switch while the current holder has connected users.
    #[default]
    Block,
    /// Switch without probing.
    Force,
}

impl fmt::Display for SwitchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchMode::Block => write!(f, "block"),
            SwitchMode::Force => write!(f, "force"),
        }
    }
}

/// Routing state of an Instance for one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteState {
    Active,
    Standby,
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteState::Active => write!(f, "active"),
            RouteState::Standby => write!(f, "standby"),
        }
    }
}

/// Gateway a route attaches to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Gateway configuration of a License.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<ParentRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_domain: Option<String>,

    /// Public endpoint; when set a DNS binding is emitted per Instance.
    #[serde(rename = "publicIP", default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
}

impl GatewayConfig {
    /// Base domain, falling back to the development default.
    pub fn base_domain(&self) -> &str {
        non_empty(self.base_domain.as_ref()).unwrap_or(DEFAULT_BASE_DOMAIN)
    }

    /// Parent gateway with defaults resolved against the License namespace.
    pub fn resolved_parent_ref(&self, license_namespace: &str) -> ParentRef {
        let name = self
            .parent_ref
            .as_ref()
            .map(|p| p.name.as_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_GATEWAY_NAME);
        let namespace = self
            .parent_ref
            .as_ref()
            .and_then(|p| non_empty(p.namespace.as_ref()))
            .unwrap_or(license_namespace);

        ParentRef {
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
        }
    }

    /// Public endpoint, if one is declared.
    pub fn public_endpoint(&self) -> Option<&str> {
        non_empty(self.public_ip.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSpec {
    /// Desired active holder. Absent or empty means "nobody".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_instance_name: Option<String>,

    #[serde(default)]
    pub switch_mode: SwitchMode,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_secret_ref: Option<SecretKeyRef>,
}

/// An Instance as listed in a License status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredInstance {
    pub name: String,
    pub state: RouteState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseStatus {
    /// Last confirmed active holder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_instance: Option<String>,

    #[serde(default)]
    pub registered_instances: Vec<RegisteredInstance>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// The exclusive resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: LicenseSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LicenseStatus>,
}

impl License {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Holder requested by the admin workflow.
    pub fn desired_holder(&self) -> Option<&str> {
        non_empty(self.spec.active_instance_name.as_ref())
    }

    /// Holder last confirmed by a reconciliation pass.
    pub fn current_holder(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| non_empty(s.active_instance.as_ref()))
    }

    /// Warning left by the last pass, if any.
    pub fn warning(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| non_empty(s.warning.as_ref()))
    }

    /// Check that the License references its key material.
    pub fn validate(&self) -> Result<(), CrdError> {
        names::validate_name(self.name())?;

        let secret_ref = self.spec.license_secret_ref.as_ref();
        if !is_set(secret_ref.and_then(|r| r.name.as_deref())) {
            return Err(CrdError::MissingField {
                field: "licenseSecretRef.name",
            });
        }
        if !is_set(secret_ref.and_then(|r| r.key.as_deref())) {
            return Err(CrdError::MissingField {
                field: "licenseSecretRef.key",
            });
        }

        Ok(())
    }
}

/// Templated manifests sometimes render a missing value as the string "null".
fn is_set(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && v != "null")
}

// =============================================================================
// Instance
// =============================================================================

/// Requested CPU and memory for an Instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceShape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Immutable after creation.
    pub license_ref: LocalRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foundry_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_backend: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceShape>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password_secret_ref: Option<LocalRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regenerate_password: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_players: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_world: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_pending_notification: Option<bool>,
}

/// A contender for a License.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub metadata: ObjectMeta,
    pub spec: InstanceSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InstanceStatus>,
}

impl Instance {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn license_name(&self) -> &str {
        &self.spec.license_ref.name
    }

    /// True when removal has been scheduled, whatever the timestamp says.
    pub fn is_pending_deletion(&self) -> bool {
        self.metadata
            .annotation(annotations::SCHEDULED_DELETE_AT)
            .is_some_and(|v| !v.is_empty())
    }

    /// Parsed removal time. Naive timestamps are taken as UTC.
    pub fn scheduled_delete_at(&self) -> Option<Result<DateTime<Utc>, CrdError>> {
        let raw = self
            .metadata
            .annotation(annotations::SCHEDULED_DELETE_AT)
            .filter(|v| !v.is_empty())?;
        Some(parse_timestamp(raw))
    }

    /// Secret (and Password record) holding this Instance's admin password.
    pub fn admin_secret_name(&self) -> String {
        self.spec
            .admin_password_secret_ref
            .as_ref()
            .map(|r| r.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| names::credentials_secret_name(self.name()))
    }

    pub fn wants_password_regeneration(&self) -> bool {
        self.spec.regenerate_password == Some(true)
    }
}

/// Parse an RFC 3339 timestamp, accepting naive forms as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CrdError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| CrdError::InvalidField {
            field: "scheduled-delete-at",
            message: format!("{raw}: {e}"),
        })
}

// =============================================================================
// Password
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordType {
    /// Shared default for every Instance an owner creates.
    #[default]
    Default,
    /// Dedicated to one Instance.
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordPhase {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSpec {
    #[serde(rename = "type", default)]
    pub password_type: PasswordType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_ref: Option<LocalRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<PasswordPhase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Time the current value was produced; the notification dedup key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<DateTime<Utc>>,

    #[serde(default)]
    pub password_pending_notification: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_refresh_token: Option<u64>,

    /// `last_refreshed` of the value most recently delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified_refresh: Option<DateTime<Utc>>,
}

/// Record backing an admin secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Password {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: PasswordSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PasswordStatus>,
}

impl Password {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Latest refresh token requested through the `force-sync` annotation.
    pub fn refresh_token(&self) -> Option<u64> {
        self.metadata
            .annotation(annotations::FORCE_SYNC)
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.metadata.annotation(annotations::OWNER_ID)
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.metadata.annotation(annotations::OWNER_NAME)
    }

    pub fn instance_name(&self) -> Option<&str> {
        self.spec
            .instance_ref
            .as_ref()
            .map(|r| r.name.as_str())
            .filter(|n| !n.is_empty())
    }

    /// Secret holding the value. Named after the record itself.
    pub fn secret_name(&self) -> &str {
        self.name()
    }

    /// True once the record has been materialized at least once.
    pub fn is_materialized(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.created_at.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn license(value: serde_json::Value) -> License {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_license_defaults() {
        let lic = license(json!({
            "metadata": {"name": "main", "namespace": "foundry-vtt"},
            "spec": {}
        }));

        assert_eq!(lic.spec.switch_mode, SwitchMode::Block);
        assert_eq!(lic.spec.gateway.base_domain(), DEFAULT_BASE_DOMAIN);
        assert_eq!(lic.desired_holder(), None);
        assert_eq!(lic.current_holder(), None);

        let parent = lic.spec.gateway.resolved_parent_ref("foundry-vtt");
        assert_eq!(parent.name, DEFAULT_GATEWAY_NAME);
        assert_eq!(parent.namespace.as_deref(), Some("foundry-vtt"));
    }

    #[test]
    fn test_license_holders_treat_empty_as_absent() {
        let lic = license(json!({
            "metadata": {"name": "main", "namespace": "ns"},
            "spec": {"activeInstanceName": "", "switchMode": "force",
                     "gateway": {"publicIP": "203.0.113.7", "baseDomain": "vtt.example"}},
            "status": {"activeInstance": "alpha", "registeredInstances": [
                {"name": "alpha", "state": "active"}
            ]}
        }));

        assert_eq!(lic.desired_holder(), None);
        assert_eq!(lic.current_holder(), Some("alpha"));
        assert_eq!(lic.spec.switch_mode, SwitchMode::Force);
        assert_eq!(lic.spec.gateway.public_endpoint(), Some("203.0.113.7"));
        assert_eq!(lic.spec.gateway.base_domain(), "vtt.example");
    }

    #[test]
    fn test_license_validation() {
        let mut lic = license(json!({
            "metadata": {"name": "main", "namespace": "ns"},
            "spec": {"licenseSecretRef": {"name": "foundry-license", "key": "licenseKey"}}
        }));
        assert!(lic.validate().is_ok());

        lic.spec.license_secret_ref = Some(SecretKeyRef {
            name: Some("null".to_string()),
            key: Some("licenseKey".to_string()),
        });
        assert_eq!(
            lic.validate(),
            Err(CrdError::MissingField {
                field: "licenseSecretRef.name"
            })
        );

        lic.spec.license_secret_ref = Some(SecretKeyRef {
            name: Some("foundry-license".to_string()),
            key: None,
        });
        assert_eq!(
            lic.validate(),
            Err(CrdError::MissingField {
                field: "licenseSecretRef.key"
            })
        );
    }

    #[test]
    fn test_instance_requires_license_ref() {
        let result: Result<Instance, _> = serde_json::from_value(json!({
            "metadata": {"name": "alpha", "namespace": "ns"},
            "spec": {"foundryVersion": "13.347.0"}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_instance_pending_deletion() {
        let mut inst: Instance = serde_json::from_value(json!({
            "metadata": {"name": "alpha", "namespace": "ns", "annotations": {
                "foundry.platform/scheduled-delete-at": "2026-01-02T03:04:05+00:00"
            }},
            "spec": {"licenseRef": {"name": "main"}}
        }))
        .unwrap();

        assert!(inst.is_pending_deletion());
        let at = inst.scheduled_delete_at().unwrap().unwrap();
        assert_eq!(at.to_rfc3339(), "2026-01-02T03:04:05+00:00");

        inst.metadata.annotations.insert(
            annotations::SCHEDULED_DELETE_AT.to_string(),
            "2026-01-02T03:04:05.123456".to_string(),
        );
        assert!(inst.scheduled_delete_at().unwrap().is_ok());

        inst.metadata.annotations.insert(
            annotations::SCHEDULED_DELETE_AT.to_string(),
            "next tuesday".to_string(),
        );
        assert!(inst.is_pending_deletion());
        assert!(inst.scheduled_delete_at().unwrap().is_err());
    }

    #[test]
    fn test_instance_admin_secret_name() {
        let mut inst: Instance = serde_json::from_value(json!({
            "metadata": {"name": "alpha", "namespace": "ns"},
            "spec": {"licenseRef": {"name": "main"}}
        }))
        .unwrap();
        assert_eq!(inst.admin_secret_name(), "foundry-credentials-alpha");

        inst.spec.admin_password_secret_ref = Some(LocalRef {
            name: "foundry-password-user-7".to_string(),
        });
        assert_eq!(inst.admin_secret_name(), "foundry-password-user-7");
    }

    #[test]
    fn test_password_refresh_token() {
        let pw: Password = serde_json::from_value(json!({
            "metadata": {"name": "foundry-password-alpha", "namespace": "ns",
                         "annotations": {"force-sync": "1760000000"}},
            "spec": {"type": "instance", "instanceRef": {"name": "alpha"}}
        }))
        .unwrap();

        assert_eq!(pw.refresh_token(), Some(1_760_000_000));
        assert_eq!(pw.spec.password_type, PasswordType::Instance);
        assert_eq!(pw.instance_name(), Some("alpha"));
        assert!(!pw.is_materialized());
    }
}
