//! Route generation.
//!
//! Routes are regenerated in full on every pass. A descriptor maps an
//! Instance's public hostname to either its own service (active) or the
//! shared standby page (standby).

use fvtt_crd::{annotations, names, Instance, License, ParentRef, RegisteredInstance, RouteState};
use serde::Serialize;
use serde_json::{json, Value};

/// Port every Instance service and the standby page listen on.
pub const SERVICE_PORT: u16 = 80;

/// TTL of generated DNS records, in seconds.
pub const DNS_TTL: u32 = 300;

/// Where standby traffic goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub standby_service: String,
    /// Namespace of the standby service; the License namespace when unset.
    pub standby_namespace: Option<String>,
    pub port: u16,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            standby_service: "foundry-standby-page".to_string(),
            standby_namespace: None,
            port: SERVICE_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub port: u16,
}

/// DNS record pointing an Instance hostname at the License's public endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsBinding {
    pub name: String,
    pub namespace: String,
    pub hostname: String,
    pub target: String,
    pub ttl: u32,
}

/// Routing state of one Instance for one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    /// Object name of the generated route.
    pub name: String,
    pub namespace: String,
    pub license: String,
    pub instance: String,
    pub hostname: String,
    pub state: RouteState,
    pub pending_deletion: bool,
    pub parent_ref: ParentRef,
    pub backend: BackendRef,
    pub dns: Option<DnsBinding>,
}

fn labels(license: &str, instance: &str) -> Value {
    json!({
        "app": "foundry-vtt",
        "instance": instance,
        (annotations::LICENSE_LABEL): license,
    })
}

impl RouteDescriptor {
    pub fn is_active(&self) -> bool {
        self.state == RouteState::Active
    }

    /// Gateway route object for this descriptor.
    pub fn to_manifest(&self) -> Value {
        json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "HTTPRoute",
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
                "labels": labels(&self.license, &self.instance),
                "annotations": {
                    "foundry.platform/route-state": self.state.to_string(),
                },
            },
            "spec": {
                "hostnames": [self.hostname],
                "parentRefs": [self.parent_ref],
                "rules": [{
                    "matches": [{"path": {"type": "PathPrefix", "value": "/"}}],
                    "backendRefs": [self.backend],
                }],
            },
        })
    }
}

impl DnsBinding {
    /// External DNS record object for this binding.
    pub fn to_manifest(&self, license: &str, instance: &str) -> Value {
        json!({
            "apiVersion": "externaldns.k8s.io/v1alpha1",
            "kind": "DNSEndpoint",
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
                "labels": labels(license, instance),
            },
            "spec": {
                "endpoints": [{
                    "dnsName": self.hostname,
                    "recordType": "A",
                    "recordTTL": self.ttl,
                    "targets": [self.target],
                }],
            },
        })
    }
}

/// Emit one descriptor per Instance bound to `license`, in listing order.
///
/// Only `holder` is routed to its own service, and never while it is pending
/// deletion.
pub fn generate_routes(
    license: &License,
    instances: &[Instance],
    holder: Option<&str>,
    config: &RouteConfig,
) -> Vec<RouteDescriptor> {
    let namespace = license.namespace();
    let gateway = &license.spec.gateway;
    let parent_ref = gateway.resolved_parent_ref(namespace);
    let base_domain = gateway.base_domain();
    let endpoint = gateway.public_endpoint();

    instances
        .iter()
        .filter(|i| i.license_name() == license.name())
        .map(|instance| {
            let name = instance.name();
            let pending_deletion = instance.is_pending_deletion();
            let active = holder == Some(name) && !pending_deletion;
            let hostname = names::public_hostname(name, base_domain);
            let route_name = names::route_object_name(name);

            let backend = if active {
                BackendRef {
                    name: names::service_name(name),
                    namespace: None,
                    port: config.port,
                }
            } else {
                BackendRef {
                    name: config.standby_service.clone(),
                    namespace: config.standby_namespace.clone(),
                    port: config.port,
                }
            };

            let dns = endpoint.map(|target| DnsBinding {
                name: route_name.clone(),
                namespace: namespace.to_string(),
                hostname: hostname.clone(),
                target: target.to_string(),
                ttl: DNS_TTL,
            });

            RouteDescriptor {
                name: route_name,
                namespace: namespace.to_string(),
                license: license.name().to_string(),
                instance: name.to_string(),
                hostname,
                state: if active {
                    RouteState::Active
                } else {
                    RouteState::Standby
                },
                pending_deletion,
                parent_ref: parent_ref.clone(),
                backend,
                dns,
            }
        })
        .collect()
}

/// Status view of generated routes.
pub fn registered_instances(routes: &[RouteDescriptor]) -> Vec<RegisteredInstance> {
    routes
        .iter()
        .map(|r| RegisteredInstance {
            name: r.instance.clone(),
            state: r.state,
        })
        .collect()
}

pub fn active_count(routes: &[RouteDescriptor]) -> usize {
    routes.iter().filter(|r| r.is_active()).count()
}
