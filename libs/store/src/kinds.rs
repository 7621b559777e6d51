//! Record kinds known to the arbiter.

/// Addressing information for one kind of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKind {
    /// API group; empty for the core group.
    pub group: &'static str,
    pub version: &'static str,
    pub plural: &'static str,
    pub kind: &'static str,
}

impl ResourceKind {
    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// REST path of the namespaced collection.
    pub fn collection_path(&self, namespace: &str) -> String {
        if self.group.is_empty() {
            format!("/api/{}/namespaces/{namespace}/{}", self.version, self.plural)
        } else {
            format!(
                "/apis/{}/{}/namespaces/{namespace}/{}",
                self.group, self.version, self.plural
            )
        }
    }

    /// REST path of a single record.
    pub fn object_path(&self, namespace: &str, name: &str) -> String {
        format!("{}/{name}", self.collection_path(namespace))
    }
}

pub const LICENSE: ResourceKind = ResourceKind {
    group: "foundry.platform",
    version: "v1alpha1",
    plural: "foundrylicenses",
    kind: "FoundryLicense",
};

pub const INSTANCE: ResourceKind = ResourceKind {
    group: "foundry.platform",
    version: "v1alpha1",
    plural: "foundryinstances",
    kind: "FoundryInstance",
};

pub const PASSWORD: ResourceKind = ResourceKind {
    group: "foundry.platform",
    version: "v1alpha1",
    plural: "foundrypasswords",
    kind: "FoundryPassword",
};

pub const SECRET: ResourceKind = ResourceKind {
    group: "",
    version: "v1",
    plural: "secrets",
    kind: "Secret",
};

pub const HTTP_ROUTE: ResourceKind = ResourceKind {
    group: "gateway.networking.k8s.io",
    version: "v1",
    plural: "httproutes",
    kind: "HTTPRoute",
};

pub const DNS_ENDPOINT: ResourceKind = ResourceKind {
    group: "externaldns.k8s.io",
    version: "v1alpha1",
    plural: "dnsendpoints",
    kind: "DNSEndpoint",
};
