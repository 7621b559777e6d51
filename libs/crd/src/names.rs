//! Naming rules shared by the controller and the CLI.
//!
//! Derived object names are built from the owning record's name, so every
//! helper here is deterministic.

use crate::CrdError;

/// Maximum length of an RFC 1123 label.
pub const MAX_LABEL_LEN: usize = 63;

/// Validate a record name as an RFC 1123 label.
pub fn validate_name(name: &str) -> Result<(), CrdError> {
    if name.is_empty() {
        return Err(CrdError::EmptyName);
    }
    if name.len() > MAX_LABEL_LEN {
        return Err(CrdError::NameTooLong {
            name: name.to_string(),
            max: MAX_LABEL_LEN,
        });
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars || name.starts_with('-') || name.ends_with('-') {
        return Err(CrdError::InvalidName(name.to_string()));
    }

    Ok(())
}

/// Service fronting a running Instance.
pub fn service_name(instance: &str) -> String {
    format!("foundry-{instance}")
}

/// Cluster-internal hostname of an Instance's service.
pub fn internal_hostname(instance: &str, namespace: &str) -> String {
    format!("{}.{namespace}.svc.cluster.local", service_name(instance))
}

/// Public hostname of an Instance under a License's base domain.
pub fn public_hostname(instance: &str, base_domain: &str) -> String {
    format!("{instance}.{}", base_domain.trim_start_matches('.'))
}

/// Name of the route (and DNS binding) object generated for an Instance.
pub fn route_object_name(instance: &str) -> String {
    format!("foundry-id-{instance}")
}

/// Password record backing an owner's default admin password.
pub fn default_password_name(owner_id: &str) -> String {
    format!("foundry-password-user-{owner_id}")
}

/// Password record backing a single Instance's admin password.
pub fn instance_password_name(instance: &str) -> String {
    format!("foundry-password-{instance}")
}

/// Fallback credentials secret for Instances without an explicit reference.
pub fn credentials_secret_name(instance: &str) -> String {
    format!("foundry-credentials-{instance}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_name("world-1").is_ok());
        assert!(validate_name("a").is_ok());
        assert!(validate_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(validate_name(""), Err(CrdError::EmptyName));
        assert!(validate_name("World").unwrap_err().is_name_error());
        assert!(validate_name("-lead").is_err());
        assert!(validate_name("trail-").is_err());
        assert!(validate_name("under_score").is_err());
        assert!(matches!(
            validate_name(&"a".repeat(64)),
            Err(CrdError::NameTooLong { max: 63, .. })
        ));
    }

    #[test]
    fn test_derived_names() {
        assert_eq!(service_name("alpha"), "foundry-alpha");
        assert_eq!(
            internal_hostname("alpha", "foundry-vtt"),
            "foundry-alpha.foundry-vtt.svc.cluster.local"
        );
        assert_eq!(public_hostname("alpha", "games.example"), "alpha.games.example");
        assert_eq!(public_hostname("alpha", ".games.example"), "alpha.games.example");
        assert_eq!(route_object_name("alpha"), "foundry-id-alpha");
        assert_eq!(default_password_name("42"), "foundry-password-user-42");
        assert_eq!(credentials_secret_name("alpha"), "foundry-credentials-alpha");
    }
}
