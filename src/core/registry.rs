use std::collections::{HashMap, HashSet};

use crate::core::error::{MigrateError, MigrateResult};

/// Sanitize an arbitrary name into a target-language identifier.
///
/// Characters outside `[A-Za-z0-9_]` become `_`, a leading digit gets a `_`
/// prefix, and an empty name becomes `_`.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }

    out
}

/// Whether `name` is already a valid identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Identifiers claimed during one translation run.
///
/// A registry is created per run and passed explicitly, so concurrent runs
/// never share state. Names are unique within a namespace.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    claimed: HashMap<String, HashSet<String>>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize `raw` and claim it in `namespace`.
    pub fn claim(&mut self, namespace: &str, raw: &str) -> MigrateResult<String> {
        let identifier = sanitize_identifier(raw);
        let names = self.claimed.entry(namespace.to_string()).or_default();

        if !names.insert(identifier.clone()) {
            return Err(MigrateError::DuplicateIdentifier {
                namespace: namespace.to_string(),
                identifier,
            });
        }

        tracing::debug!("Claimed {} identifier '{}' for '{}'", namespace, identifier, raw);
        Ok(identifier)
    }

    /// List claimed identifiers of a namespace, sorted
    pub fn list(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .claimed
            .get(namespace)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("system"), "system");
        assert_eq!(sanitize_identifier("my-app.logs"), "my_app_logs");
        assert_eq!(sanitize_identifier("2fa"), "_2fa");
        assert_eq!(sanitize_identifier(""), "_");
        assert_eq!(sanitize_identifier("nginx access"), "nginx_access");
        assert_eq!(sanitize_identifier("café"), "caf_");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("__path__"));
        assert!(is_identifier("job"));
        assert!(!is_identifier("1job"));
        assert!(!is_identifier("app.kubernetes.io/name"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_registry_claim() {
        let mut registry = IdentifierRegistry::new();
        assert_eq!(registry.claim("job", "my-app").unwrap(), "my_app");
        assert_eq!(registry.list("job"), vec!["my_app"]);
        assert!(registry.list("client").is_empty());

        // A different namespace may reuse the name
        assert_eq!(registry.claim("client", "my_app").unwrap(), "my_app");
    }

    #[test]
    fn test_registry_collision_after_sanitization() {
        let mut registry = IdentifierRegistry::new();
        registry.claim("job", "my-app").unwrap();

        let err = registry.claim("job", "my.app").unwrap_err();
        match err {
            MigrateError::DuplicateIdentifier {
                namespace,
                identifier,
            } => {
                assert_eq!(namespace, "job");
                assert_eq!(identifier, "my_app");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_registry_list() {
        let mut registry = IdentifierRegistry::new();
        registry.claim("job", "b").unwrap();
        registry.claim("job", "a").unwrap();
        assert_eq!(registry.list("job"), vec!["a", "b"]);
        assert!(registry.list("client").is_empty());
    }
}
