//! Stack namespaces.
//!
//! A namespace is the stack name. Every object a stack owns carries the
//! namespace label and, for services, networks and secrets without an
//! explicit name, the `<namespace>_` name prefix.

use crate::docker::types::{Filters, Labels};
use crate::error::{ConfigError, DeployError, Result};

/// Label key marking stack membership.
pub const LABEL_NAMESPACE: &str = "com.docker.stack.namespace";

/// Label key recording the image a service was deployed with.
pub const LABEL_IMAGE: &str = "com.docker.stack.image";

/// Separator between the namespace and an internal name.
const SCOPE_SEPARATOR: char = '_';

/// The identity of a stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    name: String,
}

impl Namespace {
    /// Creates a namespace without validating the name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Creates a namespace from user input.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or contains characters that are
    /// not valid in object names.
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(ConfigError::validation("stack name cannot be empty", "namespace").into());
        }

        let valid_start = name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');

        if !valid_start || !valid_chars {
            return Err(ConfigError::validation(
                format!(
                    "invalid stack name {name:?}: must start with a letter or digit and contain only letters, digits, '-', '_' and '.'"
                ),
                "namespace",
            )
            .into());
        }

        Ok(Self::new(name))
    }

    /// Returns the namespace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefixes an internal name with the namespace.
    #[must_use]
    pub fn scope(&self, internal: &str) -> String {
        format!("{}{SCOPE_SEPARATOR}{internal}", self.name)
    }

    /// Strips the namespace prefix from a scoped name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name does not start with `<namespace>_`.
    pub fn descope<'a>(&self, scoped: &'a str) -> Result<&'a str> {
        scoped
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix(SCOPE_SEPARATOR))
            .ok_or_else(|| {
                DeployError::InvalidScopedName {
                    name: scoped.to_string(),
                    namespace: self.name.clone(),
                }
                .into()
            })
    }

    /// The label selector matching every object of this stack.
    #[must_use]
    pub fn label_filter(&self) -> Filters {
        Filters::new().with("label", format!("{LABEL_NAMESPACE}={}", self.name))
    }

    /// The label selector matching objects of any stack.
    #[must_use]
    pub fn all_stacks_filter() -> Filters {
        Filters::new().with("label", LABEL_NAMESPACE)
    }

    /// Returns a copy of `labels` with the namespace label set.
    #[must_use]
    pub fn add_stack_label(&self, labels: &Labels) -> Labels {
        let mut labels = labels.clone();
        labels.insert(LABEL_NAMESPACE.to_string(), self.name.clone());
        labels
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_and_descope() {
        let ns = Namespace::new("app");
        let scoped = ns.scope("web");
        assert_eq!(scoped, "app_web");
        assert_eq!(ns.descope(&scoped).expect("descope"), "web");
        assert_eq!(ns.descope("app_web_1").expect("descope"), "web_1");
    }

    #[test]
    fn test_descope_rejects_foreign_names() {
        let ns = Namespace::new("app");
        assert!(ns.descope("other_web").is_err());
        assert!(ns.descope("appweb").is_err());
        assert!(ns.descope("application_web").is_err());
    }

    #[test]
    fn test_label_filter() {
        let ns = Namespace::new("app");
        let filter = ns.label_filter();
        assert_eq!(filter.values("label"), vec!["com.docker.stack.namespace=app"]);
        assert_eq!(
            Namespace::all_stacks_filter().values("label"),
            vec!["com.docker.stack.namespace"]
        );
    }

    #[test]
    fn test_add_stack_label_preserves_existing() {
        let ns = Namespace::new("app");
        let mut labels = Labels::new();
        labels.insert("tier".to_string(), "front".to_string());
        labels.insert(LABEL_NAMESPACE.to_string(), "spoofed".to_string());

        let labelled = ns.add_stack_label(&labels);
        assert_eq!(labelled.get("tier").map(String::as_str), Some("front"));
        assert_eq!(labelled.get(LABEL_NAMESPACE).map(String::as_str), Some("app"));
        assert_eq!(labels.get(LABEL_NAMESPACE).map(String::as_str), Some("spoofed"));
    }

    #[test]
    fn test_parse_validates_names() {
        assert!(Namespace::parse("my-stack_1.0").is_ok());
        assert!(Namespace::parse("").is_err());
        assert!(Namespace::parse("-bad").is_err());
        assert!(Namespace::parse("with space").is_err());
        assert!(Namespace::parse("a:b").is_err());
    }
}
