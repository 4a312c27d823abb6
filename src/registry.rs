//! Service registry: the ordered set of service names a run verifies.
//!
//! Order is only used for report layout. Names are unique.

use std::collections::HashSet;
use std::fmt;

use crate::config::{ConfigError, RegistryConfig};

/// Logical name of a service instance under test
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Ordered, duplicate-free list of services to verify
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistry {
    services: Vec<ServiceName>,
}

impl ServiceRegistry {
    /// Build a registry, rejecting empty and duplicate names
    pub fn new<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut services = Vec::new();

        for name in names {
            let name = name.into();
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "Service names must not be empty".to_string(),
                ));
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate service name in registry: {}",
                    name
                )));
            }
            services.push(ServiceName(name));
        }

        if services.is_empty() {
            return Err(ConfigError::Validation(
                "No services configured. Add names to [registry] services".to_string(),
            ));
        }

        Ok(Self { services })
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self, ConfigError> {
        Self::new(config.services.iter().cloned())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceName> {
        self.services.iter()
    }

    pub fn names(&self) -> &[ServiceName] {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_preserves_insertion_order() {
        let registry = ServiceRegistry::new(["svc-b", "svc-a", "svc-c"]).unwrap();
        let names: Vec<&str> = registry.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["svc-b", "svc-a", "svc-c"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let err = ServiceRegistry::new(["svc-a", "svc-a"]).unwrap_err();
        assert!(err.to_string().contains("svc-a"));
    }

    #[test]
    fn test_registry_rejects_blank_name() {
        assert!(ServiceRegistry::new(["svc-a", "  "]).is_err());
    }

    #[test]
    fn test_registry_rejects_empty() {
        assert!(ServiceRegistry::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_service_name_display() {
        assert_eq!(ServiceName::from("controller").to_string(), "controller");
    }
}
