// src/plugins/mod.rs — Plugin contract, script host, manager, hot reload

pub mod manager;
pub mod rhai_host;
pub mod unit;
pub mod watcher;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::infra::errors::PluginError;

/// Identity metadata exposed by a loaded plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub capabilities: Vec<String>,
    /// Source file for script plugins, `None` for native ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl PluginDescriptor {
    /// A descriptor with defaults for everything except the name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: "0.1.0".into(),
            author: "unknown".into(),
            capabilities: Vec::new(),
            source: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.capabilities = capabilities.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Result of an optional plugin health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
    /// The plugin does not implement a health check.
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(d) => write!(f, "degraded ({d})"),
            Self::Unhealthy(d) => write!(f, "unhealthy ({d})"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// The contract every capability unit satisfies.
///
/// Implementations must be safe to call concurrently: the router may invoke
/// `handle` from several requests at once, and a reload can replace the
/// instance in the registry while calls on the old one are still running.
pub trait Plugin: Send + Sync {
    fn descriptor(&self) -> &PluginDescriptor;

    /// Process one request. Errors are ordinary outcomes, never fatal.
    fn handle(
        &self,
        query: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, PluginError>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn get_info(&self) -> PluginDescriptor {
        self.descriptor().clone()
    }

    fn health_check(&self) -> HealthStatus {
        HealthStatus::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Minimal {
        descriptor: PluginDescriptor,
    }

    impl Plugin for Minimal {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }

        fn handle(
            &self,
            query: &str,
            _context: Option<&serde_json::Value>,
        ) -> Result<serde_json::Value, PluginError> {
            Ok(serde_json::json!(query))
        }
    }

    #[test]
    fn test_minimal_plugin_defaults() {
        let p = Minimal {
            descriptor: PluginDescriptor::named("echo"),
        };
        assert_eq!(p.name(), "echo");
        assert_eq!(p.get_info().version, "0.1.0");
        assert_eq!(p.get_info().author, "unknown");
        assert!(p.get_info().capabilities.is_empty());
        assert_eq!(p.health_check(), HealthStatus::Unknown);
    }

    #[test]
    fn test_descriptor_builders() {
        let d = PluginDescriptor::named("task")
            .with_description("Manages tasks")
            .with_capabilities(&["create", "list"]);
        assert_eq!(d.description, "Manages tasks");
        assert_eq!(d.capabilities, vec!["create", "list"]);
    }

    #[test]
    fn test_health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(
            HealthStatus::Degraded("slow disk".into()).to_string(),
            "degraded (slow disk)"
        );
    }

    #[test]
    fn test_descriptor_serialization_skips_missing_source() {
        let json = serde_json::to_value(PluginDescriptor::named("x")).unwrap();
        assert!(json.get("source").is_none());
        assert_eq!(json["name"], "x");
    }
}
