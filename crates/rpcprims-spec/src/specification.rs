use async_trait::async_trait;
use rpcprims_types::Result;
use serde::{Deserialize, Serialize};

use crate::bindings::HandlerBindings;
use crate::snapshot::SpecSnapshot;
use crate::source::DescriptorSource;

/// Operator-supplied settings for one specification instance.
///
/// Empty `title`, `description` and `endpoints` are filled in from the
/// descriptor at parse time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificationConfig {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl SpecificationConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }
}

/// Identity of a parsed specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecMetadata {
    pub name: String,
    pub title: String,
    pub description: String,
    pub endpoints: Vec<String>,
    /// Descriptor-declared API version, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SpecMetadata {
    /// Start from configured values; descriptor values only fill gaps.
    pub fn from_config(config: &SpecificationConfig) -> Self {
        Self {
            name: config.name.clone(),
            title: config.title.clone(),
            description: config.description.clone(),
            endpoints: config.endpoints.clone(),
            version: None,
        }
    }

    pub fn fill_title(&mut self, title: Option<&str>) {
        if self.title.is_empty() {
            if let Some(title) = title {
                self.title = title.to_string();
            }
        }
    }

    pub fn fill_description(&mut self, description: Option<&str>) {
        if self.description.is_empty() {
            if let Some(description) = description {
                self.description = description.to_string();
            }
        }
    }

    pub fn fill_endpoints(&mut self, endpoints: Vec<String>) {
        if self.endpoints.is_empty() {
            self.endpoints = endpoints;
        }
    }
}

/// A descriptor format that turns an external document into procedures
/// plus a routing table.
///
/// Implementations only translate descriptor syntax into
/// [`crate::OperationDescriptor`]s; procedure creation and routing-table
/// assembly go through [`crate::SnapshotBuilder`].
#[async_trait]
pub trait Specification: Send + Sync {
    /// Plugin kind this instance was created from (e.g. `"openapi"`).
    fn kind(&self) -> &str;

    fn config(&self) -> &SpecificationConfig;

    fn name(&self) -> &str {
        &self.config().name
    }

    /// Parse `source`, binding every operation to a handler in `bindings`.
    ///
    /// Fails with `BadSpecification`, `ProcedureConflict` or
    /// `UnresolvedHandler`. The same descriptor always yields the same
    /// route keys.
    async fn parse(
        &self,
        source: &DescriptorSource,
        bindings: &HandlerBindings,
    ) -> Result<SpecSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_values_win_over_descriptor() {
        let config = SpecificationConfig::new("widgets")
            .title("Configured")
            .endpoint("http://localhost:8080");
        let mut metadata = SpecMetadata::from_config(&config);
        metadata.fill_title(Some("From descriptor"));
        metadata.fill_description(Some("Described"));
        metadata.fill_endpoints(vec!["http://other".to_string()]);

        assert_eq!(metadata.title, "Configured");
        assert_eq!(metadata.description, "Described");
        assert_eq!(metadata.endpoints, vec!["http://localhost:8080"]);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SpecificationConfig =
            serde_json::from_str(r#"{"name":"widgets"}"#).expect("config should parse");
        assert_eq!(config, SpecificationConfig::new("widgets"));
    }
}
