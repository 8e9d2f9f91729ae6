use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rpcprims_types::{Result, RpcError};
use serde_json::json;

use crate::openapi::{OpenApiSpecification, OPENAPI_KIND, SWAGGER_KIND};
use crate::specification::{Specification, SpecificationConfig};

type Factory = Arc<dyn Fn(SpecificationConfig) -> Result<Arc<dyn Specification>> + Send + Sync>;

/// Specification plugins keyed by kind string.
#[derive(Clone, Default)]
pub struct SpecificationPlugins {
    factories: BTreeMap<String, Factory>,
}

impl SpecificationPlugins {
    /// Empty set; see [`SpecificationPlugins::with_defaults`] for the built-ins.
    pub fn new() -> Self {
        Self::default()
    }

    /// The OpenAPI plugin under both `"openapi"` and `"swagger"`.
    pub fn with_defaults() -> Self {
        let mut plugins = Self::new();
        for kind in [OPENAPI_KIND, SWAGGER_KIND] {
            let factory: Factory = Arc::new(move |config: SpecificationConfig| -> Result<_> {
                let spec = OpenApiSpecification::new(config).with_kind(kind);
                Ok(Arc::new(spec) as Arc<dyn Specification>)
            });
            plugins.factories.insert(kind.to_string(), factory);
        }
        plugins
    }

    /// Register a plugin kind. Kinds are never silently replaced.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(SpecificationConfig) -> Result<Arc<dyn Specification>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(RpcError::invalid_argument("specification kind is required"));
        }
        if self.factories.contains_key(&kind) {
            return Err(RpcError::duplicate_registration(format!(
                "specification kind {kind} is already registered"
            )));
        }
        self.factories.insert(kind, Arc::new(factory));
        Ok(())
    }

    /// Instantiate the plugin registered under `kind`.
    pub fn create(&self, kind: &str, config: SpecificationConfig) -> Result<Arc<dyn Specification>> {
        let factory = self.factories.get(kind).ok_or_else(|| {
            RpcError::not_found(format!("no specification plugin of kind {kind}"))
                .with_context(json!({ "kind": kind, "known": self.kinds() }))
        })?;
        factory(config)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for SpecificationPlugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecificationPlugins")
            .field("kinds", &self.kinds())
            .finish()
    }
}
