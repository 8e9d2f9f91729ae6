use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rpcprims_types::{Result, RpcError};
use serde_json::json;

use crate::http::{HttpTransport, HttpTransportConfig, HTTP_KIND};
use crate::traits::{Transport, TransportConfig};

type Factory = Arc<dyn Fn(TransportConfig) -> Result<Arc<dyn Transport>> + Send + Sync>;

/// Transport plugins keyed by kind string.
#[derive(Clone, Default)]
pub struct TransportPlugins {
    factories: BTreeMap<String, Factory>,
}

impl TransportPlugins {
    pub fn new() -> Self {
        Self::default()
    }

    /// The HTTP plugin under `"http"`.
    pub fn with_defaults() -> Self {
        let mut plugins = Self::new();
        let http: Factory = Arc::new(|config: TransportConfig| -> Result<_> {
            let transport = HttpTransport::new(HttpTransportConfig::from(config))?;
            Ok(Arc::new(transport) as Arc<dyn Transport>)
        });
        plugins.factories.insert(HTTP_KIND.to_string(), http);
        plugins
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(TransportConfig) -> Result<Arc<dyn Transport>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(RpcError::invalid_argument("transport kind is required"));
        }
        if self.factories.contains_key(&kind) {
            return Err(RpcError::duplicate_registration(format!(
                "transport kind {kind} is already registered"
            )));
        }
        self.factories.insert(kind, Arc::new(factory));
        Ok(())
    }

    /// Instantiate the plugin named by `config.kind`.
    pub fn create(&self, config: TransportConfig) -> Result<Arc<dyn Transport>> {
        let factory = self.factories.get(&config.kind).ok_or_else(|| {
            RpcError::not_found(format!("no transport plugin of kind {}", config.kind))
                .with_context(json!({ "kind": config.kind, "known": self.kinds() }))
        })?;
        factory(config)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for TransportPlugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportPlugins")
            .field("kinds", &self.kinds())
            .finish()
    }
}
