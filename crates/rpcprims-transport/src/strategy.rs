use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rpcprims_types::{Result, RpcError};
use serde::{Deserialize, Serialize};

const ROUND_ROBIN: &str = "round-robin";
const FAILOVER: &str = "failover";

/// Names of the built-in endpoint-selection strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Rotate through endpoints, one attempt per call.
    #[default]
    RoundRobin,
    /// Try endpoints in configured order, moving on only when one is unreachable.
    Failover,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 2] = [StrategyKind::RoundRobin, StrategyKind::Failover];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoundRobin => ROUND_ROBIN,
            Self::Failover => FAILOVER,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = RpcError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| RpcError::invalid_argument(format!("unknown endpoint strategy {raw:?}")))
    }
}

impl From<StrategyKind> for String {
    fn from(kind: StrategyKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Orders endpoint indices for one outbound call.
///
/// The transport tries the returned indices in order and moves to the next
/// only after a connection failure. An index past the end of the endpoint
/// list fails the call with `TransportError`.
pub trait EndpointStrategy: Send + Sync {
    /// Name callers select this strategy by.
    fn name(&self) -> &str;

    fn candidates(&self, endpoint_count: usize) -> Vec<usize>;
}

/// Endpoint strategies available to one transport, keyed by name.
#[derive(Clone)]
pub struct EndpointStrategies {
    by_name: BTreeMap<String, Arc<dyn EndpointStrategy>>,
}

impl EndpointStrategies {
    /// Round-robin and failover under their built-in names.
    pub fn with_defaults() -> Self {
        let mut by_name: BTreeMap<String, Arc<dyn EndpointStrategy>> = BTreeMap::new();
        by_name.insert(ROUND_ROBIN.to_string(), Arc::new(RoundRobin::new()));
        by_name.insert(FAILOVER.to_string(), Arc::new(Failover));
        Self { by_name }
    }

    pub fn register(&mut self, strategy: Arc<dyn EndpointStrategy>) -> Result<()> {
        let name = strategy.name().trim().to_string();
        if name.is_empty() {
            return Err(RpcError::invalid_argument("endpoint strategy name is required"));
        }
        if self.by_name.contains_key(&name) {
            return Err(RpcError::duplicate_registration(format!(
                "endpoint strategy {name} is already registered"
            )));
        }
        self.by_name.insert(name, strategy);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn EndpointStrategy>> {
        self.by_name.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.by_name.keys().map(String::as_str).collect()
    }
}

impl Default for EndpointStrategies {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for EndpointStrategies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.by_name.keys()).finish()
    }
}

/// One endpoint per call, advancing on every call.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EndpointStrategy for RoundRobin {
    fn name(&self) -> &str {
        ROUND_ROBIN
    }

    fn candidates(&self, endpoint_count: usize) -> Vec<usize> {
        if endpoint_count == 0 {
            return Vec::new();
        }
        let turn = self.next.fetch_add(1, Ordering::Relaxed);
        vec![turn % endpoint_count]
    }
}

/// Every endpoint, primary first.
#[derive(Debug, Default, Clone, Copy)]
pub struct Failover;

impl EndpointStrategy for Failover {
    fn name(&self) -> &str {
        FAILOVER
    }

    fn candidates(&self, endpoint_count: usize) -> Vec<usize> {
        (0..endpoint_count).collect()
    }
}
