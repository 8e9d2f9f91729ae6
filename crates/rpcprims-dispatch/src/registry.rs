use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arc_swap::ArcSwap;
use rpcprims_procedure::{Procedure, ProcedureDefinition};
use rpcprims_spec::{DescriptorSource, HandlerBindings, SpecSnapshot, Specification};
use rpcprims_transport::Transport;
use rpcprims_types::{Result, RpcError};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;

/// A registered specification and the snapshot currently serving it.
pub(crate) struct SpecEntry {
    pub(crate) spec: Arc<dyn Specification>,
    pub(crate) snapshot: ArcSwap<SpecSnapshot>,
}

/// Registered specifications and transports for one application.
///
/// Built once during assembly and shared by reference. Maps change only
/// through explicit registration, deregistration and reload; a reload swaps
/// in a whole new [`SpecSnapshot`], so readers see either the old or the new
/// routing table and never a mix.
#[derive(Default)]
pub struct Registry {
    specifications: RwLock<HashMap<String, Arc<SpecEntry>>>,
    transports: RwLock<HashMap<String, Arc<dyn Transport>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `spec` under `name` with an empty routing table.
    ///
    /// Parsing is a separate step; see [`Registry::load_specification`].
    pub fn register_specification(
        &self,
        name: impl Into<String>,
        spec: Arc<dyn Specification>,
    ) -> Result<()> {
        let name = checked_name(name.into(), "specification")?;
        if !spec.name().is_empty() && spec.name() != name {
            return Err(RpcError::invalid_argument(format!(
                "specification instance {} cannot be registered as {name}",
                spec.name()
            )));
        }

        let mut specifications = write(&self.specifications);
        if specifications.contains_key(&name) {
            return Err(duplicate("specification", &name));
        }
        let entry = SpecEntry {
            snapshot: ArcSwap::from_pointee(SpecSnapshot::empty(spec.config())),
            spec,
        };
        debug!(spec = %name, kind = %entry.spec.kind(), "specification registered");
        specifications.insert(name, Arc::new(entry));
        Ok(())
    }

    pub fn register_transport(
        &self,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Result<()> {
        let name = checked_name(name.into(), "transport")?;
        if transport.name() != name {
            return Err(RpcError::invalid_argument(format!(
                "transport instance {} cannot be registered as {name}",
                transport.name()
            )));
        }

        let mut transports = write(&self.transports);
        if transports.contains_key(&name) {
            return Err(duplicate("transport", &name));
        }
        debug!(transport = %name, kind = %transport.kind(), "transport registered");
        transports.insert(name, transport);
        Ok(())
    }

    /// Remove a specification. In-flight requests finish on the snapshot they hold.
    pub fn deregister_specification(&self, name: &str) -> Result<Arc<dyn Specification>> {
        let entry = write(&self.specifications)
            .remove(name)
            .ok_or_else(|| missing("specification", name))?;
        info!(spec = %name, "specification deregistered");
        Ok(entry.spec.clone())
    }

    pub fn deregister_transport(&self, name: &str) -> Result<Arc<dyn Transport>> {
        let transport = write(&self.transports)
            .remove(name)
            .ok_or_else(|| missing("transport", name))?;
        info!(transport = %name, "transport deregistered");
        Ok(transport)
    }

    pub fn get_specification(&self, name: &str) -> Result<Arc<dyn Specification>> {
        Ok(self.entry(name)?.spec.clone())
    }

    pub fn get_transport(&self, name: &str) -> Result<Arc<dyn Transport>> {
        read(&self.transports)
            .get(name)
            .cloned()
            .ok_or_else(|| missing("transport", name))
    }

    /// Registered specification names, sorted.
    pub fn specification_names(&self) -> Vec<String> {
        sorted_keys(&read(&self.specifications))
    }

    /// Registered transport names, sorted.
    pub fn transport_names(&self) -> Vec<String> {
        sorted_keys(&read(&self.transports))
    }

    /// Validate `definition` and build a procedure. Nothing is registered.
    pub fn create_procedure(&self, definition: ProcedureDefinition) -> Result<Procedure> {
        Procedure::new(definition)
    }

    /// Snapshot currently serving `name`.
    pub fn snapshot(&self, name: &str) -> Result<Arc<SpecSnapshot>> {
        Ok(self.entry(name)?.snapshot.load_full())
    }

    /// Parse `source` with the registered plugin and swap the result in.
    ///
    /// On any parse failure the previous snapshot stays live. If `name` was
    /// deregistered or re-registered while parsing, the result is discarded
    /// with `NotFound`.
    pub async fn load_specification(
        &self,
        name: &str,
        source: &DescriptorSource,
        bindings: &HandlerBindings,
    ) -> Result<Arc<SpecSnapshot>> {
        let entry = self.entry(name)?;
        match entry.spec.parse(source, bindings).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                {
                    let specifications = read(&self.specifications);
                    match specifications.get(name) {
                        Some(live) if Arc::ptr_eq(live, &entry) => {
                            live.snapshot.store(snapshot.clone());
                        }
                        _ => {
                            warn!(
                                spec = %name,
                                %source,
                                "specification replaced during load, discarding"
                            );
                            return Err(RpcError::not_found(format!(
                                "specification {name} was deregistered while loading"
                            ))
                            .with_context(json!({ "name": name })));
                        }
                    }
                }
                info!(
                    spec = %name,
                    %source,
                    procedures = snapshot.procedure_names().len(),
                    routes = snapshot.routes().len(),
                    "specification loaded"
                );
                Ok(snapshot)
            }
            Err(err) => {
                warn!(
                    spec = %name,
                    %source,
                    error = %err,
                    "specification load failed, keeping previous snapshot"
                );
                Err(err)
            }
        }
    }

    /// Swap in an already-built snapshot for `name`.
    pub fn install_snapshot(
        &self,
        name: &str,
        snapshot: SpecSnapshot,
    ) -> Result<Arc<SpecSnapshot>> {
        let entry = self.entry(name)?;
        let snapshot = Arc::new(snapshot);
        entry.snapshot.store(snapshot.clone());
        info!(spec = %name, routes = snapshot.routes().len(), "snapshot installed");
        Ok(snapshot)
    }

    /// Dispatcher that routes inbound requests against `spec`.
    pub fn dispatcher(self: &Arc<Self>, spec: &str) -> Result<Dispatcher> {
        self.entry(spec)?;
        Ok(Dispatcher::new(self.clone(), spec))
    }

    pub(crate) fn entry(&self, name: &str) -> Result<Arc<SpecEntry>> {
        read(&self.specifications)
            .get(name)
            .cloned()
            .ok_or_else(|| missing("specification", name))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("specifications", &self.specification_names())
            .field("transports", &self.transport_names())
            .finish()
    }
}

// Guards are never held across an await or a user callback, so a poisoned
// lock still holds a consistent map.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut names: Vec<String> = map.keys().cloned().collect();
    names.sort_unstable();
    names
}

fn checked_name(name: String, what: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(RpcError::invalid_argument(format!("{what} name is required")));
    }
    Ok(name)
}

fn duplicate(what: &str, name: &str) -> RpcError {
    RpcError::duplicate_registration(format!("{what} {name} is already registered"))
        .with_context(json!({ "name": name }))
}

fn missing(what: &str, name: &str) -> RpcError {
    RpcError::not_found(format!("no {what} named {name}")).with_context(json!({ "name": name }))
}
