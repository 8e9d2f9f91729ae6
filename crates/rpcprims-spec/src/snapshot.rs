use std::collections::BTreeMap;
use std::sync::Arc;

use rpcprims_procedure::{Procedure, ProcedureDefinition};
use rpcprims_types::{ErrorKind, Method, Result, RouteKey, RpcError};
use serde_json::json;
use tracing::debug;

use crate::bindings::HandlerBindings;
use crate::specification::{SpecMetadata, SpecificationConfig};
use crate::table::{RouteMatch, RoutingTable};

/// One descriptor operation, normalized and ready to be bound.
///
/// `definition` carries everything except the handler; the handler is
/// looked up by `operation_id`, which also becomes the procedure name.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    pub route: RouteKey,
    pub operation_id: String,
    pub definition: ProcedureDefinition,
}

/// Immutable result of parsing a descriptor.
///
/// Every routing-table entry names a procedure in `procedures`.
#[derive(Debug, Clone)]
pub struct SpecSnapshot {
    metadata: SpecMetadata,
    procedures: BTreeMap<String, Arc<Procedure>>,
    routes: RoutingTable,
}

impl SpecSnapshot {
    /// Snapshot with no procedures and no routes, used before the first parse.
    pub fn empty(config: &SpecificationConfig) -> Self {
        Self {
            metadata: SpecMetadata::from_config(config),
            procedures: BTreeMap::new(),
            routes: RoutingTable::new(),
        }
    }

    pub fn metadata(&self) -> &SpecMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn endpoints(&self) -> &[String] {
        &self.metadata.endpoints
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn procedure(&self, name: &str) -> Option<&Arc<Procedure>> {
        self.procedures.get(name)
    }

    pub fn procedures(&self) -> impl Iterator<Item = &Arc<Procedure>> {
        self.procedures.values()
    }

    /// Procedure names, sorted.
    pub fn procedure_names(&self) -> Vec<&str> {
        self.procedures.keys().map(String::as_str).collect()
    }

    /// Resolve a request to its route and procedure within this snapshot.
    pub fn resolve(&self, method: Method, path: &str) -> Result<(RouteMatch, Arc<Procedure>)> {
        let matched = self.routes.resolve(method, path)?;
        let procedure = self.procedures.get(&matched.procedure).cloned().ok_or_else(|| {
            RpcError::internal(format!(
                "route {} names unknown procedure {}",
                matched.key, matched.procedure
            ))
        })?;
        Ok((matched, procedure))
    }
}

/// Shared assembly of procedures and routes for every specification plugin.
#[derive(Debug)]
pub struct SnapshotBuilder {
    metadata: SpecMetadata,
    procedures: BTreeMap<String, Arc<Procedure>>,
    routes: RoutingTable,
}

impl SnapshotBuilder {
    pub fn new(metadata: SpecMetadata) -> Self {
        Self {
            metadata,
            procedures: BTreeMap::new(),
            routes: RoutingTable::new(),
        }
    }

    pub fn metadata_mut(&mut self) -> &mut SpecMetadata {
        &mut self.metadata
    }

    /// Bind `operation` to its handler, build the procedure and route it.
    pub fn add_operation(
        &mut self,
        operation: OperationDescriptor,
        bindings: &HandlerBindings,
    ) -> Result<()> {
        let OperationDescriptor {
            route,
            operation_id,
            definition,
        } = operation;

        if self.procedures.contains_key(&operation_id) {
            return Err(RpcError::procedure_conflict(format!(
                "operation id {operation_id} is used more than once"
            ))
            .with_context(json!({ "operation_id": operation_id, "route": route.to_string() })));
        }

        let handler = bindings.get(&operation_id).ok_or_else(|| {
            RpcError::unresolved_handler(format!(
                "no handler bound for operation {operation_id} ({route})"
            ))
            .with_context(json!({ "operation_id": operation_id }))
        })?;

        let definition = ProcedureDefinition {
            name: operation_id,
            ..definition
        }
        .shared_handler(handler);
        let procedure = Procedure::new(definition).map_err(|err| match err.kind() {
            ErrorKind::InvalidArgument => {
                RpcError::bad_specification(format!("operation {route}: {}", err.message()))
                    .with_source(err)
            }
            _ => err,
        })?;

        self.insert(Some(route), procedure)
    }

    /// Add an already-built procedure, optionally reachable by `route`.
    pub fn add_procedure(&mut self, route: Option<RouteKey>, procedure: Procedure) -> Result<()> {
        if self.procedures.contains_key(procedure.name()) {
            return Err(RpcError::procedure_conflict(format!(
                "procedure {} is defined more than once",
                procedure.name()
            )));
        }
        self.insert(route, procedure)
    }

    fn insert(&mut self, route: Option<RouteKey>, procedure: Procedure) -> Result<()> {
        let name = procedure.name().to_string();
        if let Some(route) = route {
            debug!(procedure = %name, %route, "route added");
            self.routes.insert(route, name.clone())?;
        }
        self.procedures.insert(name, Arc::new(procedure));
        Ok(())
    }

    pub fn build(self) -> Result<SpecSnapshot> {
        if self.metadata.endpoints.is_empty() {
            return Err(RpcError::bad_specification(format!(
                "specification {} declares no endpoints",
                self.metadata.name
            )));
        }
        if let Some(dangling) = self
            .routes
            .entries()
            .iter()
            .find(|entry| !self.procedures.contains_key(&entry.procedure))
        {
            return Err(RpcError::internal(format!(
                "route {} names unknown procedure {}",
                dangling.key, dangling.procedure
            )));
        }

        debug!(
            spec = %self.metadata.name,
            procedures = self.procedures.len(),
            routes = self.routes.len(),
            "snapshot built"
        );
        Ok(SpecSnapshot {
            metadata: self.metadata,
            procedures: self.procedures,
            routes: self.routes,
        })
    }
}
