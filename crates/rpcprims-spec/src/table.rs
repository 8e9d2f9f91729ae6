use rpcprims_types::{split_path, Method, PathTemplate, Result, RouteKey, RpcError, Segment};
use serde_json::json;

/// One route key bound to a procedure name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub key: RouteKey,
    pub procedure: String,
}

/// Result of resolving a request against a [`RoutingTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub key: RouteKey,
    pub procedure: String,
    /// Decoded path parameters, in template order.
    pub params: Vec<(String, String)>,
}

/// Route key -> procedure name mapping with specificity-ordered matching.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. Keys that differ only in parameter names collide.
    pub fn insert(&mut self, key: RouteKey, procedure: impl Into<String>) -> Result<()> {
        let procedure = procedure.into();
        let collision = self.entries.iter().find(|entry| {
            entry.key.method == key.method && same_shape(&entry.key.template, &key.template)
        });
        if let Some(existing) = collision {
            return Err(RpcError::procedure_conflict(format!(
                "route {key} for {procedure} collides with {} for {}",
                existing.key, existing.procedure
            ))
            .with_context(json!({ "route": key.to_string() })));
        }

        let position = self
            .entries
            .binary_search_by(|entry| entry.key.cmp(&key))
            .unwrap_or_else(|insert_at| insert_at);
        self.entries.insert(position, RouteEntry { key, procedure });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in route key order.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Procedure bound to exactly this key.
    pub fn get(&self, key: &RouteKey) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| &entry.key == key)
            .map(|entry| entry.procedure.as_str())
    }

    /// Match a concrete request path.
    ///
    /// Among templates whose path matches and whose verb is `method`, the
    /// most specific wins: a literal beats a parameter at the first
    /// position where they differ, then fewer parameters wins. A path that
    /// matches only under other verbs is `MethodNotAllowed`.
    pub fn resolve(&self, method: Method, path: &str) -> Result<RouteMatch> {
        let segments = split_path(path);
        let candidates: Vec<(&RouteEntry, Vec<(String, String)>)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                entry
                    .key
                    .template
                    .match_segments(&segments)
                    .map(|params| (entry, params))
            })
            .collect();

        if candidates.is_empty() {
            return Err(RpcError::not_found(format!("no route for {method} {path}"))
                .with_context(json!({ "method": method, "path": path })));
        }

        let best = candidates
            .iter()
            .filter(|(entry, _)| entry.key.method == method)
            .min_by_key(|(entry, _)| entry.key.template.specificity());

        match best {
            Some((entry, params)) => Ok(RouteMatch {
                key: entry.key.clone(),
                procedure: entry.procedure.clone(),
                params: params.clone(),
            }),
            None => {
                let mut allowed: Vec<Method> =
                    candidates.iter().map(|(entry, _)| entry.key.method).collect();
                allowed.sort_unstable();
                allowed.dedup();
                Err(RpcError::method_not_allowed(format!(
                    "{method} is not allowed on {path}"
                ))
                .with_context(json!({ "method": method, "path": path, "allowed": allowed })))
            }
        }
    }
}

fn same_shape(a: &PathTemplate, b: &PathTemplate) -> bool {
    a.segments().len() == b.segments().len()
        && a.segments().iter().zip(b.segments()).all(|pair| match pair {
            (Segment::Literal(x), Segment::Literal(y)) => x == y,
            (Segment::Param(_), Segment::Param(_)) => true,
            _ => false,
        })
}
