use rpcprims_types::{Result, RpcError};
use serde_json::{Map, Value};

/// Deepest chain of nested `$ref`s followed before giving up.
pub const MAX_REF_DEPTH: usize = 32;

/// Most JSON nodes one inlined schema may expand to.
///
/// Shared references are copied per use, so a small document can describe
/// an exponentially large schema; this bounds the copy.
pub const MAX_INLINED_NODES: usize = 100_000;

/// Resolves local (`#/...`) references against one descriptor document.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RefResolver<'a> {
    root: &'a Value,
}

struct Inlining {
    stack: Vec<String>,
    nodes: usize,
}

impl<'a> RefResolver<'a> {
    pub(crate) fn new(root: &'a Value) -> Self {
        Self { root }
    }

    /// Follow a top-level `$ref` chain (parameters, responses, request bodies).
    pub(crate) fn follow<'v>(&self, value: &'v Value) -> Result<&'v Value>
    where
        'a: 'v,
    {
        let mut current = value;
        let mut seen: Vec<&str> = Vec::new();
        while let Some(reference) = ref_target(current) {
            if seen.contains(&reference) || seen.len() >= MAX_REF_DEPTH {
                return Err(RpcError::bad_specification(format!(
                    "$ref chain through {reference} does not terminate"
                )));
            }
            seen.push(reference);
            current = self.lookup(reference)?;
        }
        Ok(current)
    }

    /// Copy `schema` with every local `$ref` replaced by its target.
    ///
    /// Recursive schemas cannot be inlined and are rejected, as are schemas
    /// that expand past [`MAX_INLINED_NODES`].
    pub(crate) fn inline(&self, schema: &Value) -> Result<Value> {
        let mut state = Inlining {
            stack: Vec::new(),
            nodes: 0,
        };
        self.inline_inner(schema, &mut state)
    }

    fn inline_inner(&self, value: &Value, state: &mut Inlining) -> Result<Value> {
        state.nodes += 1;
        if state.nodes > MAX_INLINED_NODES {
            return Err(RpcError::bad_specification(format!(
                "schema expands to more than {MAX_INLINED_NODES} nodes once references are inlined"
            )));
        }

        match value {
            Value::Object(map) => {
                if let Some(reference) = ref_target(value) {
                    if state.stack.iter().any(|open| open == reference) {
                        return Err(RpcError::bad_specification(format!(
                            "recursive schema reference {reference} cannot be inlined"
                        )));
                    }
                    if state.stack.len() >= MAX_REF_DEPTH {
                        return Err(RpcError::bad_specification(format!(
                            "schema references nest deeper than {MAX_REF_DEPTH} at {reference}"
                        )));
                    }
                    let target = self.lookup(reference)?;
                    state.stack.push(reference.to_string());
                    let inlined = self.inline_inner(target, state);
                    state.stack.pop();
                    return inlined;
                }

                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    out.insert(key.clone(), self.inline_inner(child, state)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.inline_inner(item, state))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn lookup(&self, reference: &str) -> Result<&'a Value> {
        let pointer = reference.strip_prefix('#').ok_or_else(|| {
            RpcError::bad_specification(format!(
                "only local references are supported, got {reference}"
            ))
        })?;
        self.root.pointer(pointer).ok_or_else(|| {
            RpcError::bad_specification(format!("unresolved reference {reference}"))
        })
    }
}

fn ref_target(value: &Value) -> Option<&str> {
    value.get("$ref").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use rpcprims_types::ErrorKind;
    use serde_json::json;

    use super::*;

    #[test]
    fn inlines_nested_references() {
        let root = json!({
            "components": { "schemas": {
                "Id": { "type": "integer" },
                "Widget": {
                    "type": "object",
                    "properties": { "id": { "$ref": "#/components/schemas/Id" } }
                }
            }}
        });
        let resolver = RefResolver::new(&root);
        let inlined = resolver
            .inline(&json!({ "$ref": "#/components/schemas/Widget" }))
            .expect("inline should succeed");
        assert_eq!(inlined["properties"]["id"], json!({ "type": "integer" }));
    }

    #[test]
    fn shared_reference_used_twice_is_not_a_cycle() {
        let root = json!({ "definitions": { "Name": { "type": "string" } } });
        let schema = json!({
            "type": "object",
            "properties": {
                "first": { "$ref": "#/definitions/Name" },
                "last": { "$ref": "#/definitions/Name" }
            }
        });
        let inlined = RefResolver::new(&root).inline(&schema).expect("inline should succeed");
        assert_eq!(inlined["properties"]["last"]["type"], "string");
    }

    #[test]
    fn recursive_schema_is_rejected() {
        let root = json!({ "definitions": { "Node": {
            "type": "object",
            "properties": { "next": { "$ref": "#/definitions/Node" } }
        }}});
        let err = RefResolver::new(&root)
            .inline(&json!({ "$ref": "#/definitions/Node" }))
            .expect_err("inline should fail");
        assert_eq!(err.kind(), ErrorKind::BadSpecification);
    }

    #[test]
    fn doubling_reference_chain_is_cut_off() {
        let mut schemas = Map::new();
        for level in 0..30 {
            let next = json!({ "$ref": format!("#/definitions/S{}", level + 1) });
            schemas.insert(format!("S{level}"), json!({ "allOf": [next.clone(), next] }));
        }
        schemas.insert("S30".to_string(), json!({ "type": "string" }));
        let root = json!({ "definitions": schemas });

        let started = std::time::Instant::now();
        let err = RefResolver::new(&root)
            .inline(&json!({ "$ref": "#/definitions/S0" }))
            .expect_err("expansion should be capped");
        assert_eq!(err.kind(), ErrorKind::BadSpecification);
        assert!(err.to_string().contains("nodes"), "{err}");
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn shallow_doubling_chain_still_inlines() {
        let root = json!({ "definitions": {
            "A": { "allOf": [{ "$ref": "#/definitions/B" }, { "$ref": "#/definitions/B" }] },
            "B": { "type": "integer" }
        }});
        let inlined = RefResolver::new(&root)
            .inline(&json!({ "$ref": "#/definitions/A" }))
            .expect("small expansion inlines");
        assert_eq!(inlined["allOf"][1], json!({ "type": "integer" }));
    }

    #[test]
    fn follow_detects_loops_and_missing_targets() {
        let root = json!({ "components": { "parameters": {
            "A": { "$ref": "#/components/parameters/B" },
            "B": { "$ref": "#/components/parameters/A" },
            "Id": { "name": "id", "in": "path" }
        }}});
        let resolver = RefResolver::new(&root);

        let looped = json!({ "$ref": "#/components/parameters/A" });
        assert_eq!(
            resolver.follow(&looped).expect_err("follow should fail").kind(),
            ErrorKind::BadSpecification
        );

        let missing = json!({ "$ref": "#/components/parameters/Nope" });
        assert_eq!(
            resolver.follow(&missing).expect_err("follow should fail").kind(),
            ErrorKind::BadSpecification
        );

        let remote = json!({ "$ref": "other.json#/Id" });
        assert_eq!(
            resolver.follow(&remote).expect_err("follow should fail").kind(),
            ErrorKind::BadSpecification
        );

        let direct = json!({ "$ref": "#/components/parameters/Id" });
        assert_eq!(resolver.follow(&direct).expect("follow should succeed")["name"], "id");
    }
}
