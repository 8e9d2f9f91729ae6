use serde_json::{Map, Value};

/// Keywords whose value is a map of name -> subschema.
const MAP_KEYWORDS: [&str; 5] = [
    "properties",
    "patternProperties",
    "dependentSchemas",
    "$defs",
    "definitions",
];

/// Keywords whose value is a single subschema.
const SINGLE_KEYWORDS: [&str; 11] = [
    "propertyNames",
    "additionalProperties",
    "unevaluatedProperties",
    "items",
    "contains",
    "additionalItems",
    "unevaluatedItems",
    "not",
    "if",
    "then",
    "else",
];

/// Keywords whose value is a list of subschemas.
const LIST_KEYWORDS: [&str; 4] = ["prefixItems", "allOf", "anyOf", "oneOf"];

/// Keywords that only make sense on object schemas.
const OBJECT_KEYWORDS: [&str; 8] = [
    "properties",
    "patternProperties",
    "additionalProperties",
    "unevaluatedProperties",
    "required",
    "dependentRequired",
    "dependentSchemas",
    "propertyNames",
];

/// Close every object schema in `schema` that leaves `additionalProperties` open.
pub fn close_object_schemas(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            if describes_object(map) && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            for_each_subschema(map, close_object_schemas);
        }
        Value::Array(items) => items.iter_mut().for_each(close_object_schemas),
        _ => {}
    }
}

fn for_each_subschema(map: &mut Map<String, Value>, visit: fn(&mut Value)) {
    for keyword in MAP_KEYWORDS {
        if let Some(Value::Object(children)) = map.get_mut(keyword) {
            children.values_mut().for_each(visit);
        }
    }
    for keyword in SINGLE_KEYWORDS {
        if let Some(child) = map.get_mut(keyword) {
            visit(child);
        }
    }
    for keyword in LIST_KEYWORDS {
        if let Some(Value::Array(children)) = map.get_mut(keyword) {
            children.iter_mut().for_each(visit);
        }
    }
}

fn describes_object(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "object"),
        _ => OBJECT_KEYWORDS.iter().any(|keyword| map.contains_key(*keyword)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn closes_typed_and_untyped_object_schemas() {
        let mut schema = json!({
            "type": "object",
            "properties": {
                "nested": { "properties": { "v": { "type": "integer" } } },
                "open": { "type": "object", "additionalProperties": true }
            }
        });
        close_object_schemas(&mut schema);

        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["properties"]["nested"]["additionalProperties"], false);
        assert_eq!(schema["properties"]["open"]["additionalProperties"], true);
    }

    #[test]
    fn walks_combinators_and_definitions() {
        let mut schema = json!({
            "anyOf": [{ "type": "object" }, { "type": "string" }],
            "$defs": { "thing": { "required": ["id"] } }
        });
        close_object_schemas(&mut schema);

        assert_eq!(schema["anyOf"][0]["additionalProperties"], false);
        assert!(schema["anyOf"][1].get("additionalProperties").is_none());
        assert_eq!(schema["$defs"]["thing"]["additionalProperties"], false);
    }

    #[test]
    fn leaves_scalar_schemas_alone() {
        let mut schema = json!({ "type": ["string", "null"] });
        close_object_schemas(&mut schema);
        assert!(schema.get("additionalProperties").is_none());
    }
}
