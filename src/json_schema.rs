//! Renders [`ZodSchema`] values as draft-07 JSON Schema, shaped the way
//! `zodToJsonSchema(schema, name)` shapes them.
//!
//! The body of a component lives under `definitions.<name>` and the document
//! root refers to it. A schema instance met a second time is written as a
//! `$ref` to the place it was first rendered.

use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::zod::{json_number, Checks, Constraint, Origin, UnknownKeys, ZodKind, ZodSchema};

const DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

/// The component stored under `name` in `components.schemas`
pub fn to_json_schema(name: &str, schema: &ZodSchema) -> Value {
    let root = vec!["#".to_string(), "definitions".to_string(), name.to_string()];
    let body = Converter::default()
        .convert(schema, &root, None)
        .unwrap_or_else(|| json!({}));

    let mut definitions = Map::new();
    definitions.insert(name.to_string(), body);
    json!({
        "$ref": root.join("/"),
        "definitions": definitions,
        "$schema": DRAFT_07,
    })
}

#[derive(Default)]
struct Converter {
    /// JSON pointer of the first rendering of each schema instance
    seen: HashMap<Origin, String>,
}

impl Converter {
    /// `None` for schemas with no JSON form (`z.void()`); object properties
    /// holding one are left out.
    fn convert(
        &mut self,
        schema: &ZodSchema,
        path: &[String],
        property: Option<&[String]>,
    ) -> Option<Value> {
        if let Some(origin) = schema.origin {
            if let Some(first) = self.seen.get(&origin) {
                return Some(json!({ "$ref": first }));
            }
            self.seen.insert(origin, path.join("/"));
        }

        let mut body = self.convert_kind(&schema.kind, path, property)?;
        if let (Some(description), Value::Object(map)) = (&schema.description, &mut body) {
            map.insert("description".to_string(), json!(description));
        }
        Some(body)
    }

    fn convert_kind(
        &mut self,
        kind: &ZodKind,
        path: &[String],
        property: Option<&[String]>,
    ) -> Option<Value> {
        let value = match kind {
            ZodKind::String(checks) => string_schema(checks),
            ZodKind::Number { integer, checks } => {
                let mut map = typed(if *integer { "integer" } else { "number" });
                insert_all(&mut map, &checks.keywords);
                Value::Object(map)
            }
            ZodKind::BigInt => json!({ "type": "integer", "format": "int64" }),
            ZodKind::Boolean => json!({ "type": "boolean" }),
            ZodKind::Date => json!({ "type": "string", "format": "date-time" }),
            ZodKind::Null => json!({ "type": "null" }),
            ZodKind::Undefined | ZodKind::Never => json!({ "not": {} }),
            ZodKind::Void => return None,
            ZodKind::Any | ZodKind::Unknown | ZodKind::Opaque => json!({}),
            ZodKind::Literal(value) => literal_schema(value),
            ZodKind::Enum(values) => enum_schema(values),
            ZodKind::Array { items, constraints } => {
                let mut map = typed("array");
                if !matches!(items.kind, ZodKind::Any) {
                    if let Some(items) = self.convert(items, &child(path, &["items"]), property) {
                        map.insert("items".to_string(), items);
                    }
                }
                insert_all(&mut map, constraints);
                Value::Object(map)
            }
            ZodKind::Set { items, constraints } => {
                let mut map = typed("array");
                map.insert("uniqueItems".to_string(), json!(true));
                if let Some(items) = self.convert(items, &child(path, &["items"]), property) {
                    map.insert("items".to_string(), items);
                }
                insert_all(&mut map, constraints);
                Value::Object(map)
            }
            ZodKind::Map(key, value) => {
                let key = self
                    .convert(key, &child(path, &["items", "items", "0"]), property)
                    .unwrap_or_else(|| json!({}));
                let value = self
                    .convert(value, &child(path, &["items", "items", "1"]), property)
                    .unwrap_or_else(|| json!({}));
                json!({
                    "type": "array",
                    "maxItems": 125,
                    "items": {
                        "type": "array",
                        "items": [key, value],
                        "minItems": 2,
                        "maxItems": 2,
                    },
                })
            }
            ZodKind::Object {
                shape,
                unknown_keys,
                catchall,
            } => self.object_schema(shape, *unknown_keys, catchall.as_deref(), path, property),
            ZodKind::Record(values) => {
                let additional = self
                    .convert(values, &child(path, &["additionalProperties"]), property)
                    .unwrap_or(Value::Bool(true));
                json!({ "type": "object", "additionalProperties": additional })
            }
            ZodKind::Tuple(items) => {
                let mut rendered = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    let index = index.to_string();
                    rendered.extend(self.convert(item, &child(path, &["items", index.as_str()]), property));
                }
                json!({
                    "type": "array",
                    "minItems": items.len(),
                    "maxItems": items.len(),
                    "items": rendered,
                })
            }
            ZodKind::Union(options) => return self.union_schema(options, path, property),
            ZodKind::Intersection(left, right) => {
                return self.intersection_schema(left, right, path, property)
            }
            ZodKind::Optional(inner) => {
                // Object properties mark absence through `required` instead
                if property == Some(path) {
                    return self.convert(inner, path, property);
                }
                match self.convert(inner, &child(path, &["anyOf", "1"]), property) {
                    Some(inner) => json!({ "anyOf": [{ "not": {} }, inner] }),
                    None => json!({}),
                }
            }
            ZodKind::Nullable(inner) => {
                if let Some(name) = primitive_type(inner) {
                    return Some(json!({ "type": [name, "null"] }));
                }
                let inner = self.convert(inner, &child(path, &["anyOf", "0"]), property)?;
                json!({ "anyOf": [inner, { "type": "null" }] })
            }
            ZodKind::Default { inner, value } => {
                let mut body = match self.convert(inner, path, property) {
                    Some(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                if let Some(value) = value {
                    body.insert("default".to_string(), value.clone());
                }
                Value::Object(body)
            }
            ZodKind::Wrapped(inner) => return self.convert(inner, path, property),
            ZodKind::Pipeline(input, output) => {
                let input = self.convert(input, &child(path, &["allOf", "0"]), property);
                let slot = if input.is_some() { "1" } else { "0" };
                let output = self.convert(output, &child(path, &["allOf", slot]), property);
                json!({ "allOf": input.into_iter().chain(output).collect::<Vec<_>>() })
            }
        };
        Some(value)
    }

    fn object_schema(
        &mut self,
        shape: &[(String, ZodSchema)],
        unknown_keys: UnknownKeys,
        catchall: Option<&ZodSchema>,
        path: &[String],
        property: Option<&[String]>,
    ) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (key, schema) in shape {
            let property_path = child(path, &["properties", key]);
            let Some(body) = self.convert(schema, &property_path, Some(property_path.as_slice())) else {
                continue;
            };
            properties.insert(key.clone(), body);
            if !schema.is_optional() {
                required.push(json!(key));
            }
        }

        let mut map = typed("object");
        map.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            map.insert("required".to_string(), Value::Array(required));
        }
        let additional = match catchall.filter(|schema| !matches!(schema.kind, ZodKind::Never)) {
            Some(schema) => self
                .convert(schema, &child(path, &["additionalProperties"]), property)
                .unwrap_or(Value::Bool(true)),
            None => Value::Bool(unknown_keys == UnknownKeys::Passthrough),
        };
        map.insert("additionalProperties".to_string(), additional);
        Value::Object(map)
    }

    fn union_schema(
        &mut self,
        options: &[ZodSchema],
        path: &[String],
        property: Option<&[String]>,
    ) -> Option<Value> {
        if let Some(types) = options.iter().map(primitive_type).collect::<Option<Vec<_>>>() {
            let mut map = Map::new();
            if let Some(types) = one_or_many(unique(types)) {
                map.insert("type".to_string(), types);
            }
            return Some(Value::Object(map));
        }

        let literals: Vec<&Value> = options
            .iter()
            .filter(|option| option.description.is_none())
            .filter_map(|option| match &option.kind {
                ZodKind::Literal(value) => Some(value),
                _ => None,
            })
            .collect();
        if literals.len() == options.len() {
            let types: Vec<&str> = literals.iter().filter_map(|v| literal_type(v)).collect();
            if types.len() == options.len() {
                let mut map = Map::new();
                if let Some(types) = one_or_many(unique(types)) {
                    map.insert("type".to_string(), types);
                }
                map.insert("enum".to_string(), json!(unique(literals)));
                return Some(Value::Object(map));
            }
        } else if options
            .iter()
            .all(|option| matches!(&option.kind, ZodKind::Enum(values) if values.iter().all(Value::is_string)))
        {
            let values = options
                .iter()
                .flat_map(|option| match &option.kind {
                    ZodKind::Enum(values) => values.clone(),
                    _ => Vec::new(),
                })
                .collect();
            return Some(json!({ "type": "string", "enum": unique(values) }));
        }

        let mut any_of = Vec::new();
        for (index, option) in options.iter().enumerate() {
            let index = index.to_string();
            any_of.extend(self.convert(option, &child(path, &["anyOf", index.as_str()]), property));
        }
        (!any_of.is_empty()).then(|| json!({ "anyOf": any_of }))
    }

    /// Nested `allOf` lists are flattened and `additionalProperties: false`
    /// is dropped from the parts.
    fn intersection_schema(
        &mut self,
        left: &ZodSchema,
        right: &ZodSchema,
        path: &[String],
        property: Option<&[String]>,
    ) -> Option<Value> {
        let parts = [
            self.convert(left, &child(path, &["allOf", "0"]), property),
            self.convert(right, &child(path, &["allOf", "1"]), property),
        ];

        let mut merged = Vec::new();
        for part in parts.into_iter().flatten() {
            let Value::Object(mut map) = part else {
                merged.push(part);
                continue;
            };
            if map.contains_key("allOf") && map.get("type") != Some(&json!("string")) {
                if let Some(Value::Array(nested)) = map.shift_remove("allOf") {
                    merged.extend(nested);
                }
                continue;
            }
            if map.get("additionalProperties") == Some(&Value::Bool(false)) {
                map.shift_remove("additionalProperties");
            }
            merged.push(Value::Object(map));
        }
        (!merged.is_empty()).then(|| json!({ "allOf": merged }))
    }
}

fn child(path: &[String], parts: &[&str]) -> Vec<String> {
    let mut extended = path.to_vec();
    extended.extend(parts.iter().map(|part| part.to_string()));
    extended
}

fn typed(name: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("type".to_string(), json!(name));
    map
}

fn insert_all(map: &mut Map<String, Value>, constraints: &[Constraint]) {
    for c in constraints {
        map.insert(c.keyword.to_string(), c.value.clone());
    }
}

/// Unrefined scalar schemas that unions and `.nullable()` fold into a `type` list
fn primitive_type(schema: &ZodSchema) -> Option<&'static str> {
    match &schema.kind {
        ZodKind::String(checks) if checks.count == 0 => Some("string"),
        ZodKind::Number {
            integer: false,
            checks,
        } if checks.count == 0 => Some("number"),
        ZodKind::BigInt => Some("integer"),
        ZodKind::Boolean => Some("boolean"),
        ZodKind::Null => Some("null"),
        _ => None,
    }
}

fn string_schema(checks: &Checks) -> Value {
    let mut map = typed("string");
    for c in &checks.keywords {
        match c.keyword {
            "minLength" => tighten(&mut map, "minLength", &c.value, f64::max),
            "maxLength" => tighten(&mut map, "maxLength", &c.value, f64::min),
            "format" => add_grouped(&mut map, "format", "anyOf", c.value.clone()),
            "pattern" => add_grouped(&mut map, "pattern", "allOf", c.value.clone()),
            keyword => {
                map.insert(keyword.to_string(), c.value.clone());
            }
        }
    }
    Value::Object(map)
}

/// Keep the stricter of an existing length bound and `value`
fn tighten(map: &mut Map<String, Value>, keyword: &str, value: &Value, pick: fn(f64, f64) -> f64) {
    let bound = match (map.get(keyword).and_then(Value::as_f64), value.as_f64()) {
        (Some(existing), Some(new)) => json_number(pick(existing, new)),
        _ => value.clone(),
    };
    map.insert(keyword.to_string(), bound);
}

/// A second `format` or `pattern` moves every occurrence into `anyOf`/`allOf`
fn add_grouped(map: &mut Map<String, Value>, keyword: &str, group: &str, value: Value) {
    let grouped = map
        .get(group)
        .and_then(Value::as_array)
        .is_some_and(|parts| parts.iter().any(|part| part.get(keyword).is_some()));
    if !map.contains_key(keyword) && !grouped {
        map.insert(keyword.to_string(), value);
        return;
    }

    if !map.contains_key(group) {
        map.insert(group.to_string(), json!([]));
    }
    let existing = map.shift_remove(keyword);
    if let Some(Value::Array(parts)) = map.get_mut(group) {
        for value in existing.into_iter().chain(Some(value)) {
            let mut part = Map::new();
            part.insert(keyword.to_string(), value);
            parts.push(Value::Object(part));
        }
    }
}

fn literal_type(value: &Value) -> Option<&'static str> {
    match value {
        Value::String(_) => Some("string"),
        Value::Number(_) => Some("number"),
        Value::Bool(_) => Some("boolean"),
        Value::Null => Some("null"),
        _ => None,
    }
}

fn literal_schema(value: &Value) -> Value {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            json!({ "type": literal_type(value), "const": value })
        }
        Value::Array(_) => json!({ "type": "array" }),
        _ => json!({ "type": "object" }),
    }
}

fn enum_schema(values: &[Value]) -> Value {
    let all_strings = values.iter().all(Value::is_string);
    let all_numbers = values.iter().all(Value::is_number);
    let kind = match (all_strings, all_numbers) {
        (true, _) => json!("string"),
        (_, true) => json!("number"),
        _ => json!(["string", "number"]),
    };
    json!({ "type": kind, "enum": values })
}

fn unique<T: PartialEq>(values: Vec<T>) -> Vec<T> {
    let mut kept = Vec::with_capacity(values.len());
    for value in values {
        if !kept.contains(&value) {
            kept.push(value);
        }
    }
    kept
}

/// A single type as a string, several as a list, none as nothing
fn one_or_many(types: Vec<&str>) -> Option<Value> {
    match types.as_slice() {
        [] => None,
        [single] => Some(json!(single)),
        _ => Some(json!(types)),
    }
}
