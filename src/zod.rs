//! A static model of zod schema definitions.
//!
//! Schema modules are never executed; their `z.*` expressions are evaluated
//! into [`ZodSchema`] values which are later rendered as JSON Schema.

use log::debug;
use serde_json::{json, Value as Json};

/// How an object schema treats keys missing from its shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownKeys {
    Strip,
    Strict,
    Passthrough,
}

/// A JSON Schema keyword contributed by a refinement such as `.min(1)`
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub keyword: &'static str,
    pub value: Json,
}

impl Constraint {
    fn new(keyword: &'static str, value: impl Into<Json>) -> Self {
        Self {
            keyword,
            value: value.into(),
        }
    }
}

/// Checks recorded on a string or number schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checks {
    /// Keywords in the order their checks were applied
    pub keywords: Vec<Constraint>,
    /// Checks applied, including those with no keyword (`.trim()`, `.finite()`)
    pub count: usize,
}

impl Checks {
    fn push(&mut self, keyword: &'static str, value: impl Into<Json>) {
        self.keywords.push(Constraint::new(keyword, value));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ZodKind {
    String(Checks),
    Number {
        integer: bool,
        checks: Checks,
    },
    BigInt,
    Boolean,
    Date,
    Null,
    Undefined,
    Void,
    Any,
    Unknown,
    Never,
    Literal(Json),
    Enum(Vec<Json>),
    Array {
        items: Box<ZodSchema>,
        constraints: Vec<Constraint>,
    },
    Set {
        items: Box<ZodSchema>,
        constraints: Vec<Constraint>,
    },
    Map(Box<ZodSchema>, Box<ZodSchema>),
    Object {
        shape: Vec<(String, ZodSchema)>,
        unknown_keys: UnknownKeys,
        catchall: Option<Box<ZodSchema>>,
    },
    Record(Box<ZodSchema>),
    Tuple(Vec<ZodSchema>),
    Union(Vec<ZodSchema>),
    Intersection(Box<ZodSchema>, Box<ZodSchema>),
    Optional(Box<ZodSchema>),
    Nullable(Box<ZodSchema>),
    Default {
        inner: Box<ZodSchema>,
        value: Option<Json>,
    },
    /// Effects, brands, catch and promise wrappers; rendered as the inner schema
    Wrapped(Box<ZodSchema>),
    Pipeline(Box<ZodSchema>, Box<ZodSchema>),
    /// Schemas without a JSON Schema counterpart (functions, lazy, custom, ...)
    Opaque,
}

/// The module and syntax node of the call that created a schema instance
pub type Origin = (usize, usize);

#[derive(Debug, Clone, PartialEq)]
pub struct ZodSchema {
    pub kind: ZodKind,
    pub description: Option<String>,
    /// Set for instances created by a call in a schema module. Two schemas
    /// with the same origin are the same instance.
    pub origin: Option<Origin>,
}

impl From<ZodKind> for ZodSchema {
    fn from(kind: ZodKind) -> Self {
        Self {
            kind,
            description: None,
            origin: None,
        }
    }
}

impl ZodKind {
    /// A new schema instance carrying `description` over from the schema it wraps
    fn described(self, description: Option<String>) -> ZodSchema {
        ZodSchema {
            kind: self,
            description,
            origin: None,
        }
    }
}

/// An evaluated argument passed to a factory or method
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Schema(ZodSchema),
    Json(Json),
    /// Object literal whose values may be schemas (shapes, masks)
    Shape(Vec<(String, Arg)>),
    /// Array literal whose elements may be schemas
    List(Vec<Arg>),
    Other,
}

impl Arg {
    fn schema(&self) -> Option<&ZodSchema> {
        match self {
            Arg::Schema(schema) => Some(schema),
            _ => None,
        }
    }

    /// Plain JSON value, if the argument contains no schemas
    pub fn to_json(&self) -> Option<Json> {
        match self {
            Arg::Json(value) => Some(value.clone()),
            Arg::Shape(fields) => {
                let mut map = serde_json::Map::new();
                for (key, value) in fields {
                    map.insert(key.clone(), value.to_json()?);
                }
                Some(Json::Object(map))
            }
            Arg::List(items) => items
                .iter()
                .map(Arg::to_json)
                .collect::<Option<Vec<_>>>()
                .map(Json::Array),
            Arg::Schema(_) | Arg::Other => None,
        }
    }

    fn schemas(&self) -> Vec<ZodSchema> {
        match self {
            Arg::List(items) => items.iter().filter_map(|a| a.schema().cloned()).collect(),
            _ => Vec::new(),
        }
    }

    fn shape(&self) -> Option<Vec<(String, ZodSchema)>> {
        match self {
            Arg::Shape(fields) => Some(
                fields
                    .iter()
                    .filter_map(|(key, value)| value.schema().map(|s| (key.clone(), s.clone())))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Keys set to a truthy value in a `{ key: true }` mask
    fn mask_keys(&self) -> Vec<String> {
        match self {
            Arg::Shape(fields) => fields
                .iter()
                .filter(|(_, value)| !matches!(value, Arg::Json(Json::Bool(false))))
                .map(|(key, _)| key.clone())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Arg::Json(Json::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Json(Json::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Build the schema produced by `z.<name>(args)`
pub fn construct(name: &str, args: &[Arg]) -> ZodSchema {
    let first = args.first();
    let kind = match name {
        "string" => ZodKind::String(Checks::default()),
        "number" => ZodKind::Number {
            integer: false,
            checks: Checks::default(),
        },
        "int" => ZodKind::Number {
            integer: true,
            checks: Checks::default(),
        },
        "bigint" => ZodKind::BigInt,
        "boolean" => ZodKind::Boolean,
        "date" => ZodKind::Date,
        "null" => ZodKind::Null,
        "undefined" => ZodKind::Undefined,
        "void" => ZodKind::Void,
        "any" => ZodKind::Any,
        "unknown" => ZodKind::Unknown,
        "never" => ZodKind::Never,
        "email" | "url" | "uuid" => {
            let mut checks = Checks::default();
            string_check(&mut checks, name, &[]);
            ZodKind::String(checks)
        }
        "literal" => match first.and_then(Arg::to_json) {
            Some(value) => ZodKind::Literal(value),
            None => ZodKind::Opaque,
        },
        "enum" => match first.and_then(Arg::to_json) {
            Some(Json::Array(values)) => ZodKind::Enum(values),
            _ => ZodKind::Opaque,
        },
        "nativeEnum" => match first.and_then(Arg::to_json) {
            Some(Json::Object(map)) => ZodKind::Enum(map.into_iter().map(|(_, v)| v).collect()),
            _ => ZodKind::Opaque,
        },
        "array" => match first.and_then(Arg::schema) {
            Some(items) => ZodKind::Array {
                items: Box::new(items.clone()),
                constraints: Vec::new(),
            },
            None => ZodKind::Opaque,
        },
        "object" | "strictObject" | "looseObject" => ZodKind::Object {
            shape: first.and_then(Arg::shape).unwrap_or_default(),
            unknown_keys: match name {
                "strictObject" => UnknownKeys::Strict,
                "looseObject" => UnknownKeys::Passthrough,
                _ => UnknownKeys::Strip,
            },
            catchall: None,
        },
        "record" => match args.last().and_then(Arg::schema) {
            Some(values) => ZodKind::Record(Box::new(values.clone())),
            None => ZodKind::Opaque,
        },
        "set" => match first.and_then(Arg::schema) {
            Some(items) => ZodKind::Set {
                items: Box::new(items.clone()),
                constraints: Vec::new(),
            },
            None => ZodKind::Opaque,
        },
        "map" => match (first.and_then(Arg::schema), args.get(1).and_then(Arg::schema)) {
            (Some(key), Some(value)) => {
                ZodKind::Map(Box::new(key.clone()), Box::new(value.clone()))
            }
            _ => ZodKind::Opaque,
        },
        "tuple" => ZodKind::Tuple(first.map(Arg::schemas).unwrap_or_default()),
        "union" => ZodKind::Union(first.map(Arg::schemas).unwrap_or_default()),
        "discriminatedUnion" => ZodKind::Union(args.get(1).map(Arg::schemas).unwrap_or_default()),
        "intersection" => match (first.and_then(Arg::schema), args.get(1).and_then(Arg::schema)) {
            (Some(left), Some(right)) => {
                ZodKind::Intersection(Box::new(left.clone()), Box::new(right.clone()))
            }
            _ => ZodKind::Opaque,
        },
        "optional" => match first.and_then(Arg::schema) {
            Some(inner) => ZodKind::Optional(Box::new(inner.clone())),
            None => ZodKind::Opaque,
        },
        "nullable" => match first.and_then(Arg::schema) {
            Some(inner) => ZodKind::Nullable(Box::new(inner.clone())),
            None => ZodKind::Opaque,
        },
        "promise" | "preprocess" => {
            let inner = match name {
                "preprocess" => args.get(1),
                _ => first,
            };
            match inner.and_then(Arg::schema) {
                Some(inner) => ZodKind::Wrapped(Box::new(inner.clone())),
                None => ZodKind::Opaque,
            }
        }
        other => {
            debug!("z.{}() has no JSON Schema form", other);
            ZodKind::Opaque
        }
    };
    kind.into()
}

impl ZodSchema {
    /// Whether an object property with this schema may be absent
    pub fn is_optional(&self) -> bool {
        match &self.kind {
            ZodKind::Optional(_)
            | ZodKind::Default { .. }
            | ZodKind::Any
            | ZodKind::Unknown
            | ZodKind::Undefined
            | ZodKind::Void => true,
            ZodKind::Nullable(inner) | ZodKind::Wrapped(inner) => inner.is_optional(),
            ZodKind::Pipeline(input, output) => input.is_optional() && output.is_optional(),
            ZodKind::Union(options) => options.iter().any(ZodSchema::is_optional),
            _ => false,
        }
    }

    /// Apply a chained method call such as `.min(1)` or `.optional()`.
    ///
    /// The result is a new instance without an origin, except where zod hands
    /// back an existing instance (`.element`, `.unwrap()`).
    pub fn apply(self, method: &str, args: &[Arg]) -> ZodSchema {
        let first = args.first();
        let description = self.description.clone();
        match method {
            "optional" => ZodKind::Optional(Box::new(self)).described(description),
            "nullable" => ZodKind::Nullable(Box::new(self)).described(description),
            "nullish" => {
                let nullable = ZodKind::Nullable(Box::new(self)).described(description.clone());
                ZodKind::Optional(Box::new(nullable)).described(description)
            }
            "default" | "prefault" => ZodKind::Default {
                inner: Box::new(self),
                value: first.and_then(Arg::to_json),
            }
            .described(description),
            "describe" => ZodSchema {
                description: first.and_then(Arg::as_str).map(str::to_string),
                origin: None,
                ..self
            },
            "array" => ZodKind::Array {
                items: Box::new(self),
                constraints: Vec::new(),
            }
            .into(),
            "or" => match first.and_then(Arg::schema) {
                Some(other) => ZodKind::Union(vec![self, other.clone()]).described(description),
                None => self,
            },
            "and" => match first.and_then(Arg::schema) {
                Some(other) => ZodKind::Intersection(Box::new(self), Box::new(other.clone()))
                    .described(description),
                None => self,
            },
            "transform" | "brand" | "catch" => ZodKind::Wrapped(Box::new(self)).described(description),
            "refine" | "superRefine" | "readonly" => ZodKind::Wrapped(Box::new(self)).into(),
            "pipe" => match first.and_then(Arg::schema) {
                Some(output) => ZodKind::Pipeline(Box::new(self), Box::new(output.clone())).into(),
                None => self,
            },
            "unwrap" | "removeDefault" | "innerType" => match self.kind {
                ZodKind::Optional(inner)
                | ZodKind::Nullable(inner)
                | ZodKind::Default { inner, .. }
                | ZodKind::Wrapped(inner) => *inner,
                kind => ZodSchema { kind, ..self },
            },
            _ => self.refine(method, args),
        }
    }

    /// Kind-specific refinements; anything unrecognised leaves the schema as is
    fn refine(self, method: &str, args: &[Arg]) -> ZodSchema {
        let ZodSchema {
            kind, description, ..
        } = self;
        let kind = match kind {
            ZodKind::String(mut checks) => {
                string_check(&mut checks, method, args);
                ZodKind::String(checks)
            }
            ZodKind::Number {
                mut integer,
                mut checks,
            } => {
                number_check(&mut checks, &mut integer, method, args);
                ZodKind::Number { integer, checks }
            }
            ZodKind::Array {
                items,
                mut constraints,
            } => {
                if method == "element" {
                    return *items;
                }
                size_check(&mut constraints, method, args);
                ZodKind::Array { items, constraints }
            }
            ZodKind::Set {
                items,
                mut constraints,
            } => {
                size_check(&mut constraints, method, args);
                ZodKind::Set { items, constraints }
            }
            ZodKind::Object {
                shape,
                unknown_keys,
                catchall,
            } => return object_method(shape, unknown_keys, catchall, description, method, args),
            other => {
                debug!("Treating .{}() as a no-op", method);
                other
            }
        };
        kind.described(description)
    }

    /// The property schemas of an object schema
    pub fn shape(&self) -> Option<&[(String, ZodSchema)]> {
        match &self.kind {
            ZodKind::Object { shape, .. } => Some(shape),
            _ => None,
        }
    }

    fn unwrap_optional(self) -> ZodSchema {
        match self.kind {
            ZodKind::Optional(inner) => (*inner).unwrap_optional(),
            kind => ZodSchema { kind, ..self },
        }
    }
}

/// Literal characters zod-to-json-schema leaves unescaped in generated patterns
const UNESCAPED: &str = "ABCDEFGHIJKLMNOPQRSTUVXYZabcdefghijklmnopqrstuvxyz0123456789";

fn escape_literal(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if !UNESCAPED.contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn string_check(checks: &mut Checks, method: &str, args: &[Arg]) {
    let first = args.first();
    let number = first.and_then(Arg::as_f64).map(json_number);
    let text = first.and_then(Arg::as_str);
    match method {
        "min" => checks.keywords.extend(number.map(|n| Constraint::new("minLength", n))),
        "max" => checks.keywords.extend(number.map(|n| Constraint::new("maxLength", n))),
        "length" => {
            if let Some(n) = number {
                checks.push("minLength", n.clone());
                checks.push("maxLength", n);
            }
        }
        "nonempty" => checks.push("minLength", 1),
        "email" => checks.push("format", "email"),
        "url" => checks.push("format", "uri"),
        "uuid" => checks.push("format", "uuid"),
        "datetime" => checks.push("format", "date-time"),
        "date" => checks.push("format", "date"),
        "time" => checks.push("format", "time"),
        "duration" => checks.push("format", "duration"),
        "ip" => {
            let version = first
                .and_then(Arg::to_json)
                .and_then(|options| options.get("version").and_then(Json::as_str).map(str::to_string));
            if version.as_deref() != Some("v6") {
                checks.push("format", "ipv4");
            }
            if version.as_deref() != Some("v4") {
                checks.push("format", "ipv6");
            }
        }
        "base64" => checks.push("contentEncoding", "base64"),
        "cuid" => checks.push("pattern", "^[cC][^\\s-]{8,}$"),
        "cuid2" => checks.push("pattern", "^[0-9a-z]+$"),
        "ulid" => checks.push("pattern", "^[0-9A-HJKMNP-TV-Z]{26}$"),
        "nanoid" => checks.push("pattern", "^[a-zA-Z0-9_-]{21}$"),
        "emoji" => checks.push(
            "pattern",
            "^(\\p{Extended_Pictographic}|\\p{Emoji_Component})+$",
        ),
        "regex" => checks.keywords.extend(text.map(|source| Constraint::new("pattern", source))),
        "startsWith" => checks.keywords.extend(
            text.map(|prefix| Constraint::new("pattern", format!("^{}", escape_literal(prefix)))),
        ),
        "endsWith" => checks.keywords.extend(
            text.map(|suffix| Constraint::new("pattern", format!("{}$", escape_literal(suffix)))),
        ),
        "includes" => checks
            .keywords
            .extend(text.map(|part| Constraint::new("pattern", escape_literal(part)))),
        "trim" | "toLowerCase" | "toUpperCase" => {}
        _ => {
            debug!("Treating string .{}() as a no-op", method);
            return;
        }
    }
    checks.count += 1;
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn number_check(checks: &mut Checks, integer: &mut bool, method: &str, args: &[Arg]) {
    let number = args.first().and_then(Arg::as_f64).map(json_number);
    match (method, number) {
        ("int", _) => *integer = true,
        ("min" | "gte", Some(n)) => checks.push("minimum", n),
        ("max" | "lte", Some(n)) => checks.push("maximum", n),
        ("gt", Some(n)) => checks.push("exclusiveMinimum", n),
        ("lt", Some(n)) => checks.push("exclusiveMaximum", n),
        ("positive", _) => checks.push("exclusiveMinimum", 0),
        ("negative", _) => checks.push("exclusiveMaximum", 0),
        ("nonnegative", _) => checks.push("minimum", 0),
        ("nonpositive", _) => checks.push("maximum", 0),
        ("multipleOf" | "step", Some(n)) => checks.push("multipleOf", n),
        ("safe", _) => {
            checks.push("minimum", json_number(-MAX_SAFE_INTEGER));
            checks.push("maximum", json_number(MAX_SAFE_INTEGER));
        }
        ("finite", _) => {}
        _ => {
            debug!("Treating number .{}() as a no-op", method);
            return;
        }
    }
    checks.count += 1;
}

/// `.min()`, `.max()`, `.length()` and friends on arrays and sets
fn size_check(constraints: &mut Vec<Constraint>, method: &str, args: &[Arg]) {
    let number = args.first().and_then(Arg::as_f64).map(json_number);
    match (method, number) {
        ("min", Some(n)) => constraints.push(Constraint::new("minItems", n)),
        ("max", Some(n)) => constraints.push(Constraint::new("maxItems", n)),
        ("length" | "size", Some(n)) => {
            constraints.push(Constraint::new("minItems", n.clone()));
            constraints.push(Constraint::new("maxItems", n));
        }
        ("nonempty", _) => constraints.push(Constraint::new("minItems", 1)),
        _ => debug!("Treating .{}() as a no-op", method),
    }
}

fn object_method(
    mut shape: Vec<(String, ZodSchema)>,
    mut unknown_keys: UnknownKeys,
    mut catchall: Option<Box<ZodSchema>>,
    mut description: Option<String>,
    method: &str,
    args: &[Arg],
) -> ZodSchema {
    let first = args.first();
    match method {
        "passthrough" => unknown_keys = UnknownKeys::Passthrough,
        "strict" => unknown_keys = UnknownKeys::Strict,
        "strip" => unknown_keys = UnknownKeys::Strip,
        "catchall" => catchall = first.and_then(Arg::schema).cloned().map(Box::new),
        "extend" | "safeExtend" => {
            for (key, schema) in first.and_then(Arg::shape).unwrap_or_default() {
                upsert(&mut shape, key, schema);
            }
        }
        "merge" => {
            if let Some(ZodSchema {
                kind:
                    ZodKind::Object {
                        shape: other,
                        unknown_keys: other_keys,
                        catchall: other_catchall,
                    },
                ..
            }) = first.and_then(Arg::schema).cloned()
            {
                for (key, schema) in other {
                    upsert(&mut shape, key, schema);
                }
                unknown_keys = other_keys;
                catchall = other_catchall;
                description = None;
            }
        }
        "partial" | "required" => {
            let mask = first.map(Arg::mask_keys);
            shape = shape
                .into_iter()
                .map(|(key, schema)| {
                    let selected = mask.as_ref().map_or(true, |keys| keys.contains(&key));
                    let schema = match (selected, method) {
                        (false, _) => schema,
                        (true, "partial") => schema.apply("optional", &[]),
                        (true, _) => schema.unwrap_optional(),
                    };
                    (key, schema)
                })
                .collect();
        }
        "pick" | "omit" => {
            let keys = first.map(Arg::mask_keys).unwrap_or_default();
            let keep = method == "pick";
            shape.retain(|(key, _)| keys.contains(key) == keep);
        }
        "keyof" => {
            return ZodKind::Enum(shape.into_iter().map(|(key, _)| Json::String(key)).collect())
                .into();
        }
        "deepPartial" => {
            shape = shape
                .into_iter()
                .map(|(key, schema)| (key, schema.apply("optional", &[])))
                .collect();
        }
        _ => debug!("Treating object .{}() as a no-op", method),
    }
    ZodKind::Object {
        shape,
        unknown_keys,
        catchall,
    }
    .described(description)
}

fn upsert(shape: &mut Vec<(String, ZodSchema)>, key: String, schema: ZodSchema) {
    match shape.iter_mut().find(|(existing, _)| *existing == key) {
        Some(entry) => entry.1 = schema,
        None => shape.push((key, schema)),
    }
}

/// Integral values render without a fraction, like JavaScript numbers do
pub fn json_number(n: f64) -> Json {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        json!(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Json::Null, Json::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn string() -> ZodSchema {
        construct("string", &[])
    }

    #[test]
    fn test_string_refinements_accumulate() {
        let schema = string()
            .apply("min", &[Arg::Json(json!(1))])
            .apply("email", &[])
            .apply("trim", &[])
            .apply("startsWith", &[Arg::Json(json!("ord-w"))]);
        assert_eq!(
            schema.kind,
            ZodKind::String(Checks {
                keywords: vec![
                    Constraint::new("minLength", 1),
                    Constraint::new("format", "email"),
                    Constraint::new("pattern", "^ord\\-\\w"),
                ],
                count: 4,
            })
        );
    }

    #[test]
    fn test_optionality() {
        assert!(string().apply("optional", &[]).is_optional());
        assert!(string().apply("default", &[Arg::Json(json!("x"))]).is_optional());
        assert!(string().apply("nullish", &[]).is_optional());
        assert!(construct("any", &[]).is_optional());
        assert!(construct("void", &[]).is_optional());
        assert!(!string().apply("nullable", &[]).is_optional());
        assert!(!string().apply("refine", &[Arg::Other]).is_optional());
        assert!(!string().is_optional());
    }

    #[test]
    fn test_wrappers_keep_description_and_drop_origin() {
        let described = ZodSchema {
            origin: Some((0, 7)),
            ..string().apply("describe", &[Arg::Json(json!("Name"))])
        };
        let optional = described.clone().apply("optional", &[]);
        assert_eq!(optional.description.as_deref(), Some("Name"));
        assert_eq!(optional.origin, None);
        assert!(matches!(optional.kind, ZodKind::Optional(ref inner) if inner.origin == Some((0, 7))));

        let items = described.clone().apply("array", &[]);
        assert_eq!(items.description, None);
        assert_eq!(items.apply("element", &[]).origin, Some((0, 7)));
        assert_eq!(described.apply("refine", &[Arg::Other]).description, None);
    }

    #[test]
    fn test_object_composition() {
        let base = construct(
            "object",
            &[Arg::Shape(vec![
                ("id".to_string(), Arg::Schema(string())),
                ("name".to_string(), Arg::Schema(string().apply("optional", &[]))),
            ])],
        );
        let extended = base.clone().apply(
            "extend",
            &[Arg::Shape(vec![("email".to_string(), Arg::Schema(string()))])],
        );
        let keys: Vec<&str> = extended.shape().unwrap().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["id", "name", "email"]);

        let picked = extended.clone().apply(
            "pick",
            &[Arg::Shape(vec![("email".to_string(), Arg::Json(json!(true)))])],
        );
        assert_eq!(picked.shape().unwrap().len(), 1);

        let required = extended.apply("required", &[]);
        assert!(required.shape().unwrap().iter().all(|(_, s)| !s.is_optional()));

        let partial = base.apply("partial", &[]);
        assert!(partial.shape().unwrap().iter().all(|(_, s)| s.is_optional()));
    }

    #[test]
    fn test_number_checks() {
        let schema = construct("number", &[])
            .apply("int", &[])
            .apply("positive", &[])
            .apply("max", &[Arg::Json(json!(10))])
            .apply("finite", &[]);
        assert_eq!(
            schema.kind,
            ZodKind::Number {
                integer: true,
                checks: Checks {
                    keywords: vec![
                        Constraint::new("exclusiveMinimum", 0),
                        Constraint::new("maximum", 10),
                    ],
                    count: 4,
                },
            }
        );
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("a.b"), "a\\.b");
        assert_eq!(escape_literal("Wow"), "\\Wo\\w");
    }

    #[test]
    fn test_unknown_constructors_are_opaque() {
        assert_eq!(construct("lazy", &[Arg::Other]).kind, ZodKind::Opaque);
        assert_eq!(construct("enum", &[Arg::Other]).kind, ZodKind::Opaque);
    }

    #[test]
    fn test_json_number() {
        assert_eq!(json_number(3.0), json!(3));
        assert_eq!(json_number(0.5), json!(0.5));
        assert_eq!(json_number(-2.0), json!(-2));
    }
}
