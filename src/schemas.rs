//! Builds `components.schemas` from the zod schema modules.
//!
//! Schema modules are copied into a scratch directory below the output
//! directory (extension-less relative specifiers gain `.js`), linked from
//! there and evaluated statically. A file that fails to load is skipped.

use anyhow::{Context, Result};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Map;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tree_sitter::Node;

use crate::config::GeneratorConfig;
use crate::json_schema::to_json_schema;
use crate::modules::{Export, ModuleGraph, ModuleId, ModuleRef};
use crate::parser::{
    cook_escape, named_children, string_value, unwrap_parens, ParserError, SourceFile,
};
use crate::scanner::list_source_files;
use crate::scope::{lookup, Binding};
use crate::zod::{self, json_number, Arg, ZodSchema};

static RELATIVE_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(from\s+['"])(\.[^'"]*)(['"])"#).unwrap());

const ZOD_MODULE: &str = "zod";

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParserError),

    #[error("Cannot find module '{specifier}' imported from {}", .importer.display())]
    ModuleNotFound { specifier: String, importer: PathBuf },

    #[error("Module `{}` failed to link: {reason}", .path.display())]
    Link { path: PathBuf, reason: String },

    #[error("The requested module `{}` does not provide an export named '{name}'", .path.display())]
    MissingExport { path: PathBuf, name: String },

    #[error("Cannot access '{name}' before initialization in `{}`", .path.display())]
    Cycle { path: PathBuf, name: String },
}

/// Loads every schema module and converts its exported zod schemas
pub struct SchemaLoader<'c> {
    config: &'c GeneratorConfig,
}

impl<'c> SchemaLoader<'c> {
    pub fn new(config: &'c GeneratorConfig) -> Self {
        Self { config }
    }

    /// Schema components by export name, in file order then export name
    /// order. The first file to export a name wins.
    pub fn load(&self) -> Result<Map<String, serde_json::Value>> {
        let config = self.config;
        let files = list_source_files(&config.schemas_dir, &config.source_extension)?;

        // Stage every module, the index included, in a scratch directory
        fs::create_dir_all(&config.output_dir).context(format!(
            "Failed to create output directory: {:?}",
            config.output_dir
        ))?;
        let scratch = tempfile::Builder::new()
            .prefix("schemas-tmp-")
            .tempdir_in(&config.output_dir)
            .context("Failed to create scratch directory for schema modules")?;

        for file in &files {
            copy_with_extensions(&config.schemas_dir.join(file), &scratch.path().join(file))?;
        }

        // Convert the exports of each module other than the index
        let mut graph = ModuleGraph::new();
        let mut schemas = Map::new();
        for file in files.iter().filter(|file| **file != config.schemas_index) {
            match load_schema_file(&mut graph, &scratch.path().join(file)) {
                Ok(exports) => {
                    debug!("{} exports {} schemas", file, exports.len());
                    for (name, schema) in exports {
                        if schemas.contains_key(&name) {
                            debug!("Schema {} from {} is already defined", name, file);
                            continue;
                        }
                        let component = to_json_schema(&name, &schema);
                        schemas.insert(name, component);
                    }
                }
                Err(err) => warn!(
                    "Skipping schema file {} due to import error: {}",
                    file, err
                ),
            }
        }

        // Remove the scratch copies
        if let Err(err) = scratch.close() {
            debug!("Failed to remove schema scratch directory: {}", err);
        }
        Ok(schemas)
    }
}

fn copy_with_extensions(source: &Path, destination: &Path) -> Result<()> {
    let content =
        fs::read_to_string(source).context(format!("Failed to read file: {:?}", source))?;
    let rewritten = append_js_extensions(&content);
    fs::write(destination, rewritten.as_bytes())
        .context(format!("Failed to write file: {:?}", destination))?;
    Ok(())
}

/// `from './utils'` becomes `from './utils.js'`; specifiers with an extension are kept
pub fn append_js_extensions(content: &str) -> String {
    RELATIVE_FROM
        .replace_all(content, |caps: &Captures| {
            let specifier = &caps[2];
            if Path::new(specifier).extension().is_some() {
                caps[0].to_string()
            } else {
                format!("{}{}.js{}", &caps[1], specifier, &caps[3])
            }
        })
        .into_owned()
}

fn load_schema_file(
    graph: &mut ModuleGraph,
    path: &Path,
) -> Result<Vec<(String, ZodSchema)>, SchemaError> {
    let id = graph.load(path)?;
    graph.resolve_imports(id)?;
    Evaluator::new(graph).schema_exports(id)
}

/// A statically evaluated JavaScript value
#[derive(Debug, Clone)]
enum Value {
    Schema(ZodSchema),
    Json(serde_json::Value),
    Object(Vec<(String, Value)>),
    Array(Vec<Value>),
    /// The `z` namespace
    Zod,
    /// `z.coerce`
    Coerce,
    /// An uncalled `z.<factory>`
    Factory(String),
    /// An uncalled `schema.<method>`
    Method(Box<ZodSchema>, String),
    Namespace(ModuleId),
    Unknown,
}

impl Value {
    fn into_arg(self) -> Arg {
        match self {
            Value::Schema(schema) => Arg::Schema(schema),
            Value::Json(json) => Arg::Json(json),
            Value::Object(fields) => Arg::Shape(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into_arg()))
                    .collect(),
            ),
            Value::Array(items) => Arg::List(items.into_iter().map(Value::into_arg).collect()),
            _ => Arg::Other,
        }
    }
}

enum Imported {
    Named(String),
    Default,
    Namespace,
}

struct Evaluator<'g> {
    graph: &'g ModuleGraph,
    cache: HashMap<(ModuleId, usize), Value>,
    active: HashSet<(ModuleId, usize)>,
}

impl<'g> Evaluator<'g> {
    fn new(graph: &'g ModuleGraph) -> Self {
        Self {
            graph,
            cache: HashMap::new(),
            active: HashSet::new(),
        }
    }

    /// Exports of module `id` whose value is a zod schema
    fn schema_exports(&mut self, id: ModuleId) -> Result<Vec<(String, ZodSchema)>, SchemaError> {
        let mut schemas = Vec::new();
        for name in self.graph.export_names(id) {
            if let Value::Schema(schema) = self.export(id, &name)? {
                schemas.push((name, schema));
            }
        }
        Ok(schemas)
    }

    fn path(&self, id: ModuleId) -> PathBuf {
        self.graph.module(id).file.path.clone()
    }

    fn export(&mut self, id: ModuleId, name: &str) -> Result<Value, SchemaError> {
        let graph = self.graph;
        match graph.find_export(id, name) {
            Some(export) => self.export_value(id, export),
            None => Err(SchemaError::MissingExport {
                path: self.path(id),
                name: name.to_string(),
            }),
        }
    }

    fn export_value(&mut self, id: ModuleId, export: Export<'g>) -> Result<Value, SchemaError> {
        match export {
            Export::Expression(node) => self.memoized(id, node, node),
            Export::Local { anchor, local } => self.identifier(id, anchor, &local),
            Export::Reexport { target, name } => self.import(target, Imported::Named(name)),
            Export::Namespace(target) => self.import(target, Imported::Namespace),
            Export::Opaque => Ok(Value::Unknown),
        }
    }

    fn import(&mut self, target: ModuleRef, imported: Imported) -> Result<Value, SchemaError> {
        match target {
            ModuleRef::Local(id) => match imported {
                Imported::Namespace => Ok(Value::Namespace(id)),
                Imported::Default => self.export(id, "default"),
                Imported::Named(name) => self.export(id, &name),
            },
            ModuleRef::External(specifier) if is_zod(&specifier) => Ok(match imported {
                Imported::Namespace | Imported::Default => Value::Zod,
                Imported::Named(name) if name == "z" => Value::Zod,
                Imported::Named(name) => Value::Factory(name),
            }),
            ModuleRef::External(specifier) => {
                debug!("Values imported from {} are not evaluated", specifier);
                Ok(Value::Unknown)
            }
        }
    }

    /// Evaluate `expression` once per `key` node, detecting self-reference
    fn memoized(
        &mut self,
        id: ModuleId,
        key: Node<'g>,
        expression: Node<'g>,
    ) -> Result<Value, SchemaError> {
        let cache_key = (id, key.id());
        if let Some(value) = self.cache.get(&cache_key) {
            return Ok(value.clone());
        }
        if !self.active.insert(cache_key) {
            let file = &self.graph.module(id).file;
            let name = key
                .child_by_field_name("name")
                .map_or_else(|| file.text(key), |name| file.text(name));
            return Err(SchemaError::Cycle {
                path: self.path(id),
                name: name.to_string(),
            });
        }
        let value = self.eval(id, expression);
        self.active.remove(&cache_key);
        let value = value?;
        self.cache.insert(cache_key, value.clone());
        Ok(value)
    }

    fn identifier(&mut self, id: ModuleId, anchor: Node<'g>, name: &str) -> Result<Value, SchemaError> {
        let graph = self.graph;
        let module = graph.module(id);
        match lookup(&module.file, anchor, name) {
            Some(Binding::Variable {
                declarator,
                init: Some(init),
            }) => {
                let simple = declarator
                    .child_by_field_name("name")
                    .is_some_and(|pattern| pattern.kind() == "identifier");
                if simple {
                    self.memoized(id, declarator, init)
                } else {
                    Ok(Value::Unknown)
                }
            }
            Some(Binding::Import(node)) => {
                let Some(statement) = ancestor(node, "import_statement") else {
                    return Ok(Value::Unknown);
                };
                let Some(specifier) = statement
                    .child_by_field_name("source")
                    .and_then(|source| string_value(&module.file, source))
                else {
                    return Ok(Value::Unknown);
                };
                let imported = match node.kind() {
                    "namespace_import" => Imported::Namespace,
                    "import_specifier" => match node.child_by_field_name("name") {
                        Some(imported) => Imported::Named(
                            string_value(&module.file, imported)
                                .unwrap_or_else(|| module.file.text(imported).to_string()),
                        ),
                        None => return Ok(Value::Unknown),
                    },
                    _ => Imported::Default,
                };
                match module.import(&specifier) {
                    Some(target) => self.import(target.clone(), imported),
                    None => Ok(Value::Unknown),
                }
            }
            _ => Ok(Value::Unknown),
        }
    }

    fn eval(&mut self, id: ModuleId, node: Node<'g>) -> Result<Value, SchemaError> {
        let graph = self.graph;
        let file = &graph.module(id).file;
        let node = unwrap_parens(node);
        let value = match node.kind() {
            "string" => string_value(file, node).map_or(Value::Unknown, |s| Value::Json(s.into())),
            "template_string" => template_value(file, node),
            "number" => parse_number(file.text(node)).map_or(Value::Unknown, Value::Json),
            "true" => Value::Json(true.into()),
            "false" => Value::Json(false.into()),
            "null" => Value::Json(serde_json::Value::Null),
            "regex" => node
                .child_by_field_name("pattern")
                .map_or(Value::Unknown, |pattern| Value::Json(file.text(pattern).into())),
            "unary_expression" => {
                let operator = node.child_by_field_name("operator").map(|op| file.text(op));
                let argument = node.child_by_field_name("argument");
                match (operator, argument) {
                    (Some("-"), Some(argument)) => match self.eval(id, argument)? {
                        Value::Json(serde_json::Value::Number(n)) => n
                            .as_f64()
                            .map_or(Value::Unknown, |n| Value::Json(json_number(-n))),
                        _ => Value::Unknown,
                    },
                    _ => Value::Unknown,
                }
            }
            "array" => {
                let mut items = Vec::new();
                for element in named_children(node) {
                    if element.kind() == "spread_element" {
                        match self.spread(id, element)? {
                            Value::Array(spread) => items.extend(spread),
                            _ => items.push(Value::Unknown),
                        }
                    } else {
                        items.push(self.eval(id, element)?);
                    }
                }
                Value::Array(items)
            }
            "object" => Value::Object(self.object_fields(id, node)?),
            "identifier" => {
                let name = file.text(node);
                if name == "undefined" {
                    Value::Unknown
                } else {
                    self.identifier(id, node, name)?
                }
            }
            "member_expression" => {
                let object = node.child_by_field_name("object");
                let property = node.child_by_field_name("property");
                match (object, property) {
                    (Some(object), Some(property)) => {
                        let object = self.eval(id, object)?;
                        self.member(object, file.text(property))?
                    }
                    _ => Value::Unknown,
                }
            }
            "subscript_expression" => {
                let object = node.child_by_field_name("object");
                let index = node.child_by_field_name("index");
                match (object, index) {
                    (Some(object), Some(index)) => {
                        let key = match self.eval(id, index)? {
                            Value::Json(serde_json::Value::String(key)) => Some(key),
                            Value::Json(serde_json::Value::Number(n)) => Some(n.to_string()),
                            _ => None,
                        };
                        match key {
                            Some(key) => {
                                let object = self.eval(id, object)?;
                                self.member(object, &key)?
                            }
                            None => Value::Unknown,
                        }
                    }
                    _ => Value::Unknown,
                }
            }
            "call_expression" => self.call(id, node)?,
            other => {
                debug!("Not evaluating {} expression", other);
                Value::Unknown
            }
        };
        Ok(value)
    }

    fn spread(&mut self, id: ModuleId, element: Node<'g>) -> Result<Value, SchemaError> {
        match named_children(element).into_iter().next() {
            Some(inner) => self.eval(id, inner),
            None => Ok(Value::Unknown),
        }
    }

    fn object_fields(
        &mut self,
        id: ModuleId,
        node: Node<'g>,
    ) -> Result<Vec<(String, Value)>, SchemaError> {
        let graph = self.graph;
        let file = &graph.module(id).file;
        let mut fields: Vec<(String, Value)> = Vec::new();

        for member in named_children(node) {
            match member.kind() {
                "pair" => {
                    let Some(key_node) = member.child_by_field_name("key") else {
                        continue;
                    };
                    let key = match key_node.kind() {
                        "string" => string_value(file, key_node),
                        "computed_property_name" => match named_children(key_node).into_iter().next() {
                            Some(inner) => match self.eval(id, inner)? {
                                Value::Json(serde_json::Value::String(key)) => Some(key),
                                Value::Json(serde_json::Value::Number(n)) => Some(n.to_string()),
                                _ => None,
                            },
                            None => None,
                        },
                        _ => Some(file.text(key_node).to_string()),
                    };
                    let value = match member.child_by_field_name("value") {
                        Some(value) => self.eval(id, value)?,
                        None => Value::Unknown,
                    };
                    if let Some(key) = key {
                        set_field(&mut fields, key, value);
                    }
                }
                "shorthand_property_identifier" => {
                    let name = file.text(member);
                    let value = self.identifier(id, member, name)?;
                    set_field(&mut fields, name.to_string(), value);
                }
                "spread_element" => {
                    if let Value::Object(spread) = self.spread(id, member)? {
                        for (key, value) in spread {
                            set_field(&mut fields, key, value);
                        }
                    }
                }
                "method_definition" => {
                    if let Some(name) = member.child_by_field_name("name") {
                        set_field(&mut fields, file.text(name).to_string(), Value::Unknown);
                    }
                }
                _ => {}
            }
        }
        Ok(fields)
    }

    fn member(&mut self, object: Value, property: &str) -> Result<Value, SchemaError> {
        let value = match object {
            Value::Zod if property == "coerce" => Value::Coerce,
            Value::Zod | Value::Coerce => Value::Factory(property.to_string()),
            Value::Schema(schema) => match property {
                "shape" => match schema.shape() {
                    Some(shape) => Value::Object(
                        shape
                            .iter()
                            .map(|(key, schema)| (key.clone(), Value::Schema(schema.clone())))
                            .collect(),
                    ),
                    None => Value::Unknown,
                },
                _ => Value::Method(Box::new(schema), property.to_string()),
            },
            Value::Object(fields) => fields
                .into_iter()
                .rev()
                .find(|(key, _)| key == property)
                .map_or(Value::Unknown, |(_, value)| value),
            Value::Array(items) => match property {
                "length" => Value::Json(items.len().into()),
                _ => property
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.into_iter().nth(index))
                    .unwrap_or(Value::Unknown),
            },
            Value::Json(json) => json
                .get(property)
                .or_else(|| property.parse::<usize>().ok().and_then(|i| json.get(i)))
                .cloned()
                .map_or(Value::Unknown, Value::Json),
            Value::Namespace(id) => {
                let graph = self.graph;
                match graph.find_export(id, property) {
                    Some(export) => self.export_value(id, export)?,
                    None => Value::Unknown,
                }
            }
            _ => Value::Unknown,
        };
        Ok(value)
    }

    fn call(&mut self, id: ModuleId, node: Node<'g>) -> Result<Value, SchemaError> {
        let (Some(function), Some(arguments)) = (
            node.child_by_field_name("function"),
            node.child_by_field_name("arguments"),
        ) else {
            return Ok(Value::Unknown);
        };
        if arguments.kind() != "arguments" {
            return Ok(Value::Unknown);
        }
        let callee = self.eval(id, function)?;
        if !matches!(callee, Value::Factory(_) | Value::Method(..)) {
            return Ok(Value::Unknown);
        }

        let mut args = Vec::new();
        for argument in named_children(arguments) {
            let value = match argument.kind() {
                "spread_element" => Value::Unknown,
                _ => self.eval(id, argument)?,
            };
            args.push(value.into_arg());
        }

        let mut schema = match callee {
            Value::Factory(name) => zod::construct(&name, &args),
            Value::Method(schema, method) => (*schema).apply(&method, &args),
            _ => return Ok(Value::Unknown),
        };
        if schema.origin.is_none() {
            schema.origin = Some((id, node.id()));
        }
        Ok(Value::Schema(schema))
    }
}

fn set_field(fields: &mut Vec<(String, Value)>, key: String, value: Value) {
    match fields.iter_mut().find(|(existing, _)| *existing == key) {
        Some(entry) => entry.1 = value,
        None => fields.push((key, value)),
    }
}

fn is_zod(specifier: &str) -> bool {
    specifier == ZOD_MODULE || specifier.starts_with("zod/")
}

fn ancestor<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut current = node.parent();
    while let Some(candidate) = current {
        if candidate.kind() == kind {
            return Some(candidate);
        }
        current = candidate.parent();
    }
    None
}

/// Cooked text of a template literal without substitutions
fn template_value(file: &SourceFile, node: Node<'_>) -> Value {
    let mut text = String::new();
    for part in named_children(node) {
        match part.kind() {
            "string_fragment" => text.push_str(file.text(part)),
            "escape_sequence" => text.push_str(&cook_escape(file.text(part))),
            _ => return Value::Unknown,
        }
    }
    Value::Json(text.into())
}

/// Numeric literal text to a JSON number (`1_000`, `0x1f`, `2e3`, ...)
fn parse_number(text: &str) -> Option<serde_json::Value> {
    let cleaned = text.replace('_', "");
    let lower = cleaned.to_ascii_lowercase();
    let radix = [("0x", 16), ("0o", 8), ("0b", 2)]
        .into_iter()
        .find(|(prefix, _)| lower.starts_with(prefix));
    let value = match radix {
        Some((prefix, radix)) => i64::from_str_radix(&lower[prefix.len()..], radix).ok()? as f64,
        None if lower.ends_with('n') => return None,
        None => lower.parse::<f64>().ok()?,
    };
    Some(json_number(value))
}
