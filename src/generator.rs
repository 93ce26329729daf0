use anyhow::{Context, Result};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Map;
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::PathBuf,
};

use crate::config::GeneratorConfig;
use crate::emitter::build_helper_module;
use crate::models::{
    Components, Info, OpenAPI, Operation, ParsedOperation, Parameter, RequestBody, Responses,
};

static NON_WORD_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").unwrap());
static REPEATED_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").unwrap());
static EDGE_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_|_$").unwrap());

/// Paths of the artifacts written by a run
#[derive(Debug, Clone)]
pub struct GeneratedArtifacts {
    pub openapi_path: PathBuf,
    pub helper_path: PathBuf,
}

/// Builds the OpenAPI document and writes the generated artifacts
pub struct Generator<'c> {
    config: &'c GeneratorConfig,
    operations: Vec<ParsedOperation>,
    schemas: Map<String, serde_json::Value>,
}

impl<'c> Generator<'c> {
    /// Sorts `operations` and assigns their operation ids
    pub fn new(
        config: &'c GeneratorConfig,
        mut operations: Vec<ParsedOperation>,
        schemas: Map<String, serde_json::Value>,
    ) -> Self {
        sort_operations(&mut operations);
        assign_operation_ids(&mut operations);
        Self {
            config,
            operations,
            schemas,
        }
    }

    /// Operations in output order, with ids assigned
    pub fn operations(&self) -> &[ParsedOperation] {
        &self.operations
    }

    /// Write `openapi.json` and the helper module, replacing previous output
    pub fn generate(&self) -> Result<GeneratedArtifacts> {
        let output_dir = &self.config.output_dir;
        fs::create_dir_all(output_dir)
            .context(format!("Failed to create output directory: {:?}", output_dir))?;

        let openapi = self.build_openapi_doc();
        let json = serde_json::to_string_pretty(&openapi)
            .context("Failed to serialize OpenAPI document to JSON")?;

        let openapi_path = self.config.openapi_output_path();
        fs::write(&openapi_path, format!("{}\n", json))
            .context(format!("Failed to write file: {:?}", openapi_path))?;
        debug!("Wrote {} paths to {:?}", openapi.paths.len(), openapi_path);

        let helper_path = self.config.helper_output_path();
        let helper = build_helper_module(&self.operations, &self.config.client_import);
        fs::write(&helper_path, helper)
            .context(format!("Failed to write file: {:?}", helper_path))?;

        info!(
            "Generated OpenAPI document at {}",
            self.config.display_relative(&openapi_path)
        );
        info!(
            "Generated endpoint helpers at {}",
            self.config.display_relative(&helper_path)
        );

        Ok(GeneratedArtifacts {
            openapi_path,
            helper_path,
        })
    }

    /// Assemble the OpenAPI document; paths and methods come out sorted
    pub fn build_openapi_doc(&self) -> OpenAPI {
        let mut openapi = OpenAPI {
            openapi: self.config.openapi_version.clone(),
            info: Info {
                title: self.config.title.clone(),
                version: self.config.api_version.clone(),
                description: self.config.description.clone(),
            },
            paths: BTreeMap::new(),
            components: Components {
                schemas: self.schemas.clone(),
            },
        };

        for op in &self.operations {
            let entry = Operation {
                operationId: op.operation_id.clone(),
                summary: op.summary(),
                tags: vec![op.service.clone()],
                responses: Responses::default(),
                parameters: op.path_params.iter().map(Parameter::path).collect(),
                requestBody: op.method.has_body().then(RequestBody::default),
            };

            let path_item = openapi.paths.entry(op.path.clone()).or_default();
            if let Some(previous) = path_item.insert(op.method, entry) {
                debug!(
                    "{} {} from {} replaces {} in the document",
                    op.method, op.path, op.operation_id, previous.operationId
                );
            }
        }

        openapi
    }
}

/// Stable sort by `(path, method, functionName)`
pub fn sort_operations(operations: &mut [ParsedOperation]) {
    operations.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then_with(|| a.method.as_str().cmp(b.method.as_str()))
            .then_with(|| {
                let a_name = a.function_name.as_deref().unwrap_or("");
                let b_name = b.function_name.as_deref().unwrap_or("");
                a_name.cmp(b_name)
            })
    });
}

/// Give every operation a unique id, suffixing `_2`, `_3`, ... in order
pub fn assign_operation_ids(operations: &mut [ParsedOperation]) {
    let mut used = HashSet::new();
    for op in operations.iter_mut() {
        let base = operation_id_base(op);
        let mut candidate = base.clone();
        let mut counter = 1;
        while used.contains(&candidate) {
            counter += 1;
            candidate = format!("{}_{}", base, counter);
        }
        used.insert(candidate.clone());
        op.operation_id = candidate;
    }
}

/// `<service without "Service">_<function or method_path>`, sanitized
pub fn operation_id_base(op: &ParsedOperation) -> String {
    let service_slug = op.service.strip_suffix("Service").unwrap_or(&op.service);
    let raw_name = match &op.function_name {
        Some(name) => name.clone(),
        None => format!("{}_{}", op.method, op.path),
    };

    let joined = format!("{}_{}", service_slug, raw_name);
    let sanitized = NON_WORD_CHARS.replace_all(&joined, "_");
    let collapsed = REPEATED_UNDERSCORES.replace_all(&sanitized, "_");
    let candidate = EDGE_UNDERSCORE.replace_all(&collapsed, "").into_owned();

    if candidate.is_empty() {
        format!("{}_{}", service_slug, op.method)
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, PathSegment, SourceLocation};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn operation(
        service: &str,
        method: HttpMethod,
        path: &str,
        function_name: Option<&str>,
    ) -> ParsedOperation {
        let params: Vec<String> = path
            .split('/')
            .filter_map(|part| part.strip_prefix('{').and_then(|p| p.strip_suffix('}')))
            .map(str::to_string)
            .collect();
        ParsedOperation {
            method,
            service: service.to_string(),
            file: format!("src/api/services/{}.js", service),
            function_name: function_name.map(str::to_string),
            path: path.to_string(),
            path_segments: vec![PathSegment::literal(path)],
            path_params: params,
            raw_expression: path.to_string(),
            operation_id: String::new(),
            loc: Some(SourceLocation { line: 1, column: 1 }),
        }
    }

    #[test]
    fn test_operation_id_base() {
        let op = operation("orderService", HttpMethod::Get, "/orders", Some("getOrders"));
        assert_eq!(operation_id_base(&op), "order_getOrders");

        let op = operation("orderService", HttpMethod::Get, "/orders/{id}", None);
        assert_eq!(operation_id_base(&op), "order_get_orders_id");

        let op = operation("menuService", HttpMethod::Put, "/", Some("update-item!"));
        assert_eq!(operation_id_base(&op), "menu_update_item");

        let op = operation("Service", HttpMethod::Delete, "/", Some("__"));
        assert_eq!(operation_id_base(&op), "_delete");
    }

    #[test]
    fn test_collisions_get_numeric_suffixes_in_sort_order() {
        let config = GeneratorConfig::for_root("/project");
        let generator = Generator::new(
            &config,
            vec![
                operation("orderService", HttpMethod::Post, "/orders/b", Some("save")),
                operation("orderService", HttpMethod::Get, "/orders/a", Some("save")),
                operation("orderService", HttpMethod::Get, "/orders/a", Some("list")),
                operation("menuService", HttpMethod::Get, "/menu", Some("save")),
            ],
            Map::new(),
        );
        let ids: Vec<(&str, &str)> = generator
            .operations()
            .iter()
            .map(|op| (op.path.as_str(), op.operation_id.as_str()))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("/menu", "menu_save"),
                ("/orders/a", "order_list"),
                ("/orders/a", "order_save"),
                ("/orders/b", "order_save_2"),
            ]
        );
    }

    #[test]
    fn test_sort_is_stable_for_identical_keys() {
        let mut first = operation("aService", HttpMethod::Get, "/x", Some("load"));
        first.raw_expression = "first".to_string();
        let mut second = operation("bService", HttpMethod::Get, "/x", Some("load"));
        second.raw_expression = "second".to_string();
        let mut ops = vec![first, second];
        sort_operations(&mut ops);
        assert_eq!(ops[0].raw_expression, "first");
        assert_eq!(ops[1].raw_expression, "second");
    }

    #[test]
    fn test_document_shape() {
        let config = GeneratorConfig::for_root("/project");
        let generator = Generator::new(
            &config,
            vec![
                operation("orderService", HttpMethod::Post, "/orders/{id}", Some("confirm")),
                operation("orderService", HttpMethod::Get, "/orders/{id}", Some("getOrder")),
            ],
            Map::new(),
        );
        let doc = serde_json::to_value(generator.build_openapi_doc()).unwrap();

        assert_eq!(doc["openapi"], "3.1.0");
        assert_eq!(doc["info"]["title"], "Technomart API (auto-generated)");
        assert_eq!(doc["components"]["schemas"], serde_json::json!({}));

        let methods: Vec<&String> = doc["paths"]["/orders/{id}"]
            .as_object()
            .unwrap()
            .keys()
            .collect();
        assert_eq!(methods, vec!["get", "post"]);

        let get = &doc["paths"]["/orders/{id}"]["get"];
        assert_eq!(
            get,
            &serde_json::json!({
                "operationId": "order_getOrder",
                "summary": "Generated from src/api/services/orderService.js#getOrder",
                "tags": ["orderService"],
                "responses": {
                    "default": { "description": "Auto-generated response placeholder" }
                },
                "parameters": [
                    { "name": "id", "in": "path", "required": true, "schema": { "type": "string" } }
                ]
            })
        );
        assert_eq!(
            doc["paths"]["/orders/{id}"]["post"]["requestBody"],
            serde_json::json!({ "description": "Auto-generated placeholder body", "required": false })
        );
    }

    #[test]
    fn test_generate_is_idempotent() {
        let dir = tempdir().unwrap();
        let config = GeneratorConfig::for_root(dir.path());
        let ops = vec![
            operation("orderService", HttpMethod::Get, "/orders", Some("list")),
            operation("menuService", HttpMethod::Delete, "/menu/{itemId}", Some("remove")),
        ];

        let artifacts = Generator::new(&config, ops.clone(), Map::new())
            .generate()
            .unwrap();
        let first_json = fs::read_to_string(&artifacts.openapi_path).unwrap();
        let first_helper = fs::read_to_string(&artifacts.helper_path).unwrap();

        Generator::new(&config, ops, Map::new()).generate().unwrap();
        assert_eq!(fs::read_to_string(&artifacts.openapi_path).unwrap(), first_json);
        assert_eq!(fs::read_to_string(&artifacts.helper_path).unwrap(), first_helper);

        assert!(first_json.ends_with("}\n"));
        assert!(first_json.starts_with("{\n  \"openapi\": \"3.1.0\",\n  \"info\": {"));
    }
}
