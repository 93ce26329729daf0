//! Renders the generated JavaScript helper module.

use crate::models::{ParsedOperation, PathSegment};
use crate::parser::is_identifier_name;

const HEADER: &str = "// Auto-generated by canteen-openapi. Do not edit manually.";

/// Source of the helper module: an operation registry plus a dispatcher
pub fn build_helper_module(operations: &[ParsedOperation], client_import: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(HEADER.to_string());
    lines.push("/* eslint-disable */".to_string());
    lines.push(format!("import apiClient from {};", single_quoted(client_import)));
    lines.push(String::new());
    lines.push("export const operations = {".to_string());

    for op in operations {
        lines.push(operation_entry(op));
    }

    lines.push("};".to_string());
    lines.push(String::new());
    lines.push(DISPATCHER.to_string());
    lines.push(String::new());
    lines.push("export const callOperation = createEndpointCaller();".to_string());
    lines.push(String::new());
    lines.push("export default operations;".to_string());
    lines.push(String::new());

    lines.join("\n")
}

const DISPATCHER: &str = r#"export function createEndpointCaller(client = apiClient) {
  return function call(operationId, options = {}) {
    const entry = operations[operationId];
    if (!entry) {
      throw new Error(`Unknown operation "${operationId}"`);
    }
    const { pathParams, query, data, config } = options;
    const url = entry.buildPath && pathParams ? entry.buildPath(pathParams) : entry.path;
    const requestConfig = { ...(config || {}) };
    if (query) {
      requestConfig.params = query;
    }
    const verb = entry.method.toLowerCase();
    if (verb === 'get' || verb === 'delete') {
      return client[verb](url, requestConfig);
    }
    return client[verb](url, data ?? {}, requestConfig);
  };
}"#;

fn operation_entry(op: &ParsedOperation) -> String {
    let mut entry = Vec::new();
    entry.push(format!("  {}: {{", json_string(&op.operation_id)));
    entry.push(format!("    method: {},", json_string(op.method.as_str())));
    entry.push(format!("    path: {},", json_string(&op.path)));
    entry.push(format!("    service: {},", json_string(&op.service)));
    if let Some(name) = &op.function_name {
        entry.push(format!("    functionName: {},", json_string(name)));
    }
    if !op.path_params.is_empty() {
        let params = serde_json::Value::from(op.path_params.clone());
        entry.push(format!("    pathParams: {},", params));
    }
    entry.push(format!("    source: {},", json_string(&op.source())));
    entry.push(format!("    summary: {},", json_string(&op.summary())));
    if !op.path_params.is_empty() {
        entry.push(format!("    buildPath: {},", path_builder(op)));
    }
    entry.push("  },".to_string());
    entry.join("\n")
}

/// Arrow function that checks every declared param, then interpolates all
/// param segments through `encodeURIComponent`
fn path_builder(op: &ParsedOperation) -> String {
    let mut unique: Vec<&str> = Vec::new();
    for name in &op.path_params {
        if !unique.contains(&name.as_str()) {
            unique.push(name);
        }
    }

    let mut lines = vec!["(params = {}) => {".to_string()];
    for name in unique {
        lines.push(format!(
            "      if ({} === undefined) {{\n        throw new Error({});\n      }}",
            param_access(name),
            single_quoted(&format!(
                "Missing path param \"{}\" for {}",
                name, op.operation_id
            ))
        ));
    }

    let mut template = String::new();
    for segment in &op.path_segments {
        match segment {
            PathSegment::Literal { value, .. } => template.push_str(&escape_template(value)),
            PathSegment::Param { name, .. } => {
                template.push_str(&format!("${{encodeURIComponent({})}}", param_access(name)))
            }
        }
    }
    lines.push(format!("      return `{}`;", template));
    lines.push("    }".to_string());
    lines.join("\n")
}

/// `params.name`, or `params["name"]` when the name is not an identifier
fn param_access(name: &str) -> String {
    if is_identifier_name(name) {
        format!("params.{}", name)
    } else {
        format!("params[{}]", json_string(name))
    }
}

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn single_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn escape_template(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}
