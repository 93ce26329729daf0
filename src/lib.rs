pub mod config;
pub mod emitter;
pub mod extractor;
pub mod generator;
pub mod json_schema;
pub mod models;
pub mod modules;
pub mod parser;
pub mod scanner;
pub mod schemas;
pub mod scope;
pub mod zod;

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::config::GeneratorConfig;
use crate::extractor::CallSiteExtractor;
use crate::generator::{GeneratedArtifacts, Generator};
use crate::parser::JsParser;
use crate::scanner::list_source_files;
use crate::schemas::SchemaLoader;

/// Scan the service layer, load the schemas and write both artifacts
pub fn run(config: &GeneratorConfig) -> Result<GeneratedArtifacts> {
    // Find the service modules
    let files = list_source_files(&config.services_dir, &config.source_extension)
        .context("Failed to scan the services directory")?;
    debug!("Scanning {} service files", files.len());

    // Parse each service and collect its client calls
    let parser = JsParser::new();
    let extractor = CallSiteExtractor::new(config.client_identifier.as_str());
    let mut operations = Vec::new();
    let mut gaps = 0;

    for name in &files {
        let path = config.services_dir.join(name);
        let file = parser
            .parse_file(&path)
            .context(format!("Failed to parse service file: {:?}", path))?;
        let service = name
            .strip_suffix(config.source_extension.as_str())
            .unwrap_or(name);
        let extraction = extractor.extract(&file, service, &config.display_relative(&path));
        debug!(
            "{}: {} operations, {} unresolved calls",
            name,
            extraction.operations.len(),
            extraction.gaps.len()
        );
        gaps += extraction.gaps.len();
        operations.extend(extraction.operations);
    }

    if operations.is_empty() {
        warn!("No apiClient operations discovered. Ensure services are authored as expected.");
    }
    if gaps > 0 {
        debug!("{} client calls had endpoints that could not be resolved", gaps);
    }

    // Convert the schema modules, then write both artifacts
    let schemas = SchemaLoader::new(config).load()?;
    Generator::new(config, operations, schemas).generate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const ORDER_SERVICE: &str = r#"import apiClient from '../client';

const BASE = '/orders';

export const orderService = {
  list: () => apiClient.get(BASE),
  async getOrder(id) {
    return apiClient.get(`/orders/${id}?expand=${expand}`);
  },
  remove(order) {
    return apiClient.delete(`/orders/${order.id}/`);
  },
  ping() {
    return apiClient.get(dynamicPath());
  },
};

export function createOrder(payload) {
  return apiClient.post(BASE + '/', payload);
}
"#;

    const MENU_SERVICE: &str = r#"import apiClient from '../client';

export const updateItem = async (itemId, body) => apiClient.put(`/menu/${itemId}`, body);
export const listItems = () => apiClient?.get('/menu');
"#;

    const USER_SCHEMA: &str = r#"import { z } from 'zod';

export const UserSchema = z.object({
  id: z.string(),
  email: z.string().email().optional(),
});
"#;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/api/services/orderService.js", ORDER_SERVICE);
        write(dir.path(), "src/api/services/menuService.js", MENU_SERVICE);
        write(dir.path(), "src/api/services/README.md", "not a service");
        write(dir.path(), "src/api/schemas/user.js", USER_SCHEMA);
        write(dir.path(), "src/api/schemas/index.js", "export * from './user';\n");
        dir
    }

    #[test]
    fn test_end_to_end() {
        let dir = fixture();
        let config = GeneratorConfig::for_root(dir.path());
        let artifacts = run(&config).unwrap();

        let doc: Value =
            serde_json::from_str(&fs::read_to_string(&artifacts.openapi_path).unwrap()).unwrap();
        let paths: Vec<&String> = doc["paths"].as_object().unwrap().keys().collect();
        assert_eq!(paths, vec!["/menu/{itemId}", "/orders", "/orders/{id}"]);

        let orders = doc["paths"]["/orders"].as_object().unwrap();
        assert_eq!(orders.keys().collect::<Vec<_>>(), vec!["get", "post"]);
        assert_eq!(orders["post"]["operationId"], "order_createOrder");
        assert_eq!(orders["get"]["operationId"], "order_get_orders");
        assert!(orders["get"].get("parameters").is_none());

        let by_id = &doc["paths"]["/orders/{id}"];
        assert_eq!(by_id["get"]["operationId"], "order_getOrder");
        assert_eq!(by_id["get"]["parameters"][0]["name"], "id");
        assert_eq!(by_id["delete"]["operationId"], "order_remove");
        assert_eq!(
            by_id["delete"]["summary"],
            "Generated from src/api/services/orderService.js#remove"
        );

        let put = &doc["paths"]["/menu/{itemId}"]["put"];
        assert_eq!(put["operationId"], "menu_updateItem");
        assert_eq!(put["tags"], json!(["menuService"]));
        assert_eq!(put["requestBody"]["required"], json!(false));

        assert_eq!(
            doc["components"]["schemas"]["UserSchema"]["definitions"]["UserSchema"]["required"],
            json!(["id"])
        );

        let helper = fs::read_to_string(&artifacts.helper_path).unwrap();
        assert!(helper.contains("  \"order_getOrder\": {"));
        assert!(helper.contains(
            "return `/orders/${encodeURIComponent(params.id)}?expand=${encodeURIComponent(params.expand)}`;"
        ));
        assert!(helper.contains("    source: \"src/api/services/menuService.js:3:51\","));

        let mut leftovers: Vec<String> = fs::read_dir(&config.output_dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        leftovers.sort();
        assert_eq!(leftovers, vec!["endpoints.js", "openapi.json"]);
    }

    #[test]
    fn test_runs_are_byte_identical() {
        let dir = fixture();
        let config = GeneratorConfig::for_root(dir.path());
        let first = run(&config).unwrap();
        let json = fs::read(&first.openapi_path).unwrap();
        let helper = fs::read(&first.helper_path).unwrap();

        let second = run(&config).unwrap();
        assert_eq!(fs::read(&second.openapi_path).unwrap(), json);
        assert_eq!(fs::read(&second.helper_path).unwrap(), helper);
    }

    #[test]
    fn test_missing_services_directory_is_fatal() {
        let dir = tempdir().unwrap();
        let config = GeneratorConfig::for_root(dir.path());
        assert!(run(&config).is_err());
        assert!(!config.openapi_output_path().exists());
    }

    #[test]
    fn test_unparseable_service_is_fatal() {
        let dir = fixture();
        write(dir.path(), "src/api/services/brokenService.js", "export const = ;\n");
        let config = GeneratorConfig::for_root(dir.path());
        let err = run(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("brokenService.js"));
    }

    #[test]
    fn test_empty_service_layer_still_writes_document() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/api/services/emptyService.js", "export const nothing = 1;\n");
        fs::create_dir_all(dir.path().join("src/api/schemas")).unwrap();
        let config = GeneratorConfig::for_root(dir.path());

        let artifacts = run(&config).unwrap();
        let doc: Value =
            serde_json::from_str(&fs::read_to_string(&artifacts.openapi_path).unwrap()).unwrap();
        assert_eq!(doc["paths"], json!({}));
        assert_eq!(doc["components"]["schemas"], json!({}));
        let helper = fs::read_to_string(&artifacts.helper_path).unwrap();
        assert!(helper.contains("export const operations = {\n};"));
    }
}
