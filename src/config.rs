use std::path::{Path, PathBuf};

pub const DEFAULT_OPENAPI_VERSION: &str = "3.1.0";
pub const DEFAULT_TITLE: &str = "Technomart API (auto-generated)";
pub const DEFAULT_API_VERSION: &str = "1.0.0";
pub const DEFAULT_DESCRIPTION: &str = "This OpenAPI document is generated from the existing JavaScript service layer. Update via `npm run generate:openapi` after modifying services or schemas.";

/// Locations and constants used by a generator run
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Project root; every other path is resolved against it
    pub root: PathBuf,
    pub services_dir: PathBuf,
    pub schemas_dir: PathBuf,
    /// Barrel module inside `schemas_dir`, copied but never iterated
    pub schemas_index: String,
    pub output_dir: PathBuf,
    pub openapi_file: String,
    pub helper_file: String,
    pub source_extension: String,
    /// Identifier the service layer uses for the shared HTTP client
    pub client_identifier: String,
    /// Import specifier of the HTTP client, relative to the helper module
    pub client_import: String,
    pub openapi_version: String,
    pub title: String,
    pub api_version: String,
    pub description: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::for_root(".")
    }
}

impl GeneratorConfig {
    /// Build the conventional layout below `root`
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            services_dir: root.join("src").join("api").join("services"),
            schemas_dir: root.join("src").join("api").join("schemas"),
            schemas_index: "index.js".to_string(),
            output_dir: root.join("shared").join("api").join("generated"),
            openapi_file: "openapi.json".to_string(),
            helper_file: "endpoints.js".to_string(),
            source_extension: ".js".to_string(),
            client_identifier: "apiClient".to_string(),
            client_import: "../client.js".to_string(),
            openapi_version: DEFAULT_OPENAPI_VERSION.to_string(),
            title: DEFAULT_TITLE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            root,
        }
    }

    pub fn openapi_output_path(&self) -> PathBuf {
        self.output_dir.join(&self.openapi_file)
    }

    pub fn helper_output_path(&self) -> PathBuf {
        self.output_dir.join(&self.helper_file)
    }

    /// Path of `path` relative to the project root, always with `/` separators.
    /// Falls back to the full path when it is not below the root.
    pub fn display_relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}
