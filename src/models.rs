#![allow(non_snake_case)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// HTTP verbs recognised on the shared client
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Delete,
    Get,
    Patch,
    Post,
    Put,
}

impl HttpMethod {
    /// Parse a client method name, case-insensitively
    pub fn from_verb(verb: &str) -> Option<Self> {
        match verb.to_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "patch" => Some(Self::Patch),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }

    /// Verbs whose client call carries a body argument
    pub fn has_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fragment of an endpoint path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Literal {
        value: String,
        is_query: bool,
    },
    Param {
        name: String,
        /// Source text of the interpolated expression
        expression: String,
        is_query: bool,
    },
}

impl PathSegment {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
            is_query: false,
        }
    }
}

/// 1-based source position of a call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

/// One discovered HTTP call site
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOperation {
    pub method: HttpMethod,
    pub service: String,
    /// Service file relative to the project root
    pub file: String,
    pub function_name: Option<String>,
    pub path: String,
    pub path_segments: Vec<PathSegment>,
    pub path_params: Vec<String>,
    pub raw_expression: String,
    /// Empty until the document builder assigns identifiers
    pub operation_id: String,
    pub loc: Option<SourceLocation>,
}

impl ParsedOperation {
    /// `Generated from <file>[#<function>]`
    pub fn summary(&self) -> String {
        match &self.function_name {
            Some(name) => format!("Generated from {}#{}", self.file, name),
            None => format!("Generated from {}", self.file),
        }
    }

    /// `file:line:col`, or just the file when no position is known
    pub fn source(&self) -> String {
        match &self.loc {
            Some(loc) => format!("{}:{}:{}", self.file, loc.line, loc.column),
            None => self.file.clone(),
        }
    }
}

/// Top-level OpenAPI document
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct OpenAPI {
    pub openapi: String,
    pub info: Info,
    pub paths: BTreeMap<String, PathItem>,
    pub components: Components,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Info {
    pub title: String,
    pub version: String,
    pub description: String,
}

/// Operations of one path keyed by lower-case method
pub type PathItem = BTreeMap<HttpMethod, Operation>;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Components {
    /// Insertion ordered: schema file order, then export name order
    pub schemas: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Operation {
    pub operationId: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub responses: Responses,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requestBody: Option<RequestBody>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Responses {
    pub default: Response,
}

impl Default for Responses {
    fn default() -> Self {
        Self {
            default: Response {
                description: "Auto-generated response placeholder".to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Response {
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub in_type: String,
    pub required: bool,
    pub schema: ParameterSchema,
}

impl Parameter {
    /// Required string path parameter
    pub fn path(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            in_type: "path".to_string(),
            required: true,
            schema: ParameterSchema {
                type_name: "string".to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestBody {
    pub description: String,
    pub required: bool,
}

impl Default for RequestBody {
    fn default() -> Self {
        Self {
            description: "Auto-generated placeholder body".to_string(),
            required: false,
        }
    }
}
