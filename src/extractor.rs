use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tree_sitter::Node;

use crate::models::{HttpMethod, ParsedOperation, PathSegment, SourceLocation};
use crate::parser::{
    cook_escape, is_optional_chain, named_children, string_value, unwrap_parens, SourceFile,
};
use crate::scope::{is_function_kind, lookup, Binding};

static REPEATED_SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"/{2,}").unwrap());

/// A statically resolved endpoint expression
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointInfo {
    pub path: String,
    pub segments: Vec<PathSegment>,
    pub params: Vec<String>,
    pub raw: String,
}

/// Why an endpoint expression could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// An expression shape outside literal, template, identifier and `+`
    UnsupportedExpression(String),
    /// No binding for the identifier is in scope
    UnboundIdentifier(String),
    /// Bound to something that cannot be followed (parameter, import, class, ...)
    UnresolvableBinding(String),
    /// The identifier was already followed while resolving this call
    CyclicAlias(String),
    /// One side of a `+` did not resolve
    PartialConcatenation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(EndpointInfo),
    Unresolved(UnresolvedReason),
}

/// A client call whose endpoint could not be resolved
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageGap {
    pub method: HttpMethod,
    pub function_name: Option<String>,
    pub loc: SourceLocation,
    pub reason: UnresolvedReason,
}

/// Everything found in one service file
#[derive(Debug, Default)]
pub struct Extraction {
    pub operations: Vec<ParsedOperation>,
    pub gaps: Vec<CoverageGap>,
}

/// Finds `<client>.<verb>(endpoint, ...)` calls in parsed service files
pub struct CallSiteExtractor {
    client_identifier: String,
}

impl CallSiteExtractor {
    pub fn new(client_identifier: impl Into<String>) -> Self {
        Self {
            client_identifier: client_identifier.into(),
        }
    }

    /// Extract operations from one service file.
    ///
    /// `service` is the logical service name and `display_file` the path
    /// reported in summaries and source strings.
    pub fn extract(&self, file: &SourceFile, service: &str, display_file: &str) -> Extraction {
        let mut extraction = Extraction::default();
        let mut stack = vec![file.root()];

        while let Some(node) = stack.pop() {
            if node.kind() == "call_expression" {
                self.visit_call(file, node, service, display_file, &mut extraction);
            }
            let mut children = named_children(node);
            children.reverse();
            stack.extend(children);
        }

        extraction
    }

    fn visit_call(
        &self,
        file: &SourceFile,
        call: Node<'_>,
        service: &str,
        display_file: &str,
        extraction: &mut Extraction,
    ) {
        let Some(method) = self.client_method(file, call) else {
            return;
        };
        let Some(endpoint) = call
            .child_by_field_name("arguments")
            .filter(|args| args.kind() == "arguments")
            .and_then(|args| named_children(args).into_iter().next())
        else {
            return;
        };

        let loc = SourceLocation {
            line: call.start_position().row + 1,
            column: utf16_column(file, call) + 1,
        };
        let function_name = enclosing_function_name(file, call);

        let mut seen = HashSet::new();
        match resolve_endpoint(file, endpoint, call, &mut seen) {
            Resolution::Resolved(info) => extraction.operations.push(ParsedOperation {
                method,
                service: service.to_string(),
                file: display_file.to_string(),
                function_name,
                path: info.path,
                path_segments: info.segments,
                path_params: info.params,
                raw_expression: info.raw,
                operation_id: String::new(),
                loc: Some(loc),
            }),
            Resolution::Unresolved(reason) => {
                debug!(
                    "Skipping {} call at {}:{}:{}: {:?}",
                    method, display_file, loc.line, loc.column, reason
                );
                extraction.gaps.push(CoverageGap {
                    method,
                    function_name,
                    loc,
                    reason,
                });
            }
        }
    }

    /// The verb when `call` is `<client>.<verb>(...)` with a supported verb
    fn client_method(&self, file: &SourceFile, call: Node<'_>) -> Option<HttpMethod> {
        if is_optional_chain(call) {
            return None;
        }
        let callee = call.child_by_field_name("function")?;
        if callee.kind() != "member_expression" || is_optional_chain(callee) {
            return None;
        }
        let object = callee.child_by_field_name("object")?;
        if object.kind() != "identifier" || file.text(object) != self.client_identifier {
            return None;
        }
        let property = callee.child_by_field_name("property")?;
        if property.kind() != "property_identifier" {
            return None;
        }
        HttpMethod::from_verb(file.text(property))
    }
}

/// Resolve an endpoint expression into a path template.
///
/// `anchor` is the node whose scope is used for identifier lookups; `seen`
/// is shared by every branch of one call's resolution.
pub fn resolve_endpoint<'t>(
    file: &'t SourceFile,
    node: Node<'t>,
    anchor: Node<'t>,
    seen: &mut HashSet<String>,
) -> Resolution {
    let node = unwrap_parens(node);
    match node.kind() {
        "string" => {
            let value = string_value(file, node).unwrap_or_default();
            let normalized = normalize_path(&value);
            Resolution::Resolved(EndpointInfo {
                path: normalized.clone(),
                segments: vec![PathSegment::literal(normalized)],
                params: Vec::new(),
                raw: value,
            })
        }
        "template_string" => Resolution::Resolved(resolve_template(file, node)),
        "identifier" => resolve_identifier(file, node, anchor, seen),
        "binary_expression" if binary_operator(file, node) == Some("+") => {
            let (Some(left), Some(right)) = (
                node.child_by_field_name("left"),
                node.child_by_field_name("right"),
            ) else {
                return Resolution::Unresolved(UnresolvedReason::PartialConcatenation);
            };
            let left = resolve_endpoint(file, left, anchor, seen);
            let right = resolve_endpoint(file, right, anchor, seen);
            match (left, right) {
                (Resolution::Resolved(left), Resolution::Resolved(right)) => {
                    let segments: Vec<PathSegment> =
                        left.segments.into_iter().chain(right.segments).collect();
                    let params = left.params.into_iter().chain(right.params).collect();
                    Resolution::Resolved(EndpointInfo {
                        path: compose_path(&segments),
                        segments,
                        params,
                        raw: format!("{} + {}", left.raw, right.raw),
                    })
                }
                _ => Resolution::Unresolved(UnresolvedReason::PartialConcatenation),
            }
        }
        kind => Resolution::Unresolved(UnresolvedReason::UnsupportedExpression(kind.to_string())),
    }
}

fn resolve_identifier<'t>(
    file: &'t SourceFile,
    node: Node<'t>,
    anchor: Node<'t>,
    seen: &mut HashSet<String>,
) -> Resolution {
    let name = file.text(node).to_string();
    if !seen.insert(name.clone()) {
        return Resolution::Unresolved(UnresolvedReason::CyclicAlias(name));
    }

    match lookup(file, anchor, &name) {
        Some(Binding::Variable {
            declarator,
            init: Some(init),
        }) => resolve_endpoint(file, init, declarator, seen),
        Some(Binding::Function(function)) => match first_returned_expression(function) {
            Some(returned) => resolve_endpoint(file, returned, returned, seen),
            None => Resolution::Unresolved(UnresolvedReason::UnresolvableBinding(name)),
        },
        Some(_) => Resolution::Unresolved(UnresolvedReason::UnresolvableBinding(name)),
        None => Resolution::Unresolved(UnresolvedReason::UnboundIdentifier(name)),
    }
}

fn resolve_template(file: &SourceFile, template: Node<'_>) -> EndpointInfo {
    let mut segments: Vec<PathSegment> = Vec::new();
    let mut params = Vec::new();
    let mut composed = String::new();
    let mut chunk = String::new();
    let mut index = 0;

    for part in named_children(template) {
        match part.kind() {
            "escape_sequence" => chunk.push_str(&cook_escape(file.text(part))),
            "template_substitution" => {
                flush_literal(&mut chunk, &mut segments, &mut composed);

                let expression = named_children(part).into_iter().next();
                let name = match expression {
                    Some(expression) => derive_param_name(file, expression, index),
                    None => format!("param{}", index + 1),
                };
                let preceding = match segments.last() {
                    Some(PathSegment::Literal { value, .. }) => value.as_str(),
                    _ => "",
                };
                let is_query = preceding.contains('?') || preceding.contains('&');
                if !is_query {
                    params.push(name.clone());
                }
                composed.push_str(&format!("{{{}}}", name));
                segments.push(PathSegment::Param {
                    name,
                    expression: expression.map(|e| file.text(e).to_string()).unwrap_or_default(),
                    is_query,
                });
                index += 1;
            }
            _ => chunk.push_str(file.text(part)),
        }
    }
    flush_literal(&mut chunk, &mut segments, &mut composed);

    if !composed.starts_with('/') {
        composed.insert(0, '/');
        match segments.first_mut() {
            Some(PathSegment::Literal { value, .. }) => value.insert(0, '/'),
            _ => segments.insert(0, PathSegment::literal("/")),
        }
    }

    let path_only = composed.split('?').next().unwrap_or_default();
    EndpointInfo {
        path: normalize_path(path_only),
        segments,
        params,
        raw: file.text(template).to_string(),
    }
}

fn flush_literal(chunk: &mut String, segments: &mut Vec<PathSegment>, composed: &mut String) {
    if chunk.is_empty() {
        return;
    }
    composed.push_str(chunk);
    segments.push(PathSegment::literal(std::mem::take(chunk)));
}

/// Parameter name for an interpolated expression; `index` is its position in the template
fn derive_param_name(file: &SourceFile, expression: Node<'_>, index: usize) -> String {
    let expression = unwrap_parens(expression);
    let derived = match expression.kind() {
        "identifier" | "undefined" => Some(file.text(expression).to_string()),
        "member_expression" if !is_optional_chain(expression) => expression
            .child_by_field_name("property")
            .filter(|property| property.kind() == "property_identifier")
            .map(|property| file.text(property).to_string()),
        "subscript_expression" if !is_optional_chain(expression) => expression
            .child_by_field_name("index")
            .and_then(|key| string_value(file, key)),
        _ => None,
    };
    derived.unwrap_or_else(|| format!("param{}", index + 1))
}

fn binary_operator<'t>(file: &'t SourceFile, node: Node<'t>) -> Option<&'t str> {
    node.child_by_field_name("operator").map(|op| file.text(op))
}

/// Argument of the first top-level `return` that has one
fn first_returned_expression(function: Node<'_>) -> Option<Node<'_>> {
    let body = function.child_by_field_name("body")?;
    if body.kind() != "statement_block" {
        return None;
    }
    named_children(body)
        .into_iter()
        .filter(|statement| statement.kind() == "return_statement")
        .find_map(|statement| named_children(statement).into_iter().next())
}

/// Best-effort name of the function that contains `call`
pub fn enclosing_function_name(file: &SourceFile, call: Node<'_>) -> Option<String> {
    let mut function = call.parent();
    while let Some(node) = function {
        if is_function_kind(node.kind()) {
            break;
        }
        function = node.parent();
    }
    let function = function?;

    match function.kind() {
        "function_declaration" | "generator_function_declaration" => function
            .child_by_field_name("name")
            .map(|name| file.text(name).to_string()),
        "method_definition" => {
            let key = function.child_by_field_name("name")?;
            match key.kind() {
                "property_identifier" | "identifier" => Some(file.text(key).to_string()),
                "string" => string_value(file, key),
                "computed_property_name" => named_children(key)
                    .into_iter()
                    .next()
                    .and_then(|inner| string_value(file, inner)),
                _ => None,
            }
        }
        _ => {
            let mut parent = function.parent()?;
            while parent.kind() == "parenthesized_expression" {
                parent = parent.parent()?;
            }
            let target = match parent.kind() {
                "variable_declarator" => parent.child_by_field_name("name"),
                "assignment_expression" => parent.child_by_field_name("left"),
                _ => None,
            }?;
            (target.kind() == "identifier").then(|| file.text(target).to_string())
        }
    }
}

/// Column of `node` in UTF-16 code units, the way JavaScript tooling counts it
fn utf16_column(file: &SourceFile, node: Node<'_>) -> usize {
    let start = node.start_byte();
    let column = node.start_position().column;
    file.source
        .get(start - column..start)
        .map_or(column, |prefix| prefix.encode_utf16().count())
}

/// Leading slash, no repeated or trailing slashes; empty input becomes `/`
pub fn normalize_path(value: &str) -> String {
    let trimmed = value.trim();
    let prefixed = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };
    let collapsed = REPEATED_SLASHES.replace_all(&prefixed, "/");
    let stripped = collapsed.trim_end_matches('/');
    if stripped.is_empty() {
        "/".to_string()
    } else {
        stripped.to_string()
    }
}

/// Path template of a segment list, without the query string
pub fn compose_path(segments: &[PathSegment]) -> String {
    let mut raw = String::new();
    for segment in segments {
        match segment {
            PathSegment::Literal { value, .. } => raw.push_str(value),
            PathSegment::Param { name, .. } => raw.push_str(&format!("{{{}}}", name)),
        }
    }
    let path_only = raw.split('?').next().unwrap_or_default();
    normalize_path(path_only)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JsParser;
    use pretty_assertions::assert_eq;

    fn extract(source: &str) -> Extraction {
        let file = JsParser::new().parse_source("orderService.js", source).unwrap();
        CallSiteExtractor::new("apiClient").extract(
            &file,
            "orderService",
            "src/api/services/orderService.js",
        )
    }

    fn single(source: &str) -> ParsedOperation {
        let extraction = extract(source);
        assert_eq!(extraction.operations.len(), 1, "gaps: {:?}", extraction.gaps);
        extraction.operations.into_iter().next().unwrap()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("users"), "/users");
        assert_eq!(normalize_path("/users"), "/users");
        assert_eq!(normalize_path("//users//"), "/users");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("  /"), "/");
        assert_eq!(normalize_path("/a//b///c"), "/a/b/c");
    }

    #[test]
    fn test_string_literal_endpoint() {
        let op = single("export async function listMenu() { return apiClient.get('menu/categories'); }");
        assert_eq!(op.method, HttpMethod::Get);
        assert_eq!(op.path, "/menu/categories");
        assert_eq!(op.path_segments, vec![PathSegment::literal("/menu/categories")]);
        assert_eq!(op.raw_expression, "menu/categories");
        assert_eq!(op.function_name.as_deref(), Some("listMenu"));
        assert!(op.path_params.is_empty());
    }

    #[test]
    fn test_template_parameter_extraction() {
        let op = single(
            "const getItem = (orderId, item) => apiClient.get(`/orders/${orderId}/items/${item.id}`);",
        );
        assert_eq!(op.path, "/orders/{orderId}/items/{id}");
        assert_eq!(op.path_params, vec!["orderId", "id"]);
        assert_eq!(op.function_name.as_deref(), Some("getItem"));
        assert_eq!(
            op.path_segments[1],
            PathSegment::Param {
                name: "orderId".to_string(),
                expression: "orderId".to_string(),
                is_query: false,
            }
        );
        assert_eq!(op.raw_expression, "`/orders/${orderId}/items/${item.id}`");
    }

    #[test]
    fn test_query_parameters_are_excluded() {
        let op = single("function search(term) { return apiClient.get(`/search?query=${term}`); }");
        assert_eq!(op.path, "/search");
        assert!(op.path_params.is_empty());
        assert_eq!(
            op.path_segments,
            vec![
                PathSegment::literal("/search?query="),
                PathSegment::Param {
                    name: "term".to_string(),
                    expression: "term".to_string(),
                    is_query: true,
                },
            ]
        );
    }

    #[test]
    fn test_ampersand_marks_following_param_as_query() {
        let op = single("function f(a, b) { return apiClient.get(`/r/${a}?x=1&b=${b}`); }");
        assert_eq!(op.path, "/r/{a}");
        assert_eq!(op.path_params, vec!["a"]);
        assert!(matches!(
            op.path_segments.last(),
            Some(PathSegment::Param { is_query: true, .. })
        ));
    }

    #[test]
    fn test_column_counts_utf16_units() {
        let op = single("const s = 'café'; const emoji = '😀'; apiClient.get('/u');");
        assert_eq!(op.loc, Some(SourceLocation { line: 1, column: 39 }));
    }

    #[test]
    fn test_concatenation_with_alias() {
        let op = single(
            "const base = '/orders';\nexport function confirm(id) { return apiClient.post(base + `/${id}/confirm`, {}); }",
        );
        assert_eq!(op.method, HttpMethod::Post);
        assert_eq!(op.path, "/orders/{id}/confirm");
        assert_eq!(op.path_params, vec!["id"]);
        assert_eq!(op.raw_expression, "/orders + `/${id}/confirm`");
    }

    #[test]
    fn test_template_without_leading_slash() {
        let op = single("function f(id) { return apiClient.delete(`${id}/archive`); }");
        assert_eq!(op.path, "/{id}/archive");
        assert_eq!(op.path_segments[0], PathSegment::literal("/"));
    }

    #[test]
    fn test_literal_prefix_gains_slash() {
        let op = single("function f(id) { return apiClient.put(`orders/${id}`); }");
        assert_eq!(op.path, "/orders/{id}");
        assert_eq!(op.path_segments[0], PathSegment::literal("/orders/"));
    }

    #[test]
    fn test_param_name_fallbacks() {
        let op = single(
            "function f(o) { return apiClient.get(`/a/${o['slug']}/b/${encodeURIComponent(o.id)}/c/${o?.x}`); }",
        );
        assert_eq!(op.path, "/a/{slug}/b/{param2}/c/{param3}");
        assert_eq!(op.path_params, vec!["slug", "param2", "param3"]);
    }

    #[test]
    fn test_function_declaration_alias() {
        let op = single(
            "function endpoint() { const x = 1; return '/reports/daily'; }\nexport const daily = () => apiClient.get(endpoint);",
        );
        assert_eq!(op.path, "/reports/daily");
        assert_eq!(op.function_name.as_deref(), Some("daily"));
    }

    #[test]
    fn test_unresolvable_endpoints_are_gaps() {
        let extraction = extract(
            "export async function list(query, url) {\n  await apiClient.get(query ? `/orders?${query}` : '/orders');\n  await apiClient.get(url);\n  await apiClient.get(missing);\n  await apiClient.get();\n}",
        );
        assert!(extraction.operations.is_empty());
        let reasons: Vec<UnresolvedReason> =
            extraction.gaps.into_iter().map(|gap| gap.reason).collect();
        assert_eq!(
            reasons,
            vec![
                UnresolvedReason::UnsupportedExpression("ternary_expression".to_string()),
                UnresolvedReason::UnresolvableBinding("url".to_string()),
                UnresolvedReason::UnboundIdentifier("missing".to_string()),
            ]
        );
    }

    #[test]
    fn test_self_referential_alias_terminates() {
        let extraction = extract("var a = a + '/x';\nfunction f() { return apiClient.get(a); }");
        assert!(extraction.operations.is_empty());
        assert_eq!(
            extraction.gaps[0].reason,
            UnresolvedReason::PartialConcatenation
        );
    }

    #[test]
    fn test_concatenation_with_unresolved_side() {
        let extraction = extract("function f(id) { return apiClient.get('/orders/' + id); }");
        assert!(extraction.operations.is_empty());
        assert_eq!(
            extraction.gaps[0].reason,
            UnresolvedReason::PartialConcatenation
        );
    }

    #[test]
    fn test_only_client_verbs_match() {
        let extraction = extract(
            "other.get('/a');\napiClient.request('/b');\napiClient?.get('/c');\napiClient['get']('/d');\napiClient.GET('/e');",
        );
        let paths: Vec<&str> = extraction.operations.iter().map(|op| op.path.as_str()).collect();
        assert_eq!(paths, vec!["/e"]);
        assert_eq!(extraction.operations[0].function_name, None);
    }

    #[test]
    fn test_method_names_and_locations() {
        let extraction = extract(
            "class OrderService {\n  async fetchOrders() {\n    return apiClient.get('/orders');\n  }\n}\nexport const api = {\n  'update-order'(id) { return apiClient.patch(`/orders/${id}`); },\n};\nlet handler;\nhandler = function () { return apiClient.post('/orders'); };\n",
        );
        let names: Vec<Option<&str>> = extraction
            .operations
            .iter()
            .map(|op| op.function_name.as_deref())
            .collect();
        assert_eq!(names, vec![Some("fetchOrders"), Some("update-order"), Some("handler")]);
        assert_eq!(
            extraction.operations[0].loc,
            Some(SourceLocation { line: 3, column: 12 })
        );
    }

    #[test]
    fn test_nested_arrow_loses_name() {
        let op = single("export const service = { load: () => apiClient.get('/load') };");
        assert_eq!(op.function_name, None);
    }
}
