//! Lexical binding lookup over a tree-sitter JavaScript tree.
//!
//! `let`, `const` and `class` are block scoped, `var` is hoisted to the nearest
//! function or program, and function declarations belong to the block that
//! contains them (module code is always strict).

use tree_sitter::Node;

use crate::parser::{named_children, SourceFile};

/// What a name is bound to at a given position
#[derive(Debug, Clone, Copy)]
pub enum Binding<'t> {
    /// A variable declarator; destructured names also point at their declarator
    Variable {
        declarator: Node<'t>,
        init: Option<Node<'t>>,
    },
    /// A function (or generator) declaration
    Function(Node<'t>),
    /// An import specifier, default import or namespace import
    Import(Node<'t>),
    /// Parameters, classes, catch parameters and other non-followable bindings
    Other(Node<'t>),
}

const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "arrow_function",
    "method_definition",
];

/// Whether `kind` is a function-like node
pub fn is_function_kind(kind: &str) -> bool {
    FUNCTION_KINDS.contains(&kind)
}

/// Resolve `name` as seen from `from`, innermost scope first
pub fn lookup<'t>(file: &SourceFile, from: Node<'t>, name: &str) -> Option<Binding<'t>> {
    let mut current = Some(from);
    while let Some(node) = current {
        if let Some(binding) = bindings_of_scope(file, node, name) {
            return Some(binding);
        }
        current = node.parent();
    }
    None
}

fn bindings_of_scope<'t>(file: &SourceFile, scope: Node<'t>, name: &str) -> Option<Binding<'t>> {
    match scope.kind() {
        "program" => find_in_statements(file, &named_children(scope), name)
            .or_else(|| find_hoisted_var(file, scope, name)),
        "statement_block" | "class_static_block" => {
            find_in_statements(file, &named_children(scope), name)
        }
        "switch_body" => {
            let statements: Vec<Node<'t>> = named_children(scope)
                .into_iter()
                .flat_map(|case| named_children(case))
                .collect();
            find_in_statements(file, &statements, name)
        }
        kind if is_function_kind(kind) => find_in_parameters(file, scope, name).or_else(|| {
            scope
                .child_by_field_name("body")
                .and_then(|body| find_hoisted_var(file, body, name))
        }),
        "for_statement" => scope
            .child_by_field_name("initializer")
            .and_then(|init| find_in_statements(file, &[init], name)),
        "for_in_statement" => {
            let left = scope.child_by_field_name("left")?;
            let declares = scope.child_by_field_name("kind").is_some();
            (declares && pattern_binds(file, left, name)).then_some(Binding::Other(left))
        }
        "catch_clause" => {
            let parameter = scope.child_by_field_name("parameter")?;
            pattern_binds(file, parameter, name).then_some(Binding::Other(parameter))
        }
        "class_declaration" | "class" => {
            let class_name = scope.child_by_field_name("name")?;
            (file.text(class_name) == name).then_some(Binding::Other(scope))
        }
        _ => None,
    }
}

/// Declarations made directly by a list of statements
fn find_in_statements<'t>(
    file: &SourceFile,
    statements: &[Node<'t>],
    name: &str,
) -> Option<Binding<'t>> {
    for statement in statements {
        if let Some(binding) = declaration_binding(file, *statement, name) {
            return Some(binding);
        }
    }
    None
}

fn declaration_binding<'t>(file: &SourceFile, node: Node<'t>, name: &str) -> Option<Binding<'t>> {
    match node.kind() {
        "lexical_declaration" | "variable_declaration" => {
            named_children(node).into_iter().find_map(|declarator| {
                if declarator.kind() != "variable_declarator" {
                    return None;
                }
                let pattern = declarator.child_by_field_name("name")?;
                pattern_binds(file, pattern, name).then(|| Binding::Variable {
                    declarator,
                    init: declarator.child_by_field_name("value"),
                })
            })
        }
        "function_declaration" | "generator_function_declaration" => {
            let fn_name = node.child_by_field_name("name")?;
            (file.text(fn_name) == name).then_some(Binding::Function(node))
        }
        "class_declaration" => {
            let class_name = node.child_by_field_name("name")?;
            (file.text(class_name) == name).then_some(Binding::Other(node))
        }
        "import_statement" => import_binding(file, node, name),
        "export_statement" => node
            .child_by_field_name("declaration")
            .and_then(|declaration| declaration_binding(file, declaration, name)),
        _ => None,
    }
}

fn import_binding<'t>(file: &SourceFile, statement: Node<'t>, name: &str) -> Option<Binding<'t>> {
    let clause = named_children(statement)
        .into_iter()
        .find(|child| child.kind() == "import_clause")?;
    for part in named_children(clause) {
        match part.kind() {
            "identifier" if file.text(part) == name => return Some(Binding::Import(part)),
            "namespace_import" => {
                let bound = named_children(part)
                    .into_iter()
                    .any(|id| id.kind() == "identifier" && file.text(id) == name);
                if bound {
                    return Some(Binding::Import(part));
                }
            }
            "named_imports" => {
                for specifier in named_children(part) {
                    let local = specifier
                        .child_by_field_name("alias")
                        .or_else(|| specifier.child_by_field_name("name"));
                    if local.is_some_and(|local| file.text(local) == name) {
                        return Some(Binding::Import(specifier));
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn find_in_parameters<'t>(file: &SourceFile, function: Node<'t>, name: &str) -> Option<Binding<'t>> {
    // Single-parameter arrow functions without parentheses
    if let Some(parameter) = function.child_by_field_name("parameter") {
        if pattern_binds(file, parameter, name) {
            return Some(Binding::Other(parameter));
        }
    }
    if let Some(parameters) = function.child_by_field_name("parameters") {
        for parameter in named_children(parameters) {
            if pattern_binds(file, parameter, name) {
                return Some(Binding::Other(parameter));
            }
        }
    }
    // A named function expression can refer to itself
    if matches!(function.kind(), "function_expression" | "function" | "generator_function") {
        if let Some(own) = function.child_by_field_name("name") {
            if file.text(own) == name {
                return Some(Binding::Other(function));
            }
        }
    }
    None
}

/// `var` declarations anywhere below `node` without crossing into nested functions
fn find_hoisted_var<'t>(file: &SourceFile, node: Node<'t>, name: &str) -> Option<Binding<'t>> {
    for child in named_children(node) {
        let kind = child.kind();
        if is_function_kind(kind) || kind == "class_declaration" || kind == "class" {
            continue;
        }
        if kind == "variable_declaration" {
            if let Some(binding) = declaration_binding(file, child, name) {
                return Some(binding);
            }
        }
        if let Some(binding) = find_hoisted_var(file, child, name) {
            return Some(binding);
        }
    }
    None
}

/// Whether a binding pattern introduces `name`
pub fn pattern_binds(file: &SourceFile, pattern: Node<'_>, name: &str) -> bool {
    match pattern.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => file.text(pattern) == name,
        "assignment_pattern" | "object_assignment_pattern" => pattern
            .child_by_field_name("left")
            .is_some_and(|left| pattern_binds(file, left, name)),
        "pair_pattern" => pattern
            .child_by_field_name("value")
            .is_some_and(|value| pattern_binds(file, value, name)),
        "object_pattern" | "array_pattern" | "rest_pattern" => named_children(pattern)
            .into_iter()
            .any(|child| pattern_binds(file, child, name)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JsParser;

    fn identifier_at<'t>(file: &'t SourceFile, needle: &str) -> Node<'t> {
        let offset = file.source.rfind(needle).expect("needle present");
        let len = needle
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
            .count();
        file.root()
            .descendant_for_byte_range(offset, offset + len)
            .expect("node at offset")
    }

    #[test]
    fn test_block_scoping_prefers_inner_binding() {
        let file = JsParser::new()
            .parse_source(
                "scope.js",
                "const base = '/outer';\nfunction f() {\n  const base = '/inner';\n  return base;\n}\n",
            )
            .unwrap();
        let usage = identifier_at(&file, "base;");
        match lookup(&file, usage, "base") {
            Some(Binding::Variable { init: Some(init), .. }) => {
                assert_eq!(file.text(init), "'/inner'")
            }
            other => panic!("unexpected binding: {other:?}"),
        }
    }

    #[test]
    fn test_parameters_shadow_outer_variables() {
        let file = JsParser::new()
            .parse_source(
                "scope.js",
                "const id = 'x';\nconst load = (id) => id;\n",
            )
            .unwrap();
        let usage = identifier_at(&file, "id;");
        assert!(matches!(lookup(&file, usage, "id"), Some(Binding::Other(_))));
    }

    #[test]
    fn test_var_is_hoisted_out_of_blocks() {
        let file = JsParser::new()
            .parse_source(
                "scope.js",
                "function f(flag) {\n  if (flag) { var url = '/a'; }\n  return url;\n}\n",
            )
            .unwrap();
        let usage = identifier_at(&file, "url;");
        assert!(matches!(
            lookup(&file, usage, "url"),
            Some(Binding::Variable { .. })
        ));
    }

    #[test]
    fn test_imports_and_unbound_names() {
        let file = JsParser::new()
            .parse_source(
                "scope.js",
                "import { ENDPOINT as url } from './config';\nexport const x = url + missing;\n",
            )
            .unwrap();
        let usage = identifier_at(&file, "url +");
        assert!(matches!(lookup(&file, usage, "url"), Some(Binding::Import(_))));
        let missing = identifier_at(&file, "missing");
        assert!(lookup(&file, missing, "missing").is_none());
    }

    #[test]
    fn test_destructured_names_point_at_declarator() {
        let file = JsParser::new()
            .parse_source("scope.js", "const { path } = routes;\nconsole.log(path);\n")
            .unwrap();
        let usage = identifier_at(&file, "path)");
        match lookup(&file, usage, "path") {
            Some(Binding::Variable { init: Some(init), .. }) => assert_eq!(file.text(init), "routes"),
            other => panic!("unexpected binding: {other:?}"),
        }
    }
}
