use log::debug;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Failed to read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load the JavaScript grammar: {0}")]
    Language(String),

    #[error("Failed to parse `{}`", .path.display())]
    ParseFailed { path: PathBuf },

    #[error("Syntax error in `{}` at {line}:{column}", .path.display())]
    Syntax {
        path: PathBuf,
        line: usize,
        column: usize,
    },
}

/// A JavaScript module parsed into a syntax tree
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub source: String,
    tree: Tree,
}

impl SourceFile {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text covered by `node`
    pub fn text(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or_default()
    }
}

/// Parses JavaScript modules with the tree-sitter grammar
pub struct JsParser;

impl Default for JsParser {
    fn default() -> Self {
        Self::new()
    }
}

impl JsParser {
    pub fn new() -> Self {
        JsParser
    }

    /// Read and parse a file, failing on any syntax error
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<SourceFile, ParserError> {
        let path = path.as_ref().to_path_buf();
        let source = std::fs::read_to_string(&path).map_err(|source| ParserError::Io {
            path: path.clone(),
            source,
        })?;
        self.parse_source(path, source)
    }

    /// Parse in-memory source; `path` is only used for diagnostics
    pub fn parse_source(
        &self,
        path: impl Into<PathBuf>,
        source: impl Into<String>,
    ) -> Result<SourceFile, ParserError> {
        let path = path.into();
        let source = source.into();

        let language: tree_sitter::Language = tree_sitter_javascript::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| ParserError::Language(e.to_string()))?;

        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| ParserError::ParseFailed { path: path.clone() })?;

        if let Some(error) = first_error(tree.root_node()) {
            let position = error.start_position();
            return Err(ParserError::Syntax {
                path,
                line: position.row + 1,
                column: position.column + 1,
            });
        }

        debug!("Parsed {:?} ({} bytes)", path, source.len());
        Ok(SourceFile { path, source, tree })
    }
}

/// First error or missing node in document order
fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    if !root.has_error() {
        return None;
    }
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    Some(root)
}

/// Named children, skipping comments
pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let children = node
        .named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect();
    children
}

/// Strip any number of enclosing parentheses
pub fn unwrap_parens(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_expression" {
        match named_children(node).into_iter().next() {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Whether a member or call node uses `?.`
pub fn is_optional_chain(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    let optional = node
        .children(&mut cursor)
        .any(|child| child.kind() == "optional_chain");
    optional
}

/// Cooked value of a `string` node
pub fn string_value(file: &SourceFile, node: Node<'_>) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let mut value = String::new();
    for child in named_children(node) {
        match child.kind() {
            "escape_sequence" => value.push_str(&cook_escape(file.text(child))),
            _ => value.push_str(file.text(child)),
        }
    }
    Some(value)
}

/// Decode a single escape sequence such as `\n`, `\x41`, `\u{1F600}`
pub fn cook_escape(sequence: &str) -> String {
    let body = sequence.strip_prefix('\\').unwrap_or(sequence);
    let mut chars = body.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let rest: String = chars.collect();

    let from_hex = |hex: &str| {
        u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
    };

    match first {
        'n' => "\n".to_string(),
        't' => "\t".to_string(),
        'r' => "\r".to_string(),
        'b' => "\u{8}".to_string(),
        'f' => "\u{c}".to_string(),
        'v' => "\u{b}".to_string(),
        '0' if rest.is_empty() => "\0".to_string(),
        // Line continuation
        '\n' | '\r' | '\u{2028}' | '\u{2029}' => String::new(),
        'x' => from_hex(&rest).unwrap_or_else(|| body.to_string()),
        'u' => {
            let hex = rest.trim_start_matches('{').trim_end_matches('}');
            from_hex(hex).unwrap_or_else(|| body.to_string())
        }
        other => {
            let mut cooked = String::from(other);
            cooked.push_str(&rest);
            cooked
        }
    }
}

/// Whether `name` can be written as a plain JavaScript property access
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
