//! Syntax-tree scan for dangerous call expressions in generated Python.

use log::{debug, warn};
use tree_sitter::{Node, Parser};

use crate::error::{CodeloopError, Result};

/// Call targets that fail validation whenever they appear as the terminal
/// identifier of a call, whether direct (`system(...)`) or attribute-style
/// (`os.system(...)`).
const TERMINAL_BLACKLIST: &[&str] = &[
    // process spawning / shell execution
    "system", "popen", "Popen", "spawn", "run", "call", "check_call", "check_output",
    // dynamic evaluation of code strings
    "eval", "exec",
    // recursive deletion
    "rmtree",
    // dynamic import
    "__import__", "import_module",
];

/// Call targets that are only dangerous under a specific base object.
/// `loads` alone would condemn `json.loads`, so these match on the
/// `base.attr` pair.
const QUALIFIED_BLACKLIST: &[(&str, &str)] = &[
    ("pickle", "load"),
    ("pickle", "loads"),
    ("marshal", "load"),
    ("marshal", "loads"),
];

/// Modules whose import alone is worth a warning but not a failure.
const SENSITIVE_IMPORTS: &[&str] = &[
    "os", "sys", "subprocess", "shutil", "pickle", "marshal", "tempfile", "socket",
];

/// Configuration for the safety scan.
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    /// Environment variable the generated code is expected to read its
    /// credential from. Drives the (non-fatal) credential-lookup heuristic.
    pub credential_env: String,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            credential_env: "API_KEY".to_string(),
        }
    }
}

/// Validate that `source` contains no blacklisted call expression.
///
/// Returns `CodeloopError::Parse` when the source does not parse as Python
/// (the model produced garbage, a different failure class than danger), and
/// `CodeloopError::Safety` the instant a blacklisted call is found.
pub fn validate(source: &str, config: &SafetyConfig) -> Result<()> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| CodeloopError::Parse(format!("failed to load Python grammar: {}", e)))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| CodeloopError::Parse("parser produced no syntax tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(CodeloopError::Parse(describe_syntax_error(root)));
    }

    scan_node(root, source)?;

    check_credential_lookup(source, &config.credential_env);
    debug!("safety scan passed ({} bytes)", source.len());
    Ok(())
}

/// Recursively scan the tree, failing on the first blacklisted call.
fn scan_node(node: Node, source: &str) -> Result<()> {
    match node.kind() {
        "call" => {
            if let Some(function) = node.child_by_field_name("function") {
                check_call_target(function, source)?;
            }
        }
        "import_statement" | "import_from_statement" => {
            warn_sensitive_import(node, source);
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        scan_node(child, source)?;
    }
    Ok(())
}

/// Check the function position of a call expression against the blacklists.
fn check_call_target(function: Node, source: &str) -> Result<()> {
    let (base, terminal) = match function.kind() {
        "identifier" => (None, node_text(function, source)),
        "attribute" => {
            let terminal = function
                .child_by_field_name("attribute")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            let base = function
                .child_by_field_name("object")
                .filter(|n| n.kind() == "identifier")
                .map(|n| node_text(n, source));
            (base, terminal)
        }
        // Calls through subscripts, lambdas, nested calls: nothing to match
        // on; their inner expressions are scanned on their own.
        _ => return Ok(()),
    };

    if TERMINAL_BLACKLIST.contains(&terminal.as_str()) {
        let full = match &base {
            Some(b) => format!("{}.{}", b, terminal),
            None => terminal.clone(),
        };
        return Err(CodeloopError::Safety(format!(
            "blacklisted call expression: {}(...)",
            full
        )));
    }

    if let Some(base) = base
        && QUALIFIED_BLACKLIST.contains(&(base.as_str(), terminal.as_str()))
    {
        return Err(CodeloopError::Safety(format!(
            "blacklisted call expression: {}.{}(...)",
            base, terminal
        )));
    }

    Ok(())
}

/// Warn (never fail) on imports of sensitive modules.
fn warn_sensitive_import(node: Node, source: &str) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let module = match child.kind() {
            "dotted_name" => node_text(child, source),
            "aliased_import" => child
                .child_by_field_name("name")
                .map(|n| node_text(n, source))
                .unwrap_or_default(),
            _ => continue,
        };

        // Match on the root of the dotted path: `os.path` counts as `os`.
        let root = module.split('.').next().unwrap_or("");
        if SENSITIVE_IMPORTS.contains(&root) {
            warn!("generated code imports sensitive module: {}", module);
        }
    }
}

/// Informational heuristic: flag code that never looks up the expected
/// credential variable. Never blocks.
fn check_credential_lookup(source: &str, credential_env: &str) {
    let reads_env = source.contains("os.environ") || source.contains("os.getenv");
    if !reads_env || !source.contains(credential_env) {
        warn!(
            "no recognizable lookup of {} found in generated code",
            credential_env
        );
    }
}

/// Locate the first syntax error for a readable parse diagnostic.
fn describe_syntax_error(root: Node) -> String {
    if let Some(err) = first_error_node(root) {
        let pos = err.start_position();
        format!(
            "Python syntax error at line {}, column {}",
            pos.row + 1,
            pos.column + 1
        )
    } else {
        "Python syntax error".to_string()
    }
}

fn first_error_node(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error()
            && let Some(found) = first_error_node(child)
        {
            return Some(found);
        }
    }
    None
}

fn node_text(node: Node, source: &str) -> String {
    node.utf8_text(source.as_bytes()).unwrap_or("").to_string()
}
