//! Front-ends turn a source file into a generic tree.
//!
//! The translator itself never parses source text. `PythonFrontend` asks a
//! Python interpreter to run `ast.parse` and dump the result as JSON;
//! `JsonFrontend` expects the file to already contain such a dump.

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::error::CoreError;
use crate::generic::GenericNode;

pub trait Frontend {
    fn parse(&self, path: &Path) -> Result<GenericNode, CoreError>;
}

impl<F: Frontend + ?Sized> Frontend for &F {
    fn parse(&self, path: &Path) -> Result<GenericNode, CoreError> {
        (**self).parse(path)
    }
}

impl<F: Frontend + ?Sized> Frontend for Box<F> {
    fn parse(&self, path: &Path) -> Result<GenericNode, CoreError> {
        (**self).parse(path)
    }
}

/// Dumps any `ast.AST` as `{"_type": ..., <fields>, "lineno", "col_offset"}`.
const DUMP_SCRIPT: &str = r#"
import ast, json, sys

def conv(node):
    if isinstance(node, ast.AST):
        out = {"_type": type(node).__name__}
        for name, value in ast.iter_fields(node):
            out[name] = conv(value)
        for name in ("lineno", "col_offset"):
            if hasattr(node, name):
                out[name] = getattr(node, name)
        return out
    if isinstance(node, list):
        return [conv(item) for item in node]
    if isinstance(node, bytes):
        return {"_type": "bytes", "text": node.decode("utf-8", "replace")}
    if isinstance(node, complex) or node is Ellipsis:
        return {"_type": type(node).__name__}
    return node

with open(sys.argv[1], encoding="utf-8") as source:
    tree = ast.parse(source.read(), sys.argv[1])
sys.stdout.write(json.dumps(conv(tree)))
"#;

#[derive(Debug, Clone)]
pub struct PythonFrontend {
    interpreter: String,
}

impl PythonFrontend {
    pub fn new(interpreter: impl Into<String>) -> Self {
        PythonFrontend {
            interpreter: interpreter.into(),
        }
    }
}

impl Default for PythonFrontend {
    fn default() -> Self {
        PythonFrontend::new("python3")
    }
}

impl Frontend for PythonFrontend {
    fn parse(&self, path: &Path) -> Result<GenericNode, CoreError> {
        let output = Command::new(&self.interpreter)
            .arg("-c")
            .arg(DUMP_SCRIPT)
            .arg(path)
            .output()
            .map_err(|err| CoreError::Frontend {
                path: path.to_path_buf(),
                message: format!("could not run {}: {err}", self.interpreter),
            })?;
        if !output.status.success() {
            return Err(CoreError::Frontend {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let text = String::from_utf8_lossy(&output.stdout);
        GenericNode::from_json_str(&text)
    }
}

/// Reads a tree that was dumped ahead of time.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFrontend;

impl Frontend for JsonFrontend {
    fn parse(&self, path: &Path) -> Result<GenericNode, CoreError> {
        let text = fs::read_to_string(path)?;
        GenericNode::from_json_str(&text)
    }
}
