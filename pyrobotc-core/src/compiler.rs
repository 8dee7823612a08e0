use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::frontend::Frontend;
use crate::lower::{PrepareContext, prepare_module};
use crate::options::CompilerOptions;
use crate::registry::Registry;
use crate::render::{Renderer, include_name};
use crate::retag::retag_module;
use crate::span::Span;

const SOURCE_EXTENSION: &str = "py";

/// Every unit reached from the entry file, keyed by canonical path.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CompilationOutput {
    pub units: BTreeMap<PathBuf, String>,
    pub diagnostics: Vec<Diagnostic>,
    /// Leading statements of units whose rendering hit a fatal error.
    pub partial: BTreeMap<PathBuf, String>,
    /// Units that were still being compiled when the run stopped.
    pub unfinished: Vec<PathBuf>,
}

impl CompilationOutput {
    /// False when any statement was dropped or any unit never finished.
    pub fn is_complete(&self) -> bool {
        self.unfinished.is_empty()
            && self.partial.is_empty()
            && !self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// A fatal error together with whatever was rendered before it.
#[derive(Debug, Error)]
#[error("translation aborted: {error}")]
pub struct CompilationFailure {
    #[source]
    pub error: CoreError,
    pub partial: CompilationOutput,
}

#[derive(Debug)]
enum UnitState {
    InProgress,
    Partial(String),
    Rendered(String),
}

/// Compile `entry` and everything it imports with fresh registries.
pub fn compile_program<F: Frontend>(
    entry: impl AsRef<Path>,
    frontend: F,
    options: CompilerOptions,
) -> Result<CompilationOutput, CompilationFailure> {
    let mut compiler = Compiler::new(frontend, options);
    match compiler.compile_entry(entry) {
        Ok(_) => Ok(compiler.into_output()),
        Err(error) => Err(CompilationFailure {
            error,
            partial: compiler.into_output(),
        }),
    }
}

/// `a.b` -> `a/b.py`.
pub fn module_file(module: &str) -> PathBuf {
    PathBuf::from(format!("{}.{SOURCE_EXTENSION}", include_name(module)))
}

pub struct Compiler<F: Frontend> {
    frontend: F,
    options: CompilerOptions,
    tool_dir: Option<PathBuf>,
    entry_dir: Option<PathBuf>,
    registry: Registry,
    cache: BTreeMap<PathBuf, UnitState>,
    diagnostics: Vec<Diagnostic>,
    /// Units currently being compiled, innermost last.
    stack: Vec<PathBuf>,
}

impl<F: Frontend> Compiler<F> {
    pub fn new(frontend: F, options: CompilerOptions) -> Self {
        let tool_dir = options.resolved_tool_dir();
        Compiler {
            frontend,
            options,
            tool_dir,
            entry_dir: None,
            registry: Registry::new(),
            cache: BTreeMap::new(),
            diagnostics: Vec::new(),
            stack: Vec::new(),
        }
    }

    /// Compile the run's entry file; its directory becomes the last place
    /// imports are looked up.
    pub fn compile_entry(&mut self, entry: impl AsRef<Path>) -> Result<PathBuf, CoreError> {
        let entry = entry.as_ref();
        let real = fs::canonicalize(entry).or_else(|_| std::path::absolute(entry))?;
        self.entry_dir = real.parent().map(Path::to_path_buf);
        self.compile(entry)
    }

    /// Compile one file unless it is already cached. Returns its canonical
    /// path, the key of its entry in the output.
    pub fn compile(&mut self, path: impl AsRef<Path>) -> Result<PathBuf, CoreError> {
        let resolved = self.resolve(path.as_ref())?;
        let canonical = fs::canonicalize(&resolved)?;
        if self.cache.contains_key(&canonical) {
            debug!(path = %canonical.display(), "unit already compiled");
            return Ok(canonical);
        }

        debug!(path = %canonical.display(), "compiling unit");
        self.cache.insert(canonical.clone(), UnitState::InProgress);
        self.stack.push(canonical.clone());
        let result = self.translate(&canonical);
        self.stack.pop();

        let text = result?;
        self.cache.insert(canonical.clone(), UnitState::Rendered(text));
        Ok(canonical)
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, CoreError> {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        let fallbacks = [self.tool_dir.as_ref(), self.entry_dir.as_ref()];
        for base in fallbacks.into_iter().flatten() {
            let candidate = base.join(path);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(CoreError::NotFound(path.to_path_buf()))
    }

    fn translate(&mut self, path: &Path) -> Result<String, CoreError> {
        let tree = self.frontend.parse(path)?;
        let mut module = retag_module(&tree)?;
        prepare_module(&mut module, self)?;

        let mut renderer = Renderer::new(&self.registry, &self.options.render);
        let rendered = renderer.render_module(&module);
        let partial = renderer.take_partial();
        let diagnostics = renderer.into_diagnostics();
        self.diagnostics
            .extend(diagnostics.into_iter().map(|diag| diag.with_path(path)));
        if let (Err(_), Some(text)) = (&rendered, partial) {
            self.cache.insert(path.to_path_buf(), UnitState::Partial(text));
        }
        rendered
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Rendered text of a finished unit.
    pub fn unit_text(&self, canonical: &Path) -> Option<&str> {
        match self.cache.get(canonical) {
            Some(UnitState::Rendered(text)) => Some(text),
            _ => None,
        }
    }

    pub fn into_output(self) -> CompilationOutput {
        let mut output = CompilationOutput {
            diagnostics: self.diagnostics,
            ..CompilationOutput::default()
        };
        for (path, state) in self.cache {
            match state {
                UnitState::Rendered(text) => {
                    output.units.insert(path, text);
                }
                UnitState::Partial(text) => {
                    output.partial.insert(path, text);
                }
                UnitState::InProgress => output.unfinished.push(path),
            }
        }
        output
    }
}

impl<F: Frontend> PrepareContext for Compiler<F> {
    fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    fn import_module(&mut self, module: &str, span: Span) -> Result<(), CoreError> {
        debug!(module, line = span.line, "following import");
        self.compile(module_file(module)).map(|_| ())
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        let diagnostic = match self.stack.last() {
            Some(path) => diagnostic.with_path(path.clone()),
            None => diagnostic,
        };
        warn!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::JsonFrontend;
    use serde_json::{Value, json};
    use std::cell::RefCell;

    struct CountingFrontend {
        parsed: RefCell<Vec<PathBuf>>,
    }

    impl CountingFrontend {
        fn new() -> Self {
            CountingFrontend {
                parsed: RefCell::new(Vec::new()),
            }
        }

        fn count(&self, file_name: &str) -> usize {
            self.parsed
                .borrow()
                .iter()
                .filter(|path| path.ends_with(file_name))
                .count()
        }
    }

    impl Frontend for CountingFrontend {
        fn parse(&self, path: &Path) -> Result<crate::generic::GenericNode, CoreError> {
            self.parsed.borrow_mut().push(path.to_path_buf());
            JsonFrontend.parse(path)
        }
    }

    fn module(body: Vec<Value>) -> Value {
        json!({"_type": "Module", "body": body})
    }

    fn import(name: &str) -> Value {
        json!({"_type": "Import", "names": [{"_type": "alias", "name": name, "asname": null}]})
    }

    fn name(id: &str) -> Value {
        json!({"_type": "Name", "id": id, "ctx": {"_type": "Load"}})
    }

    fn int(value: i64) -> Value {
        json!({"_type": "Constant", "value": value, "kind": null})
    }

    fn ann_assign(target: Value, ty: &str, value: Value) -> Value {
        json!({"_type": "AnnAssign", "target": target, "annotation": name(ty), "value": value, "simple": 1})
    }

    fn self_attr(attr: &str) -> Value {
        json!({"_type": "Attribute", "value": name("self"), "attr": attr, "ctx": {"_type": "Store"}})
    }

    fn method(method_name: &str, params: &[&str], body: Vec<Value>) -> Value {
        let args: Vec<Value> = params
            .iter()
            .map(|param| json!({"_type": "arg", "arg": param, "annotation": name("int")}))
            .collect();
        json!({
            "_type": "FunctionDef",
            "name": method_name,
            "args": {"_type": "arguments", "posonlyargs": [], "args": args, "vararg": null,
                     "kwonlyargs": [], "kw_defaults": [], "kwarg": null, "defaults": []},
            "body": body,
            "decorator_list": [],
            "returns": {"_type": "Constant", "value": null},
            "lineno": 2,
            "col_offset": 2,
        })
    }

    fn class(class_name: &str, body: Vec<Value>) -> Value {
        json!({"_type": "ClassDef", "name": class_name, "bases": [], "keywords": [],
               "body": body, "decorator_list": [], "lineno": 1, "col_offset": 0})
    }

    fn write(dir: &Path, relative: &str, tree: Value) -> PathBuf {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dirs");
        }
        fs::write(&path, tree.to_string()).expect("write tree");
        path
    }

    fn options(tool_dir: &Path) -> CompilerOptions {
        CompilerOptions {
            tool_dir: Some(tool_dir.to_path_buf()),
            ..CompilerOptions::default()
        }
    }

    #[test]
    fn compiles_shared_import_only_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tool dir");
        let entry = write(dir.path(), "main.py", module(vec![import("left"), import("right")]));
        write(dir.path(), "left.py", module(vec![import("common")]));
        write(dir.path(), "right.py", module(vec![import("common")]));
        write(dir.path(), "common.py", module(vec![]));

        let frontend = CountingFrontend::new();
        let output = compile_program(&entry, &frontend, options(tools.path())).expect("compile");
        assert_eq!(frontend.count("common.py"), 1);
        assert_eq!(output.units.len(), 4);
        assert!(output.is_complete());
        let main = &output.units[&fs::canonicalize(&entry).unwrap()];
        assert_eq!(main, "#include left.c\n#include right.c\n");
    }

    #[test]
    fn resolves_imports_next_to_entry_and_tool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tool dir");
        let entry = write(
            dir.path(),
            "robot/main.py",
            module(vec![import("lib.drive"), import("vexlib")]),
        );
        write(dir.path(), "robot/lib/drive.py", module(vec![]));
        write(tools.path(), "vexlib.py", module(vec![]));

        let output = compile_program(&entry, JsonFrontend, options(tools.path())).expect("compile");
        let keys: Vec<_> = output.units.keys().cloned().collect();
        assert!(keys.iter().any(|path| path.ends_with("robot/lib/drive.py")));
        assert!(keys.iter().any(|path| path.ends_with("vexlib.py")));
    }

    #[test]
    fn reports_unresolvable_import() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tool dir");
        let entry = write(dir.path(), "main.py", module(vec![import("nowhere.to_be_found")]));

        let failure = compile_program(&entry, JsonFrontend, options(tools.path())).unwrap_err();
        assert!(matches!(&failure.error, CoreError::NotFound(path) if path.ends_with("nowhere/to_be_found.py")));
        assert_eq!(failure.partial.unfinished.len(), 1);
        assert!(!failure.partial.is_complete());
    }

    #[test]
    fn constructor_lowering_sees_classes_from_imports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tool dir");
        write(
            dir.path(),
            "arm.py",
            module(vec![class(
                "Arm",
                vec![method("__init__", &["self", "port"], vec![ann_assign(self_attr("port"), "int", name("port"))])],
            )]),
        );
        let entry = write(
            dir.path(),
            "main.py",
            module(vec![
                import("arm"),
                ann_assign(
                    name("lift"),
                    "Arm",
                    json!({"_type": "Call", "func": name("Arm"), "args": [int(3)], "keywords": []}),
                ),
            ]),
        );

        let output = compile_program(&entry, JsonFrontend, options(tools.path())).expect("compile");
        let main = &output.units[&fs::canonicalize(&entry).unwrap()];
        assert_eq!(main, "#include arm.c\nArm lift;\nArm___init__(lift, 3);\n");
        let arm = &output.units[&fs::canonicalize(dir.path().join("arm.py")).unwrap()];
        assert!(arm.contains("typedef struct {\n  int port;\n} Arm;\n"));
        assert!(arm.contains("void Arm___init__(Arm self, int port) {\n  self.port = port;\n}\n"));
    }

    #[test]
    fn conflicting_field_types_abort_but_keep_partial_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tool dir");
        write(dir.path(), "helpers.py", module(vec![]));
        let entry = write(
            dir.path(),
            "main.py",
            module(vec![
                import("helpers"),
                class(
                    "Claw",
                    vec![
                        method("__init__", &["self"], vec![ann_assign(self_attr("grip"), "int", int(0))]),
                        method("close", &["self"], vec![ann_assign(self_attr("grip"), "float", int(1))]),
                    ],
                ),
            ]),
        );

        let failure = compile_program(&entry, JsonFrontend, options(tools.path())).unwrap_err();
        assert!(matches!(failure.error, CoreError::FieldTypeConflict { .. }));
        assert_eq!(failure.partial.units.len(), 1);
        assert!(failure.partial.unfinished[0].ends_with("main.py"));
    }

    #[test]
    fn circular_imports_terminate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tool dir");
        let entry = write(dir.path(), "a.py", module(vec![import("b")]));
        write(dir.path(), "b.py", module(vec![import("a")]));

        let output = compile_program(&entry, JsonFrontend, options(tools.path())).expect("compile");
        assert_eq!(output.units.len(), 2);
        assert!(output.unfinished.is_empty());
    }

    #[test]
    fn dropped_statements_mark_output_partial() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tool dir");
        let entry = write(
            dir.path(),
            "main.py",
            module(vec![
                json!({"_type": "Try", "body": [], "handlers": [], "orelse": [], "finalbody": [],
                       "lineno": 3, "col_offset": 0}),
                json!({"_type": "Expr", "value": {"_type": "Call", "func": name("stopAllTasks"),
                       "args": [], "keywords": []}}),
            ]),
        );

        let output = compile_program(&entry, JsonFrontend, options(tools.path())).expect("compile");
        assert!(!output.is_complete());
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].span, Span::new(3, 0));
        assert!(output.diagnostics[0].path.as_deref().is_some_and(|p| p.ends_with("main.py")));
        let main = output.units.values().next().unwrap();
        assert_eq!(main, "stopAllTasks();\n");
    }

    #[test]
    fn second_compile_of_same_file_is_a_cache_hit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tool dir");
        let entry = write(dir.path(), "main.py", module(vec![class("Lift", vec![])]));

        let frontend = CountingFrontend::new();
        let mut compiler = Compiler::new(&frontend, options(tools.path()));
        let first = compiler.compile_entry(&entry).expect("compile");
        let second = compiler.compile(&entry).expect("compile again");
        assert_eq!(first, second);
        assert_eq!(frontend.count("main.py"), 1);
        assert!(compiler.registry().is_class("Lift"));
        assert!(compiler.diagnostics().is_empty());
        assert_eq!(
            compiler.unit_text(&first),
            Some("/*** Class: Lift ***/\ntypedef struct {\n} Lift;\n\n/*** End Class: Lift ***/\n")
        );
    }

    #[test]
    fn fatal_render_error_keeps_statements_rendered_before_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tool dir");
        let call = |func: &str, args: Vec<Value>| {
            json!({"_type": "Expr", "value": {"_type": "Call", "func": name(func),
                   "args": args, "keywords": []}})
        };
        let entry = write(
            dir.path(),
            "main.py",
            module(vec![
                call("stopAllTasks", vec![]),
                call("writeDebugStream", vec![json!({"_type": "Constant", "value": "\u{263A}"})]),
            ]),
        );

        let failure = compile_program(&entry, JsonFrontend, options(tools.path())).unwrap_err();
        assert!(matches!(failure.error, CoreError::EncodingRange { codepoint: 0x263A }));
        let output = failure.partial;
        assert!(output.units.is_empty());
        assert!(output.unfinished.is_empty());
        assert_eq!(output.partial[&fs::canonicalize(&entry).unwrap()], "stopAllTasks();\n");
        assert!(!output.is_complete());
    }

    #[test]
    fn equivalent_spellings_of_a_path_share_one_unit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tool dir");
        fs::create_dir_all(dir.path().join("sub")).expect("create sub");
        write(dir.path(), "main.py", module(vec![import("helper")]));
        write(dir.path(), "helper.py", module(vec![import("main")]));

        let frontend = CountingFrontend::new();
        let entry = dir.path().join("sub").join("..").join("main.py");
        let output = compile_program(&entry, &frontend, options(tools.path())).expect("compile");
        assert_eq!(output.units.len(), 2);
        assert_eq!(frontend.count("main.py"), 1);
        assert!(output.units.contains_key(&fs::canonicalize(dir.path().join("main.py")).unwrap()));
    }

    #[test]
    fn maps_dotted_modules_to_files() {
        assert_eq!(module_file("lib.drive.tank"), PathBuf::from("lib/drive/tank.py"));
    }
}
