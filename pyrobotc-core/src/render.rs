//! Syntax-directed rendering of the tagged tree into target code.
//!
//! Expressions render to a single string. Statements inside a body are
//! rendered one at a time; a statement that fails with a recoverable error
//! is dropped, reported as a diagnostic, and the next sibling is rendered.
//! Fatal errors stop the unit; the top-level statements rendered before
//! the failure stay available through `Renderer::take_partial`.
//!
//! The renderer expects the module to have been through
//! `lower::prepare_module`: parameter defaults, struct fields, receiver
//! types and constructor names all come from that pass.

use tracing::warn;

use crate::ast::{ClassDef, Expr, FunctionDef, Module, Stmt, StmtKind};
use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::escape::escape;
use crate::intrinsics::find_intrinsic;
use crate::lower::CONSTRUCTOR_SUFFIX;
use crate::options::RenderOptions;
use crate::registry::Registry;

const RANGE_CALL: &str = "range";

pub struct Renderer<'a> {
    registry: &'a Registry,
    options: &'a RenderOptions,
    diagnostics: Vec<Diagnostic>,
    /// Module text rendered before a fatal error.
    partial: Option<String>,
}

impl<'a> Renderer<'a> {
    pub fn new(registry: &'a Registry, options: &'a RenderOptions) -> Self {
        Renderer {
            registry,
            options,
            diagnostics: Vec::new(),
            partial: None,
        }
    }

    /// After `render_module` failed: the leading statements that did render.
    pub fn take_partial(&mut self) -> Option<String> {
        self.partial.take()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn render_module(&mut self, module: &Module) -> Result<String, CoreError> {
        let (doc, body) = split_docstring(&module.body);
        let mut out = String::new();
        if let Some(doc) = doc {
            out.push_str(&block_comment(&doc));
        }
        match self.render_top_level(body) {
            Ok(text) => {
                out.push_str(&text);
                Ok(out)
            }
            Err(err) => {
                out.push_str(&self.partial.take().unwrap_or_default());
                self.partial = Some(out);
                Err(err)
            }
        }
    }

    pub fn render_stmt(&mut self, stmt: &Stmt) -> Result<String, CoreError> {
        match &stmt.kind {
            StmtKind::FunctionDef(function) => self.render_function(function),
            StmtKind::ClassDef(class) => self.render_class(class),
            StmtKind::Assign { targets, value } => {
                let mut out = String::new();
                for target in targets {
                    out.push_str(&self.render_expr(target)?);
                    out.push_str(" = ");
                }
                out.push_str(&self.render_expr(value)?);
                Ok(out)
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => self.render_declaration(target, annotation, value.as_ref()),
            StmtKind::AugAssign { target, op, value } => Ok(format!(
                "{} {}= {}",
                self.render_expr(target)?,
                op.symbol(),
                self.render_expr(value)?
            )),
            StmtKind::Assert { test } => Ok(format!("VERIFY({})", self.render_expr(test)?)),
            StmtKind::Pass => Ok(String::new()),
            StmtKind::Import { modules } => Ok(modules
                .iter()
                .map(|module| format!("#include {}.c\n", include_name(module)))
                .collect()),
            StmtKind::If { test, body, orelse } => {
                let mut out = format!("if ({})", self.render_expr(test)?);
                out.push_str(self.options.open_brace());
                out.push_str(&self.render_block(body)?);
                out.push('}');
                if !orelse.is_empty() {
                    out.push_str(self.options.else_separator());
                    out.push_str(&self.render_block(orelse)?);
                    out.push('}');
                }
                Ok(out)
            }
            StmtKind::For { target, iter, body } => {
                let (start, stop, step) = self.range_bounds(iter)?;
                let var = self.render_expr(target)?;
                let mut out =
                    format!("for ({var} = {start}; {var} < {stop}; {var} += {step})");
                out.push_str(self.options.open_brace());
                out.push_str(&self.render_block(body)?);
                out.push('}');
                Ok(out)
            }
            StmtKind::While { test, body } => {
                let mut out = format!("while ({})", self.render_expr(test)?);
                out.push_str(self.options.open_brace());
                out.push_str(&self.render_block(body)?);
                out.push('}');
                Ok(out)
            }
            StmtKind::Break => Ok("break".to_string()),
            StmtKind::Continue => Ok("continue".to_string()),
            StmtKind::Return { value: Some(value) } => {
                Ok(format!("return {}", self.render_expr(value)?))
            }
            StmtKind::Return { value: None } => Ok("return".to_string()),
            StmtKind::Expr(expr) => self.render_expr(expr),
            StmtKind::Unsupported { kind, reason } => {
                Err(CoreError::Unsupported(format!("{kind}: {reason}")))
            }
        }
    }

    pub fn render_expr(&self, expr: &Expr) -> Result<String, CoreError> {
        match expr {
            Expr::Name(id) => Ok(match id.as_str() {
                "True" => "true".to_string(),
                "False" => "false".to_string(),
                "None" => "0".to_string(),
                _ => id.clone(),
            }),
            Expr::Str(text) => escape(text, false, self.options.max_line_length),
            Expr::Bytes(text) => escape(text, true, self.options.max_line_length),
            Expr::Num(text) => Ok(text.clone()),
            Expr::Bool(true) => Ok("true".to_string()),
            Expr::Bool(false) => Ok("false".to_string()),
            Expr::NoneLit => Ok("0".to_string()),
            Expr::Unary { op, operand } => {
                Ok(format!("{}{}", op.symbol(), self.render_expr(operand)?))
            }
            Expr::Binary { left, op, right } => Ok(format!(
                "({} {} {})",
                self.render_expr(left)?,
                op.symbol(),
                self.render_expr(right)?
            )),
            Expr::BoolChain { op, values } => {
                let Some((first, rest)) = values.split_first() else {
                    return Err(CoreError::Render("empty boolean chain".to_string()));
                };
                let mut out = self.render_expr(first)?;
                for value in rest {
                    out = format!("({out} {} {})", op.symbol(), self.render_expr(value)?);
                }
                Ok(out)
            }
            Expr::Compare {
                left,
                ops,
                comparators,
            } => {
                let mut operands = Vec::with_capacity(comparators.len() + 1);
                operands.push(self.render_expr(left)?);
                for comparator in comparators {
                    operands.push(self.render_expr(comparator)?);
                }
                let steps: Vec<String> = ops
                    .iter()
                    .zip(operands.windows(2))
                    .map(|(op, pair)| format!("({} {} {})", pair[0], op.symbol(), pair[1]))
                    .collect();
                match steps.as_slice() {
                    [] => Err(CoreError::Render("empty comparison".to_string())),
                    [single] => Ok(single.clone()),
                    _ => Ok(format!("({})", steps.join(" && "))),
                }
            }
            Expr::IfExp { test, body, orelse } => Ok(format!(
                "({} ? {} : {})",
                self.render_expr(test)?,
                self.render_expr(body)?,
                self.render_expr(orelse)?
            )),
            Expr::Attribute { value, attr } => Ok(format!("{}.{attr}", self.render_expr(value)?)),
            Expr::Subscript { value, index } => Ok(format!(
                "{}[{}]",
                self.render_expr(value)?,
                self.render_expr(index)?
            )),
            Expr::Call { func, args } => self.render_call(func, args),
            Expr::Unsupported { kind, reason } => {
                Err(CoreError::Unsupported(format!("{kind}: {reason}")))
            }
        }
    }

    fn render_call(&self, func: &Expr, args: &[Expr]) -> Result<String, CoreError> {
        if let Some(intrinsic) = func.dotted_name().as_deref().and_then(find_intrinsic) {
            return intrinsic.lower(args, |arg| self.render_expr(arg));
        }
        let mut rendered = Vec::with_capacity(args.len() + 1);
        // `recv.method(args)` becomes `method(recv, args)`.
        let callee = match func {
            Expr::Attribute { value, attr } => {
                rendered.push(self.render_expr(value)?);
                attr.clone()
            }
            other => self.render_expr(other)?,
        };
        for arg in args {
            rendered.push(self.render_expr(arg)?);
        }
        Ok(format!("{callee}({})", rendered.join(", ")))
    }

    fn render_declaration(
        &self,
        target: &Expr,
        annotation: &Expr,
        value: Option<&Expr>,
    ) -> Result<String, CoreError> {
        let ty = type_text(annotation)?;
        let target = self.render_expr(target)?;
        match value {
            Some(Expr::Call { func, args }) => {
                let class = func.dotted_name().filter(|name| self.registry.is_class(name));
                match class {
                    Some(class) => {
                        let mut out = format!("{ty} {target};\n{class}{CONSTRUCTOR_SUFFIX}({target}");
                        for arg in args {
                            out.push_str(", ");
                            out.push_str(&self.render_expr(arg)?);
                        }
                        out.push(')');
                        Ok(out)
                    }
                    None => Ok(format!("{ty} {target} = {}", self.render_call(func, args)?)),
                }
            }
            Some(value) => Ok(format!("{ty} {target} = {}", self.render_expr(value)?)),
            None => Ok(format!("{ty} {target}")),
        }
    }

    fn range_bounds(&self, iter: &Expr) -> Result<(String, String, String), CoreError> {
        let args = match iter {
            Expr::Call { args, .. } if iter.is_call_to(RANGE_CALL) => args,
            _ => {
                return Err(CoreError::Unsupported(
                    "for loops may only iterate over range(...)".to_string(),
                ));
            }
        };
        let rendered = args
            .iter()
            .map(|arg| self.render_expr(arg))
            .collect::<Result<Vec<_>, _>>()?;
        match rendered.as_slice() {
            [stop] => Ok(("0".to_string(), stop.clone(), "1".to_string())),
            [start, stop] => Ok((start.clone(), stop.clone(), "1".to_string())),
            [start, stop, step] => Ok((start.clone(), stop.clone(), step.clone())),
            _ => Err(CoreError::Unsupported(format!(
                "range() takes 1 to 3 arguments, found {}",
                rendered.len()
            ))),
        }
    }

    fn render_function(&mut self, function: &FunctionDef) -> Result<String, CoreError> {
        let (doc, body) = split_docstring(&function.body);
        let returns = function.returns.as_ref().ok_or_else(|| {
            CoreError::Render(format!("function {} has no return type annotation", function.name))
        })?;

        let mut params = Vec::with_capacity(function.params.len());
        for (index, param) in function.params.iter().enumerate() {
            let annotation = param.annotation.as_ref().ok_or_else(|| {
                CoreError::Render(format!(
                    "parameter {} of {} has no type annotation",
                    param.name, function.name
                ))
            })?;
            let mut text = format!("{} {}", type_text(annotation)?, param.name);
            if let Some(default) = function.default_for(index) {
                text.push_str(" = ");
                text.push_str(&self.render_expr(default)?);
            }
            params.push(text);
        }

        let mut out = String::from("\n");
        if let Some(doc) = doc {
            out.push_str(&block_comment(&doc));
        }
        out.push_str(&format!(
            "{} {}({})",
            type_text(returns)?,
            function.name,
            params.join(", ")
        ));
        out.push_str(self.options.open_brace());
        out.push_str(&self.render_block(body)?);
        out.push_str("}\n");
        Ok(out)
    }

    fn render_class(&mut self, class: &ClassDef) -> Result<String, CoreError> {
        let (doc, body) = split_docstring(&class.body);
        let mut out = format!("/*** Class: {} ***/\n", class.name);
        if let Some(doc) = doc {
            out.push_str(&block_comment(&doc));
        }
        out.push_str("typedef struct");
        out.push_str(self.options.open_brace());
        for field in &class.fields {
            out.push_str(&format!("{}{} {};\n", self.options.indent, field.ty, field.name));
        }
        out.push_str(&format!("}} {};\n", class.name));
        out.push_str(&self.render_top_level(body)?);
        out.push_str(&format!("\n/*** End Class: {} ***/\n", class.name));
        Ok(out)
    }

    /// Module and class bodies: statements stay at column zero.
    fn render_top_level(&mut self, body: &[Stmt]) -> Result<String, CoreError> {
        let mut out = String::new();
        for stmt in body {
            let text = match self.render_stmt(stmt) {
                Ok(text) => text,
                Err(err) => {
                    if let Err(fatal) = self.recover(stmt, err) {
                        // Outer bodies overwrite the half-rendered inner ones.
                        self.partial = Some(out);
                        return Err(fatal);
                    }
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }
            out.push_str(&text);
            if text.ends_with('}') {
                out.push('\n');
            } else if !text.ends_with('\n') {
                out.push_str(";\n");
            }
        }
        Ok(out)
    }

    /// Function and control-flow bodies: one indentation level deeper.
    fn render_block(&mut self, body: &[Stmt]) -> Result<String, CoreError> {
        let mut out = String::new();
        for stmt in body {
            match self.render_stmt(stmt) {
                Ok(text) => self.push_indented(&mut out, &text),
                Err(err) => self.recover(stmt, err)?,
            }
        }
        Ok(out)
    }

    fn push_indented(&self, out: &mut String, text: &str) {
        // Directives end with their own newline and take no terminator.
        let (text, terminated) = match text.strip_suffix('\n') {
            Some(stripped) => (stripped, true),
            None => (text, text.ends_with('}')),
        };
        let lines: Vec<&str> = text.split('\n').collect();
        let last = lines.len() - 1;
        let mut continued = false;
        for (index, line) in lines.iter().enumerate() {
            // Lines after a backslash continuation are still inside a literal.
            let indent = !continued && (!line.is_empty() || (index == last && !terminated));
            if indent {
                out.push_str(&self.options.indent);
            }
            continued = line.ends_with('\\');
            out.push_str(line);
            if index != last {
                out.push('\n');
            }
        }
        if !terminated {
            out.push(';');
        }
        out.push('\n');
    }

    fn recover(&mut self, stmt: &Stmt, err: CoreError) -> Result<(), CoreError> {
        if err.is_fatal() {
            return Err(err);
        }
        warn!(line = stmt.span.line, column = stmt.span.column, "statement skipped: {err}");
        self.diagnostics
            .push(Diagnostic::error(format!("statement skipped: {err}"), stmt.span));
        Ok(())
    }
}

/// Target-language spelling of a type annotation.
pub fn type_text(annotation: &Expr) -> Result<String, CoreError> {
    match annotation {
        Expr::NoneLit => Ok("void".to_string()),
        Expr::Name(id) if id == "None" => Ok("void".to_string()),
        // Quoted forward references are spelled out verbatim.
        Expr::Str(text) => Ok(text.clone()),
        other => other.dotted_name().ok_or_else(|| {
            CoreError::Unsupported("type annotations must be plain or dotted names".to_string())
        }),
    }
}

/// `a.b` -> `a/b`, shared by `#include` lines and import resolution.
pub fn include_name(module: &str) -> String {
    module.split('.').collect::<Vec<_>>().join("/")
}

fn split_docstring(body: &[Stmt]) -> (Option<String>, &[Stmt]) {
    match body.split_first() {
        Some((first, rest)) => match first.docstring() {
            Some(doc) => (Some(clean_docstring(doc)), rest),
            None => (None, body),
        },
        None => (None, body),
    }
}

fn block_comment(doc: &str) -> String {
    format!("/*\n{}\n*/\n", doc.replace("*/", "* /"))
}

/// Same normalization as Python's `inspect.cleandoc`.
fn clean_docstring(doc: &str) -> String {
    let expanded = doc.replace('\t', "        ");
    let lines: Vec<&str> = expanded.split('\n').collect();
    let margin = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim_start().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<&str> = Vec::with_capacity(lines.len());
    if let Some(first) = lines.first() {
        cleaned.push(first.trim_start());
    }
    for line in lines.iter().skip(1) {
        cleaned.push(line.get(margin..).unwrap_or("").trim_end());
    }
    while cleaned.first().is_some_and(|line| line.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|line| line.trim().is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}
