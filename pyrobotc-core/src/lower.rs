//! Preparation walk and class lowering.
//!
//! Runs once per unit, after conversion and before rendering. The walk
//! visits every statement in every nested scope and
//!
//! - records class names and function return types in the `Registry`,
//! - computes each function's required parameter count,
//! - lowers classes: methods get an explicit receiver type, the
//!   constructor is renamed, annotated `self.<field>` assignments become
//!   struct fields plus plain assignments,
//! - compiles imported units through the `PrepareContext`.
//!
//! Imports are compiled as soon as the walk reaches them, so every unit a
//! file depends on has registered its classes before the file is rendered.

use tracing::warn;

use crate::ast::{ClassDef, Expr, Field, FunctionDef, Module, Stmt, StmtKind};
use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::registry::Registry;
use crate::render::type_text;
use crate::span::Span;

/// Appended to a class name to form its constructor function.
pub const CONSTRUCTOR_SUFFIX: &str = "___init__";

const CONSTRUCTOR_NAME: &str = "__init__";

pub trait PrepareContext {
    fn registry_mut(&mut self) -> &mut Registry;

    /// Compile the unit behind a dotted module path.
    fn import_module(&mut self, module: &str, span: Span) -> Result<(), CoreError>;

    fn report(&mut self, diagnostic: Diagnostic);
}

/// Standalone preparation: imports are not followed.
impl PrepareContext for Registry {
    fn registry_mut(&mut self) -> &mut Registry {
        self
    }

    fn import_module(&mut self, _module: &str, _span: Span) -> Result<(), CoreError> {
        Ok(())
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        warn!("{diagnostic}");
    }
}

pub fn prepare_module<C: PrepareContext + ?Sized>(
    module: &mut Module,
    cx: &mut C,
) -> Result<(), CoreError> {
    prepare_body(&mut module.body, None, cx)
}

fn prepare_body<C: PrepareContext + ?Sized>(
    body: &mut [Stmt],
    class: Option<&str>,
    cx: &mut C,
) -> Result<(), CoreError> {
    for stmt in body {
        prepare_stmt(stmt, class, cx)?;
    }
    Ok(())
}

fn prepare_stmt<C: PrepareContext + ?Sized>(
    stmt: &mut Stmt,
    class: Option<&str>,
    cx: &mut C,
) -> Result<(), CoreError> {
    let span = stmt.span;
    match &mut stmt.kind {
        StmtKind::Import { modules } => {
            for module in modules.iter() {
                cx.import_module(module, span)?;
            }
        }
        StmtKind::FunctionDef(function) => {
            if let Some(class) = class {
                lower_method(function, class, span, cx);
            }
            prepare_function(function, span, cx);
            prepare_body(&mut function.body, None, cx)?;
        }
        StmtKind::ClassDef(class_def) => {
            cx.registry_mut().register_class(&class_def.name);
            let name = class_def.name.clone();
            prepare_body(&mut class_def.body, Some(&name), cx)?;
            class_def.fields = collect_fields(class_def, cx)?;
        }
        StmtKind::If { body, orelse, .. } => {
            prepare_body(body, class, cx)?;
            prepare_body(orelse, class, cx)?;
        }
        StmtKind::For { body, .. } | StmtKind::While { body, .. } => {
            prepare_body(body, class, cx)?;
        }
        _ => {}
    }
    Ok(())
}

fn prepare_function<C: PrepareContext + ?Sized>(function: &mut FunctionDef, span: Span, cx: &mut C) {
    function.required = function.params.len().saturating_sub(function.defaults.len());
    if let Some(returns) = &function.returns {
        match type_text(returns) {
            Ok(ty) => cx.registry_mut().register_function(&function.name, ty),
            Err(err) => cx.report(Diagnostic::warning(
                format!("return type of {} not recorded: {err}", function.name),
                span,
            )),
        }
    }
}

fn lower_method<C: PrepareContext + ?Sized>(
    function: &mut FunctionDef,
    class: &str,
    span: Span,
    cx: &mut C,
) {
    if function.name == CONSTRUCTOR_NAME {
        function.name = format!("{class}{CONSTRUCTOR_SUFFIX}");
    }
    match function.params.first_mut() {
        Some(receiver) => receiver.annotation = Some(Expr::name(class)),
        None => cx.report(Diagnostic::warning(
            format!("method {} of class {class} has no receiver parameter", function.name),
            span,
        )),
    }
}

/// Collect the struct fields of a class and turn every annotated
/// `self.<field>` assignment into a plain assignment.
fn collect_fields<C: PrepareContext + ?Sized>(
    class: &mut ClassDef,
    cx: &mut C,
) -> Result<Vec<Field>, CoreError> {
    let mut fields = Vec::new();
    scan_fields(&class.name, &mut class.body, &mut fields, cx)?;
    Ok(fields)
}

fn scan_fields<C: PrepareContext + ?Sized>(
    class: &str,
    body: &mut [Stmt],
    fields: &mut Vec<Field>,
    cx: &mut C,
) -> Result<(), CoreError> {
    for stmt in body {
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                let Some(field) = target.self_attribute().map(str::to_string) else {
                    continue;
                };
                let ty = match type_text(annotation) {
                    Ok(ty) => ty,
                    Err(err) => {
                        cx.report(Diagnostic::warning(
                            format!("field {class}.{field} not collected: {err}"),
                            span,
                        ));
                        continue;
                    }
                };
                match fields.iter().position(|known| known.name == field) {
                    Some(index) if fields[index].ty != ty => {
                        return Err(CoreError::FieldTypeConflict {
                            class: class.to_string(),
                            field,
                            existing: fields[index].ty.clone(),
                            conflicting: ty,
                        });
                    }
                    Some(_) => {}
                    None => fields.push(Field { name: field, ty }),
                }
                stmt.kind = match value.take() {
                    Some(value) => StmtKind::Assign {
                        targets: vec![target.clone()],
                        value,
                    },
                    None => StmtKind::Pass,
                };
            }
            StmtKind::FunctionDef(function) => scan_fields(class, &mut function.body, fields, cx)?,
            StmtKind::If { body, orelse, .. } => {
                scan_fields(class, body, fields, cx)?;
                scan_fields(class, orelse, fields, cx)?;
            }
            StmtKind::For { body, .. } | StmtKind::While { body, .. } => {
                scan_fields(class, body, fields, cx)?;
            }
            _ => {}
        }
    }
    Ok(())
}
