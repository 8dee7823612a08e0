//! Conversion of a generic tree into the tagged node model.
//!
//! Conversion never fails on an individual construct: shapes outside the
//! supported set become `Unsupported` nodes that carry the reason, and the
//! renderer reports them when it reaches them. Only a root that is not a
//! module is rejected outright.

use crate::ast::{
    BinaryOp, BoolOp, ClassDef, CompareOp, Expr, FunctionDef, Module, Param, Stmt, StmtKind,
    UnaryOp,
};
use crate::error::CoreError;
use crate::generic::{GenericNode, GenericValue};
use crate::span::Span;

pub fn retag_module(root: &GenericNode) -> Result<Module, CoreError> {
    if root.kind != "Module" {
        return Err(CoreError::MalformedTree(format!(
            "expected a Module at the root, found {}",
            root.kind
        )));
    }
    let body = root.list("body").map_err(CoreError::MalformedTree)?;
    Ok(Module {
        body: retag_body(body),
    })
}

fn retag_body(items: &[GenericValue]) -> Vec<Stmt> {
    items
        .iter()
        .map(|item| match item.as_node() {
            Some(node) => retag_stmt(node),
            None => Stmt::new(
                StmtKind::Unsupported {
                    kind: "<value>".to_string(),
                    reason: "statement list holds a bare value".to_string(),
                },
                Span::unknown(),
            ),
        })
        .collect()
}

pub fn retag_stmt(node: &GenericNode) -> Stmt {
    let kind = stmt_kind(node).unwrap_or_else(|reason| StmtKind::Unsupported {
        kind: node.kind.clone(),
        reason,
    });
    Stmt::new(kind, node.span)
}

fn stmt_kind(node: &GenericNode) -> Result<StmtKind, String> {
    Ok(match node.kind.as_str() {
        "FunctionDef" => StmtKind::FunctionDef(function_def(node)?),
        "ClassDef" => StmtKind::ClassDef(class_def(node)?),
        "Assign" => StmtKind::Assign {
            targets: expr_list(node.list("targets")?),
            value: retag_expr(node.node("value")?),
        },
        "AnnAssign" => StmtKind::AnnAssign {
            target: retag_expr(node.node("target")?),
            annotation: retag_expr(node.node("annotation")?),
            value: node.opt_node("value")?.map(retag_expr),
        },
        "AugAssign" => StmtKind::AugAssign {
            target: retag_expr(node.node("target")?),
            op: binary_op(node.node("op")?)?,
            value: retag_expr(node.node("value")?),
        },
        "Assert" => StmtKind::Assert {
            test: retag_expr(node.node("test")?),
        },
        "Pass" => StmtKind::Pass,
        "Import" => StmtKind::Import {
            modules: import_names(node)?,
        },
        "If" => StmtKind::If {
            test: retag_expr(node.node("test")?),
            body: retag_body(node.list("body")?),
            orelse: retag_body(node.list("orelse")?),
        },
        "For" => {
            if !node.list("orelse")?.is_empty() {
                return Err("for loops with an else clause are not supported".to_string());
            }
            StmtKind::For {
                target: retag_expr(node.node("target")?),
                iter: retag_expr(node.node("iter")?),
                body: retag_body(node.list("body")?),
            }
        }
        "While" => {
            if !node.list("orelse")?.is_empty() {
                return Err("while loops with an else clause are not supported".to_string());
            }
            StmtKind::While {
                test: retag_expr(node.node("test")?),
                body: retag_body(node.list("body")?),
            }
        }
        "Break" => StmtKind::Break,
        "Continue" => StmtKind::Continue,
        "Return" => StmtKind::Return {
            value: node.opt_node("value")?.map(retag_expr),
        },
        "Expr" => StmtKind::Expr(retag_expr(node.node("value")?)),
        other => return Err(format!("statement kind {other} is not supported")),
    })
}

fn function_def(node: &GenericNode) -> Result<FunctionDef, String> {
    if !node.list("decorator_list")?.is_empty() {
        return Err("decorators are not supported".to_string());
    }
    let arguments = node.node("args")?;
    if arguments.opt_node("vararg")?.is_some() || arguments.opt_node("kwarg")?.is_some() {
        return Err("variadic parameters are not supported".to_string());
    }
    if !arguments.list("kwonlyargs")?.is_empty() {
        return Err("keyword-only parameters are not supported".to_string());
    }
    let mut params = Vec::new();
    for item in arguments
        .list("posonlyargs")?
        .iter()
        .chain(arguments.list("args")?)
    {
        let arg = item
            .as_node()
            .ok_or_else(|| "parameter entry is not a node".to_string())?;
        params.push(Param {
            name: arg.string("arg")?.to_string(),
            annotation: arg.opt_node("annotation")?.map(retag_expr),
        });
    }
    Ok(FunctionDef {
        name: node.string("name")?.to_string(),
        params,
        defaults: expr_list(arguments.list("defaults")?),
        returns: node.opt_node("returns")?.map(retag_expr),
        body: retag_body(node.list("body")?),
        required: 0,
    })
}

fn class_def(node: &GenericNode) -> Result<ClassDef, String> {
    if !node.list("decorator_list")?.is_empty() {
        return Err("decorators are not supported".to_string());
    }
    if !node.list("keywords")?.is_empty() {
        return Err("class keywords are not supported".to_string());
    }
    for base in node.list("bases")? {
        let is_object = base
            .as_node()
            .is_some_and(|base| base.kind == "Name" && base.string("id") == Ok("object"));
        if !is_object {
            return Err("class inheritance is not supported".to_string());
        }
    }
    Ok(ClassDef {
        name: node.string("name")?.to_string(),
        body: retag_body(node.list("body")?),
        fields: Vec::new(),
    })
}

fn import_names(node: &GenericNode) -> Result<Vec<String>, String> {
    let mut modules = Vec::new();
    for item in node.list("names")? {
        let alias = item
            .as_node()
            .ok_or_else(|| "import entry is not a node".to_string())?;
        if matches!(alias.field("asname"), Some(GenericValue::Str(_))) {
            return Err("import aliases are not supported".to_string());
        }
        modules.push(alias.string("name")?.to_string());
    }
    if modules.is_empty() {
        return Err("import without module names".to_string());
    }
    Ok(modules)
}

fn expr_list(items: &[GenericValue]) -> Vec<Expr> {
    items.iter().map(retag_value).collect()
}

fn retag_value(value: &GenericValue) -> Expr {
    match value.as_node() {
        Some(node) => retag_expr(node),
        None => Expr::Unsupported {
            kind: "<value>".to_string(),
            reason: "expression slot holds a bare value".to_string(),
        },
    }
}

pub fn retag_expr(node: &GenericNode) -> Expr {
    expr_kind(node).unwrap_or_else(|reason| Expr::Unsupported {
        kind: node.kind.clone(),
        reason,
    })
}

fn expr_kind(node: &GenericNode) -> Result<Expr, String> {
    Ok(match node.kind.as_str() {
        "Name" => Expr::Name(node.string("id")?.to_string()),
        "Constant" | "NameConstant" => constant(node, node.field("value"))?,
        "Str" => constant(node, node.field("s"))?,
        "Bytes" => constant(node, node.field("s"))?,
        "Num" => constant(node, node.field("n"))?,
        "UnaryOp" => Expr::Unary {
            op: unary_op(node.node("op")?)?,
            operand: Box::new(retag_expr(node.node("operand")?)),
        },
        "BinOp" => Expr::Binary {
            left: Box::new(retag_expr(node.node("left")?)),
            op: binary_op(node.node("op")?)?,
            right: Box::new(retag_expr(node.node("right")?)),
        },
        "BoolOp" => {
            let op = match node.node("op")?.kind.as_str() {
                "And" => BoolOp::And,
                "Or" => BoolOp::Or,
                other => return Err(format!("boolean operator {other} is not supported")),
            };
            let values = expr_list(node.list("values")?);
            if values.len() < 2 {
                return Err("boolean chain needs at least two operands".to_string());
            }
            Expr::BoolChain { op, values }
        }
        "Compare" => {
            let ops = node
                .list("ops")?
                .iter()
                .map(|op| {
                    op.as_node()
                        .ok_or_else(|| "comparison operator is not a node".to_string())
                        .and_then(compare_op)
                })
                .collect::<Result<Vec<_>, _>>()?;
            let comparators = expr_list(node.list("comparators")?);
            if ops.is_empty() || ops.len() != comparators.len() {
                return Err("comparison operators and operands do not line up".to_string());
            }
            Expr::Compare {
                left: Box::new(retag_expr(node.node("left")?)),
                ops,
                comparators,
            }
        }
        "IfExp" => Expr::IfExp {
            test: Box::new(retag_expr(node.node("test")?)),
            body: Box::new(retag_expr(node.node("body")?)),
            orelse: Box::new(retag_expr(node.node("orelse")?)),
        },
        "Attribute" => Expr::Attribute {
            value: Box::new(retag_expr(node.node("value")?)),
            attr: node.string("attr")?.to_string(),
        },
        "Subscript" => {
            let slice = node.node("slice")?;
            let index = match slice.kind.as_str() {
                "Index" => retag_expr(slice.node("value")?),
                "Slice" | "ExtSlice" => return Err("slicing is not supported".to_string()),
                _ => retag_expr(slice),
            };
            Expr::Subscript {
                value: Box::new(retag_expr(node.node("value")?)),
                index: Box::new(index),
            }
        }
        "Index" => retag_expr(node.node("value")?),
        "Call" => {
            if !node.list("keywords")?.is_empty() {
                return Err("keyword arguments are not supported".to_string());
            }
            Expr::Call {
                func: Box::new(retag_expr(node.node("func")?)),
                args: expr_list(node.list("args")?),
            }
        }
        other => return Err(format!("expression kind {other} is not supported")),
    })
}

fn constant(node: &GenericNode, value: Option<&GenericValue>) -> Result<Expr, String> {
    Ok(match value {
        Some(GenericValue::Str(text)) => Expr::Str(text.clone()),
        Some(GenericValue::Number(text)) => Expr::Num(text.clone()),
        Some(GenericValue::Bool(flag)) => Expr::Bool(*flag),
        Some(GenericValue::Null) | None => Expr::NoneLit,
        Some(GenericValue::Node(inner)) if inner.kind == "bytes" => {
            Expr::Bytes(inner.string("text")?.to_string())
        }
        Some(_) => return Err(format!("{} holds an unsupported constant", node.kind)),
    })
}

fn unary_op(node: &GenericNode) -> Result<UnaryOp, String> {
    Ok(match node.kind.as_str() {
        "UAdd" => UnaryOp::Plus,
        "USub" => UnaryOp::Minus,
        "Not" => UnaryOp::Not,
        "Invert" => UnaryOp::Invert,
        other => return Err(format!("unary operator {other} is not supported")),
    })
}

fn binary_op(node: &GenericNode) -> Result<BinaryOp, String> {
    Ok(match node.kind.as_str() {
        "Add" => BinaryOp::Add,
        "Sub" => BinaryOp::Sub,
        "Mult" => BinaryOp::Mul,
        "Div" => BinaryOp::Div,
        "Mod" => BinaryOp::Mod,
        "LShift" => BinaryOp::Shl,
        "RShift" => BinaryOp::Shr,
        "BitOr" => BinaryOp::BitOr,
        "BitXor" => BinaryOp::BitXor,
        "BitAnd" => BinaryOp::BitAnd,
        other => return Err(format!("binary operator {other} is not supported")),
    })
}

fn compare_op(node: &GenericNode) -> Result<CompareOp, String> {
    Ok(match node.kind.as_str() {
        "Eq" => CompareOp::Eq,
        "NotEq" => CompareOp::NotEq,
        "Lt" => CompareOp::Lt,
        "LtE" => CompareOp::LtE,
        "Gt" => CompareOp::Gt,
        "GtE" => CompareOp::GtE,
        other => return Err(format!("comparison operator {other} is not supported")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> GenericNode {
        GenericNode::from_json(value).expect("valid tree")
    }

    fn name(id: &str) -> serde_json::Value {
        json!({"_type": "Name", "id": id, "ctx": {"_type": "Load"}})
    }

    #[test]
    fn converts_comparison_chain() {
        let node = tree(json!({
            "_type": "Compare",
            "left": name("a"),
            "ops": [{"_type": "Lt"}, {"_type": "LtE"}],
            "comparators": [name("b"), name("c")],
        }));
        let expr = retag_expr(&node);
        assert_eq!(
            expr,
            Expr::Compare {
                left: Box::new(Expr::name("a")),
                ops: vec![CompareOp::Lt, CompareOp::LtE],
                comparators: vec![Expr::name("b"), Expr::name("c")],
            }
        );
    }

    #[test]
    fn converts_constants_of_every_kind() {
        let value = |v: serde_json::Value| retag_expr(&tree(json!({"_type": "Constant", "value": v})));
        assert_eq!(value(json!("hi")), Expr::Str("hi".into()));
        assert_eq!(value(json!(3)), Expr::Num("3".into()));
        assert_eq!(value(json!(true)), Expr::Bool(true));
        assert_eq!(value(json!(null)), Expr::NoneLit);
        assert_eq!(
            value(json!({"_type": "bytes", "text": "raw"})),
            Expr::Bytes("raw".into())
        );
        let legacy = tree(json!({"_type": "Num", "n": 7}));
        assert_eq!(retag_expr(&legacy), Expr::Num("7".into()));
    }

    #[test]
    fn unwraps_index_subscripts() {
        let node = tree(json!({
            "_type": "Subscript",
            "value": name("motor"),
            "slice": {"_type": "Index", "value": name("port1")},
        }));
        assert_eq!(
            retag_expr(&node),
            Expr::Subscript {
                value: Box::new(Expr::name("motor")),
                index: Box::new(Expr::name("port1")),
            }
        );
    }

    #[test]
    fn marks_unknown_shapes_unsupported() {
        let node = tree(json!({"_type": "Lambda", "args": null, "body": name("x")}));
        assert!(matches!(retag_expr(&node), Expr::Unsupported { kind, .. } if kind == "Lambda"));

        let stmt = retag_stmt(&tree(json!({"_type": "Try", "lineno": 9, "col_offset": 0})));
        assert!(matches!(stmt.kind, StmtKind::Unsupported { .. }));
        assert_eq!(stmt.span, Span::new(9, 0));
    }

    #[test]
    fn rejects_keyword_arguments() {
        let node = tree(json!({
            "_type": "Call",
            "func": name("f"),
            "args": [],
            "keywords": [{"_type": "keyword", "arg": "x", "value": name("y")}],
        }));
        assert!(matches!(retag_expr(&node), Expr::Unsupported { .. }));
    }

    #[test]
    fn converts_function_signature() {
        let node = tree(json!({
            "_type": "FunctionDef",
            "name": "threshold",
            "args": {
                "_type": "arguments",
                "posonlyargs": [],
                "args": [
                    {"_type": "arg", "arg": "number", "annotation": name("int")},
                    {"_type": "arg", "arg": "minNumber", "annotation": name("int")},
                ],
                "vararg": null,
                "kwonlyargs": [],
                "kw_defaults": [],
                "kwarg": null,
                "defaults": [{"_type": "Constant", "value": 20}],
            },
            "body": [{"_type": "Pass"}],
            "decorator_list": [],
            "returns": name("int"),
        }));
        let StmtKind::FunctionDef(function) = retag_stmt(&node).kind else {
            panic!("expected a function definition");
        };
        assert_eq!(function.name, "threshold");
        assert_eq!(function.params.len(), 2);
        assert_eq!(function.defaults, vec![Expr::Num("20".into())]);
        assert_eq!(function.returns, Some(Expr::name("int")));
    }

    #[test]
    fn rejects_class_inheritance() {
        let node = tree(json!({
            "_type": "ClassDef",
            "name": "Arm",
            "bases": [name("Motor")],
            "keywords": [],
            "body": [],
            "decorator_list": [],
        }));
        assert!(matches!(retag_stmt(&node).kind, StmtKind::Unsupported { .. }));
    }

    #[test]
    fn rejects_non_module_root() {
        let err = retag_module(&tree(json!({"_type": "Expression", "body": name("x")}))).unwrap_err();
        assert!(matches!(err, CoreError::MalformedTree(_)));
    }
}
