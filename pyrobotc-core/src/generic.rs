//! The untagged tree handed over by a front-end.
//!
//! A generic node is a kind name (the Python `ast` class name), an optional
//! position and a bag of named fields. Nothing here knows which kinds the
//! translator supports; `retag` decides that.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::CoreError;
use crate::span::Span;

const KIND_KEY: &str = "_type";

#[derive(Debug, Clone, PartialEq)]
pub enum GenericValue {
    Node(GenericNode),
    List(Vec<GenericValue>),
    Str(String),
    /// Numeric literal kept in textual form.
    Number(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericNode {
    pub kind: String,
    pub span: Span,
    pub fields: BTreeMap<String, GenericValue>,
}

impl GenericNode {
    pub fn from_json_str(text: &str) -> Result<GenericNode, CoreError> {
        let value: Value = serde_json::from_str(text)?;
        GenericNode::from_json(value)
    }

    pub fn from_json(value: Value) -> Result<GenericNode, CoreError> {
        match GenericValue::from_json(value)? {
            GenericValue::Node(node) => Ok(node),
            _ => Err(CoreError::MalformedTree(
                "expected a node object at the root".to_string(),
            )),
        }
    }

    pub fn field(&self, name: &str) -> Option<&GenericValue> {
        self.fields.get(name)
    }

    /// A field that must hold a node.
    pub fn node(&self, name: &str) -> Result<&GenericNode, String> {
        match self.fields.get(name) {
            Some(GenericValue::Node(node)) => Ok(node),
            _ => Err(format!("{} is missing node field '{name}'", self.kind)),
        }
    }

    /// A field that may hold a node or null.
    pub fn opt_node(&self, name: &str) -> Result<Option<&GenericNode>, String> {
        match self.fields.get(name) {
            Some(GenericValue::Node(node)) => Ok(Some(node)),
            Some(GenericValue::Null) | None => Ok(None),
            Some(_) => Err(format!("{} field '{name}' is not a node", self.kind)),
        }
    }

    /// A list field; an absent field counts as empty.
    pub fn list(&self, name: &str) -> Result<&[GenericValue], String> {
        match self.fields.get(name) {
            Some(GenericValue::List(items)) => Ok(items),
            Some(GenericValue::Null) | None => Ok(&[]),
            Some(_) => Err(format!("{} field '{name}' is not a list", self.kind)),
        }
    }

    pub fn string(&self, name: &str) -> Result<&str, String> {
        match self.fields.get(name) {
            Some(GenericValue::Str(text)) => Ok(text),
            _ => Err(format!("{} is missing string field '{name}'", self.kind)),
        }
    }
}

impl GenericValue {
    pub fn from_json(value: Value) -> Result<GenericValue, CoreError> {
        Ok(match value {
            Value::Null => GenericValue::Null,
            Value::Bool(flag) => GenericValue::Bool(flag),
            Value::Number(number) => GenericValue::Number(number_text(&number)),
            Value::String(text) => GenericValue::Str(text),
            Value::Array(items) => GenericValue::List(
                items
                    .into_iter()
                    .map(GenericValue::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(mut map) => {
                let kind = match map.remove(KIND_KEY) {
                    Some(Value::String(kind)) => kind,
                    _ => {
                        return Err(CoreError::MalformedTree(format!(
                            "object without a '{KIND_KEY}' key"
                        )));
                    }
                };
                let line = position(map.remove("lineno"));
                let column = position(map.remove("col_offset"));
                let mut fields = BTreeMap::new();
                for (name, value) in map {
                    fields.insert(name, GenericValue::from_json(value)?);
                }
                GenericValue::Node(GenericNode {
                    kind,
                    span: Span::new(line, column),
                    fields,
                })
            }
        })
    }

    pub fn as_node(&self) -> Option<&GenericNode> {
        match self {
            GenericValue::Node(node) => Some(node),
            _ => None,
        }
    }
}

fn number_text(number: &serde_json::Number) -> String {
    if number.is_f64() {
        match number.as_f64() {
            Some(value) => format!("{value:?}"),
            None => number.to_string(),
        }
    } else {
        number.to_string()
    }
}

fn position(value: Option<Value>) -> u32 {
    value
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}
