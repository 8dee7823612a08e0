use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("source file {0} was not found")]
    NotFound(PathBuf),
    #[error("front-end failed on {path}: {message}")]
    Frontend { path: PathBuf, message: String },
    #[error("malformed syntax tree: {0}")]
    MalformedTree(String),
    #[error("syntax tree is not valid JSON: {0}")]
    TreeJson(#[from] serde_json::Error),
    #[error(
        "redefining a type not permitted in {class}->self.{field}: declared {existing}, found {conflicting}"
    )]
    FieldTypeConflict {
        class: String,
        field: String,
        existing: String,
        conflicting: String,
    },
    #[error("string contains character U+{codepoint:04X} but extended codepoints are disabled")]
    EncodingRange { codepoint: u32 },
    #[error("unsupported construct: {0}")]
    Unsupported(String),
    #[error("render error: {0}")]
    Render(String),
}

impl CoreError {
    /// Fatal errors abort the whole run; the rest only cost the statement
    /// that produced them.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CoreError::Unsupported(_) | CoreError::Render(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_severity() {
        assert!(!CoreError::Unsupported("lambda".into()).is_fatal());
        assert!(!CoreError::Render("bad arity".into()).is_fatal());
        assert!(CoreError::EncodingRange { codepoint: 0x263A }.is_fatal());
        assert!(CoreError::NotFound(PathBuf::from("x.py")).is_fatal());
    }

    #[test]
    fn formats_encoding_range_in_hex() {
        let err = CoreError::EncodingRange { codepoint: 0x263A };
        assert!(err.to_string().contains("U+263A"));
    }
}
