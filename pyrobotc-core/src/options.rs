use std::path::PathBuf;

use crate::escape::DEFAULT_MAX_LINE_LENGTH;

/// Layout of the generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// One indentation level.
    pub indent: String,
    /// `if (x) {` when true, brace on its own line when false.
    pub same_line_braces: bool,
    /// Column at which string literals are wrapped.
    pub max_line_length: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            indent: "  ".to_string(),
            same_line_braces: true,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl RenderOptions {
    pub fn with_indent_width(mut self, width: usize) -> Self {
        self.indent = " ".repeat(width);
        self
    }

    /// Text between a block header such as `if (x)` and its first statement.
    pub fn open_brace(&self) -> &'static str {
        if self.same_line_braces { " {\n" } else { "\n{\n" }
    }

    /// Text between a closing brace and `else`.
    pub fn else_separator(&self) -> &'static str {
        if self.same_line_braces { " else {\n" } else { "\nelse\n{\n" }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    pub render: RenderOptions,
    /// Second place imports are looked up; defaults to the directory of
    /// the running executable.
    pub tool_dir: Option<PathBuf>,
}

impl CompilerOptions {
    pub fn resolved_tool_dir(&self) -> Option<PathBuf> {
        self.tool_dir.clone().or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(PathBuf::from))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_firmware_style() {
        let options = RenderOptions::default();
        assert_eq!(options.indent, "  ");
        assert_eq!(options.open_brace(), " {\n");
        assert_eq!(options.max_line_length, 200);
    }

    #[test]
    fn supports_braces_on_next_line() {
        let options = RenderOptions {
            same_line_braces: false,
            ..RenderOptions::default()
        }
        .with_indent_width(4);
        assert_eq!(options.indent, "    ");
        assert_eq!(options.open_brace(), "\n{\n");
        assert_eq!(options.else_separator(), "\nelse\n{\n");
    }

    #[test]
    fn explicit_tool_dir_wins() {
        let options = CompilerOptions {
            tool_dir: Some(PathBuf::from("/opt/pyrobotc")),
            ..CompilerOptions::default()
        };
        assert_eq!(options.resolved_tool_dir(), Some(PathBuf::from("/opt/pyrobotc")));
    }
}
