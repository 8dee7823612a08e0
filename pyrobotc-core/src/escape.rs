//! String literal escaping for the target language.
//!
//! Long literals are split with a backslash-newline continuation. The
//! escaper prefers to break right after a space or tab once the line is
//! within ten columns of the limit, and always breaks at the limit itself.

use std::fmt::Write;

use crate::error::CoreError;

pub const DEFAULT_MAX_LINE_LENGTH: usize = 200;

const SOFT_BREAK_MARGIN: usize = 10;
const LINE_CONTINUATION: &str = "\\\n";

/// Escape `text` as a quoted literal.
///
/// With `allow_extended` the literal is wide (`L"..."`) and codepoints above
/// U+00FF become `\uHHHH`; without it they are an `EncodingRange` error.
pub fn escape(text: &str, allow_extended: bool, max_line_length: usize) -> Result<String, CoreError> {
    let soft_break = max_line_length
        .checked_sub(SOFT_BREAK_MARGIN)
        .filter(|threshold| *threshold >= SOFT_BREAK_MARGIN);

    let mut out = String::with_capacity(text.len() + 3);
    let mut position = 0;
    if allow_extended {
        out.push('L');
        position += 1;
    }
    out.push('"');
    position += 1;

    let mut piece = String::new();
    for c in text.chars() {
        piece.clear();
        let code = c as u32;
        match c {
            '\n' => piece.push_str("\\n"),
            '\\' | '"' => {
                piece.push('\\');
                piece.push(c);
            }
            _ if code < 0x20 || (0x80..=0xFF).contains(&code) => {
                let _ = write!(piece, "\\x{code:02X}");
            }
            _ if code > 0xFF => {
                if !allow_extended {
                    return Err(CoreError::EncodingRange { codepoint: code });
                }
                if code > 0xFFFF {
                    let _ = write!(piece, "\\U{code:08X}");
                } else {
                    let _ = write!(piece, "\\u{code:04X}");
                }
            }
            _ => piece.push(c),
        }

        out.push_str(&piece);
        position += piece.chars().count();
        if c == '\n' {
            position = 0;
        }

        let at_soft_break =
            soft_break.is_some_and(|threshold| position >= threshold) && matches!(c, ' ' | '\t');
        if at_soft_break || position >= max_line_length {
            out.push_str(LINE_CONTINUATION);
            position = 0;
        }
    }

    out.push('"');
    Ok(out)
}
