use tower_lsp::lsp_types::{CompletionTextEdit, Position, Range, TextEdit};

use crate::position::utf16_offset;

use super::LineRange;

/// Character range of the typed prefix: the run of non-whitespace characters
/// ending at the cursor.
pub fn typed_prefix(line: &str, character: usize) -> LineRange<usize> {
    let before: Vec<char> = line.chars().take(character).collect();
    let start = before
        .iter()
        .rposition(|c| c.is_whitespace())
        .map_or(0, |index| index + 1);
    start..before.len()
}

/// The typed prefix without anything up to a `:` inside it, so a value typed
/// right after `key:` replaces only the value.
pub fn value_prefix(line: &str, character: usize) -> LineRange<usize> {
    let prefix = typed_prefix(line, character);
    let colon = line
        .chars()
        .skip(prefix.start)
        .take(prefix.len())
        .position(|c| c == ':');
    match colon {
        Some(offset) => prefix.start + offset + 1..prefix.end,
        None => prefix,
    }
}

/// Indentation for the line after a new key: the line's leading spaces and
/// dashes as spaces, plus one level.
pub fn continuation_spacing(line: &str) -> String {
    let leading = line.chars().take_while(|c| *c == ' ' || *c == '-').count();
    " ".repeat(leading + 2)
}

pub fn in_comment(line: &str, character: usize) -> bool {
    let before: String = line.chars().take(character).collect();
    before.trim_start().starts_with('#') || before.contains(" #")
}

/// `range` of character indexes on `line` as UTF-16 offsets.
pub fn utf16_range(line: &str, range: LineRange<usize>) -> LineRange<usize> {
    utf16_offset(line, range.start)..utf16_offset(line, range.end)
}

/// Edit replacing the UTF-16 `range` of the 0-based `line`.
pub fn replace(line: usize, range: LineRange<usize>, new_text: String) -> CompletionTextEdit {
    CompletionTextEdit::Edit(TextEdit {
        range: Range {
            start: Position {
                line: line as u32,
                character: range.start as u32,
            },
            end: Position {
                line: line as u32,
                character: range.end as u32,
            },
        },
        new_text,
    })
}

/// Escapes text placed inside a snippet choice list.
pub fn escape_choice(value: &str) -> String {
    value
        .chars()
        .flat_map(|c| match c {
            '$' | '}' | '\\' | ',' | '|' => vec!['\\', c],
            other => vec![other],
        })
        .collect()
}
