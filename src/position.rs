//! Cursor to node-chain resolution.
//!
//! [`resolve`] descends from a document root to the innermost node enclosing
//! the cursor and returns the keys and sequence items passed on the way as a
//! [`NodeChain`]. Enclosure is decided by source position only: a pair
//! encloses a later line when the cursor is indented past its key, and a
//! sequence item does when the cursor is at or past the item's column.

use tower_lsp::lsp_types::Position;

use crate::document::{Mapping, Node, Pair, Pos, Sequence};

/// A 1-based cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub line: usize,
    pub column: usize,
    /// Column of the first non-blank character before the cursor on its
    /// line, or the cursor column when there is none.
    pub indent: usize,
    /// Whether the text before the cursor starts with a sequence dash.
    pub dash: bool,
}

impl Cursor {
    pub fn new(line: usize, column: usize) -> Cursor {
        Cursor {
            line,
            column,
            indent: column,
            dash: false,
        }
    }

    /// Cursor at `column` of the 1-based `line` whose text is `text`.
    pub fn on_line(line: usize, column: usize, text: &str) -> Cursor {
        let before = text.chars().take(column.saturating_sub(1));
        let indent = before
            .clone()
            .position(|c| c != ' ')
            .map_or(column, |offset| offset + 1);
        let dash = before.skip_while(|c| *c == ' ').next() == Some('-');

        Cursor {
            line,
            column,
            indent,
            dash,
        }
    }

    /// Hover targets the character under the cursor and resolves as if the
    /// caret sat just past it.
    pub fn for_hover(position: Position, text: &str) -> Cursor {
        let character = char_index(text, position.character as usize);
        Cursor::on_line(position.line as usize + 1, character + 2, text)
    }
}

/// Index of the character at UTF-16 offset `utf16` in `text`.
///
/// Offsets inside a surrogate pair land on that character; offsets past the
/// end count as one character each.
pub fn char_index(text: &str, utf16: usize) -> usize {
    let mut units = 0;
    for (index, c) in text.chars().enumerate() {
        if units >= utf16 {
            return index;
        }
        units += c.len_utf16();
        if units > utf16 {
            return index;
        }
    }
    text.chars().count() + (utf16 - units)
}

/// UTF-16 offset of the character at `index` in `text`.
pub fn utf16_offset(text: &str, index: usize) -> usize {
    let count = text.chars().count();
    let within: usize = text.chars().take(index).map(char::len_utf16).sum();
    within + index.saturating_sub(count)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainElement<'d> {
    Key(&'d Pair),
    Item(&'d Node),
}

impl<'d> ChainElement<'d> {
    pub fn start(&self) -> Pos {
        match self {
            ChainElement::Key(pair) => pair.key.span.start,
            ChainElement::Item(node) => node.start(),
        }
    }

    pub fn line(&self) -> usize {
        self.start().line
    }

    pub fn column(&self) -> usize {
        self.start().column
    }

    pub fn key(&self) -> Option<&'d str> {
        match self {
            ChainElement::Key(pair) => Some(pair.key.value.as_str()),
            ChainElement::Item(_) => None,
        }
    }

    pub fn pair(&self) -> Option<&'d Pair> {
        match self {
            ChainElement::Key(pair) => Some(pair),
            ChainElement::Item(_) => None,
        }
    }

    pub fn value(&self) -> &'d Node {
        match self {
            ChainElement::Key(pair) => &pair.value,
            ChainElement::Item(node) => node,
        }
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.key() == Some(name)
    }
}

/// Enclosing keys and items, outermost first.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NodeChain<'d> {
    elements: Vec<ChainElement<'d>>,
}

impl<'d> NodeChain<'d> {
    pub fn elements(&self) -> &[ChainElement<'d>] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn last(&self) -> Option<&ChainElement<'d>> {
        self.elements.last()
    }

    /// Keys of the chain with items shown as `-`, for logging.
    pub fn describe(&self) -> String {
        self.elements
            .iter()
            .map(|element| element.key().unwrap_or("-"))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Resolves the chain of nodes enclosing `cursor` in `root`.
///
/// Returns `None` when the cursor lies outside every node: the root is not a
/// mapping, or the cursor is at or before the first top-level key's column.
/// An empty chain means the cursor is at the top level, past that column.
pub fn resolve(root: &Node, cursor: Cursor) -> Option<NodeChain<'_>> {
    let mapping = root.as_mapping()?;
    let first = mapping.pairs.first()?;
    if cursor.column <= first.key.span.start.column {
        return None;
    }

    let mut elements = Vec::new();
    descend_mapping(mapping, cursor, &mut elements);
    Some(NodeChain { elements })
}

fn descend<'d>(node: &'d Node, cursor: Cursor, chain: &mut Vec<ChainElement<'d>>) {
    match node {
        Node::Mapping(mapping) => descend_mapping(mapping, cursor, chain),
        Node::Sequence(sequence) => descend_sequence(sequence, cursor, chain),
        Node::Scalar(_) | Node::Null(_) => {}
    }
}

fn descend_mapping<'d>(mapping: &'d Mapping, cursor: Cursor, chain: &mut Vec<ChainElement<'d>>) {
    let mut candidate = None;

    for pair in &mapping.pairs {
        let key = pair.key.span.start;
        if key.line > cursor.line {
            break;
        }
        if key.line == cursor.line {
            if cursor.column > key.column {
                chain.push(ChainElement::Key(pair));
            }
            return;
        }
        candidate = Some(pair);
    }

    let Some(pair) = candidate else {
        return;
    };
    if cursor.indent <= pair.key.span.start.column {
        return;
    }

    chain.push(ChainElement::Key(pair));
    descend(&pair.value, cursor, chain);
}

fn descend_sequence<'d>(
    sequence: &'d Sequence,
    cursor: Cursor,
    chain: &mut Vec<ChainElement<'d>>,
) {
    let mut candidate = None;

    for item in &sequence.items {
        let start = item.start();
        if start.line > cursor.line {
            break;
        }
        if start.line == cursor.line {
            // an empty dash has no key to complete against
            if item.is_null() || cursor.column < start.column {
                return;
            }
            chain.push(ChainElement::Item(item));
            if let Node::Mapping(mapping) = item {
                descend_mapping(mapping, cursor, chain);
            }
            return;
        }
        if !item.is_null() {
            candidate = Some(item);
        }
    }

    let Some(item) = candidate else {
        return;
    };
    if cursor.indent < item.start().column {
        return;
    }

    chain.push(ChainElement::Item(item));
    if let Node::Mapping(mapping) = item {
        descend_mapping(mapping, cursor, chain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::yaml;

    fn chain_keys(text: &str, line: usize, column: usize) -> Option<String> {
        let stream = yaml::parse(text).expect("valid yaml");
        let line_text = text.lines().nth(line - 1).unwrap_or("");
        let cursor = Cursor::on_line(line, column, line_text);
        let root = &stream.document_at(line)?.root;
        resolve(root, cursor).map(|chain| chain.describe())
    }

    // ========================================================================
    // Cursor construction
    // ========================================================================

    #[test]
    fn test_cursor_indent_and_dash() {
        let cursor = Cursor::on_line(3, 9, "      - ");
        assert_eq!(cursor.indent, 7);
        assert!(cursor.dash);

        let blank = Cursor::on_line(3, 5, "    ");
        assert_eq!(blank.indent, 5, "blank prefix indents to the cursor");
        assert!(!blank.dash);

        let typed = Cursor::on_line(3, 8, "    ima");
        assert_eq!(typed.indent, 5);
    }

    #[test]
    fn test_completion_and_hover_columns() {
        let position = Position {
            line: 2,
            character: 4,
        };
        assert_eq!(Cursor::for_hover(position, "    image").column, 6);

        // the emoji takes two UTF-16 units, so offset 5 is the `a`
        let after_emoji = Position {
            line: 0,
            character: 5,
        };
        assert_eq!(Cursor::for_hover(after_emoji, "# 😀 ab").column, 6);
    }

    #[test]
    fn test_utf16_conversion() {
        let text = "a😀b";
        assert_eq!(char_index(text, 0), 0);
        assert_eq!(char_index(text, 1), 1);
        assert_eq!(char_index(text, 3), 2);
        assert_eq!(char_index(text, 4), 3);
        assert_eq!(char_index(text, 6), 5, "past the end counts per unit");

        assert_eq!(utf16_offset(text, 2), 3);
        assert_eq!(utf16_offset(text, 3), 4);
        assert_eq!(utf16_offset("abc", 2), 2);
        assert_eq!(utf16_offset("", 4), 4);
    }

    // ========================================================================
    // Mappings
    // ========================================================================

    #[test]
    fn test_blank_line_under_service() {
        let text = "services:\n  test:\n    \n";
        assert_eq!(chain_keys(text, 3, 5).as_deref(), Some("services.test"));
    }

    #[test]
    fn test_key_on_cursor_line_is_terminal() {
        let text = "services:\n  test:\n    restart: al\n";
        assert_eq!(
            chain_keys(text, 3, 16).as_deref(),
            Some("services.test.restart")
        );
    }

    #[test]
    fn test_cursor_at_key_start_stops_at_parent() {
        let text = "services:\n  test:\n    image: alpine\n";
        assert_eq!(chain_keys(text, 3, 5).as_deref(), Some("services.test"));
    }

    #[test]
    fn test_cursor_at_or_before_first_key_column_is_outside() {
        let text = "services:\n  test:\n    image: alpine\n";
        assert_eq!(chain_keys(text, 3, 1), None);
        assert_eq!(chain_keys(text, 1, 1), None);
    }

    #[test]
    fn test_top_level_key_line_has_single_element() {
        let text = "services:\n  test:\n";
        assert_eq!(chain_keys(text, 1, 4).as_deref(), Some("services"));
    }

    #[test]
    fn test_dedented_line_leaves_nested_block() {
        let text = "services:\n  a:\n    image: x\n  \nnetworks:\n  n:\n";
        assert_eq!(chain_keys(text, 4, 3).as_deref(), Some("services"));
    }

    #[test]
    fn test_scan_stops_at_later_keys() {
        let text = "services:\n  a:\n    image: x\n    \n  b:\n    image: y\n";
        assert_eq!(chain_keys(text, 4, 5).as_deref(), Some("services.a"));
    }

    // ========================================================================
    // Sequences
    // ========================================================================

    #[test]
    fn test_item_on_cursor_line() {
        let text = "services:\n  a:\n    depends_on:\n      - b\n";
        assert_eq!(
            chain_keys(text, 4, 10).as_deref(),
            Some("services.a.depends_on.-")
        );
    }

    #[test]
    fn test_empty_dash_is_a_dead_end() {
        let text = "services:\n  test:\n    depends_on:\n      - \n  test2:\n    image: alpine\n";
        assert_eq!(
            chain_keys(text, 4, 9).as_deref(),
            Some("services.test.depends_on")
        );
    }

    #[test]
    fn test_mapping_item_descends_into_keys() {
        let text = "services:\n  a:\n    volumes:\n      - type: bind\n        source: data\n";
        assert_eq!(
            chain_keys(text, 5, 13).as_deref(),
            Some("services.a.volumes.-.source")
        );
    }

    #[test]
    fn test_blank_line_inside_mapping_item() {
        let text = "services:\n  a:\n    volumes:\n      - type: bind\n        \n";
        assert_eq!(
            chain_keys(text, 5, 9).as_deref(),
            Some("services.a.volumes.-")
        );
    }

    #[test]
    fn test_new_dash_does_not_enter_previous_item() {
        let text = "services:\n  a:\n    volumes:\n      - type: bind\n      - \n";
        assert_eq!(
            chain_keys(text, 5, 9).as_deref(),
            Some("services.a.volumes")
        );
    }

    // ========================================================================
    // Documents
    // ========================================================================

    #[test]
    fn test_second_document_resolves_independently() {
        let text = "services:\n  a:\n    image: x\n---\nservices:\n  b:\n    \n";
        assert_eq!(chain_keys(text, 7, 5).as_deref(), Some("services.b"));
    }
}
