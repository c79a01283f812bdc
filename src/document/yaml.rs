//! Span-preserving YAML trees for Compose files.
//!
//! The tree is built from `saphyr_parser` events and keeps a 1-based
//! `(line, column)` position for every node, which is what the position
//! resolver walks. Anchors are remembered per document and aliases are
//! replaced by a copy of the anchored content, so callers never see an
//! alias node.
//!
//! Each `---` separated document is kept separately together with the line
//! it starts on. Spans are absolute within the file.

use std::collections::HashMap;

use saphyr_parser::{Event, Marker, Parser, ScalarStyle, Span};
use thiserror::Error;
use tower_lsp::lsp_types::{Position, Range};

/// How many times [`parse_lenient`] blanks an offending line and retries.
const MAX_RECOVERY_ATTEMPTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: {message}")]
    Scan { line: usize, message: String },
    #[error("unexpected end of event stream")]
    UnexpectedEnd,
    #[error("alias refers to unknown anchor {0}")]
    UnknownAlias(usize),
}

impl ParseError {
    /// 1-based line the error was reported on, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Scan { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// A 1-based line/column position.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn new(line: usize, column: usize) -> Pos {
        Pos { line, column }
    }

    fn from_marker(marker: &Marker) -> Pos {
        Pos {
            line: marker.line(),
            column: marker.col() + 1,
        }
    }

    /// Converts to a 0-based LSP position.
    pub fn to_lsp(self) -> Position {
        Position {
            line: self.line.saturating_sub(1) as u32,
            character: self.column.saturating_sub(1) as u32,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan {
    pub start: Pos,
    pub end: Pos,
}

impl TextSpan {
    pub fn to_lsp(self) -> Range {
        Range {
            start: self.start.to_lsp(),
            end: self.end.to_lsp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar {
    pub value: String,
    pub span: TextSpan,
    pub quoted: bool,
}

impl Scalar {
    /// Span of the scalar's text, excluding quotes.
    ///
    /// Single-line scalars are measured from their start so the end column is
    /// exact; multi-line scalars fall back to the parser's span.
    pub fn content_span(&self) -> TextSpan {
        if self.value.contains('\n') {
            return self.span;
        }
        let start_column = self.span.start.column + usize::from(self.quoted);
        let start = Pos::new(self.span.start.line, start_column);
        let end = Pos::new(start.line, start_column + self.value.chars().count());
        TextSpan { start, end }
    }

    pub fn range(&self) -> Range {
        self.content_span().to_lsp()
    }

    /// Whether the 0-based LSP position touches this scalar's text, both ends
    /// included.
    pub fn contains(&self, position: Position) -> bool {
        let range = self.range();
        range.start.line == position.line
            && range.start.character <= position.character
            && position.character <= range.end.character
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: Scalar,
    pub value: Node,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub start: Pos,
    pub pairs: Vec<Pair>,
}

impl Mapping {
    pub fn pair(&self, key: &str) -> Option<&Pair> {
        self.pairs.iter().find(|pair| pair.key.value == key)
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.pair(key).map(|pair| &pair.value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub start: Pos,
    pub items: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Scalar(Scalar),
    Mapping(Mapping),
    Sequence(Sequence),
    /// An absent value, e.g. `key:` with nothing after it or a bare `- `.
    Null(Pos),
}

impl Node {
    pub fn start(&self) -> Pos {
        match self {
            Node::Scalar(scalar) => scalar.span.start,
            Node::Mapping(mapping) => mapping.start,
            Node::Sequence(sequence) => sequence.start,
            Node::Null(pos) => *pos,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().map(|scalar| scalar.value.as_str())
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Node::Sequence(sequence) => Some(sequence),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null(_))
    }

    /// Scalars of a node that may be written either as one string or as a
    /// list of strings.
    pub fn scalars(&self) -> Vec<&Scalar> {
        match self {
            Node::Scalar(scalar) => vec![scalar],
            Node::Sequence(sequence) => sequence.items.iter().filter_map(Node::as_scalar).collect(),
            _ => vec![],
        }
    }

    fn restamp(mut self, at: Pos) -> Node {
        match &mut self {
            Node::Scalar(scalar) => {
                let width = scalar.span.end.column.saturating_sub(scalar.span.start.column);
                scalar.span = TextSpan {
                    start: at,
                    end: Pos::new(at.line, at.column + width),
                };
            }
            Node::Mapping(mapping) => mapping.start = at,
            Node::Sequence(sequence) => sequence.start = at,
            Node::Null(pos) => *pos = at,
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YamlDocument {
    /// 1-based line of the document start (the `---` marker or first content).
    pub start_line: usize,
    pub root: Node,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YamlStream {
    pub documents: Vec<YamlDocument>,
}

impl YamlStream {
    /// The document section containing the 1-based `line`.
    pub fn document_at(&self, line: usize) -> Option<&YamlDocument> {
        self.documents
            .iter()
            .take_while(|document| document.start_line <= line)
            .last()
            .or_else(|| self.documents.first())
    }

    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.documents.iter().map(|document| &document.root)
    }
}

/// Parses `text` into a [`YamlStream`], failing on the first scan error.
pub fn parse(text: &str) -> Result<YamlStream, ParseError> {
    let mut events = Vec::new();
    for result in Parser::new_from_str(text) {
        let (event, span) = result.map_err(|err| ParseError::Scan {
            line: err.marker().line(),
            message: err.info().to_string(),
        })?;
        events.push((event, span));
    }

    TreeBuilder::new(&events).build_stream()
}

/// Parses `text`, blanking lines that fail to scan until the rest parses.
///
/// Returns the recovered stream (if any) together with the first error seen.
pub fn parse_lenient(text: &str) -> (Option<YamlStream>, Option<ParseError>) {
    let first = match parse(text) {
        Ok(stream) => return (Some(stream), None),
        Err(err) => err,
    };

    let mut patched = text.to_string();
    let mut error = first.clone();
    for _ in 0..MAX_RECOVERY_ATTEMPTS {
        let Some(line) = error.line() else {
            break;
        };
        patched = blank_line(&patched, line);
        match parse(&patched) {
            Ok(stream) => {
                tracing::debug!("recovered from parse error by blanking line {line}");
                return (Some(stream), Some(first));
            }
            Err(next) if next == error => break,
            Err(next) => error = next,
        }
    }

    (None, Some(first))
}

/// Replaces the contents of the 1-based `line` with nothing, keeping every
/// other line (and therefore every other position) intact.
pub fn blank_line(text: &str, line: usize) -> String {
    text.split('\n')
        .enumerate()
        .map(|(index, content)| {
            if index + 1 == line {
                if content.ends_with('\r') {
                    "\r"
                } else {
                    ""
                }
            } else {
                content
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

struct TreeBuilder<'e, 'input> {
    events: &'e [(Event<'input>, Span)],
    pos: usize,
    anchors: HashMap<usize, Node>,
}

impl<'e, 'input> TreeBuilder<'e, 'input> {
    fn new(events: &'e [(Event<'input>, Span)]) -> Self {
        TreeBuilder {
            events,
            pos: 0,
            anchors: HashMap::new(),
        }
    }

    fn peek(&self) -> Option<&'e (Event<'input>, Span)> {
        self.events.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'e (Event<'input>, Span)> {
        let event = self.events.get(self.pos)?;
        self.pos += 1;
        Some(event)
    }

    fn build_stream(mut self) -> Result<YamlStream, ParseError> {
        let mut documents = Vec::new();

        while let Some((event, span)) = self.advance() {
            if !matches!(event, Event::DocumentStart(..)) {
                continue;
            }

            let start_line = span.start.line();
            let root = match self.peek() {
                Some((Event::DocumentEnd, _)) | None => Node::Null(Pos::from_marker(&span.start)),
                Some(_) => self.build_node()?,
            };
            if let Some((Event::DocumentEnd, _)) = self.peek() {
                self.pos += 1;
            }
            self.anchors.clear();

            documents.push(YamlDocument { start_line, root });
        }

        Ok(YamlStream { documents })
    }

    fn build_node(&mut self) -> Result<Node, ParseError> {
        let (event, span) = self.advance().ok_or(ParseError::UnexpectedEnd)?;
        let start = Pos::from_marker(&span.start);

        match event {
            Event::Scalar(value, style, anchor, _) => {
                let node = if is_empty_placeholder(value, *style, span) {
                    Node::Null(start)
                } else {
                    Node::Scalar(Scalar {
                        value: value.to_string(),
                        span: TextSpan {
                            start,
                            end: Pos::from_marker(&span.end),
                        },
                        quoted: matches!(style, ScalarStyle::SingleQuoted | ScalarStyle::DoubleQuoted),
                    })
                };
                Ok(self.remember(*anchor, node))
            }
            Event::SequenceStart(anchor, _) => {
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        Some((Event::SequenceEnd, _)) => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => items.push(self.build_node()?),
                        None => return Err(ParseError::UnexpectedEnd),
                    }
                }
                Ok(self.remember(*anchor, Node::Sequence(Sequence { start, items })))
            }
            Event::MappingStart(anchor, _) => {
                let mut pairs = Vec::new();
                loop {
                    match self.peek() {
                        Some((Event::MappingEnd, _)) => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => {
                            let key = self.build_node()?;
                            let value = self.build_node()?;
                            // complex keys carry nothing the resolver can use
                            if let Node::Scalar(key) = key {
                                pairs.push(Pair { key, value });
                            }
                        }
                        None => return Err(ParseError::UnexpectedEnd),
                    }
                }
                let start = pairs.first().map_or(start, |pair| pair.key.span.start);
                Ok(self.remember(*anchor, Node::Mapping(Mapping { start, pairs })))
            }
            Event::Alias(id) => self
                .anchors
                .get(id)
                .cloned()
                .map(|node| node.restamp(start))
                .ok_or(ParseError::UnknownAlias(*id)),
            _ => Err(ParseError::UnexpectedEnd),
        }
    }

    fn remember(&mut self, anchor: usize, node: Node) -> Node {
        if anchor > 0 {
            self.anchors.insert(anchor, node.clone());
        }
        node
    }
}

/// The parser reports missing values as a zero-width plain `~`.
fn is_empty_placeholder(value: &str, style: ScalarStyle, span: &Span) -> bool {
    matches!(style, ScalarStyle::Plain)
        && (value == "~" || value.is_empty())
        && span.start.index() == span.end.index()
}
