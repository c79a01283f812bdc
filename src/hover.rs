//! Hover provider for Compose files.
//!
//! Hovering a key or its value shows the schema documentation of that field.
//! Fields with an enum also list their allowed values:
//!
//! ```text
//! Defines the policy that the platform applies on container termination.
//!
//! Allowed values:
//! - `always`
//! - `no`
//! - ...
//! ```
//!
//! Hover can be disabled via [`Settings::hover`].

use itertools::Itertools;
use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Range};

use crate::{
    config::Settings,
    document::Document,
    position::{self, ChainElement, Cursor},
    schema::{
        walker::{self, ResolvedSchema},
        SchemaGraph, SchemaRef,
    },
};

/// Generate hover content for the field at the cursor position.
///
/// Returns `None` when hover is disabled, there is no schema, the cursor is
/// not on a known field, or the field has nothing to show.
pub fn hover(
    document: &Document,
    schema: Option<&SchemaGraph>,
    position: Position,
    settings: &Settings,
) -> Option<Hover> {
    if !settings.hover {
        return None;
    }
    let schema = schema?;

    let text = document.line(position.line as usize)?;
    let cursor = Cursor::for_hover(position, &text);
    let chain = position::resolve(document.root_at(cursor.line)?, cursor)?;

    let field = match walker::walk(schema.root(), &chain, cursor)? {
        ResolvedSchema::FieldSchema(field) => field,
        ResolvedSchema::SiblingProperties(_) => return None,
    };

    let range = chain.last().and_then(|element| match element {
        ChainElement::Key(pair) => Some(pair.key.range()),
        ChainElement::Item(node) => node.as_scalar().map(|scalar| scalar.range()),
    });

    field_documentation(field).map(|value| Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: range.filter(|range: &Range| range.start.line == position.line),
    })
}

/// The field's description followed by its allowed values, if any.
pub fn field_documentation(field: SchemaRef<'_>) -> Option<String> {
    let description = field
        .field_description()
        .map(str::trim)
        .filter(|description| !description.is_empty());
    let values = field.field_enum().unwrap_or_default();

    if values.is_empty() {
        return description.map(str::to_string);
    }

    let list = values
        .iter()
        .sorted()
        .dedup()
        .map(|value| format!("- `{value}`"))
        .join("\n");
    Some(match description {
        Some(description) => format!("{description}\n\nAllowed values:\n{list}"),
        None => format!("Allowed values:\n{list}"),
    })
}
