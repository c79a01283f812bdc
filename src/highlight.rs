use tower_lsp::lsp_types::{DocumentHighlight, DocumentHighlightKind, Position};

use crate::document::{Document, DocumentStore};
use crate::references;

/// Occurrences of the symbol under the cursor within `document` itself.
/// The declaration is a write, references are reads.
pub fn document_highlight(
    store: &dyn DocumentStore,
    document: &Document,
    position: Position,
) -> Option<Vec<DocumentHighlight>> {
    let highlights: Vec<DocumentHighlight> =
        references::symbol_occurrences(store, document, position)?
            .into_iter()
            .filter(|occurrence| &occurrence.location.uri == document.uri())
            .map(|occurrence| DocumentHighlight {
                range: occurrence.location.range,
                kind: Some(if occurrence.is_declaration {
                    DocumentHighlightKind::WRITE
                } else {
                    DocumentHighlightKind::READ
                }),
            })
            .collect();

    (!highlights.is_empty()).then_some(highlights)
}
