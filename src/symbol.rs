//! Document outline for Compose files.
//!
//! | Symbol | LSP Kind | Example |
//! |--------|----------|---------|
//! | Service | `Class` | `services: web:` |
//! | Network | `Interface` | `networks: front:` |
//! | Volume | `File` | `volumes: data:` |
//! | Config | `Variable` | `configs: nginx_conf:` |
//! | Secret | `Key` | `secrets: token:` |
//! | Included file | `Module` | `include: - db.yaml` |
//!
//! Symbols are returned in document order (sorted by line number).

use tower_lsp::lsp_types::{DocumentSymbol, DocumentSymbolResponse, Range, SymbolKind};

use crate::{
    crossref::{self, DeclarationKind},
    document::Document,
};

/// Internal representation of a document symbol for sorting.
#[derive(Debug)]
struct FlatSymbol {
    name: String,
    kind: SymbolKind,
    range: Range,
    detail: Option<String>,
}

pub fn symbol_kind(kind: DeclarationKind) -> SymbolKind {
    match kind {
        DeclarationKind::Service => SymbolKind::CLASS,
        DeclarationKind::Network => SymbolKind::INTERFACE,
        DeclarationKind::Volume => SymbolKind::FILE,
        DeclarationKind::Config => SymbolKind::VARIABLE,
        DeclarationKind::Secret => SymbolKind::KEY,
    }
}

/// Get the outline of a single file.
///
/// Returns `None` when the file declares nothing and includes nothing.
pub fn document_symbol(document: &Document) -> Option<DocumentSymbolResponse> {
    let mut symbols: Vec<FlatSymbol> = crossref::declarations(document)
        .into_iter()
        .map(|declaration| FlatSymbol {
            name: declaration.name().to_string(),
            kind: symbol_kind(declaration.kind),
            range: declaration.range(),
            detail: Some(declaration.kind.section().to_string()),
        })
        .collect();

    symbols.extend(document.include_paths().into_iter().map(|path| FlatSymbol {
        name: path.value.clone(),
        kind: SymbolKind::MODULE,
        range: path.range(),
        detail: Some("include".to_string()),
    }));

    if symbols.is_empty() {
        return None;
    }

    // Sort by position to maintain document order
    symbols.sort_by_key(|s| (s.range.start.line, s.range.start.character));

    Some(DocumentSymbolResponse::Nested(symbols_to_flat_list(symbols)))
}

#[allow(deprecated)] // field deprecated has been deprecated in favor of using tags
fn symbols_to_flat_list(symbols: Vec<FlatSymbol>) -> Vec<DocumentSymbol> {
    symbols
        .into_iter()
        .map(|s| DocumentSymbol {
            name: s.name,
            kind: s.kind,
            range: s.range,
            selection_range: s.range,
            detail: s.detail,
            deprecated: None,
            tags: None,
            children: None,
        })
        .collect()
}
