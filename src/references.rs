use itertools::Itertools;
use tower_lsp::lsp_types::{Location, Position, Range};

use crate::crossref::{self, Declaration, Symbol};
use crate::document::{Document, DocumentStore};

/// One place a declared name is written.
#[derive(Debug, Clone)]
pub struct Occurrence {
    pub location: Location,
    pub is_declaration: bool,
}

fn same_declaration(a: &Declaration<'_>, b: &Declaration<'_>) -> bool {
    a.kind == b.kind && a.uri() == b.uri() && a.range() == b.range()
}

/// Every occurrence of `declaration` in `document`, the documents it
/// includes, and the declaring document.
pub fn occurrences<'s>(
    store: &'s dyn DocumentStore,
    document: &'s Document,
    declaration: &Declaration<'s>,
) -> Vec<Occurrence> {
    let mut scope = vec![document];
    scope.extend(store.included_documents(document.uri()));
    if scope.iter().all(|candidate| candidate.uri() != declaration.uri()) {
        scope.push(declaration.document);
    }

    let mut found = Vec::new();
    for candidate in scope {
        found.extend(
            crossref::declarations(candidate)
                .into_iter()
                .filter(|other| same_declaration(other, declaration))
                .map(|other| Occurrence {
                    location: Location::new(other.uri().clone(), other.range()),
                    is_declaration: true,
                }),
        );
        found.extend(
            crossref::references(candidate)
                .into_iter()
                .filter(|reference| reference.kind == declaration.kind)
                .filter(|reference| {
                    crossref::resolve(store, candidate, reference)
                        .is_some_and(|resolved| same_declaration(&resolved, declaration))
                })
                .map(|reference| Occurrence {
                    location: Location::new(candidate.uri().clone(), reference.range),
                    is_declaration: false,
                }),
        );
    }

    found
        .into_iter()
        .unique_by(|occurrence| {
            let Range { start, end } = occurrence.location.range;
            (
                occurrence.location.uri.clone(),
                (start.line, start.character, end.line, end.character),
            )
        })
        .collect()
}

/// Occurrences of the symbol under the cursor, or `None` when there is no
/// symbol or it does not resolve.
pub fn symbol_occurrences<'s>(
    store: &'s dyn DocumentStore,
    document: &'s Document,
    position: Position,
) -> Option<Vec<Occurrence>> {
    let symbol: Symbol<'s> = crossref::symbol_at(document, position)?;
    let declaration = crossref::target(store, document, &symbol)?;
    Some(occurrences(store, document, &declaration))
}

pub fn references(
    store: &dyn DocumentStore,
    document: &Document,
    position: Position,
    include_declaration: bool,
) -> Option<Vec<Location>> {
    Some(
        symbol_occurrences(store, document, position)?
            .into_iter()
            .filter(|occurrence| include_declaration || !occurrence.is_declaration)
            .map(|occurrence| occurrence.location)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{file_uri, position, store_with};

    const MAIN: &str = "include:
  - shared.yaml
services:
  web:
    depends_on:
      - db
    networks:
      - back
  db:
    networks:
      back: {}
";

    const SHARED: &str = "networks:
  back:
services:
  worker:
    networks: [back]
";

    /// Test: References to a network declared in an included file are found in
    /// both files, and the declaration is reported only when asked for.
    #[test]
    fn test_references_across_include() {
        let store = store_with(&[("/w/compose.yaml", MAIN), ("/w/shared.yaml", SHARED)]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();

        let locations = references(&store, document, position(7, 9), false)
            .expect("reference under cursor");
        let found: Vec<_> = locations
            .iter()
            .map(|l| (l.uri.path().to_string(), l.range.start.line))
            .collect();
        assert_eq!(
            found,
            vec![
                ("/w/compose.yaml".to_string(), 7),
                ("/w/compose.yaml".to_string(), 10),
                ("/w/shared.yaml".to_string(), 4),
            ]
        );

        let with_declaration = references(&store, document, position(7, 9), true).unwrap();
        assert_eq!(with_declaration.len(), 4, "declaration is included on request");
    }

    /// Test: Starting from the declaration finds the same references.
    #[test]
    fn test_references_from_declaration() {
        let store = store_with(&[("/w/compose.yaml", MAIN)]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();

        let locations = references(&store, document, position(8, 3), false).unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].range.start, position(5, 8));
    }

    /// Test: A declaration reached through two include paths is reported once.
    #[test]
    fn test_occurrences_are_unique() {
        let store = store_with(&[
            (
                "/w/compose.yaml",
                "include:\n  - shared.yaml\n  - extra.yaml\nservices:\n  web:\n    networks: [back]\n",
            ),
            ("/w/extra.yaml", "include:\n  - shared.yaml\n"),
            ("/w/shared.yaml", SHARED),
        ]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();

        let locations = references(&store, document, position(5, 16), true).unwrap();
        let declarations = locations
            .iter()
            .filter(|l| l.uri == file_uri("/w/shared.yaml") && l.range.start == position(1, 2))
            .count();
        assert_eq!(declarations, 1, "declaration listed once");
        assert_eq!(locations.len(), 3, "web, worker and the declaration");
    }

    /// Test: Nothing under the cursor gives no result.
    #[test]
    fn test_no_symbol() {
        let store = store_with(&[("/w/compose.yaml", MAIN)]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();
        assert!(references(&store, document, position(4, 6), false).is_none());
    }
}
