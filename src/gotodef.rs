use tower_lsp::lsp_types::{GotoDefinitionResponse, Location, LocationLink, Position};

use crate::crossref;
use crate::document::{Document, DocumentStore};

/// Declaration of the reference under the cursor.
///
/// With `link_support` the answer is a [`LocationLink`] whose origin is the
/// reference's own span; otherwise a plain [`Location`]. A declaration key
/// resolves to itself.
pub fn goto_definition(
    store: &dyn DocumentStore,
    document: &Document,
    position: Position,
    link_support: bool,
) -> Option<GotoDefinitionResponse> {
    let symbol = crossref::symbol_at(document, position)?;
    let Some(declaration) = crossref::target(store, document, &symbol) else {
        tracing::debug!("no declaration for {:?} {}", symbol.kind(), symbol.name());
        return None;
    };

    if link_support {
        return Some(GotoDefinitionResponse::Link(vec![LocationLink {
            origin_selection_range: Some(symbol.range()),
            target_uri: declaration.uri().clone(),
            target_range: declaration.range(),
            target_selection_range: declaration.range(),
        }]));
    }

    Some(GotoDefinitionResponse::Scalar(Location::new(
        declaration.uri().clone(),
        declaration.range(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::InMemoryDocuments;
    use crate::test_utils::{create_test_workspace_dir, file_uri, position, store_with};
    use std::fs;
    use tower_lsp::lsp_types::Url;

    fn location(response: GotoDefinitionResponse) -> Location {
        match response {
            GotoDefinitionResponse::Scalar(location) => location,
            other => panic!("expected a single location, got {other:?}"),
        }
    }

    /// Test: A `depends_on` entry resolves to the service key in the same file.
    #[test]
    fn test_depends_on_local() {
        let text = "services:\n  test:\n    depends_on:\n      - test2\n  test2:\n    image: alpine\n";
        let store = store_with(&[("/w/compose.yaml", text)]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();

        let result = goto_definition(&store, document, position(3, 10), false)
            .expect("Should find a definition");
        let location = location(result);
        assert_eq!(location.uri, file_uri("/w/compose.yaml"));
        assert_eq!(location.range.start, position(4, 2), "Should point to the test2 key");
        assert_eq!(location.range.end, position(4, 7));
    }

    /// Test: With link support the origin span is the reference token.
    #[test]
    fn test_location_link_has_origin() {
        let text = "services:\n  a:\n    networks:\n      - front\nnetworks:\n  front:\n";
        let store = store_with(&[("/w/compose.yaml", text)]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();

        let Some(GotoDefinitionResponse::Link(links)) =
            goto_definition(&store, document, position(3, 8), true)
        else {
            panic!("expected a location link");
        };
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].origin_selection_range.map(|r| r.start), Some(position(3, 8)));
        assert_eq!(links[0].target_selection_range.start, position(5, 2));
    }

    /// Test: A name declared in an included file on disk resolves into that file.
    #[test]
    fn test_definition_in_included_file_on_disk() {
        let (_temp_dir, dir) = create_test_workspace_dir();
        fs::write(
            dir.join("compose.yaml"),
            "include:\n  - secrets.yaml\nservices:\n  app:\n    secrets:\n      - api_key\n",
        )
        .unwrap();
        fs::write(dir.join("secrets.yaml"), "secrets:\n  api_key:\n    file: ./key\n").unwrap();

        let mut store = InMemoryDocuments::construct(&dir).expect("Failed to index workspace");
        let included = Url::from_file_path(dir.join("secrets.yaml")).unwrap();
        assert!(store.load_if_absent(&included));

        let uri = Url::from_file_path(dir.join("compose.yaml")).unwrap();
        let document = store.get_document(&uri).unwrap();
        let location = location(goto_definition(&store, document, position(5, 9), false).unwrap());
        assert_eq!(location.uri, included, "Should point to secrets.yaml");
        assert_eq!(location.range.start, position(1, 2));
    }

    /// Test: Unknown names yield no definition rather than an error.
    #[test]
    fn test_unresolved_is_none() {
        let text = "services:\n  a:\n    depends_on:\n      - ghost\n";
        let store = store_with(&[("/w/compose.yaml", text)]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();
        assert!(goto_definition(&store, document, position(3, 9), false).is_none());
    }

    /// Test: The cursor on plain YAML outside any reference gives nothing.
    #[test]
    fn test_plain_field_is_none() {
        let text = "services:\n  a:\n    image: alpine\n";
        let store = store_with(&[("/w/compose.yaml", text)]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();
        assert!(goto_definition(&store, document, position(2, 12), false).is_none());
    }
}
