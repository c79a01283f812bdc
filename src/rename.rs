use itertools::Itertools;
use tower_lsp::lsp_types::{
    DocumentChangeOperation, DocumentChanges, OneOf, OptionalVersionedTextDocumentIdentifier,
    Position, PrepareRenameResponse, TextDocumentEdit, TextEdit, WorkspaceEdit,
};

use crate::crossref;
use crate::document::{Document, DocumentStore};
use crate::references;

/// Range of the renameable name under the cursor.
///
/// Only names that resolve to a declaration can be renamed; a dangling
/// reference has nothing to keep consistent.
pub fn prepare_rename(
    store: &dyn DocumentStore,
    document: &Document,
    position: Position,
) -> Option<PrepareRenameResponse> {
    let symbol = crossref::symbol_at(document, position)?;
    crossref::target(store, document, &symbol)?;
    Some(PrepareRenameResponse::RangeWithPlaceholder {
        range: symbol.range(),
        placeholder: symbol.name().to_string(),
    })
}

/// Renames the declaration under the cursor, or the one a reference points
/// at, together with every reference to it.
pub fn rename(
    store: &dyn DocumentStore,
    document: &Document,
    position: Position,
    new_name: &str,
) -> Option<WorkspaceEdit> {
    let new_name = new_name.trim();
    if new_name.is_empty() || new_name.contains(char::is_whitespace) {
        tracing::debug!("refusing to rename to {new_name:?}");
        return None;
    }

    let occurrences = references::symbol_occurrences(store, document, position)?;

    let changes = occurrences
        .into_iter()
        .map(|occurrence| occurrence.location)
        .into_group_map_by(|location| location.uri.clone())
        .into_iter()
        .sorted_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()))
        .map(|(uri, locations)| {
            DocumentChangeOperation::Edit(TextDocumentEdit {
                text_document: OptionalVersionedTextDocumentIdentifier { uri, version: None },
                edits: locations
                    .into_iter()
                    .map(|location| {
                        OneOf::Left(TextEdit {
                            range: location.range,
                            new_text: new_name.to_string(),
                        })
                    })
                    .collect(),
            })
        })
        .collect();

    Some(WorkspaceEdit {
        document_changes: Some(DocumentChanges::Operations(changes)),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{file_uri, position, store_with};
    use pretty_assertions::assert_eq;
    use tower_lsp::lsp_types::Range;

    const MAIN: &str = "include:
  - volumes.yaml
services:
  app:
    volumes:
      - data:/var/lib/app
      - type: volume
        source: data
        target: /backup
  other:
    volumes:
      - ./data:/data
";

    const VOLUMES: &str = "volumes:
  data:
    driver: local
";

    fn edits(edit: WorkspaceEdit) -> Vec<(String, Range, String)> {
        let Some(DocumentChanges::Operations(operations)) = edit.document_changes else {
            panic!("expected document change operations");
        };
        let mut found = Vec::new();
        for operation in operations {
            let DocumentChangeOperation::Edit(document_edit) = operation else {
                panic!("expected text document edits only");
            };
            let path = document_edit.text_document.uri.path().to_string();
            for edit in document_edit.edits {
                let OneOf::Left(edit) = edit else {
                    panic!("unexpected annotated edit");
                };
                found.push((path.clone(), edit.range, edit.new_text));
            }
        }
        found
    }

    fn range(line: u32, start: u32, end: u32) -> Range {
        Range::new(position(line, start), position(line, end))
    }

    /// Test: Renaming a volume from a short-syntax mount edits only the name
    /// part of every mount and the declaration in the included file.
    #[test]
    fn test_rename_volume_across_include() {
        let store = store_with(&[("/w/compose.yaml", MAIN), ("/w/volumes.yaml", VOLUMES)]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();

        let edit = rename(&store, document, position(5, 9), "state").expect("rename");
        assert_eq!(
            edits(edit),
            vec![
                ("/w/compose.yaml".to_string(), range(5, 8, 12), "state".to_string()),
                ("/w/compose.yaml".to_string(), range(7, 16, 20), "state".to_string()),
                ("/w/volumes.yaml".to_string(), range(1, 2, 6), "state".to_string()),
            ]
        );
    }

    /// Test: Renaming a service from its declaration updates `depends_on` and
    /// `extends` references.
    #[test]
    fn test_rename_service_from_declaration() {
        let text = "services:
  db:
    image: postgres
  api:
    depends_on:
      db:
        condition: service_healthy
  replica:
    extends: db
";
        let store = store_with(&[("/w/compose.yaml", text)]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();

        let edit = rename(&store, document, position(1, 3), "database").expect("rename");
        let ranges: Vec<Range> = edits(edit).into_iter().map(|(_, range, _)| range).collect();
        assert_eq!(ranges, vec![range(1, 2, 4), range(5, 6, 8), range(8, 13, 15)]);
    }

    #[test]
    fn test_prepare_rename_returns_name_range() {
        let store = store_with(&[("/w/compose.yaml", MAIN), ("/w/volumes.yaml", VOLUMES)]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();

        match prepare_rename(&store, document, position(7, 17)) {
            Some(PrepareRenameResponse::RangeWithPlaceholder { range: found, placeholder }) => {
                assert_eq!(found, range(7, 16, 20));
                assert_eq!(placeholder, "data");
            }
            other => panic!("unexpected prepare rename response {other:?}"),
        }
    }

    #[test]
    fn test_host_paths_are_not_renameable() {
        let store = store_with(&[("/w/compose.yaml", MAIN), ("/w/volumes.yaml", VOLUMES)]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();
        assert!(prepare_rename(&store, document, position(11, 10)).is_none());
    }

    #[test]
    fn test_blank_new_name_is_rejected() {
        let store = store_with(&[("/w/compose.yaml", MAIN), ("/w/volumes.yaml", VOLUMES)]);
        let document = store.get_document(&file_uri("/w/compose.yaml")).unwrap();
        assert!(rename(&store, document, position(5, 9), "  ").is_none());
    }
}
