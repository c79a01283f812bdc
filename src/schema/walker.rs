//! Node chain to schema resolution.
//!
//! [`walk`] consumes a [`NodeChain`] one element at a time, starting at the
//! schema root. Keys are looked up in the current object branch (properties
//! first, then the first matching pattern), sequence items switch to the
//! array's item schema. The result is either the schema of the field under
//! the cursor or the properties that may be inserted at the cursor's depth.

use crate::document::Pair;
use crate::position::{ChainElement, Cursor, NodeChain};

use super::{PropertyMap, SchemaRef};

#[derive(Debug, Clone, Copy)]
pub enum ResolvedSchema<'g> {
    /// The cursor sits on a field: its name or its value.
    FieldSchema(SchemaRef<'g>),
    /// The cursor sits where a new attribute of this mapping may be written.
    SiblingProperties(PropertyMap<'g>),
}

/// Resolves the schema that applies at `cursor`.
///
/// Returns `None` when some key of the chain is unknown to the schema.
pub fn walk<'g>(
    root: SchemaRef<'g>,
    chain: &NodeChain<'_>,
    cursor: Cursor,
) -> Option<ResolvedSchema<'g>> {
    let resolved = step(root, chain.elements(), cursor);
    if resolved.is_none() {
        tracing::debug!("no schema for `{}`", chain.describe());
    }
    resolved
}

/// Schema of the field named by the chain's last element, without any
/// cursor-dependent termination.
pub fn field_at<'g>(root: SchemaRef<'g>, elements: &[ChainElement<'_>]) -> Option<SchemaRef<'g>> {
    elements
        .iter()
        .try_fold(root, |schema, element| match_element(schema, element))
}

fn step<'g>(
    schema: SchemaRef<'g>,
    elements: &[ChainElement<'_>],
    cursor: Cursor,
) -> Option<ResolvedSchema<'g>> {
    let Some((element, rest)) = elements.split_first() else {
        return Some(exhausted(schema, cursor));
    };

    let matched = match_element(schema, element)?;

    if let ChainElement::Key(pair) = element {
        // enums sit on the referencing node, so check before following $ref
        if past_key(pair, cursor) && !matched.enum_values().is_empty() {
            return Some(ResolvedSchema::FieldSchema(matched));
        }
    }

    if rest.is_empty() && element.line() == cursor.line {
        return Some(on_cursor_line(matched, element));
    }

    step(matched, rest, cursor)
}

/// Whether `cursor` is on the line of `pair`'s key and past the key's name.
pub fn past_key(pair: &Pair, cursor: Cursor) -> bool {
    pair.key.span.start.line == cursor.line && cursor.column > pair.key.content_span().end.column
}

fn match_element<'g>(schema: SchemaRef<'g>, element: &ChainElement<'_>) -> Option<SchemaRef<'g>> {
    match element {
        ChainElement::Key(pair) => schema.object_branch()?.lookup(&pair.key.value),
        ChainElement::Item(_) => schema.array_items(),
    }
}

/// The chain ended on an earlier line than the cursor's.
fn exhausted(schema: SchemaRef<'_>, cursor: Cursor) -> ResolvedSchema<'_> {
    if cursor.dash {
        // a fresh `- ` under this field starts a new item
        if let Some(items) = schema.array_items() {
            return new_item(items);
        }
    }
    ResolvedSchema::SiblingProperties(schema.object_properties())
}

fn on_cursor_line<'g>(matched: SchemaRef<'g>, element: &ChainElement<'_>) -> ResolvedSchema<'g> {
    match element {
        ChainElement::Key(_) => ResolvedSchema::FieldSchema(matched),
        ChainElement::Item(node) if node.as_mapping().is_some() => {
            ResolvedSchema::SiblingProperties(matched.object_properties())
        }
        ChainElement::Item(_) => new_item(matched),
    }
}

/// A sequence item holding at most a bare word: the first key of an object
/// item, or a value of a scalar item.
fn new_item(items: SchemaRef<'_>) -> ResolvedSchema<'_> {
    match items.object_branch() {
        Some(branch) if items.field_enum().is_none() => {
            ResolvedSchema::SiblingProperties(branch.properties())
        }
        _ => ResolvedSchema::FieldSchema(items),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::yaml;
    use crate::position;
    use crate::schema::SchemaGraph;
    use crate::test_utils::compose_schema;
    use serde_json::json;

    fn resolve_at<'g>(
        schema: &'g SchemaGraph,
        text: &str,
        line: usize,
        column: usize,
    ) -> Option<ResolvedSchema<'g>> {
        let stream = yaml::parse(text).expect("valid yaml");
        let line_text = text.lines().nth(line - 1).unwrap_or("");
        let cursor = Cursor::on_line(line, column, line_text);
        let root = &stream.document_at(line)?.root;
        let chain = position::resolve(root, cursor)?;
        walk(schema.root(), &chain, cursor)
    }

    fn sibling_names(resolved: Option<ResolvedSchema<'_>>) -> Vec<String> {
        match resolved {
            Some(ResolvedSchema::SiblingProperties(properties)) => {
                properties.names().map(str::to_string).collect()
            }
            other => panic!("expected sibling properties, got {other:?}"),
        }
    }

    fn field(resolved: Option<ResolvedSchema<'_>>) -> SchemaRef<'_> {
        match resolved {
            Some(ResolvedSchema::FieldSchema(field)) => field,
            other => panic!("expected a field schema, got {other:?}"),
        }
    }

    // ========================================================================
    // Sibling properties
    // ========================================================================

    #[test]
    fn test_service_attributes_on_blank_line() {
        let schema = compose_schema();
        let names = sibling_names(resolve_at(&schema, "services:\n  test:\n    \n", 3, 5));

        for expected in ["image", "build", "ports", "depends_on"] {
            assert!(names.iter().any(|n| n == expected), "missing `{expected}`");
        }
        for unexpected in ["ipam", "attachable", "driver_opts"] {
            assert!(!names.iter().any(|n| n == unexpected), "unexpected `{unexpected}`");
        }
    }

    #[test]
    fn test_key_start_yields_every_declared_property() {
        let schema = compose_schema();
        let text = "services:\n  web:\n    image: nginx\n    build:\n      context: .\n";

        let service = sibling_names(resolve_at(&schema, text, 3, 5));
        let declared: Vec<String> = schema
            .root()
            .property("services")
            .and_then(|services| services.pattern_property("web"))
            .map(|web| web.object_properties().names().map(str::to_string).collect())
            .unwrap_or_default();
        assert_eq!(service, declared, "no filtering by present siblings");

        let build = sibling_names(resolve_at(&schema, text, 5, 7));
        assert!(build.contains(&"context".to_string()));
        assert!(build.contains(&"dockerfile".to_string()));
    }

    #[test]
    fn test_one_of_object_branch_under_build() {
        let schema = compose_schema();
        let text = "services:\n  web:\n    build:\n      \n";
        let names = sibling_names(resolve_at(&schema, text, 4, 7));
        assert!(names.contains(&"target".to_string()));
    }

    #[test]
    fn test_pattern_properties_under_networks() {
        let schema = compose_schema();
        let text = "networks:\n  backend:\n    \n";
        let names = sibling_names(resolve_at(&schema, text, 3, 5));
        assert!(names.contains(&"ipam".to_string()));
        assert!(names.contains(&"attachable".to_string()));
        assert!(!names.contains(&"image".to_string()));
    }

    #[test]
    fn test_array_item_object_properties() {
        let schema = compose_schema();
        let text = "services:\n  a:\n    ports:\n      - target: 80\n        \n";
        let names = sibling_names(resolve_at(&schema, text, 5, 9));
        assert!(names.contains(&"published".to_string()));
        assert!(names.contains(&"protocol".to_string()));
    }

    #[test]
    fn test_new_dash_item_offers_object_keys() {
        let schema = compose_schema();
        let text = "services:\n  a:\n    volumes:\n      - type: bind\n      - \n";
        let names = sibling_names(resolve_at(&schema, text, 5, 9));
        assert!(names.contains(&"source".to_string()));
        assert!(names.contains(&"read_only".to_string()));
    }

    #[test]
    fn test_top_level_keys() {
        let schema = compose_schema();
        let text = "services:\n  a:\n    image: x\n";
        let stream = yaml::parse(text).unwrap();
        let cursor = Cursor::on_line(4, 4, "net");
        let chain = position::resolve(&stream.documents[0].root, cursor).unwrap();
        assert!(chain.is_empty(), "typing a top-level key");
        let names = sibling_names(walk(schema.root(), &chain, cursor));
        assert!(names.contains(&"networks".to_string()));
    }

    // ========================================================================
    // Field schemas
    // ========================================================================

    #[test]
    fn test_enum_field_on_value() {
        let schema = compose_schema();
        let text = "services:\n  a:\n    restart: \n";
        let restart = field(resolve_at(&schema, text, 3, 14));
        assert_eq!(restart.field_enum().map(<[String]>::len), Some(4));
    }

    #[test]
    fn test_enum_on_referencing_node_short_circuits() {
        let schema = compose_schema();
        let text = "services:\n  a:\n    pull_policy: \n";
        let policy = field(resolve_at(&schema, text, 3, 18));
        assert!(policy.enum_values().contains(&"always".to_string()));
        assert!(policy.reference().is_some(), "reference left unfollowed");
    }

    #[test]
    fn test_field_on_key_line() {
        let schema = compose_schema();
        let text = "services:\n  a:\n    image: alpine\n";
        let image = field(resolve_at(&schema, text, 3, 7));
        assert_eq!(
            image.field_description(),
            Some("Specifies the image to start the container from.")
        );
    }

    #[test]
    fn test_unknown_key_is_a_miss() {
        let schema = compose_schema();
        let text = "services:\n  a:\n    bogus:\n      \n";
        assert!(resolve_at(&schema, text, 4, 7).is_none());
    }

    #[test]
    fn test_enum_item_is_a_field() {
        let schema = SchemaGraph::from_value(&json!({
            "properties": {
                "modes": {
                    "type": "array",
                    "items": { "type": "string", "enum": ["a", "b"] }
                }
            }
        }))
        .unwrap();
        let text = "modes:\n  - \n";
        let items = field(resolve_at(&schema, text, 2, 5));
        assert_eq!(items.enum_values(), ["a", "b"]);
    }

    // ========================================================================
    // Synthetic schemas
    // ========================================================================

    #[test]
    fn test_overlapping_patterns_resolve_to_first() {
        let schema = SchemaGraph::from_value(&json!({
            "patternProperties": {
                "^svc": { "properties": { "first": { "type": "string" } } },
                "^svc-x": { "properties": { "second": { "type": "string" } } }
            }
        }))
        .unwrap();
        let text = "svc-x:\n  \n";
        assert_eq!(sibling_names(resolve_at(&schema, text, 2, 3)), vec!["first"]);
    }

    #[test]
    fn test_field_at_follows_items_and_patterns() {
        let schema = compose_schema();
        let text = "services:\n  a:\n    depends_on:\n      - b\n";
        let stream = yaml::parse(text).unwrap();
        let cursor = Cursor::new(4, 10);
        let chain = position::resolve(&stream.documents[0].root, cursor).unwrap();
        let item = field_at(schema.root(), chain.elements()).expect("item schema");
        assert!(item
            .flattened_types()
            .contains(&crate::schema::SchemaType::String));
    }
}
