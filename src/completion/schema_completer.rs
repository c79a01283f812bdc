//! Schema Completer
//!
//! Completes attribute names and enum values from the schema that applies at
//! the cursor.
//!
//! ## Attribute names
//! On an indented line inside a mapping, every property the schema declares
//! at that depth is offered. The inserted text depends on the property's
//! flattened types:
//!
//! | types | inserted |
//! |---|---|
//! | `array` | `name:\n<spacing>- ` |
//! | `array, object` or `object` | `name:\n<spacing>` |
//! | other combinations with `array` or `object` | `name:` |
//! | has an enum | `name: ${1\|a,b\|}` |
//! | anything else | `name: ` |
//!
//! `<spacing>` is the current line's indentation plus one level.
//!
//! ## Enum values
//! After `key:` (or on a sequence item) whose schema has an enum, each value
//! is offered, replacing whatever was typed after the colon.

use std::collections::BTreeSet;

use itertools::Itertools;
use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, Documentation, InsertTextFormat};

use crate::position::ChainElement;
use crate::schema::{
    walker::{self, ResolvedSchema},
    SchemaRef, SchemaType,
};

use super::util::{
    continuation_spacing, escape_choice, replace, typed_prefix, utf16_range, value_prefix,
};
use super::{Completable, Completer, Context, LineRange};

pub struct SchemaCompleter<'a> {
    resolved: ResolvedSchema<'a>,
    line: usize,
    /// Characters the completion replaces
    prefix: LineRange<usize>,
    spacing: String,
    snippets: bool,
}

impl<'a> Completer<'a> for SchemaCompleter<'a> {
    fn construct(context: Context<'a>, line: usize, character: usize) -> Option<Self>
    where
        Self: Sized + Completer<'a>,
    {
        let schema = context.schema?;
        let (text, cursor) = context.cursor(line, character)?;
        let chain = context.chain(cursor)?;
        let resolved = walker::walk(schema.root(), &chain, cursor)?;

        let prefix = match resolved {
            ResolvedSchema::FieldSchema(_) => {
                // inside the key name there is no value to complete
                let on_key = chain.last().and_then(ChainElement::pair).is_some_and(|pair| {
                    pair.key.span.start.line == cursor.line && !walker::past_key(pair, cursor)
                });
                if on_key {
                    return None;
                }
                value_prefix(&text, character)
            }
            ResolvedSchema::SiblingProperties(_) => typed_prefix(&text, character),
        };

        Some(Self {
            resolved,
            line,
            prefix: utf16_range(&text, prefix),
            spacing: continuation_spacing(&text),
            snippets: context.settings.snippet_support,
        })
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>>
    where
        Self: Sized,
    {
        match self.resolved {
            ResolvedSchema::SiblingProperties(properties) => properties
                .iter()
                .map(|(name, schema)| SchemaCompletion::Property { name, schema })
                .collect::<Vec<_>>(),
            ResolvedSchema::FieldSchema(field) => {
                let detail = type_detail(&field.flattened_types());
                field
                    .field_enum()
                    .unwrap_or_default()
                    .iter()
                    .map(|value| SchemaCompletion::EnumValue {
                        value,
                        detail: detail.clone(),
                    })
                    .collect::<Vec<_>>()
            }
        }
    }
}

pub enum SchemaCompletion<'a> {
    Property { name: &'a str, schema: SchemaRef<'a> },
    EnumValue { value: &'a str, detail: Option<String> },
}

impl<'a> Completable<'a, SchemaCompleter<'a>> for SchemaCompletion<'a> {
    fn completions(&self, completer: &SchemaCompleter<'a>) -> Option<CompletionItem> {
        match self {
            SchemaCompletion::Property { name, schema } => {
                let (new_text, format) =
                    property_insert_text(name, *schema, &completer.spacing, completer.snippets);
                Some(CompletionItem {
                    label: name.to_string(),
                    kind: Some(CompletionItemKind::PROPERTY),
                    detail: type_detail(&schema.flattened_types()),
                    documentation: schema
                        .field_description()
                        .map(|description| Documentation::String(description.to_string())),
                    insert_text_format: Some(format),
                    text_edit: Some(replace(completer.line, completer.prefix.clone(), new_text)),
                    ..Default::default()
                })
            }
            SchemaCompletion::EnumValue { value, detail } => Some(CompletionItem {
                label: value.to_string(),
                kind: Some(CompletionItemKind::ENUM_MEMBER),
                detail: detail.clone(),
                insert_text_format: Some(InsertTextFormat::PLAIN_TEXT),
                text_edit: Some(replace(
                    completer.line,
                    completer.prefix.clone(),
                    value.to_string(),
                )),
                ..Default::default()
            }),
        }
    }
}

/// `"array or object"` style list of a field's types.
fn type_detail(types: &BTreeSet<SchemaType>) -> Option<String> {
    if types.is_empty() {
        return None;
    }
    Some(types.iter().map(SchemaType::as_str).join(" or "))
}

fn property_insert_text(
    name: &str,
    schema: SchemaRef<'_>,
    spacing: &str,
    snippets: bool,
) -> (String, InsertTextFormat) {
    use SchemaType::{Array, Object};

    let types = schema.flattened_types();
    let only = |expected: &[SchemaType]| types.iter().eq(expected.iter());

    let plain = |text: String| (text, InsertTextFormat::PLAIN_TEXT);

    if only(&[Array]) {
        return plain(format!("{name}:\n{spacing}- "));
    }
    if only(&[Array, Object]) || only(&[Object]) {
        return plain(format!("{name}:\n{spacing}"));
    }
    if types.contains(&Array) || types.contains(&Object) {
        return plain(format!("{name}:"));
    }

    match schema.field_enum() {
        Some(values) if snippets => {
            let choices = values
                .iter()
                .sorted()
                .dedup()
                .map(|value| escape_choice(value))
                .join(",");
            (format!("{name}: ${{1|{choices}|}}"), InsertTextFormat::SNIPPET)
        }
        _ => plain(format!("{name}: ")),
    }
}
