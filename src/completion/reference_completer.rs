//! Reference Completer
//!
//! Completes names of declared services, networks, volumes, configs and
//! secrets wherever a service attribute refers to one:
//!
//! - `depends_on`, `networks`, `volumes`, `configs`, `secrets` list items
//! - keys of the object forms of `depends_on` and `networks`
//! - `source:` of long-syntax `volumes`, `configs` and `secrets` entries
//! - `extends:` and `extends.service:`
//!
//! Candidates come from the current document and every document it includes.
//! A service is never offered as its own dependency. Volume list items get a
//! mount path placeholder: `data:${1:/container/path}`.

use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, InsertTextFormat};

use crate::crossref::{self, DeclarationKind, SlotForm};

use super::util::{replace, typed_prefix, utf16_range, value_prefix};
use super::{Completable, Completer, Context, LineRange};

pub struct ReferenceCompleter<'a> {
    kind: DeclarationKind,
    form: SlotForm,
    candidates: Vec<&'a str>,
    line: usize,
    prefix: LineRange<usize>,
    snippets: bool,
}

impl<'a> Completer<'a> for ReferenceCompleter<'a> {
    fn construct(context: Context<'a>, line: usize, character: usize) -> Option<Self>
    where
        Self: Sized + Completer<'a>,
    {
        if !context.settings.dependency_completion {
            return None;
        }

        let (text, cursor) = context.cursor(line, character)?;
        let chain = context.chain(cursor)?;
        let slot = crossref::slot_at(context.document, &chain, cursor)?;

        let mut candidates = crossref::candidate_names(
            context.store,
            context.document,
            slot.kind,
            slot.file.as_ref(),
        );
        if slot.kind == DeclarationKind::Service && slot.file.is_none() {
            candidates.retain(|name| *name != slot.owner);
        }

        let prefix = match slot.form {
            SlotForm::Value => value_prefix(&text, character),
            SlotForm::ListItem | SlotForm::Key => typed_prefix(&text, character),
        };
        let prefix = utf16_range(&text, prefix);

        Some(Self {
            kind: slot.kind,
            form: slot.form,
            candidates,
            line,
            prefix,
            snippets: context.settings.snippet_support,
        })
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>>
    where
        Self: Sized,
    {
        self.candidates
            .iter()
            .copied()
            .map(ReferenceCompletion)
            .collect::<Vec<_>>()
    }
}

pub struct ReferenceCompletion<'a>(&'a str);

impl<'a> Completable<'a, ReferenceCompleter<'a>> for ReferenceCompletion<'a> {
    fn completions(&self, completer: &ReferenceCompleter<'a>) -> Option<CompletionItem> {
        let name = self.0;
        let (new_text, format) = match (completer.kind, completer.form) {
            (DeclarationKind::Volume, SlotForm::ListItem) if completer.snippets => (
                format!("{name}:${{1:/container/path}}"),
                InsertTextFormat::SNIPPET,
            ),
            (DeclarationKind::Volume, SlotForm::ListItem) => {
                (format!("{name}:"), InsertTextFormat::PLAIN_TEXT)
            }
            (_, SlotForm::Key) => (format!("{name}:"), InsertTextFormat::PLAIN_TEXT),
            _ => (name.to_string(), InsertTextFormat::PLAIN_TEXT),
        };

        Some(CompletionItem {
            label: name.to_string(),
            kind: Some(match completer.kind {
                DeclarationKind::Service => CompletionItemKind::CLASS,
                DeclarationKind::Network => CompletionItemKind::INTERFACE,
                DeclarationKind::Volume => CompletionItemKind::FILE,
                DeclarationKind::Config => CompletionItemKind::VARIABLE,
                DeclarationKind::Secret => CompletionItemKind::KEYWORD,
            }),
            detail: Some(completer.kind.section().to_string()),
            insert_text_format: Some(format),
            text_edit: Some(replace(completer.line, completer.prefix.clone(), new_text)),
            ..Default::default()
        })
    }
}
