use tower_lsp::lsp_types::{CompletionItem, CompletionList, CompletionResponse, Position};

use crate::{
    config::Settings,
    document::{Document, DocumentStore},
    position::{self, char_index, Cursor, NodeChain},
    schema::SchemaGraph,
};

use self::{
    build_target_completer::BuildTargetCompleter, reference_completer::ReferenceCompleter,
    schema_completer::SchemaCompleter,
};

mod build_target_completer;
mod reference_completer;
mod schema_completer;
mod util;

#[derive(Clone, Copy)]
pub struct Context<'a> {
    document: &'a Document,
    store: &'a dyn DocumentStore,
    schema: Option<&'a SchemaGraph>,
    settings: &'a Settings,
}

impl<'a> Context<'a> {
    /// Text of the 0-based `line` and the cursor before its character
    /// `character`. Completion positions sit between characters.
    fn cursor(&self, line: usize, character: usize) -> Option<(String, Cursor)> {
        let text = self.document.line(line)?;
        let cursor = Cursor::on_line(line + 1, character + 1, &text);
        Some((text, cursor))
    }

    fn chain(&self, cursor: Cursor) -> Option<NodeChain<'a>> {
        let root = self.document.root_at(cursor.line)?;
        position::resolve(root, cursor)
    }
}

pub trait Completer<'a>: Sized {
    fn construct(context: Context<'a>, line: usize, character: usize) -> Option<Self>
    where
        Self: Sized + Completer<'a>;

    fn completions(&self) -> Vec<impl Completable<'a, Self>>
    where
        Self: Sized;

    /// Whether an empty candidate list is itself an answer.
    fn closed_candidate_set(&self) -> bool {
        false
    }
}

pub trait Completable<'a, T: Completer<'a>>: Sized {
    fn completions(&self, completer: &T) -> Option<CompletionItem>;
}

/// Range indexes for one line of the file; NOT THE WHOLE FILE
type LineRange<T> = std::ops::Range<T>;

pub fn get_completions(
    document: &Document,
    store: &dyn DocumentStore,
    schema: Option<&SchemaGraph>,
    position: Position,
    settings: &Settings,
) -> Option<CompletionResponse> {
    let line = document.line(position.line as usize)?;
    // completers count characters, edits go back out as UTF-16
    let character = char_index(&line, position.character as usize) as u32;
    if util::in_comment(&line, character as usize) {
        return None;
    }

    let snapshot = document.for_completion(position.line as usize);
    let completion_context = Context {
        document: &snapshot,
        store,
        schema,
        settings,
    };

    run_completer::<BuildTargetCompleter>(completion_context, position.line, character)
        .or_else(|| {
            run_completer::<ReferenceCompleter>(completion_context, position.line, character)
        })
        .or_else(|| run_completer::<SchemaCompleter>(completion_context, position.line, character))
}

fn run_completer<'a, T: Completer<'a>>(
    context: Context<'a>,
    line: u32,
    character: u32,
) -> Option<CompletionResponse> {
    let completer = T::construct(context, line as usize, character as usize)?;
    let completions = completer.completions();

    let mut items = completions
        .into_iter()
        .filter_map(|completable| completable.completions(&completer))
        .collect::<Vec<CompletionItem>>();
    items.sort_by(|a, b| a.label.cmp(&b.label));
    items.dedup_by(|a, b| a.label == b.label);

    if items.is_empty() && !completer.closed_candidate_set() {
        return None;
    }

    Some(CompletionResponse::List(CompletionList {
        is_incomplete: false,
        items,
    }))
}
