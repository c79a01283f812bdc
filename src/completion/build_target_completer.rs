//! Build Target Completer
//!
//! Completes `build.target` with the stage names of the service's
//! Dockerfile (`FROM <image> AS <stage>`). The Dockerfile is taken from the
//! document store; when it is there, its stage list is the complete answer,
//! even when empty.

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, InsertTextFormat};

use crate::position::ChainElement;
use crate::schema::walker;

use super::util::{replace, utf16_range, value_prefix};
use super::{Completable, Completer, Context, LineRange};

static STAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*FROM\s+\S+\s+AS\s+(\S+)").expect("stage pattern"));

pub struct BuildTargetCompleter {
    stages: Vec<String>,
    line: usize,
    prefix: LineRange<usize>,
}

/// `FROM ... AS <stage>` names in order of appearance.
pub fn stage_names(dockerfile: &str) -> Vec<String> {
    let mut stages: Vec<String> = Vec::new();
    for captures in STAGE.captures_iter(dockerfile) {
        let stage = captures[1].to_string();
        if !stages.contains(&stage) {
            stages.push(stage);
        }
    }
    stages
}

impl<'a> Completer<'a> for BuildTargetCompleter {
    fn construct(context: Context<'a>, line: usize, character: usize) -> Option<Self>
    where
        Self: Sized + Completer<'a>,
    {
        use ChainElement::Key;

        let (text, cursor) = context.cursor(line, character)?;
        let chain = context.chain(cursor)?;

        let [Key(services), Key(_), Key(build), Key(target)] = chain.elements() else {
            return None;
        };
        if services.key.value != "services"
            || build.key.value != "build"
            || target.key.value != "target"
            || !walker::past_key(target, cursor)
        {
            return None;
        }

        let uri = context.document.dockerfile_uri(&build.value)?;
        let Some(dockerfile) = context.store.get_document(&uri) else {
            tracing::debug!("Dockerfile {uri} is not loaded");
            return None;
        };

        Some(Self {
            stages: stage_names(dockerfile.text()),
            line,
            prefix: utf16_range(&text, value_prefix(&text, character)),
        })
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>>
    where
        Self: Sized,
    {
        self.stages
            .iter()
            .map(|stage| Stage(stage.clone()))
            .collect::<Vec<_>>()
    }

    fn closed_candidate_set(&self) -> bool {
        true
    }
}

struct Stage(String);

impl<'a> Completable<'a, BuildTargetCompleter> for Stage {
    fn completions(&self, completer: &BuildTargetCompleter) -> Option<CompletionItem> {
        Some(CompletionItem {
            label: self.0.clone(),
            kind: Some(CompletionItemKind::ENUM_MEMBER),
            detail: Some("build stage".to_string()),
            insert_text_format: Some(InsertTextFormat::PLAIN_TEXT),
            text_edit: Some(replace(
                completer.line,
                completer.prefix.clone(),
                self.0.clone(),
            )),
            ..Default::default()
        })
    }
}
