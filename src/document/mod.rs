//! Document snapshots and the store that hands them out.
//!
//! A [`Document`] is an immutable snapshot of one file: its text, a rope for
//! line access, and the parsed YAML stream. Features only ever read
//! snapshots; editing replaces the snapshot in the store.
//!
//! [`DocumentStore`] is the capability features use to reach other files:
//! look a document up by URI, or list every document reachable through the
//! top-level `include:` directive. [`InMemoryDocuments`] is the store used by
//! the server and by tests.

pub mod yaml;

pub use yaml::{Mapping, Node, Pair, ParseError, Pos, Scalar, Sequence, TextSpan, YamlStream};

use std::{
    borrow::Cow,
    collections::{HashMap, HashSet, VecDeque},
    path::{Component, Path, PathBuf},
};

use itertools::Itertools;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use ropey::Rope;
use tower_lsp::lsp_types::Url;
use walkdir::WalkDir;

/// File names picked up when indexing a workspace.
static COMPOSE_FILE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(docker-)?compose([.-][\w.-]+)?\.ya?ml$").expect("compose file name pattern")
});

#[derive(Debug, Clone)]
pub struct Document {
    uri: Url,
    text: String,
    rope: Rope,
    stream: Option<YamlStream>,
    parse_error: Option<ParseError>,
}

impl Document {
    pub fn new(uri: Url, text: &str) -> Document {
        let (stream, parse_error) = yaml::parse_lenient(text);
        if let Some(err) = &parse_error {
            tracing::debug!("{uri}: {err}");
        }

        Document {
            uri,
            text: text.to_string(),
            rope: Rope::from_str(text),
            stream,
            parse_error,
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn stream(&self) -> Option<&YamlStream> {
        self.stream.as_ref()
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        self.parse_error.as_ref()
    }

    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Text of the 0-based `line` without its line terminator.
    pub fn line(&self, line: usize) -> Option<String> {
        let slice = self.rope.get_line(line)?;
        Some(slice.to_string().trim_end_matches(['\n', '\r']).to_string())
    }

    /// Root node of the YAML document containing the 1-based `line`.
    pub fn root_at(&self, line: usize) -> Option<&Node> {
        self.stream
            .as_ref()?
            .document_at(line)
            .map(|document| &document.root)
    }

    /// Root mappings of every YAML document in the file.
    pub fn root_mappings(&self) -> impl Iterator<Item = &Mapping> {
        self.stream
            .iter()
            .flat_map(|stream| stream.roots())
            .filter_map(Node::as_mapping)
    }

    /// Snapshot used for completion on the 0-based `line`.
    ///
    /// A line holding a single colon-less word is a key being typed. It is
    /// blanked so that the half-written key does not change how the
    /// surrounding block parses.
    pub fn for_completion(&self, line: usize) -> Cow<'_, Document> {
        let Some(text) = self.line(line) else {
            return Cow::Borrowed(self);
        };
        let trimmed = text.trim();
        let typing_key = !trimmed.is_empty()
            && !trimmed.contains(':')
            && !trimmed.starts_with('-')
            && !trimmed.starts_with('#')
            && !trimmed.contains(char::is_whitespace);
        if !typing_key {
            return Cow::Borrowed(self);
        }

        let (stream, _) = yaml::parse_lenient(&yaml::blank_line(&self.text, line + 1));
        Cow::Owned(Document {
            stream,
            ..self.clone()
        })
    }

    /// Directory the document lives in, for file URIs.
    pub fn directory(&self) -> Option<PathBuf> {
        let path = self.uri.to_file_path().ok()?;
        path.parent().map(Path::to_path_buf)
    }

    /// Resolves a path written in the document against its directory.
    pub fn resolve_path(&self, written: &str) -> Option<PathBuf> {
        let written = written.trim();
        if written.is_empty() {
            return None;
        }
        let expanded = shellexpand::tilde(written);
        let path = Path::new(expanded.as_ref());
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.directory()?.join(path)
        };
        Some(normalize(&joined))
    }

    pub fn resolve_uri(&self, written: &str) -> Option<Url> {
        Url::from_file_path(self.resolve_path(written)?).ok()
    }

    /// Files named by the top-level `include:` directive, in order.
    pub fn include_targets(&self) -> Vec<Url> {
        self.include_paths()
            .into_iter()
            .filter_map(|scalar| self.resolve_uri(&scalar.value))
            .collect()
    }

    /// The path scalars of every `include:` entry; both the short string form
    /// and the `path:` of the long form (string or list) count.
    pub fn include_paths(&self) -> Vec<&Scalar> {
        self.root_mappings()
            .filter_map(|root| root.get("include"))
            .filter_map(Node::as_sequence)
            .flat_map(|sequence| sequence.items.iter())
            .flat_map(|item| match item {
                Node::Scalar(scalar) => vec![scalar],
                Node::Mapping(entry) => entry.get("path").map(Node::scalars).unwrap_or_default(),
                _ => vec![],
            })
            .collect()
    }

    /// Dockerfile built from a service's `build:` value.
    ///
    /// `dockerfile` is relative to `context`, which defaults to the document's
    /// directory. Remote contexts and inline Dockerfiles have no file.
    pub fn dockerfile_uri(&self, build: &Node) -> Option<Url> {
        let (context, dockerfile) = match build {
            Node::Scalar(context) => (context.value.as_str(), "Dockerfile"),
            Node::Mapping(build) if build.get("dockerfile_inline").is_none() => (
                build.get_str("context").unwrap_or("."),
                build.get_str("dockerfile").unwrap_or("Dockerfile"),
            ),
            _ => return None,
        };
        if context.contains("://") || context.starts_with("git@") {
            return None;
        }

        if Path::new(dockerfile).is_absolute() {
            return self.resolve_uri(dockerfile);
        }
        self.resolve_uri(&format!("{}/{dockerfile}", context.trim_end_matches('/')))
    }

    /// Dockerfiles of every service that builds one.
    pub fn dockerfile_targets(&self) -> Vec<Url> {
        self.root_mappings()
            .filter_map(|root| root.get("services"))
            .filter_map(Node::as_mapping)
            .flat_map(|services| services.pairs.iter())
            .filter_map(|service| service.value.as_mapping()?.get("build"))
            .filter_map(|build| self.dockerfile_uri(build))
            .unique()
            .collect()
    }
}

/// Lexically removes `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Read access to parsed documents by URI.
pub trait DocumentStore {
    fn get_document(&self, uri: &Url) -> Option<&Document>;

    /// Every document reachable from `uri` through `include:`, breadth first
    /// in inclusion order. The starting document is not part of the result,
    /// documents missing from the store are skipped, and cycles are cut.
    fn included_documents(&self, uri: &Url) -> Vec<&Document> {
        let mut seen: HashSet<Url> = HashSet::from([uri.clone()]);
        let mut queue: VecDeque<Url> = self
            .get_document(uri)
            .map(|document| document.include_targets().into())
            .unwrap_or_default();
        let mut included = Vec::new();

        while let Some(target) = queue.pop_front() {
            if !seen.insert(target.clone()) {
                continue;
            }
            match self.get_document(&target) {
                Some(document) => {
                    queue.extend(document.include_targets());
                    included.push(document);
                }
                None => tracing::debug!("included document {target} is not loaded"),
            }
        }

        included
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryDocuments {
    documents: HashMap<Url, Document>,
}

impl InMemoryDocuments {
    pub fn new() -> InMemoryDocuments {
        InMemoryDocuments::default()
    }

    /// Indexes every Compose file under `root_dir`.
    pub fn construct(root_dir: &Path) -> Result<InMemoryDocuments, std::io::Error> {
        let paths = WalkDir::new(root_dir)
            .into_iter()
            .filter_entry(|e| {
                !e.file_name()
                    .to_str()
                    .map(|s| s.starts_with('.') || s == "node_modules")
                    .unwrap_or(false)
            })
            .flatten()
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| COMPOSE_FILE_NAME.is_match(name))
            })
            .collect_vec();

        let documents: HashMap<Url, Document> = paths
            .par_iter()
            .filter_map(|entry| {
                let text = std::fs::read_to_string(entry.path()).ok()?;
                let uri = Url::from_file_path(entry.path()).ok()?;
                Some((uri.clone(), Document::new(uri, &text)))
            })
            .collect();

        tracing::info!("indexed {} compose files under {}", documents.len(), root_dir.display());

        Ok(InMemoryDocuments { documents })
    }

    /// Parses `text` and stores it as the current snapshot of `uri`.
    pub fn write(&mut self, uri: Url, text: &str) -> &Document {
        let document = Document::new(uri.clone(), text);
        self.documents.insert(uri.clone(), document);
        &self.documents[&uri]
    }

    pub fn remove(&mut self, uri: &Url) -> Option<Document> {
        self.documents.remove(uri)
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.documents.contains_key(uri)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Reads `uri` from disk unless a snapshot is already stored.
    ///
    /// Returns whether the store now holds the document.
    pub fn load_if_absent(&mut self, uri: &Url) -> bool {
        if self.contains(uri) {
            return true;
        }
        let Ok(path) = uri.to_file_path() else {
            return false;
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                self.write(uri.clone(), &text);
                true
            }
            Err(err) => {
                tracing::debug!("could not read {}: {err}", path.display());
                false
            }
        }
    }
}

impl DocumentStore for InMemoryDocuments {
    fn get_document(&self, uri: &Url) -> Option<&Document> {
        self.documents.get(uri)
    }
}
