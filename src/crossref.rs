//! Declarations and the service attributes that refer to them.
//!
//! A declaration is a key of one of the top-level `services`, `networks`,
//! `volumes`, `configs` and `secrets` mappings. References are the service
//! attributes naming one: `depends_on`, `networks`, `volumes`, `configs`,
//! `secrets`, `build.secrets` and `extends`, in both their list and object
//! forms.
//!
//! Names are looked up in the current document first and then in every
//! document it includes, in inclusion order; the first declaration found
//! wins. `extends.file` moves the lookup to the named file.

use itertools::Itertools;
use tower_lsp::lsp_types::{Position, Range, Url};

use crate::document::{Document, DocumentStore, Mapping, Node, Pair, Pos, Scalar, TextSpan};
use crate::position::{ChainElement, Cursor, NodeChain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Service,
    Network,
    Volume,
    Config,
    Secret,
}

impl DeclarationKind {
    pub const ALL: [DeclarationKind; 5] = [
        DeclarationKind::Service,
        DeclarationKind::Network,
        DeclarationKind::Volume,
        DeclarationKind::Config,
        DeclarationKind::Secret,
    ];

    /// Top-level key holding declarations of this kind.
    pub fn section(&self) -> &'static str {
        match self {
            DeclarationKind::Service => "services",
            DeclarationKind::Network => "networks",
            DeclarationKind::Volume => "volumes",
            DeclarationKind::Config => "configs",
            DeclarationKind::Secret => "secrets",
        }
    }

    pub fn from_section(section: &str) -> Option<DeclarationKind> {
        DeclarationKind::ALL
            .into_iter()
            .find(|kind| kind.section() == section)
    }

    /// Kind named by the entries of a service attribute.
    fn from_attribute(attribute: &str) -> Option<DeclarationKind> {
        match attribute {
            "depends_on" => Some(DeclarationKind::Service),
            other => DeclarationKind::from_section(other)
                .filter(|kind| *kind != DeclarationKind::Service),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Declaration<'d> {
    pub kind: DeclarationKind,
    pub key: &'d Scalar,
    pub document: &'d Document,
}

impl<'d> Declaration<'d> {
    pub fn name(&self) -> &'d str {
        &self.key.value
    }

    pub fn range(&self) -> Range {
        self.key.range()
    }

    pub fn uri(&self) -> &'d Url {
        self.document.uri()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'d> {
    pub kind: DeclarationKind,
    pub name: &'d str,
    /// Span of the name only; for `data:/path` that is `data`.
    pub range: Range,
    /// Service whose attributes hold the reference.
    pub owner: &'d str,
    /// File named by `extends.file`.
    pub file: Option<Url>,
}

impl Reference<'_> {
    pub fn contains(&self, position: Position) -> bool {
        self.range.start.line == position.line
            && self.range.start.character <= position.character
            && position.character <= self.range.end.character
    }
}

/// Every declaration in `document`, section by section.
pub fn declarations(document: &Document) -> Vec<Declaration<'_>> {
    let mut found = Vec::new();
    for root in document.root_mappings() {
        for kind in DeclarationKind::ALL {
            let Some(section) = root.get(kind.section()).and_then(Node::as_mapping) else {
                continue;
            };
            found.extend(section.pairs.iter().map(|pair| Declaration {
                kind,
                key: &pair.key,
                document,
            }));
        }
    }
    found
}

/// Every reference in `document`, service by service.
pub fn references(document: &Document) -> Vec<Reference<'_>> {
    let mut found = Vec::new();
    for root in document.root_mappings() {
        let Some(services) = root.get("services").and_then(Node::as_mapping) else {
            continue;
        };
        for service in &services.pairs {
            if let Node::Mapping(attributes) = &service.value {
                service_references(document, &service.key.value, attributes, &mut found);
            }
        }
    }
    found
}

fn service_references<'d>(
    document: &'d Document,
    owner: &'d str,
    attributes: &'d Mapping,
    found: &mut Vec<Reference<'d>>,
) {
    let reference = |kind, scalar: &'d Scalar| Reference {
        kind,
        name: &scalar.value,
        range: scalar.range(),
        owner,
        file: None,
    };

    for attribute in &attributes.pairs {
        let name = attribute.key.value.as_str();
        match (name, &attribute.value) {
            ("depends_on" | "networks", Node::Sequence(sequence)) => {
                let kind = DeclarationKind::from_attribute(name);
                for item in sequence.items.iter().filter_map(Node::as_scalar) {
                    found.extend(kind.map(|kind| reference(kind, item)));
                }
            }
            ("depends_on" | "networks", Node::Mapping(entries)) => {
                let kind = DeclarationKind::from_attribute(name);
                for entry in &entries.pairs {
                    found.extend(kind.map(|kind| reference(kind, &entry.key)));
                }
            }
            ("volumes", Node::Sequence(sequence)) => {
                for item in &sequence.items {
                    match item {
                        Node::Scalar(short) => found.extend(short_volume(short, owner)),
                        Node::Mapping(long) if mounts_volume(long) => {
                            let source = long.get("source").and_then(Node::as_scalar);
                            if let Some(source) = source.filter(|s| is_declared_name(&s.value)) {
                                found.push(reference(DeclarationKind::Volume, source));
                            }
                        }
                        _ => {}
                    }
                }
            }
            ("configs" | "secrets", Node::Sequence(sequence)) => {
                if let Some(kind) = DeclarationKind::from_attribute(name) {
                    found.extend(
                        grants(sequence.items.iter()).map(|scalar| reference(kind, scalar)),
                    );
                }
            }
            ("build", Node::Mapping(build)) => {
                if let Some(Node::Sequence(secrets)) = build.get("secrets") {
                    found.extend(
                        grants(secrets.items.iter())
                            .map(|scalar| reference(DeclarationKind::Secret, scalar)),
                    );
                }
            }
            ("extends", Node::Scalar(service)) => {
                found.push(reference(DeclarationKind::Service, service));
            }
            ("extends", Node::Mapping(extends)) => {
                if let Some(service) = extends.get("service").and_then(Node::as_scalar) {
                    found.push(Reference {
                        file: extends_file(document, extends),
                        ..reference(DeclarationKind::Service, service)
                    });
                }
            }
            _ => {}
        }
    }
}

/// Names granted by `configs`/`secrets` lists: `- name` or `- source: name`.
fn grants<'d>(items: impl Iterator<Item = &'d Node>) -> impl Iterator<Item = &'d Scalar> {
    items.filter_map(|item| match item {
        Node::Scalar(scalar) => Some(scalar),
        Node::Mapping(long) => long.get("source").and_then(Node::as_scalar),
        _ => None,
    })
}

/// `data:/var/lib/data[:ro]` names the volume `data`; host paths name none.
fn short_volume<'d>(scalar: &'d Scalar, owner: &'d str) -> Option<Reference<'d>> {
    let (name, _) = scalar.value.split_once(':')?;
    if !is_declared_name(name) {
        return None;
    }
    let start = scalar.content_span().start;
    let end = Pos::new(start.line, start.column + name.chars().count());

    Some(Reference {
        kind: DeclarationKind::Volume,
        name,
        range: TextSpan { start, end }.to_lsp(),
        owner,
        file: None,
    })
}

fn mounts_volume(long: &Mapping) -> bool {
    matches!(long.get_str("type"), None | Some("volume"))
}

fn is_declared_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_alphanumeric)
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn extends_file(document: &Document, extends: &Mapping) -> Option<Url> {
    extends
        .get_str("file")
        .and_then(|file| document.resolve_uri(file))
}

pub fn reference_at(document: &Document, position: Position) -> Option<Reference<'_>> {
    references(document)
        .into_iter()
        .find(|reference| reference.contains(position))
}

pub fn declaration_at(document: &Document, position: Position) -> Option<Declaration<'_>> {
    declarations(document)
        .into_iter()
        .find(|declaration| declaration.key.contains(position))
}

/// The document a lookup starts in, followed by the documents it includes.
fn search_scope<'s>(
    store: &'s dyn DocumentStore,
    document: &'s Document,
    file: Option<&Url>,
) -> Vec<&'s Document> {
    let start = match file {
        Some(uri) => match store.get_document(uri) {
            Some(target) => target,
            None => {
                tracing::debug!("extended file {uri} is not loaded");
                return vec![];
            }
        },
        None => document,
    };

    let mut scope = vec![start];
    scope.extend(store.included_documents(start.uri()));
    scope
}

/// First declaration of `name` reachable from `document`.
pub fn find_declaration<'s>(
    store: &'s dyn DocumentStore,
    document: &'s Document,
    kind: DeclarationKind,
    name: &str,
    file: Option<&Url>,
) -> Option<Declaration<'s>> {
    search_scope(store, document, file)
        .into_iter()
        .find_map(|candidate| {
            declarations(candidate)
                .into_iter()
                .find(|declaration| declaration.kind == kind && declaration.name() == name)
        })
}

pub fn resolve<'s>(
    store: &'s dyn DocumentStore,
    document: &'s Document,
    reference: &Reference<'_>,
) -> Option<Declaration<'s>> {
    find_declaration(
        store,
        document,
        reference.kind,
        reference.name,
        reference.file.as_ref(),
    )
}

/// Names of every reachable declaration of `kind`, in lookup order.
pub fn candidate_names<'s>(
    store: &'s dyn DocumentStore,
    document: &'s Document,
    kind: DeclarationKind,
    file: Option<&Url>,
) -> Vec<&'s str> {
    search_scope(store, document, file)
        .into_iter()
        .flat_map(declarations)
        .filter(|declaration| declaration.kind == kind)
        .map(|declaration| declaration.name())
        .unique()
        .collect()
}

/// A declaration or a reference under the cursor.
#[derive(Debug, Clone)]
pub enum Symbol<'d> {
    Declaration(Declaration<'d>),
    Reference(Reference<'d>),
}

impl<'d> Symbol<'d> {
    pub fn kind(&self) -> DeclarationKind {
        match self {
            Symbol::Declaration(declaration) => declaration.kind,
            Symbol::Reference(reference) => reference.kind,
        }
    }

    pub fn name(&self) -> &'d str {
        match self {
            Symbol::Declaration(declaration) => declaration.name(),
            Symbol::Reference(reference) => reference.name,
        }
    }

    pub fn range(&self) -> Range {
        match self {
            Symbol::Declaration(declaration) => declaration.range(),
            Symbol::Reference(reference) => reference.range,
        }
    }
}

pub fn symbol_at(document: &Document, position: Position) -> Option<Symbol<'_>> {
    reference_at(document, position)
        .map(Symbol::Reference)
        .or_else(|| declaration_at(document, position).map(Symbol::Declaration))
}

/// The declaration a symbol stands for.
pub fn target<'s>(
    store: &'s dyn DocumentStore,
    document: &'s Document,
    symbol: &Symbol<'s>,
) -> Option<Declaration<'s>> {
    match symbol {
        Symbol::Declaration(declaration) => Some(*declaration),
        Symbol::Reference(reference) => resolve(store, document, reference),
    }
}

/// How a name is written at a completion slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotForm {
    /// `- name`; short volume syntax adds a mount path.
    ListItem,
    /// `name:` as a key of the object form.
    Key,
    /// `attribute: name`
    Value,
}

/// A place where a declaration name is expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSlot<'d> {
    pub kind: DeclarationKind,
    pub form: SlotForm,
    pub attribute: &'d str,
    pub owner: &'d str,
    pub file: Option<Url>,
}

/// Recognizes a reference slot from the chain at the cursor.
pub fn slot_at<'d>(
    document: &Document,
    chain: &NodeChain<'d>,
    cursor: Cursor,
) -> Option<ReferenceSlot<'d>> {
    use ChainElement::{Item, Key};

    let [Key(services), Key(service), rest @ ..] = chain.elements() else {
        return None;
    };
    if services.key.value != "services" {
        return None;
    }
    let owner = service.key.value.as_str();
    let after_colon = |pair: &Pair| {
        pair.key.span.start.line == cursor.line
            && cursor.column > pair.key.content_span().end.column
    };
    let slot = |kind, form, attribute: &'d str| ReferenceSlot {
        kind,
        form,
        attribute,
        owner,
        file: None,
    };

    match rest {
        [Key(attribute)] if attribute.key.value == "extends" && after_colon(attribute) => Some(
            slot(DeclarationKind::Service, SlotForm::Value, &attribute.key.value),
        ),
        [Key(attribute)] if attribute.key.span.start.line < cursor.line => {
            let name = attribute.key.value.as_str();
            let kind = DeclarationKind::from_attribute(name)?;
            if cursor.dash {
                Some(slot(kind, SlotForm::ListItem, name))
            } else if matches!(name, "depends_on" | "networks")
                && matches!(attribute.value, Node::Mapping(_) | Node::Null(_))
            {
                Some(slot(kind, SlotForm::Key, name))
            } else {
                None
            }
        }
        [Key(attribute), Item(Node::Scalar(item))] if item.span.start.line == cursor.line => {
            let name = attribute.key.value.as_str();
            let kind = DeclarationKind::from_attribute(name)?;
            let typed: String = item
                .value
                .chars()
                .take(cursor.column.saturating_sub(item.span.start.column))
                .collect();
            // past the colon of `name:/path` is a container path
            if kind == DeclarationKind::Volume && typed.contains(':') {
                return None;
            }
            Some(slot(kind, SlotForm::ListItem, name))
        }
        [Key(attribute), Item(Node::Mapping(_)), Key(source)]
            if source.key.value == "source" && after_colon(source) =>
        {
            let name = attribute.key.value.as_str();
            match name {
                "volumes" | "configs" | "secrets" => DeclarationKind::from_attribute(name)
                    .map(|kind| slot(kind, SlotForm::Value, name)),
                _ => None,
            }
        }
        [Key(extends), Key(service_key)]
            if extends.key.value == "extends"
                && service_key.key.value == "service"
                && after_colon(service_key) =>
        {
            let file = extends
                .value
                .as_mapping()
                .and_then(|mapping| extends_file(document, mapping));
            Some(ReferenceSlot {
                file,
                ..slot(DeclarationKind::Service, SlotForm::Value, &extends.key.value)
            })
        }
        _ => None,
    }
}
