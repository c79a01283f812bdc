//! tower-lsp backend wiring the document store, the compiled schema and the
//! settings to the editor features.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use crate::{
    completion::get_completions,
    config::Settings,
    crossref,
    document::{DocumentStore, InMemoryDocuments},
    gotodef::goto_definition,
    highlight::document_highlight,
    hover::hover,
    links::document_links,
    references::references,
    rename::{prepare_rename, rename},
    schema::SchemaGraph,
    symbol::document_symbol,
};

/// Compiles the schema named by the settings, or the embedded Compose schema.
///
/// A schema that fails to compile leaves the server without one.
pub fn load_schema(settings: &Settings) -> Option<SchemaGraph> {
    let compiled = match &settings.schema_path {
        Some(path) => SchemaGraph::load(Path::new(path)),
        None => SchemaGraph::compose(),
    };
    match compiled {
        Ok(schema) => {
            tracing::info!("compiled schema with {} nodes", schema.len());
            Some(schema)
        }
        Err(err) => {
            tracing::warn!("schema unavailable: {err}");
            None
        }
    }
}

/// Reads the files `uri` depends on from disk: included Compose files
/// (transitively), `extends.file` targets and the Dockerfiles of services
/// that build. Documents already in the store are left alone.
pub fn load_related_files(store: &mut InMemoryDocuments, uri: &Url) {
    let mut queue = VecDeque::from([uri.clone()]);
    let mut visited = vec![];

    while let Some(next) = queue.pop_front() {
        if visited.contains(&next) {
            continue;
        }
        visited.push(next.clone());

        let Some(document) = store.get_document(&next) else {
            continue;
        };
        let mut compose_files = document.include_targets();
        compose_files.extend(
            crossref::references(document)
                .into_iter()
                .filter_map(|reference| reference.file),
        );
        let dockerfiles = document.dockerfile_targets();

        for dockerfile in dockerfiles {
            store.load_if_absent(&dockerfile);
        }
        for compose_file in compose_files {
            if store.load_if_absent(&compose_file) {
                queue.push_back(compose_file);
            }
        }
    }
}

/// Compiles the schema into `cell` unless a previous `initialize` already
/// did. Returns whether this call set it.
fn install_schema(cell: &OnceCell<Option<SchemaGraph>>, settings: &Settings) -> bool {
    if cell.get().is_some() {
        tracing::warn!("schema already compiled, keeping it");
        return false;
    }
    cell.set(load_schema(settings)).is_ok()
}

pub struct Backend {
    client: Client,
    documents: Arc<RwLock<InMemoryDocuments>>,
    /// Compiled once at `initialize`, read-only afterwards.
    schema: Arc<OnceCell<Option<SchemaGraph>>>,
    settings: Arc<RwLock<Settings>>,
    definition_link_support: Arc<RwLock<bool>>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            documents: Arc::new(RwLock::new(InMemoryDocuments::new())),
            schema: Arc::new(OnceCell::new()),
            settings: Arc::new(RwLock::new(Settings::default())),
            definition_link_support: Arc::new(RwLock::new(false)),
        }
    }

    fn schema(&self) -> Option<&SchemaGraph> {
        self.schema.get().and_then(Option::as_ref)
    }

    async fn update_document(&self, uri: Url, text: &str) {
        let load_related = self.settings.read().await.load_related_files;
        let mut documents = self.documents.write().await;
        documents.write(uri.clone(), text);
        if load_related {
            load_related_files(&mut documents, &uri);
        }
    }
}

#[allow(deprecated)] // root_uri is still what most clients send
fn root_dir(params: &InitializeParams) -> Option<PathBuf> {
    params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .map(|folder| &folder.uri)
        .or(params.root_uri.as_ref())
        .and_then(|uri| uri.to_file_path().ok())
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let root_dir = root_dir(&params);

        let settings = match &root_dir {
            Some(root_dir) => Settings::new(root_dir, &params.capabilities).unwrap_or_else(|err| {
                tracing::warn!("could not load settings: {err}");
                Settings::default()
            }),
            None => Settings::default(),
        };

        install_schema(&self.schema, &settings);
        *self.definition_link_support.write().await = params
            .capabilities
            .text_document
            .as_ref()
            .and_then(|it| it.definition.as_ref())
            .and_then(|it| it.link_support)
            .unwrap_or(false);

        if let Some(root_dir) = &root_dir {
            match InMemoryDocuments::construct(root_dir) {
                Ok(documents) => *self.documents.write().await = documents,
                Err(err) => tracing::warn!("could not index {}: {err}", root_dir.display()),
            }
        }
        *self.settings.write().await = settings;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![":".into(), "-".into(), " ".into()]),
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                document_highlight_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                document_link_provider: Some(DocumentLinkOptions {
                    resolve_provider: Some(false),
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                rename_provider: Some(OneOf::Right(RenameOptions {
                    prepare_provider: Some(true),
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                })),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "compose-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let count = self.documents.read().await.document_count();
        self.client
            .log_message(
                MessageType::INFO,
                format!("compose-lsp initialized with {count} indexed files"),
            )
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.update_document(params.text_document.uri, &params.text_document.text)
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // full sync: the last change holds the whole text
        if let Some(change) = params.content_changes.into_iter().last() {
            self.update_document(params.text_document.uri, &change.text)
                .await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        let mut documents = self.documents.write().await;
        // fall back to the saved contents
        documents.remove(&uri);
        documents.load_if_absent(&uri);
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let position = params.text_document_position.position;
        let uri = params.text_document_position.text_document.uri;

        let documents = self.documents.read().await;
        let Some(document) = documents.get_document(&uri) else {
            return Ok(None);
        };
        let settings = self.settings.read().await;

        Ok(get_completions(
            document,
            &*documents,
            self.schema(),
            position,
            &settings,
        ))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position = params.text_document_position_params.position;
        let uri = params.text_document_position_params.text_document.uri;

        let documents = self.documents.read().await;
        let Some(document) = documents.get_document(&uri) else {
            return Ok(None);
        };
        let settings = self.settings.read().await;

        Ok(hover(document, self.schema(), position, &settings))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position = params.text_document_position_params.position;
        let uri = params.text_document_position_params.text_document.uri;

        let documents = self.documents.read().await;
        let Some(document) = documents.get_document(&uri) else {
            return Ok(None);
        };
        let link_support = *self.definition_link_support.read().await;

        Ok(goto_definition(&*documents, document, position, link_support))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let position = params.text_document_position.position;
        let uri = params.text_document_position.text_document.uri;

        let documents = self.documents.read().await;
        let Some(document) = documents.get_document(&uri) else {
            return Ok(None);
        };

        Ok(references(
            &*documents,
            document,
            position,
            params.context.include_declaration,
        ))
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> Result<Option<Vec<DocumentHighlight>>> {
        let position = params.text_document_position_params.position;
        let uri = params.text_document_position_params.text_document.uri;

        let documents = self.documents.read().await;
        let Some(document) = documents.get_document(&uri) else {
            return Ok(None);
        };

        Ok(document_highlight(&*documents, document, position))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let documents = self.documents.read().await;
        Ok(documents
            .get_document(&params.text_document.uri)
            .and_then(document_symbol))
    }

    async fn document_link(&self, params: DocumentLinkParams) -> Result<Option<Vec<DocumentLink>>> {
        let documents = self.documents.read().await;
        let Some(document) = documents.get_document(&params.text_document.uri) else {
            return Ok(None);
        };
        let settings = self.settings.read().await;

        Ok(document_links(document, &settings))
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> Result<Option<PrepareRenameResponse>> {
        let documents = self.documents.read().await;
        let Some(document) = documents.get_document(&params.text_document.uri) else {
            return Ok(None);
        };

        Ok(prepare_rename(&*documents, document, params.position))
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let position = params.text_document_position.position;
        let uri = params.text_document_position.text_document.uri;

        let documents = self.documents.read().await;
        let Some(document) = documents.get_document(&uri) else {
            return Ok(None);
        };

        Ok(rename(&*documents, document, position, &params.new_name))
    }
}

/// Serves the language server over stdin/stdout until the client exits.
pub async fn run() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
