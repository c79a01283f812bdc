//! compose-lsp: a schema-aware Language Server for Compose files
//!
//! This crate provides the engine behind the `compose-lsp` binary: given a
//! Compose document and a cursor position it works out which part of the
//! Compose JSON Schema applies there and which services, networks, volumes,
//! configs and secrets a field refers to.
//!
//! # Overview
//!
//! - **Completion**: attribute names, enum values, declared names and
//!   Dockerfile build stages
//! - **Hover**: field descriptions and allowed values
//! - **Navigation**: go-to-definition, find-references, highlight and rename
//!   across `include:`d files
//! - **Outline and links**: document symbols, file links and Docker Hub links
//!
//! # Architecture
//!
//! - [`document`]: document snapshots, the YAML node tree and the document store
//! - [`schema`]: the compiled schema graph and the walker mapping node chains onto it
//! - [`position`]: cursor model and the node chain enclosing a cursor
//! - [`crossref`]: declarations, references and their resolution
//! - [`completion`]: completers chained per request
//!
//! ```ignore
//! use compose_lsp::{completion::get_completions, config::Settings};
//! use compose_lsp::document::{DocumentStore, InMemoryDocuments};
//! use compose_lsp::schema::SchemaGraph;
//!
//! let schema = SchemaGraph::compose()?;
//! let mut store = InMemoryDocuments::new();
//! store.write(uri.clone(), "services:\n  web:\n    \n");
//! let document = store.get_document(&uri).unwrap();
//! let items = get_completions(document, &store, Some(&schema), position, &Settings::default());
//! ```

// Document model and schema
pub mod document;
pub mod position;
pub mod schema;

// LSP feature modules
pub mod completion;
pub mod crossref;
pub mod gotodef;
pub mod highlight;
pub mod hover;
pub mod links;
pub mod references;
pub mod rename;
pub mod symbol;

// Configuration and transport
pub mod config;
pub mod server;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;
