//! Shared test utilities for compose-lsp.
//!
//! This module provides common helpers used across multiple test modules.
//! It is only compiled when running tests.

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tower_lsp::lsp_types::{Position, Url};

use crate::document::InMemoryDocuments;
use crate::schema::SchemaGraph;

/// Creates a temporary workspace directory for testing.
///
/// Returns a tuple of (TempDir, PathBuf) where:
/// - TempDir: The temp directory handle (must be kept alive for the test duration)
/// - PathBuf: The path to the workspace subdirectory
///
/// Workspace indexing skips hidden directories, and some systems create temp
/// directories under paths like `/tmp/.tmpXXXXX`, so files go into a
/// non-hidden `workspace` subdirectory.
pub fn create_test_workspace_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let workspace_dir = temp_dir.path().join("workspace");
    fs::create_dir(&workspace_dir).expect("Failed to create workspace subdirectory");
    (temp_dir, workspace_dir)
}

/// `file://` URL for an absolute path.
pub fn file_uri(path: &str) -> Url {
    Url::from_file_path(path).expect("absolute path")
}

/// An in-memory store holding `(path, text)` documents.
///
/// # Example
///
/// ```ignore
/// let store = store_with(&[("/w/compose.yaml", "services: {}\n")]);
/// ```
pub fn store_with(files: &[(&str, &str)]) -> InMemoryDocuments {
    let mut store = InMemoryDocuments::new();
    for (path, text) in files {
        store.write(file_uri(path), text);
    }
    store
}

/// The embedded Compose schema, compiled.
pub fn compose_schema() -> SchemaGraph {
    SchemaGraph::compose().expect("embedded schema should compile")
}

pub fn position(line: u32, character: u32) -> Position {
    Position { line, character }
}
