//! Shared domain models.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A definition file parsed from the content tree.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Location of the file on disk.
    pub path: PathBuf,
    /// Base name of the file.
    pub filename: String,
    /// Parsed JSON content.
    pub content: Value,
}

impl SourceDocument {
    /// Build a document, deriving `filename` from `path`.
    pub fn new(path: impl Into<PathBuf>, content: Value) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            path,
            filename,
            content,
        }
    }

    /// Value of `Metadata.Type`, if present and a string.
    pub fn metadata_type(&self) -> Option<&str> {
        self.content
            .get("Metadata")
            .and_then(|metadata| metadata.get("Type"))
            .and_then(Value::as_str)
    }
}

/// Which collection of the aggregate bundle a contract belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    /// Regular contract, stored under `b`.
    Standard,
    /// Elusive contract, stored under `el`.
    Elusive,
}

impl ContractKind {
    /// Classify a document by comparing its `Metadata.Type` with `elusive_marker`.
    pub fn of(document: &SourceDocument, elusive_marker: &str) -> Self {
        match document.metadata_type() {
            Some(kind) if kind == elusive_marker => ContractKind::Elusive,
            _ => ContractKind::Standard,
        }
    }
}

/// On-disk shape of the aggregate contract bundle.
///
/// The field names are read by the game server and must not change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractBundle {
    /// Standard contracts in discovery order.
    pub b: Vec<Value>,
    /// Elusive contracts in discovery order.
    pub el: Vec<Value>,
}

impl ContractBundle {
    /// Append a contract to the collection matching `kind`.
    pub fn push(&mut self, kind: ContractKind, content: Value) {
        match kind {
            ContractKind::Standard => self.b.push(content),
            ContractKind::Elusive => self.el.push(content),
        }
    }

    /// Total number of contracts across both collections.
    pub fn len(&self) -> usize {
        self.b.len() + self.el.len()
    }

    /// Whether neither collection holds a contract.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
