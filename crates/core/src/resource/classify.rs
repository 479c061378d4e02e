use std::path::Path;

use anyhow::{anyhow, Result};

use crate::{
    config::PackConfig,
    models::{ContractKind, SourceDocument},
};

/// Routing decision made from a file name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Listed in the exclusion set; never read.
    Excluded,
    /// Carries the type-declaration marker.
    Declaration,
    /// Packed individually as a challenge.
    Challenge,
    /// Aggregated into the contract bundle.
    Contract,
}

/// Decides where each discovered file goes.
#[derive(Debug, Clone)]
pub struct Classifier {
    excluded: Vec<String>,
    declaration_marker: String,
    challenge_prefix: String,
    elusive_marker: String,
}

impl Classifier {
    /// Build a classifier from the packaging configuration.
    pub fn new(config: &PackConfig) -> Self {
        Self {
            excluded: config.excluded.clone(),
            declaration_marker: config.declaration_marker.clone(),
            challenge_prefix: config.challenge_prefix.clone(),
            elusive_marker: config.elusive_marker.clone(),
        }
    }

    /// Route a file by name. Checks run in precedence order: exclusion,
    /// declaration marker, challenge prefix.
    pub fn route(&self, filename: &str) -> Route {
        if self.excluded.iter().any(|name| name == filename) {
            Route::Excluded
        } else if filename.contains(&self.declaration_marker) {
            Route::Declaration
        } else if filename.starts_with(&self.challenge_prefix) {
            Route::Challenge
        } else {
            Route::Contract
        }
    }

    /// Pick the bundle collection for a parsed contract.
    pub fn contract_kind(&self, document: &SourceDocument) -> ContractKind {
        ContractKind::of(document, &self.elusive_marker)
    }
}

/// Base name of `path` as a string.
pub fn filename_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("failed to determine file name for {}", path.display()))
}
