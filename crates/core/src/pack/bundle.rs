use std::{
    io::{Read, Write},
    path::Path,
};

use anyhow::{Context, Result};
use tracing::debug;

use crate::{config::BrotliSettings, models::ContractBundle};

/// Serializes the contract bundle to JSON and brotli-compresses it.
#[derive(Debug, Clone)]
pub struct BundleCompressor {
    settings: BrotliSettings,
}

impl BundleCompressor {
    /// Build a compressor with the given encoder parameters.
    pub fn new(settings: BrotliSettings) -> Self {
        Self { settings }
    }

    /// Compact JSON of `bundle`, compressed.
    pub fn compress(&self, bundle: &ContractBundle) -> Result<Vec<u8>> {
        let text = serde_json::to_vec(bundle).context("failed to serialize contract bundle")?;
        let mut writer = brotli::CompressorWriter::new(
            Vec::new(),
            self.settings.buffer_size,
            self.settings.quality,
            self.settings.window,
        );
        writer
            .write_all(&text)
            .context("failed to compress contract bundle")?;
        let compressed = writer.into_inner();
        debug!(
            "compressed contract bundle from {} to {} bytes",
            text.len(),
            compressed.len()
        );
        Ok(compressed)
    }

    /// Compress `bundle` off the async runtime and write it to `path`.
    /// Returns the number of bytes written.
    pub async fn write(&self, bundle: ContractBundle, path: &Path) -> Result<usize> {
        let compressor = self.clone();
        let compressed = tokio::task::spawn_blocking(move || compressor.compress(&bundle))
            .await
            .context("bundle compression task failed")??;
        tokio::fs::write(path, &compressed)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(compressed.len())
    }
}

/// Reverse [`BundleCompressor::compress`].
pub fn decompress_bundle(bytes: &[u8]) -> Result<ContractBundle> {
    let mut text = Vec::new();
    brotli::Decompressor::new(bytes, 4096)
        .read_to_end(&mut text)
        .context("failed to decompress contract bundle")?;
    serde_json::from_slice(&text).context("failed to parse contract bundle")
}
