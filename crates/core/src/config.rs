//! Packaging configuration.
//!
//! Every setting has a default reproducing the layout the game server
//! expects, so a missing `contractpack.toml` is the normal case.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// File name looked up in the working directory by [`PackConfig::load`].
pub const CONFIG_FILE_NAME: &str = "contractpack.toml";

/// What to do when a file name carries the type-declaration marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationPolicy {
    /// Stop the discovery loop at the marked file. Everything gathered so far
    /// is still aggregated and written.
    #[default]
    Halt,
    /// Skip only the marked file.
    Skip,
}

/// Brotli encoder parameters for the aggregate bundle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrotliSettings {
    /// Compression quality, 0-11.
    pub quality: u32,
    /// Base-2 logarithm of the sliding window size, 10-24.
    pub window: u32,
    /// Internal encoder buffer size in bytes.
    pub buffer_size: usize,
}

impl Default for BrotliSettings {
    fn default() -> Self {
        Self {
            quality: 11,
            window: 22,
            buffer_size: 4096,
        }
    }
}

/// Settings for a single packaging run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Root of the content definition tree.
    pub input_root: PathBuf,
    /// Extension (without dot) of definition files.
    pub extension: String,
    /// Resource directory read by the game server.
    pub output_root: PathBuf,
    /// Sub-directory of `output_root` holding packed challenges.
    pub challenge_dir: String,
    /// Extension of packed challenge files.
    pub challenge_extension: String,
    /// File name of the compressed contract bundle inside `output_root`.
    pub aggregate_file: String,
    /// File names that are never packaged.
    pub excluded: Vec<String>,
    /// Substring marking type-declaration artifacts.
    pub declaration_marker: String,
    /// Response to a file carrying `declaration_marker`.
    pub declaration_policy: DeclarationPolicy,
    /// File name prefix routing a file to the challenge packer.
    pub challenge_prefix: String,
    /// Suffix appended to a challenge file name before hashing.
    pub challenge_key_suffix: String,
    /// `Metadata.Type` value marking an elusive contract.
    pub elusive_marker: String,
    /// Aggregate compression parameters.
    pub brotli: BrotliSettings,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("contractdata"),
            extension: "json".to_string(),
            output_root: PathBuf::from("resources"),
            challenge_dir: "challenges".to_string(),
            challenge_extension: "crp".to_string(),
            aggregate_file: "contracts.br".to_string(),
            excluded: vec![
                "FREEDOMFIGHTERSLEGACY.json".to_string(),
                "THELASTYARDBIRD_SCPC.json".to_string(),
            ],
            declaration_marker: ".d.ts".to_string(),
            declaration_policy: DeclarationPolicy::Halt,
            challenge_prefix: "_".to_string(),
            challenge_key_suffix: "#packed".to_string(),
            elusive_marker: "elusive".to_string(),
            brotli: BrotliSettings::default(),
        }
    }
}

impl PackConfig {
    /// Load `contractpack.toml` from the working directory, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE_NAME)
    }

    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .build()
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: PackConfig = settings
            .try_deserialize()
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.extension.is_empty() {
            bail!("extension must not be empty");
        }
        if self.challenge_prefix.is_empty() {
            bail!("challenge_prefix must not be empty");
        }
        if self.declaration_marker.is_empty() {
            bail!("declaration_marker must not be empty");
        }
        if self.challenge_extension.is_empty() {
            bail!("challenge_extension must not be empty");
        }
        if !is_nested_relative(&self.challenge_dir) {
            bail!(
                "challenge_dir {:?} must be a relative path below output_root",
                self.challenge_dir
            );
        }
        if !is_nested_relative(&self.aggregate_file) {
            bail!(
                "aggregate_file {:?} must be a relative path below output_root",
                self.aggregate_file
            );
        }
        if self.brotli.quality > 11 {
            bail!("brotli quality {} out of range 0-11", self.brotli.quality);
        }
        if !(10..=24).contains(&self.brotli.window) {
            bail!("brotli window {} out of range 10-24", self.brotli.window);
        }
        Ok(())
    }

    /// Directory receiving one packed file per challenge.
    pub fn challenge_path(&self) -> PathBuf {
        self.output_root.join(&self.challenge_dir)
    }

    /// Location of the compressed contract bundle.
    pub fn aggregate_path(&self) -> PathBuf {
        self.output_root.join(&self.aggregate_file)
    }
}

/// Non-empty relative path made only of normal components, so joining it
/// onto a directory always lands strictly inside that directory.
fn is_nested_relative(value: &str) -> bool {
    let path = Path::new(value);
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}
