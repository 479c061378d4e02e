//! End-to-end packaging run.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{
    config::{DeclarationPolicy, PackConfig},
    models::{ContractBundle, SourceDocument},
    pack::{BundleCompressor, ContentAddresser, ItemPacker},
    resource::{filename_of, Classifier, FileDiscovery, OutputDirectory, Route},
};

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackReport {
    /// Challenge files packed individually.
    pub challenges: usize,
    /// Contracts stored under `b`.
    pub contracts: usize,
    /// Contracts stored under `el`.
    pub elusive: usize,
    /// Files skipped through the exclusion list.
    pub excluded: usize,
    /// Declaration files skipped under [`DeclarationPolicy::Skip`].
    pub skipped_declarations: usize,
    /// Declaration file that stopped discovery under [`DeclarationPolicy::Halt`].
    pub halted_at: Option<PathBuf>,
    /// Time from directory preparation to the bundle being written.
    pub elapsed: Duration,
}

/// Runs discovery, classification, packing and bundling in one pass.
pub struct Packager {
    config: PackConfig,
    classifier: Classifier,
    addresser: ContentAddresser,
    packer: ItemPacker,
    compressor: BundleCompressor,
}

impl Packager {
    /// Build a packager; collaborators are constructed once and reused for every file.
    pub fn new(config: PackConfig) -> Self {
        let classifier = Classifier::new(&config);
        let addresser =
            ContentAddresser::new(&config.challenge_key_suffix, &config.challenge_extension);
        let compressor = BundleCompressor::new(config.brotli.clone());
        Self {
            config,
            classifier,
            addresser,
            packer: ItemPacker::default(),
            compressor,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// Rebuild every packaged resource from scratch.
    pub async fn run(&self) -> Result<PackReport> {
        self.config.validate()?;
        let challenge_dir = self.config.challenge_path();
        let removed = OutputDirectory::new(&challenge_dir).prepare().await?;
        debug!("removed {removed} stale files from {}", challenge_dir.display());

        let start = Instant::now();
        let discovery = FileDiscovery::new(&self.config.input_root, &self.config.extension);
        let paths = tokio::task::spawn_blocking(move || discovery.discover())
            .await
            .context("file discovery task failed")??;

        let mut report = PackReport::default();
        let mut bundle = ContractBundle::default();

        for path in paths {
            let filename = filename_of(&path)?;
            match self.classifier.route(&filename) {
                Route::Excluded => {
                    debug!("excluding {}", path.display());
                    report.excluded += 1;
                }
                Route::Declaration => match self.config.declaration_policy {
                    DeclarationPolicy::Halt => {
                        debug!("stopping discovery at {}", path.display());
                        report.halted_at = Some(path);
                        break;
                    }
                    DeclarationPolicy::Skip => {
                        debug!("skipping declaration file {}", path.display());
                        report.skipped_declarations += 1;
                    }
                },
                Route::Challenge => {
                    let document = read_document(&path).await?;
                    self.write_challenge(&challenge_dir, &document).await?;
                    report.challenges += 1;
                }
                Route::Contract => {
                    let document = read_document(&path).await?;
                    let kind = self.classifier.contract_kind(&document);
                    debug!("bundling {} as {:?}", path.display(), kind);
                    bundle.push(kind, document.content);
                }
            }
        }

        report.contracts = bundle.b.len();
        report.elusive = bundle.el.len();
        let aggregate = self.config.aggregate_path();
        let written = self.compressor.write(bundle, &aggregate).await?;
        debug!("wrote {written} bytes to {}", aggregate.display());

        report.elapsed = start.elapsed();
        info!(
            "Gathered built-in contracts and challenges in {}",
            format_elapsed(report.elapsed)
        );
        Ok(report)
    }

    async fn write_challenge(&self, dir: &Path, document: &SourceDocument) -> Result<()> {
        let target = dir.join(self.addresser.output_name(&document.filename));
        let packed = self
            .packer
            .pack(&document.content)
            .with_context(|| format!("failed to pack {}", document.path.display()))?;
        tokio::fs::write(&target, packed)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        debug!("packed {} into {}", document.path.display(), target.display());
        Ok(())
    }
}

async fn read_document(path: &Path) -> Result<SourceDocument> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let content = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(SourceDocument::new(path, content))
}

/// Short human-readable duration rounded to its largest unit (`850ms`, `2s`, `3m`).
pub fn format_elapsed(elapsed: Duration) -> String {
    const SECOND: f64 = 1_000.0;
    const MINUTE: f64 = SECOND * 60.0;
    const HOUR: f64 = MINUTE * 60.0;
    const DAY: f64 = HOUR * 24.0;

    let millis = elapsed.as_millis() as f64;
    for (unit, suffix) in [(DAY, "d"), (HOUR, "h"), (MINUTE, "m"), (SECOND, "s")] {
        if millis >= unit {
            return format!("{}{}", (millis / unit).round(), suffix);
        }
    }
    format!("{millis}ms")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{challenge_digest, decompress_bundle};
    use serde_json::json;
    use std::{fs, io::Read};
    use tempfile::{tempdir, TempDir};

    fn workspace() -> Result<(TempDir, PackConfig)> {
        let temp = tempdir()?;
        let config = PackConfig {
            input_root: temp.path().join("contractdata"),
            output_root: temp.path().join("resources"),
            ..PackConfig::default()
        };
        fs::create_dir_all(&config.input_root)?;
        Ok((temp, config))
    }

    fn write_json(root: &Path, relative: &str, content: &str) -> Result<()> {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn challenge_files(config: &PackConfig) -> Result<Vec<String>> {
        let mut names = fs::read_dir(config.challenge_path())?
            .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().to_string()))
            .collect::<std::io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    #[tokio::test]
    async fn packs_challenges_and_bundles_contracts() -> Result<()> {
        let (_temp, config) = workspace()?;
        let root = config.input_root.clone();
        write_json(&root, "a.json", "{}")?;
        write_json(&root, "_LOC.json", r#"{"x":1}"#)?;
        write_json(&root, "b.json", r#"{"Metadata":{"Type":"elusive"}}"#)?;

        let report = Packager::new(config.clone()).run().await?;
        assert_eq!(report.challenges, 1);
        assert_eq!(report.contracts, 1);
        assert_eq!(report.elusive, 1);
        assert_eq!(report.halted_at, None);

        let expected = format!("{}.crp", challenge_digest("_LOC.json", "#packed"));
        assert_eq!(challenge_files(&config)?, vec![expected.clone()]);
        let packed = fs::read(config.challenge_path().join(&expected))?;
        assert_eq!(ItemPacker::default().unpack(&packed)?, json!({"x": 1}));

        let compressed = fs::read(config.aggregate_path())?;
        let mut text = String::new();
        brotli::Decompressor::new(compressed.as_slice(), 4096).read_to_string(&mut text)?;
        assert_eq!(text, r#"{"b":[{}],"el":[{"Metadata":{"Type":"elusive"}}]}"#);
        Ok(())
    }

    #[tokio::test]
    async fn declaration_file_stops_discovery() -> Result<()> {
        let (_temp, config) = workspace()?;
        let root = config.input_root.clone();
        write_json(&root, "a/early.json", r#"{"Metadata":{"Id":"early"}}"#)?;
        write_json(&root, "b/foo.d.ts.json", "not json")?;
        write_json(&root, "c/bar.json", "not json either")?;
        write_json(&root, "c/_LATE.json", r#"{"late":true}"#)?;

        let report = Packager::new(config.clone()).run().await?;
        assert_eq!(report.halted_at, Some(root.join("b/foo.d.ts.json")));
        assert_eq!(report.challenges, 0);
        assert!(challenge_files(&config)?.is_empty());

        let bundle = decompress_bundle(&fs::read(config.aggregate_path())?)?;
        assert_eq!(bundle.b, vec![json!({"Metadata": {"Id": "early"}})]);
        assert!(bundle.el.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn skip_policy_only_drops_the_declaration_file() -> Result<()> {
        let (_temp, mut config) = workspace()?;
        config.declaration_policy = DeclarationPolicy::Skip;
        let root = config.input_root.clone();
        write_json(&root, "b/foo.d.ts.json", "not json")?;
        write_json(&root, "c/bar.json", "{}")?;

        let report = Packager::new(config.clone()).run().await?;
        assert_eq!(report.skipped_declarations, 1);
        assert_eq!(report.halted_at, None);
        assert_eq!(report.contracts, 1);
        Ok(())
    }

    #[tokio::test]
    async fn excluded_files_never_reach_outputs() -> Result<()> {
        let (_temp, config) = workspace()?;
        let root = config.input_root.clone();
        write_json(&root, "FREEDOMFIGHTERSLEGACY.json", "{ broken")?;
        write_json(
            &root,
            "nested/THELASTYARDBIRD_SCPC.json",
            r#"{"Metadata":{"Type":"elusive","Marker":"YARDBIRD"}}"#,
        )?;
        write_json(&root, "kept.json", r#"{"Metadata":{"Id":"kept"}}"#)?;

        let report = Packager::new(config.clone()).run().await?;
        assert_eq!(report.excluded, 2);

        let bundle = decompress_bundle(&fs::read(config.aggregate_path())?)?;
        assert_eq!(bundle.len(), 1);
        let text = serde_json::to_string(&bundle)?;
        assert!(!text.contains("YARDBIRD"));
        Ok(())
    }

    #[tokio::test]
    async fn prefixed_files_are_challenges_even_when_elusive() -> Result<()> {
        let (_temp, config) = workspace()?;
        write_json(
            &config.input_root,
            "_ELUSIVE.json",
            r#"{"Metadata":{"Type":"elusive"}}"#,
        )?;

        let report = Packager::new(config.clone()).run().await?;
        assert_eq!(report.challenges, 1);
        assert_eq!(report.elusive, 0);
        assert!(decompress_bundle(&fs::read(config.aggregate_path())?)?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn stale_output_is_removed_and_runs_are_reproducible() -> Result<()> {
        let (_temp, config) = workspace()?;
        let root = config.input_root.clone();
        write_json(
            &root,
            "_PARIS.json",
            r#"{"Name":"UI_PARIS","Tags":["Repeated","Repeated"]}"#,
        )?;
        write_json(&root, "contract.json", r#"{"Metadata":{"Id":"1"}}"#)?;
        fs::create_dir_all(config.challenge_path())?;
        fs::write(config.challenge_path().join("stale.crp"), b"old")?;

        let packager = Packager::new(config.clone());
        packager.run().await?;
        let names = challenge_files(&config)?;
        assert_eq!(names.len(), 1);
        assert!(!names.contains(&"stale.crp".to_string()));

        let first_challenge = fs::read(config.challenge_path().join(&names[0]))?;
        let first_bundle = fs::read(config.aggregate_path())?;

        packager.run().await?;
        assert_eq!(challenge_files(&config)?, names);
        assert_eq!(
            fs::read(config.challenge_path().join(&names[0]))?,
            first_challenge
        );
        assert_eq!(fs::read(config.aggregate_path())?, first_bundle);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_file_aborts_the_run() -> Result<()> {
        let (_temp, config) = workspace()?;
        write_json(&config.input_root, "broken.json", "{ nope")?;

        let err = Packager::new(config.clone()).run().await.unwrap_err();
        assert!(err.to_string().contains("broken.json"));
        assert!(!config.aggregate_path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn unsafe_challenge_dir_leaves_output_root_untouched() -> Result<()> {
        let (_temp, mut config) = workspace()?;
        config.challenge_dir = String::new();
        write_json(&config.input_root, "a.json", "{}")?;
        fs::create_dir_all(&config.output_root)?;
        let unrelated = config.output_root.join("important.dat");
        fs::write(&unrelated, b"runtime data")?;

        assert!(Packager::new(config).run().await.is_err());
        assert_eq!(fs::read(&unrelated)?, b"runtime data");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_contracts_are_bundled() -> Result<()> {
        let (temp, config) = workspace()?;
        let real = temp.path().join("real.json");
        fs::write(&real, r#"{"Metadata":{"Id":"linked"}}"#)?;
        std::os::unix::fs::symlink(&real, config.input_root.join("linked.json"))?;

        let report = Packager::new(config.clone()).run().await?;
        assert_eq!(report.contracts, 1);
        let bundle = decompress_bundle(&fs::read(config.aggregate_path())?)?;
        assert_eq!(bundle.b, vec![json!({"Metadata": {"Id": "linked"}})]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_input_root_aborts_the_run() -> Result<()> {
        let (temp, mut config) = workspace()?;
        config.input_root = temp.path().join("absent");

        assert!(Packager::new(config).run().await.is_err());
        Ok(())
    }

    #[test]
    fn formats_elapsed_like_short_durations() {
        assert_eq!(format_elapsed(Duration::from_millis(0)), "0ms");
        assert_eq!(format_elapsed(Duration::from_millis(850)), "850ms");
        assert_eq!(format_elapsed(Duration::from_millis(1_499)), "1s");
        assert_eq!(format_elapsed(Duration::from_millis(2_500)), "3s");
        assert_eq!(format_elapsed(Duration::from_secs(150)), "3m");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3_600)), "3h");
        assert_eq!(format_elapsed(Duration::from_secs(2 * 86_400)), "2d");
    }
}
