use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use walkdir::{DirEntry, WalkDir};

/// Enumerates definition files beneath a content root.
///
/// Matches what `<root>/**/*.<extension>` selects in a shell glob: regular
/// files at any depth, hidden entries excluded, symlinked directories not
/// followed. Paths come back sorted so downstream collections keep a stable
/// order between runs.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    root: PathBuf,
    extension: String,
}

impl FileDiscovery {
    /// Build a discovery rooted at `root`, matching files with `extension`.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    /// Root directory being searched.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree and return every matching file.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            bail!(
                "content root {} is missing or not a directory",
                self.root.display()
            );
        }

        let mut paths = Vec::new();
        let walker = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        for entry in walker {
            let entry = entry.with_context(|| format!("failed to walk {}", self.root.display()))?;
            if !is_regular_file(&entry) {
                continue;
            }
            if entry.path().extension().and_then(|ext| ext.to_str())
                != Some(self.extension.as_str())
            {
                continue;
            }
            paths.push(entry.into_path());
        }

        paths.sort();
        Ok(paths)
    }
}

/// Regular files, including symlinks that resolve to one.
fn is_regular_file(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_nested_json_files_in_sorted_order() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path().join("contractdata");
        fs::create_dir_all(root.join("PARIS/_challenges"))?;
        fs::create_dir_all(root.join(".git"))?;
        fs::create_dir_all(root.join("folder.json"))?;

        fs::write(root.join("top.json"), "{}")?;
        fs::write(root.join("PARIS/contract.json"), "{}")?;
        fs::write(root.join("PARIS/_challenges/_PARIS.json"), "{}")?;
        fs::write(root.join("PARIS/notes.txt"), "ignored")?;
        fs::write(root.join(".git/config.json"), "{}")?;
        fs::write(root.join("PARIS/.draft.json"), "{}")?;

        let paths = FileDiscovery::new(&root, "json").discover()?;
        let relative: Vec<_> = paths
            .iter()
            .map(|path| path.strip_prefix(&root).map(Path::to_path_buf))
            .collect::<std::result::Result<_, _>>()?;

        assert_eq!(
            relative,
            vec![
                PathBuf::from("PARIS/_challenges/_PARIS.json"),
                PathBuf::from("PARIS/contract.json"),
                PathBuf::from("top.json"),
            ]
        );
        Ok(())
    }

    #[test]
    fn missing_root_is_an_error() -> Result<()> {
        let temp = tempdir()?;
        let discovery = FileDiscovery::new(temp.path().join("absent"), "json");
        assert!(discovery.discover().is_err());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_are_included() -> Result<()> {
        use std::os::unix::fs::symlink;

        let temp = tempdir()?;
        let root = temp.path().join("contractdata");
        let outside = temp.path().join("shared");
        fs::create_dir_all(&root)?;
        fs::create_dir_all(outside.join("nested"))?;
        fs::write(outside.join("real.json"), r#"{"Metadata":{"Id":"linked"}}"#)?;
        fs::write(outside.join("nested/deep.json"), "{}")?;

        symlink(outside.join("real.json"), root.join("linked.json"))?;
        symlink(outside.join("missing.json"), root.join("dangling.json"))?;
        symlink(outside.join("nested"), root.join("linked_dir.json"))?;

        let paths = FileDiscovery::new(&root, "json").discover()?;
        assert_eq!(paths, vec![root.join("linked.json")]);
        Ok(())
    }
}
