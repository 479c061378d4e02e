use md5::{Digest, Md5};

/// Hex MD5 of `filename` followed by `key_suffix`.
pub fn challenge_digest(filename: &str, key_suffix: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(filename.as_bytes());
    hasher.update(key_suffix.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Derives output file names for packed challenges.
///
/// Names depend on the source file name only, never on its content, so the
/// game server can locate a challenge file without reading the others.
#[derive(Debug, Clone)]
pub struct ContentAddresser {
    key_suffix: String,
    extension: String,
}

impl ContentAddresser {
    /// Build an addresser appending `key_suffix` before hashing and
    /// `extension` to the resulting digest.
    pub fn new(key_suffix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            key_suffix: key_suffix.into(),
            extension: extension.into(),
        }
    }

    /// Output file name for the challenge file `filename`.
    pub fn output_name(&self, filename: &str) -> String {
        format!(
            "{}.{}",
            challenge_digest(filename, &self.key_suffix),
            self.extension
        )
    }
}
