use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// A 32-byte BLAKE3 hash of processed content.
///
/// It fingerprints written artifacts and supplies the value substituted for
/// the `%hash%` token in unique output paths, so a changed artifact lands
/// under a new filename and stale ones can be garbage collected.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for &byte in &self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }

    /// Shortened hex form used in filenames.
    pub fn to_short_hex(self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// Options supplied by whoever drives the build, shared by every target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Minify written artifacts.
    pub compress: bool,
    /// The build runs inside a watch loop.
    pub watch: bool,
    /// Production build; reporting includes compressed sizes.
    pub deploy: bool,
}

/// Options derived from a target's flags and the runtime options at the
/// start of every run. Files receive them for processing and writing.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub batch: bool,
    pub bootstrap: bool,
    pub browser: bool,
    pub bundle: bool,
    pub compress: bool,
    pub watch_only: bool,
    /// Inputs of child targets. They are never pulled into this target's
    /// dependency graph.
    pub ignored_files: Arc<[Utf8PathBuf]>,
}

impl BuildOptions {
    pub fn is_ignored(&self, path: &Utf8Path) -> bool {
        self.ignored_files.iter().any(|ignored| ignored == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex() {
        let hash = Hash32::hash(b"");
        assert_eq!(
            hash.to_hex(),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
        assert_eq!(hash.to_short_hex(), "af1349b9f5f9");
    }

    #[test]
    fn test_runtime_options_partial() {
        let options: RuntimeOptions = serde_json::from_str(r#"{"compress":true}"#).unwrap();
        assert!(options.compress);
        assert!(!options.watch);
        assert!(!options.deploy);
    }

    #[test]
    fn test_ignored_files() {
        let options = BuildOptions {
            ignored_files: vec![Utf8PathBuf::from("/src/lazy.js")].into(),
            ..Default::default()
        };
        assert!(options.is_ignored(Utf8Path::new("/src/lazy.js")));
        assert!(!options.is_ignored(Utf8Path::new("/src/main.js")));
    }
}
