//! Utilities for working with output paths.
//!
//! Output paths may contain the `%hash%` and `%date%` tokens. Such paths are
//! "unique": the token is substituted at write time, so every build of a
//! changed artifact gets a fresh filename. Before a unique output is written
//! again, all artifacts matching the pattern are removed.

use std::time::{SystemTime, UNIX_EPOCH};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use glob::Pattern;

use crate::core::Hash32;
use crate::error::BuildError;

pub const TOKEN_HASH: &str = "%hash%";
pub const TOKEN_DATE: &str = "%date%";

/// Normalize a path, removing things like `.` and `..`.
///
/// CAUTION: This does not resolve symlinks (unlike [`std::fs::canonicalize`]).
/// This may cause incorrect or surprising behavior at times. This should be
/// used carefully. Unfortunately, [`std::fs::canonicalize`] can be hard to use
/// correctly, since it can often fail, or on Windows returns annoying device
/// paths.
///
/// Adapted from
/// <https://github.com/rust-lang/cargo/blob/f7acf448fc127df9a77c52cc2bba027790ac4931/crates/cargo-util/src/paths.rs#L76-L116>
pub fn normalize_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut components = path.components().peekable();
    let mut ret = if let Some(c @ Utf8Component::Prefix(..)) = components.peek().cloned() {
        components.next();
        Utf8PathBuf::from(c.as_str())
    } else {
        Utf8PathBuf::new()
    };

    for component in components {
        match component {
            Utf8Component::Prefix(..) => unreachable!(),
            Utf8Component::RootDir => {
                ret.push(Utf8Component::RootDir);
            }
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if ret.ends_with(Utf8Component::ParentDir) {
                    ret.push(Utf8Component::ParentDir);
                } else {
                    let popped = ret.pop();
                    if !popped && !ret.has_root() {
                        ret.push(Utf8Component::ParentDir);
                    }
                }
            }
            Utf8Component::Normal(c) => {
                ret.push(c);
            }
        }
    }
    ret
}

/// Whether `path` contains a token substituted at write time.
pub fn is_unique_path(path: &Utf8Path) -> bool {
    path.as_str().contains(TOKEN_HASH) || path.as_str().contains(TOKEN_DATE)
}

/// Glob pattern matching every artifact a unique path could have produced.
pub fn unique_pattern(path: &Utf8Path) -> Result<Pattern, glob::PatternError> {
    let escaped = Pattern::escape(path.as_str())
        .replace(TOKEN_HASH, "*")
        .replace(TOKEN_DATE, "*");

    Pattern::new(&escaped)
}

/// Existing artifacts produced from the unique path `path`.
pub fn find_unique_paths(path: &Utf8Path) -> Result<Vec<Utf8PathBuf>, BuildError> {
    let pattern = unique_pattern(path)?;

    let found = glob::glob(pattern.as_str())?
        .filter_map(Result::ok)
        .filter_map(|path| Utf8PathBuf::try_from(path).ok())
        .filter(|path| path.is_file())
        .collect();

    Ok(found)
}

/// Substitute write-time tokens in `path` for an artifact with `content`.
pub fn resolve_unique_path(path: &Utf8Path, content: &[u8]) -> Utf8PathBuf {
    if !is_unique_path(path) {
        return path.to_path_buf();
    }

    let mut resolved = path.as_str().to_string();

    if resolved.contains(TOKEN_HASH) {
        resolved = resolved.replace(TOKEN_HASH, &Hash32::hash(content).to_short_hex());
    }

    if resolved.contains(TOKEN_DATE) {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        resolved = resolved.replace(TOKEN_DATE, &secs.to_string());
    }

    Utf8PathBuf::from(resolved)
}
