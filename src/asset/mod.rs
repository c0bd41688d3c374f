//! The file contract consumed by the build engine.
//!
//! Every input, dependency and generated carrier is an [`Asset`] shared by
//! reference as a [`FileRef`]. The target that lists a file as input and
//! every ancestor that reaches it through a dependency hold the same object,
//! so anything one of them does to it (processing, locking, resetting) is
//! visible to all of them. Implementations keep their mutable state behind
//! interior mutability; the engine only ever holds `&self`.

mod source;

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::core::BuildOptions;
use crate::error::BuildError;
use crate::workspace::Workspace;

pub use crate::asset::source::SourceFile;

/// Shared handle to a file taking part in a build.
pub type FileRef = Arc<dyn Asset>;

/// The kind of asset, which selects the processor handling the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Js,
    Css,
    Html,
}

impl AssetKind {
    /// Extension of written artifacts of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            AssetKind::Js => "js",
            AssetKind::Css => "css",
            AssetKind::Html => "html",
        }
    }

    /// Source extensions tried, in order, when resolving a specifier.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            AssetKind::Js => &["js", "mjs", "cjs", "jsx", "json"],
            AssetKind::Css => &["css"],
            AssetKind::Html => &["html", "htm"],
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "mjs" | "cjs" | "jsx" | "json" => Some(AssetKind::Js),
            "css" => Some(AssetKind::Css),
            "html" | "htm" => Some(AssetKind::Html),
            _ => None,
        }
    }

    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        path.extension().and_then(Self::from_extension)
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Named processing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Read source content.
    Load,
    /// Transform content with the kind's compiler.
    Compile,
    /// Extract and resolve dependencies, then process them.
    Parse,
    /// `Load`, `Compile` and `Parse` in sequence.
    Standard,
}

/// A direct edge of the dependency graph.
///
/// `file` is `None` when the specifier could not be resolved, or when the
/// target was excluded from the current build (for example an input of a
/// child target).
#[derive(Clone)]
pub struct DependencyReference {
    pub path: Utf8PathBuf,
    pub file: Option<FileRef>,
}

impl DependencyReference {
    pub fn resolved(file: FileRef) -> Self {
        Self {
            path: file.path().to_path_buf(),
            file: Some(file),
        }
    }

    pub fn unresolved(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }
}

impl Debug for DependencyReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyReference")
            .field("path", &self.path)
            .field("resolved", &self.file.is_some())
            .finish()
    }
}

/// Record of a single artifact written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub path: Utf8PathBuf,
    pub content: String,
    pub kind: AssetKind,
    /// Indentation of the target which wrote the file, used in reports.
    pub prefix: String,
}

/// Everything a file needs from the running target.
pub struct ProcessContext<'a> {
    pub workspace: &'a Workspace,
    pub options: &'a BuildOptions,
}

/// A single asset file and its processing pipeline.
pub trait Asset: Send + Sync {
    /// Absolute, normalized path. This is the identity of the file.
    fn path(&self) -> &Utf8Path;

    /// Module identifier, relative to the workspace root.
    fn id(&self) -> &str;

    fn kind(&self) -> AssetKind;

    /// Current (possibly compiled) content.
    fn content(&self) -> String;

    /// Run the named phase. Dependencies are resolved as a side effect.
    fn run(&self, phase: Phase, ctx: &ProcessContext<'_>) -> Result<(), BuildError>;

    /// Transitive dependency closure in first-seen order, without this file
    /// and without duplicates. Locked files are neither included nor
    /// traversed.
    fn all_dependencies(&self) -> Vec<FileRef>;

    /// Direct dependency edges, including ones to locked or unresolved files.
    fn dependency_references(&self) -> Vec<DependencyReference>;

    /// Replace the dependency set with a synthetic one.
    fn add_dependencies(
        &self,
        references: Vec<DependencyReference>,
        ctx: &ProcessContext<'_>,
    ) -> Result<(), BuildError>;

    fn is_writeable(&self, batch: bool) -> bool;

    /// Record the output path and finalize options ahead of [`Asset::write`].
    fn prepare_for_write(&self, path: &Utf8Path, options: &BuildOptions);

    fn write(&self, ctx: &ProcessContext<'_>) -> Result<WriteResult, BuildError>;

    /// Drop all per-run state.
    fn reset(&self);

    fn is_locked(&self) -> bool;

    fn set_locked(&self, locked: bool);

    /// Whether this file was pulled in as a dependency of another file.
    fn is_dependency(&self) -> bool;

    fn set_dependency(&self, dependency: bool);
}

impl Debug for dyn Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Asset({})", self.path())
    }
}

/// Depth-first, first-seen closure over dependency references.
///
/// Unresolved and locked files are skipped, and so is everything reachable
/// only through a locked file. `exclude` (the file the closure belongs to)
/// never appears in the result, even through a cycle.
pub fn dependency_closure(references: Vec<DependencyReference>, exclude: &Utf8Path) -> Vec<FileRef> {
    let mut seen = HashSet::new();
    let mut closure = Vec::new();
    let mut stack: Vec<FileRef> = references
        .into_iter()
        .rev()
        .filter_map(|reference| reference.file)
        .collect();

    while let Some(file) = stack.pop() {
        if file.is_locked() || file.path() == exclude || seen.contains(file.path()) {
            continue;
        }

        seen.insert(file.path().to_path_buf());
        stack.extend(
            file.dependency_references()
                .into_iter()
                .rev()
                .filter_map(|reference| reference.file),
        );
        closure.push(file);
    }

    closure
}

#[cfg(test)]
pub(crate) mod mock;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(AssetKind::from_path(Utf8Path::new("a/b.js")), Some(AssetKind::Js));
        assert_eq!(AssetKind::from_path(Utf8Path::new("a/b.CSS")), Some(AssetKind::Css));
        assert_eq!(AssetKind::from_path(Utf8Path::new("index.htm")), Some(AssetKind::Html));
        assert_eq!(AssetKind::from_path(Utf8Path::new("image.png")), None);
        assert_eq!(AssetKind::from_path(Utf8Path::new("Makefile")), None);
    }

    #[test]
    fn test_kind_deserialize() {
        let kind: AssetKind = serde_json::from_str(r#""css""#).unwrap();
        assert_eq!(kind, AssetKind::Css);
    }
}
