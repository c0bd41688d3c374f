//! The workspace owns every file known to a build.
//!
//! It is created once by the top-level [`Project`](crate::Project) and shared
//! with every target as an `Arc<Workspace>`. Files are created lazily, on the
//! first request for their path, and cached by absolute path, so all targets
//! that touch the same file share the same [`FileRef`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use camino::{Utf8Path, Utf8PathBuf};

use crate::asset::{AssetKind, FileRef, SourceFile};
use crate::output::normalize_path;
use crate::processor::{Processor, ProcessorRegistry};

pub struct Workspace {
    root: Utf8PathBuf,
    /// Directories searched for bare specifiers.
    sources: Vec<Utf8PathBuf>,
    processors: ProcessorRegistry,
    files: RwLock<HashMap<Utf8PathBuf, FileRef>>,
}

impl Workspace {
    /// Workspace rooted at `root`, which is also the only source directory.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        let root = normalize_path(&root.into());

        Self {
            sources: vec![root.clone()],
            root,
            processors: ProcessorRegistry::default(),
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the source directories, given relative to the root.
    pub fn with_sources<P>(mut self, sources: impl IntoIterator<Item = P>) -> Self
    where
        P: AsRef<Utf8Path>,
    {
        let sources: Vec<_> = sources
            .into_iter()
            .map(|source| self.resolve_path(source.as_ref()))
            .collect();

        if !sources.is_empty() {
            self.sources = sources;
        }

        self
    }

    pub fn with_processors(mut self, processors: ProcessorRegistry) -> Self {
        self.processors = processors;
        self
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn sources(&self) -> &[Utf8PathBuf] {
        &self.sources
    }

    /// Absolute, normalized form of `path`, relative paths being taken from
    /// the root.
    pub fn resolve_path(&self, path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        normalize_path(&self.root.join(path.as_ref()))
    }

    /// Module identifier: the path relative to the root, without extension.
    pub fn module_id(&self, path: &Utf8Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.with_extension("").as_str().replace('\\', "/")
    }

    pub fn processor(&self, kind: AssetKind) -> Option<Arc<dyn Processor>> {
        self.processors.get(kind)
    }

    /// Cached file for `path`, without touching the disk.
    pub fn cached(&self, path: &Utf8Path) -> Option<FileRef> {
        let path = self.resolve_path(path);
        self.files.read().unwrap().get(&path).cloned()
    }

    /// File factory: the cached file for `path`, or a new file if `path`
    /// exists on disk and has a kind with a registered processor.
    pub fn file(&self, path: impl AsRef<Utf8Path>) -> Option<FileRef> {
        let path = self.resolve_path(path);

        if let Some(file) = self.files.read().unwrap().get(&path) {
            return Some(file.clone());
        }

        if !path.is_file() {
            return None;
        }

        let kind = AssetKind::from_path(&path)?;
        let processor = self.processor(kind)?;
        let id = self.module_id(&path);

        let file: FileRef = Arc::new(SourceFile::new(path.clone(), id, kind, processor));
        tracing::debug!("created {} file {}", kind, path);

        Some(self.files.write().unwrap().entry(path).or_insert(file).clone())
    }

    /// Register `file` under its own path, replacing any cached file.
    pub fn insert(&self, file: FileRef) -> FileRef {
        self.files
            .write()
            .unwrap()
            .insert(file.path().to_path_buf(), file.clone());
        file
    }

    /// A file without content on disk, used as the carrier of generated
    /// builds. Returns the cached file if `path` is already known.
    pub fn virtual_file(&self, path: impl AsRef<Utf8Path>, kind: AssetKind) -> Option<FileRef> {
        let path = self.resolve_path(path);

        if let Some(file) = self.files.read().unwrap().get(&path) {
            return Some(file.clone());
        }

        let processor = self.processor(kind)?;
        let id = self.module_id(&path);
        let file: FileRef = Arc::new(SourceFile::new_virtual(path.clone(), id, kind, processor));

        Some(self.files.write().unwrap().entry(path).or_insert(file).clone())
    }

    /// Resolve the dependency `specifier` found in the file at `from`.
    ///
    /// Relative specifiers are taken from the importing file's directory,
    /// rooted ones from the workspace root and bare ones from each source
    /// directory in turn. For each base path the exact file is tried first,
    /// then every source extension of `kind`, then an `index` file.
    pub fn resolve(&self, from: &Utf8Path, specifier: &str, kind: AssetKind) -> Option<FileRef> {
        let bases: Vec<Utf8PathBuf> = if specifier.starts_with("./") || specifier.starts_with("../")
        {
            let dir = from.parent().unwrap_or(&self.root);
            vec![normalize_path(&dir.join(specifier))]
        } else if let Some(rooted) = specifier.strip_prefix('/') {
            vec![self.resolve_path(rooted)]
        } else {
            self.sources
                .iter()
                .map(|source| normalize_path(&source.join(specifier)))
                .collect()
        };

        bases.iter().find_map(|base| {
            let with_ext = kind
                .extensions()
                .iter()
                .map(|ext| Utf8PathBuf::from(format!("{base}.{ext}")));
            let index = kind
                .extensions()
                .iter()
                .map(|ext| base.join("index").with_extension(ext));

            std::iter::once(base.clone())
                .chain(with_ext)
                .chain(index)
                .find_map(|candidate| self.file(&candidate))
        })
    }

    /// Forget cached files for `paths`, so they are read again on next use.
    /// Returns `true` if any of them was known.
    pub fn invalidate<P>(&self, paths: impl IntoIterator<Item = P>) -> bool
    where
        P: AsRef<Utf8Path>,
    {
        let mut files = self.files.write().unwrap();
        let mut removed = false;

        for path in paths {
            let path = self.resolve_path(path);
            removed |= files.remove(&path).is_some();
        }

        removed
    }

    /// Unlock and reset every cached file. A run that failed leaves the
    /// files it touched locked or half processed.
    pub fn reset_files(&self) {
        let files: Vec<FileRef> = self.files.read().unwrap().values().cloned().collect();

        for file in files {
            file.set_locked(false);
            file.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.files.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.root)
            .field("sources", &self.sources)
            .field("files", &self.len())
            .finish()
    }
}
