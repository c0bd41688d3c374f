use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use camino::{Utf8Path, Utf8PathBuf};

use crate::asset::{
    Asset, AssetKind, DependencyReference, FileRef, Phase, ProcessContext, WriteResult,
    dependency_closure,
};
use crate::core::BuildOptions;
use crate::error::BuildError;
use crate::output::resolve_unique_path;
use crate::processor::{Module, Processor};

/// Per-run state of a [`SourceFile`].
#[derive(Default)]
struct State {
    /// Raw source as read from disk. Kept across resets, the workspace
    /// replaces the whole file when it changes on disk.
    source: Option<String>,
    loaded: bool,
    compiled: bool,
    parsed: bool,
    content: String,
    references: Vec<DependencyReference>,
    output: Option<Utf8PathBuf>,
    options: Option<BuildOptions>,
}

/// A file processed by the [`Processor`] registered for its kind.
///
/// Most files are backed by a file on disk. Virtual files have no source
/// and only carry dependencies attached with [`Asset::add_dependencies`].
pub struct SourceFile {
    path: Utf8PathBuf,
    id: String,
    kind: AssetKind,
    processor: Arc<dyn Processor>,
    is_virtual: bool,
    locked: AtomicBool,
    dependency: AtomicBool,
    state: Mutex<State>,
}

impl SourceFile {
    pub fn new(
        path: Utf8PathBuf,
        id: String,
        kind: AssetKind,
        processor: Arc<dyn Processor>,
    ) -> Self {
        Self {
            path,
            id,
            kind,
            processor,
            is_virtual: false,
            locked: AtomicBool::new(false),
            dependency: AtomicBool::new(false),
            state: Mutex::new(State::default()),
        }
    }

    pub fn new_virtual(
        path: Utf8PathBuf,
        id: String,
        kind: AssetKind,
        processor: Arc<dyn Processor>,
    ) -> Self {
        Self {
            is_virtual: true,
            ..Self::new(path, id, kind, processor)
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    fn load(&self) -> Result<(), BuildError> {
        let mut state = self.state.lock().unwrap();
        if state.loaded {
            return Ok(());
        }

        let source = match (&state.source, self.is_virtual) {
            (Some(source), _) => source.clone(),
            (None, true) => String::new(),
            (None, false) => {
                let bytes = fs::read(&self.path)
                    .map_err(|e| BuildError::Processing(self.path.clone(), e.into()))?;
                String::from_utf8(bytes)
                    .map_err(|e| BuildError::Processing(self.path.clone(), e.into()))?
            }
        };

        state.content = source.clone();
        state.source = Some(source);
        state.loaded = true;

        Ok(())
    }

    fn compile(&self, options: &BuildOptions) -> Result<(), BuildError> {
        self.load()?;

        let mut state = self.state.lock().unwrap();
        if state.compiled {
            return Ok(());
        }

        let content = std::mem::take(&mut state.content);
        state.content = self
            .processor
            .compile(&self.path, content, options)
            .map_err(|e| BuildError::Processing(self.path.clone(), e))?;
        state.compiled = true;

        Ok(())
    }

    fn parse(&self, ctx: &ProcessContext<'_>) -> Result<(), BuildError> {
        self.compile(ctx.options)?;

        // Marked before descending, so cycles stop here.
        let content = {
            let mut state = self.state.lock().unwrap();
            if state.parsed {
                return Ok(());
            }
            state.parsed = true;
            state.content.clone()
        };

        let mut references = Vec::new();
        for specifier in self.processor.dependencies(&content) {
            match ctx.workspace.resolve(&self.path, &specifier, self.kind) {
                Some(file) if file.path() == self.path => {}
                Some(file) if ctx.options.is_ignored(file.path()) => {
                    tracing::debug!("ignoring {} in {}", file.path(), self.id);
                    references.push(DependencyReference::unresolved(file.path()));
                }
                Some(file) => references.push(DependencyReference::resolved(file)),
                None => {
                    tracing::debug!("unable to resolve '{}' in {}", specifier, self.id);
                    references.push(DependencyReference::unresolved(specifier));
                }
            }
        }

        let dependencies: Vec<FileRef> =
            references.iter().filter_map(|r| r.file.clone()).collect();
        self.state.lock().unwrap().references = references;

        for file in dependencies {
            file.set_dependency(true);
            file.run(Phase::Standard, ctx)?;
        }

        Ok(())
    }
}

impl Asset for SourceFile {
    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> AssetKind {
        self.kind
    }

    fn content(&self) -> String {
        self.state.lock().unwrap().content.clone()
    }

    fn run(&self, phase: Phase, ctx: &ProcessContext<'_>) -> Result<(), BuildError> {
        match phase {
            Phase::Load => self.load(),
            Phase::Compile => self.compile(ctx.options),
            Phase::Parse | Phase::Standard => self.parse(ctx),
        }
    }

    fn all_dependencies(&self) -> Vec<FileRef> {
        dependency_closure(self.dependency_references(), &self.path)
    }

    fn dependency_references(&self) -> Vec<DependencyReference> {
        self.state.lock().unwrap().references.clone()
    }

    fn add_dependencies(
        &self,
        references: Vec<DependencyReference>,
        ctx: &ProcessContext<'_>,
    ) -> Result<(), BuildError> {
        self.compile(ctx.options)?;

        let references: Vec<DependencyReference> = references
            .into_iter()
            .map(|reference| match reference.file {
                Some(_) => reference,
                None => match ctx.workspace.file(&reference.path) {
                    Some(file) => DependencyReference::resolved(file),
                    None => reference,
                },
            })
            .collect();

        let dependencies: Vec<FileRef> =
            references.iter().filter_map(|r| r.file.clone()).collect();

        {
            let mut state = self.state.lock().unwrap();
            state.references = references;
            state.parsed = true;
        }

        for file in dependencies {
            file.run(Phase::Standard, ctx)?;
        }

        Ok(())
    }

    fn is_writeable(&self, batch: bool) -> bool {
        batch || !self.is_dependency()
    }

    fn prepare_for_write(&self, path: &Utf8Path, options: &BuildOptions) {
        let mut state = self.state.lock().unwrap();
        state.output = Some(path.to_path_buf());
        state.options = Some(options.clone());
    }

    fn write(&self, ctx: &ProcessContext<'_>) -> Result<WriteResult, BuildError> {
        let (output, options) = {
            let state = self.state.lock().unwrap();
            (state.output.clone(), state.options.clone())
        };

        let output = output.ok_or_else(|| {
            BuildError::Processing(self.path.clone(), anyhow!("file was not prepared for writing"))
        })?;
        let options = options.unwrap_or_else(|| ctx.options.clone());

        let dependencies: Vec<(FileRef, String)> = self
            .all_dependencies()
            .into_iter()
            .map(|file| {
                let content = file.content();
                (file, content)
            })
            .collect();
        let modules: Vec<Module<'_>> = dependencies
            .iter()
            .map(|(file, content)| Module {
                id: file.id(),
                path: file.path(),
                content,
            })
            .collect();

        let source = self.content();
        let entry = Module {
            id: &self.id,
            path: &self.path,
            content: &source,
        };

        let mut content = self.processor.bundle(entry, &modules, &options);

        if options.compress {
            content = self
                .processor
                .compress(&content)
                .map_err(|e| BuildError::Processing(self.path.clone(), e))?;
        }

        let path = resolve_unique_path(&output, content.as_bytes());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::Write(path.clone(), e))?;
        }
        fs::write(&path, &content).map_err(|e| BuildError::Write(path.clone(), e))?;

        tracing::debug!("wrote {} ({} bytes)", path, content.len());

        Ok(WriteResult {
            path,
            content,
            kind: self.kind,
            prefix: String::new(),
        })
    }

    fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        let source = state.source.take();
        *state = State {
            source,
            ..State::default()
        };
        self.dependency.store(false, Ordering::SeqCst);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    fn is_dependency(&self) -> bool {
        self.dependency.load(Ordering::SeqCst)
    }

    fn set_dependency(&self, dependency: bool) {
        self.dependency.store(dependency, Ordering::SeqCst);
    }
}
