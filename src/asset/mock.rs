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

type Hook = Box<dyn Fn() + Send + Sync>;

/// In-memory asset with scripted dependencies and failures.
pub(crate) struct MockAsset {
    path: Utf8PathBuf,
    id: String,
    kind: AssetKind,
    content: String,
    references: Mutex<Vec<DependencyReference>>,
    fail_run: bool,
    fail_write: bool,
    hook: Option<Hook>,
    locked: AtomicBool,
    dependency: AtomicBool,
    output: Mutex<Option<Utf8PathBuf>>,
}

impl MockAsset {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        let kind = AssetKind::from_path(&path).unwrap_or(AssetKind::Js);

        Self {
            id: path.with_extension("").to_string(),
            content: format!("content of {path}"),
            path,
            kind,
            references: Mutex::new(Vec::new()),
            fail_run: false,
            fail_write: false,
            hook: None,
            locked: AtomicBool::new(false),
            dependency: AtomicBool::new(false),
            output: Mutex::new(None),
        }
    }

    pub fn with_dependencies(self, files: &[&FileRef]) -> Self {
        *self.references.lock().unwrap() = files
            .iter()
            .map(|file| DependencyReference::resolved((*file).clone()))
            .collect();
        self
    }

    pub fn failing_run(mut self) -> Self {
        self.fail_run = true;
        self
    }

    pub fn failing_write(mut self) -> Self {
        self.fail_write = true;
        self
    }

    /// Called on every `run`, before anything else happens.
    pub fn with_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn into_ref(self) -> FileRef {
        Arc::new(self)
    }
}

impl Asset for MockAsset {
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
        self.content.clone()
    }

    fn run(&self, _: Phase, ctx: &ProcessContext<'_>) -> Result<(), BuildError> {
        if let Some(hook) = &self.hook {
            hook();
        }

        if self.fail_run {
            return Err(BuildError::Processing(self.path.clone(), anyhow!("mock failure")));
        }

        for file in self.all_dependencies() {
            file.set_dependency(true);
            file.run(Phase::Standard, ctx)?;
        }

        Ok(())
    }

    fn all_dependencies(&self) -> Vec<FileRef> {
        dependency_closure(self.dependency_references(), &self.path)
    }

    fn dependency_references(&self) -> Vec<DependencyReference> {
        self.references.lock().unwrap().clone()
    }

    fn add_dependencies(
        &self,
        references: Vec<DependencyReference>,
        _: &ProcessContext<'_>,
    ) -> Result<(), BuildError> {
        *self.references.lock().unwrap() = references;
        Ok(())
    }

    fn is_writeable(&self, batch: bool) -> bool {
        batch || !self.is_dependency()
    }

    fn prepare_for_write(&self, path: &Utf8Path, _: &BuildOptions) {
        *self.output.lock().unwrap() = Some(path.to_path_buf());
    }

    fn write(&self, _: &ProcessContext<'_>) -> Result<WriteResult, BuildError> {
        let path = self
            .output
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BuildError::Processing(self.path.clone(), anyhow!("not prepared")))?;

        if self.fail_write {
            let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "mock failure");
            return Err(BuildError::Write(path, err));
        }

        Ok(WriteResult {
            path,
            content: self.content.clone(),
            kind: self.kind,
            prefix: String::new(),
        })
    }

    fn reset(&self) {
        self.dependency.store(false, Ordering::SeqCst);
        *self.output.lock().unwrap() = None;
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
