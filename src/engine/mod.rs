//! The build tree.
//!
//! Every configured target becomes a [`BuildNode`]. A run is a waterfall of
//! three phases over the whole tree:
//!
//! 1. **process**: resolve and process the node's inputs, then process its
//!    children one after another while the node's files are locked, then
//!    select the inputs of a generated build and prepare outputs.
//! 2. **write**: write the prepared outputs in parallel, then write the
//!    children under the same locking discipline.
//! 3. **reset**: clear per-run file state and collect the results of the
//!    whole subtree. The root reports them.
//!
//! The first error aborts the run and is returned unchanged. Files of one
//! node are processed and written in parallel, children never are: the
//! order in which children run decides which files are already claimed and
//! which files count as shared.

mod generated;
mod lock;
mod references;
mod write;

use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;

use crate::asset::{DependencyReference, FileRef, Phase, ProcessContext, WriteResult};
use crate::core::{BuildOptions, RuntimeOptions};
use crate::error::BuildError;
use crate::io::as_overhead;
use crate::output::is_unique_path;
use crate::report::Reporter;
use crate::workspace::Workspace;

pub use crate::engine::generated::{
    GENERATED_DIR, GeneratedInput, carrier, carrier_path, matching_files, shared_files,
};
pub use crate::engine::lock::{lock, unlock};
pub use crate::engine::references::referenced_files;

/// Character used to indent the log lines of nested targets.
const PREFIX: &str = "\u{2219}";

/// Number of names shown when logging a list of paths.
const MAX_PATH_NAMES: usize = 3;

/// Mode flags of a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildFlags {
    /// Write every input, including those that are dependencies of others.
    pub batch: bool,
    /// Inline dependencies into each written input.
    pub bundle: bool,
    /// Make bundles run their entry module when loaded.
    pub bootstrap: bool,
    pub browser: bool,
    pub dynamic: bool,
    /// Only build while watching.
    pub watch_only: bool,
}

/// Static description of a target, from which a [`BuildNode`] is built.
#[derive(Debug, Clone, Default)]
pub struct Target {
    pub label: Option<String>,
    /// Input paths, paired by position with `outputpaths`.
    pub inputpaths: Vec<Utf8PathBuf>,
    pub outputpaths: Vec<Utf8PathBuf>,
    pub flags: BuildFlags,
    pub generated: Option<GeneratedInput>,
    pub children: Vec<Target>,
}

impl Target {
    fn descendant_inputpaths(&self, paths: &mut Vec<Utf8PathBuf>) {
        for child in &self.children {
            paths.extend(child.inputpaths.iter().cloned());
            child.descendant_inputpaths(paths);
        }
    }
}

/// One configured build target and its child targets.
pub struct BuildNode {
    id: String,
    level: usize,
    /// Identifier of the parent target, `None` for a root.
    parent: Option<String>,
    inputpaths: Vec<Utf8PathBuf>,
    outputpaths: Vec<Utf8PathBuf>,
    flags: BuildFlags,
    generated: Option<GeneratedInput>,
    runtime: RuntimeOptions,
    children: Vec<BuildNode>,
    /// Inputs of all descendants, never pulled into this node's graph.
    child_inputpaths: Arc<[Utf8PathBuf]>,
    workspace: Arc<Workspace>,
    reporter: Arc<dyn Reporter>,
    prefix: String,
    input_string: String,
    output_string: String,

    options: BuildOptions,
    input_files: Vec<FileRef>,
    referenced_files: Vec<FileRef>,
    output_files: Vec<FileRef>,
    results: Vec<WriteResult>,
    failed: bool,
}

impl BuildNode {
    /// Build a root node, and all of its descendants, from `target`.
    pub fn new(
        target: Target,
        index: usize,
        runtime: RuntimeOptions,
        workspace: Arc<Workspace>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self::with_parent(target, index, 0, None, runtime, workspace, reporter)
    }

    fn with_parent(
        target: Target,
        index: usize,
        level: usize,
        parent: Option<String>,
        runtime: RuntimeOptions,
        workspace: Arc<Workspace>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let id = target.label.clone().unwrap_or_else(|| index.to_string());

        let mut child_inputpaths = Vec::new();
        target.descendant_inputpaths(&mut child_inputpaths);
        let child_inputpaths: Arc<[Utf8PathBuf]> = child_inputpaths
            .iter()
            .map(|path| workspace.resolve_path(path))
            .collect();

        let inputpaths: Vec<_> = target
            .inputpaths
            .iter()
            .map(|path| workspace.resolve_path(path))
            .collect();
        let outputpaths: Vec<_> = target
            .outputpaths
            .iter()
            .map(|path| workspace.resolve_path(path))
            .collect();

        let children = target
            .children
            .into_iter()
            .enumerate()
            .map(|(index, child)| {
                Self::with_parent(
                    child,
                    index,
                    level + 1,
                    Some(id.clone()),
                    runtime,
                    workspace.clone(),
                    reporter.clone(),
                )
            })
            .collect();

        let input_string = path_string(&inputpaths);
        let output_string = path_string(&outputpaths);
        tracing::debug!(
            "created target {} with input {} and output {}",
            id,
            input_string,
            output_string
        );

        Self {
            prefix: PREFIX.repeat(level + 1),
            id,
            level,
            parent,
            inputpaths,
            outputpaths,
            flags: target.flags,
            generated: target.generated,
            runtime,
            children,
            child_inputpaths,
            workspace,
            reporter,
            input_string,
            output_string,
            options: BuildOptions::default(),
            input_files: Vec::new(),
            referenced_files: Vec::new(),
            output_files: Vec::new(),
            results: Vec::new(),
            failed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn is_generated(&self) -> bool {
        self.generated.is_some()
    }

    pub fn children(&self) -> &[BuildNode] {
        &self.children
    }

    pub fn input_files(&self) -> &[FileRef] {
        &self.input_files
    }

    /// Inputs and their dependencies, as of the last run.
    pub fn referenced_files(&self) -> &[FileRef] {
        &self.referenced_files
    }

    /// Results written by this node alone during the last run.
    pub fn results(&self) -> &[WriteResult] {
        &self.results
    }

    /// Whether the last run returned an error.
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn runtime(&self) -> RuntimeOptions {
        self.runtime
    }

    /// Replace the runtime options of this node and all descendants.
    pub fn set_runtime(&mut self, runtime: RuntimeOptions) {
        self.runtime = runtime;
        for child in &mut self.children {
            child.set_runtime(runtime);
        }
    }

    /// Whether `path` is an input of this node or any descendant, or was
    /// referenced by one of them during the last run.
    pub fn has_file(&self, path: &Utf8Path) -> bool {
        self.inputpaths.iter().any(|input| input == path)
            || self.referenced_files.iter().any(|file| file.path() == path)
            || self.children.iter().any(|child| child.has_file(path))
    }

    /// Run the process, write and reset phases over this node's subtree and
    /// return every result written, this node's first.
    pub fn run(&mut self) -> Result<Vec<WriteResult>, BuildError> {
        let span = tracing::info_span!("target", id = %self.id);
        let _enter = span.enter();

        // files left locked or half processed by a failed run
        if self.parent.is_none() {
            self.workspace.reset_files();
        }

        let result = self.run_phases();
        self.failed = result.is_err();
        result
    }

    fn run_phases(&mut self) -> Result<Vec<WriteResult>, BuildError> {
        self.process()?;
        self.write()?;
        self.reset()
    }

    fn process(&mut self) -> Result<(), BuildError> {
        let s = Instant::now();

        self.init();
        self.process_files()?;

        if !self.input_files.is_empty() {
            let count = self.referenced_files.len();
            tracing::info!(
                "{} processed {} {} {}",
                self.prefix,
                count,
                if count == 1 { "file" } else { "files" },
                as_overhead(s)
            );
        }

        self.process_children()?;
        self.process_generated()?;
        self.prepare_write()
    }

    fn init(&mut self) {
        self.input_files.clear();
        self.referenced_files.clear();
        self.output_files.clear();
        self.results.clear();

        self.options = BuildOptions {
            batch: !self.flags.bundle && self.flags.batch,
            bootstrap: self.flags.bootstrap,
            browser: self.flags.browser,
            bundle: self.flags.bundle,
            compress: self.runtime.compress,
            watch_only: self.flags.watch_only,
            ignored_files: self.child_inputpaths.clone(),
        };

        if self.flags.watch_only && !self.runtime.watch {
            tracing::debug!("skipping watch-only target {}", self.id);
            return;
        }

        let mut verb = String::from(if self.flags.watch_only { "watching" } else { "building" });
        if self.flags.dynamic {
            verb.push_str(" dynamic");
        }

        if self.is_generated() {
            tracing::info!("{} {} {}", self.prefix, verb, self.output_string);
        } else if self.output_string.is_empty() {
            tracing::info!("{} {} {}", self.prefix, verb, self.input_string);
        } else {
            tracing::info!(
                "{} {} {} to {}",
                self.prefix,
                verb,
                self.input_string,
                self.output_string
            );
        }

        for path in &self.inputpaths {
            match self.workspace.file(path) {
                Some(file) => self.input_files.push(file),
                None => tracing::warn!("{} not found in project source", path),
            }
        }
    }

    fn process_files(&mut self) -> Result<(), BuildError> {
        let ctx = ProcessContext {
            workspace: &self.workspace,
            options: &self.options,
        };

        self.input_files
            .par_iter()
            .try_for_each(|file| file.run(Phase::Standard, &ctx))?;

        self.referenced_files = referenced_files(&self.input_files);

        Ok(())
    }

    fn process_children(&mut self) -> Result<(), BuildError> {
        if self.children.is_empty() {
            return Ok(());
        }

        lock(&self.referenced_files);
        for child in &mut self.children {
            child.process()?;
        }
        unlock(&self.referenced_files);

        Ok(())
    }

    fn process_generated(&mut self) -> Result<(), BuildError> {
        let Some(policy) = &self.generated else {
            return Ok(());
        };
        let Some(carrier) = self.input_files.first().cloned() else {
            return Ok(());
        };

        let subtrees = self
            .children
            .iter()
            .map(generated::subtree_dependencies)
            .collect();
        let matching = policy.resolve(subtrees);

        tracing::debug!("generated {} selected {} files", policy, matching.len());

        let ctx = ProcessContext {
            workspace: &self.workspace,
            options: &self.options,
        };

        // selected files keep their dependency flag until reset
        carrier.set_dependency(false);
        carrier.add_dependencies(
            matching.into_iter().map(DependencyReference::resolved).collect(),
            &ctx,
        )?;

        references::merge(&mut self.referenced_files, carrier.all_dependencies());

        Ok(())
    }

    fn prepare_write(&mut self) -> Result<(), BuildError> {
        for file in &self.input_files {
            if !file.is_writeable(self.options.batch) {
                continue;
            }

            let Some(output) = write::output_path(&self.inputpaths, &self.outputpaths, file.path())
            else {
                tracing::debug!("no output path for {}", file.path());
                continue;
            };

            if is_unique_path(output) {
                write::remove_unique(output)?;
            }

            file.prepare_for_write(output, &self.options);
            self.output_files.push(file.clone());
        }

        Ok(())
    }

    fn write(&mut self) -> Result<(), BuildError> {
        let ctx = ProcessContext {
            workspace: &self.workspace,
            options: &self.options,
        };

        self.results = write::write_files(&self.output_files, &ctx, &self.prefix)?;

        if self.children.is_empty() {
            return Ok(());
        }

        lock(&self.referenced_files);
        for child in &mut self.children {
            child.write()?;
        }
        unlock(&self.referenced_files);

        Ok(())
    }

    fn reset(&mut self) -> Result<Vec<WriteResult>, BuildError> {
        for file in &self.referenced_files {
            file.reset();
        }

        let mut results = self.results.clone();
        for child in &mut self.children {
            results.extend(child.reset()?);
        }

        if self.parent.is_none() {
            let runtime = self.runtime;
            results
                .par_iter()
                .rev()
                .try_for_each(|result| self.reporter.report(result, &runtime))?;
        }

        Ok(results)
    }
}

impl std::fmt::Debug for BuildNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildNode")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("failed", &self.failed)
            .field("input", &self.input_string)
            .field("output", &self.output_string)
            .field("children", &self.children)
            .finish()
    }
}

/// File names of `paths`, shortened to a few names.
fn path_string(paths: &[Utf8PathBuf]) -> String {
    let names: Vec<&str> = paths
        .iter()
        .map(|path| path.file_name().unwrap_or(path.as_str()))
        .collect();

    if names.len() <= MAX_PATH_NAMES {
        return names.join(", ");
    }

    let remainder = names.len() - MAX_PATH_NAMES;
    format!(
        "{} ...and {} other{}",
        names[..MAX_PATH_NAMES].join(", "),
        remainder,
        if remainder > 1 { "s" } else { "" }
    )
}
