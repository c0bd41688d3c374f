#![forbid(unsafe_code)]
//! Hierarchical asset builds.
//!
//! A project is a tree of build targets. Each target turns its input files,
//! together with everything they depend on, into output artifacts; child
//! targets are built while the files of their parent are claimed, so every
//! file ends up in exactly one bundle. Generated targets derive their inputs
//! from their children, for example a bundle of the modules shared by
//! several pages.
//!
//! ```no_run
//! use tsumiki::{Project, RuntimeOptions};
//!
//! let mut project = Project::from_path("tsumiki.json", RuntimeOptions::default())?;
//! let results = project.build()?;
//! println!("wrote {} files", results.len());
//! # Ok::<(), tsumiki::TsumikiError>(())
//! ```

pub mod asset;
pub mod config;
mod core;
pub mod engine;
mod error;
mod io;
#[cfg(feature = "logging")]
pub mod logging;
pub mod output;
pub mod processor;
pub mod report;
#[cfg(feature = "live")]
mod watch;
mod workspace;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use indicatif::ProgressStyle;
use tracing_indicatif::span_ext::IndicatifSpanExt;

pub use crate::asset::{Asset, AssetKind, FileRef, WriteResult};
pub use crate::config::BuildConfig;
pub use crate::core::{BuildOptions, Hash32, RuntimeOptions};
pub use crate::engine::{BuildFlags, BuildNode, GeneratedInput, Target};
pub use crate::error::*;
pub use crate::report::{ConsoleReporter, Reporter};
pub use crate::workspace::Workspace;

use crate::io::as_overhead;

/// A workspace and the trees of targets built from it.
pub struct Project {
    workspace: Arc<Workspace>,
    nodes: Vec<BuildNode>,
    runtime: RuntimeOptions,
}

impl Project {
    /// Load the configuration at `path`. Paths in the configuration are
    /// relative to its directory.
    pub fn from_path(
        path: impl AsRef<Utf8Path>,
        runtime: RuntimeOptions,
    ) -> Result<Self, TsumikiError> {
        let path = path.as_ref();
        let config = BuildConfig::from_path(path)?;
        let root = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::try_from(std::env::current_dir().map_err(ConfigError::Io)?)
                .map_err(ConfigError::PathFormat)?,
        };

        Self::new(root.clone(), &config, runtime, Arc::new(ConsoleReporter::new(root)))
    }

    pub fn new(
        root: impl Into<Utf8PathBuf>,
        config: &BuildConfig,
        runtime: RuntimeOptions,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, TsumikiError> {
        let workspace = Arc::new(Workspace::new(root).with_sources(&config.sources));

        let nodes = config
            .to_targets(&workspace)?
            .into_iter()
            .enumerate()
            .map(|(index, target)| {
                BuildNode::new(target, index, runtime, workspace.clone(), reporter.clone())
            })
            .collect();

        Ok(Self {
            workspace,
            nodes,
            runtime,
        })
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn nodes(&self) -> &[BuildNode] {
        &self.nodes
    }

    /// Run every root target, in order, and return all written results.
    pub fn build(&mut self) -> Result<Vec<WriteResult>, TsumikiError> {
        let s = Instant::now();

        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");

        let span = tracing::info_span!("build");
        span.pb_set_style(&style);
        span.pb_set_length(self.nodes.len() as u64);
        let _enter = span.enter();

        let mut results = Vec::new();
        for node in &mut self.nodes {
            span.pb_set_message(node.id());
            results.extend(node.run()?);
            span.pb_inc(1);
        }

        tracing::info!("built {} files {}", results.len(), as_overhead(s));

        Ok(results)
    }

    /// Whether any target referenced `path` during its last run.
    pub fn has_file(&self, path: impl AsRef<Utf8Path>) -> bool {
        let path = self.workspace.resolve_path(path);
        self.nodes.iter().any(|node| node.has_file(&path))
    }

    /// Rebuild in watch mode the root targets referencing any of `changed`,
    /// and those whose last run failed.
    pub fn rebuild(
        &mut self,
        changed: &HashSet<Utf8PathBuf>,
    ) -> Result<Vec<WriteResult>, TsumikiError> {
        self.workspace.invalidate(changed);

        let runtime = RuntimeOptions {
            watch: true,
            ..self.runtime
        };

        let mut results = Vec::new();
        for node in &mut self.nodes {
            if !node.failed() && !changed.iter().any(|path| node.has_file(path)) {
                continue;
            }

            tracing::info!("change detected, rebuilding {}", node.id());
            node.set_runtime(runtime);
            results.extend(node.run()?);
        }

        Ok(results)
    }

    /// Build everything, then rebuild on changes to the source directories
    /// until the watcher fails.
    #[cfg(feature = "live")]
    pub fn watch(&mut self) -> Result<(), TsumikiError> {
        self.runtime.watch = true;
        for node in &mut self.nodes {
            node.set_runtime(self.runtime);
        }

        tracing::info!("running initial build...");
        self.build()?;
        tracing::info!("initial build completed, now watching for changes...");

        Ok(watch::watch(self)?)
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("workspace", &self.workspace)
            .field("nodes", &self.nodes)
            .field("runtime", &self.runtime)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::report::recording::RecordingReporter;

    fn setup() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        fs::create_dir_all(root.join("src/lib")).unwrap();
        fs::write(root.join("src/app.js"), "var util = require('lib/util');").unwrap();
        fs::write(root.join("src/admin.js"), "var util = require('lib/util');").unwrap();
        fs::write(root.join("src/lib/util.js"), "exports.util = 1;").unwrap();
        fs::write(root.join("src/style.css"), "body { margin: 0; }").unwrap();

        let config = r#"{
            "sources": ["src"],
            "targets": [
                { "input": "src/style.css", "output": "www/style.css" },
                {
                    "generated": "shared",
                    "output": "www/shared.js",
                    "bootstrap": true,
                    "targets": [
                        { "input": "src/app.js", "output": "www/app.js", "bootstrap": true },
                        { "input": "src/admin.js", "output": "www/admin.js", "bootstrap": true }
                    ]
                }
            ]
        }"#;
        fs::write(root.join("tsumiki.json"), config).unwrap();

        (dir, root)
    }

    fn project(root: &Utf8Path, reporter: Arc<RecordingReporter>) -> Project {
        let config = BuildConfig::from_path(root.join("tsumiki.json")).unwrap();
        Project::new(root, &config, RuntimeOptions::default(), reporter).unwrap()
    }

    #[test]
    fn test_build() {
        let (_dir, root) = setup();
        let reporter = Arc::new(RecordingReporter::default());
        let mut project = project(&root, reporter.clone());

        let results = project.build().unwrap();
        let paths: Vec<_> = results.iter().map(|result| result.path.clone()).collect();

        assert_eq!(
            paths,
            vec![
                root.join("www/style.css"),
                root.join("www/shared.js"),
                root.join("www/app.js"),
                root.join("www/admin.js"),
            ]
        );
        assert_eq!(reporter.reported.lock().unwrap().len(), 4);

        let shared = fs::read_to_string(root.join("www/shared.js")).unwrap();
        assert!(shared.contains("require.register('src/lib/util'"));

        let app = fs::read_to_string(root.join("www/app.js")).unwrap();
        assert!(!app.contains("require.register('src/lib/util'"));
        assert!(app.ends_with("require('src/app');"));

        assert!(project.has_file("src/lib/util.js"));
        assert!(!project.has_file("src/missing.js"));
    }

    #[test]
    fn test_rebuild_changed_targets() {
        let (_dir, root) = setup();
        let reporter = Arc::new(RecordingReporter::default());
        let mut project = project(&root, reporter);
        project.build().unwrap();

        fs::write(root.join("src/style.css"), "body { margin: 1px; }").unwrap();
        let changed = HashSet::from([root.join("src/style.css")]);
        let results = project.rebuild(&changed).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "body { margin: 1px; }");
        assert!(project.nodes()[0].runtime().watch);
        assert!(!project.nodes()[1].runtime().watch);

        let unrelated = HashSet::from([root.join("src/unrelated.js")]);
        assert!(project.rebuild(&unrelated).unwrap().is_empty());
    }

    fn broken_project(root: &Utf8Path) -> Project {
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/main.js"), "var dep = require('./dep');").unwrap();
        fs::write(root.join("src/dep.js"), [0xff, 0xfe, 0xfd]).unwrap();

        let config: BuildConfig =
            r#"{ "targets": [{ "input": "src/main.js", "output": "www/main.js" }] }"#
                .parse()
                .unwrap();
        let reporter = Arc::new(RecordingReporter::default());
        Project::new(root, &config, RuntimeOptions::default(), reporter).unwrap()
    }

    #[test]
    fn test_build_after_fixed_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let mut project = broken_project(&root);

        assert!(project.build().is_err());
        assert!(project.nodes()[0].failed());

        fs::write(root.join("src/dep.js"), "exports.dep = 42;").unwrap();
        project.workspace().invalidate([root.join("src/dep.js")]);

        let results = project.build().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("exports.dep = 42;"));
        assert!(!project.nodes()[0].failed());
    }

    #[test]
    fn test_rebuild_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let mut project = broken_project(&root);

        assert!(project.build().is_err());

        fs::write(root.join("src/dep.js"), "exports.dep = 42;").unwrap();
        let changed = HashSet::from([root.join("src/dep.js")]);
        let results = project.rebuild(&changed).unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("exports.dep = 42;"));

        let unrelated = HashSet::from([root.join("src/unrelated.js")]);
        assert!(project.rebuild(&unrelated).unwrap().is_empty());
    }
}
