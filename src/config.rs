//! JSON build configuration.
//!
//! ```json
//! {
//!   "sources": ["src"],
//!   "targets": [
//!     {
//!       "label": "shared",
//!       "generated": "shared",
//!       "output": "www/shared.js",
//!       "targets": [
//!         { "input": "src/app.js", "output": "www/app-%hash%.js" },
//!         { "input": "src/pages", "output": "www/pages", "batch": true }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::fs;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use serde::Deserialize;

use crate::asset::AssetKind;
use crate::engine::{self, BuildFlags, GeneratedInput, Target};
use crate::error::ConfigError;
use crate::workspace::Workspace;

/// A single path or a list of paths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(path) => vec![path.clone()],
            OneOrMany::Many(paths) => paths.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Directories searched for bare dependency specifiers, relative to the
    /// project root. Defaults to the root itself.
    pub sources: Vec<String>,
    pub targets: Vec<TargetConfig>,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    #[serde(default)]
    pub label: Option<String>,
    /// Kind of the written files, inferred from paths if missing.
    #[serde(default)]
    pub kind: Option<AssetKind>,
    /// Files, directories or glob patterns.
    #[serde(default)]
    pub input: Option<OneOrMany>,
    /// Files paired with inputs by position, or a single directory.
    #[serde(default)]
    pub output: Option<OneOrMany>,
    /// Selector of a generated build: `shared` (or `common`) or a glob.
    #[serde(default)]
    pub generated: Option<String>,
    #[serde(default)]
    pub batch: bool,
    #[serde(default = "yes")]
    pub bundle: bool,
    #[serde(default)]
    pub bootstrap: bool,
    #[serde(default)]
    pub browser: bool,
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default, alias = "watch_only")]
    pub watch_only: bool,
    #[serde(default, alias = "children")]
    pub targets: Vec<TargetConfig>,
}

impl FromStr for BuildConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

impl BuildConfig {
    pub fn from_path(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        fs::read_to_string(path.as_ref())?.parse()
    }

    /// Expand the configured targets against the files in `workspace`.
    /// Carriers of generated targets are registered in the workspace.
    pub fn to_targets(&self, workspace: &Workspace) -> Result<Vec<Target>, ConfigError> {
        self.targets
            .iter()
            .enumerate()
            .map(|(index, target)| target.to_target(index, workspace))
            .collect()
    }
}

/// An input file and the directory its output path is taken relative to.
struct ExpandedInput {
    path: Utf8PathBuf,
    base: Utf8PathBuf,
}

impl TargetConfig {
    fn name(&self, index: usize) -> String {
        self.label.clone().unwrap_or_else(|| index.to_string())
    }

    fn flags(&self) -> BuildFlags {
        BuildFlags {
            batch: self.batch,
            bundle: self.bundle,
            bootstrap: self.bootstrap,
            browser: self.browser,
            dynamic: self.dynamic,
            watch_only: self.watch_only,
        }
    }

    fn outputs(&self) -> Vec<String> {
        self.output.as_ref().map(OneOrMany::to_vec).unwrap_or_default()
    }

    pub fn to_target(&self, index: usize, workspace: &Workspace) -> Result<Target, ConfigError> {
        let name = self.name(index);

        let children = self
            .targets
            .iter()
            .enumerate()
            .map(|(index, child)| child.to_target(index, workspace))
            .collect::<Result<Vec<_>, _>>()?;

        let (inputpaths, outputpaths, generated) = match &self.generated {
            Some(selector) => self.generated_paths(&name, selector, workspace)?,
            None => {
                let (inputs, outputs) = self.expanded_paths(&name, workspace)?;
                (inputs, outputs, None)
            }
        };

        Ok(Target {
            label: self.label.clone(),
            inputpaths,
            outputpaths,
            flags: self.flags(),
            generated,
            children,
        })
    }

    fn generated_paths(
        &self,
        name: &str,
        selector: &str,
        workspace: &Workspace,
    ) -> Result<(Vec<Utf8PathBuf>, Vec<Utf8PathBuf>, Option<GeneratedInput>), ConfigError> {
        let generated = GeneratedInput::parse(selector)?;

        let output = self.outputs().into_iter().next().ok_or_else(|| {
            ConfigError::Invalid(name.to_string(), "generated targets need an output".into())
        })?;
        let output = workspace.resolve_path(&output);

        let kind = self
            .kind
            .or_else(|| AssetKind::from_path(&output))
            .unwrap_or(AssetKind::Js);

        let carrier_name = match &self.label {
            Some(label) => label.clone(),
            None => output.file_name().unwrap_or(name).to_string(),
        };

        let carrier = engine::carrier(workspace, &carrier_name, kind).ok_or_else(|| {
            ConfigError::Invalid(name.to_string(), format!("no processor for {kind} files"))
        })?;

        Ok((vec![carrier.path().to_path_buf()], vec![output], Some(generated)))
    }

    fn expanded_paths(
        &self,
        name: &str,
        workspace: &Workspace,
    ) -> Result<(Vec<Utf8PathBuf>, Vec<Utf8PathBuf>), ConfigError> {
        let Some(input) = &self.input else {
            return Err(ConfigError::Invalid(name.to_string(), "missing input".into()));
        };

        let mut inputs = Vec::new();
        for entry in input.to_vec() {
            inputs.extend(expand_input(workspace, &entry, self.kind)?);
        }

        let outputs: Vec<Utf8PathBuf> = self
            .outputs()
            .iter()
            .map(|output| workspace.resolve_path(output))
            .collect();

        let directory = match outputs.as_slice() {
            [dir] if dir.extension().is_none() => Some(dir.clone()),
            _ => None,
        };

        let outputpaths = match directory {
            Some(dir) => inputs
                .iter()
                .map(|input| {
                    let relative = input.path.strip_prefix(&input.base).unwrap_or(&input.path);
                    let extension = self
                        .kind
                        .or_else(|| AssetKind::from_path(&input.path))
                        .map(AssetKind::extension)
                        .or(input.path.extension())
                        .unwrap_or_default();
                    dir.join(relative).with_extension(extension)
                })
                .collect(),
            None => outputs,
        };

        let inputpaths = inputs.into_iter().map(|input| input.path).collect();

        Ok((inputpaths, outputpaths))
    }
}

fn is_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// Expand a configured input into files. Directories and glob patterns
/// expand to the files they contain, sorted by path; other paths are kept
/// as they are, even if they do not exist yet.
fn expand_input(
    workspace: &Workspace,
    entry: &str,
    kind: Option<AssetKind>,
) -> Result<Vec<ExpandedInput>, ConfigError> {
    let path = workspace.resolve_path(entry);

    let (base, pattern) = if is_glob(entry) {
        let base: Utf8PathBuf = path
            .components()
            .take_while(|component| !is_glob(component.as_str()))
            .collect();
        (base, path.to_string())
    } else if path.is_dir() {
        let pattern = Utf8Path::new(&Pattern::escape(path.as_str())).join("**/*");
        (path, pattern.into_string())
    } else {
        let base = path.parent().map(Utf8Path::to_path_buf).unwrap_or_default();
        return Ok(vec![ExpandedInput { path, base }]);
    };

    let mut files = Vec::new();
    for found in glob::glob(&pattern)? {
        let found = Utf8PathBuf::try_from(found?)?;
        let found_kind = AssetKind::from_path(&found);

        if found.is_file() && found_kind.is_some() && (kind.is_none() || found_kind == kind) {
            files.push(found);
        }
    }
    files.sort();

    Ok(files
        .into_iter()
        .map(|path| ExpandedInput {
            path,
            base: base.clone(),
        })
        .collect())
}
