//! Generated builds take their inputs from the dependency graphs of their
//! descendants instead of from configuration.
//!
//! A generated target has a single virtual carrier file. Once its children
//! have been processed, the files selected here are attached to the carrier
//! as its dependencies, and the carrier is written like any other input.

use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};

use crate::asset::{AssetKind, FileRef};
use crate::engine::BuildNode;
use crate::workspace::Workspace;

/// Directory, relative to the workspace root, holding generated carriers.
pub const GENERATED_DIR: &str = "__generated__";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Selection policy of a generated build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedInput {
    /// Files depended on from more than one child subtree.
    Shared,
    /// Files whose path matches the pattern.
    Pattern(Pattern),
}

impl GeneratedInput {
    /// Any selector mentioning `shared` or `common` picks the shared policy,
    /// everything else is a glob pattern.
    pub fn parse(selector: &str) -> Result<Self, glob::PatternError> {
        if selector.contains("shared") || selector.contains("common") {
            return Ok(GeneratedInput::Shared);
        }

        Ok(GeneratedInput::Pattern(Pattern::new(selector)?))
    }

    /// Select files from the dependency streams of each child subtree.
    pub fn resolve(&self, subtrees: Vec<Vec<FileRef>>) -> Vec<FileRef> {
        match self {
            GeneratedInput::Shared => shared_files(subtrees),
            GeneratedInput::Pattern(pattern) => {
                matching_files(subtrees.into_iter().flatten(), pattern)
            }
        }
    }
}

impl std::fmt::Display for GeneratedInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratedInput::Shared => f.write_str("shared"),
            GeneratedInput::Pattern(pattern) => f.write_str(pattern.as_str()),
        }
    }
}

/// Files found in more than one subtree, in the order in which their second
/// occurrence is discovered.
///
/// Each subtree's stream is deduplicated before counting, so a file reached
/// twice from the same child is not shared. Counting over the raw stream
/// would select it.
pub fn shared_files(subtrees: Vec<Vec<FileRef>>) -> Vec<FileRef> {
    let mut seen = HashSet::new();
    let mut included = HashSet::new();
    let mut shared = Vec::new();

    for file in subtrees.into_iter().flat_map(dedupe) {
        let path = file.path().to_path_buf();

        if !seen.contains(&path) {
            seen.insert(path);
        } else if included.insert(path) {
            shared.push(file);
        }
    }

    shared
}

/// Deduplicated files matching `pattern`, in discovery order. Patterns
/// without a separator are matched against the file name only.
pub fn matching_files(files: impl IntoIterator<Item = FileRef>, pattern: &Pattern) -> Vec<FileRef> {
    let basename = !pattern.as_str().contains('/');

    dedupe(files)
        .into_iter()
        .filter(|file| {
            let path = file.path();
            let subject = match (basename, path.file_name()) {
                (true, Some(name)) => name,
                _ => path.as_str(),
            };
            pattern.matches_with(subject, MATCH_OPTIONS)
        })
        .collect()
}

fn dedupe(files: impl IntoIterator<Item = FileRef>) -> Vec<FileRef> {
    let mut seen = HashSet::new();
    files
        .into_iter()
        .filter(|file| seen.insert(file.path().to_path_buf()))
        .collect()
}

/// Resolved direct dependencies of every input in the subtree rooted at
/// `node`, the node's own inputs first, then each child in order.
///
/// Direct references are used rather than closures: files claimed by an
/// ancestor are missing from closures but still present as references.
pub fn subtree_dependencies(node: &BuildNode) -> Vec<FileRef> {
    let mut files: Vec<FileRef> = node
        .input_files()
        .iter()
        .flat_map(|file| file.dependency_references())
        .filter_map(|reference| reference.file)
        .collect();

    for child in node.children() {
        files.extend(subtree_dependencies(child));
    }

    files
}

/// Path of the carrier of a generated build named `name`.
pub fn carrier_path(workspace: &Workspace, name: &str, kind: AssetKind) -> Utf8PathBuf {
    let name = Utf8Path::new(name);
    let name = match name.extension() {
        Some(_) => name.to_path_buf(),
        None => name.with_extension(kind.extension()),
    };

    workspace.resolve_path(Utf8Path::new(GENERATED_DIR).join(name))
}

/// Register the virtual carrier of a generated build in the workspace.
pub fn carrier(workspace: &Workspace, name: &str, kind: AssetKind) -> Option<FileRef> {
    workspace.virtual_file(carrier_path(workspace, name, kind), kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::mock::MockAsset;

    fn files(paths: &[&str]) -> Vec<FileRef> {
        paths.iter().map(|path| MockAsset::new(*path).into_ref()).collect()
    }

    fn paths(files: &[FileRef]) -> Vec<&str> {
        files.iter().map(|file| file.path().as_str()).collect()
    }

    #[test]
    fn test_parse_selector() {
        assert_eq!(GeneratedInput::parse("shared").unwrap(), GeneratedInput::Shared);
        assert_eq!(GeneratedInput::parse("common.js").unwrap(), GeneratedInput::Shared);
        assert!(matches!(
            GeneratedInput::parse("**/*.css").unwrap(),
            GeneratedInput::Pattern(_)
        ));
        assert!(GeneratedInput::parse("[").is_err());
    }

    #[test]
    fn test_shared_policy() {
        let [x, y, z]: [FileRef; 3] = files(&["/src/x.js", "/src/y.js", "/src/z.js"])
            .try_into()
            .unwrap();

        let shared = shared_files(vec![vec![x, y.clone()], vec![y, z]]);
        assert_eq!(paths(&shared), vec!["/src/y.js"]);
    }

    #[test]
    fn test_shared_policy_counts_subtrees() {
        let [x, y, z]: [FileRef; 3] = files(&["/src/x.js", "/src/y.js", "/src/z.js"])
            .try_into()
            .unwrap();

        // repeated inside one subtree only
        let shared = shared_files(vec![
            vec![x.clone(), x.clone(), z.clone()],
            vec![y.clone(), z.clone()],
            vec![y.clone(), z.clone(), x],
        ]);
        assert_eq!(paths(&shared), vec!["/src/z.js", "/src/y.js", "/src/x.js"]);
    }

    #[test]
    fn test_pattern_policy() {
        let stream = files(&["/src/a.js", "/src/b.css", "/src/c.js", "/src/a.js"]);
        let policy = GeneratedInput::parse("*.js").unwrap();

        let matched = policy.resolve(vec![stream]);
        assert_eq!(paths(&matched), vec!["/src/a.js", "/src/c.js"]);
    }

    #[test]
    fn test_pattern_policy_case_and_paths() {
        let stream = files(&["/src/lib/Vendor.JS", "/src/app/main.js", "/lib/x.js"]);

        let pattern = Pattern::new("vendor.js").unwrap();
        assert_eq!(paths(&matching_files(stream.clone(), &pattern)), vec!["/src/lib/Vendor.JS"]);

        let pattern = Pattern::new("/src/**/*.js").unwrap();
        assert_eq!(
            paths(&matching_files(stream, &pattern)),
            vec!["/src/lib/Vendor.JS", "/src/app/main.js"]
        );
    }

    #[test]
    fn test_carrier_path() {
        let workspace = Workspace::new("/project");

        assert_eq!(
            carrier_path(&workspace, "vendor", AssetKind::Js),
            Utf8Path::new("/project/__generated__/vendor.js")
        );
        assert_eq!(
            carrier_path(&workspace, "shared.css", AssetKind::Css),
            Utf8Path::new("/project/__generated__/shared.css")
        );
    }
}
