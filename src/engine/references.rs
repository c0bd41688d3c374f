//! Aggregation of the files a target touches.

use std::collections::HashSet;

use camino::Utf8PathBuf;

use crate::asset::FileRef;

/// Every input followed by its dependency closure, in first-seen order and
/// without duplicates.
pub fn referenced_files(inputs: &[FileRef]) -> Vec<FileRef> {
    let mut referenced = Vec::new();
    let mut seen = HashSet::new();

    for file in inputs {
        push_unique(&mut referenced, &mut seen, file.clone());
        for dependency in file.all_dependencies() {
            push_unique(&mut referenced, &mut seen, dependency);
        }
    }

    referenced
}

/// Append `files` not already present in `referenced`.
pub fn merge(referenced: &mut Vec<FileRef>, files: impl IntoIterator<Item = FileRef>) {
    let mut seen: HashSet<Utf8PathBuf> = referenced
        .iter()
        .map(|file| file.path().to_path_buf())
        .collect();

    for file in files {
        push_unique(referenced, &mut seen, file);
    }
}

fn push_unique(referenced: &mut Vec<FileRef>, seen: &mut HashSet<Utf8PathBuf>, file: FileRef) {
    if seen.insert(file.path().to_path_buf()) {
        referenced.push(file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::mock::MockAsset;

    fn paths(files: &[FileRef]) -> Vec<&str> {
        files.iter().map(|file| file.path().as_str()).collect()
    }

    #[test]
    fn test_referenced_files() {
        let c = MockAsset::new("/src/c.js").into_ref();
        let b = MockAsset::new("/src/b.js").with_dependencies(&[&c]).into_ref();
        let a = MockAsset::new("/src/a.js").into_ref();

        let one = MockAsset::new("/src/one.js").with_dependencies(&[&a, &b]).into_ref();
        let two = MockAsset::new("/src/two.js").with_dependencies(&[&c, &one]).into_ref();

        let referenced = referenced_files(&[one, two]);
        assert_eq!(
            paths(&referenced),
            vec!["/src/one.js", "/src/a.js", "/src/b.js", "/src/c.js", "/src/two.js"]
        );
    }

    #[test]
    fn test_locked_dependencies_are_skipped() {
        let b = MockAsset::new("/src/b.js").into_ref();
        let a = MockAsset::new("/src/a.js").with_dependencies(&[&b]).into_ref();
        let main = MockAsset::new("/src/main.js").with_dependencies(&[&a]).into_ref();

        a.set_locked(true);
        assert_eq!(paths(&referenced_files(&[main])), vec!["/src/main.js"]);
    }

    #[test]
    fn test_merge() {
        let a = MockAsset::new("/src/a.js").into_ref();
        let b = MockAsset::new("/src/b.js").into_ref();

        let mut referenced = vec![a.clone()];
        merge(&mut referenced, [b, a]);
        assert_eq!(paths(&referenced), vec!["/src/a.js", "/src/b.js"]);
    }
}
