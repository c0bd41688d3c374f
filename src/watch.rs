//! Rebuilding on file changes.
//!
//! The source directories of the workspace are watched recursively. Events
//! are debounced, so a burst of saves triggers a single rebuild. Changed
//! files are dropped from the workspace and every root target that
//! referenced one of them during its last run is built again.

use std::collections::HashSet;
use std::sync::mpsc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use notify::RecursiveMode;
use notify_debouncer_full::new_debouncer;

use crate::Project;
use crate::error::WatchError;
use crate::output::normalize_path;

pub(crate) fn watch(project: &mut Project) -> Result<(), WatchError> {
    let (tx, rx) = mpsc::channel();
    let mut debouncer = new_debouncer(Duration::from_millis(250), None, tx)?;

    let watched = project
        .workspace()
        .sources()
        .iter()
        .filter(|path| path.is_dir())
        .cloned()
        .collect();

    // Collapse watched paths to reduce the number of watches
    for path in collapse_watch_paths(watched) {
        tracing::info!("watching {}", path);
        debouncer.watch(&path, RecursiveMode::Recursive)?;
    }

    loop {
        match rx.recv()? {
            Ok(events) => {
                let changed: HashSet<Utf8PathBuf> = events
                    .iter()
                    .flat_map(|de| de.event.paths.iter())
                    .filter_map(|path| Utf8Path::from_path(path))
                    .map(normalize_path)
                    .collect();

                if changed.is_empty() {
                    continue;
                }

                tracing::debug!("{} paths changed", changed.len());

                match project.rebuild(&changed) {
                    Ok(results) if results.is_empty() => {}
                    Ok(_) => tracing::info!("rebuild complete, watching for changes..."),
                    Err(e) => tracing::error!("rebuild failed: {}", e),
                }
            }
            Err(errors) => {
                for e in errors {
                    tracing::error!("watch error: {:?}", e);
                }
            }
        }
    }
}

/// Reduces a set of paths to the minimal set of watch roots.
///
/// If we watch `/a` and `/a/b`, we only need to watch `/a` because
/// the watcher is recursive.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_watch_paths() {
        let paths = HashSet::from([
            Utf8PathBuf::from("/project/src"),
            Utf8PathBuf::from("/project/src/lib"),
            Utf8PathBuf::from("/project/vendor"),
        ]);

        assert_eq!(
            collapse_watch_paths(paths),
            vec![Utf8PathBuf::from("/project/src"), Utf8PathBuf::from("/project/vendor")]
        );
    }

    #[test]
    fn test_collapse_watch_paths_similar_names() {
        let paths = HashSet::from([
            Utf8PathBuf::from("/project/src"),
            Utf8PathBuf::from("/project/src-legacy"),
        ]);

        // src-legacy is not inside src
        assert_eq!(
            collapse_watch_paths(paths),
            vec![
                Utf8PathBuf::from("/project/src"),
                Utf8PathBuf::from("/project/src-legacy")
            ]
        );
    }
}
