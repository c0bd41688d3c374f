//! Reporting of written artifacts.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use console::Style;
use indicatif::HumanBytes;

use crate::asset::{AssetKind, WriteResult};
use crate::core::RuntimeOptions;
use crate::error::BuildError;
use crate::io::gzip_size;

/// Size above which written scripts and stylesheets trigger a warning.
pub const RECOMMENDED_FILE_SIZE_LIMIT: u64 = 500 * 1024;

const ANSI_GREEN: Style = Style::new().green();
const ANSI_RED: Style = Style::new().red();

/// Sink receiving the results of a finished build.
pub trait Reporter: Send + Sync {
    fn report(&self, result: &WriteResult, runtime: &RuntimeOptions) -> Result<(), BuildError>;
}

/// Logs every written file, with sizes in deploy mode.
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    /// Paths are shown relative to this directory.
    base: Utf8PathBuf,
}

impl ConsoleReporter {
    pub fn new(base: impl Into<Utf8PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn relative<'a>(&self, path: &'a Utf8Path) -> &'a Utf8Path {
        path.strip_prefix(&self.base).unwrap_or(path)
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        let base = std::env::current_dir()
            .ok()
            .and_then(|dir| Utf8PathBuf::try_from(dir).ok())
            .unwrap_or_default();

        Self { base }
    }
}

fn size(bytes: u64, over: bool) -> impl std::fmt::Display {
    let style = if over { ANSI_RED } else { ANSI_GREEN };
    style.apply_to(HumanBytes(bytes))
}

impl Reporter for ConsoleReporter {
    fn report(&self, result: &WriteResult, runtime: &RuntimeOptions) -> Result<(), BuildError> {
        let path = self.relative(&result.path);
        let prefix = ANSI_GREEN.apply_to(&result.prefix);

        if !(runtime.deploy && matches!(result.kind, AssetKind::Js | AssetKind::Css)) {
            let compressed = if runtime.compress { " and compressed" } else { "" };
            tracing::info!("{} built{} {}", prefix, compressed, path);
            return Ok(());
        }

        let bytes = fs::metadata(&result.path)
            .map_err(|e| BuildError::Report(result.path.clone(), e.into()))?
            .len();
        let gzipped = gzip_size(result.content.as_bytes())
            .map_err(|e| BuildError::Report(result.path.clone(), e.into()))?
            as u64;

        let over = bytes > RECOMMENDED_FILE_SIZE_LIMIT;
        let over_gzipped = gzipped > RECOMMENDED_FILE_SIZE_LIMIT;

        tracing::info!("{} built and compressed {}", prefix, path);
        tracing::info!("{} [compressed size: {}]", prefix, size(bytes, over));
        tracing::info!("{} [gzipped size: {}]", prefix, size(gzipped, over_gzipped));

        if over || over_gzipped {
            tracing::warn!(
                "{} exceeds the recommended {} size, consider splitting it into smaller bundles",
                path,
                HumanBytes(RECOMMENDED_FILE_SIZE_LIMIT)
            );
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn result(path: Utf8PathBuf, kind: AssetKind) -> WriteResult {
        WriteResult {
            path,
            content: "var a = 1;\n".repeat(64),
            kind,
            prefix: "∙".into(),
        }
    }

    #[test]
    fn test_relative() {
        let reporter = ConsoleReporter::new("/project");
        assert_eq!(reporter.relative(Utf8Path::new("/project/www/a.js")), "www/a.js");
        assert_eq!(reporter.relative(Utf8Path::new("/elsewhere/a.js")), "/elsewhere/a.js");
    }

    #[test]
    fn test_report_deploy() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let result = result(root.join("main.js"), AssetKind::Js);
        fs::write(&result.path, &result.content).unwrap();

        let runtime = RuntimeOptions {
            deploy: true,
            ..Default::default()
        };

        ConsoleReporter::new(&root).report(&result, &runtime).unwrap();
    }

    #[test]
    fn test_report_deploy_missing_file() {
        let result = result(Utf8PathBuf::from("/nonexistent/main.css"), AssetKind::Css);
        let runtime = RuntimeOptions {
            deploy: true,
            ..Default::default()
        };

        let err = ConsoleReporter::default().report(&result, &runtime).unwrap_err();
        assert!(matches!(err, BuildError::Report(path, _) if path == "/nonexistent/main.css"));

        // sizes are only checked for deploy builds
        ConsoleReporter::default()
            .report(&result, &RuntimeOptions::default())
            .unwrap();
    }
}
