use camino::Utf8PathBuf;
use thiserror::Error;

pub use anyhow::Error as ProcessorError;

#[derive(Debug, Error)]
pub enum TsumikiError {
    #[error("Error while loading the build configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[error("Error while building targets:\n{0}")]
    Build(#[from] BuildError),

    #[cfg(feature = "live")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),
}

/// Failures raised while running a build tree.
///
/// A missing input file is not represented here: it is reported as a warning
/// and the file is omitted. Errors coming from child targets are returned
/// unchanged, so the variant always names the file that actually failed.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Asset '{0}' failed to process:\n{1}")]
    Processing(Utf8PathBuf, ProcessorError),

    #[error("Couldn't write '{0}':\n{1}")]
    Write(Utf8PathBuf, std::io::Error),

    #[error("Couldn't report '{0}':\n{1}")]
    Report(Utf8PathBuf, anyhow::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Path of the file responsible for the failure, if there is one.
    pub fn path(&self) -> Option<&camino::Utf8Path> {
        match self {
            BuildError::Processing(path, _)
            | BuildError::Write(path, _)
            | BuildError::Report(path, _) => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read configuration file.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't parse configuration.\n{0}")]
    Json(#[from] serde_json::Error),

    #[error("Couldn't compile glob pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Invalid target '{0}': {1}")]
    Invalid(String, String),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Recv(#[from] std::sync::mpsc::RecvError),
}
