//! Per-kind processing pipelines.
//!
//! A [`Processor`] knows how to compile, scan, bundle and compress one
//! [`AssetKind`]. Files look their processor up in the [`ProcessorRegistry`]
//! once, when they are created by the workspace.

mod markup;
mod script;
mod style;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use camino::Utf8Path;
use regex::Regex;

use crate::asset::AssetKind;
use crate::core::BuildOptions;

pub use crate::processor::markup::MarkupProcessor;
pub use crate::processor::script::ScriptProcessor;
pub use crate::processor::style::StyleProcessor;

/// A processed module as seen by [`Processor::bundle`].
#[derive(Debug, Clone, Copy)]
pub struct Module<'a> {
    pub id: &'a str,
    pub path: &'a Utf8Path,
    pub content: &'a str,
}

pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Transform loaded source into the kind's output language.
    fn compile(
        &self,
        _path: &Utf8Path,
        content: String,
        _options: &BuildOptions,
    ) -> anyhow::Result<String> {
        Ok(content)
    }

    /// Dependency specifiers found in `content`, in order of appearance and
    /// without duplicates.
    fn dependencies(&self, content: &str) -> Vec<String>;

    /// Assemble the written artifact from the entry module and its
    /// dependency closure (in first-seen order).
    fn bundle(&self, entry: Module<'_>, dependencies: &[Module<'_>], options: &BuildOptions)
    -> String;

    fn compress(&self, content: &str) -> anyhow::Result<String>;
}

/// Processor lookup by asset kind.
#[derive(Clone)]
pub struct ProcessorRegistry {
    map: HashMap<AssetKind, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// Registry without any processors.
    pub fn empty() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Replace the processor used for `kind`.
    pub fn register(&mut self, kind: AssetKind, processor: impl Processor + 'static) -> &mut Self {
        self.map.insert(kind, Arc::new(processor));
        self
    }

    pub fn get(&self, kind: AssetKind) -> Option<Arc<dyn Processor>> {
        self.map.get(&kind).cloned()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(AssetKind::Js, ScriptProcessor)
            .register(AssetKind::Css, StyleProcessor)
            .register(AssetKind::Html, MarkupProcessor);
        registry
    }
}

static RE_BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));

/// Remove `/* ... */` comments.
pub(crate) fn strip_block_comments(content: &str) -> String {
    RE_BLOCK_COMMENT.replace_all(content, "").into_owned()
}

/// Collect the first capture group of every match, keeping first occurrences.
pub(crate) fn collect_specifiers<'a>(
    patterns: impl IntoIterator<Item = &'a Regex>,
    content: &str,
) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for pattern in patterns {
        for captures in pattern.captures_iter(content) {
            if let Some(m) = captures.get(1) {
                found.push((m.start(), m.as_str().to_string()));
            }
        }
    }

    found.sort_by_key(|(offset, _)| *offset);

    let mut specifiers: Vec<String> = Vec::with_capacity(found.len());
    for (_, specifier) in found {
        if !specifiers.contains(&specifier) {
            specifiers.push(specifier);
        }
    }

    specifiers
}
