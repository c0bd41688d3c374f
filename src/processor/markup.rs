use crate::core::BuildOptions;
use crate::processor::{Module, Processor};

/// HTML documents are copied through; they never have dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupProcessor;

impl Processor for MarkupProcessor {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn dependencies(&self, _: &str) -> Vec<String> {
        vec![]
    }

    fn bundle(&self, entry: Module<'_>, _: &[Module<'_>], _: &BuildOptions) -> String {
        entry.content.to_string()
    }

    fn compress(&self, content: &str) -> anyhow::Result<String> {
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
