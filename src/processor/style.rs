use std::sync::LazyLock;

use regex::Regex;

use crate::core::BuildOptions;
use crate::processor::{Module, Processor, collect_specifiers, strip_block_comments};

static RE_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*@import\s+(?:url\(\s*)?['"]([^'"]+)['"]\s*\)?[^;\n]*;?"#)
        .expect("valid regex")
});

/// Stylesheets: `@import` rules are inlined when bundling.
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleProcessor;

fn is_remote(specifier: &str) -> bool {
    specifier.starts_with("http:") || specifier.starts_with("https:") || specifier.starts_with("//")
}

/// Drop local `@import` rules, whose content is inlined by the bundle.
fn strip_imports(content: &str) -> String {
    RE_IMPORT
        .replace_all(content, |captures: &regex::Captures<'_>| {
            if is_remote(&captures[1]) {
                captures[0].to_string()
            } else {
                String::new()
            }
        })
        .trim_start()
        .to_string()
}

impl Processor for StyleProcessor {
    fn name(&self) -> &'static str {
        "style"
    }

    fn dependencies(&self, content: &str) -> Vec<String> {
        collect_specifiers([&*RE_IMPORT], &strip_block_comments(content))
            .into_iter()
            .filter(|specifier| !is_remote(specifier))
            .collect()
    }

    fn bundle(
        &self,
        entry: Module<'_>,
        dependencies: &[Module<'_>],
        options: &BuildOptions,
    ) -> String {
        if !options.bundle {
            return entry.content.to_string();
        }

        dependencies
            .iter()
            .rev()
            .chain(std::iter::once(&entry))
            .map(|module| strip_imports(module.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn compress(&self, content: &str) -> anyhow::Result<String> {
        Ok(strip_block_comments(content)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;

    use super::*;

    #[test]
    fn test_dependencies() {
        let content = r#"
@import "base.css";
@import url('./theme.css') screen;
@import url("https://fonts.example.com/font.css");
/* @import "ignored.css"; */
body { color: red; }
"#;

        assert_eq!(StyleProcessor.dependencies(content), vec!["base.css", "./theme.css"]);
    }

    #[test]
    fn test_bundle_inlines_imports() {
        let options = BuildOptions {
            bundle: true,
            ..Default::default()
        };

        let entry = Module {
            id: "main",
            path: Utf8Path::new("/src/main.css"),
            content: "@import \"base.css\";\nbody { margin: 0; }",
        };
        let base = Module {
            id: "base",
            path: Utf8Path::new("/src/base.css"),
            content: "html { color: black; }",
        };

        let out = StyleProcessor.bundle(entry, &[base], &options);
        assert_eq!(out, "html { color: black; }\nbody { margin: 0; }");
    }

    #[test]
    fn test_compress() {
        let out = StyleProcessor
            .compress("/* c */\nbody {\n  margin: 0;\n}\n")
            .unwrap();
        assert_eq!(out, "body {margin: 0;}");
    }
}
