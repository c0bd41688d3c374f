use std::sync::LazyLock;

use regex::Regex;

use crate::core::BuildOptions;
use crate::processor::{Module, Processor, collect_specifiers, strip_block_comments};

static RE_REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#).expect("valid regex")
});

static RE_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(?:import|export)\s+(?:[^'";]*?\s+from\s+)?['"]([^'"]+)['"]"#)
        .expect("valid regex")
});

/// Minimal CommonJS registry, prepended to browser bundles that boot
/// themselves.
const PRELUDE: &str = "var require = (function () {\n\
  var modules = {}, cache = {};\n\
  function require(id) {\n\
    if (cache[id]) return cache[id].exports;\n\
    var module = cache[id] = { exports: {} };\n\
    modules[id].call(module.exports, module, module.exports, require);\n\
    return module.exports;\n\
  }\n\
  require.register = function (id, fn) { modules[id] = fn; };\n\
  return require;\n\
})();\n";

/// JavaScript modules: `require()`, `import` and `export ... from`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptProcessor;

fn strip_line_comments(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Module id as a single-quoted JavaScript string literal.
fn quote(id: &str) -> String {
    format!("'{}'", id.escape_default())
}

fn wrap(module: &Module<'_>) -> String {
    format!(
        "require.register({}, function(module, exports, require) {{\n{}\n}});",
        quote(module.id),
        module.content
    )
}

impl Processor for ScriptProcessor {
    fn name(&self) -> &'static str {
        "script"
    }

    fn dependencies(&self, content: &str) -> Vec<String> {
        let content = strip_line_comments(&strip_block_comments(content));
        collect_specifiers([&*RE_REQUIRE, &*RE_IMPORT], &content)
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

        let mut parts = Vec::with_capacity(dependencies.len() + 3);

        if options.browser && options.bootstrap {
            parts.push(PRELUDE.to_string());
        }

        // deepest dependencies first
        parts.extend(dependencies.iter().rev().map(wrap));
        parts.push(wrap(&entry));

        if options.bootstrap {
            parts.push(format!("require({});", quote(entry.id)));
        }

        parts.join("\n")
    }

    fn compress(&self, content: &str) -> anyhow::Result<String> {
        let content = strip_block_comments(content);

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
