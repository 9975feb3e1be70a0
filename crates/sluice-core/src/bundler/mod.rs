//! CommonJS bundler.
//!
//! Bundles an entry module and everything it `require`s into one file.
//!
//! ## Architecture
//!
//! 1. **Graph** - Breadth-first walk of `require` calls from the entry,
//!    resolving each specifier and applying the transform chain once per
//!    module
//! 2. **Emit** - Module table plus prelude, with an optional line-level
//!    inline source map

mod emit;
mod graph;

pub use graph::{Module, ModuleGraph, ModuleId, ModuleKind};

use crate::artifact::Artifact;
use crate::error::BuildError;
use crate::transform::TransformChain;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The main bundler.
pub struct Bundler<'a> {
    chain: &'a TransformChain,
    sourcemaps: bool,
    root: Option<PathBuf>,
}

impl<'a> Bundler<'a> {
    #[must_use]
    pub fn new(chain: &'a TransformChain) -> Self {
        Self {
            chain,
            sourcemaps: false,
            root: None,
        }
    }

    /// Attach an inline source map to the output.
    #[must_use]
    pub fn sourcemaps(mut self, enabled: bool) -> Self {
        self.sourcemaps = enabled;
        self
    }

    /// Record source map paths relative to `root`.
    #[must_use]
    pub fn relative_to(mut self, root: &Path) -> Self {
        self.root = Some(dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf()));
        self
    }

    /// Bundle `entry`. The artifact is named after the entry's file name.
    pub fn bundle(&self, entry: &Path) -> Result<Artifact, BuildError> {
        let graph = ModuleGraph::build(entry, self.chain)?;
        let name = entry
            .file_name()
            .map_or_else(|| "bundle.js".to_string(), |n| n.to_string_lossy().into_owned());

        let emitted = emit::emit(&graph, &name, self.sourcemaps, self.root.as_deref());
        debug!(
            entry = %entry.display(),
            modules = graph.len(),
            bytes = emitted.code.len(),
            "bundled"
        );

        let mut code = emitted.code;
        if let Some(map) = emitted.map {
            code.push_str(&map.to_inline_comment());
            code.push('\n');
        }
        Ok(Artifact::new(name, code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::sourcemap::SourceMap;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let js = dir.path().join("src/js");
        fs::create_dir_all(&js).unwrap();
        fs::write(
            js.join("main.js"),
            "var greet = require('./greet');\nvar data = require('./data.json');\ngreet(data.name);\n",
        )
        .unwrap();
        fs::write(
            js.join("greet.js"),
            "module.exports = function (name) {\n  console.log('hi ' + name);\n};\n",
        )
        .unwrap();
        fs::write(js.join("data.json"), "{\"name\": \"sluice\"}\n").unwrap();
        dir
    }

    #[test]
    fn test_bundle_layout() {
        let dir = project();
        let chain = TransformChain::new();
        let artifact = Bundler::new(&chain)
            .bundle(&dir.path().join("src/js/main.js"))
            .unwrap();

        assert_eq!(artifact.name, "main.js");
        assert!(artifact.map.is_none());
        let code = &artifact.code;
        assert!(code.contains("1:[function(require,module,exports){\nvar greet = require('./greet');"));
        assert!(code.contains("},{\"./greet\":2,\"./data.json\":3}],"));
        assert!(code.contains("3:[function(require,module,exports){\nmodule.exports={\"name\": \"sluice\"}\n},{}]\n"));
        assert!(code.ends_with("},{},[1]);\n"));
        assert!(!code.contains("sourceMappingURL"));
    }

    #[test]
    fn test_bundle_is_deterministic() {
        let dir = project();
        let chain = TransformChain::new();
        let bundler = Bundler::new(&chain).sourcemaps(true).relative_to(dir.path());
        let entry = dir.path().join("src/js/main.js");
        let first = bundler.bundle(&entry).unwrap();
        let second = bundler.bundle(&entry).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_inline_map_points_at_original_lines() {
        let dir = project();
        let chain = TransformChain::new();
        let artifact = Bundler::new(&chain)
            .sourcemaps(true)
            .relative_to(dir.path())
            .bundle(&dir.path().join("src/js/main.js"))
            .unwrap();

        let (body, map) = SourceMap::extract_inline(&artifact.code).unwrap();
        let map = map.unwrap();
        assert_eq!(map.file, "main.js");
        assert_eq!(map.sources, vec!["src/js/main.js", "src/js/greet.js", "src/js/data.json"]);

        let lines: Vec<&str> = body.lines().collect();
        let console = lines.iter().position(|l| l.contains("console.log")).unwrap();
        let mapping = map.lines[console].unwrap();
        assert_eq!(mapping.source, 1);
        assert_eq!(mapping.source_line, 1);
        // Prelude and wrapper lines are unmapped.
        assert_eq!(map.lines[0], None);
        assert_eq!(map.lines[1], None);
    }

    #[test]
    fn test_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let chain = TransformChain::new();
        let err = Bundler::new(&chain)
            .bundle(&dir.path().join("main.js"))
            .unwrap_err();
        assert_eq!(err.code, codes::BUILD_ENTRY_NOT_FOUND);
    }
}
