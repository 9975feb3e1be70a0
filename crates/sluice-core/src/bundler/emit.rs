//! Bundle emission.
//!
//! Output layout, one module per table entry:
//!
//! ```text
//! <prelude>({
//! 1:[function(require,module,exports){
//! <module code>
//! },{"./dep":2}],
//! ...
//! },{},[1]);
//! ```
//!
//! Emitted ids are graph ids plus one. Module code is copied line for line,
//! so each of its lines maps to the same line of the original file.

use super::graph::{ModuleGraph, ModuleKind};
use crate::sourcemap::SourceMap;
use std::path::Path;

const PRELUDE: &str = "(function(modules,cache,entries){\
function load(id){\
if(!cache[id]){\
if(!modules[id]){var err=new Error(\"Cannot find module '\"+id+\"'\");err.code=\"MODULE_NOT_FOUND\";throw err;}\
var module=cache[id]={exports:{}};\
modules[id][0].call(module.exports,function(name){var dep=modules[id][1][name];return load(dep?dep:name);},module,module.exports);\
}\
return cache[id].exports;\
}\
for(var i=0;i<entries.length;i++)load(entries[i]);\
return load;\
})";

/// Code plus the line-level map collected while writing it.
pub(super) struct Emitted {
    pub code: String,
    pub map: Option<SourceMap>,
}

struct LineWriter {
    out: String,
    line: usize,
}

impl LineWriter {
    fn push_line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
        self.line += 1;
    }
}

/// Emit `graph` as one executable file named `name`.
///
/// With `sourcemaps`, sources are recorded relative to `root` when they lie
/// beneath it.
pub(super) fn emit(
    graph: &ModuleGraph,
    name: &str,
    sourcemaps: bool,
    root: Option<&Path>,
) -> Emitted {
    let mut writer = LineWriter {
        out: String::new(),
        line: 0,
    };
    let mut map = sourcemaps.then(|| SourceMap::new(name));

    writer.push_line(&format!("{PRELUDE}({{"));

    let last = graph.len().saturating_sub(1);
    for (id, module) in graph.iter() {
        writer.push_line(&format!("{}:[function(require,module,exports){{", id + 1));

        let source = map
            .as_mut()
            .map(|m| m.add_source(&source_name(&module.path, root), &module.original));

        let body = match module.kind {
            ModuleKind::Script => module.code.clone(),
            ModuleKind::Json => format!("module.exports={}", module.code),
        };
        for (index, line) in body.lines().enumerate() {
            if let (Some(m), Some(src)) = (map.as_mut(), source) {
                #[allow(clippy::cast_possible_truncation)]
                m.map_line(writer.line, src, index as u32);
            }
            writer.push_line(line);
        }

        let separator = if id == last { "" } else { "," };
        writer.push_line(&format!("}},{}]{separator}", dependency_map(&module.dependencies)));
    }

    writer.push_line("},{},[1]);");

    Emitted {
        code: writer.out,
        map,
    }
}

/// `{"./a":2,"b":3}` with specifiers in first-appearance order.
fn dependency_map(dependencies: &[(String, usize)]) -> String {
    let entries: Vec<String> = dependencies
        .iter()
        .map(|(specifier, id)| {
            let key = serde_json::Value::String(specifier.clone());
            format!("{key}:{}", id + 1)
        })
        .collect();
    format!("{{{}}}", entries.join(","))
}

fn source_name(path: &Path, root: Option<&Path>) -> String {
    match root.and_then(|r| path.strip_prefix(r).ok()) {
        Some(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        None => path.display().to_string().replace('\\', "/"),
    }
}
