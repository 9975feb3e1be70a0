//! Module dependency graph.
//!
//! Built breadth-first from the entry: ids follow discovery order and each
//! module's dependencies keep the order their `require` calls first appear.

use crate::error::{codes, BuildError};
use crate::resolve::resolve;
use crate::scan::scan_requires;
use crate::transform::TransformChain;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

/// Index of a module in the graph. The entry is always `0`.
pub type ModuleId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Script,
    Json,
}

impl ModuleKind {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Script,
        }
    }
}

/// A module in the dependency graph.
#[derive(Debug, Clone)]
pub struct Module {
    /// Canonical path of the module.
    pub path: PathBuf,
    pub kind: ModuleKind,
    /// Source as read from disk.
    pub original: String,
    /// Source after the transform chain.
    pub code: String,
    /// `(specifier, target)` in first-appearance order.
    pub dependencies: Vec<(String, ModuleId)>,
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    path_to_id: HashMap<PathBuf, ModuleId>,
}

impl ModuleGraph {
    /// Read, transform and link every module reachable from `entry`.
    pub fn build(entry: &Path, chain: &TransformChain) -> Result<Self, BuildError> {
        if !entry.is_file() {
            return Err(BuildError::new(
                codes::BUILD_ENTRY_NOT_FOUND,
                "entry file does not exist",
            )
            .at(entry.display().to_string()));
        }
        let entry = dunce::canonicalize(entry).map_err(|e| {
            BuildError::new(codes::BUILD_READ_ERROR, e.to_string()).at(entry.display().to_string())
        })?;

        let mut graph = Self::default();
        let mut queue = VecDeque::new();
        queue.push_back(graph.load(entry, chain)?);

        while let Some(id) = queue.pop_front() {
            let specifiers: Vec<String> = match graph.modules[id].kind {
                ModuleKind::Json => Vec::new(),
                ModuleKind::Script => scan_requires(&graph.modules[id].code)
                    .into_iter()
                    .map(|r| r.specifier)
                    .collect(),
            };

            let mut dependencies = Vec::with_capacity(specifiers.len());
            for specifier in specifiers {
                let target = resolve(&specifier, &graph.modules[id].path)?;
                let dep_id = match graph.path_to_id.get(&target) {
                    Some(&known) => known,
                    None => {
                        let new_id = graph.load(target, chain)?;
                        queue.push_back(new_id);
                        new_id
                    }
                };
                dependencies.push((specifier, dep_id));
            }
            graph.modules[id].dependencies = dependencies;
        }

        Ok(graph)
    }

    /// Read and transform one module, assigning the next id.
    fn load(&mut self, path: PathBuf, chain: &TransformChain) -> Result<ModuleId, BuildError> {
        let display = path.display().to_string();
        let original = sluice_util::fs::read_source(&path)
            .map_err(|e| BuildError::new(codes::BUILD_READ_ERROR, e.to_string()).at(&display))?;

        let kind = ModuleKind::of(&path);
        let code = match kind {
            ModuleKind::Script => chain.apply(&original, &path)?,
            ModuleKind::Json => {
                serde_json::from_str::<serde_json::Value>(&original).map_err(|e| {
                    BuildError::new(codes::BUILD_TRANSFORM_ERROR, format!("invalid JSON: {e}"))
                        .at(&display)
                })?;
                original.trim_end().to_string()
            }
        };

        let id = self.modules.len();
        self.path_to_id.insert(path.clone(), id);
        self.modules.push(Module {
            path,
            kind,
            original,
            code,
            dependencies: Vec::new(),
        });
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate()
    }
}
