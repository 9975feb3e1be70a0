//! `require` specifier resolution.
//!
//! ## Specifier Types
//!
//! - Relative: `./utils`, `../lib/foo`
//! - Absolute: `/abs/path/to/module`
//! - Bare: `lodash`, `@scope/pkg`, `lodash/get`, looked up in `node_modules`
//!   directories walking up from the requiring file.

use crate::error::{codes, BuildError};
use std::path::{Path, PathBuf};

/// Extensions probed when a specifier names no existing file.
const EXTENSIONS: &[&str] = &["js", "json"];

/// Resolve `specifier` required from the file `from`.
pub fn resolve(specifier: &str, from: &Path) -> Result<PathBuf, BuildError> {
    let not_found = |message: String| {
        BuildError::new(
            codes::BUILD_RESOLVE_ERROR,
            format!("Cannot resolve '{specifier}': {message}"),
        )
        .at(from.display().to_string())
    };

    if specifier.is_empty() {
        return Err(not_found("empty specifier".to_string()));
    }

    if is_relative(specifier) {
        let from_dir = from.parent().unwrap_or(Path::new("."));
        return resolve_file_or_directory(&from_dir.join(specifier))
            .ok_or_else(|| not_found("file not found".to_string()));
    }

    if Path::new(specifier).is_absolute() {
        return resolve_file_or_directory(Path::new(specifier))
            .ok_or_else(|| not_found("file not found".to_string()));
    }

    let (pkg_name, subpath) = parse_bare_specifier(specifier);
    let mut current = from.parent();
    while let Some(dir) = current {
        let pkg_dir = dir.join("node_modules").join(pkg_name);
        if pkg_dir.is_dir() {
            let found = match subpath {
                Some(sub) => resolve_file_or_directory(&pkg_dir.join(sub)),
                None => resolve_package_entry(&pkg_dir),
            };
            if let Some(path) = found {
                return Ok(path);
            }
        }
        current = dir.parent();
    }

    Err(not_found(format!(
        "cannot find package '{pkg_name}' in node_modules"
    )))
}

fn is_relative(specifier: &str) -> bool {
    matches!(specifier, "." | "..") || specifier.starts_with("./") || specifier.starts_with("../")
}

/// Split a bare specifier into package name and subpath.
fn parse_bare_specifier(specifier: &str) -> (&str, Option<&str>) {
    let split_at = if specifier.starts_with('@') {
        specifier
            .match_indices('/')
            .nth(1)
            .map(|(index, _)| index)
    } else {
        specifier.find('/')
    };
    match split_at {
        Some(index) => (&specifier[..index], Some(&specifier[index + 1..])),
        None => (specifier, None),
    }
}

/// Entry point of a package directory: `browser`, then `main`, then `index`.
fn resolve_package_entry(pkg_dir: &Path) -> Option<PathBuf> {
    let manifest = std::fs::read_to_string(pkg_dir.join("package.json"))
        .ok()
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok());

    if let Some(json) = manifest {
        for field in ["browser", "main"] {
            if let Some(entry) = json.get(field).and_then(|v| v.as_str()) {
                if let Some(path) = resolve_file_or_directory(&pkg_dir.join(entry)) {
                    return Some(path);
                }
            }
        }
    }

    resolve_index(pkg_dir)
}

/// Resolve a path that might be a file, an extension-less file or a directory.
fn resolve_file_or_directory(target: &Path) -> Option<PathBuf> {
    if target.is_file() {
        return canonical(target);
    }

    for ext in EXTENSIONS {
        let with_ext = PathBuf::from(format!("{}.{ext}", target.display()));
        if with_ext.is_file() {
            return canonical(&with_ext);
        }
    }

    if target.is_dir() {
        return resolve_index(target);
    }
    None
}

fn resolve_index(dir: &Path) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("index.{ext}")))
        .find(|p| p.is_file())
        .and_then(|p| canonical(&p))
}

fn canonical(path: &Path) -> Option<PathBuf> {
    dunce::canonicalize(path).ok()
}
