//! Transforms and presets implemented in-process.
//!
//! Every built-in preserves the line count of its input so the bundler's
//! line-level source map stays aligned with the original files.

use super::Transform;
use crate::error::BuildError;
use crate::scan::{is_ident_char, map_code, replace_word};
use std::collections::BTreeMap;
use std::path::Path;

pub(super) fn transform(
    id: &str,
    variables: &BTreeMap<String, String>,
) -> Option<Box<dyn Transform>> {
    match id {
        "envify" => Some(Box::new(Envify::new(variables.clone()))),
        _ => None,
    }
}

pub(super) fn preset(id: &str) -> Option<Box<dyn Transform>> {
    match id {
        "es2015" => Some(Box::new(Es2015Preset)),
        "strict" => Some(Box::new(StrictPreset)),
        _ => None,
    }
}

/// Inlines `process.env.NAME` reads as string literals.
///
/// Undefined variables and assignments are left alone.
#[derive(Debug, Clone)]
pub struct Envify {
    variables: BTreeMap<String, String>,
}

impl Envify {
    #[must_use]
    pub fn new(variables: BTreeMap<String, String>) -> Self {
        Self { variables }
    }

    fn replace_reads(&self, code: &str) -> String {
        const PREFIX: &str = "process.env.";
        let mut out = String::with_capacity(code.len());
        let mut rest = code;

        while let Some(found) = rest.find(PREFIX) {
            let (before, tail) = rest.split_at(found);
            out.push_str(before);

            let boundary = out
                .chars()
                .next_back()
                .map_or(true, |c| !is_ident_char(c) && c != '.');
            let after_prefix = &tail[PREFIX.len()..];
            let name_len = after_prefix
                .find(|c: char| !is_ident_char(c))
                .unwrap_or(after_prefix.len());
            let name = &after_prefix[..name_len];
            let remainder = &after_prefix[name_len..];

            match self.variables.get(name) {
                Some(value) if boundary && !name.is_empty() && !is_assignment(remainder) => {
                    out.push_str(&serde_json::Value::String(value.clone()).to_string());
                }
                _ => out.push_str(&tail[..PREFIX.len() + name_len]),
            }
            rest = remainder;
        }
        out.push_str(rest);
        out
    }
}

fn is_assignment(rest: &str) -> bool {
    let rest = rest.trim_start();
    rest.starts_with('=') && !rest.starts_with("==")
}

impl Transform for Envify {
    fn name(&self) -> &str {
        "envify"
    }

    fn apply(&self, source: &str, _path: &Path) -> Result<String, BuildError> {
        if !source.contains("process.env.") {
            return Ok(source.to_string());
        }
        Ok(map_code(source, |code| self.replace_reads(code)))
    }
}

/// Rewrites block-scoped `const`/`let` declarations to `var`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Es2015Preset;

impl Transform for Es2015Preset {
    fn name(&self) -> &str {
        "es2015"
    }

    fn apply(&self, source: &str, _path: &Path) -> Result<String, BuildError> {
        // A declaration keyword is followed by a binding name or pattern.
        let declares =
            |next: Option<char>| next.is_some_and(|c| is_ident_char(c) || c == '[' || c == '{');
        Ok(map_code(source, |code| {
            let code = replace_word(code, "const", "var", declares);
            replace_word(&code, "let", "var", declares)
        }))
    }
}

/// Prepends a `"use strict";` directive when the module lacks one.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictPreset;

impl Transform for StrictPreset {
    fn name(&self) -> &str {
        "strict"
    }

    fn apply(&self, source: &str, _path: &Path) -> Result<String, BuildError> {
        let head = source.trim_start();
        if head.starts_with("\"use strict\"") || head.starts_with("'use strict'") {
            return Ok(source.to_string());
        }
        // Same line, so line numbers are unchanged.
        Ok(format!("\"use strict\"; {source}"))
    }
}
