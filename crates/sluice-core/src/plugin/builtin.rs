//! Built-in plugins.
//!
//! Option shapes follow the gulp plugins of the same name. Line-editing
//! processors keep a decoded source map (when present) aligned with the
//! lines they keep.

use super::{Processor, ProcessorFactory};
use crate::artifact::Artifact;
use crate::error::{BuildError, Error, Result};
use crate::scan::{char_classes, is_ident_char, CharClass};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub(super) fn factory(name: &str) -> Option<Arc<dyn ProcessorFactory>> {
    let factory: Arc<dyn ProcessorFactory> = match name {
        "gulp-concat" => Arc::new(concat),
        "gulp-rename" => Arc::new(rename),
        "gulp-uglify" => Arc::new(uglify),
        "gulp-header" => Arc::new(header),
        "gulp-footer" => Arc::new(footer),
        "gulp-replace" => Arc::new(replace),
        "gulp-strip-debug" => Arc::new(strip_debug),
        _ => return None,
    };
    Some(factory)
}

fn parse<T: DeserializeOwned>(plugin: &str, options: &Value) -> Result<T> {
    serde_json::from_value(options.clone())
        .map_err(|e| Error::config(format!("{plugin}: invalid options: {e}")))
}

fn required<'v>(plugin: &str, options: Option<&'v Value>) -> Result<&'v Value> {
    options.ok_or_else(|| Error::config(format!("{plugin}: options are required")))
}

/// Options given either as a bare string or as `{ <key>: string }`.
fn text_option(plugin: &str, key: &str, options: Option<&Value>) -> Result<String> {
    match required(plugin, options)? {
        Value::String(text) => Ok(text.clone()),
        Value::Object(map) => map
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::config(format!("{plugin}: missing string option '{key}'"))),
        other => Err(Error::config(format!("{plugin}: unexpected options {other}"))),
    }
}

// ----------------------------------------------------------------------------
// gulp-concat
// ----------------------------------------------------------------------------

struct Concat {
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConcatOptions {
    name: Option<String>,
}

fn concat(options: Option<&Value>) -> Result<Box<dyn Processor>> {
    let name = match options {
        None => None,
        Some(Value::String(name)) => Some(name.clone()),
        Some(value) => parse::<ConcatOptions>("gulp-concat", value)?.name,
    };
    Ok(Box::new(Concat { name }))
}

impl Processor for Concat {
    fn name(&self) -> &str {
        "gulp-concat"
    }

    fn process(&self, mut artifact: Artifact) -> std::result::Result<Artifact, BuildError> {
        // Single-file stream: concatenation only renames.
        if let Some(name) = &self.name {
            set_name(&mut artifact, name.clone());
        }
        Ok(artifact)
    }
}

fn set_name(artifact: &mut Artifact, name: String) {
    if let Some(map) = artifact.map.as_mut() {
        map.file.clone_from(&name);
    }
    artifact.name = name;
}

// ----------------------------------------------------------------------------
// gulp-rename
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RenameOptions {
    path: Option<String>,
    basename: Option<String>,
    prefix: Option<String>,
    suffix: Option<String>,
    extname: Option<String>,
}

struct Rename(RenameOptions);

fn rename(options: Option<&Value>) -> Result<Box<dyn Processor>> {
    let options = match required("gulp-rename", options)? {
        Value::String(path) => RenameOptions {
            path: Some(path.clone()),
            ..RenameOptions::default()
        },
        value => parse("gulp-rename", value)?,
    };
    Ok(Box::new(Rename(options)))
}

impl Rename {
    fn apply(&self, name: &str) -> String {
        if let Some(path) = &self.0.path {
            return path.clone();
        }
        let (stem, ext) = match name.rfind('.') {
            Some(dot) if dot > 0 => name.split_at(dot),
            _ => (name, ""),
        };
        let stem = self.0.basename.as_deref().unwrap_or(stem);
        let ext = self.0.extname.as_deref().unwrap_or(ext);
        format!(
            "{}{stem}{}{ext}",
            self.0.prefix.as_deref().unwrap_or(""),
            self.0.suffix.as_deref().unwrap_or("")
        )
    }
}

impl Processor for Rename {
    fn name(&self) -> &str {
        "gulp-rename"
    }

    fn process(&self, mut artifact: Artifact) -> std::result::Result<Artifact, BuildError> {
        let name = self.apply(&artifact.name);
        set_name(&mut artifact, name);
        Ok(artifact)
    }
}

// ----------------------------------------------------------------------------
// gulp-uglify
// ----------------------------------------------------------------------------

/// Whitespace-level minifier: drops blank and comment-only lines and
/// leading indentation. Multi-line string contents are left untouched.
struct Uglify;

fn uglify(_options: Option<&Value>) -> Result<Box<dyn Processor>> {
    Ok(Box::new(Uglify))
}

impl Processor for Uglify {
    fn name(&self) -> &str {
        "gulp-uglify"
    }

    fn process(&self, mut artifact: Artifact) -> std::result::Result<Artifact, BuildError> {
        let mut out = String::with_capacity(artifact.code.len());
        let mut keep = Vec::new();

        for line in classified_lines(&artifact.code) {
            let droppable = line.is_comment_only() && !line.text.contains("sourceMappingURL=");
            keep.push(!droppable);
            if droppable {
                continue;
            }
            if line.starts_in_literal {
                out.push_str(line.text);
            } else {
                out.push_str(line.text.trim_start());
            }
            out.push('\n');
        }

        if let Some(map) = artifact.map.as_mut() {
            map.retain_lines(&keep);
        }
        artifact.code = out;
        Ok(artifact)
    }
}

struct ClassifiedLine<'a> {
    text: &'a str,
    classes: Vec<CharClass>,
    /// The line begins inside a multi-line string or template.
    starts_in_literal: bool,
    /// The line's newline belongs to a string or template.
    newline_in_literal: bool,
}

impl ClassifiedLine<'_> {
    fn is_comment_only(&self) -> bool {
        !self.starts_in_literal
            && !self.newline_in_literal
            && self
                .text
                .chars()
                .zip(&self.classes)
                .all(|(c, class)| c.is_whitespace() || *class == CharClass::Comment)
    }

    /// The line's characters outside comments and literals.
    fn code(&self) -> String {
        self.text
            .chars()
            .zip(&self.classes)
            .filter(|(_, class)| **class == CharClass::Code)
            .map(|(c, _)| c)
            .collect()
    }
}

/// Lines of `code` (without terminators) with their character classes.
fn classified_lines(code: &str) -> Vec<ClassifiedLine<'_>> {
    if code.is_empty() {
        return Vec::new();
    }
    let classes = char_classes(code);
    let body = code.strip_suffix('\n').unwrap_or(code);

    let mut lines = Vec::new();
    let mut pos = 0;
    let mut starts_in_literal = false;
    for text in body.split('\n') {
        let len = text.chars().count();
        let newline_in_literal = classes.get(pos + len) == Some(&CharClass::Literal);
        lines.push(ClassifiedLine {
            text,
            classes: classes[pos..pos + len].to_vec(),
            starts_in_literal,
            newline_in_literal,
        });
        starts_in_literal = newline_in_literal;
        pos += len + 1;
    }
    lines
}

// ----------------------------------------------------------------------------
// gulp-header / gulp-footer
// ----------------------------------------------------------------------------

struct Header(String);

fn header(options: Option<&Value>) -> Result<Box<dyn Processor>> {
    Ok(Box::new(Header(text_option("gulp-header", "text", options)?)))
}

impl Processor for Header {
    fn name(&self) -> &str {
        "gulp-header"
    }

    fn process(&self, mut artifact: Artifact) -> std::result::Result<Artifact, BuildError> {
        if let Some(map) = artifact.map.as_mut() {
            map.shift_lines(self.0.matches('\n').count());
        }
        artifact.code.insert_str(0, &self.0);
        Ok(artifact)
    }
}

struct Footer(String);

fn footer(options: Option<&Value>) -> Result<Box<dyn Processor>> {
    Ok(Box::new(Footer(text_option("gulp-footer", "text", options)?)))
}

impl Processor for Footer {
    fn name(&self) -> &str {
        "gulp-footer"
    }

    fn process(&self, mut artifact: Artifact) -> std::result::Result<Artifact, BuildError> {
        artifact.code.push_str(&self.0);
        Ok(artifact)
    }
}

// ----------------------------------------------------------------------------
// gulp-replace
// ----------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplaceOptions {
    Pair(String, String),
    Named { search: String, replacement: String },
}

struct Replace {
    search: String,
    replacement: String,
}

fn replace(options: Option<&Value>) -> Result<Box<dyn Processor>> {
    let options = required("gulp-replace", options)?;
    let (search, replacement) = match parse::<ReplaceOptions>("gulp-replace", options)? {
        ReplaceOptions::Pair(search, replacement)
        | ReplaceOptions::Named {
            search,
            replacement,
        } => (search, replacement),
    };
    if search.is_empty() {
        return Err(Error::config("gulp-replace: search must not be empty"));
    }
    Ok(Box::new(Replace {
        search,
        replacement,
    }))
}

impl Processor for Replace {
    fn name(&self) -> &str {
        "gulp-replace"
    }

    fn process(&self, mut artifact: Artifact) -> std::result::Result<Artifact, BuildError> {
        if artifact.code.contains(&self.search) {
            artifact.code = artifact.code.replace(&self.search, &self.replacement);
        }
        Ok(artifact)
    }
}

// ----------------------------------------------------------------------------
// gulp-strip-debug
// ----------------------------------------------------------------------------

/// Removes lines whose every statement is a `console.*(...)` call or
/// `debugger`.
struct StripDebug;

fn strip_debug(_options: Option<&Value>) -> Result<Box<dyn Processor>> {
    Ok(Box::new(StripDebug))
}

/// `code` is a line with comments and literals removed.
fn is_debug_line(code: &str) -> bool {
    let mut statements = top_level_statements(code)
        .into_iter()
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .peekable();
    statements.peek().is_some() && statements.all(is_debug_statement)
}

/// Split on `;` outside brackets.
fn top_level_statements(code: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, c) in code.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ';' if depth == 0 => {
                statements.push(&code[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    statements.push(&code[start..]);
    statements
}

fn is_debug_statement(statement: &str) -> bool {
    if statement == "debugger" {
        return true;
    }
    let Some(call) = statement.strip_prefix("console.") else {
        return false;
    };
    let Some(args_at) = call.find(|c: char| !is_ident_char(c)) else {
        return false;
    };
    let args = &call[args_at..];
    args_at > 0 && args.starts_with('(') && closing_paren(args) == Some(args.len() - 1)
}

/// Byte index of the `)` matching the `(` that opens `text`.
fn closing_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

impl Processor for StripDebug {
    fn name(&self) -> &str {
        "gulp-strip-debug"
    }

    fn process(&self, mut artifact: Artifact) -> std::result::Result<Artifact, BuildError> {
        let mut out = String::with_capacity(artifact.code.len());
        let mut keep = Vec::new();

        for line in classified_lines(&artifact.code) {
            let debug = !line.starts_in_literal
                && !line.newline_in_literal
                && is_debug_line(&line.code());
            keep.push(!debug);
            if !debug {
                out.push_str(line.text);
                out.push('\n');
            }
        }

        if let Some(map) = artifact.map.as_mut() {
            map.retain_lines(&keep);
        }
        artifact.code = out;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sourcemap::SourceMap;
    use serde_json::json;

    fn run(name: &str, options: Option<Value>, artifact: Artifact) -> Artifact {
        factory(name)
            .unwrap()
            .instantiate(options.as_ref())
            .unwrap()
            .process(artifact)
            .unwrap()
    }

    fn mapped(code: &str) -> Artifact {
        let mut map = SourceMap::new("main.js");
        let src = map.add_source("main.js", code);
        for line in 0..code.lines().count() {
            #[allow(clippy::cast_possible_truncation)]
            map.map_line(line, src, line as u32);
        }
        Artifact {
            name: "main.js".to_string(),
            code: code.to_string(),
            map: Some(map),
        }
    }

    #[test]
    fn concat_renames_artifact_and_map() {
        let out = run("gulp-concat", Some(json!({"name": "all.js"})), mapped("a;\n"));
        assert_eq!(out.name, "all.js");
        assert_eq!(out.map.unwrap().file, "all.js");

        let out = run("gulp-concat", None, Artifact::new("main.js", ""));
        assert_eq!(out.name, "main.js");
    }

    #[test]
    fn rename_composes_parts() {
        let opts = json!({"prefix": "app-", "suffix": ".min", "extname": ".mjs"});
        let out = run("gulp-rename", Some(opts), Artifact::new("main.js", ""));
        assert_eq!(out.name, "app-main.min.mjs");

        let out = run("gulp-rename", Some(json!({"basename": "bundle"})), Artifact::new("main.js", ""));
        assert_eq!(out.name, "bundle.js");

        let out = run("gulp-rename", Some(json!("out/app.js")), Artifact::new("main.js", ""));
        assert_eq!(out.name, "out/app.js");
    }

    #[test]
    fn rename_requires_options() {
        assert!(factory("gulp-rename").unwrap().instantiate(None).is_err());
        let bad = json!({"nonsense": true});
        assert!(factory("gulp-rename").unwrap().instantiate(Some(&bad)).is_err());
    }

    #[test]
    fn uglify_keeps_map_aligned() {
        let code = "// banner\nfunction f() {\n\n    /* note */\n    return 1;\n}\n";
        let out = run("gulp-uglify", None, mapped(code));
        assert_eq!(out.code, "function f() {\nreturn 1;\n}\n");

        let map = out.map.unwrap();
        let lines: Vec<u32> = map.lines.iter().map(|l| l.unwrap().source_line).collect();
        assert_eq!(lines, vec![1, 4, 5]);
    }

    #[test]
    fn uglify_keeps_code_after_regex_literals() {
        let code = "var parts = s.split(/\\/*/);\nrun(parts);\nvar t = 1; /* end */\n";
        let out = run("gulp-uglify", None, Artifact::new("a.js", code));
        assert_eq!(out.code, code);

        let code = "var any = /[/*]/;\n    /* note */\nvar q = /\"/;\n// done\n";
        let out = run("gulp-uglify", None, Artifact::new("a.js", code));
        assert_eq!(out.code, "var any = /[/*]/;\nvar q = /\"/;\n");
    }

    #[test]
    fn uglify_preserves_multiline_literals() {
        let code = "var t = `\n\n    indented\n`;\n";
        let out = run("gulp-uglify", None, Artifact::new("a.js", code));
        assert_eq!(out.code, code);
    }

    #[test]
    fn header_shifts_map() {
        let out = run(
            "gulp-header",
            Some(json!({"text": "/* v1 */\n/* MIT */\n"})),
            mapped("a;\nb;\n"),
        );
        assert!(out.code.starts_with("/* v1 */\n/* MIT */\na;"));
        let map = out.map.unwrap();
        assert_eq!(map.lines[0], None);
        assert_eq!(map.lines[2].unwrap().source_line, 0);
    }

    #[test]
    fn header_and_footer_accept_bare_text() {
        let out = run("gulp-header", Some(json!("// top\n")), Artifact::new("a.js", "x;\n"));
        let out = run("gulp-footer", Some(json!("// end\n")), out);
        assert_eq!(out.code, "// top\nx;\n// end\n");
        assert!(factory("gulp-footer").unwrap().instantiate(None).is_err());
    }

    #[test]
    fn replace_is_literal() {
        let opts = json!({"search": "$VERSION", "replacement": "1.2.3"});
        let out = run("gulp-replace", Some(opts), Artifact::new("a.js", "v='$VERSION';v2='$VERSION'"));
        assert_eq!(out.code, "v='1.2.3';v2='1.2.3'");

        let out = run("gulp-replace", Some(json!(["a", "b"])), Artifact::new("a.js", "aa"));
        assert_eq!(out.code, "bb");
    }

    #[test]
    fn strip_debug_removes_statement_lines() {
        let code = "var a = 1;\nconsole.log('a', f(a));\n  debugger;\nlog(console.log);\nconsole.log(\n  a);\n";
        let out = run("gulp-strip-debug", None, Artifact::new("a.js", code));
        assert_eq!(out.code, "var a = 1;\nlog(console.log);\nconsole.log(\n  a);\n");
    }

    #[test]
    fn strip_debug_keeps_lines_with_other_statements() {
        let code = "console.log('boot'); start();\nconsole.log('a'); debugger;\nconsole.log(a) || start();\n";
        let out = run("gulp-strip-debug", None, Artifact::new("a.js", code));
        assert_eq!(out.code, "console.log('boot'); start();\nconsole.log(a) || start();\n");
    }

    #[test]
    fn strip_debug_ignores_strings() {
        let code = "var s = `\nconsole.log(1);\n`;\n";
        let out = run("gulp-strip-debug", None, Artifact::new("a.js", code));
        assert_eq!(out.code, code);
    }
}
