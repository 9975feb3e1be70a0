//! Lightweight lexical scanning of CommonJS sources.
//!
//! Finds `require("…")` calls and separates code from comments, string
//! literals and regex literals without building an AST.
//!
//! A `/` opens a regex literal wherever an expression may start: at the
//! start of input, after punctuation other than `)` and `]`, and after
//! keywords such as `return` or `typeof`. Elsewhere it is division.

use std::collections::HashSet;

/// A static `require` call found in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    /// Specifier exactly as written.
    pub specifier: String,
    /// 1-based line of the call.
    pub line: u32,
}

/// Scan `source` for static `require` calls.
///
/// Returns specifiers in first-appearance order, deduplicated.
#[must_use]
pub fn scan_requires(source: &str) -> Vec<Require> {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut results = Vec::new();
    let mut seen = HashSet::new();
    let mut line: u32 = 1;
    let mut lexer = Lexer::new(&chars);
    let mut i = 0;

    while i < len {
        if let Some((end, _)) = lexer.literal_at(i) {
            line += count_newlines(&chars[i..end]);
            i = end;
            continue;
        }
        if chars[i] == '\n' {
            line += 1;
        }
        if matches_keyword(&chars, i, "require") && (i == 0 || chars[i - 1] != '.') {
            if let Some((specifier, end)) = require_argument(&chars, i + "require".len()) {
                if seen.insert(specifier.clone()) {
                    results.push(Require { specifier, line });
                }
                line += count_newlines(&chars[i..end]);
                lexer.expression_end();
                i = end;
                continue;
            }
        }
        lexer.code(i);
        i += 1;
    }

    results
}

/// Apply `f` to every run of code between comments and string literals.
///
/// Comments and literals are copied through unchanged.
pub(crate) fn map_code(source: &str, mut f: impl FnMut(&str) -> String) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut code = String::new();
    let mut lexer = Lexer::new(&chars);
    let mut i = 0;

    while i < chars.len() {
        if let Some((end, _)) = lexer.literal_at(i) {
            if !code.is_empty() {
                out.push_str(&f(&code));
                code.clear();
            }
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }
        lexer.code(i);
        code.push(chars[i]);
        i += 1;
    }
    if !code.is_empty() {
        out.push_str(&f(&code));
    }
    out
}

/// Lexical class of one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CharClass {
    Code,
    Comment,
    Literal,
}

/// Classify every character of `source`, one entry per `char`.
pub(crate) fn char_classes(source: &str) -> Vec<CharClass> {
    let chars: Vec<char> = source.chars().collect();
    let mut classes = Vec::with_capacity(chars.len());
    let mut lexer = Lexer::new(&chars);
    let mut i = 0;

    while i < chars.len() {
        if let Some((end, class)) = lexer.literal_at(i) {
            classes.extend(std::iter::repeat(class).take(end - i));
            i = end;
            continue;
        }
        lexer.code(i);
        classes.push(CharClass::Code);
        i += 1;
    }
    classes
}

/// Replace whole-word occurrences of `word` in a code run.
///
/// `accept` sees the next non-whitespace character after the word and
/// decides whether this occurrence is rewritten. Property accesses
/// (`obj.word`) are never rewritten.
pub(crate) fn replace_word(
    code: &str,
    word: &str,
    replacement: &str,
    accept: impl Fn(Option<char>) -> bool,
) -> String {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    let mut i = 0;

    while i < chars.len() {
        if matches_keyword(&chars, i, word) && (i == 0 || chars[i - 1] != '.') {
            let after = i + word.chars().count();
            let next = chars[after..].iter().copied().find(|c| !c.is_whitespace());
            if accept(next) {
                out.push_str(replacement);
                i = after;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Keywords after which a `/` starts a regex literal.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

/// Left-to-right walk that remembers whether a regex literal may start.
struct Lexer<'a> {
    chars: &'a [char],
    regex_allowed: bool,
}

impl<'a> Lexer<'a> {
    fn new(chars: &'a [char]) -> Self {
        Self {
            chars,
            regex_allowed: true,
        }
    }

    /// If a comment or literal starts at `i`, return the index just past it
    /// and its class.
    fn literal_at(&mut self, i: usize) -> Option<(usize, CharClass)> {
        let chars = self.chars;
        if chars[i] == '/' && !matches!(chars.get(i + 1), Some('/' | '*')) {
            if !self.regex_allowed {
                return None;
            }
            self.regex_allowed = false;
            return Some((skip_regex(chars, i), CharClass::Literal));
        }
        let end = skip_literal(chars, i)?;
        if chars[i] == '/' {
            Some((end, CharClass::Comment))
        } else {
            self.regex_allowed = false;
            Some((end, CharClass::Literal))
        }
    }

    /// Record the code character at `i`.
    fn code(&mut self, i: usize) {
        let c = self.chars[i];
        if c.is_whitespace() {
            return;
        }
        self.regex_allowed = if is_ident_char(c) {
            let word_ends = !self.chars.get(i + 1).is_some_and(|&next| is_ident_char(next));
            word_ends && REGEX_KEYWORDS.contains(&word_ending_at(self.chars, i).as_str())
        } else {
            !matches!(c, ')' | ']')
        };
    }

    /// An operand was consumed outside [`Lexer::code`].
    fn expression_end(&mut self) {
        self.regex_allowed = false;
    }
}

fn word_ending_at(chars: &[char], end: usize) -> String {
    let mut start = end;
    while start > 0 && is_ident_char(chars[start - 1]) {
        start -= 1;
    }
    chars[start..=end].iter().collect()
}

/// Index just past the regex literal (flags included) opening at `i`.
fn skip_regex(chars: &[char], i: usize) -> usize {
    let len = chars.len();
    let mut in_class = false;
    let mut j = i + 1;
    while j < len {
        match chars[j] {
            '\\' => j += 1,
            // Unterminated; stop at the line end.
            '\n' => return j,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                j += 1;
                while j < len && is_ident_char(chars[j]) {
                    j += 1;
                }
                return j;
            }
            _ => {}
        }
        j += 1;
    }
    len
}

/// If a comment or string literal starts at `i`, return the index just past it.
fn skip_literal(chars: &[char], i: usize) -> Option<usize> {
    let len = chars.len();
    match chars[i] {
        '/' if i + 1 < len && chars[i + 1] == '/' => {
            let mut j = i + 2;
            while j < len && chars[j] != '\n' {
                j += 1;
            }
            Some(j)
        }
        '/' if i + 1 < len && chars[i + 1] == '*' => {
            let mut j = i + 2;
            while j + 1 < len && !(chars[j] == '*' && chars[j + 1] == '/') {
                j += 1;
            }
            Some((j + 2).min(len))
        }
        quote @ ('"' | '\'' | '`') => {
            let mut j = i + 1;
            while j < len && chars[j] != quote {
                if chars[j] == '\\' {
                    j += 1;
                } else if chars[j] == '\n' && quote != '`' {
                    // Unterminated; stop at the line end.
                    return Some(j);
                }
                j += 1;
            }
            Some((j + 1).min(len))
        }
        _ => None,
    }
}

/// Check if chars at position match a keyword with word boundaries.
fn matches_keyword(chars: &[char], pos: usize, keyword: &str) -> bool {
    let mut end = pos;
    for expected in keyword.chars() {
        if end >= chars.len() || chars[end] != expected {
            return false;
        }
        end += 1;
    }
    if pos > 0 && is_ident_char(chars[pos - 1]) {
        return false;
    }
    !(end < chars.len() && is_ident_char(chars[end]))
}

/// Parse `( "spec" )` starting at `start`; returns the specifier and the
/// index past the closing parenthesis.
fn require_argument(chars: &[char], start: usize) -> Option<(String, usize)> {
    let len = chars.len();
    let mut i = skip_whitespace(chars, start);
    if i >= len || chars[i] != '(' {
        return None;
    }
    i = skip_whitespace(chars, i + 1);
    if i >= len || !matches!(chars[i], '"' | '\'' | '`') {
        return None;
    }
    let end = skip_literal(chars, i)?;
    let quote = chars[i];
    if end - 1 <= i || chars[end - 1] != quote {
        return None;
    }
    let specifier: String = chars[i + 1..end - 1].iter().collect();
    if quote == '`' && specifier.contains("${") {
        return None;
    }
    let close = skip_whitespace(chars, end);
    if close >= len || chars[close] != ')' {
        return None;
    }
    Some((specifier, close + 1))
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn count_newlines(chars: &[char]) -> u32 {
    chars.iter().filter(|&&c| c == '\n').count() as u32
}
