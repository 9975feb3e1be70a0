//! Line-level V3 source maps.
//!
//! The bundler records one mapping per output line. Plugins running inside
//! the sourcemap context edit the decoded form (shift, drop or rename lines)
//! and the context re-encodes it as an inline comment when it closes.

use crate::error::{codes, BuildError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

const INLINE_PREFIX: &str = "//# sourceMappingURL=data:application/json;charset=utf-8;base64,";
const B64_DIGITS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Where one output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMapping {
    pub source: u32,
    pub source_line: u32,
}

/// Decoded source map: at most one mapping per generated line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    pub file: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub lines: Vec<Option<LineMapping>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
    version: u8,
    #[serde(default)]
    file: String,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sources_content: Vec<Option<String>>,
    #[serde(default)]
    names: Vec<String>,
    mappings: String,
}

impl SourceMap {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    /// Register a source file, returning its index.
    pub fn add_source(&mut self, path: &str, content: &str) -> u32 {
        self.sources.push(path.to_string());
        self.sources_content.push(content.to_string());
        (self.sources.len() - 1) as u32
    }

    /// Map `output_line` (0-based) to `source_line` of `source`.
    pub fn map_line(&mut self, output_line: usize, source: u32, source_line: u32) {
        if self.lines.len() <= output_line {
            self.lines.resize(output_line + 1, None);
        }
        self.lines[output_line] = Some(LineMapping {
            source,
            source_line,
        });
    }

    /// Account for `count` unmapped lines inserted before the first line.
    pub fn shift_lines(&mut self, count: usize) {
        self.lines.splice(0..0, std::iter::repeat(None).take(count));
    }

    /// Keep only the lines whose flag is `true`; lines past the end of
    /// `keep` are kept.
    pub fn retain_lines(&mut self, keep: &[bool]) {
        let mut index = 0;
        self.lines.retain(|_| {
            let kept = keep.get(index).copied().unwrap_or(true);
            index += 1;
            kept
        });
    }

    /// Encode the `mappings` field.
    #[must_use]
    pub fn encode_mappings(&self) -> String {
        let mut out = String::new();
        let mut prev_source: i64 = 0;
        let mut prev_line: i64 = 0;

        for (index, line) in self.lines.iter().enumerate() {
            if index > 0 {
                out.push(';');
            }
            if let Some(mapping) = line {
                vlq_encode(0, &mut out);
                vlq_encode(i64::from(mapping.source) - prev_source, &mut out);
                vlq_encode(i64::from(mapping.source_line) - prev_line, &mut out);
                vlq_encode(0, &mut out);
                prev_source = i64::from(mapping.source);
                prev_line = i64::from(mapping.source_line);
            }
        }
        out
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        let raw = RawSourceMap {
            version: 3,
            file: self.file.clone(),
            sources: self.sources.clone(),
            sources_content: self.sources_content.iter().cloned().map(Some).collect(),
            names: Vec::new(),
            mappings: self.encode_mappings(),
        };
        serde_json::to_string(&raw).unwrap_or_default()
    }

    /// Parse a V3 map. Only the first segment of each generated line is kept.
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        let raw: RawSourceMap = serde_json::from_str(json)
            .map_err(|e| BuildError::new(codes::BUILD_SOURCEMAP_ERROR, e.to_string()))?;
        if raw.version != 3 {
            return Err(BuildError::new(
                codes::BUILD_SOURCEMAP_ERROR,
                format!("unsupported source map version {}", raw.version),
            ));
        }
        let lines = decode_mappings(&raw.mappings)?;
        Ok(Self {
            file: raw.file,
            sources_content: raw
                .sources_content
                .into_iter()
                .map(Option::unwrap_or_default)
                .collect(),
            sources: raw.sources,
            lines,
        })
    }

    /// The `//# sourceMappingURL=data:…` comment for this map.
    #[must_use]
    pub fn to_inline_comment(&self) -> String {
        format!("{INLINE_PREFIX}{}", BASE64.encode(self.to_json()))
    }

    /// Remove the last inline map comment from `code`.
    ///
    /// Returns the code without the comment line and the decoded map, if
    /// any. Text after the comment (a footer, say) is kept.
    pub fn extract_inline(code: &str) -> Result<(String, Option<Self>), BuildError> {
        let Some(start) = code.rfind(INLINE_PREFIX) else {
            return Ok((code.to_string(), None));
        };
        let rest = &code[start + INLINE_PREFIX.len()..];
        let (payload, after) = rest.split_once('\n').unwrap_or((rest, ""));

        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| BuildError::new(codes::BUILD_SOURCEMAP_ERROR, e.to_string()))?;
        let json = String::from_utf8_lossy(&bytes);
        let map = Self::from_json(&json)?;

        let mut body = code[..start].trim_end_matches('\n').to_string();
        body.push('\n');
        body.push_str(after);
        Ok((body, Some(map)))
    }
}

/// VLQ-encode a signed integer and append to `out`.
fn vlq_encode(value: i64, out: &mut String) {
    #[allow(clippy::cast_sign_loss)]
    let mut v = (if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    }) as u64;
    loop {
        let mut digit = (v & 0x1f) as u8;
        v >>= 5;
        if v > 0 {
            digit |= 0x20;
        }
        out.push(B64_DIGITS[digit as usize] as char);
        if v == 0 {
            break;
        }
    }
}

fn vlq_decode_segment(segment: &str) -> Result<Vec<i64>, BuildError> {
    let mut values = Vec::new();
    let mut value: i64 = 0;
    let mut shift = 0;

    for byte in segment.bytes() {
        let digit = B64_DIGITS
            .iter()
            .position(|&b| b == byte)
            .ok_or_else(|| {
                BuildError::new(
                    codes::BUILD_SOURCEMAP_ERROR,
                    format!("invalid mapping character '{}'", byte as char),
                )
            })? as i64;
        value += (digit & 0x1f) << shift;
        if digit & 0x20 == 0 {
            let negative = value & 1 == 1;
            let magnitude = value >> 1;
            values.push(if negative { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
        } else {
            shift += 5;
        }
    }
    if shift != 0 {
        return Err(BuildError::new(
            codes::BUILD_SOURCEMAP_ERROR,
            "truncated mapping segment",
        ));
    }
    Ok(values)
}

fn decode_mappings(mappings: &str) -> Result<Vec<Option<LineMapping>>, BuildError> {
    let mut lines = Vec::new();
    let mut source: i64 = 0;
    let mut source_line: i64 = 0;

    for line in mappings.split(';') {
        let mut first = None;
        for segment in line.split(',').filter(|s| !s.is_empty()) {
            let fields = vlq_decode_segment(segment)?;
            if fields.len() >= 4 {
                source += fields[1];
                source_line += fields[2];
                if first.is_none() && source >= 0 && source_line >= 0 {
                    #[allow(clippy::cast_sign_loss)]
                    let mapping = LineMapping {
                        source: source as u32,
                        source_line: source_line as u32,
                    };
                    first = Some(mapping);
                }
            }
        }
        lines.push(first);
    }
    if mappings.is_empty() {
        lines.clear();
    }
    Ok(lines)
}
