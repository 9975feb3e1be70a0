use crate::sourcemap::SourceMap;

/// The single bundled file flowing through the plugin pipeline.
///
/// `map` is only populated while a sourcemap context is open; outside it the
/// map (if any) lives in `code` as an inline comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Output file name, relative to the scripts output directory.
    pub name: String,
    pub code: String,
    pub map: Option<SourceMap>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            map: None,
        }
    }
}
