use regex::bytes::Regex;

use crate::errors::{FetchError, FetchResult};

/// Case-sensitive substring test applied to every scanned line.
///
/// Lines are matched as raw bytes, so input that is not valid UTF-8 is
/// compared byte for byte rather than after decoding.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keyword: String,
    literal: Regex,
}

impl KeywordMatcher {
    /// Creates a matcher for `keyword`. An empty keyword matches every line.
    pub fn new(keyword: impl Into<String>) -> FetchResult<Self> {
        let keyword = keyword.into();
        let literal = Regex::new(&regex::escape(&keyword))
            .map_err(|e| FetchError::invalid_keyword(e.to_string()))?;
        Ok(Self { keyword, literal })
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Whether every line is selected
    pub fn matches_everything(&self) -> bool {
        self.keyword.is_empty()
    }

    /// Returns true if `line` contains the keyword as a contiguous substring
    pub fn is_match(&self, line: &[u8]) -> bool {
        self.matches_everything() || self.literal.is_match(line)
    }
}
