use regex::{Regex, RegexBuilder};

use crate::error::PatternError;
use crate::types::SearchQuery;

/// Compile a query into the matcher shared by every worker.
///
/// Literal patterns are escaped first; `whole_word` wraps them in word
/// boundaries. Regex patterns are compiled as given.
pub fn compile(query: &SearchQuery) -> Result<Regex, PatternError> {
    if query.pattern.is_empty() {
        return Err(PatternError::Empty);
    }

    let source = if query.is_regex {
        query.pattern.clone()
    } else {
        let escaped = regex::escape(&query.pattern);
        if query.whole_word {
            format!(r"\b{}\b", escaped)
        } else {
            escaped
        }
    };

    RegexBuilder::new(&source)
        .case_insensitive(!query.case_sensitive)
        .build()
        .map_err(|e| PatternError::Invalid {
            pattern: query.pattern.clone(),
            message: e.to_string(),
        })
}
