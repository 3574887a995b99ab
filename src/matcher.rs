// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pattern matching over cache keys, used by `GET_MATCHING`.

use std::collections::HashSet;

use regex::Regex;

use crate::element::CacheKey;
use crate::error::CacheError;

pub trait KeyMatcher<K: CacheKey>: Send + Sync {
    /// Keys from `keys` whose canonical string form matches `pattern`.
    fn matching_keys(&self, pattern: &str, keys: &mut dyn Iterator<Item = K>) -> Result<HashSet<K>, CacheError>;
}

/// Regular-expression matcher. A pattern must match the whole key.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexKeyMatcher;

impl RegexKeyMatcher {
    /// Compile `pattern` anchored at both ends.
    pub fn compile(pattern: &str) -> Result<Regex, CacheError> {
        Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
    }
}

impl<K: CacheKey> KeyMatcher<K> for RegexKeyMatcher {
    fn matching_keys(&self, pattern: &str, keys: &mut dyn Iterator<Item = K>) -> Result<HashSet<K>, CacheError> {
        let re = Self::compile(pattern)?;
        Ok(keys
            .filter(|k| k.as_str_key().is_some_and(|s| re.is_match(s)))
            .collect())
    }
}
