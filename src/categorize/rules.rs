use std::collections::BTreeSet;

use regex::Regex;
use thiserror::Error;

use crate::config::CategoryDefinition;
use crate::types::RepositoryRecord;

use super::builtin::builtin_keywords;

/// Longest text a rule will scan.
pub const MAX_MATCH_TEXT: usize = 64 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("cannot compile phrase {phrase:?} for category {category:?}: {message}")]
    Pattern {
        category: String,
        phrase: String,
        message: String,
    },
    #[error("text of {len} bytes exceeds the {max} byte matching limit")]
    TextTooLong { len: usize, max: usize },
}

/// Lowercase, `&` as ` and `, punctuation other than `-` dropped, whitespace
/// collapsed.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase().replace('&', " and ");
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized name, description and topics of one record.
#[derive(Debug, Clone)]
pub struct MatchText {
    text: String,
    topics: BTreeSet<String>,
}

impl MatchText {
    pub fn from_record(record: &RepositoryRecord) -> Result<Self, RuleError> {
        let len = record.description.len()
            + record.topics.iter().map(String::len).sum::<usize>()
            + record.id.key().len();
        if len > MAX_MATCH_TEXT {
            return Err(RuleError::TextTooLong {
                len,
                max: MAX_MATCH_TEXT,
            });
        }

        let topics: BTreeSet<String> = record.topics.iter().map(|t| t.trim().to_lowercase()).collect();
        let raw = format!(
            "{} {} {}",
            record.id,
            record.description,
            topics.iter().cloned().collect::<Vec<_>>().join(" ")
        );
        Ok(MatchText {
            text: normalize(&raw),
            topics,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Membership test for one category: its label or any keyword as a
/// word-bounded phrase, or any topic exactly.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    name: String,
    phrases: Vec<Regex>,
    topics: BTreeSet<String>,
}

impl CategoryRule {
    /// Compile a definition; with `builtin` the built-in synonyms for the
    /// category are matched before the configured keywords.
    pub fn compile(def: &CategoryDefinition, builtin: bool) -> Result<Self, RuleError> {
        let name = def.name.trim().to_string();

        let mut phrases: Vec<String> = vec![name.clone()];
        if builtin {
            phrases.extend(builtin_keywords(&name).iter().map(|k| k.to_string()));
        }
        phrases.extend(def.keywords.iter().map(|k| k.trim().to_string()));

        let mut seen = BTreeSet::new();
        let mut compiled = Vec::new();
        for phrase in phrases {
            let normalized = normalize(&phrase);
            if normalized.is_empty() || !seen.insert(normalized.clone()) {
                continue;
            }
            compiled.push(phrase_regex(&normalized).map_err(|e| RuleError::Pattern {
                category: name.clone(),
                phrase: phrase.clone(),
                message: e.to_string(),
            })?);
        }

        let topics = def
            .topics
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(CategoryRule {
            name,
            phrases: compiled,
            topics,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, text: &MatchText) -> bool {
        self.topics.iter().any(|t| text.topics.contains(t))
            || self.phrases.iter().any(|re| re.is_match(&text.text))
    }

    pub fn evaluate(&self, record: &RepositoryRecord) -> Result<bool, RuleError> {
        Ok(self.matches(&MatchText::from_record(record)?))
    }
}

fn phrase_regex(normalized: &str) -> Result<Regex, regex::Error> {
    let body = normalized
        .split(' ')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    Regex::new(&format!(r"(?:^|\b){body}(?:\b|$)"))
}
