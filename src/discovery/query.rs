use std::collections::HashSet;

use crate::config::SearchConfig;

/// Free-text query plus topic and language filters.
///
/// Each topic becomes its own variant (`<query> topic:<t>`), so the union of
/// variants matches "query AND any topic". Languages split every variant again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    pub query: String,
    pub topics: Vec<String>,
    pub languages: Vec<String>,
}

impl QuerySpec {
    pub fn new(query: impl Into<String>) -> Self {
        QuerySpec {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn from_search(search: &SearchConfig) -> Self {
        QuerySpec {
            query: search.query.clone(),
            topics: search.topics.clone(),
            languages: search.languages.clone(),
        }
    }

    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics.extend(topics.into_iter().map(Into::into));
        self
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages.extend(languages.into_iter().map(Into::into));
        self
    }

    /// Query strings in declaration order, deduplicated.
    pub fn variants(&self) -> Vec<String> {
        let query = self.query.trim();
        let topics: Vec<&str> = non_blank(&self.topics);
        let languages: Vec<&str> = non_blank(&self.languages);

        let base: Vec<String> = if topics.is_empty() {
            vec![query.to_string()]
        } else {
            topics
                .iter()
                .map(|t| format!("{query} topic:{t}").trim().to_string())
                .collect()
        };

        let expanded: Vec<String> = if languages.is_empty() {
            base
        } else {
            base.iter()
                .flat_map(|v| {
                    languages
                        .iter()
                        .map(move |l| format!("{v} language:{l}").trim().to_string())
                })
                .collect()
        };

        let mut seen = HashSet::new();
        expanded
            .into_iter()
            .filter(|v| !v.is_empty())
            .filter(|v| seen.insert(v.to_lowercase()))
            .collect()
    }
}

fn non_blank(items: &[String]) -> Vec<&str> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}
