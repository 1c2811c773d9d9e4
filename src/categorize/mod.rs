pub mod builtin;
pub mod rules;

use tracing::warn;

use crate::config::{CategoryDefinition, CuratorConfig};
use crate::types::{CategorizedRecord, RepositoryRecord, ScoredRecord};

pub use builtin::{builtin_categories, builtin_keywords};
pub use rules::{normalize, CategoryRule, MatchText, RuleError, MAX_MATCH_TEXT};

/// Ordered category rules. Output order is declaration order, never match
/// order.
#[derive(Debug, Clone, Default)]
pub struct Categorizer {
    rules: Vec<CategoryRule>,
}

impl Categorizer {
    pub fn new(definitions: &[CategoryDefinition], builtin: bool) -> Result<Self, RuleError> {
        let rules = definitions
            .iter()
            .map(|def| CategoryRule::compile(def, builtin))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Categorizer { rules })
    }

    pub fn from_config(config: &CuratorConfig) -> Result<Self, RuleError> {
        Self::new(&config.category_definitions(), config.output.builtin_keywords)
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn category_names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn try_categorize(&self, record: &RepositoryRecord) -> Result<Vec<String>, RuleError> {
        let text = MatchText::from_record(record)?;
        Ok(self
            .rules
            .iter()
            .filter(|rule| rule.matches(&text))
            .map(|rule| rule.name().to_string())
            .collect())
    }

    /// Categories for `record`; a failing evaluation yields no categories.
    pub fn categorize(&self, record: &RepositoryRecord) -> Vec<String> {
        match self.try_categorize(record) {
            Ok(categories) => categories,
            Err(e) => {
                warn!(repo = %record.id, error = %e, "category rules failed, leaving record uncategorized");
                Vec::new()
            }
        }
    }

    pub fn apply(&self, scored: ScoredRecord) -> CategorizedRecord {
        let categories = self.categorize(&scored.record);
        CategorizedRecord { scored, categories }
    }
}

/// Categories for `record` under `rules`, in rule order.
pub fn categorize(record: &RepositoryRecord, rules: &[CategoryRule]) -> Vec<String> {
    Categorizer {
        rules: rules.to_vec(),
    }
    .categorize(record)
}
