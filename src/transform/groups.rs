//! Student-group precedence table over the free-text tag field.

use crate::config::GroupRule;

/// Ordered rule table; the first rule whose patterns all occur in the
/// tag text decides the category.
#[derive(Debug, Clone)]
pub struct StudentGroupRules {
    rules: Vec<GroupRule>,
    fallback: i32,
}

impl StudentGroupRules {
    pub fn new(rules: Vec<GroupRule>, fallback: i32) -> Self {
        Self { rules, fallback }
    }

    pub fn matching_rule(&self, tags: &str) -> Option<&GroupRule> {
        self.rules
            .iter()
            .find(|rule| rule.all_of.iter().all(|pattern| tags.contains(pattern.as_str())))
    }

    /// Missing tags match no rule.
    pub fn classify(&self, tags: Option<&str>) -> i32 {
        tags.and_then(|text| self.matching_rule(text))
            .map(|rule| rule.code)
            .unwrap_or(self.fallback)
    }
}
