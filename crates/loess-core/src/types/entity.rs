//! Typed entity pack extracted from one question

use serde::{Deserialize, Serialize};

/// Entities and keywords pulled out of a free-text question.
///
/// Every container is an order-preserving list of strings; all five may be
/// empty, which degrades retrieval to an empty search. The pack is embedded
/// in message metadata for auditability and never persisted on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPack {
    #[serde(default)]
    pub persons: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub orgs: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl EntityPack {
    /// Fallback pack used when structured extraction fails: everything empty
    /// except `keywords`, which carries the raw question so retrieval always
    /// has at least one search term.
    pub fn from_raw_question(question: &str) -> Self {
        Self {
            keywords: vec![question.to_string()],
            ..Self::default()
        }
    }

    /// True when all five containers are empty.
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
            && self.locations.is_empty()
            && self.orgs.is_empty()
            && self.events.is_empty()
            && self.keywords.is_empty()
    }
}
