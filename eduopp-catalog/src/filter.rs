use eduopp_core::text::contains_ignore_case;
use eduopp_core::types::{Opportunity, OpportunityKind};
use serde::Deserialize;

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// Catalog search filter. All fields are optional and combined
/// conjunctively; the tag set itself is disjunctive (any listed tag
/// qualifies).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilter {
    /// Case-insensitive substring over title, description, or organization.
    pub query: Option<String>,
    pub kind: Option<OpportunityKind>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Case-insensitive substring over the opportunity location.
    pub location: Option<String>,
    /// Exact language match.
    pub language: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SearchFilter {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    pub fn matches(&self, opp: &Opportunity) -> bool {
        if let Some(query) = self.query.as_deref() {
            let hit = contains_ignore_case(&opp.title, query)
                || contains_ignore_case(&opp.description, query)
                || contains_ignore_case(&opp.organization, query);
            if !hit {
                return false;
            }
        }

        if let Some(kind) = self.kind {
            if opp.kind != kind {
                return false;
            }
        }

        if !self.tags.is_empty() && !opp.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }

        if let Some(location) = self.location.as_deref() {
            match opp.location.as_deref() {
                Some(opp_location) if contains_ignore_case(opp_location, location) => {}
                _ => return false,
            }
        }

        if let Some(language) = self.language.as_deref() {
            if opp.language != language {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use eduopp_core::types::EntityStatus;

    fn opportunity() -> Opportunity {
        let now = Utc::now();
        Opportunity {
            id: 1,
            title: "AI Research Scholarship".to_string(),
            description: "Funding for machine learning research".to_string(),
            kind: OpportunityKind::Scholarship,
            organization: "Tech Foundation".to_string(),
            url: None,
            deadline: None,
            location: Some("Boston Area".to_string()),
            language: "en".to_string(),
            tags: vec!["AI".to_string(), "Math".to_string()],
            requirements: vec![],
            benefits: vec![],
            status: EntityStatus::Active,
            created_by: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(SearchFilter::default().matches(&opportunity()));
    }

    #[test]
    fn query_is_case_insensitive_across_fields() {
        let filter = SearchFilter {
            query: Some("foundation".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&opportunity()));

        let filter = SearchFilter {
            query: Some("quantum".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&opportunity()));
    }

    #[test]
    fn tag_set_is_disjunctive() {
        let filter = SearchFilter {
            tags: vec!["Math".to_string(), "Physics".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&opportunity()));

        let filter = SearchFilter {
            tags: vec!["Physics".to_string()],
            ..Default::default()
        };
        assert!(!filter.matches(&opportunity()));
    }

    #[test]
    fn conditions_combine_conjunctively() {
        let filter = SearchFilter {
            query: Some("scholarship".to_string()),
            kind: Some(OpportunityKind::Event),
            ..Default::default()
        };
        assert!(!filter.matches(&opportunity()));
    }

    #[test]
    fn location_filter_excludes_missing_location() {
        let mut opp = opportunity();
        opp.location = None;
        let filter = SearchFilter {
            location: Some("boston".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&opp));
        assert!(filter.matches(&opportunity()));
    }

    #[test]
    fn limit_is_capped() {
        let filter = SearchFilter {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(filter.limit(), MAX_LIMIT);
    }
}
