use eduopp_core::text::contains_ignore_case;
use eduopp_core::types::{Opportunity, Preferences};
use eduopp_core::{AppContext, Result};
use tracing;

/// Scores and ranks catalog entries against a user's preference model.
///
/// The filter chain is deliberately boolean: interest tags and field of
/// study broaden the candidate set (an opportunity qualifies on either),
/// while a location preference narrows it, excluding opportunities that
/// carry no location at all. Ranking is recency only.
pub struct MatchEngine {
    ctx: AppContext,
}

impl MatchEngine {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Top `limit` recommendations, most recent first. Callers validate
    /// `limit >= 1`; the engine assumes it. Recomputed from current store
    /// state on every call.
    pub async fn recommend(&self, user_id: i64, limit: usize) -> Result<Vec<Opportunity>> {
        let prefs = self.ctx.store.preferences(user_id).await?;
        let mut candidates = self.ctx.store.active_opportunities().await?;

        if let Some(prefs) = prefs {
            candidates.retain(|opp| qualifies(&prefs, opp));
        } else {
            // Cold start: no preference model yet, recommend whatever is
            // newest without any partial scoring.
            tracing::debug!(user_id, "No preferences, falling back to recent opportunities");
        }

        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        candidates.truncate(limit);
        Ok(candidates)
    }
}

fn qualifies(prefs: &Preferences, opp: &Opportunity) -> bool {
    // Empty-string preferences behave as unset.
    let field_of_study = prefs.field_of_study.as_deref().filter(|s| !s.is_empty());
    let location = prefs.location.as_deref().filter(|s| !s.is_empty());

    // An empty interest set imposes no tag filter.
    let tag_hit =
        prefs.interests.is_empty() || opp.tags.iter().any(|tag| prefs.interests.contains(tag));

    // Field of study broadens: a title/description hit qualifies an
    // opportunity even when no tag overlaps.
    let field_hit = field_of_study.is_some_and(|field| {
        contains_ignore_case(&opp.title, field) || contains_ignore_case(&opp.description, field)
    });

    if !(tag_hit || field_hit) {
        return false;
    }

    // Location narrows: once the user declares one, opportunities without a
    // location value are excluded.
    match location {
        None => true,
        Some(wanted) => opp
            .location
            .as_deref()
            .is_some_and(|have| contains_ignore_case(have, wanted)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eduopp_core::types::{NewOpportunity, OpportunityKind, PreferencesUpdate};
    use eduopp_core::{AppContext, Config};

    fn ctx() -> AppContext {
        AppContext::in_memory(Config::default())
    }

    fn opportunity(title: &str, tags: &[&str], location: Option<&str>) -> NewOpportunity {
        NewOpportunity {
            title: title.to_string(),
            description: format!("Details about {}", title),
            kind: OpportunityKind::Scholarship,
            organization: "Org".to_string(),
            url: None,
            deadline: None,
            location: location.map(str::to_string),
            language: "en".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            requirements: vec![],
            benefits: vec![],
            created_by: 1,
        }
    }

    async fn set_prefs(ctx: &AppContext, user_id: i64, update: PreferencesUpdate) {
        ctx.store.upsert_preferences(user_id, update).await.unwrap();
    }

    #[tokio::test]
    async fn cold_start_returns_recent_actives_newest_first() {
        let ctx = ctx();
        let engine = MatchEngine::new(ctx.clone());
        let first = ctx
            .store
            .insert_opportunity(opportunity("Old", &["Robotics"], None))
            .await
            .unwrap();
        let second = ctx
            .store
            .insert_opportunity(opportunity("New", &["Poetry"], None))
            .await
            .unwrap();

        let recs = engine.recommend(42, 10).await.unwrap();
        assert_eq!(
            recs.iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );

        // Tag data is irrelevant without a preference model.
        let truncated = engine.recommend(42, 1).await.unwrap();
        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated[0].id, second.id);
    }

    #[tokio::test]
    async fn single_shared_tag_is_enough() {
        let ctx = ctx();
        let engine = MatchEngine::new(ctx.clone());
        ctx.store
            .insert_opportunity(opportunity("Math camp", &["AI", "Math"], None))
            .await
            .unwrap();
        ctx.store
            .insert_opportunity(opportunity("Art grant", &["Art"], None))
            .await
            .unwrap();
        set_prefs(
            &ctx,
            1,
            PreferencesUpdate {
                interests: Some(vec!["AI".to_string()]),
                ..Default::default()
            },
        )
        .await;

        let recs = engine.recommend(1, 10).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].title, "Math camp");
    }

    #[tokio::test]
    async fn field_of_study_broadens_past_tag_filter() {
        let ctx = ctx();
        let engine = MatchEngine::new(ctx.clone());
        ctx.store
            .insert_opportunity(opportunity("Chemistry fellowship", &["Lab"], None))
            .await
            .unwrap();
        set_prefs(
            &ctx,
            1,
            PreferencesUpdate {
                interests: Some(vec!["AI".to_string()]),
                field_of_study: Some("chemistry".to_string()),
                ..Default::default()
            },
        )
        .await;

        // No tag overlap, but the field of study appears in the title.
        let recs = engine.recommend(1, 10).await.unwrap();
        assert_eq!(recs.len(), 1);
    }

    #[tokio::test]
    async fn location_narrows_and_excludes_locationless() {
        let ctx = ctx();
        let engine = MatchEngine::new(ctx.clone());
        ctx.store
            .insert_opportunity(opportunity("Local event", &[], Some("Boston Area")))
            .await
            .unwrap();
        ctx.store
            .insert_opportunity(opportunity("Online course", &[], None))
            .await
            .unwrap();
        set_prefs(
            &ctx,
            1,
            PreferencesUpdate {
                location: Some("Boston".to_string()),
                ..Default::default()
            },
        )
        .await;

        let recs = engine.recommend(1, 10).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].title, "Local event");
    }

    #[tokio::test]
    async fn deleted_opportunity_drops_out_of_recommendations() {
        let ctx = ctx();
        let engine = MatchEngine::new(ctx.clone());
        let opp = ctx
            .store
            .insert_opportunity(opportunity("AI Scholarship", &["AI"], None))
            .await
            .unwrap();
        set_prefs(
            &ctx,
            1,
            PreferencesUpdate {
                interests: Some(vec!["AI".to_string()]),
                ..Default::default()
            },
        )
        .await;

        let recs = engine.recommend(1, 10).await.unwrap();
        assert!(recs.iter().any(|o| o.id == opp.id));

        ctx.store
            .set_opportunity_status(opp.id, eduopp_core::types::EntityStatus::Deleted)
            .await
            .unwrap();

        let recs = engine.recommend(1, 10).await.unwrap();
        assert!(recs.is_empty());
    }

    #[tokio::test]
    async fn empty_catalog_is_empty_result_not_error() {
        let engine = MatchEngine::new(ctx());
        assert!(engine.recommend(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_string_preferences_impose_no_filter() {
        let ctx = ctx();
        let engine = MatchEngine::new(ctx.clone());
        ctx.store
            .insert_opportunity(opportunity("Anywhere grant", &[], None))
            .await
            .unwrap();
        set_prefs(
            &ctx,
            1,
            PreferencesUpdate {
                location: Some(String::new()),
                field_of_study: Some(String::new()),
                ..Default::default()
            },
        )
        .await;

        let recs = engine.recommend(1, 10).await.unwrap();
        assert_eq!(recs.len(), 1);
    }
}
