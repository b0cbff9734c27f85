use eduopp_core::types::{Opportunity, User};

/// Longest description excerpt carried in an alert.
pub const DESCRIPTION_LIMIT: usize = 200;
/// At most this many tags are listed.
pub const TAG_LIMIT: usize = 5;

/// Channel-agnostic alert text. Deterministic: the same opportunity always
/// formats to the same message, which is what gets persisted to the
/// delivery log.
pub fn format_opportunity_alert(opp: &Opportunity) -> String {
    let mut message = format!("🎓 *{}*\n\n", opp.title);

    let description: String = opp.description.chars().take(DESCRIPTION_LIMIT).collect();
    let truncated = opp.description.chars().count() > DESCRIPTION_LIMIT;
    message.push_str(&format!(
        "📝 {}{}\n\n",
        description,
        if truncated { "..." } else { "" }
    ));

    message.push_str(&format!("🏢 Organization: {}\n", opp.organization));

    if let Some(deadline) = opp.deadline {
        message.push_str(&format!("⏰ Deadline: {}\n", deadline.format("%Y-%m-%d")));
    }

    if let Some(location) = &opp.location {
        message.push_str(&format!("📍 Location: {}\n", location));
    }

    if let Some(url) = &opp.url {
        message.push_str(&format!("🔗 Learn more: {}\n", url));
    }

    if !opp.tags.is_empty() {
        let tags: Vec<&str> = opp.tags.iter().take(TAG_LIMIT).map(String::as_str).collect();
        message.push_str(&format!("🏷️ Tags: {}\n", tags.join(", ")));
    }

    message
}

/// Greeting for a freshly registered user. A system message: it is fanned
/// out like an alert but never persisted to the delivery log.
pub fn format_welcome(user: &User) -> String {
    format!(
        "🎓 *Welcome to EduOpp!*\n\n\
         Hello {}! I'm here to help you discover educational opportunities.\n\n\
         Use /help to see available commands and /preferences to set your \
         preferences for personalized recommendations.",
        user.first_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use eduopp_core::types::{EntityStatus, OpportunityKind};

    fn opportunity() -> Opportunity {
        let now = Utc::now();
        Opportunity {
            id: 1,
            title: "AI Scholarship".to_string(),
            description: "Short description".to_string(),
            kind: OpportunityKind::Scholarship,
            organization: "Tech Foundation".to_string(),
            url: None,
            deadline: None,
            location: None,
            language: "en".to_string(),
            tags: vec![],
            requirements: vec![],
            benefits: vec![],
            status: EntityStatus::Active,
            created_by: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn short_description_has_no_ellipsis() {
        let message = format_opportunity_alert(&opportunity());
        assert!(message.contains("📝 Short description\n"));
        assert!(!message.contains("..."));
    }

    #[test]
    fn long_description_is_truncated_with_ellipsis() {
        let mut opp = opportunity();
        opp.description = "x".repeat(450);
        let message = format_opportunity_alert(&opp);
        let line = message
            .lines()
            .find(|l| l.starts_with("📝"))
            .unwrap()
            .to_string();
        assert!(line.ends_with("..."));
        assert_eq!(line.matches('x').count(), DESCRIPTION_LIMIT);
    }

    #[test]
    fn optional_lines_appear_only_when_present() {
        let mut opp = opportunity();
        let bare = format_opportunity_alert(&opp);
        assert!(!bare.contains("Deadline"));
        assert!(!bare.contains("Location"));
        assert!(!bare.contains("Tags"));

        opp.deadline = Some(Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap());
        opp.location = Some("Boston".to_string());
        opp.url = Some("https://example.com".to_string());
        opp.tags = vec!["AI".to_string()];
        let full = format_opportunity_alert(&opp);
        assert!(full.contains("⏰ Deadline: 2026-09-01\n"));
        assert!(full.contains("📍 Location: Boston\n"));
        assert!(full.contains("🔗 Learn more: https://example.com\n"));
        assert!(full.contains("🏷️ Tags: AI\n"));
    }

    #[test]
    fn tags_are_capped_at_five() {
        let mut opp = opportunity();
        opp.tags = (1..=8).map(|i| format!("t{}", i)).collect();
        let message = format_opportunity_alert(&opp);
        assert!(message.contains("🏷️ Tags: t1, t2, t3, t4, t5\n"));
        assert!(!message.contains("t6"));
    }

    #[test]
    fn formatting_is_deterministic() {
        let opp = opportunity();
        assert_eq!(format_opportunity_alert(&opp), format_opportunity_alert(&opp));
    }
}
