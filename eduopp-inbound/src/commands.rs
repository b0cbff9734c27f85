use eduopp_catalog::CatalogService;
use eduopp_channels::InboundMessage;
use eduopp_core::types::{Cadence, PreferencesUpdate, User};
use eduopp_core::{AppContext, Result};
use eduopp_match::MatchEngine;
use eduopp_users::UserService;

pub const ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again later.";

const RECOMMENDATION_COUNT: usize = 5;

const START_TEXT: &str = "\
🎓 *Welcome to EduOpp!*\n\n\
I help you discover educational opportunities:\n\
• 🎓 Scholarships\n\
• 📚 Learning resources\n\
• 🎪 Events and workshops\n\
• 👥 Mentorship programs\n\
• 💰 Funding opportunities\n\n\
Use /register to get started and /help to see all commands.";

const HELP_TEXT: &str = "\
🤖 *Available Commands:*\n\n\
/start - Welcome message\n\
/register - How to register\n\
/preferences - Set your preferences\n\
/opportunities - Your recommendations\n\
/subscribe <id> - Subscribe to an opportunity\n\
/unsubscribe <id> - Unsubscribe from an opportunity\n\
/help - Show this help message";

const REGISTER_TEXT: &str = "\
📝 *Registration*\n\n\
Ask your program coordinator to register you, or sign up on the web portal. \
Once your account is linked to this chat you can set preferences with \
/preferences and browse matches with /opportunities.";

const PREFERENCES_HELP: &str = "\
⚙️ *Preferences*\n\n\
Send your preferences as `key: value` lines, for example:\n\n\
interests: AI, Machine Learning\n\
field: Computer Science\n\
level: Undergraduate\n\
location: Boston\n\
frequency: daily";

const NOT_REGISTERED: &str =
    "You're not registered yet. Use /register to learn how to link your account.";

const FALLBACK_TEXT: &str =
    "I'm here to help you find educational opportunities! Use /help to see available commands.";

/// Produce the reply for one inbound message. Pure request/response: the
/// caller decides whether the reply goes back synchronously (WhatsApp
/// webhook) or via the channel's own send.
pub async fn respond(ctx: &AppContext, msg: &InboundMessage) -> Result<String> {
    let text = msg.text.trim();
    let mut parts = text.splitn(2, char::is_whitespace);
    let command = parts
        .next()
        .unwrap_or("")
        .trim_start_matches('/')
        .to_lowercase();
    let args = parts.next().unwrap_or("").trim();

    let users = UserService::new(ctx.clone());
    let bound = users.find_by_binding(msg.channel, &msg.sender).await?;

    let reply = match command.as_str() {
        "start" | "hi" | "hello" => START_TEXT.to_string(),
        "help" => HELP_TEXT.to_string(),
        "register" => match &bound {
            Some(user) => format!(
                "You're already registered as {}. Use /preferences to tune your matches.",
                user.first_name
            ),
            None => REGISTER_TEXT.to_string(),
        },
        "preferences" => match &bound {
            Some(user) => handle_preferences(ctx, user, args).await?,
            None => NOT_REGISTERED.to_string(),
        },
        "opportunities" => match &bound {
            Some(user) => handle_opportunities(ctx, user).await?,
            None => NOT_REGISTERED.to_string(),
        },
        "subscribe" => match &bound {
            Some(user) => handle_subscribe(ctx, user, args).await?,
            None => NOT_REGISTERED.to_string(),
        },
        "unsubscribe" => match &bound {
            Some(user) => handle_unsubscribe(ctx, user, args).await?,
            None => NOT_REGISTERED.to_string(),
        },
        _ => FALLBACK_TEXT.to_string(),
    };
    Ok(reply)
}

async fn handle_preferences(ctx: &AppContext, user: &User, args: &str) -> Result<String> {
    let Some(update) = parse_preferences(args) else {
        return Ok(PREFERENCES_HELP.to_string());
    };
    let users = UserService::new(ctx.clone());
    let prefs = users.set_preferences(user.id, update).await?;
    Ok(format!(
        "✅ Preferences saved.\nInterests: {}\nField: {}\nLocation: {}\nFrequency: {}",
        if prefs.interests.is_empty() {
            "-".to_string()
        } else {
            prefs.interests.join(", ")
        },
        prefs.field_of_study.as_deref().unwrap_or("-"),
        prefs.location.as_deref().unwrap_or("-"),
        prefs.cadence.as_str(),
    ))
}

/// Parse `key: value` lines. Returns `None` when nothing recognizable was
/// sent, which gets the format help back instead.
fn parse_preferences(args: &str) -> Option<PreferencesUpdate> {
    let mut update = PreferencesUpdate::default();
    let mut recognized = false;

    for line in args.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim().to_lowercase().as_str() {
            "interests" => {
                update.interests = Some(
                    value
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect(),
                );
                recognized = true;
            }
            "field" | "field_of_study" => {
                update.field_of_study = Some(value.to_string());
                recognized = true;
            }
            "level" | "education_level" => {
                update.education_level = Some(value.to_string());
                recognized = true;
            }
            "location" => {
                update.location = Some(value.to_string());
                recognized = true;
            }
            "frequency" | "cadence" => {
                if let Ok(cadence) = value.to_lowercase().parse::<Cadence>() {
                    update.cadence = Some(cadence);
                    recognized = true;
                }
            }
            _ => {}
        }
    }

    recognized.then_some(update)
}

async fn handle_opportunities(ctx: &AppContext, user: &User) -> Result<String> {
    let engine = MatchEngine::new(ctx.clone());
    let recs = engine.recommend(user.id, RECOMMENDATION_COUNT).await?;
    if recs.is_empty() {
        return Ok("No matching opportunities right now. Check back soon!".to_string());
    }

    let mut reply = String::from("🔍 *Opportunities for you:*\n\n");
    for (i, opp) in recs.iter().enumerate() {
        reply.push_str(&format!(
            "{}. *{}* — {} (id {})\n",
            i + 1,
            opp.title,
            opp.organization,
            opp.id
        ));
    }
    reply.push_str("\nReply /subscribe <id> to get alerts for one.");
    Ok(reply)
}

async fn handle_subscribe(ctx: &AppContext, user: &User, args: &str) -> Result<String> {
    let Some(opportunity_id) = parse_id(args) else {
        return Ok("Please provide an opportunity id. Example: /subscribe 1".to_string());
    };
    let catalog = CatalogService::new(ctx.clone());
    match catalog.subscribe(opportunity_id, user.id).await {
        Ok(Some(_)) => Ok(format!("✅ Subscribed to opportunity {}", opportunity_id)),
        Ok(None) => Ok(format!(
            "You're already subscribed to opportunity {}",
            opportunity_id
        )),
        Err(eduopp_core::Error::NotFound(_)) => {
            Ok(format!("Opportunity {} doesn't exist", opportunity_id))
        }
        Err(e) => Err(e),
    }
}

async fn handle_unsubscribe(ctx: &AppContext, user: &User, args: &str) -> Result<String> {
    let Some(opportunity_id) = parse_id(args) else {
        return Ok("Please provide an opportunity id. Example: /unsubscribe 1".to_string());
    };
    let catalog = CatalogService::new(ctx.clone());
    if catalog.unsubscribe(opportunity_id, user.id).await? {
        Ok(format!("❌ Unsubscribed from opportunity {}", opportunity_id))
    } else {
        Ok(format!(
            "You weren't subscribed to opportunity {}",
            opportunity_id
        ))
    }
}

fn parse_id(args: &str) -> Option<i64> {
    args.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eduopp_core::types::{ChannelKind, NewBinding, NewOpportunity, NewUser, OpportunityKind, UserType};
    use eduopp_core::Config;

    fn message(text: &str) -> InboundMessage {
        InboundMessage {
            channel: ChannelKind::Telegram,
            sender: "12345".to_string(),
            text: text.to_string(),
        }
    }

    async fn registered_ctx() -> (AppContext, i64) {
        let ctx = AppContext::in_memory(Config::default());
        let user = ctx
            .store
            .insert_user(NewUser {
                email: None,
                phone: None,
                first_name: "Ana".to_string(),
                last_name: None,
                user_type: UserType::Student,
                language: "en".to_string(),
            })
            .await
            .unwrap();
        ctx.store
            .insert_binding(NewBinding {
                user_id: user.id,
                channel: ChannelKind::Telegram,
                address: "12345".to_string(),
                username: None,
            })
            .await
            .unwrap();
        (ctx, user.id)
    }

    async fn seed_opportunity(ctx: &AppContext, title: &str) -> i64 {
        ctx.store
            .insert_opportunity(NewOpportunity {
                title: title.to_string(),
                description: "details".to_string(),
                kind: OpportunityKind::Scholarship,
                organization: "Org".to_string(),
                url: None,
                deadline: None,
                location: None,
                language: "en".to_string(),
                tags: vec![],
                requirements: vec![],
                benefits: vec![],
                created_by: 1,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn unknown_text_gets_the_fallback() {
        let (ctx, _) = registered_ctx().await;
        let reply = respond(&ctx, &message("what can you do?")).await.unwrap();
        assert_eq!(reply, FALLBACK_TEXT);
    }

    #[tokio::test]
    async fn unregistered_sender_is_pointed_at_register() {
        let ctx = AppContext::in_memory(Config::default());
        let reply = respond(&ctx, &message("/subscribe 1")).await.unwrap();
        assert_eq!(reply, NOT_REGISTERED);
    }

    #[tokio::test]
    async fn subscribe_command_creates_the_subscription() {
        let (ctx, user_id) = registered_ctx().await;
        let opp_id = seed_opportunity(&ctx, "AI Scholarship").await;

        let reply = respond(&ctx, &message(&format!("/subscribe {}", opp_id)))
            .await
            .unwrap();
        assert!(reply.contains("Subscribed"));
        assert!(ctx
            .store
            .subscription(user_id, opp_id)
            .await
            .unwrap()
            .is_some());

        let again = respond(&ctx, &message(&format!("/subscribe {}", opp_id)))
            .await
            .unwrap();
        assert!(again.contains("already subscribed"));
    }

    #[tokio::test]
    async fn preferences_lines_are_parsed_and_saved() {
        let (ctx, user_id) = registered_ctx().await;
        let reply = respond(
            &ctx,
            &message("/preferences interests: AI, Math\nlocation: Boston\nfrequency: weekly"),
        )
        .await
        .unwrap();
        assert!(reply.contains("Preferences saved"));

        let prefs = ctx.store.preferences(user_id).await.unwrap().unwrap();
        assert_eq!(prefs.interests, vec!["AI".to_string(), "Math".to_string()]);
        assert_eq!(prefs.location.as_deref(), Some("Boston"));
        assert_eq!(prefs.cadence, Cadence::Weekly);
    }

    #[tokio::test]
    async fn bare_preferences_command_returns_format_help() {
        let (ctx, _) = registered_ctx().await;
        let reply = respond(&ctx, &message("/preferences")).await.unwrap();
        assert_eq!(reply, PREFERENCES_HELP);
    }

    #[tokio::test]
    async fn opportunities_lists_recommendations_with_ids() {
        let (ctx, _) = registered_ctx().await;
        let opp_id = seed_opportunity(&ctx, "Robotics Camp").await;

        let reply = respond(&ctx, &message("/opportunities")).await.unwrap();
        assert!(reply.contains("Robotics Camp"));
        assert!(reply.contains(&format!("id {}", opp_id)));
    }

    #[tokio::test]
    async fn subscribe_to_unknown_id_is_a_friendly_reply() {
        let (ctx, _) = registered_ctx().await;
        let reply = respond(&ctx, &message("/subscribe 404")).await.unwrap();
        assert!(reply.contains("doesn't exist"));
    }
}
