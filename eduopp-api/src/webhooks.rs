use axum::{
    extract::{Extension, Form},
    http::{header, StatusCode},
    response::Json,
};
use eduopp_channels::{twiml_empty, twiml_reply, ChannelRegistry, InboundEvent, InboundPayload};
use eduopp_core::types::ChannelKind;
use eduopp_core::AppContext;
use eduopp_inbound::commands;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing;

/// Telegram and Discord webhooks deliver a JSON event body and are
/// acknowledged immediately; the reply (if any) goes back asynchronously
/// through the channel's own send.
async fn json_webhook(
    ctx: AppContext,
    channels: Arc<ChannelRegistry>,
    kind: ChannelKind,
    payload: Value,
) -> Result<Json<Value>, StatusCode> {
    let Some(channel) = channels.get(kind) else {
        return Err(StatusCode::NOT_FOUND);
    };
    let event = channel
        .receive(InboundPayload::Json(payload))
        .map_err(|e| {
            tracing::warn!(channel = %kind, error = %e, "Malformed webhook payload");
            StatusCode::BAD_REQUEST
        })?;

    if let InboundEvent::Message(message) = event {
        // Reply outside the webhook response.
        tokio::spawn(async move {
            let reply = match commands::respond(&ctx, &message).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(
                        channel = %message.channel,
                        sender = %message.sender,
                        error = %e,
                        "Failed to process webhook message"
                    );
                    commands::ERROR_REPLY.to_string()
                }
            };
            if !channels.send(message.channel, &message.sender, &reply).await {
                tracing::warn!(channel = %message.channel, sender = %message.sender, "Failed to deliver reply");
            }
        });
    }

    Ok(Json(json!({"status": "ok"})))
}

pub async fn telegram(
    Extension(ctx): Extension<AppContext>,
    Extension(channels): Extension<Arc<ChannelRegistry>>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    json_webhook(ctx, channels, ChannelKind::Telegram, payload).await
}

pub async fn discord(
    Extension(ctx): Extension<AppContext>,
    Extension(channels): Extension<Arc<ChannelRegistry>>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    json_webhook(ctx, channels, ChannelKind::Discord, payload).await
}

/// The WhatsApp webhook is the odd one out: Twilio posts form fields and
/// expects the reply synchronously, as TwiML in the response body.
pub async fn whatsapp(
    Extension(ctx): Extension<AppContext>,
    Extension(channels): Extension<Arc<ChannelRegistry>>,
    Form(fields): Form<HashMap<String, String>>,
) -> ([(header::HeaderName, &'static str); 1], String) {
    let content_type = [(header::CONTENT_TYPE, "text/xml")];

    let Some(channel) = channels.get(ChannelKind::Whatsapp) else {
        return (content_type, twiml_reply(commands::ERROR_REPLY));
    };

    let body = match channel.receive(InboundPayload::Form(fields)) {
        Ok(InboundEvent::Message(message)) => match commands::respond(&ctx, &message).await {
            Ok(reply) => twiml_reply(&reply),
            Err(e) => {
                tracing::error!(sender = %message.sender, error = %e, "Failed to process WhatsApp message");
                twiml_reply(commands::ERROR_REPLY)
            }
        },
        Ok(InboundEvent::Ignored) => twiml_empty(),
        Err(e) => {
            tracing::warn!(error = %e, "Malformed WhatsApp webhook payload");
            twiml_reply(commands::ERROR_REPLY)
        }
    };

    (content_type, body)
}
