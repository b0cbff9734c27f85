use async_trait::async_trait;
use eduopp_core::config::ChannelsConfig;
use eduopp_core::types::ChannelKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing;

use crate::channel::{Channel, InboundEvent, InboundMessage, InboundPayload};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// WhatsApp channel over the Twilio Messages API. Unusual among the
/// channels: its webhook delivers form-encoded fields and expects the reply
/// synchronously in the webhook response body as TwiML, rather than an
/// asynchronous send.
pub struct WhatsappChannel {
    client: Option<Arc<reqwest::Client>>,
    account_sid: Option<String>,
    auth_token: Option<String>,
    phone_number: Option<String>,
}

impl WhatsappChannel {
    pub fn new(config: &ChannelsConfig) -> Self {
        match (
            &config.whatsapp_account_sid,
            &config.whatsapp_auth_token,
            &config.whatsapp_phone_number,
        ) {
            (Some(sid), Some(token), Some(number)) => {
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(30))
                    .build()
                    .ok()
                    .map(Arc::new);
                Self {
                    client,
                    account_sid: Some(sid.clone()),
                    auth_token: Some(token.clone()),
                    phone_number: Some(number.clone()),
                }
            }
            _ => {
                tracing::warn!("WhatsApp channel disabled (missing Twilio credentials)");
                Self {
                    client: None,
                    account_sid: None,
                    auth_token: None,
                    phone_number: None,
                }
            }
        }
    }
}

#[async_trait]
impl Channel for WhatsappChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Whatsapp
    }

    fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    async fn start(&self, _inbound: mpsc::Sender<InboundMessage>) -> anyhow::Result<()> {
        if self.is_configured() {
            tracing::info!("WhatsApp channel started (webhook mode)");
        } else {
            tracing::warn!("WhatsApp channel not configured, skipping start");
        }
        Ok(())
    }

    async fn stop(&self) {
        tracing::info!("WhatsApp channel stopped");
    }

    async fn send(&self, recipient: &str, text: &str) -> bool {
        let (client, sid, token, from) = match (
            &self.client,
            &self.account_sid,
            &self.auth_token,
            &self.phone_number,
        ) {
            (Some(client), Some(sid), Some(token), Some(from)) => (client, sid, token, from),
            _ => {
                tracing::debug!("WhatsApp not configured, skipping send");
                return false;
            }
        };

        let url = format!("{}/Accounts/{}/Messages.json", TWILIO_API_BASE, sid);
        let params = [
            ("To", format!("whatsapp:{}", recipient)),
            ("From", format!("whatsapp:{}", from)),
            ("Body", text.to_string()),
        ];
        match client
            .post(&url)
            .basic_auth(sid, Some(token))
            .form(&params)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::error!(recipient, status = %resp.status(), "Twilio rejected message");
                false
            }
            Err(e) => {
                tracing::error!(recipient, error = %e, "Failed to send WhatsApp message");
                false
            }
        }
    }

    fn receive(&self, payload: InboundPayload) -> anyhow::Result<InboundEvent> {
        let InboundPayload::Form(fields) = payload else {
            anyhow::bail!("WhatsApp webhook expects form-encoded fields");
        };
        let sender = fields
            .get("From")
            .map(|from| from.trim_start_matches("whatsapp:").to_string());
        let body = fields.get("Body").cloned();
        match (sender, body) {
            (Some(sender), Some(text)) if !text.is_empty() => {
                Ok(InboundEvent::Message(InboundMessage {
                    channel: ChannelKind::Whatsapp,
                    sender,
                    text,
                }))
            }
            _ => Ok(InboundEvent::Ignored),
        }
    }
}

/// Wrap a reply in the TwiML body the Twilio webhook contract expects.
pub fn twiml_reply(text: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        xml_escape(text)
    )
}

/// Acknowledge without replying.
pub fn twiml_empty() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>".to_string()
}

fn xml_escape(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '&' => "&amp;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&apos;".to_string(),
            _ => c.to_string(),
        })
        .collect()
}
