pub mod channel;
pub mod discord;
pub mod telegram;
pub mod whatsapp;

pub use channel::{Channel, ChannelRegistry, InboundEvent, InboundMessage, InboundPayload};
pub use discord::DiscordChannel;
pub use telegram::TelegramChannel;
pub use whatsapp::{twiml_empty, twiml_reply, WhatsappChannel};
