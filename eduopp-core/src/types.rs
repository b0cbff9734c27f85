use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status shared by every soft-deletable entity. Rows are never
/// physically deleted; a `Deleted` row stays queryable for audit history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Active,
    Deleted,
}

impl EntityStatus {
    pub fn is_active(self) -> bool {
        matches!(self, EntityStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityStatus::Active => "active",
            EntityStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for EntityStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EntityStatus::Active),
            "deleted" => Ok(EntityStatus::Deleted),
            other => Err(anyhow::anyhow!("unknown entity status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Telegram,
    Discord,
    Whatsapp,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [
        ChannelKind::Telegram,
        ChannelKind::Discord,
        ChannelKind::Whatsapp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Telegram => "telegram",
            ChannelKind::Discord => "discord",
            ChannelKind::Whatsapp => "whatsapp",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(ChannelKind::Telegram),
            "discord" => Ok(ChannelKind::Discord),
            "whatsapp" => Ok(ChannelKind::Whatsapp),
            other => Err(anyhow::anyhow!("unknown channel kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Student,
    Sponsor,
    Mentor,
    Admin,
}

impl UserType {
    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Student => "student",
            UserType::Sponsor => "sponsor",
            UserType::Mentor => "mentor",
            UserType::Admin => "admin",
        }
    }
}

impl FromStr for UserType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(UserType::Student),
            "sponsor" => Ok(UserType::Sponsor),
            "mentor" => Ok(UserType::Mentor),
            "admin" => Ok(UserType::Admin),
            other => Err(anyhow::anyhow!("unknown user type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    Scholarship,
    LearningResource,
    Event,
    Mentorship,
    Funding,
}

impl OpportunityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpportunityKind::Scholarship => "scholarship",
            OpportunityKind::LearningResource => "learning_resource",
            OpportunityKind::Event => "event",
            OpportunityKind::Mentorship => "mentorship",
            OpportunityKind::Funding => "funding",
        }
    }
}

impl FromStr for OpportunityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scholarship" => Ok(OpportunityKind::Scholarship),
            "learning_resource" => Ok(OpportunityKind::LearningResource),
            "event" => Ok(OpportunityKind::Event),
            "mentorship" => Ok(OpportunityKind::Mentorship),
            "funding" => Ok(OpportunityKind::Funding),
            other => Err(anyhow::anyhow!("unknown opportunity kind: {}", other)),
        }
    }
}

/// How often a user wants alerts. Stored on the preference model; the
/// dispatcher itself is cadence-agnostic and a digest scheduler would read
/// this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Immediate,
    Daily,
    Weekly,
}

impl Cadence {
    pub fn as_str(self) -> &'static str {
        match self {
            Cadence::Immediate => "immediate",
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
        }
    }
}

impl FromStr for Cadence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(Cadence::Immediate),
            "daily" => Ok(Cadence::Daily),
            "weekly" => Ok(Cadence::Weekly),
            other => Err(anyhow::anyhow!("unknown cadence: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(anyhow::anyhow!("unknown delivery status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub user_type: UserType,
    pub language: String,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub user_type: UserType,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.phone.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.language.is_none()
    }
}

/// A user's account on one chat platform. A (channel, address) pair maps to
/// at most one active binding across all users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformBinding {
    pub id: i64,
    pub user_id: i64,
    pub channel: ChannelKind,
    pub address: String,
    pub username: Option<String>,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBinding {
    pub user_id: i64,
    pub channel: ChannelKind,
    pub address: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    pub user_id: i64,
    pub interests: Vec<String>,
    pub education_level: Option<String>,
    pub field_of_study: Option<String>,
    pub location: Option<String>,
    pub cadence: Cadence,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Last-write-wins preference update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesUpdate {
    pub interests: Option<Vec<String>>,
    pub education_level: Option<String>,
    pub field_of_study: Option<String>,
    pub location: Option<String>,
    pub cadence: Option<Cadence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub kind: OpportunityKind,
    pub organization: String,
    pub url: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub language: String,
    pub tags: Vec<String>,
    pub requirements: Vec<String>,
    pub benefits: Vec<String>,
    pub status: EntityStatus,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOpportunity {
    pub title: String,
    pub description: String,
    pub kind: OpportunityKind,
    pub organization: String,
    pub url: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub location: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    pub created_by: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpportunityUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: Option<OpportunityKind>,
    pub organization: Option<String>,
    pub url: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub language: Option<String>,
    pub tags: Option<Vec<String>>,
    pub requirements: Option<Vec<String>>,
    pub benefits: Option<Vec<String>>,
}

impl OpportunityUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.kind.is_none()
            && self.organization.is_none()
            && self.url.is_none()
            && self.deadline.is_none()
            && self.location.is_none()
            && self.language.is_none()
            && self.tags.is_none()
            && self.requirements.is_none()
            && self.benefits.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub opportunity_id: i64,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
}

/// One attempted send. Append-only: nothing is mutated after the append
/// except the `read` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: i64,
    pub user_id: i64,
    pub opportunity_id: Option<i64>,
    pub channel: ChannelKind,
    pub message: String,
    pub status: DeliveryStatus,
    pub read: bool,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub user_id: i64,
    pub opportunity_id: Option<i64>,
    pub channel: ChannelKind,
    pub message: String,
    pub status: DeliveryStatus,
}
