use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar_url: Option<String>,
    pub skills: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Name shown in lists: full name, then "first last", then the username.
    pub fn display_name(&self) -> String {
        if let Some(full) = self.full_name.as_deref().filter(|s| !s.trim().is_empty()) {
            return full.to_string();
        }
        let joined = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        let joined = joined.trim();
        if joined.is_empty() { self.username.clone() } else { joined.to_string() }
    }

    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Compact author block embedded in cards, conversations and notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewProfile {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Full replacement of the editable profile fields (the edit form always posts all of them).
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProfileChanges {
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar_url: Option<String>,
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Design {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: String,
    pub image_urls: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewDesign {
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_urls: Vec<String>,
    pub tags: Vec<String>,
}

/// A design as the feed and detail pages see it: live ledger counts plus the
/// viewer's like state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct DesignCard {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: String,
    pub image_urls: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub owner_username: Option<String>,
    pub owner_full_name: Option<String>,
    pub owner_avatar_url: Option<String>,
    pub likes_count: i64,
    pub views_count: i64,
    pub is_liked: bool,
}

/// Feed filter. `category == "All"` behaves like no category.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DesignQuery {
    pub category: Option<String>,
    pub owner: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

impl DesignQuery {
    pub fn by_owner(owner: Uuid) -> Self {
        Self { owner: Some(owner), ..Self::default() }
    }

    pub fn category_filter(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"))
    }

    pub fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Like {
    pub user_id: Uuid,
    pub design_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct View {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub design_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Follow {
    pub follower_id: Uuid,
    pub followee_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Message,
    Follow,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Message => "message",
            NotificationKind::Follow => "follow",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown notification kind '{0}'")]
pub struct UnknownNotificationKind(pub String);

impl FromStr for NotificationKind {
    type Err = UnknownNotificationKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(NotificationKind::Like),
            "message" => Ok(NotificationKind::Message),
            "follow" => Ok(NotificationKind::Follow),
            other => Err(UnknownNotificationKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for NotificationKind {
    type Error = UnknownNotificationKind;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub actor_id: Uuid,
    #[cfg_attr(feature = "postgres-store", sqlx(try_from = "String"))]
    pub kind: NotificationKind,
    pub design_id: Option<Uuid>,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub actor_id: Uuid,
    pub kind: NotificationKind,
    pub design_id: Option<Uuid>,
    pub content: Option<String>,
}

/// Notification joined with the actor profile and the design title for the activity page.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationItem {
    #[serde(flatten)]
    pub notification: Notification,
    pub actor: Option<ProfileSummary>,
    pub design_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl Message {
    /// The other participant from `user`'s point of view.
    pub fn counterpart(&self, user: Uuid) -> Uuid {
        if self.sender_id == user { self.receiver_id } else { self.sender_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
}

/// Derived per-counterpart view of a user's inbox; never stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Conversation {
    pub counterpart_id: Uuid,
    pub counterpart: Option<ProfileSummary>,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub is_unread: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatorCard {
    pub profile: ProfileSummary,
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub design_count: i64,
    pub top_designs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfilePage {
    pub profile: Profile,
    pub design_count: i64,
    pub followers_count: i64,
    pub following_count: i64,
    pub is_following: bool,
    pub designs: Vec<DesignCard>,
}
