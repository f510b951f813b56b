use std::collections::{HashMap, HashSet};

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{ApiError, ApiResult};
use crate::models::{Conversation, Message, NewMessage, NewNotification, NotificationKind, ProfileSummary};
use crate::notifications;
use crate::repo::Repo;
use crate::telemetry::MESSAGES_TOTAL;

/// One conversation page: the counterpart and every message exchanged, oldest first.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConversationThread {
    pub counterpart_id: Uuid,
    pub counterpart: Option<ProfileSummary>,
    pub messages: Vec<Message>,
}

pub async fn send_message(repo: &dyn Repo, actor: &Actor, receiver: Uuid, content: &str) -> ApiResult<Message> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Message content is required"));
    }
    if receiver == actor.id {
        return Err(ApiError::bad_request("You cannot message yourself"));
    }
    repo.get_profile(receiver).await.map_err(ApiError::missing("Recipient not found"))?;

    let message = repo
        .insert_message(NewMessage { sender_id: actor.id, receiver_id: receiver, content: content.to_string() })
        .await?;
    metrics::increment_counter!(MESSAGES_TOTAL);

    notifications::notify(
        repo,
        NewNotification {
            recipient_id: receiver,
            actor_id: actor.id,
            kind: NotificationKind::Message,
            design_id: None,
            content: Some(notifications::preview(content)),
        },
    )
    .await;

    Ok(message)
}

/// Collapses the user's messages (newest first) into one entry per counterpart,
/// keeping the first, i.e. latest, message seen for each.
pub fn group_conversations(user: Uuid, newest_first: &[Message]) -> Vec<Conversation> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in newest_first {
        let counterpart = m.counterpart(user);
        if !seen.insert(counterpart) {
            continue;
        }
        out.push(Conversation {
            counterpart_id: counterpart,
            counterpart: None,
            last_message: m.content.clone(),
            last_message_at: m.created_at,
            is_unread: m.receiver_id == user && !m.is_read,
        });
    }
    out
}

pub async fn list_conversations(repo: &dyn Repo, user: Uuid) -> ApiResult<Vec<Conversation>> {
    let messages = repo.list_messages_for_user(user).await?;
    let mut conversations = group_conversations(user, &messages);

    let ids: Vec<Uuid> = conversations.iter().map(|c| c.counterpart_id).collect();
    let profiles: HashMap<Uuid, ProfileSummary> = repo
        .get_profiles(&ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p.summary()))
        .collect();
    for c in &mut conversations {
        c.counterpart = profiles.get(&c.counterpart_id).cloned();
    }
    Ok(conversations)
}

/// Opens the conversation with `counterpart`, marking what they sent (and the
/// matching message notifications) as read.
pub async fn list_messages(repo: &dyn Repo, user: Uuid, counterpart: Uuid) -> ApiResult<ConversationThread> {
    let messages = repo.list_messages_between(user, counterpart).await?;

    if messages.iter().any(|m| m.receiver_id == user && !m.is_read) {
        repo.mark_messages_read(user, counterpart).await?;
    }
    notifications::mark_read(repo, user, Some(counterpart), Some(NotificationKind::Message)).await?;

    let counterpart_profile = repo.get_profiles(&[counterpart]).await?.into_iter().next();
    Ok(ConversationThread {
        counterpart_id: counterpart,
        counterpart: counterpart_profile.map(|p| p.summary()),
        messages,
    })
}
