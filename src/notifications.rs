use std::collections::HashMap;

use uuid::Uuid;

use crate::error::ApiResult;
use crate::telemetry::NOTIFICATION_FAILURES_TOTAL;
use crate::models::{NewNotification, NotificationItem, NotificationKind};
use crate::repo::Repo;

pub const LIST_LIMIT: i64 = 100;
pub const PREVIEW_CHARS: usize = 50;

/// First `PREVIEW_CHARS` characters of a message, cut on a char boundary.
pub fn preview(content: &str) -> String {
    content.chars().take(PREVIEW_CHARS).collect()
}

/// Writes a notification. A failure is logged and counted but never propagated:
/// the like, message or follow that triggered it has already happened.
pub async fn notify(repo: &dyn Repo, new: NewNotification) {
    let (recipient, kind) = (new.recipient_id, new.kind);
    if let Err(e) = repo.insert_notification(new).await {
        metrics::increment_counter!(NOTIFICATION_FAILURES_TOTAL, "kind" => kind.as_str());
        tracing::warn!(%recipient, %kind, "failed to record notification: {e}");
    }
}

/// The recipient's notifications, newest first, with actor summaries and design titles.
pub async fn list(repo: &dyn Repo, recipient: Uuid) -> ApiResult<Vec<NotificationItem>> {
    let rows = repo.list_notifications(recipient, LIST_LIMIT).await?;

    let mut actor_ids: Vec<Uuid> = rows.iter().map(|n| n.actor_id).collect();
    actor_ids.sort_unstable();
    actor_ids.dedup();
    let mut design_ids: Vec<Uuid> = rows.iter().filter_map(|n| n.design_id).collect();
    design_ids.sort_unstable();
    design_ids.dedup();

    let actors: HashMap<Uuid, _> = repo
        .get_profiles(&actor_ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p.summary()))
        .collect();
    let titles: HashMap<Uuid, String> = repo
        .get_designs(&design_ids)
        .await?
        .into_iter()
        .map(|d| (d.id, d.title))
        .collect();

    Ok(rows
        .into_iter()
        .map(|n| NotificationItem {
            actor: actors.get(&n.actor_id).cloned(),
            design_title: n.design_id.and_then(|d| titles.get(&d).cloned()),
            notification: n,
        })
        .collect())
}

pub async fn unread_count(repo: &dyn Repo, recipient: Uuid) -> ApiResult<i64> {
    Ok(repo.count_unread_notifications(recipient).await?)
}

pub async fn mark_read(
    repo: &dyn Repo,
    recipient: Uuid,
    actor: Option<Uuid>,
    kind: Option<NotificationKind>,
) -> ApiResult<u64> {
    let changed = repo.mark_notifications_read(recipient, actor, kind).await?;
    tracing::debug!(%recipient, changed, "notifications marked read");
    Ok(changed)
}
