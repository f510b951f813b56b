//! Like, view and follow ledgers. Counts are always aggregated from the rows;
//! nothing here maintains a stored counter.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{ApiError, ApiResult};
use crate::models::{NewNotification, NotificationKind};
use crate::notifications;
use crate::repo::{Repo, RepoError};
use crate::telemetry::{LIKES_TOTAL, VIEWS_TOTAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct LikeToggle {
    pub liked: bool,
    pub likes_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct FollowToggle {
    pub following: bool,
    pub followers_count: i64,
}

/// Flips the actor's like on a design. A fresh like notifies the owner unless
/// the owner is the actor.
pub async fn toggle_like(repo: &dyn Repo, actor: &Actor, design_id: Uuid) -> ApiResult<LikeToggle> {
    let design = repo.get_design(design_id).await.map_err(ApiError::missing("Design not found"))?;

    let liked = if repo.find_like(actor.id, design_id).await?.is_some() {
        repo.delete_like(actor.id, design_id).await?;
        false
    } else {
        match repo.insert_like(actor.id, design_id).await {
            Ok(_) => {
                metrics::increment_counter!(LIKES_TOTAL);
                if design.owner_id != actor.id {
                    notifications::notify(
                        repo,
                        NewNotification {
                            recipient_id: design.owner_id,
                            actor_id: actor.id,
                            kind: NotificationKind::Like,
                            design_id: Some(design_id),
                            content: None,
                        },
                    )
                    .await;
                }
                true
            }
            // A concurrent toggle already inserted the row; it also sent the notification.
            Err(RepoError::Conflict) => true,
            Err(e) => return Err(ApiError::missing("Design not found")(e)),
        }
    };

    let likes_count = repo.count_likes(design_id).await?;
    tracing::debug!(user = %actor.id, design = %design_id, liked, likes_count, "like toggled");
    Ok(LikeToggle { liked, likes_count })
}

/// Appends a view row. Guests are recorded with no user id.
pub async fn record_view(repo: &dyn Repo, design_id: Uuid, viewer: Option<Uuid>) -> ApiResult<()> {
    repo.insert_view(design_id, viewer).await.map_err(ApiError::missing("Design not found"))?;
    metrics::increment_counter!(VIEWS_TOTAL);
    Ok(())
}

pub async fn like_count(repo: &dyn Repo, design_id: Uuid) -> ApiResult<i64> {
    Ok(repo.count_likes(design_id).await?)
}

pub async fn view_count(repo: &dyn Repo, design_id: Uuid) -> ApiResult<i64> {
    Ok(repo.count_views(design_id).await?)
}

pub async fn is_liked_by(repo: &dyn Repo, user_id: Uuid, design_id: Uuid) -> ApiResult<bool> {
    Ok(repo.find_like(user_id, design_id).await?.is_some())
}

/// Flips the actor's follow of `target`. A new follow notifies the target.
pub async fn toggle_follow(repo: &dyn Repo, actor: &Actor, target: Uuid) -> ApiResult<FollowToggle> {
    if target == actor.id {
        return Err(ApiError::bad_request("You cannot follow yourself"));
    }
    repo.get_profile(target).await.map_err(ApiError::missing("Profile not found"))?;

    let following = if repo.find_follow(actor.id, target).await?.is_some() {
        repo.delete_follow(actor.id, target).await?;
        false
    } else {
        match repo.insert_follow(actor.id, target).await {
            Ok(_) => {
                notifications::notify(
                    repo,
                    NewNotification {
                        recipient_id: target,
                        actor_id: actor.id,
                        kind: NotificationKind::Follow,
                        design_id: None,
                        content: None,
                    },
                )
                .await;
                true
            }
            Err(RepoError::Conflict) => true,
            Err(e) => return Err(ApiError::missing("Profile not found")(e)),
        }
    };

    let followers_count = repo.count_followers(target).await?;
    Ok(FollowToggle { following, followers_count })
}
