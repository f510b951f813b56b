use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait ProfileRepo: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> RepoResult<Profile>;
    async fn get_profile_by_username(&self, username: &str) -> RepoResult<Profile>;
    async fn get_profiles(&self, ids: &[Uuid]) -> RepoResult<Vec<Profile>>;
    /// Conflict when the id or the username is already taken.
    async fn create_profile(&self, new: NewProfile) -> RepoResult<Profile>;
    /// Insert-or-update of the editable fields. Conflict when the username belongs to someone else.
    async fn upsert_profile(&self, id: Uuid, changes: ProfileChanges) -> RepoResult<Profile>;
    async fn list_profiles(&self, limit: i64) -> RepoResult<Vec<Profile>>;
}

#[async_trait]
pub trait DesignRepo: Send + Sync {
    /// NotFound when the owner has no profile row.
    async fn create_design(&self, new: NewDesign) -> RepoResult<Design>;
    async fn get_design(&self, id: Uuid) -> RepoResult<Design>;
    async fn get_designs(&self, ids: &[Uuid]) -> RepoResult<Vec<Design>>;
    async fn get_design_card(&self, id: Uuid, viewer: Option<Uuid>) -> RepoResult<DesignCard>;
    async fn list_design_cards(&self, query: &DesignQuery, viewer: Option<Uuid>) -> RepoResult<Vec<DesignCard>>;
    async fn count_designs(&self, owner: Uuid) -> RepoResult<i64>;
    /// Removes the design together with its likes, views and notifications.
    async fn delete_design(&self, id: Uuid) -> RepoResult<Design>;
}

#[async_trait]
pub trait LikeRepo: Send + Sync {
    async fn find_like(&self, user_id: Uuid, design_id: Uuid) -> RepoResult<Option<Like>>;
    /// Conflict when the pair already exists, NotFound when the design does not.
    async fn insert_like(&self, user_id: Uuid, design_id: Uuid) -> RepoResult<Like>;
    async fn delete_like(&self, user_id: Uuid, design_id: Uuid) -> RepoResult<bool>;
    async fn count_likes(&self, design_id: Uuid) -> RepoResult<i64>;
}

#[async_trait]
pub trait ViewRepo: Send + Sync {
    async fn insert_view(&self, design_id: Uuid, viewer: Option<Uuid>) -> RepoResult<View>;
    async fn count_views(&self, design_id: Uuid) -> RepoResult<i64>;
}

#[async_trait]
pub trait FollowRepo: Send + Sync {
    async fn find_follow(&self, follower: Uuid, followee: Uuid) -> RepoResult<Option<Follow>>;
    async fn insert_follow(&self, follower: Uuid, followee: Uuid) -> RepoResult<Follow>;
    async fn delete_follow(&self, follower: Uuid, followee: Uuid) -> RepoResult<bool>;
    async fn count_followers(&self, user: Uuid) -> RepoResult<i64>;
    async fn count_following(&self, user: Uuid) -> RepoResult<i64>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    async fn insert_notification(&self, new: NewNotification) -> RepoResult<Notification>;
    /// Newest first.
    async fn list_notifications(&self, recipient: Uuid, limit: i64) -> RepoResult<Vec<Notification>>;
    async fn mark_notifications_read(
        &self,
        recipient: Uuid,
        actor: Option<Uuid>,
        kind: Option<NotificationKind>,
    ) -> RepoResult<u64>;
    async fn count_unread_notifications(&self, recipient: Uuid) -> RepoResult<i64>;
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn insert_message(&self, new: NewMessage) -> RepoResult<Message>;
    /// Every message the user sent or received, newest first.
    async fn list_messages_for_user(&self, user: Uuid) -> RepoResult<Vec<Message>>;
    /// Messages exchanged between the pair, oldest first.
    async fn list_messages_between(&self, user: Uuid, counterpart: Uuid) -> RepoResult<Vec<Message>>;
    async fn mark_messages_read(&self, receiver: Uuid, sender: Uuid) -> RepoResult<u64>;
}

pub trait Repo:
    ProfileRepo + DesignRepo + LikeRepo + ViewRepo + FollowRepo + NotificationRepo + MessageRepo
{
}

impl<T> Repo for T where
    T: ProfileRepo + DesignRepo + LikeRepo + ViewRepo + FollowRepo + NotificationRepo + MessageRepo
{
}

// ---------------------------------------------------------------------------
// In-memory repository (local runs and tests), optionally snapshotted to JSON.
// ---------------------------------------------------------------------------
pub mod inmem {
    use super::*;

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        profiles: HashMap<Uuid, Profile>,
        designs: HashMap<Uuid, Design>,
        likes: Vec<Like>,
        views: Vec<View>,
        follows: Vec<Follow>,
        notifications: Vec<Notification>,
        messages: Vec<Message>,
    }

    impl State {
        fn card(&self, d: &Design, viewer: Option<Uuid>) -> DesignCard {
            let owner = self.profiles.get(&d.owner_id);
            let likes = self.likes.iter().filter(|l| l.design_id == d.id);
            DesignCard {
                id: d.id,
                owner_id: d.owner_id,
                title: d.title.clone(),
                description: d.description.clone(),
                category: d.category.clone(),
                image_url: d.image_url.clone(),
                image_urls: d.image_urls.clone(),
                tags: d.tags.clone(),
                created_at: d.created_at,
                owner_username: owner.map(|p| p.username.clone()),
                owner_full_name: owner.and_then(|p| p.full_name.clone()),
                owner_avatar_url: owner.and_then(|p| p.avatar_url.clone()),
                likes_count: likes.clone().count() as i64,
                views_count: self.views.iter().filter(|v| v.design_id == d.id).count() as i64,
                is_liked: viewer.is_some_and(|u| likes.clone().any(|l| l.user_id == u)),
            }
        }

        fn username_taken(&self, username: &str, except: Uuid) -> bool {
            self.profiles.values().any(|p| p.id != except && p.username == username)
        }
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        /// Ephemeral store; nothing touches the disk.
        pub fn new() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
        }

        /// Store backed by a JSON snapshot at `path`, loaded now and rewritten after each mutation.
        pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
            let path = path.into();
            let state = Self::load_state_from(&path);
            Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        tracing::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        tracing::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    tracing::info!("no snapshot at '{}' ({e}); starting empty", path.display());
                    State::default()
                }
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        // Snapshot failures are logged; the in-memory state stays authoritative.
        fn persist(&self) {
            let Some(path) = self.snapshot_path.as_deref() else { return };
            let bytes = match self.read().map(|s| serde_json::to_vec_pretty(&*s)) {
                Ok(Ok(b)) => b,
                Ok(Err(e)) => {
                    tracing::error!("failed to serialize snapshot: {e}");
                    return;
                }
                Err(e) => {
                    tracing::error!("failed to read state for snapshot: {e}");
                    return;
                }
            };
            if let Some(dir) = path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            if let Err(e) = std::fs::write(path, bytes) {
                tracing::error!("failed to write snapshot '{}': {e}", path.display());
            }
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl ProfileRepo for InMemRepo {
        async fn get_profile(&self, id: Uuid) -> RepoResult<Profile> {
            self.read()?.profiles.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn get_profile_by_username(&self, username: &str) -> RepoResult<Profile> {
            let s = self.read()?;
            s.profiles.values().find(|p| p.username == username).cloned().ok_or(RepoError::NotFound)
        }
        async fn get_profiles(&self, ids: &[Uuid]) -> RepoResult<Vec<Profile>> {
            let s = self.read()?;
            Ok(ids.iter().filter_map(|id| s.profiles.get(id).cloned()).collect())
        }
        async fn create_profile(&self, new: NewProfile) -> RepoResult<Profile> {
            let mut s = self.write()?;
            if s.profiles.contains_key(&new.id) || s.username_taken(&new.username, new.id) {
                return Err(RepoError::Conflict);
            }
            let profile = Profile {
                id: new.id,
                username: new.username,
                full_name: new.full_name,
                first_name: None,
                last_name: None,
                bio: None,
                website: None,
                avatar_url: new.avatar_url,
                skills: Vec::new(),
                created_at: Utc::now(),
                updated_at: None,
            };
            s.profiles.insert(profile.id, profile.clone());
            drop(s);
            self.persist();
            Ok(profile)
        }
        async fn upsert_profile(&self, id: Uuid, changes: ProfileChanges) -> RepoResult<Profile> {
            let mut s = self.write()?;
            if s.username_taken(&changes.username, id) {
                return Err(RepoError::Conflict);
            }
            let now = Utc::now();
            let profile = s.profiles.entry(id).or_insert_with(|| Profile {
                id,
                username: changes.username.clone(),
                full_name: None,
                first_name: None,
                last_name: None,
                bio: None,
                website: None,
                avatar_url: None,
                skills: Vec::new(),
                created_at: now,
                updated_at: None,
            });
            profile.username = changes.username;
            profile.first_name = changes.first_name;
            profile.last_name = changes.last_name;
            profile.bio = changes.bio;
            profile.website = changes.website;
            profile.avatar_url = changes.avatar_url;
            profile.skills = changes.skills;
            profile.updated_at = Some(now);
            let updated = profile.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
        async fn list_profiles(&self, limit: i64) -> RepoResult<Vec<Profile>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.profiles.values().cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            v.truncate(limit.max(0) as usize);
            Ok(v)
        }
    }

    #[async_trait]
    impl DesignRepo for InMemRepo {
        async fn create_design(&self, new: NewDesign) -> RepoResult<Design> {
            let mut s = self.write()?;
            if !s.profiles.contains_key(&new.owner_id) {
                return Err(RepoError::NotFound);
            }
            let image_url = new.image_urls.first().cloned().unwrap_or_default();
            let design = Design {
                id: Uuid::new_v4(),
                owner_id: new.owner_id,
                title: new.title,
                description: new.description,
                category: new.category,
                image_url,
                image_urls: new.image_urls,
                tags: new.tags,
                created_at: Utc::now(),
            };
            s.designs.insert(design.id, design.clone());
            drop(s);
            self.persist();
            Ok(design)
        }
        async fn get_design(&self, id: Uuid) -> RepoResult<Design> {
            self.read()?.designs.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn get_designs(&self, ids: &[Uuid]) -> RepoResult<Vec<Design>> {
            let s = self.read()?;
            Ok(ids.iter().filter_map(|id| s.designs.get(id).cloned()).collect())
        }
        async fn get_design_card(&self, id: Uuid, viewer: Option<Uuid>) -> RepoResult<DesignCard> {
            let s = self.read()?;
            let design = s.designs.get(&id).ok_or(RepoError::NotFound)?;
            Ok(s.card(design, viewer))
        }
        async fn list_design_cards(&self, query: &DesignQuery, viewer: Option<Uuid>) -> RepoResult<Vec<DesignCard>> {
            let s = self.read()?;
            let category = query.category_filter();
            let (limit, offset) = query.page();
            let mut v: Vec<&Design> = s
                .designs
                .values()
                .filter(|d| category.map_or(true, |c| d.category.as_deref() == Some(c)))
                .filter(|d| query.owner.map_or(true, |o| d.owner_id == o))
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at)); // newest first
            Ok(v.into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .map(|d| s.card(d, viewer))
                .collect())
        }
        async fn count_designs(&self, owner: Uuid) -> RepoResult<i64> {
            Ok(self.read()?.designs.values().filter(|d| d.owner_id == owner).count() as i64)
        }
        async fn delete_design(&self, id: Uuid) -> RepoResult<Design> {
            let mut s = self.write()?;
            let design = s.designs.remove(&id).ok_or(RepoError::NotFound)?;
            s.likes.retain(|l| l.design_id != id);
            s.views.retain(|v| v.design_id != id);
            s.notifications.retain(|n| n.design_id != Some(id));
            drop(s);
            self.persist();
            Ok(design)
        }
    }

    #[async_trait]
    impl LikeRepo for InMemRepo {
        async fn find_like(&self, user_id: Uuid, design_id: Uuid) -> RepoResult<Option<Like>> {
            let s = self.read()?;
            Ok(s.likes.iter().find(|l| l.user_id == user_id && l.design_id == design_id).cloned())
        }
        async fn insert_like(&self, user_id: Uuid, design_id: Uuid) -> RepoResult<Like> {
            let mut s = self.write()?;
            if !s.designs.contains_key(&design_id) {
                return Err(RepoError::NotFound);
            }
            // uniqueness of (user, design) is decided under the write lock
            if s.likes.iter().any(|l| l.user_id == user_id && l.design_id == design_id) {
                return Err(RepoError::Conflict);
            }
            let like = Like { user_id, design_id, created_at: Utc::now() };
            s.likes.push(like.clone());
            drop(s);
            self.persist();
            Ok(like)
        }
        async fn delete_like(&self, user_id: Uuid, design_id: Uuid) -> RepoResult<bool> {
            let mut s = self.write()?;
            let before = s.likes.len();
            s.likes.retain(|l| !(l.user_id == user_id && l.design_id == design_id));
            let removed = s.likes.len() != before;
            drop(s);
            if removed { self.persist(); }
            Ok(removed)
        }
        async fn count_likes(&self, design_id: Uuid) -> RepoResult<i64> {
            Ok(self.read()?.likes.iter().filter(|l| l.design_id == design_id).count() as i64)
        }
    }

    #[async_trait]
    impl ViewRepo for InMemRepo {
        async fn insert_view(&self, design_id: Uuid, viewer: Option<Uuid>) -> RepoResult<View> {
            let mut s = self.write()?;
            if !s.designs.contains_key(&design_id) {
                return Err(RepoError::NotFound);
            }
            let view = View { id: Uuid::new_v4(), user_id: viewer, design_id, created_at: Utc::now() };
            s.views.push(view.clone());
            drop(s);
            self.persist();
            Ok(view)
        }
        async fn count_views(&self, design_id: Uuid) -> RepoResult<i64> {
            Ok(self.read()?.views.iter().filter(|v| v.design_id == design_id).count() as i64)
        }
    }

    #[async_trait]
    impl FollowRepo for InMemRepo {
        async fn find_follow(&self, follower: Uuid, followee: Uuid) -> RepoResult<Option<Follow>> {
            let s = self.read()?;
            Ok(s.follows.iter().find(|f| f.follower_id == follower && f.followee_id == followee).cloned())
        }
        async fn insert_follow(&self, follower: Uuid, followee: Uuid) -> RepoResult<Follow> {
            let mut s = self.write()?;
            if !s.profiles.contains_key(&followee) {
                return Err(RepoError::NotFound);
            }
            if s.follows.iter().any(|f| f.follower_id == follower && f.followee_id == followee) {
                return Err(RepoError::Conflict);
            }
            let follow = Follow { follower_id: follower, followee_id: followee, created_at: Utc::now() };
            s.follows.push(follow.clone());
            drop(s);
            self.persist();
            Ok(follow)
        }
        async fn delete_follow(&self, follower: Uuid, followee: Uuid) -> RepoResult<bool> {
            let mut s = self.write()?;
            let before = s.follows.len();
            s.follows.retain(|f| !(f.follower_id == follower && f.followee_id == followee));
            let removed = s.follows.len() != before;
            drop(s);
            if removed { self.persist(); }
            Ok(removed)
        }
        async fn count_followers(&self, user: Uuid) -> RepoResult<i64> {
            Ok(self.read()?.follows.iter().filter(|f| f.followee_id == user).count() as i64)
        }
        async fn count_following(&self, user: Uuid) -> RepoResult<i64> {
            Ok(self.read()?.follows.iter().filter(|f| f.follower_id == user).count() as i64)
        }
    }

    #[async_trait]
    impl NotificationRepo for InMemRepo {
        async fn insert_notification(&self, new: NewNotification) -> RepoResult<Notification> {
            let mut s = self.write()?;
            if let Some(design_id) = new.design_id {
                if !s.designs.contains_key(&design_id) {
                    return Err(RepoError::NotFound);
                }
            }
            let n = Notification {
                id: Uuid::new_v4(),
                recipient_id: new.recipient_id,
                actor_id: new.actor_id,
                kind: new.kind,
                design_id: new.design_id,
                content: new.content,
                created_at: Utc::now(),
                is_read: false,
            };
            s.notifications.push(n.clone());
            drop(s);
            self.persist();
            Ok(n)
        }
        async fn list_notifications(&self, recipient: Uuid, limit: i64) -> RepoResult<Vec<Notification>> {
            let s = self.read()?;
            // insertion order is chronological; walk it backwards for newest first
            Ok(s.notifications
                .iter()
                .rev()
                .filter(|n| n.recipient_id == recipient)
                .take(limit.max(0) as usize)
                .cloned()
                .collect())
        }
        async fn mark_notifications_read(
            &self,
            recipient: Uuid,
            actor: Option<Uuid>,
            kind: Option<NotificationKind>,
        ) -> RepoResult<u64> {
            let mut s = self.write()?;
            let mut changed = 0u64;
            for n in s.notifications.iter_mut().filter(|n| {
                n.recipient_id == recipient
                    && !n.is_read
                    && actor.map_or(true, |a| n.actor_id == a)
                    && kind.map_or(true, |k| n.kind == k)
            }) {
                n.is_read = true;
                changed += 1;
            }
            drop(s);
            if changed > 0 { self.persist(); }
            Ok(changed)
        }
        async fn count_unread_notifications(&self, recipient: Uuid) -> RepoResult<i64> {
            let s = self.read()?;
            Ok(s.notifications.iter().filter(|n| n.recipient_id == recipient && !n.is_read).count() as i64)
        }
    }

    #[async_trait]
    impl MessageRepo for InMemRepo {
        async fn insert_message(&self, new: NewMessage) -> RepoResult<Message> {
            let mut s = self.write()?;
            let msg = Message {
                id: Uuid::new_v4(),
                sender_id: new.sender_id,
                receiver_id: new.receiver_id,
                content: new.content,
                created_at: Utc::now(),
                is_read: false,
            };
            s.messages.push(msg.clone());
            drop(s);
            self.persist();
            Ok(msg)
        }
        async fn list_messages_for_user(&self, user: Uuid) -> RepoResult<Vec<Message>> {
            let s = self.read()?;
            Ok(s.messages
                .iter()
                .rev()
                .filter(|m| m.sender_id == user || m.receiver_id == user)
                .cloned()
                .collect())
        }
        async fn list_messages_between(&self, user: Uuid, counterpart: Uuid) -> RepoResult<Vec<Message>> {
            let s = self.read()?;
            Ok(s.messages
                .iter()
                .filter(|m| {
                    (m.sender_id == user && m.receiver_id == counterpart)
                        || (m.sender_id == counterpart && m.receiver_id == user)
                })
                .cloned()
                .collect())
        }
        async fn mark_messages_read(&self, receiver: Uuid, sender: Uuid) -> RepoResult<u64> {
            let mut s = self.write()?;
            let mut changed = 0u64;
            for m in s
                .messages
                .iter_mut()
                .filter(|m| m.receiver_id == receiver && m.sender_id == sender && !m.is_read)
            {
                m.is_read = true;
                changed += 1;
            }
            drop(s);
            if changed > 0 { self.persist(); }
            Ok(changed)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    impl From<sqlx::Error> for RepoError {
        fn from(e: sqlx::Error) -> Self {
            match &e {
                sqlx::Error::RowNotFound => RepoError::NotFound,
                sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepoError::NotFound,
                _ => RepoError::Internal(e.to_string()),
            }
        }
    }

    const PROFILE_COLUMNS: &str = "id, username, full_name, first_name, last_name, bio, website, \
                                   avatar_url, skills, created_at, updated_at";

    const DESIGN_COLUMNS: &str =
        "id, owner_id, title, description, category, image_url, image_urls, tags, created_at";

    const NOTIFICATION_COLUMNS: &str =
        "id, recipient_id, actor_id, kind, design_id, content, created_at, is_read";

    const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, created_at, is_read";

    // $1 is the (nullable) viewer id used for is_liked.
    const CARD_SELECT: &str = r#"
        SELECT d.id, d.owner_id, d.title, d.description, d.category, d.image_url, d.image_urls,
               d.tags, d.created_at,
               p.username AS owner_username, p.full_name AS owner_full_name,
               p.avatar_url AS owner_avatar_url,
               (SELECT COUNT(*) FROM likes l WHERE l.design_id = d.id) AS likes_count,
               (SELECT COUNT(*) FROM views v WHERE v.design_id = d.id) AS views_count,
               EXISTS (SELECT 1 FROM likes l WHERE l.design_id = d.id AND l.user_id = $1) AS is_liked
        FROM designs d
        LEFT JOIN profiles p ON p.id = d.owner_id
    "#;

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Applies the embedded `migrations/` directory.
        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    #[async_trait]
    impl ProfileRepo for PgRepo {
        async fn get_profile(&self, id: Uuid) -> RepoResult<Profile> {
            let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
            Ok(sqlx::query_as::<_, Profile>(&sql).bind(id).fetch_one(&self.pool).await?)
        }
        async fn get_profile_by_username(&self, username: &str) -> RepoResult<Profile> {
            let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE username = $1");
            Ok(sqlx::query_as::<_, Profile>(&sql).bind(username).fetch_one(&self.pool).await?)
        }
        async fn get_profiles(&self, ids: &[Uuid]) -> RepoResult<Vec<Profile>> {
            let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ANY($1)");
            Ok(sqlx::query_as::<_, Profile>(&sql).bind(ids).fetch_all(&self.pool).await?)
        }
        async fn create_profile(&self, new: NewProfile) -> RepoResult<Profile> {
            let sql = format!(
                "INSERT INTO profiles (id, username, full_name, avatar_url) VALUES ($1,$2,$3,$4) \
                 RETURNING {PROFILE_COLUMNS}"
            );
            Ok(sqlx::query_as::<_, Profile>(&sql)
                .bind(new.id)
                .bind(&new.username)
                .bind(&new.full_name)
                .bind(&new.avatar_url)
                .fetch_one(&self.pool)
                .await?)
        }
        async fn upsert_profile(&self, id: Uuid, changes: ProfileChanges) -> RepoResult<Profile> {
            let sql = format!(
                r#"INSERT INTO profiles (id, username, first_name, last_name, bio, website, avatar_url, skills, updated_at)
                   VALUES ($1,$2,$3,$4,$5,$6,$7,$8, now())
                   ON CONFLICT (id) DO UPDATE SET
                       username = EXCLUDED.username,
                       first_name = EXCLUDED.first_name,
                       last_name = EXCLUDED.last_name,
                       bio = EXCLUDED.bio,
                       website = EXCLUDED.website,
                       avatar_url = EXCLUDED.avatar_url,
                       skills = EXCLUDED.skills,
                       updated_at = now()
                   RETURNING {PROFILE_COLUMNS}"#
            );
            Ok(sqlx::query_as::<_, Profile>(&sql)
                .bind(id)
                .bind(&changes.username)
                .bind(&changes.first_name)
                .bind(&changes.last_name)
                .bind(&changes.bio)
                .bind(&changes.website)
                .bind(&changes.avatar_url)
                .bind(&changes.skills)
                .fetch_one(&self.pool)
                .await?)
        }
        async fn list_profiles(&self, limit: i64) -> RepoResult<Vec<Profile>> {
            let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at DESC LIMIT $1");
            Ok(sqlx::query_as::<_, Profile>(&sql).bind(limit).fetch_all(&self.pool).await?)
        }
    }

    #[async_trait]
    impl DesignRepo for PgRepo {
        async fn create_design(&self, new: NewDesign) -> RepoResult<Design> {
            let image_url = new.image_urls.first().cloned().unwrap_or_default();
            let sql = format!(
                "INSERT INTO designs (id, owner_id, title, description, category, image_url, image_urls, tags) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8) RETURNING {DESIGN_COLUMNS}"
            );
            Ok(sqlx::query_as::<_, Design>(&sql)
                .bind(Uuid::new_v4())
                .bind(new.owner_id)
                .bind(&new.title)
                .bind(&new.description)
                .bind(&new.category)
                .bind(&image_url)
                .bind(&new.image_urls)
                .bind(&new.tags)
                .fetch_one(&self.pool)
                .await?)
        }
        async fn get_design(&self, id: Uuid) -> RepoResult<Design> {
            let sql = format!("SELECT {DESIGN_COLUMNS} FROM designs WHERE id = $1");
            Ok(sqlx::query_as::<_, Design>(&sql).bind(id).fetch_one(&self.pool).await?)
        }
        async fn get_designs(&self, ids: &[Uuid]) -> RepoResult<Vec<Design>> {
            let sql = format!("SELECT {DESIGN_COLUMNS} FROM designs WHERE id = ANY($1)");
            Ok(sqlx::query_as::<_, Design>(&sql).bind(ids).fetch_all(&self.pool).await?)
        }
        async fn get_design_card(&self, id: Uuid, viewer: Option<Uuid>) -> RepoResult<DesignCard> {
            let sql = format!("{CARD_SELECT} WHERE d.id = $2");
            Ok(sqlx::query_as::<_, DesignCard>(&sql)
                .bind(viewer)
                .bind(id)
                .fetch_one(&self.pool)
                .await?)
        }
        async fn list_design_cards(&self, query: &DesignQuery, viewer: Option<Uuid>) -> RepoResult<Vec<DesignCard>> {
            let (limit, offset) = query.page();
            let sql = format!(
                "{CARD_SELECT} WHERE ($2::text IS NULL OR d.category = $2) \
                 AND ($3::uuid IS NULL OR d.owner_id = $3) \
                 ORDER BY d.created_at DESC LIMIT $4 OFFSET $5"
            );
            Ok(sqlx::query_as::<_, DesignCard>(&sql)
                .bind(viewer)
                .bind(query.category_filter())
                .bind(query.owner)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?)
        }
        async fn count_designs(&self, owner: Uuid) -> RepoResult<i64> {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM designs WHERE owner_id = $1")
                .bind(owner)
                .fetch_one(&self.pool)
                .await?;
            Ok(n)
        }
        async fn delete_design(&self, id: Uuid) -> RepoResult<Design> {
            let mut tx = self.pool.begin().await?;
            let sql = format!("SELECT {DESIGN_COLUMNS} FROM designs WHERE id = $1 FOR UPDATE");
            let design = sqlx::query_as::<_, Design>(&sql).bind(id).fetch_one(&mut *tx).await?;
            for table in ["likes", "views", "notifications"] {
                sqlx::query(&format!("DELETE FROM {table} WHERE design_id = $1"))
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            sqlx::query("DELETE FROM designs WHERE id = $1").bind(id).execute(&mut *tx).await?;
            tx.commit().await?;
            Ok(design)
        }
    }

    #[async_trait]
    impl LikeRepo for PgRepo {
        async fn find_like(&self, user_id: Uuid, design_id: Uuid) -> RepoResult<Option<Like>> {
            Ok(sqlx::query_as::<_, Like>(
                "SELECT user_id, design_id, created_at FROM likes WHERE user_id = $1 AND design_id = $2",
            )
            .bind(user_id)
            .bind(design_id)
            .fetch_optional(&self.pool)
            .await?)
        }
        async fn insert_like(&self, user_id: Uuid, design_id: Uuid) -> RepoResult<Like> {
            // The unique (user_id, design_id) constraint arbitrates concurrent toggles.
            sqlx::query_as::<_, Like>(
                "INSERT INTO likes (user_id, design_id) VALUES ($1,$2) \
                 ON CONFLICT (user_id, design_id) DO NOTHING \
                 RETURNING user_id, design_id, created_at",
            )
            .bind(user_id)
            .bind(design_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::Conflict)
        }
        async fn delete_like(&self, user_id: Uuid, design_id: Uuid) -> RepoResult<bool> {
            let res = sqlx::query("DELETE FROM likes WHERE user_id = $1 AND design_id = $2")
                .bind(user_id)
                .bind(design_id)
                .execute(&self.pool)
                .await?;
            Ok(res.rows_affected() > 0)
        }
        async fn count_likes(&self, design_id: Uuid) -> RepoResult<i64> {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM likes WHERE design_id = $1")
                .bind(design_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(n)
        }
    }

    #[async_trait]
    impl ViewRepo for PgRepo {
        async fn insert_view(&self, design_id: Uuid, viewer: Option<Uuid>) -> RepoResult<View> {
            Ok(sqlx::query_as::<_, View>(
                "INSERT INTO views (id, user_id, design_id) VALUES ($1,$2,$3) \
                 RETURNING id, user_id, design_id, created_at",
            )
            .bind(Uuid::new_v4())
            .bind(viewer)
            .bind(design_id)
            .fetch_one(&self.pool)
            .await?)
        }
        async fn count_views(&self, design_id: Uuid) -> RepoResult<i64> {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM views WHERE design_id = $1")
                .bind(design_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(n)
        }
    }

    #[async_trait]
    impl FollowRepo for PgRepo {
        async fn find_follow(&self, follower: Uuid, followee: Uuid) -> RepoResult<Option<Follow>> {
            Ok(sqlx::query_as::<_, Follow>(
                "SELECT follower_id, followee_id, created_at FROM follows \
                 WHERE follower_id = $1 AND followee_id = $2",
            )
            .bind(follower)
            .bind(followee)
            .fetch_optional(&self.pool)
            .await?)
        }
        async fn insert_follow(&self, follower: Uuid, followee: Uuid) -> RepoResult<Follow> {
            sqlx::query_as::<_, Follow>(
                "INSERT INTO follows (follower_id, followee_id) VALUES ($1,$2) \
                 ON CONFLICT (follower_id, followee_id) DO NOTHING \
                 RETURNING follower_id, followee_id, created_at",
            )
            .bind(follower)
            .bind(followee)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::Conflict)
        }
        async fn delete_follow(&self, follower: Uuid, followee: Uuid) -> RepoResult<bool> {
            let res = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
                .bind(follower)
                .bind(followee)
                .execute(&self.pool)
                .await?;
            Ok(res.rows_affected() > 0)
        }
        async fn count_followers(&self, user: Uuid) -> RepoResult<i64> {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE followee_id = $1")
                .bind(user)
                .fetch_one(&self.pool)
                .await?;
            Ok(n)
        }
        async fn count_following(&self, user: Uuid) -> RepoResult<i64> {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE follower_id = $1")
                .bind(user)
                .fetch_one(&self.pool)
                .await?;
            Ok(n)
        }
    }

    #[async_trait]
    impl NotificationRepo for PgRepo {
        async fn insert_notification(&self, new: NewNotification) -> RepoResult<Notification> {
            let sql = format!(
                "INSERT INTO notifications (id, recipient_id, actor_id, kind, design_id, content) \
                 VALUES ($1,$2,$3,$4,$5,$6) RETURNING {NOTIFICATION_COLUMNS}"
            );
            Ok(sqlx::query_as::<_, Notification>(&sql)
                .bind(Uuid::new_v4())
                .bind(new.recipient_id)
                .bind(new.actor_id)
                .bind(new.kind.as_str())
                .bind(new.design_id)
                .bind(&new.content)
                .fetch_one(&self.pool)
                .await?)
        }
        async fn list_notifications(&self, recipient: Uuid, limit: i64) -> RepoResult<Vec<Notification>> {
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE recipient_id = $1 \
                 ORDER BY created_at DESC LIMIT $2"
            );
            Ok(sqlx::query_as::<_, Notification>(&sql)
                .bind(recipient)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?)
        }
        async fn mark_notifications_read(
            &self,
            recipient: Uuid,
            actor: Option<Uuid>,
            kind: Option<NotificationKind>,
        ) -> RepoResult<u64> {
            let res = sqlx::query(
                "UPDATE notifications SET is_read = TRUE \
                 WHERE recipient_id = $1 AND is_read = FALSE \
                 AND ($2::uuid IS NULL OR actor_id = $2) \
                 AND ($3::text IS NULL OR kind = $3)",
            )
            .bind(recipient)
            .bind(actor)
            .bind(kind.map(|k| k.as_str()))
            .execute(&self.pool)
            .await?;
            Ok(res.rows_affected())
        }
        async fn count_unread_notifications(&self, recipient: Uuid) -> RepoResult<i64> {
            let (n,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = FALSE",
            )
            .bind(recipient)
            .fetch_one(&self.pool)
            .await?;
            Ok(n)
        }
    }

    #[async_trait]
    impl MessageRepo for PgRepo {
        async fn insert_message(&self, new: NewMessage) -> RepoResult<Message> {
            let sql = format!(
                "INSERT INTO messages (id, sender_id, receiver_id, content) VALUES ($1,$2,$3,$4) \
                 RETURNING {MESSAGE_COLUMNS}"
            );
            Ok(sqlx::query_as::<_, Message>(&sql)
                .bind(Uuid::new_v4())
                .bind(new.sender_id)
                .bind(new.receiver_id)
                .bind(&new.content)
                .fetch_one(&self.pool)
                .await?)
        }
        async fn list_messages_for_user(&self, user: Uuid) -> RepoResult<Vec<Message>> {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE sender_id = $1 OR receiver_id = $1 \
                 ORDER BY created_at DESC"
            );
            Ok(sqlx::query_as::<_, Message>(&sql).bind(user).fetch_all(&self.pool).await?)
        }
        async fn list_messages_between(&self, user: Uuid, counterpart: Uuid) -> RepoResult<Vec<Message>> {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages \
                 WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1) \
                 ORDER BY created_at ASC"
            );
            Ok(sqlx::query_as::<_, Message>(&sql)
                .bind(user)
                .bind(counterpart)
                .fetch_all(&self.pool)
                .await?)
        }
        async fn mark_messages_read(&self, receiver: Uuid, sender: Uuid) -> RepoResult<u64> {
            let res = sqlx::query(
                "UPDATE messages SET is_read = TRUE \
                 WHERE receiver_id = $1 AND sender_id = $2 AND is_read = FALSE",
            )
            .bind(receiver)
            .bind(sender)
            .execute(&self.pool)
            .await?;
            Ok(res.rows_affected())
        }
    }
}
