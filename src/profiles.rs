use rand::Rng;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{ApiError, ApiResult};
use crate::models::{CreatorCard, DesignQuery, NewProfile, Profile, ProfileChanges, ProfilePage};
use crate::repo::{Repo, RepoError};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 30;
pub const CREATORS_LIMIT: i64 = 50;
const TOP_DESIGNS: i64 = 3;

/// Skills arrive either as a list or as the edit form's comma separated string.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SkillsInput {
    List(Vec<String>),
    Csv(String),
}

impl SkillsInput {
    pub fn into_list(self) -> Vec<String> {
        let raw: Vec<String> = match self {
            SkillsInput::List(v) => v,
            SkillsInput::Csv(s) => s.split(',').map(str::to_string).collect(),
        };
        raw.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Profile edit form. Every field is optional on the wire; blanks clear the field.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProfileForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar_url: Option<String>,
    #[schema(value_type = Option<Vec<String>>)]
    pub skills: Option<SkillsInput>,
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn validate_username(username: &str) -> ApiResult<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(ApiError::bad_request(format!(
            "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(ApiError::bad_request(
            "Username may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(())
}

/// Strips characters usernames may not contain; too-short results become "user".
fn sanitize_username_base(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .take(USERNAME_MAX - 4)
        .collect();
    if cleaned.chars().count() < USERNAME_MIN { "user".to_string() } else { cleaned }
}

fn email_local_part(email: Option<&str>) -> Option<&str> {
    email.and_then(|e| e.split('@').next()).filter(|s| !s.trim().is_empty())
}

/// The profile a first-time uploader gets, derived from token metadata.
pub fn derive_new_profile(actor: &Actor) -> NewProfile {
    let meta = &actor.metadata;
    let local = email_local_part(actor.email.as_deref());

    let full_name = non_blank(meta.full_name.clone())
        .or_else(|| local.map(str::to_string))
        .unwrap_or_else(|| "Creative Pro".to_string());

    let username = match non_blank(meta.username.clone()).map(|u| sanitize_username_base(&u)) {
        Some(u) => u,
        None => {
            let base = sanitize_username_base(local.unwrap_or("user"));
            format!("{base}{}", rand::thread_rng().gen_range(0..1000))
        }
    };

    NewProfile { id: actor.id, username, full_name: Some(full_name), avatar_url: non_blank(meta.avatar_url.clone()) }
}

fn fallback_username(username: &str, id: Uuid) -> String {
    let suffix = &id.simple().to_string()[..8];
    let base: String = username.chars().take(USERNAME_MAX - suffix.len() - 1).collect();
    format!("{base}_{suffix}")
}

/// Returns the actor's profile, creating it from token metadata when missing.
pub async fn ensure_profile(repo: &dyn Repo, actor: &Actor) -> ApiResult<Profile> {
    match repo.get_profile(actor.id).await {
        Ok(p) => return Ok(p),
        Err(RepoError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }

    let new = derive_new_profile(actor);
    match repo.create_profile(new.clone()).await {
        Ok(p) => {
            tracing::info!(user = %actor.id, username = %p.username, "created profile");
            Ok(p)
        }
        Err(RepoError::Conflict) => {
            // Either a concurrent request created it, or the username is taken.
            if let Ok(p) = repo.get_profile(actor.id).await {
                return Ok(p);
            }
            let retry = NewProfile { username: fallback_username(&new.username, actor.id), ..new };
            tracing::warn!(user = %actor.id, username = %retry.username, "username taken; using fallback");
            Ok(repo.create_profile(retry).await?)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn get_profile(repo: &dyn Repo, id: Uuid) -> ApiResult<Profile> {
    repo.get_profile(id).await.map_err(ApiError::missing("Profile not found"))
}

pub async fn get_profile_by_username(repo: &dyn Repo, username: &str) -> ApiResult<Profile> {
    repo.get_profile_by_username(username).await.map_err(ApiError::missing("Profile not found"))
}

/// Applies the edit form, creating the profile if it does not exist yet.
pub async fn update_profile(repo: &dyn Repo, actor: &Actor, form: ProfileForm) -> ApiResult<Profile> {
    let current = match repo.get_profile(actor.id).await {
        Ok(p) => Some(p),
        Err(RepoError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };

    let username = match non_blank(form.username) {
        Some(u) => u,
        None => match &current {
            Some(p) => p.username.clone(),
            None => derive_new_profile(actor).username,
        },
    };
    validate_username(&username)?;

    let changes = ProfileChanges {
        username,
        first_name: non_blank(form.first_name),
        last_name: non_blank(form.last_name),
        bio: non_blank(form.bio),
        website: non_blank(form.website),
        avatar_url: non_blank(form.avatar_url),
        skills: form.skills.map(SkillsInput::into_list).unwrap_or_default(),
    };

    repo.upsert_profile(actor.id, changes).await.map_err(|e| match e {
        RepoError::Conflict => ApiError::Conflict("Username is already taken"),
        other => other.into(),
    })
}

/// Public profile page: the profile, its counters, the viewer's follow state and designs.
pub async fn get_profile_page(repo: &dyn Repo, username: &str, viewer: Option<Uuid>) -> ApiResult<ProfilePage> {
    let profile = get_profile_by_username(repo, username).await?;
    let id = profile.id;

    let is_following = match viewer {
        Some(v) if v != id => repo.find_follow(v, id).await?.is_some(),
        _ => false,
    };

    Ok(ProfilePage {
        design_count: repo.count_designs(id).await?,
        followers_count: repo.count_followers(id).await?,
        following_count: repo.count_following(id).await?,
        is_following,
        designs: repo.list_design_cards(&DesignQuery::by_owner(id), viewer).await?,
        profile,
    })
}

/// Creators directory: newest profiles, each with design count and latest thumbnails.
pub async fn list_creators(repo: &dyn Repo, limit: i64) -> ApiResult<Vec<CreatorCard>> {
    let profiles = repo.list_profiles(limit.clamp(1, CREATORS_LIMIT)).await?;
    let mut out = Vec::with_capacity(profiles.len());
    for p in profiles {
        let query = DesignQuery { limit: Some(TOP_DESIGNS), ..DesignQuery::by_owner(p.id) };
        let top_designs = repo
            .list_design_cards(&query, None)
            .await?
            .into_iter()
            .map(|d| d.image_url)
            .collect();
        out.push(CreatorCard {
            profile: p.summary(),
            design_count: repo.count_designs(p.id).await?,
            bio: p.bio,
            skills: p.skills,
            top_designs,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserMetadata;

    #[test]
    fn skills_from_string_or_list() {
        let csv: SkillsInput = serde_json::from_str(r#"" UI, Branding ,, 3D ""#).unwrap();
        assert_eq!(csv.into_list(), vec!["UI", "Branding", "3D"]);
        let list: SkillsInput = serde_json::from_str(r#"["Motion", " "]"#).unwrap();
        assert_eq!(list.into_list(), vec!["Motion"]);
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("ana.designs_01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(31)).is_err());
    }

    #[test]
    fn new_profile_prefers_metadata() {
        let mut actor = Actor::new(Uuid::new_v4());
        actor.metadata = UserMetadata {
            full_name: Some("Ana Lima".into()),
            username: Some("ana".into()),
            avatar_url: Some("https://cdn/a.png".into()),
        };
        let p = derive_new_profile(&actor);
        assert_eq!(p.username, "ana");
        assert_eq!(p.full_name.as_deref(), Some("Ana Lima"));
        assert_eq!(p.avatar_url.as_deref(), Some("https://cdn/a.png"));
    }

    #[test]
    fn new_profile_falls_back_to_email_then_default() {
        let mut actor = Actor::new(Uuid::new_v4());
        actor.email = Some("jo.doe+x@example.com".into());
        let p = derive_new_profile(&actor);
        assert_eq!(p.full_name.as_deref(), Some("jo.doe+x"));
        assert!(p.username.starts_with("jo.doex"));
        assert!(validate_username(&p.username).is_ok());

        let bare = derive_new_profile(&Actor::new(Uuid::new_v4()));
        assert_eq!(bare.full_name.as_deref(), Some("Creative Pro"));
        assert!(bare.username.starts_with("user"));
    }

    #[test]
    fn fallback_username_stays_valid() {
        let id = Uuid::new_v4();
        let u = fallback_username(&"a".repeat(30), id);
        assert!(validate_username(&u).is_ok());
        assert!(u.ends_with(&id.simple().to_string()[..8]));
    }
}
