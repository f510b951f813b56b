use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{ApiError, ApiResult};
use crate::models::{DesignCard, DesignQuery, NewDesign};
use crate::profiles;
use crate::repo::{Repo, RepoError};
use crate::storage::{key_from_public_url, object_key, ObjectStore};
use crate::telemetry::UPLOADS_TOTAL;

pub const FILE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MiB per file
pub const MAX_FILES: usize = 10;
/// Cap on everything buffered for one upload request.
pub const UPLOAD_TOTAL_LIMIT: usize = 40 * 1024 * 1024;

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

#[derive(Debug, Clone, Default)]
pub struct UploadFile {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// A parsed upload form.
#[derive(Debug, Clone, Default)]
pub struct DesignUpload {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub files: Vec<UploadFile>,
}

/// Comma separated tags: trimmed, blanks dropped, first occurrence wins.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Sniffs the file and returns (mime, extension) for accepted image types.
fn check_file(file: &UploadFile) -> ApiResult<(&'static str, &'static str)> {
    if file.bytes.len() > FILE_SIZE_LIMIT {
        return Err(ApiError::PayloadTooLarge);
    }
    match infer::get(&file.bytes) {
        Some(kind) if ALLOWED_MIME.contains(&kind.mime_type()) => Ok((kind.mime_type(), kind.extension())),
        other => {
            tracing::debug!(
                filename = file.filename.as_deref().unwrap_or("-"),
                detected = other.map(|k| k.mime_type()).unwrap_or("unknown"),
                "rejected upload"
            );
            Err(ApiError::UnsupportedMediaType)
        }
    }
}

async fn discard(store: &dyn ObjectStore, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    if let Err(e) = store.remove(keys).await {
        tracing::warn!(?keys, "failed to remove stored files: {e}");
    }
}

/// Stores every file, then records one design pointing at all of them.
/// Files already written are removed again if a later step fails.
pub async fn create_design(
    repo: &dyn Repo,
    store: &dyn ObjectStore,
    actor: &Actor,
    upload: DesignUpload,
) -> ApiResult<DesignCard> {
    let title = upload.title.trim().to_string();
    if title.is_empty() || upload.files.is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }
    if upload.files.len() > MAX_FILES {
        return Err(ApiError::bad_request(format!("At most {MAX_FILES} files per design")));
    }

    let mut checked = Vec::with_capacity(upload.files.len());
    for file in upload.files {
        let (mime, ext) = check_file(&file)?;
        checked.push((mime, ext, file.bytes));
    }

    let mut keys: Vec<String> = Vec::with_capacity(checked.len());
    for (mime, ext, bytes) in checked {
        let key = object_key(actor.id, ext);
        if let Err(e) = store.put(&key, mime, bytes).await {
            discard(store, &keys).await;
            return Err(e.into());
        }
        keys.push(key);
    }
    let image_urls: Vec<String> = keys.iter().map(|k| store.public_url(k)).collect();

    let result = async {
        profiles::ensure_profile(repo, actor).await?;
        let new = NewDesign {
            owner_id: actor.id,
            title,
            description: upload.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            category: upload.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            image_urls,
            tags: upload.tags.as_deref().map(parse_tags).unwrap_or_default(),
        };
        let design = repo.create_design(new).await?;
        Ok::<_, ApiError>(repo.get_design_card(design.id, Some(actor.id)).await?)
    }
    .await;

    match result {
        Ok(card) => {
            metrics::increment_counter!(UPLOADS_TOTAL);
            tracing::info!(design = %card.id, owner = %actor.id, files = keys.len(), "design created");
            Ok(card)
        }
        Err(e) => {
            discard(store, &keys).await;
            Err(e)
        }
    }
}

pub async fn get_design(repo: &dyn Repo, id: Uuid, viewer: Option<Uuid>) -> ApiResult<DesignCard> {
    repo.get_design_card(id, viewer).await.map_err(ApiError::missing("Design not found"))
}

pub async fn list_designs(repo: &dyn Repo, query: &DesignQuery, viewer: Option<Uuid>) -> ApiResult<Vec<DesignCard>> {
    Ok(repo.list_design_cards(query, viewer).await?)
}

pub async fn list_user_designs(repo: &dyn Repo, owner: Uuid, viewer: Option<Uuid>) -> ApiResult<Vec<DesignCard>> {
    list_designs(repo, &DesignQuery::by_owner(owner), viewer).await
}

/// Owner-only delete. Rows go first (atomically, with their likes, views and
/// notifications); stored files are removed afterwards and failures only logged.
pub async fn delete_design(repo: &dyn Repo, store: &dyn ObjectStore, actor: &Actor, id: Uuid) -> ApiResult<()> {
    let design = repo.get_design(id).await.map_err(ApiError::missing("Design not found"))?;
    if design.owner_id != actor.id {
        tracing::warn!(design = %id, actor = %actor.id, "delete refused: not the owner");
        return Err(ApiError::Forbidden);
    }

    let removed = repo.delete_design(id).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound("Design not found"),
        other => other.into(),
    })?;

    let mut keys: Vec<String> = removed.image_urls.iter().filter_map(|u| key_from_public_url(u)).collect();
    if let Some(primary) = key_from_public_url(&removed.image_url) {
        if !keys.contains(&primary) {
            keys.push(primary);
        }
    }
    discard(store, &keys).await;

    tracing::info!(design = %id, owner = %actor.id, files = keys.len(), "design deleted");
    Ok(())
}
