use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{http::header, web, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::Auth;
use crate::designs::{self, DesignUpload, UploadFile, FILE_SIZE_LIMIT, MAX_FILES, UPLOAD_TOTAL_LIMIT};
use crate::error::ApiError;
use crate::interactions;
use crate::messaging;
use crate::models::*;
use crate::notifications;
use crate::profiles::{self, ProfileForm};
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;
use crate::storage::{ObjectStore, StorageError};
use crate::telemetry;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/designs")
                    .route(web::get().to(list_designs))
                    .route(web::post().to(create_design)),
            )
            .service(web::resource("/designs/{id}").route(web::get().to(get_design)))
            .service(web::resource("/designs/{id}/like").route(web::post().to(toggle_like)))
            .service(web::resource("/designs/{id}/views").route(web::post().to(record_view)))
            .service(web::resource("/design/delete").route(web::post().to(delete_design)))
            .service(
                web::resource("/profile")
                    .route(web::get().to(get_own_profile))
                    .route(web::post().to(update_profile)),
            )
            .service(web::resource("/profiles/{username}").route(web::get().to(get_profile_page)))
            .service(web::resource("/profiles/{username}/follow").route(web::post().to(toggle_follow)))
            .service(web::resource("/users/{id}/designs").route(web::get().to(list_user_designs)))
            .service(web::resource("/creators").route(web::get().to(list_creators)))
            .service(web::resource("/messages").route(web::get().to(list_conversations)))
            .service(
                web::resource("/messages/{id}")
                    .route(web::get().to(get_conversation))
                    .route(web::post().to(send_message)),
            )
            .service(web::resource("/notifications").route(web::get().to(list_notifications)))
            .service(web::resource("/notifications/unread-count").route(web::get().to(unread_count)))
            .service(web::resource("/notifications/read").route(web::post().to(mark_notifications_read))),
    );
    // Outside the API prefix so stored public URLs resolve directly.
    cfg.route("/media/{key:.*}", web::get().to(get_media));
    cfg.route("/healthz", web::get().to(healthz));
    cfg.route("/metrics", web::get().to(metrics));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub store: Arc<dyn ObjectStore>,
    pub rate_limiter: Option<RateLimiterFacade>,
}

impl AppState {
    fn throttle(&self, allow: impl FnOnce(&RateLimiterFacade) -> bool) -> Result<(), ApiError> {
        match &self.rate_limiter {
            Some(rl) if !allow(rl) => Err(ApiError::TooManyRequests),
            _ => Ok(()),
        }
    }
}

fn viewer(auth: &Option<Auth>) -> Option<Uuid> {
    auth.as_ref().map(Auth::id)
}

// ---------------- Designs ----------------

/// Multipart layout accepted by the upload endpoint (documentation only).
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct DesignUploadForm {
    title: String,
    description: Option<String>,
    category: Option<String>,
    /// Comma separated.
    tags: Option<String>,
    /// One or more images; a single `file` part is also accepted.
    #[schema(value_type = Vec<String>, format = Binary)]
    files: Vec<Vec<u8>>,
}

const TEXT_FIELD_LIMIT: usize = 64 * 1024;

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

async fn read_upload(payload: &mut Multipart) -> Result<DesignUpload, ApiError> {
    let mut upload = DesignUpload::default();
    let mut single: Option<UploadFile> = None;
    let mut file_parts = 0usize;
    let mut total = 0usize;

    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::warn!("multipart error: {e}");
        ApiError::bad_request("Malformed multipart body")
    })? {
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let filename = disposition.get_filename().map(str::to_string);

        let is_file = matches!(name.as_str(), "files" | "file");
        if is_file {
            file_parts += 1;
            if file_parts > MAX_FILES {
                return Err(ApiError::bad_request(format!("At most {MAX_FILES} files per design")));
            }
        }
        let cap = if is_file { FILE_SIZE_LIMIT } else { TEXT_FIELD_LIMIT };
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::warn!("stream read error: {e}");
            ApiError::bad_request("Malformed multipart body")
        })? {
            if bytes.len() + chunk.len() > cap {
                return Err(if is_file { ApiError::PayloadTooLarge } else { ApiError::bad_request("Field too large") });
            }
            total += chunk.len();
            if total > UPLOAD_TOTAL_LIMIT {
                return Err(ApiError::PayloadTooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "title" => upload.title = text(&bytes),
            "description" => upload.description = Some(text(&bytes)),
            "category" => upload.category = Some(text(&bytes)),
            "tags" => upload.tags = Some(text(&bytes)),
            // Browsers send an empty part for an untouched file input.
            "files" if !bytes.is_empty() => upload.files.push(UploadFile { filename, bytes }),
            "file" if !bytes.is_empty() => single = Some(UploadFile { filename, bytes }),
            _ => {}
        }
    }

    if upload.files.is_empty() {
        upload.files.extend(single);
    }
    Ok(upload)
}

#[utoipa::path(
    post,
    path = "/api/v1/designs",
    tag = "designs",
    request_body(content = DesignUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Design created", body = DesignCard),
        (status = 400, description = "Missing required fields", body = crate::error::ApiErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "File too large"),
        (status = 415, description = "Unsupported media type"),
        (status = 429, description = "Too many uploads")
    )
)]
pub async fn create_design(auth: Auth, data: web::Data<AppState>, mut payload: Multipart) -> Result<HttpResponse, ApiError> {
    data.throttle(|rl| rl.allow_upload(auth.id()))?;
    let upload = read_upload(&mut payload).await?;
    let card = designs::create_design(data.repo.as_ref(), data.store.as_ref(), &auth.0, upload).await?;
    Ok(HttpResponse::Created().json(card))
}

#[utoipa::path(
    get,
    path = "/api/v1/designs",
    tag = "designs",
    params(DesignQuery),
    responses((status = 200, description = "Feed, newest first", body = [DesignCard]))
)]
pub async fn list_designs(auth: Option<Auth>, data: web::Data<AppState>, query: web::Query<DesignQuery>) -> Result<HttpResponse, ApiError> {
    let cards = designs::list_designs(data.repo.as_ref(), &query, viewer(&auth)).await?;
    Ok(HttpResponse::Ok().json(cards))
}

#[utoipa::path(
    get,
    path = "/api/v1/designs/{id}",
    tag = "designs",
    params(("id" = Uuid, Path, description = "Design id")),
    responses(
        (status = 200, description = "Design detail", body = DesignCard),
        (status = 404, description = "Design not found", body = crate::error::ApiErrorBody)
    )
)]
pub async fn get_design(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    let card = designs::get_design(data.repo.as_ref(), path.into_inner(), viewer(&auth)).await?;
    Ok(HttpResponse::Ok().json(card))
}

#[utoipa::path(
    post,
    path = "/api/v1/designs/{id}/like",
    tag = "designs",
    params(("id" = Uuid, Path, description = "Design id")),
    responses(
        (status = 200, description = "New like state", body = crate::interactions::LikeToggle),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Design not found", body = crate::error::ApiErrorBody),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn toggle_like(auth: Auth, data: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    data.throttle(|rl| rl.allow_like(auth.id()))?;
    let toggle = interactions::toggle_like(data.repo.as_ref(), &auth.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(toggle))
}

#[utoipa::path(
    post,
    path = "/api/v1/designs/{id}/views",
    tag = "designs",
    params(("id" = Uuid, Path, description = "Design id")),
    responses(
        (status = 204, description = "View recorded"),
        (status = 404, description = "Design not found", body = crate::error::ApiErrorBody)
    )
)]
pub async fn record_view(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    interactions::record_view(data.repo.as_ref(), path.into_inner(), viewer(&auth)).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteDesignRequest {
    #[serde(rename = "designId")]
    pub design_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/design/delete",
    tag = "designs",
    request_body = DeleteDesignRequest,
    responses(
        (status = 200, description = "Deleted: {\"success\": true}"),
        (status = 400, description = "Missing designId", body = crate::error::ApiErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Design not found", body = crate::error::ApiErrorBody)
    )
)]
pub async fn delete_design(auth: Option<Auth>, data: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse, ApiError> {
    // The id is checked before authentication.
    let raw_id = serde_json::from_slice::<DeleteDesignRequest>(&body)
        .ok()
        .and_then(|r| r.design_id)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing designId"))?;
    let auth = auth.ok_or(ApiError::Unauthorized)?;
    let id = Uuid::parse_str(raw_id.trim()).map_err(|_| ApiError::NotFound("Design not found"))?;

    designs::delete_design(data.repo.as_ref(), data.store.as_ref(), &auth.0, id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/designs",
    tag = "designs",
    params(("id" = Uuid, Path, description = "Owner id")),
    responses((status = 200, description = "Designs by owner, newest first", body = [DesignCard]))
)]
pub async fn list_user_designs(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    let cards = designs::list_user_designs(data.repo.as_ref(), path.into_inner(), viewer(&auth)).await?;
    Ok(HttpResponse::Ok().json(cards))
}

// ---------------- Profiles ----------------

#[utoipa::path(
    get,
    path = "/api/v1/profile",
    tag = "profiles",
    responses(
        (status = 200, description = "Own profile", body = Profile),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No profile yet", body = crate::error::ApiErrorBody)
    )
)]
pub async fn get_own_profile(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let profile = profiles::get_profile(data.repo.as_ref(), auth.id()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    post,
    path = "/api/v1/profile",
    tag = "profiles",
    request_body = ProfileForm,
    responses(
        (status = 200, description = "Saved: {\"ok\": true}"),
        (status = 400, description = "Invalid username", body = crate::error::ApiErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Username taken", body = crate::error::ApiErrorBody)
    )
)]
pub async fn update_profile(auth: Auth, data: web::Data<AppState>, form: web::Json<ProfileForm>) -> Result<HttpResponse, ApiError> {
    profiles::update_profile(data.repo.as_ref(), &auth.0, form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

#[utoipa::path(
    get,
    path = "/api/v1/profiles/{username}",
    tag = "profiles",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "Profile page", body = ProfilePage),
        (status = 404, description = "Profile not found", body = crate::error::ApiErrorBody)
    )
)]
pub async fn get_profile_page(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let page = profiles::get_profile_page(data.repo.as_ref(), &path.into_inner(), viewer(&auth)).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/v1/profiles/{username}/follow",
    tag = "profiles",
    params(("username" = String, Path, description = "Username to follow or unfollow")),
    responses(
        (status = 200, description = "New follow state", body = crate::interactions::FollowToggle),
        (status = 400, description = "Cannot follow yourself", body = crate::error::ApiErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Profile not found", body = crate::error::ApiErrorBody)
    )
)]
pub async fn toggle_follow(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let target = profiles::get_profile_by_username(data.repo.as_ref(), &path.into_inner()).await?;
    let toggle = interactions::toggle_follow(data.repo.as_ref(), &auth.0, target.id).await?;
    Ok(HttpResponse::Ok().json(toggle))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CreatorsQuery {
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/creators",
    tag = "profiles",
    params(CreatorsQuery),
    responses((status = 200, description = "Creators directory", body = [CreatorCard]))
)]
pub async fn list_creators(data: web::Data<AppState>, query: web::Query<CreatorsQuery>) -> Result<HttpResponse, ApiError> {
    let limit = query.limit.unwrap_or(profiles::CREATORS_LIMIT);
    let creators = profiles::list_creators(data.repo.as_ref(), limit).await?;
    Ok(HttpResponse::Ok().json(creators))
}

// ---------------- Messages ----------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/messages",
    tag = "messages",
    responses(
        (status = 200, description = "Conversations, newest first", body = [Conversation]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_conversations(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let conversations = messaging::list_conversations(data.repo.as_ref(), auth.id()).await?;
    Ok(HttpResponse::Ok().json(conversations))
}

#[utoipa::path(
    get,
    path = "/api/v1/messages/{id}",
    tag = "messages",
    params(("id" = Uuid, Path, description = "Counterpart user id")),
    responses(
        (status = 200, description = "Conversation, oldest first; incoming messages are marked read", body = crate::messaging::ConversationThread),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_conversation(auth: Auth, data: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    let thread = messaging::list_messages(data.repo.as_ref(), auth.id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(thread))
}

#[utoipa::path(
    post,
    path = "/api/v1/messages/{id}",
    tag = "messages",
    params(("id" = Uuid, Path, description = "Receiver user id")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 400, description = "Empty message or self message", body = crate::error::ApiErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Recipient not found", body = crate::error::ApiErrorBody),
        (status = 429, description = "Too many messages")
    )
)]
pub async fn send_message(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    payload: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, ApiError> {
    data.throttle(|rl| rl.allow_message(auth.id()))?;
    let message = messaging::send_message(data.repo.as_ref(), &auth.0, path.into_inner(), &payload.content).await?;
    Ok(HttpResponse::Created().json(message))
}

// ---------------- Notifications ----------------

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct MarkReadRequest {
    pub actor_id: Option<Uuid>,
    pub kind: Option<NotificationKind>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkReadResponse {
    pub updated: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    tag = "notifications",
    responses(
        (status = 200, description = "Notifications, newest first", body = [NotificationItem]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_notifications(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let items = notifications::list(data.repo.as_ref(), auth.id()).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/unread-count",
    tag = "notifications",
    responses(
        (status = 200, description = "Unread notifications", body = UnreadCount),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn unread_count(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let count = notifications::unread_count(data.repo.as_ref(), auth.id()).await?;
    Ok(HttpResponse::Ok().json(UnreadCount { count }))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/read",
    tag = "notifications",
    request_body = MarkReadRequest,
    responses(
        (status = 200, description = "Rows marked read", body = MarkReadResponse),
        (status = 400, description = "Malformed filter", body = crate::error::ApiErrorBody),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn mark_notifications_read(
    auth: Auth,
    data: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    // An empty body marks everything read; a body that does not parse is rejected.
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        MarkReadRequest::default()
    } else {
        serde_json::from_slice::<MarkReadRequest>(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid mark-read request: {e}")))?
    };
    let updated = notifications::mark_read(data.repo.as_ref(), auth.id(), req.actor_id, req.kind).await?;
    Ok(HttpResponse::Ok().json(MarkReadResponse { updated }))
}

// ---------------- Media & ops ----------------

pub async fn get_media(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let key = path.into_inner();
    let key = key.strip_prefix("designs/").unwrap_or(&key);
    match data.store.get(key).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok()
            .insert_header((header::CONTENT_TYPE, mime))
            .insert_header((header::CACHE_CONTROL, "public, max-age=31536000, immutable"))
            .body(bytes)),
        Err(StorageError::NotFound) | Err(StorageError::InvalidKey(_)) => Err(ApiError::NotFound("file not found")),
        Err(e) => Err(e.into()),
    }
}

pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub async fn metrics() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(telemetry::render())
}
