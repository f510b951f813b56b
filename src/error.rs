use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use utoipa::ToSchema;

use crate::repo::RepoError;
use crate::storage::StorageError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("Unauthorized")] Unauthorized,
    #[error("Forbidden")] Forbidden,
    #[error("{0}")] NotFound(&'static str),
    #[error("{0}")] Conflict(&'static str),
    #[error("file too large")] PayloadTooLarge,
    #[error("unsupported media type")] UnsupportedMediaType,
    #[error("too many requests")] TooManyRequests,
    #[error("Internal Server Error")] Internal,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    /// Maps `RepoError::NotFound` to a 404 naming `what`; other errors convert as usual.
    pub fn missing(what: &'static str) -> impl Fn(RepoError) -> ApiError {
        move |e| match e {
            RepoError::NotFound => ApiError::NotFound(what),
            other => other.into(),
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound("not found"),
            RepoError::Conflict => ApiError::Conflict("conflict"),
            RepoError::Internal(msg) => {
                tracing::error!("repository failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => ApiError::NotFound("file not found"),
            other => {
                tracing::error!("object store failure: {other}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiErrorBody { error: self.to_string() })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
