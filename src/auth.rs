use actix_web::{dev::Payload, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::error::ApiError;

/// Profile hints the auth provider attaches to its tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Claims of a provider-issued access token. `sub` is the user id profiles are keyed by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// The authenticated user a request acts as. Every mutation receives one explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub email: Option<String>,
    pub metadata: UserMetadata,
}

impl Actor {
    pub fn new(id: Uuid) -> Self {
        Self { id, email: None, metadata: UserMetadata::default() }
    }
}

impl From<Claims> for Actor {
    fn from(c: Claims) -> Self {
        Actor { id: c.sub, email: c.email, metadata: c.user_metadata }
    }
}

fn secret() -> Result<String, ApiError> {
    env::var("JWT_SECRET").map_err(|_| {
        tracing::error!("JWT_SECRET not set");
        ApiError::Internal
    })
}

/// Validate a JWT and return its claims.
fn decode_jwt(token: &str) -> Result<Claims, ApiError> {
    let secret = secret()?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    match env::var("JWT_AUDIENCE") {
        Ok(aud) if !aud.is_empty() => validation.set_audience(&[aud]),
        _ => validation.validate_aud = false,
    }
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("rejected bearer token: {e}");
            ApiError::Unauthorized
        })
}

/// Extractor yielding the authenticated `Actor`. Use `Option<Auth>` where guests are allowed.
pub struct Auth(pub Actor);

impl Auth {
    pub fn id(&self) -> Uuid {
        self.0.id
    }
}

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        // Delegate to BearerAuth to parse the header.
        let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() else {
            return ready(Err(ApiError::Unauthorized));
        };
        ready(decode_jwt(bearer.token()).map(|claims| Auth(claims.into())))
    }
}

/// Mint a token the way the auth provider does; used by local tooling and tests.
pub fn create_jwt(
    user_id: Uuid,
    email: Option<&str>,
    user_metadata: UserMetadata,
) -> Result<String, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").unwrap_or_default();
    let expiration = (chrono::Utc::now() + chrono::Duration::hours(24)).timestamp() as usize;

    let claims = Claims {
        sub: user_id,
        exp: expiration,
        email: email.map(str::to_string),
        user_metadata,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}
