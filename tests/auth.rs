mod common;

use actix_web::{dev::Payload, test, FromRequest};
use pixerra::auth::{create_jwt, Actor, Auth, Claims, UserMetadata};
use uuid::Uuid;

#[actix_web::test]
#[serial_test::serial]
async fn jwt_roundtrip_ok() {
    common::set_secret();
    let id = Uuid::new_v4();
    let meta = UserMetadata { full_name: Some("Ana Lima".into()), username: Some("ana".into()), avatar_url: None };
    let token = create_jwt(id, Some("ana@example.com"), meta.clone()).expect("token");
    // The Auth extractor is the public way to validate, so use it here.
    let req = test::TestRequest::default()
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_http_request();
    let mut pl = Payload::None;
    let auth = Auth::from_request(&req, &mut pl).await.expect("extract");
    assert_eq!(auth.id(), id);
    assert_eq!(auth.0.email.as_deref(), Some("ana@example.com"));
    assert_eq!(auth.0.metadata, meta);
}

#[actix_web::test]
#[serial_test::serial]
async fn extractor_rejects_invalid_token() {
    common::set_secret();
    let req = test::TestRequest::default()
        .insert_header(("Authorization", "Bearer notatoken"))
        .to_http_request();
    let mut pl = Payload::None;
    assert!(Auth::from_request(&req, &mut pl).await.is_err());

    let req = test::TestRequest::default().to_http_request();
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
}

#[actix_web::test]
#[serial_test::serial]
async fn token_signed_with_other_secret_rejected() {
    std::env::set_var("JWT_SECRET", "a-completely-different-secret-value!!");
    let token = create_jwt(Uuid::new_v4(), None, UserMetadata::default()).expect("token");
    common::set_secret();
    let req = test::TestRequest::default()
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_http_request();
    let mut pl = Payload::None;
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
}

#[actix_web::test]
#[serial_test::serial]
async fn audience_enforced_when_configured() {
    common::set_secret();
    let token = create_jwt(Uuid::new_v4(), None, UserMetadata::default()).expect("token");
    std::env::set_var("JWT_AUDIENCE", "authenticated");
    let req = test::TestRequest::default()
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_http_request();
    let mut pl = Payload::None;
    // token carries no aud claim
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
    std::env::remove_var("JWT_AUDIENCE");
}

#[::core::prelude::v1::test]
fn claims_become_actor() {
    let id = Uuid::new_v4();
    let claims: Claims = serde_json::from_value(serde_json::json!({
        "sub": id,
        "exp": usize::MAX,
        "email": "jo@example.com",
        "user_metadata": { "full_name": "Jo" }
    }))
    .unwrap();
    let actor = Actor::from(claims);
    assert_eq!(actor.id, id);
    assert_eq!(actor.metadata.full_name.as_deref(), Some("Jo"));
    assert_eq!(actor.metadata.username, None);

    // provider tokens may omit metadata entirely
    let bare: Claims = serde_json::from_value(serde_json::json!({ "sub": id, "exp": 1 })).unwrap();
    assert_eq!(Actor::from(bare), Actor::new(id));
}
