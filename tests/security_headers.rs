mod common;

use actix_web::{test, web, App, HttpResponse};
use pixerra::repo::inmem::InMemRepo;
use pixerra::storage::FsObjectStore;
use pixerra::{configure, SecurityHeaders};
use std::sync::Arc;

fn state() -> web::Data<pixerra::AppState> {
    let store = Arc::new(FsObjectStore::new(std::env::temp_dir().join("pixerra-sec-tests"), "http://localhost:8080/media"));
    web::Data::new(common::state(InMemRepo::new(), store))
}

#[actix_web::test]
async fn test_security_headers_present() {
    let app = test::init_service(App::new().wrap(SecurityHeaders::default()).app_data(state()).configure(configure)).await;
    let req = test::TestRequest::get().uri("/healthz").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert!(headers.get("content-security-policy").is_some());
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert!(headers.get("strict-transport-security").is_none()); // not enabled
}

#[actix_web::test]
async fn test_hsts_enabled_via_builder() {
    let sec = SecurityHeaders::default().with_hsts(true);
    let app = test::init_service(App::new().wrap(sec).app_data(state()).configure(configure)).await;
    let req = test::TestRequest::get().uri("/healthz").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.headers().get("strict-transport-security").is_some(), "HSTS header missing");
}

#[actix_web::test]
async fn test_media_origin_allowed_for_images() {
    let sec = SecurityHeaders::default().with_media_origin("https://cdn.example.com/pixerra-designs");
    let app = test::init_service(App::new().wrap(sec).app_data(state()).configure(configure)).await;
    let req = test::TestRequest::get().uri("/api/v1/designs").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
    assert!(csp.contains("img-src 'self' data: https://cdn.example.com;"), "{csp}");
}

#[actix_web::test]
async fn test_existing_csp_header_preserved() {
    let app = test::init_service(
        App::new().wrap(SecurityHeaders::default()).route(
            "/custom",
            web::get().to(|| async {
                HttpResponse::Ok()
                    .insert_header((actix_web::http::header::CONTENT_SECURITY_POLICY, "custom-src 'none'"))
                    .finish()
            }),
        ),
    )
    .await;
    let req = test::TestRequest::get().uri("/custom").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
    assert_eq!(csp, "custom-src 'none'");
}
