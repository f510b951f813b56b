mod common;

use std::sync::Arc;

use actix_web::{test, App};
use common::{bearer, design, multipart, profile, sample_jpeg, sample_png, state, MemStore, Part};
use pixerra::configure;
use pixerra::designs::{FILE_SIZE_LIMIT, MAX_FILES, UPLOAD_TOTAL_LIMIT};
use pixerra::models::{NewNotification, NotificationKind};
use pixerra::repo::inmem::InMemRepo;
use pixerra::repo::*;
use pixerra::storage::{key_from_public_url, FsObjectStore};
use serde_json::{json, Value};
use uuid::Uuid;

#[actix_web::test]
async fn upload_creates_design_and_profile() {
    let repo = InMemRepo::new();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsObjectStore::new(dir.path(), "http://localhost:8080/media"));
    let app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone(), store))).configure(configure),
    )
    .await;

    let uploader = Uuid::new_v4();
    let (ct, body) = multipart(&[
        Part::Text("title", "Poster"),
        Part::Text("description", "Gig poster"),
        Part::Text("category", "Print"),
        Part::Text("tags", "gig, print,, gig "),
        Part::File("files", "a.png", sample_png()),
        Part::File("files", "b.jpg", sample_jpeg()),
    ]);
    let req = test::TestRequest::post()
        .uri("/api/v1/designs")
        .insert_header(bearer(uploader))
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let card: Value = test::read_body_json(resp).await;

    assert_eq!(card["title"], "Poster");
    assert_eq!(card["tags"], json!(["gig", "print"]));
    let urls = card["image_urls"].as_array().unwrap();
    assert_eq!(urls.len(), 2);
    assert_eq!(card["image_url"], urls[0]);
    assert!(urls[1].as_str().unwrap().ends_with(".jpg"));
    for url in urls {
        let key = key_from_public_url(url.as_str().unwrap()).unwrap();
        assert!(key.starts_with(&uploader.to_string()));
        assert!(dir.path().join(&key).exists());
    }

    // profile was created lazily from the token
    let p = repo.get_profile(uploader).await.unwrap();
    assert_eq!(p.full_name.as_deref(), Some("someone"));
    assert_eq!(card["owner_username"], p.username.as_str());

    // stored file is served back through /media
    let path = urls[0].as_str().unwrap().trim_start_matches("http://localhost:8080");
    let resp = test::call_service(&app, test::TestRequest::get().uri(path).to_request()).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");
}

#[actix_web::test]
async fn upload_validation() {
    let repo = InMemRepo::new();
    let store = Arc::new(MemStore::default());
    let app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone(), store.clone()))).configure(configure),
    )
    .await;
    let user = Uuid::new_v4();

    let send = |parts: Vec<Part<'static>>, auth: bool| {
        let (ct, body) = multipart(&parts);
        let mut req = test::TestRequest::post().uri("/api/v1/designs").insert_header(("Content-Type", ct));
        if auth {
            req = req.insert_header(bearer(user));
        }
        req.set_payload(body).to_request()
    };

    let resp = test::call_service(&app, send(vec![Part::File("file", "a.png", sample_png())], false)).await;
    assert_eq!(resp.status(), 401);

    let resp = test::call_service(&app, send(vec![Part::File("file", "a.png", sample_png())], true)).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Missing required fields");

    let resp = test::call_service(&app, send(vec![Part::Text("title", "No file")], true)).await;
    assert_eq!(resp.status(), 400);

    let resp = test::call_service(
        &app,
        send(vec![Part::Text("title", "Notes"), Part::File("file", "notes.txt", b"just text".to_vec())], true),
    )
    .await;
    assert_eq!(resp.status(), 415);

    let mut huge = sample_png();
    huge.resize(10 * 1024 * 1024 + 1, 0);
    let resp = test::call_service(&app, send(vec![Part::Text("title", "Huge"), Part::File("file", "h.png", huge)], true)).await;
    assert_eq!(resp.status(), 413);

    // nothing was stored or recorded along the way
    assert!(store.objects.lock().unwrap().is_empty());
    assert_eq!(repo.count_designs(user).await.unwrap(), 0);

    // single `file` part is accepted
    let resp = test::call_service(
        &app,
        send(vec![Part::Text("title", "Single"), Part::File("file", "a.png", sample_png())], true),
    )
    .await;
    assert_eq!(resp.status(), 201);
    assert_eq!(store.objects.lock().unwrap().len(), 1);
}

#[actix_web::test]
async fn upload_caps_file_count_and_total_size() {
    let repo = InMemRepo::new();
    let store = Arc::new(MemStore::default());
    let app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone(), store.clone()))).configure(configure),
    )
    .await;
    let user = Uuid::new_v4();

    let send = |parts: Vec<Part<'static>>| {
        let (ct, body) = multipart(&parts);
        test::TestRequest::post()
            .uri("/api/v1/designs")
            .insert_header(("Content-Type", ct))
            .insert_header(bearer(user))
            .set_payload(body)
            .to_request()
    };

    let mut parts = vec![Part::Text("title", "Too many")];
    parts.extend((0..MAX_FILES + 1).map(|_| Part::File("files", "a.png", sample_png())));
    let resp = test::call_service(&app, send(parts)).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], format!("At most {MAX_FILES} files per design"));

    // every file under its own limit, the request over the total
    let mut big = sample_png();
    big.resize(FILE_SIZE_LIMIT, 0);
    let count = UPLOAD_TOTAL_LIMIT / FILE_SIZE_LIMIT + 1;
    assert!(count <= MAX_FILES);
    let mut parts = vec![Part::Text("title", "Too big")];
    parts.extend((0..count).map(|_| Part::File("files", "b.png", big.clone())));
    let resp = test::call_service(&app, send(parts)).await;
    assert_eq!(resp.status(), 413);

    assert!(store.objects.lock().unwrap().is_empty());
    assert_eq!(repo.count_designs(user).await.unwrap(), 0);

    let mut parts = vec![Part::Text("title", "Exactly enough")];
    parts.extend((0..MAX_FILES).map(|_| Part::File("files", "a.png", sample_png())));
    let resp = test::call_service(&app, send(parts)).await;
    assert_eq!(resp.status(), 201);
    assert_eq!(store.objects.lock().unwrap().len(), MAX_FILES);
}

#[actix_web::test]
async fn detail_counts_and_views() {
    let repo = InMemRepo::new();
    let owner = profile(&repo, "owner").await;
    let fan = profile(&repo, "fan").await;
    let d = design(&repo, &owner, "Poster").await;
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(repo.clone(), Arc::new(MemStore::default()))))
            .configure(configure),
    )
    .await;

    // guest view, then a signed-in view
    let uri = format!("/api/v1/designs/{}/views", d.id);
    let resp = test::call_service(&app, test::TestRequest::post().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), 204);
    let resp = test::call_service(&app, test::TestRequest::post().uri(&uri).insert_header(bearer(fan.id)).to_request()).await;
    assert_eq!(resp.status(), 204);

    let like = format!("/api/v1/designs/{}/like", d.id);
    let resp = test::call_service(&app, test::TestRequest::post().uri(&like).to_request()).await;
    assert_eq!(resp.status(), 401);
    let resp = test::call_service(&app, test::TestRequest::post().uri(&like).insert_header(bearer(fan.id)).to_request()).await;
    let toggle: Value = test::read_body_json(resp).await;
    assert_eq!(toggle, json!({ "liked": true, "likes_count": 1 }));

    let detail = format!("/api/v1/designs/{}", d.id);
    let card: Value = test::read_body_json(
        test::call_service(&app, test::TestRequest::get().uri(&detail).insert_header(bearer(fan.id)).to_request()).await,
    )
    .await;
    assert_eq!(card["views_count"], 2);
    assert_eq!(card["likes_count"], 1);
    assert_eq!(card["is_liked"], true);
    assert_eq!(card["owner_username"], "owner");

    let guest: Value =
        test::read_body_json(test::call_service(&app, test::TestRequest::get().uri(&detail).to_request()).await).await;
    assert_eq!(guest["is_liked"], false);

    let missing = format!("/api/v1/designs/{}", Uuid::new_v4());
    let resp = test::call_service(&app, test::TestRequest::get().uri(&missing).to_request()).await;
    assert_eq!(resp.status(), 404);

    let feed: Value = test::read_body_json(
        test::call_service(&app, test::TestRequest::get().uri("/api/v1/designs?category=All").to_request()).await,
    )
    .await;
    assert_eq!(feed.as_array().unwrap().len(), 1);
    let mine: Value = test::read_body_json(
        test::call_service(&app, test::TestRequest::get().uri(&format!("/api/v1/users/{}/designs", fan.id)).to_request()).await,
    )
    .await;
    assert!(mine.as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn delete_status_codes_and_cleanup() {
    let repo = InMemRepo::new();
    let store = Arc::new(MemStore::default());
    let owner = profile(&repo, "owner").await;
    let fan = profile(&repo, "fan").await;

    // a design whose files really live in the store
    let key = format!("{}/poster.png", owner.id);
    store.objects.lock().unwrap().insert(key.clone(), (sample_png(), "image/png".into()));
    let d = repo
        .create_design(pixerra::models::NewDesign {
            owner_id: owner.id,
            title: "Poster".into(),
            description: None,
            category: None,
            image_urls: vec![format!("http://localhost:8080/media/designs/{key}")],
            tags: vec![],
        })
        .await
        .unwrap();
    repo.insert_like(fan.id, d.id).await.unwrap();
    repo.insert_view(d.id, None).await.unwrap();
    repo.insert_notification(NewNotification {
        recipient_id: owner.id,
        actor_id: fan.id,
        kind: NotificationKind::Like,
        design_id: Some(d.id),
        content: None,
    })
    .await
    .unwrap();

    let app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone(), store.clone()))).configure(configure),
    )
    .await;
    let delete = |body: Value, who: Option<Uuid>| {
        let mut req = test::TestRequest::post().uri("/api/v1/design/delete").set_json(&body);
        if let Some(id) = who {
            req = req.insert_header(bearer(id));
        }
        req.to_request()
    };

    // missing id is reported before authentication
    assert_eq!(test::call_service(&app, delete(json!({}), None)).await.status(), 400);
    assert_eq!(test::call_service(&app, delete(json!({ "designId": d.id }), None)).await.status(), 401);
    assert_eq!(test::call_service(&app, delete(json!({ "designId": d.id }), Some(fan.id))).await.status(), 403);
    assert_eq!(
        test::call_service(&app, delete(json!({ "designId": Uuid::new_v4() }), Some(owner.id))).await.status(),
        404
    );

    let resp = test::call_service(&app, delete(json!({ "designId": d.id }), Some(owner.id))).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "success": true }));

    assert!(repo.get_design(d.id).await.is_err());
    assert_eq!(repo.count_likes(d.id).await.unwrap(), 0);
    assert_eq!(repo.count_views(d.id).await.unwrap(), 0);
    assert!(repo.list_notifications(owner.id, 10).await.unwrap().is_empty());
    assert!(store.objects.lock().unwrap().is_empty());
}

#[actix_web::test]
async fn file_removal_failure_is_not_fatal() {
    let repo = InMemRepo::new();
    let store = Arc::new(MemStore { fail_remove: true, ..Default::default() });
    let owner = profile(&repo, "owner").await;
    let d = design(&repo, &owner, "Poster").await;

    let app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone(), store))).configure(configure),
    )
    .await;
    let req = test::TestRequest::post()
        .uri("/api/v1/design/delete")
        .insert_header(bearer(owner.id))
        .set_json(&json!({ "designId": d.id }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    assert!(repo.get_design(d.id).await.is_err());
}
