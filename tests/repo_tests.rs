mod common;

use common::{design, profile};
use pixerra::models::{DesignQuery, NewMessage, NewNotification, NewProfile, NotificationKind, ProfileChanges};
use pixerra::repo::inmem::InMemRepo;
use pixerra::repo::*;
use uuid::Uuid;

#[tokio::test]
async fn usernames_are_unique() {
    let repo = InMemRepo::new();
    let ana = profile(&repo, "ana").await;
    let err = repo
        .create_profile(NewProfile { id: Uuid::new_v4(), username: "ana".into(), full_name: None, avatar_url: None })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    let bo = profile(&repo, "bo_b").await;
    let changes = ProfileChanges { username: "ana".into(), ..Default::default() };
    assert!(matches!(repo.upsert_profile(bo.id, changes).await, Err(RepoError::Conflict)));

    // keeping one's own username is not a conflict
    let own = ProfileChanges { username: "ana".into(), bio: Some("hi".into()), ..Default::default() };
    assert_eq!(repo.upsert_profile(ana.id, own).await.unwrap().bio.as_deref(), Some("hi"));
}

#[tokio::test]
async fn like_pair_is_unique() {
    let repo = InMemRepo::new();
    let owner = profile(&repo, "owner").await;
    let d = design(&repo, &owner, "Poster").await;
    let user = Uuid::new_v4();

    repo.insert_like(user, d.id).await.unwrap();
    assert!(matches!(repo.insert_like(user, d.id).await, Err(RepoError::Conflict)));
    assert_eq!(repo.count_likes(d.id).await.unwrap(), 1);

    assert!(repo.delete_like(user, d.id).await.unwrap());
    assert!(!repo.delete_like(user, d.id).await.unwrap());
    assert_eq!(repo.count_likes(d.id).await.unwrap(), 0);

    assert!(matches!(repo.insert_like(user, Uuid::new_v4()).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn design_requires_owner_profile() {
    let repo = InMemRepo::new();
    let err = repo
        .create_design(pixerra::models::NewDesign {
            owner_id: Uuid::new_v4(),
            title: "Orphan".into(),
            description: None,
            category: None,
            image_urls: vec!["http://x/designs/a.png".into()],
            tags: vec![],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn delete_design_cascades() {
    let repo = InMemRepo::new();
    let owner = profile(&repo, "owner").await;
    let fan = profile(&repo, "fan").await;
    let d = design(&repo, &owner, "Poster").await;
    let other = design(&repo, &owner, "Other").await;

    repo.insert_like(fan.id, d.id).await.unwrap();
    repo.insert_like(fan.id, other.id).await.unwrap();
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

    let removed = repo.delete_design(d.id).await.unwrap();
    assert_eq!(removed.id, d.id);
    assert!(matches!(repo.get_design(d.id).await, Err(RepoError::NotFound)));
    assert_eq!(repo.count_likes(d.id).await.unwrap(), 0);
    assert_eq!(repo.count_views(d.id).await.unwrap(), 0);
    assert!(repo.list_notifications(owner.id, 10).await.unwrap().is_empty());
    // unrelated rows untouched
    assert_eq!(repo.count_likes(other.id).await.unwrap(), 1);
}

#[tokio::test]
async fn feed_filters_and_pages() {
    let repo = InMemRepo::new();
    let a = profile(&repo, "aaa").await;
    let b = profile(&repo, "bbb").await;
    for i in 0..3 {
        design(&repo, &a, &format!("a{i}")).await;
    }
    design(&repo, &b, "logo").await;

    let all = repo.list_design_cards(&DesignQuery::default(), None).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let q = DesignQuery { category: Some("All".into()), ..Default::default() };
    assert_eq!(repo.list_design_cards(&q, None).await.unwrap().len(), 4);

    let q = DesignQuery { category: Some("Branding".into()), owner: Some(a.id), ..Default::default() };
    assert_eq!(repo.list_design_cards(&q, None).await.unwrap().len(), 3);

    let q = DesignQuery { limit: Some(2), offset: Some(3), ..Default::default() };
    assert_eq!(repo.list_design_cards(&q, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn mark_read_filters_by_actor_and_kind() {
    let repo = InMemRepo::new();
    let (me, x, y) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    for (actor, kind) in [(x, NotificationKind::Message), (x, NotificationKind::Follow), (y, NotificationKind::Message)] {
        repo.insert_notification(NewNotification { recipient_id: me, actor_id: actor, kind, design_id: None, content: None })
            .await
            .unwrap();
    }
    assert_eq!(repo.mark_notifications_read(me, Some(x), Some(NotificationKind::Message)).await.unwrap(), 1);
    assert_eq!(repo.count_unread_notifications(me).await.unwrap(), 2);
    assert_eq!(repo.mark_notifications_read(me, None, None).await.unwrap(), 2);
    assert_eq!(repo.count_unread_notifications(me).await.unwrap(), 0);
}

#[tokio::test]
async fn messages_between_pair_in_order() {
    let repo = InMemRepo::new();
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    for (from, to, text) in [(a, b, "one"), (c, a, "noise"), (b, a, "two"), (a, b, "three")] {
        repo.insert_message(NewMessage { sender_id: from, receiver_id: to, content: text.into() }).await.unwrap();
    }
    let between: Vec<_> = repo.list_messages_between(a, b).await.unwrap().into_iter().map(|m| m.content).collect();
    assert_eq!(between, vec!["one", "two", "three"]);
    assert_eq!(repo.mark_messages_read(a, b).await.unwrap(), 1);
    assert_eq!(repo.mark_messages_read(a, b).await.unwrap(), 0);
    assert_eq!(repo.list_messages_for_user(a).await.unwrap().first().unwrap().content, "three");
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let id = {
        let repo = InMemRepo::with_snapshot(&path);
        let p = profile(&repo, "persisted").await;
        design(&repo, &p, "Kept").await;
        p.id
    };
    let reopened = InMemRepo::with_snapshot(&path);
    assert_eq!(reopened.get_profile(id).await.unwrap().username, "persisted");
    assert_eq!(reopened.count_designs(id).await.unwrap(), 1);
}
