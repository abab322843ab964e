use super::support::*;

#[tokio::test]
async fn create_then_list_includes_exactly_one_new_post() {
    let backend = MemoryBackend::new();
    let (alice, ctx) = member(&backend, "alice").await;
    alice.posts().create("older", &ctx).await.expect("create older");

    let before = alice.posts().list(&Scope::Global).await.expect("list before");
    let created = alice.posts().create("  fresh take \n", &ctx).await.expect("create");
    let after = alice.posts().list(&Scope::Global).await.expect("list after");

    assert_eq!(after.len(), before.len() + 1);
    let matching: Vec<_> = after.iter().filter(|post| post.content == "fresh take").collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].id, created.id);
    assert_eq!(matching[0].user_id, user_id(&ctx));
    assert_eq!(matching[0].user.user_name, "alice");
}

#[tokio::test]
async fn owner_update_is_listed_and_foreign_update_is_rejected() {
    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    let (bob, bob_ctx) = member(&backend, "bob").await;
    let post = alice.posts().create("v1", &alice_ctx).await.expect("create");

    alice.posts().update(&post.id, "v2", &alice_ctx).await.expect("owner update");
    assert_eq!(contents(&alice.posts().list(&Scope::Global).await.unwrap()), ["v2"]);

    let denied = bob.posts().update(&post.id, "hijacked", &bob_ctx).await;
    assert!(matches!(denied, Err(FeedError::Unauthorized { .. })), "got {denied:?}");
    assert_eq!(contents(&alice.posts().list(&Scope::Global).await.unwrap()), ["v2"]);
}

#[tokio::test]
async fn owner_delete_clears_every_scope_and_foreign_delete_fails() {
    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    let (bob, bob_ctx) = member(&backend, "bob").await;
    let keep = alice.posts().create("keep", &alice_ctx).await.expect("create keep");
    let doomed = alice.posts().create("doomed", &alice_ctx).await.expect("create doomed");
    let mine = Scope::ByUser(user_id(&alice_ctx));

    let denied = bob.posts().delete(&doomed.id, &bob_ctx).await;
    assert!(matches!(denied, Err(FeedError::Unauthorized { .. })), "got {denied:?}");
    assert_eq!(contents(&bob.posts().list(&Scope::Global).await.unwrap()), ["doomed", "keep"]);
    assert_eq!(contents(&bob.posts().list(&mine).await.unwrap()), ["doomed", "keep"]);

    alice.posts().delete(&doomed.id, &alice_ctx).await.expect("owner delete");
    let global = alice.posts().list(&Scope::Global).await.unwrap();
    let scoped = alice.posts().list(&mine).await.unwrap();
    assert_eq!(contents(&global), ["keep"]);
    assert_eq!(contents(&scoped), ["keep"]);
    assert_eq!(global[0].id, keep.id);

    let again = alice.posts().delete(&doomed.id, &alice_ctx).await;
    assert!(matches!(again, Err(FeedError::NotFound { .. })));
}

#[tokio::test]
async fn deleting_a_post_takes_its_comments_and_likes_along() {
    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    let (bob, bob_ctx) = member(&backend, "bob").await;
    let post = alice.posts().create("short lived", &alice_ctx).await.unwrap();
    bob.comments().create(&post.id, "nice", &bob_ctx).await.unwrap();
    let mut likes = bob.likes().load(&post.id, &bob_ctx).await.unwrap();
    bob.likes().toggle(&mut likes, &bob_ctx).await.unwrap();

    alice.posts().delete(&post.id, &alice_ctx).await.unwrap();
    assert!(backend.snapshot(Table::Comments).is_empty());
    assert!(backend.snapshot(Table::Likes).is_empty());
    assert_eq!(bob.comments().count(&post.id).await.unwrap(), 0);
}

#[tokio::test]
async fn anonymous_create_is_rejected_and_feed_is_unchanged() {
    let backend = MemoryBackend::new();
    let (alice, ctx) = member(&backend, "alice").await;
    alice.posts().create("hello", &ctx).await.unwrap();
    let visitor = Client::new(backend.clone());

    let before = visitor.posts().list(&Scope::Global).await.unwrap();
    let rejected = visitor.posts().create("spam", &SessionContext::anonymous()).await;
    assert!(matches!(rejected, Err(FeedError::Unauthorized { .. })), "got {rejected:?}");
    assert_eq!(visitor.posts().list(&Scope::Global).await.unwrap(), before);
}

#[tokio::test]
async fn blank_content_is_a_validation_error() {
    let backend = MemoryBackend::new();
    let (alice, ctx) = member(&backend, "alice").await;

    let err = alice.posts().create(" \t\n", &ctx).await.unwrap_err();
    let FeedError::Validation(validation) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert!(validation.has_code("validation.required"));
    assert!(backend.snapshot(Table::Posts).is_empty());
}

#[tokio::test]
async fn hello_scenario_counts_likes_up_and_down() {
    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    let (bob, bob_ctx) = member(&backend, "bob").await;
    let u1 = user_id(&alice_ctx);
    let mut feed = bob.posts().open_feed(Scope::Global).await.unwrap();

    alice.posts().create("hello", &alice_ctx).await.unwrap();
    feed.drain().await;
    let shown: Vec<_> = feed
        .posts()
        .iter()
        .map(|post| (post.content.as_str(), post.user_id.as_str()))
        .collect();
    assert_eq!(shown, [("hello", u1.as_str())]);

    let post_id = feed.posts()[0].id.clone();
    let mut likes = bob.likes().load(&post_id, &bob_ctx).await.unwrap();
    assert_eq!(likes.count(), 0);

    assert_eq!(bob.likes().toggle(&mut likes, &bob_ctx).await.unwrap(), ToggleOutcome::Liked);
    assert_eq!(likes.count(), 1);
    assert!(likes.is_liked());

    assert_eq!(bob.likes().toggle(&mut likes, &bob_ctx).await.unwrap(), ToggleOutcome::Unliked);
    assert_eq!(likes.count(), 0);
    assert!(!likes.is_liked());
    assert_eq!(bob.likes().count(&post_id).await.unwrap(), 0);
}
