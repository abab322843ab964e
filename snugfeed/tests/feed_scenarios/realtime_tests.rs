use super::support::*;

#[tokio::test]
async fn feeds_follow_inserts_edits_and_deletes_from_other_clients() {
    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    let (bob, bob_ctx) = member(&backend, "bob").await;
    let mut global = alice.posts().open_feed(Scope::Global).await.unwrap();
    let mut bobs = alice.posts().open_feed(Scope::ByUser(user_id(&bob_ctx))).await.unwrap();

    let mine = alice.posts().create("from alice", &alice_ctx).await.unwrap();
    let theirs = bob.posts().create("from bob", &bob_ctx).await.unwrap();
    assert_eq!(
        global.drain().await,
        [FeedUpdate::Inserted(mine.id.clone()), FeedUpdate::Inserted(theirs.id.clone())]
    );
    assert_eq!(contents(global.posts()), ["from bob", "from alice"]);
    assert_eq!(bobs.drain().await, [FeedUpdate::Inserted(theirs.id.clone())]);

    bob.posts().update(&theirs.id, "edited", &bob_ctx).await.unwrap();
    assert_eq!(global.drain().await, [FeedUpdate::Updated(theirs.id.clone())]);
    assert_eq!(global.post(&theirs.id).unwrap().content, "edited");

    bob.posts().delete(&theirs.id, &bob_ctx).await.unwrap();
    assert_eq!(global.drain().await, [FeedUpdate::Removed(theirs.id.clone())]);
    assert_eq!(bobs.drain().await, [FeedUpdate::Updated(theirs.id.clone()), FeedUpdate::Removed(theirs.id.clone())]);
    assert!(bobs.posts().is_empty());
    assert_eq!(contents(global.posts()), ["from alice"]);
}

#[tokio::test]
async fn own_edits_apply_once_even_when_the_echo_arrives() {
    let backend = MemoryBackend::new();
    let (alice, ctx) = member(&backend, "alice").await;
    let post = alice.posts().create("v1", &ctx).await.unwrap();
    let mut feed = alice.posts().open_feed(Scope::Global).await.unwrap();

    alice.posts().delete(&post.id, &ctx).await.unwrap();
    let updates = feed.drain().await;
    assert_eq!(updates[0], FeedUpdate::Removed(post.id.clone()));
    assert!(updates[1..].iter().all(|update| *update == FeedUpdate::Ignored));
    assert!(feed.posts().is_empty());
}

#[tokio::test]
async fn insert_whose_author_lookup_fails_is_dropped() {
    let backend = MemoryBackend::new();
    let (alice, ctx) = member(&backend, "alice").await;
    let mut feed = alice.posts().open_feed(Scope::Global).await.unwrap();

    backend.fail_next(Table::Users, 1);
    let row = backend.insert_unchecked(Table::Posts, json!({"content": "ghost", "user_id": user_id(&ctx)}));
    let updates = feed.drain().await;
    assert!(
        matches!(&updates[..], [FeedUpdate::Dropped { post_id: Some(id), .. }] if Some(id.as_str()) == row["id"].as_str()),
        "got {updates:?}"
    );
    assert!(feed.posts().is_empty());

    // The post is still there; a reload picks it up.
    feed.reload().await.unwrap();
    assert_eq!(contents(feed.posts()), ["ghost"]);
}

#[tokio::test]
async fn posts_without_author_profile_are_skipped_in_lists() {
    let backend = MemoryBackend::new();
    let (alice, ctx) = member(&backend, "alice").await;
    alice.posts().create("real", &ctx).await.unwrap();
    backend.insert_unchecked(Table::Posts, json!({"content": "orphan", "user_id": "nobody"}));

    assert_eq!(contents(&alice.posts().list(&Scope::Global).await.unwrap()), ["real"]);
}

#[tokio::test]
async fn closing_views_tears_down_their_channels() {
    let backend = MemoryBackend::new();
    let (alice, ctx) = member(&backend, "alice").await;
    let post = alice.posts().create("p", &ctx).await.unwrap();
    assert_eq!(backend.subscriber_count(), 0);

    let feed = alice.posts().open_feed(Scope::Global).await.unwrap();
    let thread = alice.comments().open_thread(&post.id).await.unwrap();
    let tally = alice.comments().open_tally().await.unwrap();
    assert_eq!(backend.subscriber_count(), 3);

    let posts = feed.close();
    assert_eq!(posts.len(), 1);
    thread.close();
    assert_eq!(backend.subscriber_count(), 1);
    drop(tally);
    assert_eq!(backend.subscriber_count(), 0);
}

#[tokio::test]
async fn failed_session_check_resolves_to_anonymous() {
    let backend = MemoryBackend::new();
    let (alice, _) = member(&backend, "alice").await;
    let mut watch = alice.session().subscribe();

    backend.set_offline(true);
    let ctx = alice.session().resolve().await;
    backend.set_offline(false);

    assert!(!ctx.is_authenticated());
    assert!(!alice.session().context().is_authenticated());
    assert!(watch.is_active());
    watch.unsubscribe();
    assert_eq!(watch.next().await, None);
}

#[tokio::test]
async fn sign_in_issues_a_fresh_session_and_sign_out_revokes_it() {
    let backend = MemoryBackend::new();
    let (first, ctx) = member(&backend, "alice").await;
    let old_token = ctx.session().unwrap().access_token.clone();

    let second = Client::new(backend.clone());
    let mut watch = second.session().subscribe();
    let wrong = second.session().sign_in("alice@example.com", "wrong-pass").await;
    assert!(matches!(wrong, Err(FeedError::InvalidCredentials)));

    let signed_in = second.session().sign_in("alice@example.com", "secret1").await.unwrap();
    assert!(matches!(watch.next().await, Some(AuthEvent::SignedIn(_))));
    assert_ne!(signed_in.session().unwrap().access_token, old_token);
    assert_eq!(signed_in.user_id(), ctx.user_id());

    let refreshed = second.session().refresh().await.unwrap();
    assert!(matches!(watch.next().await, Some(AuthEvent::TokenRefreshed(_))));
    assert!(second.session().resolve().await.is_authenticated());
    assert_ne!(refreshed.session(), signed_in.session());

    second.session().sign_out().await;
    assert_eq!(watch.next().await, Some(AuthEvent::SignedOut));
    assert!(!second.session().resolve().await.is_authenticated());

    // The first client's session is independent.
    assert!(first.session().resolve().await.is_authenticated());
}
