use super::support::*;

#[tokio::test]
async fn arriving_comments_append_to_the_tail_once_in_order() {
    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    let (bob, bob_ctx) = member(&backend, "bob").await;
    let post = alice.posts().create("thoughts?", &alice_ctx).await.unwrap();
    alice.comments().create(&post.id, "first", &alice_ctx).await.unwrap();

    let mut thread = alice.comments().open_thread(&post.id).await.unwrap();
    assert!(thread.load_state().is_ready());
    assert_eq!(thread.comments().len(), 1);

    let second = bob.comments().create(&post.id, "second", &bob_ctx).await.unwrap();
    let third = alice.comments().create(&post.id, "third", &alice_ctx).await.unwrap();
    let updates = thread.drain().await;
    assert_eq!(
        updates,
        [ThreadUpdate::Appended(second.id.clone()), ThreadUpdate::Appended(third.id.clone())]
    );

    let texts: Vec<_> = thread.comments().iter().map(|c| c.content.as_str()).collect();
    assert_eq!(texts, ["first", "second", "third"]);
    assert_eq!(thread.comments()[1].user.user_name, "bob");

    // A refetch racing the change feed must not duplicate anything.
    thread.reload().await.unwrap();
    assert_eq!(thread.comments().len(), 3);
    assert!(thread.drain().await.is_empty());
}

#[tokio::test]
async fn comments_on_other_posts_never_reach_the_thread() {
    let backend = MemoryBackend::new();
    let (alice, ctx) = member(&backend, "alice").await;
    let watched = alice.posts().create("watched", &ctx).await.unwrap();
    let other = alice.posts().create("other", &ctx).await.unwrap();

    let mut thread = alice.comments().open_thread(&watched.id).await.unwrap();
    alice.comments().create(&other.id, "elsewhere", &ctx).await.unwrap();
    assert!(thread.drain().await.is_empty());
    assert!(thread.comments().is_empty());
}

#[tokio::test]
async fn deleted_comments_leave_thread_and_counter() {
    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    let (bob, bob_ctx) = member(&backend, "bob").await;
    let post = alice.posts().create("post", &alice_ctx).await.unwrap();
    let comment = bob.comments().create(&post.id, "oops", &bob_ctx).await.unwrap();

    let mut thread = alice.comments().open_thread(&post.id).await.unwrap();
    let mut tally = alice.comments().open_tally().await.unwrap();
    assert_eq!(tally.track(&post.id).await.unwrap(), 1);

    let denied = alice.comments().delete(&comment.id, &alice_ctx).await;
    assert!(matches!(denied, Err(FeedError::Unauthorized { .. })));

    bob.comments().delete(&comment.id, &bob_ctx).await.unwrap();
    assert_eq!(thread.drain().await, [ThreadUpdate::Removed(comment.id.clone())]);
    assert!(thread.comments().is_empty());
    assert_eq!(tally.drain(), [post.id.clone()]);
    assert_eq!(tally.count(&post.id), 0);
}

#[tokio::test]
async fn comments_committed_during_the_initial_count_are_counted_once() {
    let backend = MemoryBackend::new();
    let (alice, ctx) = member(&backend, "alice").await;
    let post = alice.posts().create("post", &ctx).await.unwrap();

    let racing = Arc::new(RacingBackend::new(backend.clone()));
    let comments = CommentRepository::new(racing.clone());
    let mut tally = comments.open_tally().await.unwrap();
    racing.arm(json!({"content": "sneaky", "post_id": post.id, "user_id": user_id(&ctx)}));

    assert_eq!(tally.track(&post.id).await.unwrap(), 1);
    assert!(tally.drain().is_empty());
    assert_eq!(tally.count(&post.id), 1);
    assert_eq!(backend.snapshot(Table::Comments).len(), 1);
}

#[tokio::test]
async fn anonymous_and_blank_comments_are_rejected() {
    let backend = MemoryBackend::new();
    let (alice, ctx) = member(&backend, "alice").await;
    let post = alice.posts().create("post", &ctx).await.unwrap();

    let anonymous = alice
        .comments()
        .create(&post.id, "hi", &SessionContext::anonymous())
        .await;
    assert!(matches!(anonymous, Err(FeedError::Unauthorized { .. })));
    let blank = alice.comments().create(&post.id, "   ", &ctx).await;
    assert!(matches!(blank, Err(FeedError::Validation(_))));
    assert_eq!(alice.comments().count(&post.id).await.unwrap(), 0);
}
