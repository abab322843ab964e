use super::support::*;

#[tokio::test]
async fn two_toggles_restore_state_from_either_side() {
    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    let (bob, bob_ctx) = member(&backend, "bob").await;
    let post = alice.posts().create("likeable", &alice_ctx).await.unwrap();

    // Alice's like is already counted before Bob starts toggling.
    let mut hers = alice.likes().load(&post.id, &alice_ctx).await.unwrap();
    alice.likes().toggle(&mut hers, &alice_ctx).await.unwrap();

    let mut his = bob.likes().load(&post.id, &bob_ctx).await.unwrap();
    let original = (his.is_liked(), his.count());
    assert_eq!(original, (false, 1));
    bob.likes().toggle(&mut his, &bob_ctx).await.unwrap();
    assert_eq!((his.is_liked(), his.count()), (true, 2));
    bob.likes().toggle(&mut his, &bob_ctx).await.unwrap();
    assert_eq!((his.is_liked(), his.count()), original);

    let original = (hers.is_liked(), hers.count());
    alice.likes().toggle(&mut hers, &alice_ctx).await.unwrap();
    alice.likes().toggle(&mut hers, &alice_ctx).await.unwrap();
    assert_eq!((hers.is_liked(), hers.count()), original);
    assert!(!hers.is_pending());
}

#[tokio::test]
async fn anonymous_toggle_is_rejected_without_touching_state() {
    let backend = MemoryBackend::new();
    let (alice, ctx) = member(&backend, "alice").await;
    let post = alice.posts().create("look", &ctx).await.unwrap();
    let anonymous = SessionContext::anonymous();

    let mut state = alice.likes().load(&post.id, &anonymous).await.unwrap();
    let before = state.clone();
    let denied = alice.likes().toggle(&mut state, &anonymous).await;
    assert!(matches!(denied, Err(FeedError::Unauthorized { .. })));
    assert_eq!(state, before);
}

#[tokio::test]
async fn duplicate_like_settles_as_already_liked() {
    let memory = MemoryBackend::new();
    let (alice, alice_ctx) = member(&memory, "alice").await;
    let (bob, bob_ctx) = member(&memory, "bob").await;
    let post = alice.posts().create("race", &alice_ctx).await.unwrap();

    // Bob's like lands from another device first.
    let mut elsewhere = bob.likes().load(&post.id, &bob_ctx).await.unwrap();
    bob.likes().toggle(&mut elsewhere, &bob_ctx).await.unwrap();

    let skewed = Arc::new(SkewedBackend::new(memory.clone()));
    skewed.hide_likes.store(true, Ordering::SeqCst);
    let likes = LikeAggregator::new(Arc::clone(&skewed));
    let mut state = likes.load(&post.id, &bob_ctx).await.unwrap();
    assert_eq!((state.is_liked(), state.count()), (false, 0));

    let outcome = likes.toggle(&mut state, &bob_ctx).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::AlreadyLiked);
    assert!(state.is_liked());
    assert!(!state.is_pending());
    assert_eq!(state.count(), 0, "a rejected duplicate adds nothing");
    assert_eq!(memory.snapshot(Table::Likes).len(), 1);

    skewed.hide_likes.store(false, Ordering::SeqCst);
    likes.refresh(&mut state, &bob_ctx).await.unwrap();
    assert_eq!((state.is_liked(), state.count()), (true, 1));
}

#[tokio::test]
async fn unliking_a_vanished_like_settles_as_already_unliked() {
    let memory = MemoryBackend::new();
    let (alice, ctx) = member(&memory, "alice").await;
    let post = alice.posts().create("gone", &ctx).await.unwrap();

    let skewed = Arc::new(SkewedBackend::new(memory.clone()));
    skewed.phantom_like.store(true, Ordering::SeqCst);
    let likes = LikeAggregator::new(Arc::clone(&skewed));
    let mut state = LikeState::new(post.id.clone(), 1, true);

    let outcome = likes.toggle(&mut state, &ctx).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::AlreadyUnliked);
    assert!(!state.is_liked());
    assert!(!state.is_pending());
    assert_eq!(state.count(), 1, "nothing was removed, so nothing is subtracted");
}

#[tokio::test]
async fn rejected_write_rolls_the_overlay_back() {
    let memory = MemoryBackend::new();
    let (alice, ctx) = member(&memory, "alice").await;
    let post = alice.posts().create("flaky", &ctx).await.unwrap();

    let skewed = Arc::new(SkewedBackend::new(memory.clone()));
    let likes = LikeAggregator::new(Arc::clone(&skewed));
    let mut state = likes.load(&post.id, &ctx).await.unwrap();

    skewed.fail_writes.store(true, Ordering::SeqCst);
    let err = likes.toggle(&mut state, &ctx).await.unwrap_err();
    assert!(err.is_retryable(), "got {err:?}");
    assert_eq!((state.is_liked(), state.count()), (false, 0));
    assert!(!state.is_pending());
    assert!(memory.snapshot(Table::Likes).is_empty());

    skewed.fail_writes.store(false, Ordering::SeqCst);
    likes.toggle(&mut state, &ctx).await.unwrap();
    assert_eq!((state.is_liked(), state.count()), (true, 1));
}

#[tokio::test]
async fn unreachable_backend_leaves_like_state_untouched() {
    let backend = MemoryBackend::new();
    let (alice, ctx) = member(&backend, "alice").await;
    let post = alice.posts().create("offline", &ctx).await.unwrap();
    let mut state = alice.likes().load(&post.id, &ctx).await.unwrap();
    let before = state.clone();

    backend.set_offline(true);
    let failed = alice.likes().toggle(&mut state, &ctx).await;
    backend.set_offline(false);

    assert!(failed.unwrap_err().is_retryable());
    assert_eq!(state, before);
}
