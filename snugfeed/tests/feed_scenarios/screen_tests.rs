use super::support::*;

#[tokio::test]
async fn screen_routes_every_intent() {
    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    let mut screen = FeedScreen::open(alice.clone(), Scope::Global).await.unwrap();
    assert!(screen.load_state().is_ready());
    assert!(screen.items().is_empty());
    assert_eq!(screen.context().user_id(), alice_ctx.user_id());

    let IntentOutcome::PostCreated(post) = screen
        .dispatch(Intent::SubmitPost { content: "hi".into() })
        .await
        .unwrap()
    else {
        panic!("expected PostCreated");
    };
    let item = screen.item(&post.id).expect("new post is shown");
    assert!(item.is_owner);
    assert_eq!((item.likes.count(), item.comment_count()), (0, 0));

    let liked = screen
        .dispatch(Intent::ToggleLike { post_id: post.id.clone() })
        .await
        .unwrap();
    assert_eq!(
        liked,
        IntentOutcome::LikeToggled {
            post_id: post.id.clone(),
            outcome: ToggleOutcome::Liked,
            liked: true,
            count: 1,
        }
    );

    let opened = screen
        .dispatch(Intent::ToggleComments { post_id: post.id.clone() })
        .await
        .unwrap();
    assert_eq!(opened, IntentOutcome::CommentsToggled { post_id: post.id.clone(), open: true });
    let IntentOutcome::CommentCreated(comment) = screen
        .dispatch(Intent::SubmitComment {
            post_id: post.id.clone(),
            content: "first!".into(),
        })
        .await
        .unwrap()
    else {
        panic!("expected CommentCreated");
    };
    assert_eq!(screen.thread(&post.id).unwrap().comments().len(), 1);
    assert_eq!(screen.item(&post.id).unwrap().comment_count(), 1);

    screen
        .dispatch(Intent::DeleteComment {
            post_id: post.id.clone(),
            comment_id: comment.id.clone(),
        })
        .await
        .unwrap();
    assert!(screen.thread(&post.id).unwrap().comments().is_empty());
    assert_eq!(screen.item(&post.id).unwrap().comment_count(), 0);

    let closed = screen
        .dispatch(Intent::ToggleComments { post_id: post.id.clone() })
        .await
        .unwrap();
    assert_eq!(closed, IntentOutcome::CommentsToggled { post_id: post.id.clone(), open: false });
    assert!(screen.thread(&post.id).is_none());

    let editor = screen
        .dispatch(Intent::OpenEditor { post_id: post.id.clone() })
        .await
        .unwrap();
    assert_eq!(editor, IntentOutcome::EditorOpened { post_id: post.id.clone(), draft: "hi".into() });
    assert_eq!(screen.item(&post.id).unwrap().draft.as_deref(), Some("hi"));
    screen
        .dispatch(Intent::EditPost {
            post_id: post.id.clone(),
            content: "hi there".into(),
        })
        .await
        .unwrap();
    let item = screen.item(&post.id).unwrap();
    assert_eq!(item.post.content, "hi there");
    assert_eq!(item.draft, None);
    assert_eq!(item.likes.count(), 1, "editing keeps the like state");

    screen
        .dispatch(Intent::OpenEditor { post_id: post.id.clone() })
        .await
        .unwrap();
    let closed = screen
        .dispatch(Intent::CloseEditor { post_id: post.id.clone() })
        .await
        .unwrap();
    assert_eq!(closed, IntentOutcome::EditorClosed { post_id: post.id.clone() });
    assert_eq!(screen.item(&post.id).unwrap().draft, None);

    let deleted = screen
        .dispatch(Intent::DeletePost { post_id: post.id.clone() })
        .await
        .unwrap();
    assert_eq!(deleted, IntentOutcome::PostDeleted(post.id.clone()));
    assert!(screen.items().is_empty());
}

#[tokio::test]
async fn screen_denies_foreign_edits_without_changing_items() {
    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    let (bob, _) = member(&backend, "bob").await;
    let post = alice.posts().create("alice's", &alice_ctx).await.unwrap();

    let mut screen = FeedScreen::open(bob, Scope::Global).await.unwrap();
    assert!(!screen.item(&post.id).unwrap().is_owner);

    let editor = screen.dispatch(Intent::OpenEditor { post_id: post.id.clone() }).await;
    assert!(matches!(editor, Err(FeedError::Unauthorized { .. })));
    let edit = screen
        .dispatch(Intent::EditPost {
            post_id: post.id.clone(),
            content: "bob's now".into(),
        })
        .await;
    assert!(matches!(edit, Err(FeedError::Unauthorized { .. })));
    let delete = screen.dispatch(Intent::DeletePost { post_id: post.id.clone() }).await;
    assert!(matches!(delete, Err(FeedError::Unauthorized { .. })));

    assert_eq!(screen.items().len(), 1);
    assert_eq!(screen.item(&post.id).unwrap().post.content, "alice's");
    assert_eq!(screen.item(&post.id).unwrap().draft, None);

    let missing = screen.dispatch(Intent::ToggleLike { post_id: "nope".into() }).await;
    assert!(matches!(missing, Err(FeedError::NotFound { .. })));
}

#[tokio::test]
async fn renaming_updates_authors_and_notifies_watchers() {
    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    alice.posts().create("one", &alice_ctx).await.unwrap();
    alice.posts().create("two", &alice_ctx).await.unwrap();
    let mut watch = alice.session().subscribe();
    let mut screen = FeedScreen::open(alice.clone(), Scope::Global).await.unwrap();

    let renamed = screen
        .dispatch(Intent::RenameProfile { user_name: " Alice B. ".into() })
        .await
        .unwrap();
    let IntentOutcome::ProfileRenamed(profile) = renamed else {
        panic!("expected ProfileRenamed");
    };
    assert_eq!(profile.user_name, "Alice B.");
    assert!(screen.items().iter().all(|item| item.post.user.user_name == "Alice B."));
    assert_eq!(watch.next().await, Some(AuthEvent::UserUpdated(profile.clone())));

    // A later sync must not bring the old name back.
    screen.sync().await;
    assert!(screen.items().iter().all(|item| item.post.user.user_name == "Alice B."));
    assert_eq!(alice.profiles().get(&user_id(&alice_ctx)).await.unwrap(), profile);

    let blank = screen.dispatch(Intent::RenameProfile { user_name: "  ".into() }).await;
    assert!(matches!(blank, Err(FeedError::Validation(_))));
}

#[tokio::test]
async fn signing_out_turns_the_screen_anonymous() {
    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    let post = alice.posts().create("mine", &alice_ctx).await.unwrap();
    let mut screen = FeedScreen::open(alice.clone(), Scope::Global).await.unwrap();
    screen
        .dispatch(Intent::ToggleLike { post_id: post.id.clone() })
        .await
        .unwrap();

    assert_eq!(screen.dispatch(Intent::SignOut).await.unwrap(), IntentOutcome::SignedOut);
    assert!(!screen.context().is_authenticated());
    let item = screen.item(&post.id).unwrap();
    assert!(!item.is_owner);
    assert!(!item.likes.is_liked());
    assert_eq!(item.likes.count(), 1);

    let denied = screen.dispatch(Intent::SubmitPost { content: "ghost".into() }).await;
    assert!(matches!(denied, Err(FeedError::Unauthorized { .. })));
    assert_eq!(screen.items().len(), 1);
}

#[tokio::test]
async fn screens_follow_other_clients_and_release_channels() {
    let backend = MemoryBackend::new();
    let (alice, _) = member(&backend, "alice").await;
    let (bob, bob_ctx) = member(&backend, "bob").await;
    let mut screen = FeedScreen::open(alice, Scope::Global).await.unwrap();

    let post = bob.posts().create("hey alice", &bob_ctx).await.unwrap();
    assert_eq!(screen.next_update().await, FeedUpdate::Inserted(post.id.clone()));
    assert_eq!(screen.items().len(), 1);

    bob.comments().create(&post.id, "me again", &bob_ctx).await.unwrap();
    screen.sync().await;
    assert_eq!(screen.item(&post.id).unwrap().comment_count(), 1);

    let mut likes = bob.likes().load(&post.id, &bob_ctx).await.unwrap();
    bob.likes().toggle(&mut likes, &bob_ctx).await.unwrap();
    screen.reload().await.unwrap();
    assert_eq!(screen.items().len(), 1);

    // One channel for the feed, one shared by every comment count.
    assert_eq!(backend.subscriber_count(), 2);
    bob.posts().create("and another", &bob_ctx).await.unwrap();
    bob.posts().create("and one more", &bob_ctx).await.unwrap();
    screen.sync().await;
    assert_eq!(screen.items().len(), 3);
    assert_eq!(backend.subscriber_count(), 2);
    drop(screen);
    assert_eq!(backend.subscriber_count(), 0);
}

#[tokio::test]
async fn routes_gate_pages_on_the_session() {
    use snugfeed::{Page, Resolution, Route, presentation::resolve};

    let backend = MemoryBackend::new();
    let (alice, alice_ctx) = member(&backend, "alice").await;
    let anonymous = SessionContext::anonymous();
    let profiles = alice.profiles();

    assert_eq!(
        resolve(&Route::Feed, &anonymous, profiles).await,
        Resolution::Redirect(Route::SignIn)
    );
    assert_eq!(
        resolve(&Route::Entry, &alice_ctx, profiles).await,
        Resolution::Redirect(Route::Feed)
    );
    let Resolution::Render(Page::User { profile, is_current_user }) =
        resolve(&Route::User(user_id(&alice_ctx)), &anonymous, profiles).await
    else {
        panic!("profile pages are public");
    };
    assert_eq!(profile.user_name, "alice");
    assert!(!is_current_user);
    assert_eq!(
        resolve(&Route::User("missing".into()), &alice_ctx, profiles).await,
        Resolution::Render(Page::NotFound)
    );

    backend.fail_next(Table::Users, 1);
    let failed = resolve(&Route::User(user_id(&alice_ctx)), &alice_ctx, profiles).await;
    assert!(matches!(failed, Resolution::Render(Page::Unavailable { .. })));
    assert!(matches!(
        resolve(&Route::User(user_id(&alice_ctx)), &alice_ctx, profiles).await,
        Resolution::Render(Page::User { is_current_user: true, .. })
    ));
}
