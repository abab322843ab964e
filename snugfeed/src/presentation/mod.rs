//! Feed and item presentation.
//!
//! [`FeedScreen`] composes a live [`FeedView`] with per-post like state, a
//! comment tally shared by every item and open comment threads. User
//! [`Intent`]s are routed to the repositories.

pub mod render;
pub mod route;

pub use self::route::{Page, Resolution, Route, resolve};

use std::collections::HashMap;

use crate::{
    backend::{Backend, DataBackend},
    client::Client,
    comments::{CommentTally, CommentThread},
    errors::FeedError,
    likes::{LikeAggregator, LikeState, ToggleOutcome},
    posts::{FeedUpdate, FeedView, Scope},
    reducer::LoadState,
    session::SessionContext,
    types::{Comment, Post, PostAuthor, Profile},
};

/// One post as displayed, with its counters and local UI state.
#[derive(Debug)]
pub struct PostItem {
    pub post: Post,
    pub likes: LikeState,
    pub is_owner: bool,
    pub comments_open: bool,
    /// Draft text while the edit dialog is open.
    pub draft: Option<String>,
    comment_count: u64,
}

impl PostItem {
    pub fn new(post: Post, ctx: &SessionContext) -> Self {
        Self {
            is_owner: post.is_owned_by(ctx.user_id()),
            likes: LikeState::new(post.id.clone(), 0, false),
            post,
            comments_open: false,
            draft: None,
            comment_count: 0,
        }
    }

    /// Refreshes like state and the comment count from authoritative aggregates.
    pub async fn mount<B: DataBackend>(
        &mut self,
        likes: &LikeAggregator<B>,
        comments: &mut CommentTally<B>,
        ctx: &SessionContext,
    ) -> Result<(), FeedError> {
        self.is_owner = self.post.is_owned_by(ctx.user_id());
        likes.refresh(&mut self.likes, ctx).await?;
        self.comment_count = comments.track(&self.post.id).await?;
        Ok(())
    }

    pub fn comment_count(&self) -> u64 {
        self.comment_count
    }
}

/// User action on the feed screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SubmitPost { content: String },
    EditPost { post_id: String, content: String },
    DeletePost { post_id: String },
    ToggleLike { post_id: String },
    ToggleComments { post_id: String },
    OpenEditor { post_id: String },
    CloseEditor { post_id: String },
    SubmitComment { post_id: String, content: String },
    DeleteComment { post_id: String, comment_id: String },
    RenameProfile { user_name: String },
    SignOut,
}

/// Result of a dispatched intent.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    PostCreated(Post),
    PostUpdated(Post),
    PostDeleted(String),
    LikeToggled {
        post_id: String,
        outcome: ToggleOutcome,
        liked: bool,
        count: u64,
    },
    CommentsToggled { post_id: String, open: bool },
    EditorOpened { post_id: String, draft: String },
    EditorClosed { post_id: String },
    CommentCreated(Comment),
    CommentDeleted { post_id: String, comment_id: String },
    ProfileRenamed(Profile),
    SignedOut,
}

fn item_mut<'a>(items: &'a mut [PostItem], post_id: &str) -> Result<&'a mut PostItem, FeedError> {
    items
        .iter_mut()
        .find(|item| item.post.id == post_id)
        .ok_or_else(|| FeedError::not_found("post", post_id))
}

/// A feed page: live posts plus everything each item shows.
pub struct FeedScreen<B> {
    client: Client<B>,
    ctx: SessionContext,
    feed: FeedView<B>,
    tally: CommentTally<B>,
    items: Vec<PostItem>,
    threads: HashMap<String, CommentThread<B>>,
}

impl<B: Backend> FeedScreen<B> {
    /// Resolves the session, opens the feed and mounts every item.
    pub async fn open(client: Client<B>, scope: Scope) -> Result<Self, FeedError> {
        let ctx = client.session().resolve().await;
        let feed = client.posts().open_feed(scope).await?;
        let tally = client.comments().open_tally().await?;
        let mut screen = Self {
            client,
            ctx,
            feed,
            tally,
            items: Vec::new(),
            threads: HashMap::new(),
        };
        screen.reconcile().await;
        Ok(screen)
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn items(&self) -> &[PostItem] {
        &self.items
    }

    pub fn item(&self, post_id: &str) -> Option<&PostItem> {
        self.items.iter().find(|item| item.post.id == post_id)
    }

    pub fn thread(&self, post_id: &str) -> Option<&CommentThread<B>> {
        self.threads.get(post_id)
    }

    pub fn load_state(&self) -> &LoadState {
        self.feed.load_state()
    }

    pub fn scope(&self) -> &Scope {
        self.feed.scope()
    }

    /// Switches the acting user and remounts every item.
    pub async fn set_context(&mut self, ctx: SessionContext) {
        self.ctx = ctx;
        for item in &mut self.items {
            if let Err(err) = item.mount(self.client.likes(), &mut self.tally, &self.ctx).await {
                log::warn!("error refreshing post {}: {err}", item.post.id);
            }
        }
    }

    pub async fn reload(&mut self) -> Result<(), FeedError> {
        self.feed.reload().await?;
        self.reconcile().await;
        Ok(())
    }

    /// Applies every delivered change and brings items, counters and threads up to date.
    pub async fn sync(&mut self) -> Vec<FeedUpdate> {
        let updates = self.feed.drain().await;
        self.reconcile().await;
        for thread in self.threads.values_mut() {
            thread.drain().await;
        }
        updates
    }

    /// Waits for the next feed change, then syncs.
    pub async fn next_update(&mut self) -> FeedUpdate {
        let update = self.feed.next_event().await;
        self.sync().await;
        update
    }

    /// Rebuilds the item list in feed order, mounting new posts and dropping removed ones.
    async fn reconcile(&mut self) {
        let mut existing: HashMap<String, PostItem> = self
            .items
            .drain(..)
            .map(|item| (item.post.id.clone(), item))
            .collect();
        self.tally.drain();
        let mut items = Vec::with_capacity(self.feed.posts().len());
        for post in self.feed.posts() {
            let item = match existing.remove(&post.id) {
                Some(mut item) => {
                    item.post = post.clone();
                    item.comment_count = self.tally.count(&post.id);
                    item
                }
                None => {
                    let mut item = PostItem::new(post.clone(), &self.ctx);
                    if let Err(err) = item.mount(self.client.likes(), &mut self.tally, &self.ctx).await {
                        log::warn!("error mounting post {}: {err}", post.id);
                    }
                    item
                }
            };
            items.push(item);
        }
        for post_id in existing.keys() {
            self.threads.remove(post_id);
            self.tally.untrack(post_id);
        }
        self.items = items;
    }

    pub async fn dispatch(&mut self, intent: Intent) -> Result<IntentOutcome, FeedError> {
        log::debug!("dispatching {intent:?}");
        match intent {
            Intent::SubmitPost { content } => {
                let post = self.client.posts().create(&content, &self.ctx).await?;
                self.sync().await;
                Ok(IntentOutcome::PostCreated(post))
            }
            Intent::EditPost { post_id, content } => {
                let post = self.client.posts().update(&post_id, &content, &self.ctx).await?;
                if let Ok(item) = item_mut(&mut self.items, &post_id) {
                    item.draft = None;
                }
                self.sync().await;
                Ok(IntentOutcome::PostUpdated(post))
            }
            Intent::DeletePost { post_id } => {
                self.client.posts().delete(&post_id, &self.ctx).await?;
                self.sync().await;
                Ok(IntentOutcome::PostDeleted(post_id))
            }
            Intent::ToggleLike { post_id } => {
                let item = item_mut(&mut self.items, &post_id)?;
                let outcome = self.client.likes().toggle(&mut item.likes, &self.ctx).await?;
                Ok(IntentOutcome::LikeToggled {
                    liked: item.likes.is_liked(),
                    count: item.likes.count(),
                    post_id,
                    outcome,
                })
            }
            Intent::ToggleComments { post_id } => {
                let item = item_mut(&mut self.items, &post_id)?;
                item.comments_open = !item.comments_open;
                let open = item.comments_open;
                if open {
                    let thread = self.client.comments().open_thread(&post_id).await?;
                    self.threads.insert(post_id.clone(), thread);
                } else {
                    self.threads.remove(&post_id);
                }
                Ok(IntentOutcome::CommentsToggled { post_id, open })
            }
            Intent::OpenEditor { post_id } => {
                let item = item_mut(&mut self.items, &post_id)?;
                if !item.is_owner {
                    return Err(FeedError::unauthorized("edit another user's post"));
                }
                let draft = item.post.content.clone();
                item.draft = Some(draft.clone());
                Ok(IntentOutcome::EditorOpened { post_id, draft })
            }
            Intent::CloseEditor { post_id } => {
                item_mut(&mut self.items, &post_id)?.draft = None;
                Ok(IntentOutcome::EditorClosed { post_id })
            }
            Intent::SubmitComment { post_id, content } => {
                let comment = self.client.comments().create(&post_id, &content, &self.ctx).await?;
                self.sync().await;
                Ok(IntentOutcome::CommentCreated(comment))
            }
            Intent::DeleteComment { post_id, comment_id } => {
                match self.threads.get_mut(&post_id) {
                    Some(thread) => thread.delete_comment(&comment_id, &self.ctx).await?,
                    None => self.client.comments().delete(&comment_id, &self.ctx).await?,
                }
                self.sync().await;
                Ok(IntentOutcome::CommentDeleted { post_id, comment_id })
            }
            Intent::RenameProfile { user_name } => {
                let user_id = self.ctx.require("update profile")?.user.id.clone();
                let profile = self.client.profiles().update(&user_id, &user_name, &self.ctx).await?;
                self.feed.apply_author(&user_id, &PostAuthor::from(profile.clone()));
                self.reconcile().await;
                self.client.session().notify_user_updated(profile.clone());
                Ok(IntentOutcome::ProfileRenamed(profile))
            }
            Intent::SignOut => {
                self.client.session().sign_out().await;
                self.ctx = SessionContext::anonymous();
                self.threads.clear();
                for item in &mut self.items {
                    item.is_owner = false;
                    item.comments_open = false;
                    item.draft = None;
                    item.likes = LikeState::new(item.post.id.clone(), item.likes.count(), false);
                }
                Ok(IntentOutcome::SignedOut)
            }
        }
    }
}
