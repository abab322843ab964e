//! Post repository and live feeds.

use std::{collections::HashMap, sync::Arc};

use serde_json::json;
use tokio::sync::broadcast;

use crate::{
    backend::{
        ChangeEvent, ChangeKind, ChannelSpec, DataBackend, Filter, Query, SortOrder, Subscription, Table,
        decode_row, decode_rows, encode_row,
    },
    errors::{BackendError, FeedError, require_text},
    profiles::ProfileStore,
    reducer::{ListEvent, ListState, LoadState, Placement},
    session::SessionContext,
    types::{NewPost, Post, PostAuthor, PostRow},
};

const EDIT_CAPACITY: usize = 64;

/// Which posts a feed shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    ByUser(String),
}

impl Scope {
    fn query(&self) -> Query {
        let query = Query::from(Table::Posts).order("created_at", SortOrder::Desc);
        match self {
            Scope::Global => query,
            Scope::ByUser(user_id) => query.eq("user_id", user_id.as_str()),
        }
    }

    fn channel(&self) -> ChannelSpec {
        match self {
            Scope::Global => ChannelSpec::table(Table::Posts),
            Scope::ByUser(user_id) => ChannelSpec::filtered(Table::Posts, Filter::eq("user_id", user_id.as_str())),
        }
    }
}

/// A successful mutation made through this client, replayed into every open feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEdit {
    Removed { post_id: String },
    ContentChanged { post_id: String, content: String },
}

/// What a feed did with one delivered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    Inserted(String),
    Updated(String),
    Removed(String),
    /// The event could not be applied (author lookup or decoding failed).
    Dropped { post_id: Option<String>, reason: String },
    /// Duplicate, out of scope, or already applied.
    Ignored,
    /// The change channel is gone.
    Closed,
}

pub struct PostRepository<B> {
    backend: Arc<B>,
    profiles: ProfileStore<B>,
    edits: broadcast::Sender<LocalEdit>,
}

impl<B> Clone for PostRepository<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            profiles: self.profiles.clone(),
            edits: self.edits.clone(),
        }
    }
}

impl<B: DataBackend> PostRepository<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let (edits, _) = broadcast::channel(EDIT_CAPACITY);
        Self {
            profiles: ProfileStore::new(Arc::clone(&backend)),
            backend,
            edits,
        }
    }

    async fn author(&self, user_id: &str) -> Result<PostAuthor, FeedError> {
        self.profiles.get(user_id).await.map(PostAuthor::from)
    }

    /// Attaches author fields, looking each distinct author up once.
    async fn join_authors(&self, rows: Vec<PostRow>) -> Result<Vec<Post>, FeedError> {
        let mut authors: HashMap<String, Option<PostAuthor>> = HashMap::new();
        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            if !authors.contains_key(&row.user_id) {
                let author = match self.author(&row.user_id).await {
                    Ok(author) => Some(author),
                    Err(FeedError::NotFound { .. }) => None,
                    Err(err) => return Err(err),
                };
                authors.insert(row.user_id.clone(), author);
            }
            let author = authors.get(&row.user_id).cloned().flatten();
            match author {
                Some(author) => posts.push(Post::from_row(row, author)),
                None => log::warn!("post {} has no author profile, skipping", row.id),
            }
        }
        Ok(posts)
    }

    /// Posts in scope, newest first.
    pub async fn list(&self, scope: &Scope) -> Result<Vec<Post>, FeedError> {
        let rows = self.backend.select(None, &scope.query()).await?;
        self.join_authors(decode_rows(rows)?).await
    }

    pub async fn get(&self, post_id: &str) -> Result<Post, FeedError> {
        let query = Query::from(Table::Posts).eq("id", post_id);
        let row: PostRow = match self.backend.single(None, &query).await {
            Ok(row) => decode_row(row)?,
            Err(BackendError::NotSingle { found: 0, .. }) => return Err(FeedError::not_found("post", post_id)),
            Err(err) => return Err(err.into()),
        };
        let author = self.author(&row.user_id).await?;
        Ok(Post::from_row(row, author))
    }

    pub async fn create(&self, content: &str, ctx: &SessionContext) -> Result<Post, FeedError> {
        let session = ctx.require("create post")?;
        let content = require_text("content", content)?;
        let row = encode_row(&NewPost {
            content: &content,
            user_id: &session.user.id,
        })?;
        let created: PostRow = decode_row(self.backend.insert(Some(session), Table::Posts, row).await?)?;
        log::debug!("created post {}", created.id);
        let author = self.author(&created.user_id).await?;
        Ok(Post::from_row(created, author))
    }

    /// Replaces a post's content. The backend rejects non-owners.
    pub async fn update(&self, post_id: &str, content: &str, ctx: &SessionContext) -> Result<Post, FeedError> {
        let session = ctx.require("update post")?;
        let content = require_text("content", content)?;
        let query = Query::from(Table::Posts).eq("id", post_id);
        let mut updated = self
            .backend
            .update(Some(session), &query, json!({ "content": content }))
            .await?;
        if updated.is_empty() {
            return Err(FeedError::not_found("post", post_id));
        }
        let row: PostRow = decode_row(updated.remove(0))?;
        self.broadcast(LocalEdit::ContentChanged {
            post_id: row.id.clone(),
            content: row.content.clone(),
        });
        let author = self.author(&row.user_id).await?;
        Ok(Post::from_row(row, author))
    }

    /// Deletes a post (and, at the backend, its comments and likes).
    pub async fn delete(&self, post_id: &str, ctx: &SessionContext) -> Result<(), FeedError> {
        let session = ctx.require("delete post")?;
        let query = Query::from(Table::Posts).eq("id", post_id);
        let removed = self.backend.delete(Some(session), &query).await?;
        if removed.is_empty() {
            return Err(FeedError::not_found("post", post_id));
        }
        log::debug!("deleted post {post_id}");
        self.broadcast(LocalEdit::Removed {
            post_id: post_id.to_string(),
        });
        Ok(())
    }

    fn broadcast(&self, edit: LocalEdit) {
        // Nobody listening just means no feed is open.
        let _ = self.edits.send(edit);
    }

    /// Opens a live feed: subscribes first so nothing committed during the
    /// initial fetch is missed, then loads.
    ///
    /// A failed fetch leaves the feed open in [`LoadState::Failed`].
    pub async fn open_feed(&self, scope: Scope) -> Result<FeedView<B>, FeedError> {
        let subscription = self.backend.subscribe(scope.channel()).await?;
        let mut view = FeedView {
            repo: self.clone(),
            edits: self.edits.subscribe(),
            scope,
            state: ListState::new(Placement::Front),
            load_state: LoadState::Loading,
            subscription: Some(subscription),
        };
        if let Err(err) = view.reload().await {
            log::warn!("error fetching posts: {err}");
        }
        Ok(view)
    }
}

/// Ordered, live list of posts for one scope.
pub struct FeedView<B> {
    repo: PostRepository<B>,
    scope: Scope,
    state: ListState<Post>,
    load_state: LoadState,
    subscription: Option<Subscription>,
    edits: broadcast::Receiver<LocalEdit>,
}

impl<B: DataBackend> FeedView<B> {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn posts(&self) -> &[Post] {
        self.state.items()
    }

    pub fn post(&self, post_id: &str) -> Option<&Post> {
        self.state.get(post_id)
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// Refetches the whole scope. On failure the current items are kept and
    /// the load state records the error.
    pub async fn reload(&mut self) -> Result<(), FeedError> {
        self.load_state = LoadState::Loading;
        match self.repo.list(&self.scope).await {
            Ok(posts) => {
                self.state.reset(posts);
                self.load_state = LoadState::Ready;
                Ok(())
            }
            Err(err) => {
                self.load_state = LoadState::Failed {
                    message: err.to_string(),
                };
                Err(err)
            }
        }
    }

    /// Waits for the next change or local edit and applies it.
    pub async fn next_event(&mut self) -> FeedUpdate {
        let Some(subscription) = self.subscription.as_mut() else {
            return FeedUpdate::Closed;
        };
        tokio::select! {
            change = subscription.recv() => match change {
                Some(event) => self.apply_change(event).await,
                None => {
                    self.subscription = None;
                    FeedUpdate::Closed
                }
            },
            edit = self.edits.recv() => match edit {
                Ok(edit) => self.apply_edit(edit),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("feed lagged behind local edits, skipped {skipped}");
                    FeedUpdate::Ignored
                }
                Err(broadcast::error::RecvError::Closed) => FeedUpdate::Ignored,
            },
        }
    }

    /// Applies everything already delivered without waiting.
    pub async fn drain(&mut self) -> Vec<FeedUpdate> {
        let mut updates = Vec::new();
        while let Ok(edit) = self.edits.try_recv() {
            updates.push(self.apply_edit(edit));
        }
        while let Some(event) = self.subscription.as_mut().and_then(Subscription::try_recv) {
            updates.push(self.apply_change(event).await);
        }
        updates
    }

    fn apply_edit(&mut self, edit: LocalEdit) -> FeedUpdate {
        match edit {
            LocalEdit::Removed { post_id } => self.remove(post_id),
            LocalEdit::ContentChanged { post_id, content } => self.replace_content(post_id, content),
        }
    }

    async fn apply_change(&mut self, event: ChangeEvent) -> FeedUpdate {
        match event.kind {
            ChangeKind::Insert => self.insert_from(&event).await,
            ChangeKind::Update => match event.decode_new::<PostRow>() {
                Ok(row) => self.replace_content(row.id, row.content),
                Err(err) => dropped(event.row_id(), err),
            },
            ChangeKind::Delete => match event.row_id() {
                Some(post_id) => self.remove(post_id.to_string()),
                None => dropped(None, BackendError::decode("delete event without id")),
            },
        }
    }

    async fn insert_from(&mut self, event: &ChangeEvent) -> FeedUpdate {
        let row: PostRow = match event.decode_new() {
            Ok(row) => row,
            Err(err) => return dropped(event.row_id(), err),
        };
        if self.state.contains(&row.id) {
            return FeedUpdate::Ignored;
        }
        let author = match self.repo.author(&row.user_id).await {
            Ok(author) => author,
            Err(err) => return dropped(Some(row.id.as_str()), err),
        };
        let post_id = row.id.clone();
        if self.state.apply(ListEvent::Inserted(Post::from_row(row, author))) {
            log::debug!("feed gained post {post_id}");
            FeedUpdate::Inserted(post_id)
        } else {
            FeedUpdate::Ignored
        }
    }

    fn replace_content(&mut self, post_id: String, content: String) -> FeedUpdate {
        let Some(current) = self.state.get(&post_id) else {
            return FeedUpdate::Ignored;
        };
        if current.content == content {
            return FeedUpdate::Ignored;
        }
        let mut post = current.clone();
        post.content = content;
        self.state.apply(ListEvent::Replaced(post));
        FeedUpdate::Updated(post_id)
    }

    fn remove(&mut self, post_id: String) -> FeedUpdate {
        if self.state.apply(ListEvent::Removed(post_id.clone())) {
            FeedUpdate::Removed(post_id)
        } else {
            FeedUpdate::Ignored
        }
    }

    /// Applies a renamed author to every post of theirs in the feed.
    pub fn apply_author(&mut self, user_id: &str, author: &PostAuthor) -> usize {
        let renamed: Vec<Post> = self
            .state
            .items()
            .iter()
            .filter(|post| post.user_id == user_id && post.user != *author)
            .map(|post| Post {
                user: author.clone(),
                ..post.clone()
            })
            .collect();
        let count = renamed.len();
        for post in renamed {
            self.state.apply(ListEvent::Replaced(post));
        }
        count
    }

    /// Tears down the change channel.
    pub fn close(mut self) -> Vec<Post> {
        self.subscription = None;
        self.state.into_items()
    }
}

fn dropped(post_id: Option<&str>, err: impl std::fmt::Display) -> FeedUpdate {
    log::warn!("dropping post change event: {err}");
    FeedUpdate::Dropped {
        post_id: post_id.map(str::to_string),
        reason: err.to_string(),
    }
}
