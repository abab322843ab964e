//! Comment repository, live threads and per-post comment counters.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde_json::Value;

use crate::{
    backend::{
        ChangeEvent, ChangeKind, ChannelSpec, DataBackend, Filter, Query, SortOrder, Subscription, Table,
        decode_row, decode_rows, encode_row,
    },
    errors::{FeedError, require_text},
    profiles::ProfileStore,
    reducer::{ListEvent, ListState, LoadState, Placement},
    session::SessionContext,
    types::{Comment, CommentAuthor, CommentRow, NewComment},
};

fn post_channel(post_id: &str) -> ChannelSpec {
    ChannelSpec::filtered(Table::Comments, Filter::eq("post_id", post_id))
}

pub struct CommentRepository<B> {
    backend: Arc<B>,
    profiles: ProfileStore<B>,
}

impl<B> Clone for CommentRepository<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            profiles: self.profiles.clone(),
        }
    }
}

impl<B: DataBackend> CommentRepository<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            profiles: ProfileStore::new(Arc::clone(&backend)),
            backend,
        }
    }

    async fn author(&self, user_id: &str) -> Result<CommentAuthor, FeedError> {
        self.profiles.get(user_id).await.map(CommentAuthor::from)
    }

    /// Comments on a post, oldest first.
    pub async fn list(&self, post_id: &str) -> Result<Vec<Comment>, FeedError> {
        let query = Query::from(Table::Comments)
            .eq("post_id", post_id)
            .order("created_at", SortOrder::Asc);
        let rows: Vec<CommentRow> = decode_rows(self.backend.select(None, &query).await?)?;

        let mut authors: HashMap<String, CommentAuthor> = HashMap::new();
        let mut comments = Vec::with_capacity(rows.len());
        for row in rows {
            if !authors.contains_key(&row.user_id) {
                match self.author(&row.user_id).await {
                    Ok(author) => {
                        authors.insert(row.user_id.clone(), author);
                    }
                    Err(FeedError::NotFound { .. }) => {
                        log::warn!("comment {} has no author profile, skipping", row.id);
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }
            if let Some(author) = authors.get(&row.user_id).cloned() {
                comments.push(Comment::from_row(row, author));
            }
        }
        Ok(comments)
    }

    pub async fn create(&self, post_id: &str, content: &str, ctx: &SessionContext) -> Result<Comment, FeedError> {
        let session = ctx.require("create comment")?;
        let content = require_text("content", content)?;
        let row = encode_row(&NewComment {
            content: &content,
            post_id,
            user_id: &session.user.id,
        })?;
        let created: CommentRow = decode_row(self.backend.insert(Some(session), Table::Comments, row).await?)?;
        log::debug!("created comment {} on post {post_id}", created.id);
        let author = self.author(&created.user_id).await?;
        Ok(Comment::from_row(created, author))
    }

    pub async fn delete(&self, comment_id: &str, ctx: &SessionContext) -> Result<(), FeedError> {
        let session = ctx.require("delete comment")?;
        let query = Query::from(Table::Comments).eq("id", comment_id);
        let removed = self.backend.delete(Some(session), &query).await?;
        if removed.is_empty() {
            return Err(FeedError::not_found("comment", comment_id));
        }
        log::debug!("deleted comment {comment_id}");
        Ok(())
    }

    pub async fn count(&self, post_id: &str) -> Result<u64, FeedError> {
        let query = Query::from(Table::Comments).eq("post_id", post_id);
        Ok(self.backend.count(None, &query).await?)
    }

    /// Subscribes to the post's comments, then loads them.
    pub async fn open_thread(&self, post_id: &str) -> Result<CommentThread<B>, FeedError> {
        let subscription = self.backend.subscribe(post_channel(post_id)).await?;
        let mut thread = CommentThread {
            repo: self.clone(),
            post_id: post_id.to_string(),
            state: ListState::new(Placement::Back),
            load_state: LoadState::Loading,
            subscription: Some(subscription),
        };
        if let Err(err) = thread.reload().await {
            log::warn!("error fetching comments: {err}");
        }
        Ok(thread)
    }

    /// Opens one channel over every comment; posts are counted once [`CommentTally::track`]ed.
    pub async fn open_tally(&self) -> Result<CommentTally<B>, FeedError> {
        let subscription = self.backend.subscribe(ChannelSpec::table(Table::Comments)).await?;
        Ok(CommentTally {
            repo: self.clone(),
            counted: HashMap::new(),
            subscription: Some(subscription),
        })
    }

    /// Ids of the comments currently stored for a post.
    async fn comment_ids(&self, post_id: &str) -> Result<HashSet<String>, FeedError> {
        let query = Query::from(Table::Comments).eq("post_id", post_id);
        let rows: Vec<CommentRow> = decode_rows(self.backend.select(None, &query).await?)?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }
}

/// What a thread did with one delivered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadUpdate {
    Appended(String),
    Removed(String),
    Dropped { comment_id: Option<String>, reason: String },
    Ignored,
    Closed,
}

/// Ordered, live list of one post's comments.
pub struct CommentThread<B> {
    repo: CommentRepository<B>,
    post_id: String,
    state: ListState<Comment>,
    load_state: LoadState,
    subscription: Option<Subscription>,
}

impl<B: DataBackend> CommentThread<B> {
    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn comments(&self) -> &[Comment] {
        self.state.items()
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub async fn reload(&mut self) -> Result<(), FeedError> {
        self.load_state = LoadState::Loading;
        match self.repo.list(&self.post_id).await {
            Ok(comments) => {
                self.state.reset(comments);
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

    pub async fn next_event(&mut self) -> ThreadUpdate {
        let Some(subscription) = self.subscription.as_mut() else {
            return ThreadUpdate::Closed;
        };
        match subscription.recv().await {
            Some(event) => self.apply(event).await,
            None => {
                self.subscription = None;
                ThreadUpdate::Closed
            }
        }
    }

    pub async fn drain(&mut self) -> Vec<ThreadUpdate> {
        let mut updates = Vec::new();
        while let Some(event) = self.subscription.as_mut().and_then(Subscription::try_recv) {
            updates.push(self.apply(event).await);
        }
        updates
    }

    /// Deletes one of the actor's comments and removes it locally right away.
    pub async fn delete_comment(&mut self, comment_id: &str, ctx: &SessionContext) -> Result<(), FeedError> {
        self.repo.delete(comment_id, ctx).await?;
        self.state.apply(ListEvent::Removed(comment_id.to_string()));
        Ok(())
    }

    async fn apply(&mut self, event: ChangeEvent) -> ThreadUpdate {
        match event.kind {
            ChangeKind::Insert => self.append_from(&event).await,
            ChangeKind::Delete => match event.row_id() {
                Some(comment_id) if self.state.apply(ListEvent::Removed(comment_id.to_string())) => {
                    ThreadUpdate::Removed(comment_id.to_string())
                }
                _ => ThreadUpdate::Ignored,
            },
            // Comments are immutable once written.
            ChangeKind::Update => ThreadUpdate::Ignored,
        }
    }

    async fn append_from(&mut self, event: &ChangeEvent) -> ThreadUpdate {
        let row: CommentRow = match event.decode_new() {
            Ok(row) => row,
            Err(err) => return dropped(event.row_id(), err),
        };
        if self.state.contains(&row.id) {
            return ThreadUpdate::Ignored;
        }
        let author = match self.repo.author(&row.user_id).await {
            Ok(author) => author,
            Err(err) => return dropped(Some(row.id.as_str()), err),
        };
        let comment_id = row.id.clone();
        if self.state.apply(ListEvent::Inserted(Comment::from_row(row, author))) {
            ThreadUpdate::Appended(comment_id)
        } else {
            ThreadUpdate::Ignored
        }
    }

    pub fn close(mut self) -> Vec<Comment> {
        self.subscription = None;
        self.state.into_items()
    }
}

fn dropped(comment_id: Option<&str>, err: impl std::fmt::Display) -> ThreadUpdate {
    log::warn!("dropping comment change event: {err}");
    ThreadUpdate::Dropped {
        comment_id: comment_id.map(str::to_string),
        reason: err.to_string(),
    }
}

/// Live comment counts for a set of posts, fed by a single channel.
///
/// Each tracked post keeps the ids of its counted comments, so an insert
/// that was already part of the initial fetch is not counted twice.
pub struct CommentTally<B> {
    repo: CommentRepository<B>,
    counted: HashMap<String, HashSet<String>>,
    subscription: Option<Subscription>,
}

impl<B: DataBackend> CommentTally<B> {
    /// Starts counting a post's comments (or refetches them); returns the count.
    pub async fn track(&mut self, post_id: &str) -> Result<u64, FeedError> {
        let ids = self.repo.comment_ids(post_id).await?;
        let count = ids.len() as u64;
        self.counted.insert(post_id.to_string(), ids);
        Ok(count)
    }

    pub fn untrack(&mut self, post_id: &str) {
        self.counted.remove(post_id);
    }

    pub fn is_tracked(&self, post_id: &str) -> bool {
        self.counted.contains_key(post_id)
    }

    /// Current count; zero for posts that are not tracked.
    pub fn count(&self, post_id: &str) -> u64 {
        self.counted.get(post_id).map_or(0, |ids| ids.len() as u64)
    }

    /// Applies one event; returns the post whose count changed.
    fn apply(&mut self, event: &ChangeEvent) -> Option<String> {
        let row = event.row()?;
        let post_id = row.get("post_id").and_then(Value::as_str)?;
        let comment_id = event.row_id()?;
        let ids = self.counted.get_mut(post_id)?;
        let changed = match event.kind {
            ChangeKind::Insert => ids.insert(comment_id.to_string()),
            ChangeKind::Delete => ids.remove(comment_id),
            ChangeKind::Update => false,
        };
        changed.then(|| post_id.to_string())
    }

    /// Applies delivered events; returns the posts whose count changed.
    pub fn drain(&mut self) -> Vec<String> {
        let mut changed = Vec::new();
        while let Some(event) = self.subscription.as_mut().and_then(Subscription::try_recv) {
            if let Some(post_id) = self.apply(&event)
                && !changed.contains(&post_id)
            {
                changed.push(post_id);
            }
        }
        changed
    }

    /// Waits for one event; `Some(None)` when it changed nothing, `None` once the channel is closed.
    pub async fn next_event(&mut self) -> Option<Option<String>> {
        let event = self.subscription.as_mut()?.recv().await;
        match event {
            Some(event) => Some(self.apply(&event)),
            None => {
                self.subscription = None;
                None
            }
        }
    }
}
