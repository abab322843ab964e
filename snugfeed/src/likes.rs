//! Like membership and counts.
//!
//! The displayed count is an authoritative aggregate plus an optimistic
//! [`PendingLike`] overlay. A toggle stages the overlay, then commits it when
//! the backend confirms or rolls it back when the write fails.

use std::sync::Arc;

use crate::{
    backend::{DataBackend, Query, Table, encode_row},
    errors::{BackendError, FeedError},
    session::SessionContext,
    types::NewLike,
};

/// Optimistic change not yet confirmed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingLike {
    pub liked: bool,
    pub delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeState {
    pub post_id: String,
    pub base_count: u64,
    pub liked: bool,
    pub pending: Option<PendingLike>,
}

impl LikeState {
    pub fn new(post_id: impl Into<String>, base_count: u64, liked: bool) -> Self {
        Self {
            post_id: post_id.into(),
            base_count,
            liked,
            pending: None,
        }
    }

    /// Count to display: base plus any pending delta, never negative.
    pub fn count(&self) -> u64 {
        let delta = self.pending.map_or(0, |pending| pending.delta);
        self.base_count.saturating_add_signed(delta)
    }

    pub fn is_liked(&self) -> bool {
        self.pending.map_or(self.liked, |pending| pending.liked)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn stage(&mut self, liked: bool) {
        self.pending = Some(PendingLike {
            liked,
            delta: if liked { 1 } else { -1 },
        });
    }

    pub fn commit(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.base_count = self.base_count.saturating_add_signed(pending.delta);
            self.liked = pending.liked;
        }
    }

    pub fn rollback(&mut self) {
        self.pending = None;
    }

    /// Resolves the overlay to `liked` without touching the count.
    pub fn settle(&mut self, liked: bool) {
        self.pending = None;
        self.liked = liked;
    }
}

/// Result of a successful toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Liked,
    Unliked,
    /// Another write got there first; the membership already existed.
    AlreadyLiked,
    /// The membership was already gone.
    AlreadyUnliked,
}

pub struct LikeAggregator<B> {
    backend: Arc<B>,
}

impl<B> Clone for LikeAggregator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: DataBackend> LikeAggregator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    fn membership(post_id: &str, user_id: &str) -> Query {
        Query::from(Table::Likes).eq("post_id", post_id).eq("user_id", user_id)
    }

    async fn is_member(&self, post_id: &str, user_id: &str) -> Result<bool, FeedError> {
        let rows = self
            .backend
            .select(None, &Self::membership(post_id, user_id).limit(1))
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn count(&self, post_id: &str) -> Result<u64, FeedError> {
        let query = Query::from(Table::Likes).eq("post_id", post_id);
        Ok(self.backend.count(None, &query).await?)
    }

    /// Authoritative count and the actor's membership. Anonymous actors never like.
    pub async fn load(&self, post_id: &str, ctx: &SessionContext) -> Result<LikeState, FeedError> {
        let count = self.count(post_id).await?;
        let liked = match ctx.user_id() {
            Some(user_id) => self.is_member(post_id, user_id).await?,
            None => false,
        };
        Ok(LikeState::new(post_id, count, liked))
    }

    /// Re-reads the aggregate into `state`, discarding any overlay.
    pub async fn refresh(&self, state: &mut LikeState, ctx: &SessionContext) -> Result<(), FeedError> {
        *state = self.load(&state.post_id, ctx).await?;
        Ok(())
    }

    pub async fn toggle(&self, state: &mut LikeState, ctx: &SessionContext) -> Result<ToggleOutcome, FeedError> {
        let session = ctx.require("like post")?;
        let user_id = session.user.id.as_str();
        let post_id = state.post_id.clone();

        if self.is_member(&post_id, user_id).await? {
            state.stage(false);
            match self
                .backend
                .delete(Some(session), &Self::membership(&post_id, user_id))
                .await
            {
                Ok(removed) if removed.is_empty() => {
                    state.settle(false);
                    Ok(ToggleOutcome::AlreadyUnliked)
                }
                Ok(_) => {
                    state.commit();
                    log::debug!("unliked post {post_id}");
                    Ok(ToggleOutcome::Unliked)
                }
                Err(err) => {
                    state.rollback();
                    Err(err.into())
                }
            }
        } else {
            state.stage(true);
            let row = encode_row(&NewLike {
                post_id: &post_id,
                user_id,
            })?;
            match self.backend.insert(Some(session), Table::Likes, row).await {
                Ok(_) => {
                    state.commit();
                    log::debug!("liked post {post_id}");
                    Ok(ToggleOutcome::Liked)
                }
                Err(BackendError::UniqueViolation { constraint }) => {
                    log::debug!("like on {post_id} already present ({constraint})");
                    state.settle(true);
                    Ok(ToggleOutcome::AlreadyLiked)
                }
                Err(err) => {
                    state.rollback();
                    Err(err.into())
                }
            }
        }
    }
}
