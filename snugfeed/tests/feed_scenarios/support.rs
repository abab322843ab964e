pub(crate) use serde_json::json;
pub(crate) use snugfeed::{
    AuthEvent, Client, CommentRepository, FeedError, FeedScreen, FeedUpdate, Intent, IntentOutcome, LikeAggregator,
    LikeState, MemoryBackend, Scope, SessionContext, SignUpForm, ThreadUpdate, ToggleOutcome,
    backend::{ChannelSpec, DataBackend, Query, Subscription, Table},
    errors::BackendError,
    types::Session,
};
pub(crate) use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// A client of its own sharing `backend`, signed up as `user_name`.
pub(crate) async fn member(backend: &MemoryBackend, user_name: &str) -> (Client<MemoryBackend>, SessionContext) {
    let client = Client::new(backend.clone());
    let ctx = client
        .session()
        .sign_up(&SignUpForm {
            email: format!("{user_name}@example.com"),
            password: "secret1".into(),
            password_confirmation: "secret1".into(),
            user_name: user_name.into(),
        })
        .await
        .expect("sign up");
    (client, ctx)
}

pub(crate) fn user_id(ctx: &SessionContext) -> String {
    ctx.user_id().expect("signed in").to_string()
}

pub(crate) fn contents(posts: &[snugfeed::Post]) -> Vec<&str> {
    posts.iter().map(|post| post.content.as_str()).collect()
}

/// Memory backend whose likes reads and writes can be skewed, to reproduce
/// what a client sees when its reads lag behind other writers.
pub(crate) struct SkewedBackend {
    pub(crate) inner: MemoryBackend,
    /// Likes selects return no rows.
    pub(crate) hide_likes: AtomicBool,
    /// Likes selects return a row that is not stored.
    pub(crate) phantom_like: AtomicBool,
    /// Inserts and deletes fail as unavailable.
    pub(crate) fail_writes: AtomicBool,
}

impl SkewedBackend {
    pub(crate) fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            hide_likes: AtomicBool::new(false),
            phantom_like: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    fn check_writes(&self) -> Result<(), BackendError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::unavailable("write rejected"));
        }
        Ok(())
    }
}

impl DataBackend for SkewedBackend {
    async fn select(&self, session: Option<&Session>, query: &Query) -> Result<Vec<serde_json::Value>, BackendError> {
        if query.table == Table::Likes {
            if self.hide_likes.load(Ordering::SeqCst) {
                return Ok(Vec::new());
            }
            if self.phantom_like.load(Ordering::SeqCst) {
                return Ok(vec![json!({"id": "phantom", "post_id": "?", "user_id": "?"})]);
            }
        }
        self.inner.select(session, query).await
    }

    async fn insert(
        &self,
        session: Option<&Session>,
        table: Table,
        row: serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        self.check_writes()?;
        self.inner.insert(session, table, row).await
    }

    async fn update(
        &self,
        session: Option<&Session>,
        query: &Query,
        patch: serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, BackendError> {
        self.inner.update(session, query, patch).await
    }

    async fn delete(&self, session: Option<&Session>, query: &Query) -> Result<Vec<serde_json::Value>, BackendError> {
        self.check_writes()?;
        self.inner.delete(session, query).await
    }

    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, BackendError> {
        self.inner.subscribe(spec).await
    }
}

/// Memory backend that commits a comment from another writer while the next
/// comments read is in flight.
pub(crate) struct RacingBackend {
    inner: MemoryBackend,
    pending: std::sync::Mutex<Option<serde_json::Value>>,
}

impl RacingBackend {
    pub(crate) fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            pending: std::sync::Mutex::new(None),
        }
    }

    pub(crate) fn arm(&self, comment: serde_json::Value) {
        *self.pending.lock().unwrap() = Some(comment);
    }
}

impl DataBackend for RacingBackend {
    async fn select(&self, session: Option<&Session>, query: &Query) -> Result<Vec<serde_json::Value>, BackendError> {
        if query.table == Table::Comments {
            let pending = self.pending.lock().unwrap().take();
            if let Some(comment) = pending {
                self.inner.insert_unchecked(Table::Comments, comment);
            }
        }
        self.inner.select(session, query).await
    }

    async fn insert(
        &self,
        session: Option<&Session>,
        table: Table,
        row: serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        self.inner.insert(session, table, row).await
    }

    async fn update(
        &self,
        session: Option<&Session>,
        query: &Query,
        patch: serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, BackendError> {
        self.inner.update(session, query, patch).await
    }

    async fn delete(&self, session: Option<&Session>, query: &Query) -> Result<Vec<serde_json::Value>, BackendError> {
        self.inner.delete(session, query).await
    }

    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, BackendError> {
        self.inner.subscribe(spec).await
    }
}
