//! Client entry point bundling the repositories over one backend.
//!
//! # Example
//! ```ignore
//! let client = Client::new(MemoryBackend::new());
//! let ctx = client.session().sign_in("alice@example.com", "secret1").await?;
//! let post = client.posts().create("hello", &ctx).await?;
//! let mut feed = client.posts().open_feed(Scope::Global).await?;
//! ```

use std::sync::Arc;

use crate::{
    backend::{Backend, RedisBackend},
    comments::CommentRepository,
    errors::BackendError,
    likes::LikeAggregator,
    posts::PostRepository,
    profiles::ProfileStore,
    session::SessionProvider,
    types::Session,
};

pub struct Client<B> {
    backend: Arc<B>,
    session: Arc<SessionProvider<B>>,
    posts: PostRepository<B>,
    comments: CommentRepository<B>,
    likes: LikeAggregator<B>,
    profiles: ProfileStore<B>,
}

impl<B> Clone for Client<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            session: Arc::clone(&self.session),
            posts: self.posts.clone(),
            comments: self.comments.clone(),
            likes: self.likes.clone(),
            profiles: self.profiles.clone(),
        }
    }
}

impl<B: Backend> Client<B> {
    pub fn new(backend: B) -> Self {
        let backend = Arc::new(backend);
        let session = Arc::new(SessionProvider::new(Arc::clone(&backend)));
        Self::assemble(backend, session)
    }

    /// Client resuming a previously issued session.
    pub fn with_session(backend: B, session: Session) -> Self {
        let backend = Arc::new(backend);
        let session = Arc::new(SessionProvider::with_session(Arc::clone(&backend), session));
        Self::assemble(backend, session)
    }

    fn assemble(backend: Arc<B>, session: Arc<SessionProvider<B>>) -> Self {
        Self {
            posts: PostRepository::new(Arc::clone(&backend)),
            comments: CommentRepository::new(Arc::clone(&backend)),
            likes: LikeAggregator::new(Arc::clone(&backend)),
            profiles: ProfileStore::new(Arc::clone(&backend)),
            session,
            backend,
        }
    }

    pub fn session(&self) -> &SessionProvider<B> {
        &self.session
    }

    pub fn posts(&self) -> &PostRepository<B> {
        &self.posts
    }

    pub fn comments(&self) -> &CommentRepository<B> {
        &self.comments
    }

    pub fn likes(&self) -> &LikeAggregator<B> {
        &self.likes
    }

    pub fn profiles(&self) -> &ProfileStore<B> {
        &self.profiles
    }

    /// Direct backend access for advanced operations.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl Client<RedisBackend> {
    /// Connects to Redis and namespaces every key under `prefix`.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, BackendError> {
        Ok(Self::new(RedisBackend::connect(url, prefix).await?))
    }
}
