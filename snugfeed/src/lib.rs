//! snugfeed core library.
//!
//! A social-feed client (posts, comments, likes, profiles) over a
//! backend-as-a-service. The backend seam lives in [`backend`]; repositories
//! merge realtime change feeds into ordered local lists and reconcile counts
//! against optimistic local state.

pub mod backend;
pub mod client;
pub mod comments;
pub mod errors;
pub mod id;
pub mod likes;
pub mod posts;
pub mod presentation;
pub mod profiles;
pub mod reducer;
pub mod session;
pub mod types;

pub use backend::{Backend, MemoryBackend, RedisBackend};
pub use client::Client;
pub use comments::{CommentRepository, CommentTally, CommentThread, ThreadUpdate};
pub use errors::*;
pub use likes::{LikeAggregator, LikeState, PendingLike, ToggleOutcome};
pub use posts::{FeedUpdate, FeedView, LocalEdit, PostRepository, Scope};
pub use presentation::{FeedScreen, Intent, IntentOutcome, Page, PostItem, Resolution, Route};
pub use profiles::ProfileStore;
pub use reducer::LoadState;
pub use session::{AuthEvent, SessionContext, SessionProvider, SessionWatch, SignUpForm};
pub use types::{Comment, Identity, Post, Profile, Session};

// Re-export redis so callers don't need to depend on a specific version
pub use redis;
