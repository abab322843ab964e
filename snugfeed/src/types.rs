//! Row and view types shared by the repositories.
//!
//! `*Row` structs mirror what the backend stores and what change events carry
//! (no joined fields). `Post` and `Comment` are the denormalized shapes the
//! views render, with the author's display fields attached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated user as issued by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
}

/// Backend-issued session. The access token is opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user: Identity,
}

/// Per-user profile record stored in the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub user_name: String,
}

/// Author fields joined onto a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAuthor {
    pub user_name: String,
    pub email: String,
}

impl From<Profile> for PostAuthor {
    fn from(profile: Profile) -> Self {
        Self {
            user_name: profile.user_name,
            email: profile.email,
        }
    }
}

/// Author fields joined onto a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub user_name: String,
}

impl From<Profile> for CommentAuthor {
    fn from(profile: Profile) -> Self {
        Self {
            user_name: profile.user_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRow {
    pub id: String,
    pub content: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// A post with its author's display fields, newest first in feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub content: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub user: PostAuthor,
}

impl Post {
    pub fn from_row(row: PostRow, user: PostAuthor) -> Self {
        Self {
            id: row.id,
            content: row.content,
            user_id: row.user_id,
            created_at: row.created_at,
            user,
        }
    }

    pub fn is_owned_by(&self, user_id: Option<&str>) -> bool {
        user_id == Some(self.user_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRow {
    pub id: String,
    pub content: String,
    pub post_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// A comment with its author's display name, oldest first within a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub post_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub user: CommentAuthor,
}

impl Comment {
    pub fn from_row(row: CommentRow, user: CommentAuthor) -> Self {
        Self {
            id: row.id,
            content: row.content,
            post_id: row.post_id,
            user_id: row.user_id,
            created_at: row.created_at,
            user,
        }
    }
}

/// Membership record: existence means the user likes the post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeRow {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPost<'a> {
    pub content: &'a str,
    pub user_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewComment<'a> {
    pub content: &'a str,
    pub post_id: &'a str,
    pub user_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewLike<'a> {
    pub post_id: &'a str,
    pub user_id: &'a str,
}
