pub mod auth;
pub mod comments;
pub mod posts;
pub mod profile;

use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Utc;
use comfy_table::{Cell, Table};
use serde::Serialize;
use snugfeed::{
    Client, Comment, FeedError, PostItem, RedisBackend, SessionContext,
    presentation::render::{counters, owner_badge, relative_time},
};

use crate::context::ClientContext;
use crate::output::{OutputManager, TableDisplay};

/// Resolves the saved session, forgetting it when the backend no longer accepts it
pub async fn resolve_session(
    client: &Client<RedisBackend>,
    context: &ClientContext,
    output: &OutputManager,
) -> Result<SessionContext> {
    let had_session = context.load_session()?.is_some();
    let ctx = client.session().resolve().await;
    if had_session && !ctx.is_authenticated() {
        output.warning("Saved session is no longer valid; sign in again.");
        context.clear_session()?;
    }
    Ok(ctx)
}

/// Turns a library error into a CLI error, listing validation issues field by field
pub fn report(err: FeedError, output: &OutputManager) -> anyhow::Error {
    match err {
        FeedError::Validation(validation) => {
            for issue in &validation.issues {
                output.error(&format!("{}: {}", issue.field, issue.message));
            }
            anyhow!("Input rejected")
        }
        FeedError::Unauthorized { .. } => anyhow!("{err}. Run 'snugfeed auth signin' first if you are signed out."),
        err if err.is_retryable() => anyhow!("{err}. Try again."),
        err => err.into(),
    }
}

/// Resolves once `idle` elapses; never when it is unset
pub async fn idle_timer(idle: Option<u64>) {
    match idle {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending::<()>().await,
    }
}

#[derive(Debug, Serialize)]
pub struct PostLine {
    pub id: String,
    pub author: String,
    pub author_id: String,
    pub content: String,
    pub posted: String,
    pub likes: u64,
    pub liked: bool,
    pub comments: u64,
    pub mine: bool,
}

impl From<&PostItem> for PostLine {
    fn from(item: &PostItem) -> Self {
        Self {
            id: item.post.id.clone(),
            author: item.post.user.user_name.clone(),
            author_id: item.post.user_id.clone(),
            content: item.post.content.clone(),
            posted: relative_time(item.post.created_at, Utc::now()),
            likes: item.likes.count(),
            liked: item.likes.is_liked(),
            comments: item.comment_count(),
            mine: item.is_owner,
        }
    }
}

impl PostLine {
    pub fn summary(&self) -> String {
        format!(
            "{}{}: {} ({})",
            self.author,
            owner_badge(self.mine),
            self.content,
            counters(self.liked, self.likes, self.comments)
        )
    }
}

#[derive(Debug, Serialize)]
pub struct PostListing {
    pub posts: Vec<PostLine>,
}

impl TableDisplay for PostListing {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        output.add_table_header(&mut table, &["ID", "Author", "Post", "Posted", "Likes / Comments"]);
        if self.posts.is_empty() {
            table.add_row(vec![Cell::new("No posts yet")]);
            return table;
        }
        for post in &self.posts {
            table.add_row(vec![
                Cell::new(&post.id),
                output.owner_cell(format!("{}{}", post.author, owner_badge(post.mine)), post.mine),
                Cell::new(&post.content),
                Cell::new(&post.posted),
                output.like_cell(counters(post.liked, post.likes, post.comments), post.liked),
            ]);
        }
        table
    }

    fn to_compact(&self) -> String {
        self.posts.iter().map(PostLine::summary).collect::<Vec<_>>().join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct CommentLine {
    pub id: String,
    pub author: String,
    pub content: String,
    pub posted: String,
    pub mine: bool,
}

impl CommentLine {
    pub fn new(comment: &Comment, ctx: &SessionContext) -> Self {
        Self {
            id: comment.id.clone(),
            author: comment.user.user_name.clone(),
            content: comment.content.clone(),
            posted: relative_time(comment.created_at, Utc::now()),
            mine: ctx.user_id() == Some(comment.user_id.as_str()),
        }
    }

    pub fn summary(&self) -> String {
        format!("{}{}: {}", self.author, owner_badge(self.mine), self.content)
    }
}

#[derive(Debug, Serialize)]
pub struct CommentListing {
    pub post_id: String,
    pub comments: Vec<CommentLine>,
}

impl TableDisplay for CommentListing {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        output.add_table_header(&mut table, &["ID", "Author", "Comment", "Posted"]);
        if self.comments.is_empty() {
            table.add_row(vec![Cell::new("No comments yet")]);
            return table;
        }
        for comment in &self.comments {
            table.add_row(vec![
                Cell::new(&comment.id),
                output.owner_cell(format!("{}{}", comment.author, owner_badge(comment.mine)), comment.mine),
                Cell::new(&comment.content),
                Cell::new(&comment.posted),
            ]);
        }
        table
    }

    fn to_compact(&self) -> String {
        self.comments.iter().map(CommentLine::summary).collect::<Vec<_>>().join("\n")
    }
}
