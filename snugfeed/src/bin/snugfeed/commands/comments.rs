use anyhow::{Result, bail};
use clap::Subcommand;
use snugfeed::{LoadState, ThreadUpdate};

use super::{CommentLine, CommentListing, idle_timer, report, resolve_session};
use crate::context::ClientContext;
use crate::examples::ExampleGroup;
use crate::output::OutputManager;
use crate::theme::ICONS;

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Reading",
        commands: &[
            "snugfeed comments list <POST_ID>           # Oldest first",
            "snugfeed comments list <POST_ID> --watch   # Follow new comments",
        ],
    },
    ExampleGroup {
        title: "Writing",
        commands: &[
            "snugfeed comments add <POST_ID> \"nice\"",
            "snugfeed comments delete <COMMENT_ID>",
        ],
    },
];

#[derive(Subcommand)]
pub enum CommentCommands {
    /// Show a post's comments
    List {
        post_id: String,

        /// Keep running and print comments as they arrive
        #[arg(long)]
        watch: bool,
    },

    /// Comment on a post
    Add {
        post_id: String,

        /// Comment text
        content: String,
    },

    /// Delete one of your comments
    Delete { comment_id: String },
}

pub async fn handle_comment_commands(command: CommentCommands, output: &OutputManager) -> Result<()> {
    let context = ClientContext::find()?;
    let client = context.connect().await?;
    let ctx = resolve_session(&client, &context, output).await?;

    match command {
        CommentCommands::List { post_id, watch } => {
            let post = client.posts().get(&post_id).await.map_err(|err| report(err, output))?;
            output.heading(&format!("{}: {}", post.user.user_name, post.content));

            let mut thread = client
                .comments()
                .open_thread(&post_id)
                .await
                .map_err(|err| report(err, output))?;
            if let LoadState::Failed { message } = thread.load_state() {
                bail!("Failed to load comments: {message}");
            }
            output.display(&CommentListing {
                post_id: post_id.clone(),
                comments: thread.comments().iter().map(|c| CommentLine::new(c, &ctx)).collect(),
            })?;

            if !watch {
                return Ok(());
            }

            output.info(&format!("{} Watching for comments (Ctrl+C to stop)", ICONS.loading));
            let idle_secs = context.config.client.watch_idle_secs;
            loop {
                let update = tokio::select! {
                    _ = tokio::signal::ctrl_c() => None,
                    _ = idle_timer(idle_secs) => {
                        output.verbose("idle timeout reached");
                        None
                    }
                    update = thread.next_event() => Some(update),
                };
                let Some(update) = update else {
                    break;
                };

                match update {
                    ThreadUpdate::Appended(comment_id) => {
                        if let Some(comment) = thread.comments().iter().find(|c| c.id == comment_id) {
                            output.indented(ICONS.plus, &CommentLine::new(comment, &ctx).summary());
                        }
                    }
                    ThreadUpdate::Removed(comment_id) => output.indented(ICONS.minus, &comment_id),
                    ThreadUpdate::Dropped { comment_id, reason } => {
                        output.verbose(&format!("skipped {}: {reason}", comment_id.as_deref().unwrap_or("event")));
                    }
                    ThreadUpdate::Ignored => {}
                    ThreadUpdate::Closed => {
                        output.warning("Change feed closed");
                        break;
                    }
                }
            }
            thread.close();
        }
        CommentCommands::Add { post_id, content } => {
            let comment = client
                .comments()
                .create(&post_id, &content, &ctx)
                .await
                .map_err(|err| report(err, output))?;
            output.success(&format!("Commented {}", comment.id));
        }
        CommentCommands::Delete { comment_id } => {
            client
                .comments()
                .delete(&comment_id, &ctx)
                .await
                .map_err(|err| report(err, output))?;
            output.success(&format!("Deleted {comment_id}"));
        }
    }

    Ok(())
}
