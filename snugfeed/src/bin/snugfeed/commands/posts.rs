use anyhow::{Result, bail};
use clap::Subcommand;
use snugfeed::{
    FeedScreen, FeedUpdate, LoadState, Page, Resolution, Route, Scope, ToggleOutcome, presentation,
};

use super::{PostLine, PostListing, idle_timer, report, resolve_session};
use crate::context::ClientContext;
use crate::examples::ExampleGroup;
use crate::output::OutputManager;
use crate::theme::ICONS;

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Reading",
        commands: &[
            "snugfeed posts feed                        # Everyone's posts, newest first",
            "snugfeed posts feed --mine                 # Only your posts",
            "snugfeed posts feed --user <USER_ID>       # One user's posts",
            "snugfeed posts feed --watch                # Keep printing changes as they arrive",
        ],
    },
    ExampleGroup {
        title: "Writing",
        commands: &[
            "snugfeed posts create \"hello\"",
            "snugfeed posts edit <POST_ID> \"hello again\"",
            "snugfeed posts delete <POST_ID>",
            "snugfeed posts like <POST_ID>              # Like, or unlike when already liked",
        ],
    },
];

#[derive(Subcommand)]
pub enum PostCommands {
    /// List posts
    Feed {
        /// Only posts by this user
        #[arg(long, conflicts_with = "mine")]
        user: Option<String>,

        /// Only your own posts
        #[arg(long)]
        mine: bool,

        /// Keep running and print changes as they arrive
        #[arg(long)]
        watch: bool,
    },

    /// Publish a post
    Create {
        /// Post text
        content: String,
    },

    /// Replace the text of one of your posts
    Edit {
        post_id: String,

        /// New post text
        content: String,
    },

    /// Delete one of your posts
    Delete { post_id: String },

    /// Toggle your like on a post
    Like { post_id: String },
}

pub async fn handle_post_commands(command: PostCommands, output: &OutputManager) -> Result<()> {
    let context = ClientContext::find()?;
    let client = context.connect().await?;
    let ctx = resolve_session(&client, &context, output).await?;

    match command {
        PostCommands::Feed { user, mine, watch } => {
            let route = match (user, mine) {
                (Some(user_id), _) => Route::User(user_id),
                (None, true) => Route::MyPage,
                (None, false) => Route::Feed,
            };
            output.verbose(&format!("resolving {route}"));

            let scope = match presentation::resolve(&route, &ctx, client.profiles()).await {
                Resolution::Redirect(Route::SignIn) => {
                    bail!("Not signed in. Run 'snugfeed auth signin' first.")
                }
                Resolution::Redirect(other) => bail!("Unexpected redirect to {other}"),
                Resolution::Render(Page::Feed) => {
                    output.heading("Feed");
                    Scope::Global
                }
                Resolution::Render(Page::MyPage { profile }) => {
                    output.heading(&format!("{} (you)", profile.user_name));
                    Scope::ByUser(profile.id)
                }
                Resolution::Render(Page::User { profile, is_current_user }) => {
                    let badge = if is_current_user { " (you)" } else { "" };
                    output.heading(&format!("{}{badge}", profile.user_name));
                    Scope::ByUser(profile.id)
                }
                Resolution::Render(Page::Unavailable { message }) => {
                    bail!("Could not reach the backend ({message}). Try again.")
                }
                Resolution::Render(_) => bail!("User not found"),
            };

            let mut screen = FeedScreen::open(client, scope).await.map_err(|err| report(err, output))?;
            if let LoadState::Failed { message } = screen.load_state() {
                bail!("Failed to load posts: {message}");
            }
            output.display(&PostListing {
                posts: screen.items().iter().map(PostLine::from).collect(),
            })?;

            if watch {
                watch_feed(&mut screen, context.config.client.watch_idle_secs, output).await;
            }
        }
        PostCommands::Create { content } => {
            let post = client.posts().create(&content, &ctx).await.map_err(|err| report(err, output))?;
            output.success(&format!("Posted {}", post.id));
        }
        PostCommands::Edit { post_id, content } => {
            let post = client
                .posts()
                .update(&post_id, &content, &ctx)
                .await
                .map_err(|err| report(err, output))?;
            output.success(&format!("Updated {}", post.id));
            output.indented(ICONS.arrow, &post.content);
        }
        PostCommands::Delete { post_id } => {
            client
                .posts()
                .delete(&post_id, &ctx)
                .await
                .map_err(|err| report(err, output))?;
            output.success(&format!("Deleted {post_id}"));
        }
        PostCommands::Like { post_id } => {
            let likes = client.likes();
            let mut state = likes.load(&post_id, &ctx).await.map_err(|err| report(err, output))?;
            let outcome = likes.toggle(&mut state, &ctx).await.map_err(|err| report(err, output))?;
            let message = match outcome {
                ToggleOutcome::Liked => "Liked",
                ToggleOutcome::Unliked => "Unliked",
                ToggleOutcome::AlreadyLiked => "Already liked",
                ToggleOutcome::AlreadyUnliked => "Already not liked",
            };
            output.success(&format!("{message} ({} total)", state.count()));
        }
    }

    Ok(())
}

async fn watch_feed(screen: &mut FeedScreen<snugfeed::RedisBackend>, idle_secs: Option<u64>, output: &OutputManager) {
    output.info(&format!("{} Watching for changes (Ctrl+C to stop)", ICONS.loading));
    loop {
        let update = tokio::select! {
            _ = tokio::signal::ctrl_c() => None,
            _ = idle_timer(idle_secs) => {
                output.verbose("idle timeout reached");
                None
            }
            update = screen.next_update() => Some(update),
        };
        let Some(update) = update else {
            break;
        };

        match update {
            FeedUpdate::Inserted(post_id) => {
                if let Some(item) = screen.item(&post_id) {
                    output.indented(ICONS.plus, &PostLine::from(item).summary());
                }
            }
            FeedUpdate::Updated(post_id) => {
                if let Some(item) = screen.item(&post_id) {
                    output.indented(ICONS.changed, &PostLine::from(item).summary());
                }
            }
            FeedUpdate::Removed(post_id) => output.indented(ICONS.minus, &post_id),
            FeedUpdate::Dropped { post_id, reason } => {
                output.verbose(&format!("skipped {}: {reason}", post_id.as_deref().unwrap_or("event")));
            }
            FeedUpdate::Ignored => {}
            FeedUpdate::Closed => {
                output.warning("Change feed closed");
                break;
            }
        }
    }
}
