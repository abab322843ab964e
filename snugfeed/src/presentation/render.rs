//! Plain-text rendering helpers for terminal front ends.

use chrono::{DateTime, Utc};

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

/// Distance from `then` to `now` in words, e.g. `"3 minutes ago"`.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    if seconds < 0 {
        return "just now".to_string();
    }
    let minutes = (seconds + 30) / 60;
    let hours = (minutes + 30) / 60;
    let days = (hours + 12) / 24;
    match seconds {
        0..=29 => "less than a minute ago".to_string(),
        _ if minutes < 45 => format!("{} ago", plural(minutes.max(1), "minute")),
        _ if hours < 24 => format!("about {} ago", plural(hours.max(1), "hour")),
        _ if days < 30 => format!("{} ago", plural(days.max(1), "day")),
        _ if days < 365 => format!("{} ago", plural((days / 30).max(1), "month")),
        _ => format!("about {} ago", plural(days / 365, "year")),
    }
}

/// Like/comment counter line, e.g. `"♥ 3 · 2 comments"`.
pub fn counters(liked: bool, likes: u64, comments: u64) -> String {
    let heart = if liked { '♥' } else { '♡' };
    let comments = if comments == 1 {
        "1 comment".to_string()
    } else {
        format!("{comments} comments")
    };
    format!("{heart} {likes} · {comments}")
}

/// Suffix marking the actor's own items.
pub fn owner_badge(is_owner: bool) -> &'static str {
    if is_owner { " (you)" } else { "" }
}
