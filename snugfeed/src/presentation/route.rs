//! Page routes and their resolution against the current session.

use std::fmt;

use crate::{
    backend::DataBackend,
    errors::FeedError,
    profiles::ProfileStore,
    session::SessionContext,
    types::Profile,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Entry,
    SignIn,
    SignUp,
    Feed,
    MyPage,
    User(String),
}

impl Route {
    /// Parses a path such as `/user/abc`; unknown paths yield `None`.
    pub fn parse(path: &str) -> Option<Route> {
        let trimmed = path.trim().trim_end_matches('/');
        let mut segments = trimmed.trim_start_matches('/').split('/');
        let route = match (segments.next(), segments.next()) {
            (Some(""), None) => Route::Entry,
            (Some("signin"), None) => Route::SignIn,
            (Some("signup"), None) => Route::SignUp,
            (Some("feed"), None) => Route::Feed,
            (Some("mypage"), None) => Route::MyPage,
            (Some("user"), Some(id)) if !id.is_empty() => Route::User(id.to_string()),
            _ => return None,
        };
        if segments.next().is_some() {
            return None;
        }
        Some(route)
    }

    pub fn path(&self) -> String {
        match self {
            Route::Entry => "/".to_string(),
            Route::SignIn => "/signin".to_string(),
            Route::SignUp => "/signup".to_string(),
            Route::Feed => "/feed".to_string(),
            Route::MyPage => "/mypage".to_string(),
            Route::User(id) => format!("/user/{id}"),
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, Route::Feed | Route::MyPage)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// What to render once a route is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    SignIn,
    SignUp,
    Feed,
    MyPage { profile: Profile },
    User { profile: Profile, is_current_user: bool },
    NotFound,
    /// The backend could not be reached; the visit can be retried.
    Unavailable { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Render(Page),
    Redirect(Route),
}

/// Resolves `route` for the actor in `ctx`.
///
/// Anonymous visitors of authenticated pages are sent to sign-in. A missing
/// profile renders the not-found page; a failed lookup renders the unavailable page.
pub async fn resolve<B: DataBackend>(route: &Route, ctx: &SessionContext, profiles: &ProfileStore<B>) -> Resolution {
    if route.requires_auth() && !ctx.is_authenticated() {
        return Resolution::Redirect(Route::SignIn);
    }
    match route {
        Route::Entry if ctx.is_authenticated() => Resolution::Redirect(Route::Feed),
        Route::Entry => Resolution::Redirect(Route::SignIn),
        Route::SignIn => Resolution::Render(Page::SignIn),
        Route::SignUp => Resolution::Render(Page::SignUp),
        Route::Feed => Resolution::Render(Page::Feed),
        Route::MyPage => {
            let Some(user_id) = ctx.user_id() else {
                return Resolution::Redirect(Route::SignIn);
            };
            match load_profile(profiles, user_id).await {
                Ok(profile) => Resolution::Render(Page::MyPage { profile }),
                Err(page) => Resolution::Render(page),
            }
        }
        Route::User(user_id) => match load_profile(profiles, user_id).await {
            Ok(profile) => Resolution::Render(Page::User {
                is_current_user: ctx.user_id() == Some(user_id.as_str()),
                profile,
            }),
            Err(page) => Resolution::Render(page),
        },
    }
}

async fn load_profile<B: DataBackend>(profiles: &ProfileStore<B>, user_id: &str) -> Result<Profile, Page> {
    match profiles.get(user_id).await {
        Ok(profile) => Ok(profile),
        Err(FeedError::NotFound { .. }) => Err(Page::NotFound),
        Err(err) => {
            log::warn!("error checking user {user_id}: {err}");
            Err(Page::Unavailable {
                message: err.to_string(),
            })
        }
    }
}
