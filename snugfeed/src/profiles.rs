use std::sync::Arc;

use serde_json::json;

use crate::{
    backend::{DataBackend, Query, Table, decode_row},
    errors::{BackendError, FeedError, require_text},
    session::SessionContext,
    types::Profile,
};

/// Read/update access to the per-user display-name records.
pub struct ProfileStore<B> {
    backend: Arc<B>,
}

impl<B> Clone for ProfileStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: DataBackend> ProfileStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn get(&self, user_id: &str) -> Result<Profile, FeedError> {
        let query = Query::from(Table::Users).eq("id", user_id);
        match self.backend.single(None, &query).await {
            Ok(row) => Ok(decode_row(row)?),
            Err(BackendError::NotSingle { found: 0, .. }) => Err(FeedError::not_found("profile", user_id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Renames a profile. Only its owner may do so.
    pub async fn update(&self, user_id: &str, user_name: &str, ctx: &SessionContext) -> Result<Profile, FeedError> {
        let session = ctx.require("update profile")?;
        if session.user.id != user_id {
            return Err(FeedError::unauthorized("update another user's profile"));
        }
        let user_name = require_text("user_name", user_name)?;

        let query = Query::from(Table::Users).eq("id", user_id);
        let mut updated = self
            .backend
            .update(Some(session), &query, json!({ "user_name": user_name }))
            .await?;
        if updated.is_empty() {
            return Err(FeedError::not_found("profile", user_id));
        }
        log::debug!("renamed profile {user_id}");
        Ok(decode_row(updated.remove(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{AuthBackend, MemoryBackend},
        types::Session,
    };

    async fn registered(backend: &MemoryBackend, email: &str, name: &str) -> Session {
        let session = backend.sign_up(email, "secret1").await.unwrap();
        backend
            .insert(
                Some(&session),
                Table::Users,
                json!({"id": session.user.id, "email": email, "user_name": name}),
            )
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn get_returns_profile_or_not_found() {
        let backend = Arc::new(MemoryBackend::new());
        let alice = registered(&backend, "alice@example.com", "alice").await;
        let store = ProfileStore::new(backend);

        let profile = store.get(&alice.user.id).await.unwrap();
        assert_eq!(profile.user_name, "alice");
        assert_eq!(profile.email, "alice@example.com");

        assert!(matches!(store.get("nobody").await, Err(FeedError::NotFound { .. })));
    }

    #[tokio::test]
    async fn only_the_owner_may_rename() {
        let backend = Arc::new(MemoryBackend::new());
        let alice = registered(&backend, "alice@example.com", "alice").await;
        let bob = registered(&backend, "bob@example.com", "bob").await;
        let store = ProfileStore::new(backend);

        let as_bob = SessionContext::authenticated(bob);
        let err = store.update(&alice.user.id, "mallory", &as_bob).await.unwrap_err();
        assert!(matches!(err, FeedError::Unauthorized { .. }));

        let as_alice = SessionContext::authenticated(alice.clone());
        let err = store.update(&alice.user.id, "   ", &as_alice).await.unwrap_err();
        assert!(matches!(err, FeedError::Validation(_)));

        let renamed = store.update(&alice.user.id, " Alice ", &as_alice).await.unwrap();
        assert_eq!(renamed.user_name, "Alice");
        assert_eq!(store.get(&alice.user.id).await.unwrap().user_name, "Alice");
    }
}
