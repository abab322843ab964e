//! Redis-backed implementation of the backend seam.
//!
//! Key layout under the configured prefix:
//!
//! | Key                                | Type   | Content                         |
//! |------------------------------------|--------|---------------------------------|
//! | `{prefix}:rows:{table}`            | hash   | row id -> row JSON              |
//! | `{prefix}:unique:{constraint}:{k}` | string | id of the row holding the key   |
//! | `{prefix}:auth:accounts`           | hash   | email -> account JSON           |
//! | `{prefix}:auth:sessions:{token}`   | string | identity JSON, expiring         |
//! | `{prefix}:changes:{table}`         | pubsub | change event JSON               |
//!
//! Policy checks and writes are separate round trips; concurrent updates are
//! last-write-wins. New rows are stored with `HSETNX` so an id is never reused,
//! and unique keys are claimed with `SET NX` and released if the insert fails.

use chrono::Utc;
use futures_util::StreamExt;
use redis::{AsyncCommands, aio::ConnectionManager, cmd};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::{
    AuthBackend, ChangeEvent, ChannelSpec, DataBackend, Query, Subscription, Table,
    password::{self, HashCost},
    policy::{self, Operation},
};
use crate::{
    errors::BackendError,
    id::{generate_access_token, generate_row_id},
    types::{Identity, Session},
};

/// Session lifetime for issued access tokens.
const SESSION_TTL_SECONDS: u64 = 60 * 60 * 24 * 7;

#[derive(Debug, Serialize, Deserialize)]
struct StoredAccount {
    identity: Identity,
    password_hash: String,
}

#[derive(Clone)]
pub struct RedisBackend {
    client: redis::Client,
    conn: ConnectionManager,
    prefix: String,
}

impl RedisBackend {
    /// Connects to `url` and namespaces every key under `prefix`.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, BackendError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            conn,
            prefix: prefix.into(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Deletes every key under the prefix (test cleanup).
    ///
    /// Uses SCAN + DEL so large keyspaces are not blocked.
    pub async fn purge(&self) -> Result<u64, BackendError> {
        const SCAN_COUNT: usize = 1000;
        let mut conn = self.conn.clone();
        let pattern = format!("{}:*", self.prefix);
        let mut cursor: u64 = 0;
        let mut total_deleted: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                total_deleted += deleted;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(total_deleted)
    }

    fn rows_key(&self, table: Table) -> String {
        format!("{}:rows:{}", self.prefix, table)
    }

    fn unique_key(&self, constraint: &str, key: &str) -> String {
        format!("{}:unique:{constraint}:{key}", self.prefix)
    }

    fn accounts_key(&self) -> String {
        format!("{}:auth:accounts", self.prefix)
    }

    fn session_key(&self, access_token: &str) -> String {
        format!("{}:auth:sessions:{access_token}", self.prefix)
    }

    fn channel_name(&self, table: Table) -> String {
        format!("{}:changes:{}", self.prefix, table)
    }

    async fn load_rows(&self, table: Table) -> Result<Vec<Value>, BackendError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = cmd("HVALS").arg(self.rows_key(table)).query_async(&mut conn).await?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(BackendError::from))
            .collect()
    }

    async fn store_row(&self, table: Table, row: &Value) -> Result<(), BackendError> {
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::decode("row has no id"))?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.hset(self.rows_key(table), id, row.to_string()).await?;
        Ok(())
    }

    /// Stores a new row under its id, refusing ids already in use, then publishes it.
    /// A failed publish removes the row again.
    async fn commit_insert(&self, table: Table, id: &str, row: &Value) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        let created: bool = conn.hset_nx(self.rows_key(table), id, row.to_string()).await?;
        if !created {
            return Err(BackendError::UniqueViolation {
                constraint: policy::primary_key(table),
            });
        }
        if let Err(err) = self.publish(&ChangeEvent::insert(table, row.clone())).await {
            let _: i64 = conn.hdel(self.rows_key(table), id).await?;
            return Err(err);
        }
        Ok(())
    }

    async fn remove_rows(&self, table: Table, rows: &[Value]) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        for row in rows {
            if let Some(id) = row.get("id").and_then(Value::as_str) {
                let _: i64 = conn.hdel(self.rows_key(table), id).await?;
            }
            if let Some((constraint, key)) = policy::unique_key(table, row) {
                let _: i64 = conn.del(self.unique_key(&constraint, &key)).await?;
            }
        }
        Ok(())
    }

    async fn publish(&self, event: &ChangeEvent) -> Result<(), BackendError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.publish(self.channel_name(event.table), payload).await?;
        Ok(())
    }

    async fn actor(&self, session: Option<&Session>) -> Result<Option<String>, BackendError> {
        match session {
            Some(session) => Ok(self.get_user(&session.access_token).await?.map(|identity| identity.id)),
            None => Ok(None),
        }
    }

    async fn issue_session(&self, identity: Identity) -> Result<Session, BackendError> {
        let access_token = generate_access_token();
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(
                self.session_key(&access_token),
                serde_json::to_string(&identity)?,
                SESSION_TTL_SECONDS,
            )
            .await?;
        Ok(Session {
            access_token,
            user: identity,
        })
    }

    async fn load_account(&self, email: &str) -> Result<Option<StoredAccount>, BackendError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(self.accounts_key(), email).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(BackendError::from))
            .transpose()
    }
}

fn stamp_row(row: &mut Value) {
    if let Some(fields) = row.as_object_mut() {
        fields.entry("id").or_insert_with(|| Value::String(generate_row_id()));
        fields.entry("created_at").or_insert_with(|| json!(Utc::now()));
    }
}

impl DataBackend for RedisBackend {
    async fn select(&self, _session: Option<&Session>, query: &Query) -> Result<Vec<Value>, BackendError> {
        Ok(query.apply(self.load_rows(query.table).await?))
    }

    async fn insert(&self, session: Option<&Session>, table: Table, mut row: Value) -> Result<Value, BackendError> {
        if !row.is_object() {
            return Err(BackendError::decode("inserted row must be an object"));
        }
        let actor = self.actor(session).await?;
        policy::authorize(table, Operation::Insert, actor.as_deref(), &row)?;
        stamp_row(&mut row);
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::decode("row id must be a string"))?
            .to_string();

        let claim = match policy::unique_key(table, &row) {
            Some((constraint, key)) => {
                let claim_key = self.unique_key(&constraint, &key);
                let mut conn = self.conn.clone();
                let claimed: Option<String> = cmd("SET").arg(&claim_key).arg(&id).arg("NX").query_async(&mut conn).await?;
                if claimed.is_none() {
                    return Err(BackendError::UniqueViolation { constraint });
                }
                Some(claim_key)
            }
            None => None,
        };

        if let Err(err) = self.commit_insert(table, &id, &row).await {
            if let Some(claim_key) = claim {
                let mut conn = self.conn.clone();
                let released: Result<i64, redis::RedisError> = conn.del(&claim_key).await;
                if let Err(release_err) = released {
                    log::warn!("failed to release {claim_key}: {release_err}");
                }
            }
            return Err(err);
        }
        Ok(row)
    }

    async fn update(&self, session: Option<&Session>, query: &Query, patch: Value) -> Result<Vec<Value>, BackendError> {
        let fields = policy::authorize_patch(query.table, &patch)?;
        let actor = self.actor(session).await?;
        let targets = self.select(session, query).await?;
        for row in &targets {
            policy::authorize(query.table, Operation::Update, actor.as_deref(), row)?;
        }

        let mut updated = Vec::with_capacity(targets.len());
        for old in targets {
            let mut new = old.clone();
            if let Some(target) = new.as_object_mut() {
                for (key, value) in &fields {
                    target.insert(key.clone(), value.clone());
                }
            }
            self.store_row(query.table, &new).await?;
            self.publish(&ChangeEvent::update(query.table, old, new.clone())).await?;
            updated.push(new);
        }
        Ok(updated)
    }

    async fn delete(&self, session: Option<&Session>, query: &Query) -> Result<Vec<Value>, BackendError> {
        let actor = self.actor(session).await?;
        let targets = self.select(session, query).await?;
        for row in &targets {
            policy::authorize(query.table, Operation::Delete, actor.as_deref(), row)?;
        }

        if query.table == Table::Posts {
            for post in &targets {
                let Some(post_id) = post.get("id").and_then(Value::as_str) else {
                    continue;
                };
                for dependent in policy::POST_DEPENDENTS {
                    let children = Query::from(dependent).eq("post_id", post_id).apply(self.load_rows(dependent).await?);
                    self.remove_rows(dependent, &children).await?;
                    for child in children {
                        self.publish(&ChangeEvent::delete(dependent, child)).await?;
                    }
                }
            }
        }

        self.remove_rows(query.table, &targets).await?;
        for row in &targets {
            self.publish(&ChangeEvent::delete(query.table, row.clone())).await?;
        }
        Ok(targets)
    }

    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, BackendError> {
        let channel = self.channel_name(spec.table);
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;
        log::debug!("subscribed to {channel}");

        let (sender, receiver) = mpsc::unbounded_channel();
        let filter = spec.clone();
        let forwarder = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(message) = messages.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        log::warn!("unreadable change payload on {channel}: {err}");
                        continue;
                    }
                };
                let event: ChangeEvent = match serde_json::from_str(&payload) {
                    Ok(event) => event,
                    Err(err) => {
                        log::warn!("malformed change event on {channel}: {err}");
                        continue;
                    }
                };
                if filter.admits(&event) && sender.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(spec, receiver, move || forwarder.abort()))
    }
}

impl AuthBackend for RedisBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let email = email.trim().to_ascii_lowercase();
        let account = StoredAccount {
            identity: Identity {
                id: generate_row_id(),
                email: email.clone(),
            },
            password_hash: password::hash_password(password, HashCost::Standard)?,
        };
        let mut conn = self.conn.clone();
        let created: bool = conn
            .hset_nx(self.accounts_key(), &email, serde_json::to_string(&account)?)
            .await?;
        if !created {
            return Err(BackendError::AlreadyRegistered);
        }
        self.issue_session(account.identity).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let email = email.trim().to_ascii_lowercase();
        let account = self.load_account(&email).await?.ok_or(BackendError::InvalidCredentials)?;
        password::verify_password(password, &account.password_hash)?;
        self.issue_session(account.identity).await
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>, BackendError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.session_key(access_token)).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(BackendError::from))
            .transpose()
    }

    async fn refresh(&self, access_token: &str) -> Result<Session, BackendError> {
        let identity = self
            .get_user(access_token)
            .await?
            .ok_or(BackendError::InvalidCredentials)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(self.session_key(access_token)).await?;
        self.issue_session(identity).await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(self.session_key(access_token)).await?;
        Ok(())
    }
}
