//! In-process backend.
//!
//! Behaves like the hosted service as far as the client can observe: rows are
//! stamped with ids and creation times, row-level policies and the like
//! uniqueness constraint are enforced, deleting a post removes its comments and
//! likes, and every committed change is pushed to matching channels in commit
//! order. Failures can be injected per table to exercise error paths.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use chrono::{DateTime, Duration, Utc};
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

struct Account {
    identity: Identity,
    password_hash: String,
}

struct Subscriber {
    id: u64,
    spec: ChannelSpec,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<Table, Vec<Value>>,
    unique_keys: HashSet<(String, String)>,
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, Identity>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    last_stamp: Option<DateTime<Utc>>,
    faults: HashMap<Table, usize>,
    offline: bool,
}

impl MemoryState {
    fn check_available(&mut self, table: Option<Table>) -> Result<(), BackendError> {
        if self.offline {
            return Err(BackendError::unavailable("backend offline"));
        }
        if let Some(table) = table
            && let Some(remaining) = self.faults.get_mut(&table)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(BackendError::unavailable(format!("injected failure on {table}")));
        }
        Ok(())
    }

    fn actor(&self, session: Option<&Session>) -> Option<String> {
        session
            .and_then(|session| self.sessions.get(&session.access_token))
            .map(|identity| identity.id.clone())
    }

    /// Strictly increasing creation stamps keep feed order deterministic.
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_stamp
            && now <= last
        {
            now = last + Duration::microseconds(1);
        }
        self.last_stamp = Some(now);
        now
    }

    fn rows(&self, table: Table) -> impl Iterator<Item = &Value> {
        self.tables.get(&table).into_iter().flatten()
    }

    fn publish(&mut self, event: ChangeEvent) {
        self.subscribers.retain(|subscriber| {
            if !subscriber.spec.admits(&event) {
                return true;
            }
            subscriber.sender.send(event.clone()).is_ok()
        });
    }

    fn remove_where(&mut self, query: &Query) -> Vec<Value> {
        let rows = self.tables.entry(query.table).or_default();
        let (removed, kept): (Vec<Value>, Vec<Value>) = rows.drain(..).partition(|row| query.matches(row));
        *rows = kept;
        for row in &removed {
            if let Some(key) = policy::unique_key(query.table, row) {
                self.unique_keys.remove(&key);
            }
        }
        removed
    }

    fn issue_session(&mut self, identity: Identity) -> Session {
        let access_token = generate_access_token();
        self.sessions.insert(access_token.clone(), identity.clone());
        Session {
            access_token,
            user: identity,
        }
    }
}

/// Backend kept entirely in memory. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the next `times` data operations touching `table` fail as unavailable.
    pub fn fail_next(&self, table: Table, times: usize) {
        self.lock().faults.insert(table, times);
    }

    /// Makes every call fail (or succeed again) as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Number of open channels, for checking subscription teardown.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|subscriber| !subscriber.sender.is_closed());
        state.subscribers.len()
    }

    /// Raw rows currently stored in `table`, in insertion order.
    pub fn snapshot(&self, table: Table) -> Vec<Value> {
        self.lock().rows(table).cloned().collect()
    }

    /// Inserts a row bypassing policies, e.g. to simulate a write from another
    /// client. The change is still published.
    pub fn insert_unchecked(&self, table: Table, mut row: Value) -> Value {
        let mut state = self.lock();
        stamp_row(&mut state, &mut row);
        if let Some(key) = policy::unique_key(table, &row) {
            state.unique_keys.insert(key);
        }
        state.tables.entry(table).or_default().push(row.clone());
        state.publish(ChangeEvent::insert(table, row.clone()));
        row
    }
}

fn stamp_row(state: &mut MemoryState, row: &mut Value) {
    let stamp = state.next_stamp();
    if let Some(fields) = row.as_object_mut() {
        fields.entry("id").or_insert_with(|| Value::String(generate_row_id()));
        fields.entry("created_at").or_insert_with(|| json!(stamp));
    }
}

impl DataBackend for MemoryBackend {
    async fn select(&self, _session: Option<&Session>, query: &Query) -> Result<Vec<Value>, BackendError> {
        let mut state = self.lock();
        state.check_available(Some(query.table))?;
        Ok(query.apply(state.rows(query.table).cloned()))
    }

    async fn insert(&self, session: Option<&Session>, table: Table, mut row: Value) -> Result<Value, BackendError> {
        let mut state = self.lock();
        state.check_available(Some(table))?;
        if !row.is_object() {
            return Err(BackendError::decode("inserted row must be an object"));
        }
        let actor = state.actor(session);
        policy::authorize(table, Operation::Insert, actor.as_deref(), &row)?;
        if let Some(id) = row.get("id")
            && state.rows(table).any(|existing| existing.get("id") == Some(id))
        {
            return Err(BackendError::UniqueViolation {
                constraint: policy::primary_key(table),
            });
        }
        if let Some(key) = policy::unique_key(table, &row) {
            if state.unique_keys.contains(&key) {
                return Err(BackendError::UniqueViolation { constraint: key.0 });
            }
            state.unique_keys.insert(key);
        }
        stamp_row(&mut state, &mut row);
        state.tables.entry(table).or_default().push(row.clone());
        state.publish(ChangeEvent::insert(table, row.clone()));
        Ok(row)
    }

    async fn update(&self, session: Option<&Session>, query: &Query, patch: Value) -> Result<Vec<Value>, BackendError> {
        let mut state = self.lock();
        state.check_available(Some(query.table))?;
        let fields = policy::authorize_patch(query.table, &patch)?;
        let actor = state.actor(session);
        for row in state.rows(query.table).filter(|row| query.matches(row)) {
            policy::authorize(query.table, Operation::Update, actor.as_deref(), row)?;
        }

        let mut changes = Vec::new();
        for row in state.tables.entry(query.table).or_default().iter_mut() {
            if !query.matches(row) {
                continue;
            }
            let old = row.clone();
            if let Some(target) = row.as_object_mut() {
                for (key, value) in &fields {
                    target.insert(key.clone(), value.clone());
                }
            }
            changes.push((old, row.clone()));
        }

        let mut updated = Vec::with_capacity(changes.len());
        for (old, new) in changes {
            state.publish(ChangeEvent::update(query.table, old, new.clone()));
            updated.push(new);
        }
        Ok(updated)
    }

    async fn delete(&self, session: Option<&Session>, query: &Query) -> Result<Vec<Value>, BackendError> {
        let mut state = self.lock();
        state.check_available(Some(query.table))?;
        let actor = state.actor(session);
        for row in state.rows(query.table).filter(|row| query.matches(row)) {
            policy::authorize(query.table, Operation::Delete, actor.as_deref(), row)?;
        }

        let removed = state.remove_where(query);
        for row in &removed {
            if query.table != Table::Posts {
                continue;
            }
            let Some(post_id) = row.get("id").and_then(Value::as_str) else {
                continue;
            };
            for dependent in policy::POST_DEPENDENTS {
                let cascade = Query::from(dependent).eq("post_id", post_id);
                for child in state.remove_where(&cascade) {
                    state.publish(ChangeEvent::delete(dependent, child));
                }
            }
        }
        for row in &removed {
            state.publish(ChangeEvent::delete(query.table, row.clone()));
        }
        Ok(removed)
    }

    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, BackendError> {
        let mut state = self.lock();
        state.check_available(None)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state.subscribers.push(Subscriber {
            id,
            spec: spec.clone(),
            sender,
        });
        log::debug!("opened {} channel #{id}", spec.table);

        let registry: Weak<Mutex<MemoryState>> = Arc::downgrade(&self.state);
        Ok(Subscription::new(spec, receiver, move || {
            if let Some(state) = registry.upgrade() {
                let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                state.subscribers.retain(|subscriber| subscriber.id != id);
            }
        }))
    }
}

impl AuthBackend for MemoryBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let email = email.trim().to_ascii_lowercase();
        let password_hash = password::hash_password(password, HashCost::Light)?;
        let mut state = self.lock();
        state.check_available(None)?;
        if state.accounts.contains_key(&email) {
            return Err(BackendError::AlreadyRegistered);
        }
        let identity = Identity {
            id: generate_row_id(),
            email: email.clone(),
        };
        state.accounts.insert(
            email,
            Account {
                identity: identity.clone(),
                password_hash,
            },
        );
        Ok(state.issue_session(identity))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let email = email.trim().to_ascii_lowercase();
        let (identity, password_hash) = {
            let mut state = self.lock();
            state.check_available(None)?;
            let account = state.accounts.get(&email).ok_or(BackendError::InvalidCredentials)?;
            (account.identity.clone(), account.password_hash.clone())
        };
        password::verify_password(password, &password_hash)?;
        Ok(self.lock().issue_session(identity))
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>, BackendError> {
        let mut state = self.lock();
        state.check_available(None)?;
        Ok(state.sessions.get(access_token).cloned())
    }

    async fn refresh(&self, access_token: &str) -> Result<Session, BackendError> {
        let mut state = self.lock();
        state.check_available(None)?;
        let identity = state
            .sessions
            .remove(access_token)
            .ok_or(BackendError::InvalidCredentials)?;
        Ok(state.issue_session(identity))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.check_available(None)?;
        state.sessions.remove(access_token);
        Ok(())
    }
}
