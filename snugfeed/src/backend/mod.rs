//! Backend seam.
//!
//! Everything persistent lives behind these traits: row storage and query
//! execution, row-level policy enforcement, change-feed delivery and session
//! issuance. Rows cross the seam as JSON objects; repositories decode them into
//! the typed rows from [`crate::types`].

mod memory;
mod password;
mod policy;
mod redis_store;

pub use self::memory::MemoryBackend;
pub use self::redis_store::RedisBackend;

use std::{cmp::Ordering, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    errors::BackendError,
    types::{Identity, Session},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Users,
    Posts,
    Comments,
    Likes,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::Users, Table::Posts, Table::Comments, Table::Likes];

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Posts => "posts",
            Table::Comments => "comments",
            Table::Likes => "likes",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Equality filter on a top-level row field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        row.get(&self.field) == Some(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: String,
    pub direction: SortOrder,
}

/// Filter-by-equality query with optional ordering and limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(field, value));
        self
    }

    pub fn order(mut self, field: impl Into<String>, direction: SortOrder) -> Self {
        self.order = Some(Order {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }

    /// Filters, sorts (stable) and truncates `rows` the way a backend would.
    pub fn apply<I>(&self, rows: I) -> Vec<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut selected: Vec<Value> = rows.into_iter().filter(|row| self.matches(row)).collect();
        if let Some(order) = &self.order {
            selected.sort_by(|a, b| {
                let ordering = compare_fields(a.get(&order.field), b.get(&order.field));
                match order.direction {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            // RFC 3339 strings with differing sub-second precision do not sort lexically.
            match (x.parse::<DateTime<Utc>>(), y.parse::<DateTime<Utc>>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Realtime channel scope: one table, optionally narrowed by an equality filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub table: Table,
    pub filter: Option<Filter>,
}

impl ChannelSpec {
    pub fn table(table: Table) -> Self {
        Self { table, filter: None }
    }

    pub fn filtered(table: Table, filter: Filter) -> Self {
        Self {
            table,
            filter: Some(filter),
        }
    }

    pub fn admits(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        match &self.filter {
            None => true,
            Some(filter) => event.row().is_some_and(|row| filter.matches(row)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One committed change, carrying raw (non-joined) rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: Table,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(table: Table, row: Value) -> Self {
        Self {
            kind: ChangeKind::Insert,
            table,
            new: Some(row),
            old: None,
        }
    }

    pub fn update(table: Table, old: Value, new: Value) -> Self {
        Self {
            kind: ChangeKind::Update,
            table,
            new: Some(new),
            old: Some(old),
        }
    }

    pub fn delete(table: Table, old: Value) -> Self {
        Self {
            kind: ChangeKind::Delete,
            table,
            new: None,
            old: Some(old),
        }
    }

    /// The row a channel filter is evaluated against.
    pub fn row(&self) -> Option<&Value> {
        self.new.as_ref().or(self.old.as_ref())
    }

    pub fn row_id(&self) -> Option<&str> {
        self.row().and_then(|row| row.get("id")).and_then(Value::as_str)
    }

    pub fn decode_new<T: DeserializeOwned>(&self) -> Result<T, BackendError> {
        let row = self.new.as_ref().ok_or_else(|| BackendError::decode("event has no new row"))?;
        decode_row(row.clone())
    }
}

pub fn decode_row<T: DeserializeOwned>(row: Value) -> Result<T, BackendError> {
    serde_json::from_value(row).map_err(BackendError::from)
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, BackendError> {
    rows.into_iter().map(decode_row).collect()
}

pub fn encode_row<T: Serialize>(row: &T) -> Result<Value, BackendError> {
    serde_json::to_value(row).map_err(BackendError::from)
}

type Closer = Box<dyn FnOnce() + Send>;

/// Open realtime channel. Dropping it (or calling [`Subscription::close`])
/// tears the channel down at the backend.
pub struct Subscription {
    spec: ChannelSpec,
    receiver: mpsc::UnboundedReceiver<ChangeEvent>,
    closer: Option<Closer>,
}

impl Subscription {
    pub fn new(
        spec: ChannelSpec,
        receiver: mpsc::UnboundedReceiver<ChangeEvent>,
        closer: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            spec,
            receiver,
            closer: Some(Box::new(closer)),
        }
    }

    pub fn spec(&self) -> &ChannelSpec {
        &self.spec
    }

    /// Waits for the next event; `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    /// Returns an already delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn close(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(closer) = self.closer.take() {
            log::debug!("closing {} channel", self.spec.table);
            closer();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("spec", &self.spec).finish_non_exhaustive()
    }
}

/// Storage, query, mutation and change-feed interface.
///
/// Every call carries the caller's session (if any) so the backend can apply
/// its row-level policies.
#[allow(async_fn_in_trait)]
pub trait DataBackend {
    async fn select(&self, session: Option<&Session>, query: &Query) -> Result<Vec<Value>, BackendError>;

    async fn count(&self, session: Option<&Session>, query: &Query) -> Result<u64, BackendError> {
        Ok(self.select(session, query).await?.len() as u64)
    }

    /// Fetches exactly one row; zero or several matches are an error.
    async fn single(&self, session: Option<&Session>, query: &Query) -> Result<Value, BackendError> {
        let mut rows = self.select(session, query).await?;
        if rows.len() != 1 {
            return Err(BackendError::NotSingle {
                table: query.table,
                found: rows.len(),
            });
        }
        Ok(rows.remove(0))
    }

    async fn insert(&self, session: Option<&Session>, table: Table, row: Value) -> Result<Value, BackendError>;

    /// Merges `patch` into every row matched by `query`; returns the updated rows.
    async fn update(&self, session: Option<&Session>, query: &Query, patch: Value) -> Result<Vec<Value>, BackendError>;

    /// Deletes every row matched by `query`; returns the removed rows.
    async fn delete(&self, session: Option<&Session>, query: &Query) -> Result<Vec<Value>, BackendError>;

    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, BackendError>;
}

/// Session issuance.
#[allow(async_fn_in_trait)]
pub trait AuthBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    /// Resolves a token to its user; `None` when the token is unknown or revoked.
    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>, BackendError>;

    /// Exchanges a live token for a fresh one.
    async fn refresh(&self, access_token: &str) -> Result<Session, BackendError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;
}

/// Full backend-as-a-service surface.
pub trait Backend: DataBackend + AuthBackend {}

impl<T: DataBackend + AuthBackend> Backend for T {}
