//! Collection reconciliation for server-driven mutations.
//!
//! Every list the client caches (IP blacklist, trades, API errors) is kept in
//! a [`Collection`] and changed only by folding [`Action`]s through
//! [`reconcile`]. Actions come from two places: fetch results (initial load,
//! pagination, refetch) and realtime pushes. Both go through the same pure
//! function, so the rules below are the whole of the list protocol.
//!
//! # Rules
//!
//! ```text
//! create           -> prepend, or insert at the sorted position
//! update           -> replace by key, re-sort if sorted, no match = no-op
//! delete           -> remove by key, no match = no-op
//! append_page      -> concatenate (no de-duplication)
//! replace_snapshot -> discard and substitute
//! ```
//!
//! The input collection is never mutated; a new one is returned.

use std::cmp::Ordering;
use std::fmt;

use balancer_types::{Record, SortDirection};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

// ============================================================================
// Actions
// ============================================================================

/// One mutation that happened upstream.
///
/// Wire form: `{ "kind": "create", "payload": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
#[serde(bound(
    serialize = "T: Serialize, T::Key: Serialize",
    deserialize = "T: Deserialize<'de>, T::Key: Deserialize<'de>"
))]
pub enum Action<T: Record> {
    /// A record was created.
    Create(T),
    /// A record changed; the payload is its full new value.
    Update(T),
    /// The record with this key was deleted.
    Delete(T::Key),
    /// One more page of older records ("load more").
    AppendPage(Vec<T>),
    /// The whole collection as the server currently sees it.
    ReplaceSnapshot(Vec<T>),
}

/// Discriminant of an [`Action`], for logging and wire validation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::VariantNames,
)]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    AppendPage,
    ReplaceSnapshot,
}

impl<T: Record> Action<T> {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Create(_) => ActionKind::Create,
            Action::Update(_) => ActionKind::Update,
            Action::Delete(_) => ActionKind::Delete,
            Action::AppendPage(_) => ActionKind::AppendPage,
            Action::ReplaceSnapshot(_) => ActionKind::ReplaceSnapshot,
        }
    }
}

/// Errors at the untyped boundary where actions arrive as JSON.
///
/// Typed callers cannot produce these: the [`Action`] match is exhaustive.
/// An unknown kind means the sender and this reconciler disagree about the
/// protocol, so callers propagate it instead of reporting it to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("unknown action kind: {kind}")]
    UnknownAction { kind: String },

    #[error("action has no `{tag}` field")]
    MissingTag { tag: &'static str },

    #[error("malformed `{kind}` action: {reason}")]
    Malformed { kind: String, reason: String },
}

/// Decode a JSON message tagged by `tag`, rejecting tags outside `known`.
///
/// The tag is checked before the payload so an unrecognized kind is reported
/// as such rather than as a generic parse failure.
pub(crate) fn decode_tagged<A: DeserializeOwned>(
    raw: &str,
    tag: &'static str,
    known: &[&str],
) -> Result<A, ReconcileError> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| ReconcileError::Malformed {
        kind: "<unparsed>".to_string(),
        reason: e.to_string(),
    })?;

    let kind = value
        .get(tag)
        .and_then(|k| k.as_str())
        .ok_or(ReconcileError::MissingTag { tag })?
        .to_string();

    if !known.contains(&kind.as_str()) {
        return Err(ReconcileError::UnknownAction { kind });
    }

    serde_json::from_value(value).map_err(|e| ReconcileError::Malformed { kind, reason: e.to_string() })
}

/// Decode a generic `{ "kind", "payload" }` action.
pub fn decode_action<T>(raw: &str) -> Result<Action<T>, ReconcileError>
where
    T: Record + DeserializeOwned,
    T::Key: DeserializeOwned,
{
    use strum::VariantNames;
    decode_tagged(raw, "kind", ActionKind::VARIANTS)
}

// ============================================================================
// Sorting
// ============================================================================

/// An explicit sort key: a named comparable field plus a fixed direction.
pub struct SortSpec<T> {
    field: &'static str,
    direction: SortDirection,
    compare: fn(&T, &T) -> Ordering,
}

impl<T> SortSpec<T> {
    /// `compare` must order ascending; `direction` is applied on top.
    pub fn new(field: &'static str, direction: SortDirection, compare: fn(&T, &T) -> Ordering) -> Self {
        Self { field, direction, compare }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    pub fn cmp(&self, a: &T, b: &T) -> Ordering {
        self.direction.apply((self.compare)(a, b))
    }
}

impl<T> Clone for SortSpec<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SortSpec<T> {}

impl<T> fmt::Debug for SortSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortSpec")
            .field("field", &self.field)
            .field("direction", &self.direction)
            .finish()
    }
}

// ============================================================================
// Collection
// ============================================================================

/// An ordered list of records of one type, unique by key.
#[derive(Clone)]
pub struct Collection<T: Record> {
    records: Vec<T>,
    sort: Option<SortSpec<T>>,
}

impl<T: Record> Collection<T> {
    /// Empty, insertion-ordered (newest first) collection.
    pub fn new() -> Self {
        Self { records: Vec::new(), sort: None }
    }

    /// Empty collection kept in `sort` order.
    pub fn with_sort(sort: SortSpec<T>) -> Self {
        Self { records: Vec::new(), sort: Some(sort) }
    }

    /// Seed with records in the order given.
    pub fn from_records(records: Vec<T>) -> Self {
        Self { records, sort: None }
    }

    /// Same sort spec, different records. Sorted collections re-sort.
    fn derive(&self, mut records: Vec<T>) -> Self {
        if let Some(spec) = self.sort {
            records.sort_by(|a, b| spec.cmp(a, b));
        }
        Self { records, sort: self.sort }
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn sort_spec(&self) -> Option<&SortSpec<T>> {
        self.sort.as_ref()
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.records.iter().find(|r| &r.key() == key)
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.get(key).is_some()
    }

    /// Key of the last record, the cursor for the next page.
    pub fn last_key(&self) -> Option<T::Key> {
        self.records.last().map(Record::key)
    }

    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    /// Shorthand for [`reconcile`].
    pub fn apply(&self, action: Action<T>) -> Self {
        reconcile(action, self)
    }
}

impl<T: Record> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("records", &self.records)
            .field("sort", &self.sort)
            .finish()
    }
}

impl<T: Record + PartialEq> PartialEq for Collection<T> {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Apply one action to a collection, returning the next collection.
pub fn reconcile<T: Record>(action: Action<T>, collection: &Collection<T>) -> Collection<T> {
    let kind = action.kind();
    let next = match action {
        Action::Create(record) => create(collection, record),
        Action::Update(record) => update(collection, record),
        Action::Delete(key) => delete(collection, &key),
        Action::AppendPage(page) => {
            let mut records = Vec::with_capacity(collection.len() + page.len());
            records.extend(collection.records.iter().cloned());
            records.extend(page);
            Collection { records, sort: collection.sort }
        }
        Action::ReplaceSnapshot(records) => collection.derive(records),
    };
    trace!(%kind, before = collection.len(), after = next.len(), "reconciled");
    next
}

fn create<T: Record>(collection: &Collection<T>, record: T) -> Collection<T> {
    let key = record.key();

    // A create for a key we already hold keeps the key unique: the stale
    // entry is dropped and the new one placed as a fresh record.
    let existing: Vec<T> = if collection.contains(&key) {
        debug!(?key, "create for existing key, replacing");
        collection.records.iter().filter(|r| r.key() != key).cloned().collect()
    } else {
        collection.records.clone()
    };

    let mut records = Vec::with_capacity(existing.len() + 1);
    match collection.sort {
        None => {
            records.push(record);
            records.extend(existing);
        }
        Some(spec) => {
            let at = existing.partition_point(|r| spec.cmp(r, &record) != Ordering::Greater);
            let mut existing = existing;
            let tail = existing.split_off(at);
            records.extend(existing);
            records.push(record);
            records.extend(tail);
        }
    }
    Collection { records, sort: collection.sort }
}

fn update<T: Record>(collection: &Collection<T>, record: T) -> Collection<T> {
    let key = record.key();
    if !collection.contains(&key) {
        trace!(?key, "update for unknown key ignored");
        return collection.clone();
    }

    let records = collection
        .records
        .iter()
        .map(|r| if r.key() == key { record.clone() } else { r.clone() })
        .collect();
    collection.derive(records)
}

fn delete<T: Record>(collection: &Collection<T>, key: &T::Key) -> Collection<T> {
    let records = collection.records.iter().filter(|r| &r.key() != key).cloned().collect();
    Collection { records, sort: collection.sort }
}
