//! Document storage.
//!
//! Every entity lives in a [`Collection`] as a JSON object keyed by a
//! store-assigned UUID. Handlers talk to the [`DocumentStore`] trait; the
//! Postgres backend keeps documents in a JSONB table and the memory backend
//! keeps them in a map (tests, local runs).
//!
//! Filter and update semantics are defined once here ([`Filter::matches`],
//! [`Update::apply`]) so both backends agree on what "matches" and "merge"
//! mean.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

/// A stored JSON object, without its id.
pub type Document = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("expected a JSON object")]
    NotAnObject,
    #[error("duplicate key: {0}")]
    Duplicate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Bookings,
    Users,
    Announcements,
    Coupons,
    Courts,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Bookings => "bookings",
            Collection::Users => "users",
            Collection::Announcements => "announcements",
            Collection::Coupons => "coupons",
            Collection::Courts => "courts",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: Uuid,
    pub body: Document,
}

/// Query over the top-level fields of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Id(Uuid),
    /// Field equals the JSON value exactly.
    Eq(String, Value),
    /// String field contains the needle, ignoring case.
    Contains(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::Contains(field.into(), needle.into())
    }

    /// `self AND other`, flattening nested conjunctions and dropping `All`.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), f) => {
                left.push(f);
                Filter::And(left)
            }
            (f, Filter::And(mut right)) => {
                right.insert(0, f);
                Filter::And(right)
            }
            (left, right) => Filter::And(vec![left, right]),
        }
    }

    pub fn matches(&self, doc: &StoredDocument) -> bool {
        match self {
            Filter::All => true,
            Filter::Id(id) => doc.id == *id,
            Filter::Eq(field, value) => doc.body.get(field) == Some(value),
            Filter::Contains(field, needle) => match doc.body.get(field) {
                Some(Value::String(s)) => s.to_lowercase().contains(&needle.to_lowercase()),
                _ => false,
            },
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }

    /// Equality constraints a freshly upserted document must satisfy.
    pub fn seed(&self) -> Document {
        let mut seed = Document::new();
        self.collect_seed(&mut seed);
        seed
    }

    fn collect_seed(&self, seed: &mut Document) {
        match self {
            Filter::Eq(field, value) => {
                seed.insert(field.clone(), value.clone());
            }
            Filter::And(filters) => filters.iter().for_each(|f| f.collect_seed(seed)),
            _ => {}
        }
    }
}

/// Partial update: merge `set` into the document, then drop `unset` fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Document,
    pub unset: Vec<String>,
}

impl Update {
    pub fn set(set: Document) -> Self {
        Self { set, unset: Vec::new() }
    }

    pub fn with_unset(mut self, field: impl Into<String>) -> Self {
        self.unset.push(field.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Applies the update in place. Returns whether the document changed.
    pub fn apply(&self, doc: &mut Document) -> bool {
        let mut changed = false;
        for (field, value) in &self.set {
            if doc.get(field) != Some(value) {
                doc.insert(field.clone(), value.clone());
                changed = true;
            }
        }
        for field in &self.unset {
            changed |= doc.remove(field).is_some();
        }
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
    pub inserted_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub deleted_count: u64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: Collection, doc: Document) -> StoreResult<InsertOutcome>;

    /// All matching documents, oldest first.
    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<StoredDocument>>;

    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> StoreResult<Option<StoredDocument>>;

    /// Applies `update` to the first matching document.
    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<UpdateOutcome>;

    /// Like [`update_one`](Self::update_one), but inserts
    /// `filter.seed() + on_insert + update.set` when nothing matches.
    async fn upsert_one(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &Update,
        on_insert: Document,
    ) -> StoreResult<UpdateOutcome>;

    async fn delete_one(&self, collection: Collection, filter: &Filter) -> StoreResult<DeleteOutcome>;

    async fn count(&self, collection: Collection, filter: &Filter) -> StoreResult<u64>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Typed record: the document id plus the deserialized body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: Uuid,
    #[serde(flatten)]
    pub data: T,
}

impl<T: DeserializeOwned> TryFrom<StoredDocument> for Record<T> {
    type Error = StoreError;

    fn try_from(doc: StoredDocument) -> Result<Self, Self::Error> {
        Ok(Record {
            id: doc.id,
            data: serde_json::from_value(Value::Object(doc.body))?,
        })
    }
}

/// Serializes a value that must come out as a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject),
    }
}

/// Typed helpers on top of any [`DocumentStore`].
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    async fn insert_record<T>(&self, collection: Collection, value: &T) -> StoreResult<InsertOutcome>
    where
        T: Serialize + Sync,
    {
        self.insert(collection, to_document(value)?).await
    }

    async fn find_records<T>(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Record<T>>>
    where
        T: DeserializeOwned + Send,
    {
        self.find(collection, filter)
            .await?
            .into_iter()
            .map(Record::try_from)
            .collect()
    }

    async fn find_record<T>(&self, collection: Collection, filter: &Filter) -> StoreResult<Option<Record<T>>>
    where
        T: DeserializeOwned + Send,
    {
        self.find_one(collection, filter)
            .await?
            .map(Record::try_from)
            .transpose()
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}
