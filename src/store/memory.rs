use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    Collection, DeleteOutcome, Document, DocumentStore, Filter, InsertOutcome, StoreError,
    StoreResult, StoredDocument, Update, UpdateOutcome,
};

/// Process-local store. Documents keep insertion order per collection.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<Collection, Vec<StoredDocument>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// Mirrors the partial unique indexes on the Postgres side
fn unique_field(collection: Collection) -> Option<&'static str> {
    match collection {
        Collection::Users => Some("email"),
        Collection::Coupons => Some("code"),
        _ => None,
    }
}

fn check_unique(docs: &[StoredDocument], collection: Collection, candidate: &StoredDocument) -> StoreResult<()> {
    let Some(field) = unique_field(collection) else {
        return Ok(());
    };
    let Some(value) = candidate.body.get(field) else {
        return Ok(());
    };
    let taken = docs
        .iter()
        .any(|d| d.id != candidate.id && d.body.get(field) == Some(value));
    if taken {
        return Err(StoreError::Duplicate(format!("{collection}.{field} = {value}")));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, collection: Collection, body: Document) -> StoreResult<InsertOutcome> {
        let doc = StoredDocument { id: Uuid::new_v4(), body };
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();
        check_unique(docs, collection, &doc)?;
        let inserted_id = doc.id;
        docs.push(doc);
        Ok(InsertOutcome { inserted_id })
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<StoredDocument>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> StoreResult<Option<StoredDocument>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| filter.matches(d)).cloned()))
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<UpdateOutcome> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();
        let Some(index) = docs.iter().position(|d| filter.matches(d)) else {
            return Ok(UpdateOutcome::default());
        };

        let mut updated = docs[index].clone();
        let changed = update.apply(&mut updated.body);
        check_unique(docs, collection, &updated)?;
        docs[index] = updated;

        Ok(UpdateOutcome {
            matched_count: 1,
            modified_count: u64::from(changed),
            upserted_id: None,
        })
    }

    async fn upsert_one(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &Update,
        on_insert: Document,
    ) -> StoreResult<UpdateOutcome> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();

        if let Some(index) = docs.iter().position(|d| filter.matches(d)) {
            let mut updated = docs[index].clone();
            let changed = update.apply(&mut updated.body);
            check_unique(docs, collection, &updated)?;
            docs[index] = updated;
            return Ok(UpdateOutcome {
                matched_count: 1,
                modified_count: u64::from(changed),
                upserted_id: None,
            });
        }

        let mut body = filter.seed();
        body.extend(on_insert);
        update.apply(&mut body);
        let doc = StoredDocument { id: Uuid::new_v4(), body };
        check_unique(docs, collection, &doc)?;
        let upserted_id = doc.id;
        docs.push(doc);

        Ok(UpdateOutcome {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(upserted_id),
        })
    }

    async fn delete_one(&self, collection: Collection, filter: &Filter) -> StoreResult<DeleteOutcome> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();
        let deleted_count = match docs.iter().position(|d| filter.matches(d)) {
            Some(index) => {
                docs.remove(index);
                1
            }
            None => 0,
        };
        Ok(DeleteOutcome { deleted_count })
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).count() as u64)
            .unwrap_or(0))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
