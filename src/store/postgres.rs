use async_trait::async_trait;
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    Collection, DeleteOutcome, Document, DocumentStore, Filter, InsertOutcome, StoreError,
    StoreResult, StoredDocument, Update, UpdateOutcome,
};
use crate::database::Database;

type DocumentRow = (Uuid, Json<Document>);

/// Documents live in one JSONB table keyed by `(collection, id)`.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }
}

fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::All => {
            qb.push("TRUE");
        }
        Filter::Id(id) => {
            qb.push("id = ").push_bind(*id);
        }
        Filter::Eq(field, value) => {
            qb.push("(doc -> ")
                .push_bind(field.clone())
                .push(") = ")
                .push_bind(Json(value.clone()));
        }
        Filter::Contains(field, needle) => {
            // Only string values match, as in `Filter::matches`
            qb.push("(jsonb_typeof(doc -> ")
                .push_bind(field.clone())
                .push(") = 'string' AND (doc ->> ")
                .push_bind(field.clone())
                .push(") ILIKE ")
                .push_bind(like_pattern(needle))
                .push(r" ESCAPE '\')");
        }
        Filter::And(filters) => push_group(qb, filters, " AND ", "TRUE"),
        Filter::Or(filters) => push_group(qb, filters, " OR ", "FALSE"),
    }
}

fn push_group(qb: &mut QueryBuilder<'_, Postgres>, filters: &[Filter], joiner: &str, empty: &str) {
    if filters.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            qb.push(joiner);
        }
        push_filter(qb, filter);
    }
    qb.push(")");
}

/// `<head> WHERE collection = $1 AND (<filter>)`
fn scoped<'a>(head: &str, collection: Collection, filter: &Filter) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(head);
    qb.push(" WHERE collection = ").push_bind(collection.as_str()).push(" AND (");
    push_filter(&mut qb, filter);
    qb.push(")");
    qb
}

fn write_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(db.message().to_string())
        }
        other => StoreError::Database(other),
    }
}

fn into_document((id, Json(body)): DocumentRow) -> StoredDocument {
    StoredDocument { id, body }
}

impl PgDocumentStore {
    async fn write_back(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        collection: Collection,
        id: Uuid,
        body: &Document,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE documents SET doc = $1, updated_at = NOW() WHERE collection = $2 AND id = $3")
            .bind(Json(body))
            .bind(collection.as_str())
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn lock_first(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        collection: Collection,
        filter: &Filter,
    ) -> StoreResult<Option<DocumentRow>> {
        let mut qb = scoped("SELECT id, doc FROM documents", collection, filter);
        qb.push(" ORDER BY created_at, id LIMIT 1 FOR UPDATE");
        Ok(qb.build_query_as::<DocumentRow>().fetch_optional(&mut **tx).await?)
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert(&self, collection: Collection, doc: Document) -> StoreResult<InsertOutcome> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO documents (collection, id, doc) VALUES ($1, $2, $3)")
            .bind(collection.as_str())
            .bind(id)
            .bind(Json(&doc))
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(InsertOutcome { inserted_id: id })
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<StoredDocument>> {
        let mut qb = scoped("SELECT id, doc FROM documents", collection, filter);
        qb.push(" ORDER BY created_at, id");
        let rows = qb.build_query_as::<DocumentRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(into_document).collect())
    }

    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> StoreResult<Option<StoredDocument>> {
        let mut qb = scoped("SELECT id, doc FROM documents", collection, filter);
        qb.push(" ORDER BY created_at, id LIMIT 1");
        let row = qb.build_query_as::<DocumentRow>().fetch_optional(&self.pool).await?;
        Ok(row.map(into_document))
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<UpdateOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some((id, Json(mut body))) = Self::lock_first(&mut tx, collection, filter).await? else {
            tx.rollback().await?;
            return Ok(UpdateOutcome::default());
        };

        let changed = update.apply(&mut body);
        if changed {
            Self::write_back(&mut tx, collection, id, &body).await?;
        }
        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;

        if let Some((id, Json(mut body))) = Self::lock_first(&mut tx, collection, filter).await? {
            let changed = update.apply(&mut body);
            if changed {
                Self::write_back(&mut tx, collection, id, &body).await?;
            }
            tx.commit().await?;
            return Ok(UpdateOutcome {
                matched_count: 1,
                modified_count: u64::from(changed),
                upserted_id: None,
            });
        }

        let mut body = filter.seed();
        body.extend(on_insert);
        update.apply(&mut body);

        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO documents (collection, id, doc) VALUES ($1, $2, $3)")
            .bind(collection.as_str())
            .bind(id)
            .bind(Json(&body))
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;
        tx.commit().await?;

        Ok(UpdateOutcome {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id),
        })
    }

    async fn delete_one(&self, collection: Collection, filter: &Filter) -> StoreResult<DeleteOutcome> {
        let mut qb = QueryBuilder::new("DELETE FROM documents WHERE collection = ");
        qb.push_bind(collection.as_str())
            .push(" AND id = (SELECT id FROM documents WHERE collection = ")
            .push_bind(collection.as_str())
            .push(" AND (");
        push_filter(&mut qb, filter);
        qb.push(") ORDER BY created_at, id LIMIT 1)");

        let result = qb.build().execute(&self.pool).await?;
        Ok(DeleteOutcome {
            deleted_count: result.rows_affected(),
        })
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        let mut qb = scoped("SELECT COUNT(*) FROM documents", collection, filter);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
