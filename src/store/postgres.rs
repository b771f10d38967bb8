use async_trait::async_trait;
use postgres_from_row::FromRow;
use serde_json::Value;
use tokio_postgres::{types::ToSql, Client, NoTls};

use super::{
	compile_pattern, field_matches, new_key, strip_key, with_key, Collection, DeleteResult, Document, DocumentStore, Filter,
	InsertOneResult, StoreError, UpdateResult, ID_FIELD,
};

type Params<'a> = Vec<&'a (dyn ToSql + Sync)>;

/// PostgreSQL used as a document store: one table per collection, one `JSONB` document per row.
pub struct PgStore {
	client: Client,
}

#[derive(FromRow)]
struct StoredDocument {
	id: String,
	doc: Value,
}

impl StoredDocument {
	fn into_document(self) -> Result<Document, StoreError> {
		match self.doc {
			Value::Object(map) => Ok(with_key(map, self.id)),
			_ => Err(StoreError::NotAnObject(self.id)),
		}
	}
}

#[derive(FromRow)]
struct UpdateCounts {
	matched: i64,
	modified: i64,
}

impl PgStore {
	/// Opens the single shared connection and makes sure both collection tables exist.
	pub async fn connect(url: &str) -> Result<Self, StoreError> {
		let (client, connection) = tokio_postgres::connect(url, NoTls).await?;

		tokio::spawn(async move {
			match connection.await {
				Ok(()) => log::info!("database connection closed"),
				Err(e) => log::error!("Connection error: {}", e),
			}
		});

		let store = PgStore { client };
		store.create_tables().await?;
		Ok(store)
	}

	async fn create_tables(&self) -> Result<(), StoreError> {
		for collection in Collection::ALL {
			let statement = format!(
				"CREATE TABLE IF NOT EXISTS {} (seq BIGSERIAL, id TEXT PRIMARY KEY, doc JSONB NOT NULL)",
				collection.name()
			);
			self.client.batch_execute(&statement).await?;
		}
		Ok(())
	}

	/// Documents selected by `filter`, in insertion order. Pattern filters only narrow to string fields
	/// in SQL; the pattern itself is matched in process with [`compile_pattern`].
	async fn select(&self, collection: Collection, filter: &Filter, first_only: bool) -> Result<Vec<Document>, StoreError> {
		let pattern = match filter {
			Filter::Matches { field, pattern } => Some((field.as_str(), compile_pattern(pattern)?)),
			_ => None,
		};
		let (condition, params) = where_clause(filter, 1);
		let limit = if first_only && pattern.is_none() { " LIMIT 1" } else { "" };
		let query = format!("SELECT id, doc FROM {} WHERE {} ORDER BY seq{}", collection.name(), condition, limit);
		let rows = self.client.query(query.as_str(), &params).await?;

		let mut docs = Vec::new();
		for row in &rows {
			let doc = StoredDocument::try_from_row(row)?.into_document()?;
			if pattern.as_ref().map_or(true, |(field, re)| field_matches(&doc, field, re)) {
				docs.push(doc);
				if first_only {
					break;
				}
			}
		}
		Ok(docs)
	}

	/// Narrows a pattern filter to the key of its first match, so writes can run as single SQL statements.
	/// `None` means nothing matches.
	async fn write_target(&self, collection: Collection, filter: &Filter) -> Result<Option<Filter>, StoreError> {
		if !matches!(filter, Filter::Matches { .. }) {
			return Ok(Some(filter.clone()));
		}
		let first = self.select(collection, filter, true).await?;
		Ok(first
			.first()
			.and_then(|doc| doc.get(ID_FIELD))
			.and_then(Value::as_str)
			.map(Filter::id))
	}
}

/// Renders `filter` as a `WHERE` condition whose placeholders start at `$first`.
fn where_clause(filter: &Filter, first: usize) -> (String, Params<'_>) {
	match filter {
		Filter::All => ("TRUE".to_owned(), Vec::new()),
		Filter::Id(id) => (format!("id = ${first}"), vec![id as &(dyn ToSql + Sync)]),
		Filter::Eq(field, value) => (
			format!("doc -> ${}::text = ${}::jsonb", first, first + 1),
			vec![field as &(dyn ToSql + Sync), value],
		),
		Filter::Matches { field, .. } => (
			format!("jsonb_typeof(doc -> ${first}::text) = 'string'"),
			vec![field as &(dyn ToSql + Sync)],
		),
	}
}

#[async_trait]
impl DocumentStore for PgStore {
	async fn insert_one(&self, collection: Collection, doc: Document) -> Result<InsertOneResult, StoreError> {
		let key = new_key();
		let doc = Value::Object(strip_key(doc));
		let statement = format!("INSERT INTO {} (id, doc) VALUES ($1, $2::jsonb)", collection.name());
		self.client.execute(statement.as_str(), &[&key, &doc]).await?;
		Ok(InsertOneResult::new(key))
	}

	async fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, StoreError> {
		self.select(collection, filter, false).await
	}

	async fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Document>, StoreError> {
		Ok(self.select(collection, filter, true).await?.into_iter().next())
	}

	async fn update_one(&self, collection: Collection, filter: &Filter, set: Document) -> Result<UpdateResult, StoreError> {
		let Some(filter) = self.write_target(collection, filter).await? else {
			return Ok(UpdateResult::new(0, 0));
		};
		let table = collection.name();
		let set = Value::Object(strip_key(set));
		let (condition, mut params) = where_clause(&filter, 2);
		params.insert(0, &set);
		let query = format!(
			"WITH target AS (
				SELECT id FROM {table} WHERE {condition} ORDER BY seq LIMIT 1 FOR UPDATE
			), updated AS (
				UPDATE {table} SET doc = {table}.doc || $1::jsonb FROM target
				WHERE {table}.id = target.id AND {table}.doc <> {table}.doc || $1::jsonb
				RETURNING {table}.id
			)
			SELECT (SELECT COUNT(*) FROM target) AS matched, (SELECT COUNT(*) FROM updated) AS modified"
		);
		let row = self.client.query_one(query.as_str(), &params).await?;
		let counts = UpdateCounts::try_from_row(&row)?;
		Ok(UpdateResult::new(counts.matched as u64, counts.modified as u64))
	}

	async fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<DeleteResult, StoreError> {
		let Some(filter) = self.write_target(collection, filter).await? else {
			return Ok(DeleteResult::new(0));
		};
		let table = collection.name();
		let (condition, params) = where_clause(&filter, 1);
		let statement =
			format!("DELETE FROM {table} WHERE id IN (SELECT id FROM {table} WHERE {condition} ORDER BY seq LIMIT 1)");
		let deleted = self.client.execute(statement.as_str(), &params).await?;
		Ok(DeleteResult::new(deleted))
	}

	async fn book_car(&self, car_id: &str, booking: Document) -> Result<InsertOneResult, StoreError> {
		let key = new_key();
		let booking = Value::Object(strip_key(booking));
		// One statement, so the counter bump and the insert commit or fail together.
		let statement = "WITH car AS (
				UPDATE cars SET doc = jsonb_set(doc, '{bookingCount}', to_jsonb(
					CASE WHEN jsonb_typeof(doc -> 'bookingCount') = 'number'
						THEN (doc ->> 'bookingCount')::numeric ELSE 0 END + 1))
				WHERE id = $1
				RETURNING id
			)
			INSERT INTO bookings (id, doc) VALUES ($2, $3::jsonb)";
		self.client.execute(statement, &[&car_id, &key, &booking]).await?;
		Ok(InsertOneResult::new(key))
	}
}
