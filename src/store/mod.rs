use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A schema-less JSON record. Documents read back from a store carry their key under `_id`.
pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";
pub const BOOKING_COUNT_FIELD: &str = "bookingCount";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
	Cars,
	Bookings,
}

impl Collection {
	pub const ALL: [Collection; 2] = [Collection::Cars, Collection::Bookings];

	pub fn name(&self) -> &'static str {
		match self {
			Collection::Cars => "cars",
			Collection::Bookings => "bookings",
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
	All,
	Id(String),
	Eq(String, Value),
	/// Case-insensitive regular expression match on a string field.
	Matches { field: String, pattern: String },
}

impl Filter {
	pub fn id(id: impl Into<String>) -> Self {
		Filter::Id(id.into())
	}

	pub fn eq(field: &str, value: impl Into<Value>) -> Self {
		Filter::Eq(field.to_owned(), value.into())
	}

	pub fn matches(field: &str, pattern: impl Into<String>) -> Self {
		Filter::Matches {
			field: field.to_owned(),
			pattern: pattern.into(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOneResult {
	pub acknowledged: bool,
	pub inserted_id: String,
}

impl InsertOneResult {
	pub fn new(inserted_id: String) -> Self {
		InsertOneResult {
			acknowledged: true,
			inserted_id,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
	pub acknowledged: bool,
	pub matched_count: u64,
	pub modified_count: u64,
	pub upserted_id: Option<String>,
	pub upserted_count: u64,
}

impl UpdateResult {
	pub fn new(matched_count: u64, modified_count: u64) -> Self {
		UpdateResult {
			acknowledged: true,
			matched_count,
			modified_count,
			upserted_id: None,
			upserted_count: 0,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
	pub acknowledged: bool,
	pub deleted_count: u64,
}

impl DeleteResult {
	pub fn new(deleted_count: u64) -> Self {
		DeleteResult {
			acknowledged: true,
			deleted_count,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("database error: {0}")]
	Database(#[from] tokio_postgres::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("invalid pattern: {0}")]
	Pattern(#[from] regex::Error),

	#[error("stored document {0} is not a JSON object")]
	NotAnObject(String),
}

/// Remote document store holding the `cars` and `bookings` collections.
///
/// Update and delete touch at most one document. A filter that matches nothing
/// is not an error: the returned counts are zero.
#[async_trait]
pub trait DocumentStore: Send + Sync {
	async fn insert_one(&self, collection: Collection, doc: Document) -> Result<InsertOneResult, StoreError>;

	async fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, StoreError>;

	async fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Document>, StoreError>;

	/// Overwrites the top-level fields of `set` on the first matching document.
	async fn update_one(&self, collection: Collection, filter: &Filter, set: Document) -> Result<UpdateResult, StoreError>;

	async fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<DeleteResult, StoreError>;

	/// Increments `bookingCount` on car `car_id` and inserts `booking`, both in one atomic write.
	/// The booking is inserted even when no car has that key.
	async fn book_car(&self, car_id: &str, booking: Document) -> Result<InsertOneResult, StoreError>;
}

pub(crate) fn new_key() -> String {
	Uuid::new_v4().to_string()
}

/// Store-assigned keys are never taken from the caller.
pub(crate) fn strip_key(mut doc: Document) -> Document {
	doc.remove(ID_FIELD);
	doc
}

pub(crate) fn with_key(mut doc: Document, key: String) -> Document {
	doc.insert(ID_FIELD.to_owned(), Value::String(key));
	doc
}

/// Compiles the pattern of a [`Filter::Matches`]. Every backend matches with this engine, never its own.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
	RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Only string fields can match a pattern.
pub(crate) fn field_matches(doc: &Document, field: &str, re: &Regex) -> bool {
	doc.get(field).and_then(Value::as_str).is_some_and(|s| re.is_match(s))
}

/// The counter after one more booking. Numbers keep their kind, anything else restarts at 1.
pub(crate) fn next_booking_count(current: Option<&Value>) -> Value {
	match current {
		Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
			(Some(count), _) => Value::from(count + 1),
			(None, Some(count)) => Value::from(count + 1.0),
			_ => Value::from(1),
		},
		_ => Value::from(1),
	}
}

/// `$set` semantics. Returns whether any field actually changed.
pub(crate) fn apply_set(doc: &mut Document, set: Document) -> bool {
	let mut changed = false;
	for (field, value) in strip_key(set) {
		if doc.get(&field) != Some(&value) {
			doc.insert(field, value);
			changed = true;
		}
	}
	changed
}
