use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
	apply_set, compile_pattern, field_matches, new_key, next_booking_count, strip_key, with_key, Collection, DeleteResult,
	Document, DocumentStore, Filter, InsertOneResult, StoreError, UpdateResult, BOOKING_COUNT_FIELD,
};

/// In-process store. Documents are kept in insertion order, keyed per collection.
#[derive(Default)]
pub struct MemoryStore {
	collections: RwLock<HashMap<Collection, Vec<(String, Document)>>>,
}

enum Matcher<'a> {
	All,
	Id(&'a str),
	Eq(&'a str, &'a Value),
	Pattern(&'a str, Regex),
}

impl<'a> Matcher<'a> {
	fn new(filter: &'a Filter) -> Result<Self, StoreError> {
		Ok(match filter {
			Filter::All => Matcher::All,
			Filter::Id(id) => Matcher::Id(id),
			Filter::Eq(field, value) => Matcher::Eq(field, value),
			Filter::Matches { field, pattern } => Matcher::Pattern(field, compile_pattern(pattern)?),
		})
	}

	fn test(&self, key: &str, doc: &Document) -> bool {
		match self {
			Matcher::All => true,
			Matcher::Id(id) => key == *id,
			Matcher::Eq(field, value) => doc.get(*field) == Some(*value),
			Matcher::Pattern(field, re) => field_matches(doc, field, re),
		}
	}
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl DocumentStore for MemoryStore {
	async fn insert_one(&self, collection: Collection, doc: Document) -> Result<InsertOneResult, StoreError> {
		let key = new_key();
		let mut collections = self.collections.write().await;
		collections.entry(collection).or_default().push((key.clone(), strip_key(doc)));
		Ok(InsertOneResult::new(key))
	}

	async fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, StoreError> {
		let matcher = Matcher::new(filter)?;
		let collections = self.collections.read().await;
		let docs = collections
			.get(&collection)
			.map(|docs| {
				docs.iter()
					.filter(|(key, doc)| matcher.test(key, doc))
					.map(|(key, doc)| with_key(doc.clone(), key.clone()))
					.collect()
			})
			.unwrap_or_default();
		Ok(docs)
	}

	async fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Document>, StoreError> {
		let matcher = Matcher::new(filter)?;
		let collections = self.collections.read().await;
		let doc = collections
			.get(&collection)
			.and_then(|docs| docs.iter().find(|(key, doc)| matcher.test(key, doc)))
			.map(|(key, doc)| with_key(doc.clone(), key.clone()));
		Ok(doc)
	}

	async fn update_one(&self, collection: Collection, filter: &Filter, set: Document) -> Result<UpdateResult, StoreError> {
		let matcher = Matcher::new(filter)?;
		let mut collections = self.collections.write().await;
		let target = collections
			.get_mut(&collection)
			.and_then(|docs| docs.iter_mut().find(|(key, doc)| matcher.test(key, doc)));
		let result = match target {
			Some((_, doc)) => {
				let modified = apply_set(doc, set);
				UpdateResult::new(1, u64::from(modified))
			}
			None => UpdateResult::new(0, 0),
		};
		Ok(result)
	}

	async fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<DeleteResult, StoreError> {
		let matcher = Matcher::new(filter)?;
		let mut collections = self.collections.write().await;
		let Some(docs) = collections.get_mut(&collection) else {
			return Ok(DeleteResult::new(0));
		};
		match docs.iter().position(|(key, doc)| matcher.test(key, doc)) {
			Some(index) => {
				docs.remove(index);
				Ok(DeleteResult::new(1))
			}
			None => Ok(DeleteResult::new(0)),
		}
	}

	async fn book_car(&self, car_id: &str, booking: Document) -> Result<InsertOneResult, StoreError> {
		let key = new_key();
		let mut collections = self.collections.write().await;
		if let Some((_, car)) = collections
			.get_mut(&Collection::Cars)
			.and_then(|cars| cars.iter_mut().find(|(id, _)| id == car_id))
		{
			let count = next_booking_count(car.get(BOOKING_COUNT_FIELD));
			car.insert(BOOKING_COUNT_FIELD.to_owned(), count);
		}
		collections
			.entry(Collection::Bookings)
			.or_default()
			.push((key.clone(), strip_key(booking)));
		Ok(InsertOneResult::new(key))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::ID_FIELD;
	use serde_json::json;

	fn doc(value: Value) -> Document {
		match value {
			Value::Object(map) => map,
			_ => panic!("not an object"),
		}
	}

	#[tokio::test]
	async fn inserted_documents_come_back_with_their_key() {
		let store = MemoryStore::new();
		let result = store
			.insert_one(Collection::Cars, doc(json!({"_id": "spoofed", "owner": "a@x.com"})))
			.await
			.unwrap();
		assert!(result.acknowledged);
		assert_ne!(result.inserted_id, "spoofed");

		let car = store.find_one(Collection::Cars, &Filter::id(&result.inserted_id)).await.unwrap().unwrap();
		assert_eq!(car[ID_FIELD], json!(result.inserted_id));
		assert_eq!(car["owner"], "a@x.com");
	}

	#[tokio::test]
	async fn collections_are_separate() {
		let store = MemoryStore::new();
		store.insert_one(Collection::Cars, doc(json!({"email": "a@x.com"}))).await.unwrap();
		let bookings = store.find(Collection::Bookings, &Filter::eq("email", "a@x.com")).await.unwrap();
		assert!(bookings.is_empty());
	}

	#[tokio::test]
	async fn pattern_filter_ignores_case_and_non_strings() {
		let store = MemoryStore::new();
		store.insert_one(Collection::Cars, doc(json!({"model": "Honda Civic"}))).await.unwrap();
		store.insert_one(Collection::Cars, doc(json!({"model": "Corolla"}))).await.unwrap();
		store.insert_one(Collection::Cars, doc(json!({"model": 42}))).await.unwrap();

		let found = store.find(Collection::Cars, &Filter::matches("model", "CIVIC")).await.unwrap();
		assert_eq!(found.len(), 1);
		assert_eq!(found[0]["model"], "Honda Civic");

		let err = store.find(Collection::Cars, &Filter::matches("model", "(")).await;
		assert!(matches!(err, Err(StoreError::Pattern(_))));
	}

	#[tokio::test]
	async fn update_and_delete_of_missing_key_match_nothing() {
		let store = MemoryStore::new();
		let update = store
			.update_one(Collection::Cars, &Filter::id("missing"), doc(json!({"model": "x"})))
			.await
			.unwrap();
		assert_eq!(update, UpdateResult::new(0, 0));

		let delete = store.delete_one(Collection::Cars, &Filter::id("missing")).await.unwrap();
		assert_eq!(delete, DeleteResult::new(0));
	}

	#[tokio::test]
	async fn update_counts_modified_only_on_change() {
		let store = MemoryStore::new();
		let id = store.insert_one(Collection::Cars, doc(json!({"model": "Civic"}))).await.unwrap().inserted_id;

		let same = store.update_one(Collection::Cars, &Filter::id(&id), doc(json!({"model": "Civic"}))).await.unwrap();
		assert_eq!(same, UpdateResult::new(1, 0));

		let changed = store.update_one(Collection::Cars, &Filter::id(&id), doc(json!({"model": "Jazz"}))).await.unwrap();
		assert_eq!(changed, UpdateResult::new(1, 1));
	}

	#[tokio::test]
	async fn book_car_increments_and_inserts() {
		let store = MemoryStore::new();
		let car_id = store.insert_one(Collection::Cars, doc(json!({"model": "Civic"}))).await.unwrap().inserted_id;

		store.book_car(&car_id, doc(json!({"email": "r@x.com"}))).await.unwrap();
		store.book_car(&car_id, doc(json!({"email": "r@x.com"}))).await.unwrap();

		let car = store.find_one(Collection::Cars, &Filter::id(&car_id)).await.unwrap().unwrap();
		assert_eq!(car[BOOKING_COUNT_FIELD], 2);
		assert_eq!(store.find(Collection::Bookings, &Filter::All).await.unwrap().len(), 2);
	}

	#[tokio::test]
	async fn book_car_without_car_still_inserts_booking() {
		let store = MemoryStore::new();
		store.book_car("missing", doc(json!({"email": "r@x.com"}))).await.unwrap();
		assert_eq!(store.find(Collection::Bookings, &Filter::All).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn book_car_keeps_fractional_counts_and_resets_strings() {
		let store = MemoryStore::new();
		let fractional = store
			.insert_one(Collection::Cars, doc(json!({"bookingCount": 1.5})))
			.await
			.unwrap()
			.inserted_id;
		let text = store
			.insert_one(Collection::Cars, doc(json!({"bookingCount": "3"})))
			.await
			.unwrap()
			.inserted_id;

		store.book_car(&fractional, doc(json!({}))).await.unwrap();
		store.book_car(&text, doc(json!({}))).await.unwrap();

		let car = store.find_one(Collection::Cars, &Filter::id(&fractional)).await.unwrap().unwrap();
		assert_eq!(car[BOOKING_COUNT_FIELD], 2.5);
		let car = store.find_one(Collection::Cars, &Filter::id(&text)).await.unwrap().unwrap();
		assert_eq!(car[BOOKING_COUNT_FIELD], 1);
	}
}
