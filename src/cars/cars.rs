use axum::{
	extract::{Path, State},
	Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
	auth::OwnerEmail,
	context::AppState,
	db_client::DbClient,
	error::{ApiError, ApiResult},
	store::{Collection, DeleteResult, Document, Filter, InsertOneResult, UpdateResult},
};

pub const OWNER_FIELD: &str = "owner";
pub const MODEL_FIELD: &str = "model";
pub const AVAILABILITY_FIELD: &str = "availability";
pub const DATE_FIELD: &str = "date";
pub const AVAILABLE: &str = "available";

/// Fields `PUT /update-car/:id` may overwrite. Anything else in the body is ignored.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarUpdate {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub daily_price: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub availability: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub registration_number: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub features: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub image_url: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub location: Option<Value>,
}

pub(crate) fn into_document<T: Serialize>(fields: &T) -> ApiResult<Document> {
	match serde_json::to_value(fields).map_err(|e| ApiError::Store(e.into()))? {
		Value::Object(map) => Ok(map),
		_ => Ok(Document::new()),
	}
}

pub async fn recent_list(State(state): State<AppState>) -> ApiResult<Json<Vec<Document>>> {
	let mut cars = state.db.find(Collection::Cars, &Filter::All).await?;
	sort_newest_first(&mut cars);
	cars.truncate(state.recent_limit);
	Ok(Json(cars))
}

pub async fn add_car(db: State<DbClient>, _owner: OwnerEmail, Json(car): Json<Document>) -> ApiResult<Json<InsertOneResult>> {
	let result = db.insert_one(Collection::Cars, car).await?;
	log::info!("car {} listed", result.inserted_id);
	Ok(Json(result))
}

pub async fn my_cars(db: State<DbClient>, OwnerEmail(email): OwnerEmail) -> ApiResult<Json<Vec<Document>>> {
	let cars = db.find(Collection::Cars, &Filter::eq(OWNER_FIELD, email)).await?;
	Ok(Json(cars))
}

// No ownership check: any verified caller may update or delete any listing.
pub async fn update_car(
	db: State<DbClient>,
	Path(id): Path<String>,
	Json(update): Json<CarUpdate>,
) -> ApiResult<Json<UpdateResult>> {
	let set = into_document(&update)?;
	let result = db.update_one(Collection::Cars, &Filter::id(id), set).await?;
	Ok(Json(result))
}

pub async fn delete_car(db: State<DbClient>, Path(id): Path<String>) -> ApiResult<Json<DeleteResult>> {
	let result = db.delete_one(Collection::Cars, &Filter::id(&id)).await?;
	if result.deleted_count > 0 {
		log::info!("car {} deleted", id);
	}
	Ok(Json(result))
}

pub async fn available_cars(db: State<DbClient>) -> ApiResult<Json<Vec<Document>>> {
	let cars = db.find(Collection::Cars, &Filter::eq(AVAILABILITY_FIELD, AVAILABLE)).await?;
	Ok(Json(cars))
}

pub async fn car_details(db: State<DbClient>, Path(id): Path<String>) -> ApiResult<Json<Option<Document>>> {
	let car = db.find_one(Collection::Cars, &Filter::id(id)).await?;
	Ok(Json(car))
}

/// Stable sort by listing date, newest first. Undated cars go last.
pub fn sort_newest_first(cars: &mut [Document]) {
	cars.sort_by_cached_key(|car| std::cmp::Reverse(listing_date(car)));
}

pub fn listing_date(car: &Document) -> Option<DateTime<Utc>> {
	match car.get(DATE_FIELD)? {
		Value::String(raw) => parse_date(raw),
		Value::Number(millis) => millis.as_i64().and_then(DateTime::from_timestamp_millis),
		_ => None,
	}
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
	if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
		return Some(date.with_timezone(&Utc));
	}
	if let Ok(date) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
		return Some(date.and_utc());
	}
	NaiveDate::parse_from_str(raw, "%Y-%m-%d")
		.ok()
		.and_then(|date| date.and_hms_opt(0, 0, 0))
		.map(|date| date.and_utc())
}
