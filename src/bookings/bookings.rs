use axum::{
	extract::{Path, State},
	Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
	auth::OwnerEmail,
	cars::cars::into_document,
	db_client::DbClient,
	error::ApiResult,
	store::{Collection, Document, Filter, InsertOneResult, UpdateResult},
};

pub const CAR_ID_FIELD: &str = "carId";
pub const EMAIL_FIELD: &str = "email";

/// Fields `PATCH /update-booking/:id` may overwrite.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingUpdate {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub start_date: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub end_date: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub total_price: Option<Value>,
}

pub async fn book_car(
	db: State<DbClient>,
	_renter: OwnerEmail,
	Path(car_id): Path<String>,
	Json(mut booking): Json<Document>,
) -> ApiResult<Json<InsertOneResult>> {
	booking
		.entry(CAR_ID_FIELD)
		.or_insert_with(|| Value::String(car_id.clone()));
	let result = db.book_car(&car_id, booking).await?;
	log::info!("car {} booked as {}", car_id, result.inserted_id);
	Ok(Json(result))
}

pub async fn my_bookings(db: State<DbClient>, OwnerEmail(email): OwnerEmail) -> ApiResult<Json<Vec<Document>>> {
	let bookings = db.find(Collection::Bookings, &Filter::eq(EMAIL_FIELD, email)).await?;
	Ok(Json(bookings))
}

pub async fn update_booking(
	db: State<DbClient>,
	Path(id): Path<String>,
	Json(update): Json<BookingUpdate>,
) -> ApiResult<Json<UpdateResult>> {
	let set = into_document(&update)?;
	let result = db.update_one(Collection::Bookings, &Filter::id(id), set).await?;
	Ok(Json(result))
}

/// Overwrites whatever fields the caller sends, typically `{"status": "cancelled"}`.
pub async fn cancel_booking(
	db: State<DbClient>,
	Path(id): Path<String>,
	Json(fields): Json<Document>,
) -> ApiResult<Json<UpdateResult>> {
	let result = db.update_one(Collection::Bookings, &Filter::id(id), fields).await?;
	Ok(Json(result))
}
