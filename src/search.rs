use axum::{
	extract::{Query, State},
	Json,
};
use serde::Deserialize;

use crate::{
	cars::cars::MODEL_FIELD,
	db_client::DbClient,
	error::ApiResult,
	store::{compile_pattern, Collection, Document, Filter},
};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
	#[serde(default)]
	pub search: String,
}

/// Case-insensitive pattern match on the car model. An empty term matches every car with a model.
pub async fn search(db: State<DbClient>, Query(params): Query<SearchParams>) -> ApiResult<Json<Vec<Document>>> {
	compile_pattern(&params.search)?;
	let cars = db.find(Collection::Cars, &Filter::matches(MODEL_FIELD, params.search)).await?;
	Ok(Json(cars))
}
