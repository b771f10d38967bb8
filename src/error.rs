use axum::{
	response::{IntoResponse, Response},
	Json,
};
use hyper::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
	#[error("missing or invalid bearer token")]
	Unauthorized,

	#[error("query email does not match the token email")]
	Forbidden,

	#[error("invalid search pattern: {0}")]
	InvalidPattern(#[from] regex::Error),

	#[error(transparent)]
	Store(#[from] StoreError),
}

impl ApiError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
			ApiError::Forbidden => StatusCode::FORBIDDEN,
			ApiError::InvalidPattern(_) | ApiError::Store(StoreError::Pattern(_)) => StatusCode::BAD_REQUEST,
			ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub fn message(&self) -> &'static str {
		match self {
			ApiError::Unauthorized => "unAuthorized access",
			ApiError::Forbidden => "forbidden access!",
			ApiError::InvalidPattern(_) | ApiError::Store(StoreError::Pattern(_)) => "invalid search pattern",
			ApiError::Store(_) => "internal server error",
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		if status.is_server_error() {
			log::error!("request failed: {}", self);
		}
		(status, Json(json!({ "message": self.message() }))).into_response()
	}
}
