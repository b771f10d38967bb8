use axum::{
	async_trait,
	extract::{FromRequestParts, Query, Request, State},
	http::{header::AUTHORIZATION, request::Parts, HeaderMap},
	middleware::Next,
	response::Response,
};
use serde::Deserialize;

use crate::{context::AppState, error::ApiError, verification::VerifiedIdentity};

/// Token from an `Authorization: <scheme> <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
	headers
		.get(AUTHORIZATION)?
		.to_str()
		.ok()?
		.split(' ')
		.nth(1)
		.filter(|token| !token.is_empty())
}

/// Verifies the bearer token and attaches the [`VerifiedIdentity`] to the request.
pub async fn verify_token(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
	let Some(token) = bearer_token(req.headers()).map(str::to_owned) else {
		log::warn!("{} {}: no bearer token", req.method(), req.uri().path());
		return Err(ApiError::Unauthorized);
	};

	let identity = state.verifier.verify(&token).await.map_err(|e| {
		log::warn!("{} {}: token rejected: {}", req.method(), req.uri().path(), e);
		ApiError::Unauthorized
	})?;

	req.extensions_mut().insert(identity);
	Ok(next.run(req).await)
}

#[derive(Deserialize)]
struct EmailQuery {
	email: Option<String>,
}

/// The `email` query parameter, accepted only when it equals the verified token email.
///
/// Extraction fails with [`ApiError::Forbidden`] before the handler body runs, so a
/// mismatched caller never reaches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerEmail(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for OwnerEmail
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let identity = parts.extensions.get::<VerifiedIdentity>().ok_or(ApiError::Unauthorized)?;
		let requested = Query::<EmailQuery>::try_from_uri(&parts.uri).ok().and_then(|Query(q)| q.email);

		match (requested, identity.email.as_deref()) {
			(Some(requested), Some(verified)) if requested == verified => Ok(OwnerEmail(requested)),
			(requested, verified) => {
				log::warn!(
					"{}: email {:?} does not match token email {:?}",
					parts.uri.path(),
					requested,
					verified
				);
				Err(ApiError::Forbidden)
			}
		}
	}
}
