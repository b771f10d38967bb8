use std::sync::Arc;

use axum::extract::FromRef;

use crate::{db_client::DbClient, verification::TokenVerifier};

/// Handles injected into the router at startup.
#[derive(Clone)]
pub struct AppState {
	pub db: DbClient,
	pub verifier: Arc<dyn TokenVerifier>,
	pub recent_limit: usize,
}

impl AppState {
	pub fn new(db: DbClient, verifier: Arc<dyn TokenVerifier>, recent_limit: usize) -> Self {
		AppState {
			db,
			verifier,
			recent_limit,
		}
	}
}

impl FromRef<AppState> for DbClient {
	fn from_ref(state: &AppState) -> Self {
		state.db.clone()
	}
}
