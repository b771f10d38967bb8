use std::sync::Arc;

use anyhow::Context;

use crate::{
	config::{Config, StoreKind},
	store::{DocumentStore, MemoryStore, PgStore},
};

/// Process-wide store handle, opened once at startup and shared by every handler.
pub type DbClient = Arc<dyn DocumentStore>;

pub async fn db_client(config: &Config) -> anyhow::Result<DbClient> {
	match config.store {
		StoreKind::Postgres => {
			let store = PgStore::connect(&config.database_url)
				.await
				.context("failed to connect to the database")?;
			log::info!("connected to the database");
			Ok(Arc::new(store))
		}
		StoreKind::Memory => {
			log::warn!("using the in-memory store, nothing will be persisted");
			Ok(Arc::new(MemoryStore::new()))
		}
	}
}
