use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use car_rental_server::{
	config::Config,
	context::AppState,
	db_client::db_client,
	routes::app,
	verification::{FirebaseVerifier, ServiceAccount},
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let config = Config::from_env()?;
	let account = ServiceAccount::load(&config.credentials)?;
	log::info!(
		"verifying tokens for firebase project {} (service account {})",
		account.project_id,
		account.client_email.as_deref().unwrap_or("unnamed")
	);
	let verifier = FirebaseVerifier::new(&account, config.jwks_url.clone(), config.jwks_cache_ttl);

	let db = db_client(&config).await?;
	let state = AppState::new(db, Arc::new(verifier), config.recent_limit);

	let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
	let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {}", addr))?;
	log::info!("server is running on port {}", config.port);

	axum::serve(listener, app(state)).with_graceful_shutdown(shutdown_signal()).await?;

	// The router, and with it the last store handle, is dropped here; the connection task ends with it.
	log::info!("server stopped");
	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		log::error!("failed to listen for shutdown signal: {}", e);
		std::future::pending::<()>().await;
	}
	log::info!("shutting down");
}
