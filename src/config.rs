use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};

use crate::verification::firebase::GOOGLE_JWKS_URL;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_DATABASE_URL: &str = "host=localhost user=postgres dbname=car_rental";
const DEFAULT_RECENT_LIMIT: usize = 6;
const DEFAULT_JWKS_CACHE_SECS: u64 = 3600;

/// Where the Firebase service-account JSON comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
	File(PathBuf),
	Base64(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
	Postgres,
	Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
	pub port: u16,
	pub database_url: String,
	pub store: StoreKind,
	pub credentials: Credentials,
	pub recent_limit: usize,
	pub jwks_url: String,
	pub jwks_cache_ttl: Duration,
}

impl Config {
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
		let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

		let credentials = match (var("FB_SERVICE_KEY"), var("FIREBASE_SERVICE_ACCOUNT")) {
			(Some(encoded), _) => Credentials::Base64(encoded),
			(None, Some(path)) => Credentials::File(PathBuf::from(path)),
			(None, None) => bail!("either FB_SERVICE_KEY or FIREBASE_SERVICE_ACCOUNT must be set"),
		};

		let store = match var("STORE").as_deref() {
			None | Some("postgres") => StoreKind::Postgres,
			Some("memory") => StoreKind::Memory,
			Some(other) => bail!("unknown STORE {:?}, expected postgres or memory", other),
		};

		Ok(Config {
			port: parse_or(var("PORT"), "PORT", DEFAULT_PORT)?,
			database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned()),
			store,
			credentials,
			recent_limit: parse_or(var("RECENT_LIST_LIMIT"), "RECENT_LIST_LIMIT", DEFAULT_RECENT_LIMIT)?,
			jwks_url: var("FIREBASE_JWKS_URL").unwrap_or_else(|| GOOGLE_JWKS_URL.to_owned()),
			jwks_cache_ttl: Duration::from_secs(parse_or(
				var("JWKS_CACHE_SECS"),
				"JWKS_CACHE_SECS",
				DEFAULT_JWKS_CACHE_SECS,
			)?),
		})
	}
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
	T: std::str::FromStr,
	T::Err: std::error::Error + Send + Sync + 'static,
{
	match value {
		Some(raw) => raw.trim().parse().with_context(|| format!("invalid {}: {:?}", key, raw)),
		None => Ok(default),
	}
}
