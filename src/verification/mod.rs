use async_trait::async_trait;

pub mod firebase;

pub use firebase::{FirebaseVerifier, ServiceAccount};

/// Identity attached to a request once its bearer token checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
	pub uid: String,
	pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
	#[error("JWT error: {0}")]
	Jwt(#[from] jsonwebtoken::errors::Error),

	#[error("token header has no key id")]
	MissingKeyId,

	#[error("no signing key with id {0}")]
	UnknownKeyId(String),

	#[error("failed to fetch signing keys: {0}")]
	KeyFetch(#[from] reqwest::Error),

	#[error("token has an empty subject")]
	EmptySubject,

	#[error("token was issued in the future")]
	IssuedInFuture,
}

/// External identity provider. Every call performs a full verification; results are never cached.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
	async fn verify(&self, token: &str) -> Result<VerifiedIdentity, VerifyError>;
}
