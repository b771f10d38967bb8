use std::{
	collections::HashMap,
	time::{Duration, Instant},
};

use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{TokenVerifier, VerifiedIdentity, VerifyError};
use crate::config::Credentials;

pub const GOOGLE_JWKS_URL: &str =
	"https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const ISSUER_PREFIX: &str = "https://securetoken.google.com/";
const CLOCK_SKEW_SECS: i64 = 60;
const UNKNOWN_KID_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

/// The parts of a Firebase service-account file the verifier needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
	pub project_id: String,
	#[serde(default)]
	pub client_email: Option<String>,
}

impl ServiceAccount {
	pub fn from_json(raw: &[u8]) -> anyhow::Result<Self> {
		serde_json::from_slice(raw).context("service account is not valid JSON or has no project_id")
	}

	pub fn load(credentials: &Credentials) -> anyhow::Result<Self> {
		match credentials {
			Credentials::File(path) => {
				let raw = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
				Self::from_json(&raw)
			}
			Credentials::Base64(encoded) => {
				let raw = STANDARD.decode(encoded.trim()).context("service account key is not valid base64")?;
				Self::from_json(&raw)
			}
		}
	}
}

#[derive(Deserialize)]
struct JwkSet {
	keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
	kid: String,
	n: String,
	e: String,
}

#[derive(Deserialize)]
struct FirebaseClaims {
	sub: String,
	#[serde(default)]
	email: Option<String>,
	#[serde(default)]
	iat: Option<i64>,
}

struct SigningKeys {
	fetched_at: Instant,
	keys: HashMap<String, DecodingKey>,
}

/// Verifies Firebase Authentication ID tokens against Google's published signing keys.
pub struct FirebaseVerifier {
	http: reqwest::Client,
	jwks_url: String,
	key_ttl: Duration,
	/// An unknown `kid` triggers a refetch only when the cached set is at least this old.
	refetch_interval: Duration,
	validation: Validation,
	keys: RwLock<Option<SigningKeys>>,
}

impl FirebaseVerifier {
	pub fn new(account: &ServiceAccount, jwks_url: impl Into<String>, key_ttl: Duration) -> Self {
		let mut validation = Validation::new(Algorithm::RS256);
		validation.set_audience(&[&account.project_id]);
		validation.set_issuer(&[format!("{}{}", ISSUER_PREFIX, account.project_id)]);
		validation.leeway = CLOCK_SKEW_SECS as u64;

		FirebaseVerifier {
			http: reqwest::Client::new(),
			jwks_url: jwks_url.into(),
			key_ttl,
			refetch_interval: UNKNOWN_KID_REFETCH_INTERVAL,
			validation,
			keys: RwLock::new(None),
		}
	}

	async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, VerifyError> {
		{
			let cached = self.keys.read().await;
			if let Some(signing) = cached.as_ref().filter(|s| s.fetched_at.elapsed() < self.key_ttl) {
				if let Some(key) = signing.keys.get(kid) {
					return Ok(key.clone());
				}
			}
		}

		// Held across the fetch so concurrent misses wait for one request instead of each sending their own.
		let mut cached = self.keys.write().await;
		if let Some(signing) = cached.as_ref().filter(|s| s.fetched_at.elapsed() < self.key_ttl) {
			if let Some(key) = signing.keys.get(kid) {
				return Ok(key.clone());
			}
			if signing.fetched_at.elapsed() < self.refetch_interval {
				return Err(VerifyError::UnknownKeyId(kid.to_owned()));
			}
		}

		let keys = self.fetch_keys().await?;
		let key = keys.get(kid).cloned();
		*cached = Some(SigningKeys {
			fetched_at: Instant::now(),
			keys,
		});
		key.ok_or_else(|| VerifyError::UnknownKeyId(kid.to_owned()))
	}

	async fn fetch_keys(&self) -> Result<HashMap<String, DecodingKey>, VerifyError> {
		log::debug!("fetching signing keys from {}", self.jwks_url);
		let set: JwkSet = self.http.get(&self.jwks_url).send().await?.error_for_status()?.json().await?;
		set.keys
			.into_iter()
			.map(|jwk| -> Result<_, VerifyError> { Ok((jwk.kid, DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?)) })
			.collect()
	}
}

#[async_trait]
impl TokenVerifier for FirebaseVerifier {
	async fn verify(&self, token: &str) -> Result<VerifiedIdentity, VerifyError> {
		let header = decode_header(token)?;
		let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;
		let key = self.decoding_key(&kid).await?;
		let claims = decode::<FirebaseClaims>(token, &key, &self.validation)?.claims;

		if claims.sub.is_empty() {
			return Err(VerifyError::EmptySubject);
		}
		if claims.iat.is_some_and(|iat| iat > Utc::now().timestamp() + CLOCK_SKEW_SECS) {
			return Err(VerifyError::IssuedInFuture);
		}

		Ok(VerifiedIdentity {
			uid: claims.sub,
			email: claims.email,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	};

	use axum::{routing::get, Json, Router};
	use jsonwebtoken::{encode, EncodingKey, Header};
	use serde_json::{json, Value};

	const PROJECT: &str = "demo-project";
	const KID: &str = "test-key";
	const SIGNING_KEY: &[u8] = include_bytes!("testdata/signing_key.pem");
	const MODULUS: &str = "tB99UjJ7EMfG4HPLqtZMossJKK5cD2BiXh9rQggic3rPjtUQzh6t9CFTcr8QQbQE0QZiDLL7JDWxsQXI2greLx0Wx2q6dBJLtYmtgRP-KYjAX78uzIscTSnEzj7OX1w7jIAiUT_Z_3rXxZC-X0IeP5abya1KAlpmoMRSjZjipcJsmFjMCbDzvj3uVjq_D7noeq2mNPRGF21o7rP98lEsz7_rMgSK8sTppyQNOdOwi7a-sxe-R7uOltgFY7QeE343x5050Ev0U6vZDe4nAAPzjFvcppNZAtHgdLykGQCXR8ZXfLlvQgXi4lxGkrSsfMpYrQ8KAauL0_RuvUANAyVkRw";

	async fn serve_jwks() -> String {
		serve_counted_jwks(Arc::default()).await
	}

	async fn serve_counted_jwks(hits: Arc<AtomicUsize>) -> String {
		let jwks = json!({"keys": [{"kid": KID, "kty": "RSA", "alg": "RS256", "use": "sig", "n": MODULUS, "e": "AQAB"}]});
		let app = Router::new().route("/jwks", get(move || {
			let jwks = jwks.clone();
			hits.fetch_add(1, Ordering::SeqCst);
			async move { Json(jwks) }
		}));
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		format!("http://{}/jwks", addr)
	}

	fn verifier(jwks_url: String) -> FirebaseVerifier {
		let account = ServiceAccount {
			project_id: PROJECT.to_owned(),
			client_email: None,
		};
		FirebaseVerifier::new(&account, jwks_url, Duration::from_secs(3600))
	}

	fn sign(claims: Value, kid: Option<&str>) -> String {
		let mut header = Header::new(Algorithm::RS256);
		header.kid = kid.map(str::to_owned);
		encode(&header, &claims, &EncodingKey::from_rsa_pem(SIGNING_KEY).unwrap()).unwrap()
	}

	fn claims(audience: &str) -> Value {
		let now = Utc::now().timestamp();
		json!({
			"sub": "uid-1",
			"email": "a@x.com",
			"aud": audience,
			"iss": format!("{}{}", ISSUER_PREFIX, audience),
			"iat": now,
			"exp": now + 3600,
		})
	}

	#[tokio::test]
	async fn accepts_a_token_signed_by_a_published_key() {
		let verifier = verifier(serve_jwks().await);
		let identity = verifier.verify(&sign(claims(PROJECT), Some(KID))).await.unwrap();
		assert_eq!(
			identity,
			VerifiedIdentity {
				uid: "uid-1".into(),
				email: Some("a@x.com".into())
			}
		);
	}

	#[tokio::test]
	async fn rejects_a_token_for_another_project() {
		let verifier = verifier(serve_jwks().await);
		let err = verifier.verify(&sign(claims("other-project"), Some(KID))).await;
		assert!(matches!(err, Err(VerifyError::Jwt(_))));
	}

	#[tokio::test]
	async fn rejects_expired_tokens() {
		let verifier = verifier(serve_jwks().await);
		let mut expired = claims(PROJECT);
		expired["exp"] = json!(Utc::now().timestamp() - 3600);
		expired["iat"] = json!(Utc::now().timestamp() - 7200);
		assert!(matches!(verifier.verify(&sign(expired, Some(KID))).await, Err(VerifyError::Jwt(_))));
	}

	#[tokio::test]
	async fn rejects_unknown_or_missing_key_ids() {
		let verifier = verifier(serve_jwks().await);
		let unknown = verifier.verify(&sign(claims(PROJECT), Some("rotated-away"))).await;
		assert!(matches!(unknown, Err(VerifyError::UnknownKeyId(kid)) if kid == "rotated-away"));

		let missing = verifier.verify(&sign(claims(PROJECT), None)).await;
		assert!(matches!(missing, Err(VerifyError::MissingKeyId)));
	}

	#[tokio::test]
	async fn unknown_key_ids_do_not_refetch_a_fresh_key_set() {
		let hits = Arc::new(AtomicUsize::new(0));
		let verifier = verifier(serve_counted_jwks(hits.clone()).await);

		verifier.verify(&sign(claims(PROJECT), Some(KID))).await.unwrap();
		for n in 0..5 {
			let kid = format!("made-up-{n}");
			let err = verifier.verify(&sign(claims(PROJECT), Some(&kid))).await;
			assert!(matches!(err, Err(VerifyError::UnknownKeyId(_))));
		}
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn unknown_key_ids_refetch_once_the_interval_has_passed() {
		let hits = Arc::new(AtomicUsize::new(0));
		let mut verifier = verifier(serve_counted_jwks(hits.clone()).await);
		verifier.refetch_interval = Duration::ZERO;

		verifier.verify(&sign(claims(PROJECT), Some(KID))).await.unwrap();
		let err = verifier.verify(&sign(claims(PROJECT), Some("rotated-in"))).await;
		assert!(matches!(err, Err(VerifyError::UnknownKeyId(_))));
		assert_eq!(hits.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn concurrent_misses_share_one_fetch() {
		let hits = Arc::new(AtomicUsize::new(0));
		let verifier = Arc::new(verifier(serve_counted_jwks(hits.clone()).await));
		let token = sign(claims(PROJECT), Some(KID));

		let tasks: Vec<_> = (0..10)
			.map(|_| {
				let verifier = verifier.clone();
				let token = token.clone();
				tokio::spawn(async move { verifier.verify(&token).await })
			})
			.collect();
		for task in tasks {
			task.await.unwrap().unwrap();
		}
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn rejects_garbage() {
		let verifier = verifier(serve_jwks().await);
		assert!(matches!(verifier.verify("not-a-jwt").await, Err(VerifyError::Jwt(_))));
	}

	#[test]
	fn service_account_loads_from_base64() {
		let raw = br#"{"type":"service_account","project_id":"demo-project","client_email":"svc@demo.iam"}"#;
		let account = ServiceAccount::load(&Credentials::Base64(STANDARD.encode(raw))).unwrap();
		assert_eq!(account.project_id, "demo-project");
		assert_eq!(account.client_email.as_deref(), Some("svc@demo.iam"));

		assert!(ServiceAccount::load(&Credentials::Base64("***".into())).is_err());
		assert!(ServiceAccount::from_json(br#"{"client_email":"svc@demo.iam"}"#).is_err());
	}
}
