//! Shared helpers for tests: deterministic signing keys, canned claims,
//! state construction and database seeding.

use crate::{
    AppState, Config,
    auth::{identity::TokenClaims, verifier::TokenVerifier},
    config::{BasicAuthConfig, OidcConfig},
    db::{
        handlers::Objects,
        models::objects::{ObjectCreateDBRequest, ObjectDBResponse, VersionCreateDBRequest, VersionDBResponse},
    },
    storage::{self, StorageHead, StorageProber},
    types::{ObjectId, Permission, SYSTEM_USER, UserId},
};
use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// RSA keypair used to mint bearer tokens in tests. Test-only material.
pub const TEST_RSA_PRIVATE_PEM: &str = include_str!("../tests/fixtures/test-signing-key.pem");
pub const TEST_RSA_PUBLIC_PEM: &str = include_str!("../tests/fixtures/test-signing-key.pub.pem");

/// Issuer matching the OIDC settings of [`create_test_config`].
pub const TEST_ISSUER: &str = "https://auth.example.com/realms/storage";

/// Claims for a fixed test subject.
pub fn test_claims() -> TokenClaims {
    TokenClaims {
        sub: "4a5170b2-74df-41ba-a2b5-1c9c5b71dcee".to_string(),
        preferred_username: Some("jdoe".to_string()),
        identity_provider_identity: None,
        given_name: Some("Jane".to_string()),
        family_name: Some("Doe".to_string()),
        name: Some("Jane Doe".to_string()),
        email: Some("jane.doe@example.com".to_string()),
        identity_provider: Some("idir".to_string()),
    }
}

/// Sign `claims` with the test key, stamping the given issuer and a one-hour
/// expiry.
pub fn sign_test_token(claims: &TokenClaims, issuer: &str) -> String {
    let mut payload = serde_json::to_value(claims).expect("claims serialize");
    let map = payload.as_object_mut().unwrap();
    map.insert("iss".to_string(), serde_json::json!(issuer));
    map.insert("exp".to_string(), serde_json::json!(Utc::now().timestamp() + 3600));

    let key = EncodingKey::from_rsa_pem(TEST_RSA_PRIVATE_PEM.as_bytes()).expect("test signing key");
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &payload, &key).expect("sign test token")
}

/// Corrupt a signed token's signature while leaving header and payload
/// intact.
pub fn tamper_signature(token: &str) -> String {
    let (rest, signature) = token.rsplit_once('.').expect("JWT has three segments");
    let mut signature: Vec<char> = signature.chars().collect();
    signature[5] = if signature[5] == 'A' { 'B' } else { 'A' };
    format!("{rest}.{}", signature.into_iter().collect::<String>())
}

/// `Authorization: Basic` header value for a credential pair.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {encoded}")
}

/// In-memory storage prober: probes succeed only for keys seeded with
/// [`StaticStorage::with_head`].
#[derive(Default)]
pub struct StaticStorage {
    heads: HashMap<String, StorageHead>,
}

impl StaticStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_head(mut self, key: &str, head: StorageHead) -> Self {
        self.heads.insert(key.to_string(), head);
        self
    }
}

#[async_trait]
impl StorageProber for StaticStorage {
    async fn head_object(&self, key: &str) -> storage::Result<StorageHead> {
        self.heads.get(key).cloned().ok_or(storage::StorageError::NotFound)
    }
}

/// Config with both auth schemes enabled and local bearer verification
/// against the test keypair.
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.auth.basic = Some(BasicAuthConfig {
        username: "gateway".to_string(),
        password: "trusted-secret".to_string(),
    });
    config.auth.oidc = Some(OidcConfig {
        server_url: Url::parse("https://auth.example.com").unwrap(),
        realm: "storage".to_string(),
        public_key: Some(TEST_RSA_PUBLIC_PEM.to_string()),
        client_id: None,
        client_secret: None,
    });
    config
}

pub fn create_test_state(pool: PgPool) -> AppState {
    create_test_state_with_storage(pool, StaticStorage::new())
}

pub fn create_test_state_with_storage(pool: PgPool, storage: StaticStorage) -> AppState {
    let config = create_test_config();
    let verifier = config
        .auth
        .oidc
        .as_ref()
        .map(|oidc| Arc::new(TokenVerifier::from_config(oidc).expect("test verifier")));

    AppState::builder()
        .db(pool)
        .config(config)
        .storage(Arc::new(storage) as Arc<dyn StorageProber>)
        .maybe_verifier(verifier)
        .build()
}

pub async fn create_test_object(pool: &PgPool, public: bool) -> ObjectDBResponse {
    let mut conn = pool.acquire().await.unwrap();
    Objects::new(&mut conn)
        .create(&ObjectCreateDBRequest {
            path: format!("uploads/{}", uuid::Uuid::new_v4()),
            public,
            created_by: SYSTEM_USER,
        })
        .await
        .expect("Failed to create test object")
}

pub async fn create_test_version(pool: &PgPool, object_id: ObjectId) -> VersionDBResponse {
    let mut conn = pool.acquire().await.unwrap();
    Objects::new(&mut conn)
        .create_version(&VersionCreateDBRequest {
            object_id,
            s3_version_id: Some(uuid::Uuid::new_v4().to_string()),
            mime_type: Some("application/octet-stream".to_string()),
            delete_marker: false,
            created_by: SYSTEM_USER,
        })
        .await
        .expect("Failed to create test version")
}

/// Seed a permission row directly; the production code path only reads them.
pub async fn grant_permission(pool: &PgPool, object_id: ObjectId, user_id: UserId, permission: Permission) {
    sqlx::query(
        "INSERT INTO object_permissions (object_id, user_id, permission, created_by) VALUES ($1, $2, $3, $2)",
    )
    .bind(object_id)
    .bind(user_id)
    .bind(permission.code())
    .execute(pool)
    .await
    .expect("Failed to grant test permission");
}
