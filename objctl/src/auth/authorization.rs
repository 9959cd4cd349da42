//! Resource loading and permission gating.
//!
//! [`current_object`] resolves the object addressed by the request path into
//! a request-scoped [`CurrentObject`]; [`check_permission`] halts the
//! request unless the caller holds the required permission on it.

use crate::{
    AppState,
    auth::identity::{AuthType, Identity},
    db::{
        errors::DbError,
        handlers::{ObjectPermissions, Objects},
        models::objects::ObjectDBResponse,
    },
    errors::{Error, Result},
    storage::StorageHead,
    types::{ObjectId, Permission, UserId, abbrev_uuid},
};
use axum::{
    extract::{RawPathParams, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Request-scoped merged view of the persisted object row and the storage
/// backend's head probe. Storage-head values win over persisted metadata
/// where both carry a field.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CurrentObject {
    pub id: ObjectId,
    pub path: String,
    pub public: bool,
    pub active: bool,
    pub created_by: UserId,
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
    pub e_tag: Option<String>,
    pub s3_version_id: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl CurrentObject {
    fn merge(record: ObjectDBResponse, head: StorageHead) -> Self {
        Self {
            id: record.id,
            path: record.path,
            public: record.public,
            active: record.active,
            created_by: record.created_by,
            content_length: head.content_length,
            content_type: head.content_type,
            e_tag: head.e_tag,
            s3_version_id: head.s3_version_id,
            // Head probe wins; the record's audit timestamp is the fallback
            last_modified: head.last_modified.or(Some(record.updated_at)),
        }
    }
}

/// Middleware attaching the current object addressed by the `object_id` path
/// parameter, when it can be loaded.
///
/// A missing or blank parameter, and any failure loading metadata or the
/// storage head, all result in no current object; the request proceeds
/// either way. The permission gate turns the absence into a denial.
pub async fn current_object(
    State(state): State<AppState>,
    params: RawPathParams,
    mut request: Request,
    next: Next,
) -> Response {
    let object_id = params
        .iter()
        .find(|(name, _)| *name == "object_id")
        .map(|(_, value)| value.trim().to_string());

    if let Some(object_id) = object_id.filter(|id| !id.is_empty()) {
        match load_current_object(&state, &object_id).await {
            Ok(current) => {
                request.extensions_mut().insert(Arc::new(current));
            }
            Err(err) => {
                debug!("Could not load current object {object_id}: {err:#}");
            }
        }
    }

    next.run(request).await
}

#[instrument(skip(state))]
async fn load_current_object(state: &AppState, raw_id: &str) -> anyhow::Result<CurrentObject> {
    let id: ObjectId = Uuid::parse_str(raw_id)?;

    // The metadata read and the head probe are independent; run both
    // concurrently and wait for both to settle.
    let (record, head) = tokio::join!(
        async {
            let mut conn = state.db.acquire().await?;
            let record = Objects::new(&mut conn).read(id).await?;
            anyhow::Ok(record)
        },
        state.storage.head_object(raw_id),
    );

    let record = record?.ok_or_else(|| anyhow::anyhow!("object {raw_id} has no metadata record"))?;
    let head = head?;

    Ok(CurrentObject::merge(record, head))
}

/// Middleware gating the route on `required` permission for the current
/// object.
///
/// Wired per route with a closure fixing the permission:
///
/// ```ignore
/// get(read_object).route_layer(from_fn_with_state(
///     state.clone(),
///     |state: State<AppState>, request: Request, next: Next| {
///         check_permission(Permission::Read, state, request, next)
///     },
/// ))
/// ```
pub async fn check_permission(
    required: Permission,
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    // No loaded resource means no access, before any oracle consultation
    let current = request
        .extensions()
        .get::<Arc<CurrentObject>>()
        .cloned()
        .ok_or_else(|| Error::Forbidden {
            detail: "Resource does not exist or is not associated with this request".to_string(),
        })?;

    let identity = request.extensions().get::<Arc<Identity>>().cloned();
    let auth_type = identity.as_ref().map(|i| i.auth_type()).unwrap_or(AuthType::None);

    let granted = match auth_type {
        // The shared-secret credential pair is the gateway service account
        // and holds every permission
        AuthType::Basic => true,
        _ => {
            let user_id = identity.as_ref().and_then(|i| i.user_id());
            let mut conn = state.db.acquire().await.map_err(DbError::from)?;
            ObjectPermissions::new(&mut conn)
                .has_permission(current.id, user_id, required)
                .await?
        }
    };

    if !granted {
        return Err(Error::Forbidden {
            detail: format!(
                "User lacks {required} permission on object {}",
                abbrev_uuid(&current.id)
            ),
        });
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::middleware::authenticate;
    use crate::test_utils::{
        StaticStorage, TEST_ISSUER, basic_auth_header, create_test_object, create_test_state_with_storage,
        grant_permission, sign_test_token, test_claims,
    };
    use axum::{
        Extension, Json, Router,
        middleware::from_fn_with_state,
        routing::get,
    };
    use axum_test::TestServer;
    use serde_json::{Value, json};
    use sqlx::PgPool;
    use uuid::Uuid;

    async fn probe(current: Option<Extension<Arc<CurrentObject>>>) -> Json<Value> {
        match current {
            Some(Extension(current)) => Json(json!({
                "loaded": true,
                "object": current.as_ref(),
            })),
            None => Json(json!({ "loaded": false })),
        }
    }

    /// Router mirroring the production middleware stack with a probe handler.
    fn probe_server(state: AppState, required: Permission) -> TestServer {
        let router = Router::new()
            .route(
                "/objects/{object_id}",
                get(probe).route_layer(from_fn_with_state(
                    state.clone(),
                    move |state: State<AppState>, request: Request, next: Next| {
                        check_permission(required, state, request, next)
                    },
                )),
            )
            .route("/unparameterized", get(probe))
            .layer(from_fn_with_state(state.clone(), current_object))
            .layer(from_fn_with_state(state.clone(), authenticate))
            .with_state(state);

        TestServer::new(router).expect("Failed to create test server")
    }

    /// Loader-only router without the permission gate.
    fn loader_server(state: AppState) -> TestServer {
        let router = Router::new()
            .route("/objects/{object_id}", get(probe))
            .route("/unparameterized", get(probe))
            .layer(from_fn_with_state(state.clone(), current_object))
            .with_state(state);

        TestServer::new(router).expect("Failed to create test server")
    }

    #[sqlx::test]
    async fn test_no_object_id_param_attaches_nothing(pool: PgPool) {
        let server = loader_server(create_test_state_with_storage(pool, StaticStorage::new()));

        let body: Value = server.get("/unparameterized").await.json();
        assert_eq!(body["loaded"], json!(false));
    }

    #[sqlx::test]
    async fn test_blank_object_id_attaches_nothing(pool: PgPool) {
        let server = loader_server(create_test_state_with_storage(pool, StaticStorage::new()));

        let response = server.get("/objects/%20").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["loaded"], json!(false));
    }

    #[sqlx::test]
    async fn test_metadata_failure_is_swallowed(pool: PgPool) {
        // No object row exists; the storage head alone is not enough
        let id = Uuid::new_v4();
        let storage = StaticStorage::new().with_head(&id.to_string(), StorageHead::default());
        let server = loader_server(create_test_state_with_storage(pool, storage));

        let response = server.get(&format!("/objects/{id}")).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["loaded"], json!(false));
    }

    #[sqlx::test]
    async fn test_storage_failure_is_swallowed(pool: PgPool) {
        // Object row exists but the backend probe fails with not-found
        let object = create_test_object(&pool, false).await;
        let server = loader_server(create_test_state_with_storage(pool, StaticStorage::new()));

        let response = server.get(&format!("/objects/{}", object.id)).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["loaded"], json!(false));
    }

    #[sqlx::test]
    async fn test_merged_view_prefers_storage_head(pool: PgPool) {
        let object = create_test_object(&pool, false).await;
        let head = StorageHead {
            content_length: Some(42),
            content_type: Some("text/plain".to_string()),
            e_tag: Some("\"abc123\"".to_string()),
            s3_version_id: Some("v-head".to_string()),
            last_modified: Some("2024-06-01T12:00:00Z".parse().unwrap()),
        };
        let storage = StaticStorage::new().with_head(&object.id.to_string(), head);
        let server = loader_server(create_test_state_with_storage(pool, storage));

        let body: Value = server.get(&format!("/objects/{}", object.id)).await.json();
        assert_eq!(body["loaded"], json!(true));
        assert_eq!(body["object"]["content_length"], json!(42));
        assert_eq!(body["object"]["s3_version_id"], json!("v-head"));
        // The head probe's timestamp wins over the record's audit timestamp
        assert_eq!(body["object"]["last_modified"], json!("2024-06-01T12:00:00Z"));
        // Persisted fields still come from the record
        assert_eq!(body["object"]["path"], json!(object.path));
    }

    #[sqlx::test]
    async fn test_merged_view_falls_back_to_record_timestamp(pool: PgPool) {
        let object = create_test_object(&pool, false).await;
        let storage = StaticStorage::new().with_head(&object.id.to_string(), StorageHead::default());
        let server = loader_server(create_test_state_with_storage(pool, storage));

        let body: Value = server.get(&format!("/objects/{}", object.id)).await.json();
        assert_eq!(body["loaded"], json!(true));
        assert!(body["object"]["last_modified"].is_string());
    }

    #[sqlx::test]
    async fn test_gate_denies_without_current_object(pool: PgPool) {
        let server = probe_server(create_test_state_with_storage(pool, StaticStorage::new()), Permission::Read);

        let response = server.get(&format!("/objects/{}", Uuid::new_v4())).await;
        response.assert_status_forbidden();
        let body: Value = response.json();
        assert_eq!(body["status"], json!(403));
    }

    #[sqlx::test]
    async fn test_gate_denies_anonymous_on_private_object(pool: PgPool) {
        let object = create_test_object(&pool, false).await;
        let storage = StaticStorage::new().with_head(&object.id.to_string(), StorageHead::default());
        let server = probe_server(create_test_state_with_storage(pool, storage), Permission::Read);

        let response = server.get(&format!("/objects/{}", object.id)).await;
        response.assert_status_forbidden();
    }

    #[sqlx::test]
    async fn test_gate_allows_anonymous_read_on_public_object(pool: PgPool) {
        let object = create_test_object(&pool, true).await;
        let storage = StaticStorage::new().with_head(&object.id.to_string(), StorageHead::default());
        let server = probe_server(create_test_state_with_storage(pool, storage), Permission::Read);

        let response = server.get(&format!("/objects/{}", object.id)).await;
        response.assert_status_ok();
    }

    #[sqlx::test]
    async fn test_gate_grants_service_account_everything(pool: PgPool) {
        let object = create_test_object(&pool, false).await;
        let storage = StaticStorage::new().with_head(&object.id.to_string(), StorageHead::default());
        let server = probe_server(create_test_state_with_storage(pool, storage), Permission::Delete);

        let response = server
            .get(&format!("/objects/{}", object.id))
            .add_header("authorization", basic_auth_header("gateway", "trusted-secret"))
            .await;
        response.assert_status_ok();
    }

    #[sqlx::test]
    async fn test_gate_honors_granted_bearer_permission(pool: PgPool) {
        let object = create_test_object(&pool, false).await;
        let claims = test_claims();
        grant_permission(&pool, object.id, claims.sub.parse().unwrap(), Permission::Update).await;

        let storage = StaticStorage::new().with_head(&object.id.to_string(), StorageHead::default());
        let state = create_test_state_with_storage(pool, storage);
        let token = sign_test_token(&claims, TEST_ISSUER);

        // Granted action passes
        let server = probe_server(state.clone(), Permission::Update);
        let response = server
            .get(&format!("/objects/{}", object.id))
            .add_header("authorization", format!("Bearer {token}"))
            .await;
        response.assert_status_ok();

        // An action outside the grant is denied
        let server = probe_server(state, Permission::Delete);
        let response = server
            .get(&format!("/objects/{}", object.id))
            .add_header("authorization", format!("Bearer {token}"))
            .await;
        response.assert_status_forbidden();
    }
}
