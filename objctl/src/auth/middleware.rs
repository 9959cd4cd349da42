//! Authentication middleware.
//!
//! Resolves the `Authorization` header into an immutable [`Identity`] and
//! attaches it to the request. Requests without credentials (or with a
//! scheme that is not configured) proceed unauthenticated; presenting bad
//! credentials halts the request.

use crate::{
    AppState,
    auth::identity::Identity,
    config::BasicAuthConfig,
    db::{errors::DbError, handlers::Users},
    errors::{Error, Result},
};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use base64::Engine as _;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{instrument, trace};

/// Middleware resolving the caller's credentials into an `Arc<Identity>`
/// request extension.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response> {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    let identity = resolve_identity(&state, authorization.as_deref()).await?;
    request.extensions_mut().insert(Arc::new(identity));

    Ok(next.run(request).await)
}

#[instrument(skip_all)]
pub(crate) async fn resolve_identity(state: &AppState, authorization: Option<&str>) -> Result<Identity> {
    let Some(authorization) = authorization else {
        trace!("No authorization header present");
        return Ok(Identity::anonymous());
    };

    let (scheme, credentials) = match authorization.split_once(' ') {
        Some((scheme, credentials)) => (scheme.to_ascii_lowercase(), credentials.trim()),
        None => (authorization.to_ascii_lowercase(), ""),
    };

    // Basic Authorization
    if scheme == "basic"
        && let Some(basic) = &state.config.auth.basic
    {
        return verify_basic(basic, credentials);
    }

    // OIDC bearer Authorization
    if scheme == "bearer"
        && let Some(verifier) = &state.verifier
    {
        let token = credentials;
        let claims = verifier.verify(token).await?;

        // A login failure means the authenticated identity could not be
        // durably recorded; it propagates instead of degrading the request
        // to anonymous.
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        let mut users = Users::new(&mut conn);
        let user = users.login(&claims).await?;

        return Ok(Identity::bearer(claims, user));
    }

    // Unrecognized scheme, or a scheme with no matching configuration:
    // proceed unauthenticated
    trace!("Authorization scheme {scheme:?} not handled, continuing unauthenticated");
    Ok(Identity::anonymous())
}

fn verify_basic(expected: &BasicAuthConfig, encoded: &str) -> Result<Identity> {
    fn invalid() -> Error {
        Error::Unauthenticated {
            detail: "Invalid authorization credentials".to_string(),
        }
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    let (username, password) = decoded.split_once(':').ok_or_else(invalid)?;

    // Constant-time comparison of both halves, combined with a logical AND
    let username_match: bool = username.as_bytes().ct_eq(expected.username.as_bytes()).into();
    let password_match: bool = password.as_bytes().ct_eq(expected.password.as_bytes()).into();

    if username_match && password_match {
        Ok(Identity::basic())
    } else {
        Err(invalid())
    }
}
