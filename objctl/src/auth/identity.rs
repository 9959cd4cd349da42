//! Per-request identity descriptor.

use crate::db::models::users::UserDBResponse;
use crate::types::UserId;
use serde::{Deserialize, Serialize};

/// How the caller authenticated, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    None,
    Basic,
    Bearer,
}

/// Decoded claims of a verified bearer token.
///
/// Only the claims this gateway maps onto user records are modelled; anything
/// else in the token is ignored by deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Identity-provider subject id
    pub sub: String,
    #[serde(default)]
    pub preferred_username: Option<String>,
    /// Provider-scoped username; preferred over `preferred_username` when set
    #[serde(default)]
    pub identity_provider_identity: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub identity_provider: Option<String>,
}

/// Immutable record of how the current request authenticated.
///
/// Constructed exactly once by the authentication middleware and shared with
/// downstream request stages as `Arc<Identity>`. All fields are private;
/// nothing past the middleware can change the authentication outcome.
#[derive(Debug)]
pub struct Identity {
    auth_type: AuthType,
    token_payload: Option<TokenClaims>,
    user: Option<UserDBResponse>,
}

impl Identity {
    /// No credentials were presented (or no auth scheme is configured).
    pub fn anonymous() -> Self {
        Self {
            auth_type: AuthType::None,
            token_payload: None,
            user: None,
        }
    }

    /// The shared-secret credential pair matched.
    pub fn basic() -> Self {
        Self {
            auth_type: AuthType::Basic,
            token_payload: None,
            user: None,
        }
    }

    /// A bearer token verified and the carrying user was reconciled.
    pub fn bearer(token_payload: TokenClaims, user: UserDBResponse) -> Self {
        Self {
            auth_type: AuthType::Bearer,
            token_payload: Some(token_payload),
            user: Some(user),
        }
    }

    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    pub fn token_payload(&self) -> Option<&TokenClaims> {
        self.token_payload.as_ref()
    }

    pub fn user(&self) -> Option<&UserDBResponse> {
        self.user.as_ref()
    }

    /// Persisted user id, present only for bearer identities.
    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.oidc_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity() {
        let identity = Identity::anonymous();
        assert_eq!(identity.auth_type(), AuthType::None);
        assert!(identity.token_payload().is_none());
        assert!(identity.user().is_none());
        assert!(identity.user_id().is_none());
    }

    #[test]
    fn test_basic_identity_has_no_user() {
        let identity = Identity::basic();
        assert_eq!(identity.auth_type(), AuthType::Basic);
        assert!(identity.user_id().is_none());
    }

    #[test]
    fn test_claims_ignore_unknown_fields() {
        let claims: TokenClaims = serde_json::from_value(serde_json::json!({
            "sub": "4a5170b2-74df-41ba-a2b5-1c9c5b71dcee",
            "email": "someone@example.com",
            "azp": "storage-client",
            "scope": "openid profile email"
        }))
        .unwrap();
        assert_eq!(claims.sub, "4a5170b2-74df-41ba-a2b5-1c9c5b71dcee");
        assert_eq!(claims.email.as_deref(), Some("someone@example.com"));
        assert!(claims.identity_provider_identity.is_none());
    }
}
