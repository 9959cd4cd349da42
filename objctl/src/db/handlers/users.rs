//! Database repository for users.
//!
//! `login` is the identity reconciler: it maps a verified token payload onto
//! a user row, creating the row on first login and patching it only when at
//! least one mapped field changed.

use crate::{
    auth::identity::TokenClaims,
    db::{
        errors::{DbError, Result},
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
    types::{UserId, abbrev_uuid},
};
use sqlx::{Connection, PgConnection};
use tracing::instrument;
use uuid::Uuid;

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Map token claims onto user fields.
    ///
    /// The provider-scoped `identity_provider_identity` claim is preferred
    /// over `preferred_username` for the username.
    fn token_to_user(claims: &TokenClaims) -> Result<UserCreateDBRequest> {
        let oidc_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| DbError::Other(anyhow::anyhow!("Token subject is not a valid user id: {e}")))?;

        Ok(UserCreateDBRequest {
            oidc_id,
            username: claims
                .identity_provider_identity
                .clone()
                .or_else(|| claims.preferred_username.clone()),
            full_name: claims.name.clone(),
            first_name: claims.given_name.clone(),
            last_name: claims.family_name.clone(),
            email: claims.email.clone(),
            idp: claims.identity_provider.clone(),
        })
    }

    /// Reconcile a verified token payload with the users table.
    ///
    /// First login inserts the row; later logins patch it only when a mapped
    /// field differs, otherwise the existing row is returned without a write.
    #[instrument(skip(self, claims), fields(sub = %claims.sub), err)]
    pub async fn login(&mut self, claims: &TokenClaims) -> Result<UserDBResponse> {
        let incoming = Self::token_to_user(claims)?;

        match self.find(incoming.oidc_id).await? {
            None => self.create(&incoming).await,
            Some(existing) => self.update_if_changed(existing, &incoming).await,
        }
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&oidc_id)), err)]
    pub async fn find(&mut self, oidc_id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE oidc_id = $1")
            .bind(oidc_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    /// Read a user row, failing with [`DbError::NotFound`] when absent.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&oidc_id)), err)]
    pub async fn read(&mut self, oidc_id: UserId) -> Result<UserDBResponse> {
        self.find(oidc_id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.oidc_id)), err)]
    async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (oidc_id, username, full_name, first_name, last_name, email, idp, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $1)
            "#,
        )
        .bind(request.oidc_id)
        .bind(&request.username)
        .bind(&request.full_name)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.email)
        .bind(&request.idp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        // Read-after-write so defaulted columns come back from the database
        self.read(request.oidc_id).await
    }

    #[instrument(skip(self, existing, incoming), fields(user_id = %abbrev_uuid(&incoming.oidc_id)), err)]
    async fn update_if_changed(&mut self, existing: UserDBResponse, incoming: &UserCreateDBRequest) -> Result<UserDBResponse> {
        if !existing.differs_from(incoming) {
            // Nothing to update
            return Ok(existing);
        }

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE users SET
                username = $2,
                full_name = $3,
                first_name = $4,
                last_name = $5,
                email = $6,
                idp = $7,
                updated_by = $1,
                updated_at = NOW()
            WHERE oidc_id = $1
            "#,
        )
        .bind(incoming.oidc_id)
        .bind(&incoming.username)
        .bind(&incoming.full_name)
        .bind(&incoming.first_name)
        .bind(&incoming.last_name)
        .bind(&incoming.email)
        .bind(&incoming.idp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.read(incoming.oidc_id).await
    }
}
