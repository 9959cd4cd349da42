//! Read side of the object permission model.
//!
//! Permission rows are written by the grant-management surface; this
//! repository only answers authorization queries over them.

use crate::{
    db::errors::Result,
    types::{ObjectId, Permission, UserId, abbrev_uuid},
};
use sqlx::PgConnection;
use tracing::instrument;

pub struct ObjectPermissions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ObjectPermissions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Whether `user_id` (or an anonymous caller, when `None`) holds
    /// `permission` on the object.
    ///
    /// Public objects are readable by everyone; every other combination
    /// requires an explicit permission row. A missing object grants nothing.
    #[instrument(skip(self), fields(object_id = %abbrev_uuid(&object_id), permission = %permission), err)]
    pub async fn has_permission(
        &mut self,
        object_id: ObjectId,
        user_id: Option<UserId>,
        permission: Permission,
    ) -> Result<bool> {
        let granted: Option<bool> = sqlx::query_scalar(
            r#"
            SELECT (o.public AND $3 = 'READ')
                OR EXISTS (
                    SELECT 1 FROM object_permissions op
                    WHERE op.object_id = o.id
                      AND op.user_id = $2
                      AND op.permission = $3
                )
            FROM objects o
            WHERE o.id = $1
            "#,
        )
        .bind(object_id)
        .bind(user_id)
        .bind(permission.code())
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(granted.unwrap_or(false))
    }
}
