//! Read access to the platform's `users` table.

use sqlx::PgPool;

use coursecast_core::types::DbId;

use crate::store::Recipient;

pub struct RecipientRepo;

impl RecipientRepo {
    pub async fn find(pool: &PgPool, user_id: DbId) -> Result<Option<Recipient>, sqlx::Error> {
        let row: Option<(DbId, String, String)> =
            sqlx::query_as("SELECT id, email, first_name FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(user_id, email, first_name)| Recipient {
            user_id,
            email,
            first_name,
        }))
    }
}
