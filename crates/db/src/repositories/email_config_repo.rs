//! Repository for the single-row `email_config` table.

use sqlx::PgPool;
use thermogate_core::email::EmailSettings;

use crate::models::email::EmailConfigRow;

const COLUMNS: &str =
    "enabled, smtp_host, smtp_port, username, password, from_address, recipients";

pub struct EmailConfigRepo;

impl EmailConfigRepo {
    pub async fn get(pool: &PgPool) -> Result<Option<EmailConfigRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM email_config WHERE id = 1");
        sqlx::query_as::<_, EmailConfigRow>(&query)
            .fetch_optional(pool)
            .await
    }

    /// Replace the stored settings, creating the row on first write.
    pub async fn upsert(
        pool: &PgPool,
        settings: &EmailSettings,
    ) -> Result<EmailConfigRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO email_config (id, {COLUMNS}) \
             VALUES (1, $1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
                enabled = EXCLUDED.enabled, \
                smtp_host = EXCLUDED.smtp_host, \
                smtp_port = EXCLUDED.smtp_port, \
                username = EXCLUDED.username, \
                password = EXCLUDED.password, \
                from_address = EXCLUDED.from_address, \
                recipients = EXCLUDED.recipients, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EmailConfigRow>(&query)
            .bind(settings.enabled)
            .bind(&settings.smtp_host)
            .bind(i32::from(settings.smtp_port))
            .bind(&settings.username)
            .bind(&settings.password)
            .bind(&settings.from_address)
            .bind(&settings.recipients)
            .fetch_one(pool)
            .await
    }
}
