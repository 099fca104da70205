//! Persistence boundary for generated messages and their tracking links.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::message::{MessageRow, NewMessage, NewTrackingLink, TrackingLinkRow};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Tracking links owned by the experiment's currently generated messages.
    async fn tracking_links(&self, experiment_id: Uuid) -> Result<Vec<TrackingLinkRow>, AppError>;

    /// Deletes every generated message for the experiment, and the links they own,
    /// in one transaction. Returns the number of messages removed.
    async fn retire_messages(&self, experiment_id: Uuid) -> Result<u64, AppError>;

    async fn insert_message(&self, message: &NewMessage) -> Result<(), AppError>;

    /// Writes final content and, when present, the message's tracking link.
    async fn finalize_message(
        &self,
        message_id: Uuid,
        content: &str,
        link: Option<&NewTrackingLink>,
    ) -> Result<(), AppError>;

    async fn count_messages(&self, experiment_id: Uuid) -> Result<i64, AppError>;

    async fn list_messages(
        &self,
        experiment_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageRow>, AppError>;
}

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn tracking_links(&self, experiment_id: Uuid) -> Result<Vec<TrackingLinkRow>, AppError> {
        let links = sqlx::query_as::<_, TrackingLinkRow>(
            r#"
            SELECT t.id, t.message_id, t.remote_id, t.remote_uri, t.tracking_url, t.destination_url
            FROM tracking_links t
            JOIN messages m ON m.id = t.message_id
            WHERE m.experiment_id = $1
            "#,
        )
        .bind(experiment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    async fn retire_messages(&self, experiment_id: Uuid) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM tracking_links
            WHERE message_id IN (SELECT id FROM messages WHERE experiment_id = $1)
            "#,
        )
        .bind(experiment_id)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM messages WHERE experiment_id = $1")
            .bind(experiment_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO messages
                (id, experiment_id, message_template_id, platform, medium, cycle,
                 image_present, image_id, content, promoted_website_url,
                 scheduled_date_time, social_media_profile_id, publish_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'pending')
            "#,
        )
        .bind(message.id)
        .bind(message.experiment_id)
        .bind(message.message_template_id)
        .bind(message.platform.as_str())
        .bind(message.medium.as_str())
        .bind(message.cycle as i32)
        .bind(message.image_present())
        .bind(message.image_id)
        .bind(&message.content)
        .bind(&message.promoted_website_url)
        .bind(message.scheduled_date_time)
        .bind(message.social_media_profile_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_message(
        &self,
        message_id: Uuid,
        content: &str,
        link: Option<&NewTrackingLink>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        if let Some(link) = link {
            sqlx::query(
                r#"
                INSERT INTO tracking_links
                    (id, message_id, remote_id, remote_uri, tracking_url, destination_url)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(message_id)
            .bind(&link.remote_id)
            .bind(&link.remote_uri)
            .bind(&link.tracking_url)
            .bind(&link.destination_url)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE messages SET content = $1 WHERE id = $2")
            .bind(content)
            .bind(message_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn count_messages(&self, experiment_id: Uuid) -> Result<i64, AppError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE experiment_id = $1")
                .bind(experiment_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn list_messages(
        &self,
        experiment_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageRow>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, experiment_id, message_template_id, platform, medium, cycle,
                   image_present, image_id, content, promoted_website_url,
                   scheduled_date_time, social_media_profile_id, publish_status, created_at
            FROM messages
            WHERE experiment_id = $1
            ORDER BY scheduled_date_time ASC, created_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(experiment_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
