//! User repository: profile, player settings, recent songs
//!
//! User rows are created by the identity-sync service; this repository
//! only reads and updates them.

use sqlx::types::Json;
use sqlx::PgPool;

use crate::error::ApiResult;
use crate::models::user::{PlayerSettings, RecentSong, User, RECENT_SONGS_CAP};

/// Repository for user database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by their external id
    pub async fn find_by_id(&self, user_id: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, display_name, avatar_url, active_device_id,
                   player_settings, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Load a user's player settings; `None` if the user does not exist
    pub async fn player_settings(&self, user_id: &str) -> ApiResult<Option<PlayerSettings>> {
        let settings: Option<Json<PlayerSettings>> =
            sqlx::query_scalar(r#"SELECT player_settings FROM users WHERE id = $1"#)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(settings.map(|s| s.0))
    }

    /// Replace a user's player settings. Returns false when the user
    /// does not exist.
    pub async fn update_player_settings(
        &self,
        user_id: &str,
        settings: &PlayerSettings,
    ) -> ApiResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET player_settings = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(Json(settings))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Append to the recently-played list and trim it to the cap
    pub async fn push_recent_song(&self, user_id: &str, song_id: &str) -> ApiResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recent_songs (user_id, song_id)
            VALUES ($1, $2)
            "#,
        )
        .bind(user_id)
        .bind(song_id)
        .execute(&self.pool)
        .await?;

        // Keep only the newest RECENT_SONGS_CAP entries per user
        sqlx::query(
            r#"
            DELETE FROM recent_songs
            WHERE user_id = $1
              AND id NOT IN (
                  SELECT id FROM recent_songs
                  WHERE user_id = $1
                  ORDER BY played_at DESC, id DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(user_id)
        .bind(RECENT_SONGS_CAP)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Newest-first recently-played list
    pub async fn recent_songs(&self, user_id: &str) -> ApiResult<Vec<RecentSong>> {
        let songs = sqlx::query_as::<_, RecentSong>(
            r#"
            SELECT song_id, played_at
            FROM recent_songs
            WHERE user_id = $1
            ORDER BY played_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(RECENT_SONGS_CAP)
        .fetch_all(&self.pool)
        .await?;

        Ok(songs)
    }

    /// Check whether a user exists
    pub async fn exists(&self, user_id: &str) -> ApiResult<bool> {
        let exists: bool = sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)"#)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }
}
