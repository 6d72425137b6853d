//! SQLite-backed favorite store

use async_trait::async_trait;
use futures::stream::BoxStream;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::watch;

use super::FavoriteStore;
use crate::error::{Result, StoreError};
use crate::flow::watch_stream;

/// Favorites persisted in a `favorites` table
///
/// A watch cell mirrors the table so observers see every write made through
/// this store.
pub struct SqliteFavoriteStore {
    pool: SqlitePool,
    mirror: watch::Sender<HashSet<String>>,
}

impl SqliteFavoriteStore {
    /// Open (or create) the database at `db_path`
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::IoError)?;
        }

        // mode=rwc creates the file if missing
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(StoreError::SqlxError)?;

        Self::from_pool(pool).await
    }

    /// Run migrations on `pool` and load the current favorites
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::MigrationError)?;

        let favorites = load(&pool).await?;
        tracing::debug!(count = favorites.len(), "Favorite store opened");

        let (mirror, _) = watch::channel(favorites);
        Ok(Self { pool, mirror })
    }

    async fn refresh(&self) -> Result<()> {
        let favorites = load(&self.pool).await?;
        self.mirror.send_if_modified(|current| {
            if *current == favorites {
                return false;
            }
            *current = favorites;
            true
        });
        Ok(())
    }
}

async fn load(pool: &SqlitePool) -> Result<HashSet<String>> {
    let rows = sqlx::query("SELECT alias FROM favorites")
        .fetch_all(pool)
        .await
        .map_err(StoreError::SqlxError)?;

    Ok(rows.iter().map(|row| row.get::<String, _>("alias")).collect())
}

#[async_trait]
impl FavoriteStore for SqliteFavoriteStore {
    fn observe_favorites(&self) -> BoxStream<'static, HashSet<String>> {
        watch_stream(self.mirror.subscribe())
    }

    async fn favorites(&self) -> Result<HashSet<String>> {
        load(&self.pool).await
    }

    async fn save(&self, alias: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO favorites (alias) VALUES (?)
            "#,
        )
        .bind(alias)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        self.refresh().await
    }

    async fn remove(&self, alias: &str) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM favorites WHERE alias = ?
            "#,
        )
        .bind(alias)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        self.refresh().await
    }
}
