//! Seen-store: durable record of which items have been published

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, StoreError};
use crate::types::{SeenRecord, StrongRef};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the store and bring the schema up to date
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::IoError)?;
        }

        // Use forward slashes for SQLite URL (works on both Windows and Unix)
        let db_url = format!("sqlite://{}", expanded_path.replace('\\', "/"));

        // FULL sync: a record that returned Ok is on disk
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(StoreError::SqlxError)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(StoreError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Find the record for an external id, if it was ever published
    pub async fn lookup(&self, external_id: i64) -> Result<Option<SeenRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, external_id, content_id, uri, created_at
            FROM seen_posts WHERE external_id = ?
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(row.map(|r| SeenRecord {
            id: r.get("id"),
            external_id: r.get("external_id"),
            content_id: r.get("content_id"),
            uri: r.get("uri"),
            created_at: r.get("created_at"),
        }))
    }

    /// Remember that `external_id` was published as `content`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyRecorded` if the id already has a record.
    pub async fn record(&self, external_id: i64, content: &StrongRef) -> Result<SeenRecord> {
        let created_at = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO seen_posts (external_id, content_id, uri, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(external_id)
        .bind(&content.cid)
        .bind(&content.uri)
        .bind(created_at)
        .execute(&self.pool)
        .await;

        let done = match result {
            Ok(done) => done,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(StoreError::AlreadyRecorded(external_id).into());
            }
            Err(e) => return Err(StoreError::SqlxError(e).into()),
        };

        Ok(SeenRecord {
            id: done.last_insert_rowid(),
            external_id,
            content_id: content.cid.clone(),
            uri: content.uri.clone(),
            created_at,
        })
    }

    /// Number of published items
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seen_posts")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;
        Ok(count)
    }

    /// Most recently published items, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<SeenRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, external_id, content_id, uri, created_at
            FROM seen_posts
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| SeenRecord {
                id: r.get("id"),
                external_id: r.get("external_id"),
                content_id: r.get("content_id"),
                uri: r.get("uri"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    /// Flush pending connections; used before process exit
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkyrelayError;
    use tempfile::TempDir;

    async fn create_test_db() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("seen.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (temp_dir, db)
    }

    fn content(n: i64) -> StrongRef {
        StrongRef {
            uri: format!("at://did:plc:bot/app.bsky.feed.post/{}", n),
            cid: format!("bafyrei{}", n),
        }
    }

    #[tokio::test]
    async fn test_lookup_absent_returns_none() {
        let (_temp_dir, db) = create_test_db().await;
        assert!(db.lookup(101).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_then_lookup() {
        let (_temp_dir, db) = create_test_db().await;

        let saved = db.record(101, &content(1)).await.unwrap();
        assert_eq!(saved.external_id, 101);

        let found = db.lookup(101).await.unwrap().unwrap();
        assert_eq!(found, saved);
        assert_eq!(found.content_id, "bafyrei1");
        assert_eq!(found.uri, "at://did:plc:bot/app.bsky.feed.post/1");
    }

    #[tokio::test]
    async fn test_second_record_for_same_id_is_rejected() {
        let (_temp_dir, db) = create_test_db().await;

        db.record(101, &content(1)).await.unwrap();
        let result = db.record(101, &content(2)).await;

        match result {
            Err(SkyrelayError::Store(StoreError::AlreadyRecorded(id))) => assert_eq!(id, 101),
            other => panic!("Expected AlreadyRecorded, got {:?}", other),
        }

        // The first record is untouched
        let found = db.lookup(101).await.unwrap().unwrap();
        assert_eq!(found.content_id, "bafyrei1");
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("seen.db");
        let path_str = db_path.to_str().unwrap();

        let db = Database::new(path_str).await.unwrap();
        db.record(7, &content(7)).await.unwrap();
        db.close().await;
        drop(db);

        let reopened = Database::new(path_str).await.unwrap();
        assert!(reopened.lookup(7).await.unwrap().is_some());
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_initialization_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b").join("seen.db");

        let db = Database::new(nested.to_str().unwrap()).await.unwrap();
        assert_eq!(db.count().await.unwrap(), 0);
        assert!(nested.exists());
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let (_temp_dir, db) = create_test_db().await;
        for id in [10, 20, 30] {
            db.record(id, &content(id)).await.unwrap();
        }

        let recent = db.recent(2).await.unwrap();
        let ids: Vec<i64> = recent.iter().map(|r| r.external_id).collect();
        assert_eq!(ids, vec![30, 20]);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_initialization_with_readonly_parent() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let readonly_dir = temp_dir.path().join("readonly");
        std::fs::create_dir(&readonly_dir).unwrap();
        std::fs::set_permissions(&readonly_dir, std::fs::Permissions::from_mode(0o555)).unwrap();

        let db_path = readonly_dir.join("sub").join("seen.db");
        let result = Database::new(db_path.to_str().unwrap()).await;

        // Restore permissions so the temp dir can be cleaned up
        std::fs::set_permissions(&readonly_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        // Running as root bypasses permission bits
        if result.is_ok() {
            return;
        }
        assert!(matches!(result, Err(SkyrelayError::Store(_))));
    }
}
