//! Durable state for the allocation service.
//!
//! SQLite-backed store holding wallet seed material, the salted token
//! directory, per-wallet allocation records and service metadata (the token
//! salt). Allocation records are stored as a single versionless JSON blob
//! per wallet so a counter advance and its derived address become durable
//! together or not at all.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::config::StorageConfig;
use crate::core::errors::VaultError;

/// Per-wallet allocation state: the last allocated child index and the
/// address derived at it. Created on first allocation, overwritten (never
/// deleted) on every subsequent one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub child_index: u32,
    pub last_address: String,
}

#[derive(Debug)]
pub struct VaultStorage {
    pool: SqlitePool,
    is_memory: bool,
}

impl VaultStorage {
    pub async fn new() -> Result<Self, VaultError> {
        Self::new_with_config(&StorageConfig::default()).await
    }

    pub async fn new_with_url(database_url: &str) -> Result<Self, VaultError> {
        let config =
            StorageConfig { database_url: database_url.to_string(), ..StorageConfig::default() };
        Self::new_with_config(&config).await
    }

    pub async fn new_with_config(config: &StorageConfig) -> Result<Self, VaultError> {
        // normalize sqlite URLs: accept "sqlite:" or "sqlite://"
        let mut db_url = config.database_url.clone();
        if db_url.starts_with("sqlite:") && !db_url.starts_with("sqlite://") {
            db_url = db_url.replacen("sqlite:", "sqlite://", 1);
        }

        // ensure parent directory exists for file-backed sqlite URLs
        if let Some(path) = db_url.strip_prefix("sqlite://") {
            let path_only = path.split_once('?').map(|(p, _)| p).unwrap_or(path);
            if path_only != ":memory:" && !path_only.is_empty() {
                if let Some(parent) = std::path::Path::new(path_only).parent() {
                    if !parent.as_os_str().is_empty() {
                        if let Err(e) = std::fs::create_dir_all(parent) {
                            warn!("Failed to create database dir {:?}: {}", parent, e);
                        }
                    }
                }
            }
        }

        let is_memory = db_url.contains(":memory:");
        info!("[storage] connecting to database (memory: {})", is_memory);

        let connect_options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| VaultError::Config(format!("invalid database URL: {}", e)))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // An in-memory database exists per connection; the pool must not
        // fan out or each connection would see its own empty schema.
        let max_connections =
            if is_memory { 1 } else { config.max_connections.unwrap_or(20) };
        let acquire_timeout =
            Duration::from_secs(config.connection_timeout_seconds.unwrap_or(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await
            .map_err(|e| VaultError::Storage(format!("failed to connect to database: {}", e)))?;

        let storage = Self { pool, is_memory };
        storage.initialize_schema().await?;

        info!("Vault storage initialized");
        Ok(storage)
    }

    pub fn is_in_memory(&self) -> bool {
        self.is_memory
    }

    async fn initialize_schema(&self) -> Result<(), VaultError> {
        debug!("Initializing database schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallets (
                name TEXT PRIMARY KEY,
                seed BLOB NOT NULL,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::Storage(format!("failed to create wallets table: {}", e)))?;

        // Token directory: only the salted digest of a token is ever stored.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                salted_id TEXT PRIMARY KEY,
                wallet_name TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                FOREIGN KEY (wallet_name) REFERENCES wallets (name)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::Storage(format!("failed to create tokens table: {}", e)))?;

        // Allocation records: one versionless JSON blob per wallet name.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS allocations (
                wallet_name TEXT PRIMARY KEY,
                record BLOB NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::Storage(format!("failed to create allocations table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vault_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::Storage(format!("failed to create vault_meta table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tokens_wallet_name ON tokens (wallet_name)")
            .execute(&self.pool)
            .await?;

        debug!("Database schema initialized");
        Ok(())
    }

    pub async fn store_wallet(&self, name: &str, seed: &[u8]) -> Result<(), VaultError> {
        debug!("Storing wallet: {}", name);

        let result = sqlx::query(
            "INSERT INTO wallets (name, seed, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(name)
        .bind(seed)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Stored wallet: {}", name);
                Ok(())
            }
            Err(e) => {
                let unique = e
                    .as_database_error()
                    .map(|d| d.is_unique_violation())
                    .unwrap_or(false);
                if unique {
                    Err(VaultError::InvalidInput(format!("wallet '{}' already exists", name)))
                } else {
                    Err(VaultError::Storage(format!("failed to store wallet {}: {}", name, e)))
                }
            }
        }
    }

    pub async fn load_wallet(&self, name: &str) -> Result<Option<Vec<u8>>, VaultError> {
        let row = sqlx::query("SELECT seed FROM wallets WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VaultError::Storage(format!("failed to load wallet {}: {}", name, e)))?;

        Ok(row.map(|r| r.get::<Vec<u8>, _>("seed")))
    }

    pub async fn store_token(&self, salted_id: &str, wallet_name: &str) -> Result<(), VaultError> {
        sqlx::query(
            "INSERT INTO tokens (salted_id, wallet_name, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(salted_id)
        .bind(wallet_name)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            VaultError::Storage(format!("failed to store token for wallet {}: {}", wallet_name, e))
        })?;
        Ok(())
    }

    pub async fn lookup_token(&self, salted_id: &str) -> Result<Option<String>, VaultError> {
        let row = sqlx::query("SELECT wallet_name FROM tokens WHERE salted_id = ?1")
            .bind(salted_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VaultError::Storage(format!("failed to look up token: {}", e)))?;

        Ok(row.map(|r| r.get::<String, _>("wallet_name")))
    }

    pub async fn load_allocation(
        &self,
        wallet_name: &str,
    ) -> Result<Option<AllocationRecord>, VaultError> {
        let row = sqlx::query("SELECT record FROM allocations WHERE wallet_name = ?1")
            .bind(wallet_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                VaultError::Storage(format!(
                    "failed to load allocation for wallet {}: {}",
                    wallet_name, e
                ))
            })?;

        match row {
            None => Ok(None),
            Some(row) => {
                let blob: Vec<u8> = row.get("record");
                // A record that no longer decodes must stop allocations for
                // this wallet; treating it as absent would restart the
                // counter at 0 and reuse indices.
                let record: AllocationRecord = serde_json::from_slice(&blob).map_err(|e| {
                    VaultError::CorruptState(wallet_name.to_string(), e.to_string())
                })?;
                Ok(Some(record))
            }
        }
    }

    pub async fn store_allocation(
        &self,
        wallet_name: &str,
        record: &AllocationRecord,
    ) -> Result<(), VaultError> {
        let blob = serde_json::to_vec(record).map_err(|e| {
            VaultError::Storage(format!(
                "failed to encode allocation for wallet {}: {}",
                wallet_name, e
            ))
        })?;

        // Single upsert: the index advance and the derived address commit
        // atomically, overwriting the prior record.
        sqlx::query(
            r#"
            INSERT INTO allocations (wallet_name, record, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(wallet_name) DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at
            "#,
        )
        .bind(wallet_name)
        .bind(blob)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            VaultError::Storage(format!(
                "failed to store allocation for wallet {}: {}",
                wallet_name, e
            ))
        })?;
        Ok(())
    }

    pub async fn load_meta(&self, key: &str) -> Result<Option<String>, VaultError> {
        let row = sqlx::query("SELECT value FROM vault_meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VaultError::Storage(format!("failed to load meta {}: {}", key, e)))?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn store_meta(&self, key: &str, value: &str) -> Result<(), VaultError> {
        sqlx::query(
            r#"
            INSERT INTO vault_meta (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::Storage(format!("failed to store meta {}: {}", key, e)))?;
        Ok(())
    }
}

impl Clone for VaultStorage {
    fn clone(&self) -> Self {
        Self { pool: self.pool.clone(), is_memory: self.is_memory }
    }
}

/// Storage seam for the allocator. The protocol core only depends on this
/// trait, so tests can exercise it against fault-injecting stores.
#[async_trait]
pub trait VaultStorageTrait: Send + Sync {
    async fn store_wallet(&self, name: &str, seed: &[u8]) -> Result<(), VaultError>;
    async fn load_wallet(&self, name: &str) -> Result<Option<Vec<u8>>, VaultError>;

    async fn store_token(&self, salted_id: &str, wallet_name: &str) -> Result<(), VaultError>;
    async fn lookup_token(&self, salted_id: &str) -> Result<Option<String>, VaultError>;

    async fn load_allocation(&self, wallet_name: &str)
        -> Result<Option<AllocationRecord>, VaultError>;
    async fn store_allocation(
        &self,
        wallet_name: &str,
        record: &AllocationRecord,
    ) -> Result<(), VaultError>;

    async fn load_meta(&self, key: &str) -> Result<Option<String>, VaultError>;
    async fn store_meta(&self, key: &str, value: &str) -> Result<(), VaultError>;
}

#[async_trait]
impl VaultStorageTrait for VaultStorage {
    async fn store_wallet(&self, name: &str, seed: &[u8]) -> Result<(), VaultError> {
        self.store_wallet(name, seed).await
    }

    async fn load_wallet(&self, name: &str) -> Result<Option<Vec<u8>>, VaultError> {
        self.load_wallet(name).await
    }

    async fn store_token(&self, salted_id: &str, wallet_name: &str) -> Result<(), VaultError> {
        self.store_token(salted_id, wallet_name).await
    }

    async fn lookup_token(&self, salted_id: &str) -> Result<Option<String>, VaultError> {
        self.lookup_token(salted_id).await
    }

    async fn load_allocation(
        &self,
        wallet_name: &str,
    ) -> Result<Option<AllocationRecord>, VaultError> {
        self.load_allocation(wallet_name).await
    }

    async fn store_allocation(
        &self,
        wallet_name: &str,
        record: &AllocationRecord,
    ) -> Result<(), VaultError> {
        self.store_allocation(wallet_name, record).await
    }

    async fn load_meta(&self, key: &str) -> Result<Option<String>, VaultError> {
        self.load_meta(key).await
    }

    async fn store_meta(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.store_meta(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_storage() -> VaultStorage {
        VaultStorage::new_with_url("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_wallet_roundtrip() {
        let storage = memory_storage().await;

        let seed = b"0123456789abcdef0123456789abcdef";
        storage.store_wallet("w1", seed).await.unwrap();

        let loaded = storage.load_wallet("w1").await.unwrap();
        assert_eq!(loaded.as_deref(), Some(&seed[..]));

        assert!(storage.load_wallet("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_wallet_rejected() {
        let storage = memory_storage().await;
        storage.store_wallet("w1", b"0123456789abcdef").await.unwrap();

        let err = storage.store_wallet("w1", b"0123456789abcdef").await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_token_directory() {
        let storage = memory_storage().await;
        storage.store_wallet("w1", b"0123456789abcdef").await.unwrap();
        storage.store_token("digest-1", "w1").await.unwrap();

        assert_eq!(storage.lookup_token("digest-1").await.unwrap().as_deref(), Some("w1"));
        assert!(storage.lookup_token("digest-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_allocation_record_overwrite() {
        let storage = memory_storage().await;

        assert!(storage.load_allocation("w1").await.unwrap().is_none());

        let first = AllocationRecord { child_index: 0, last_address: "addr0".into() };
        storage.store_allocation("w1", &first).await.unwrap();
        assert_eq!(storage.load_allocation("w1").await.unwrap(), Some(first));

        let second = AllocationRecord { child_index: 1, last_address: "addr1".into() };
        storage.store_allocation("w1", &second).await.unwrap();
        assert_eq!(storage.load_allocation("w1").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_malformed_record_is_corrupt_state() {
        let storage = memory_storage().await;

        sqlx::query("INSERT INTO allocations (wallet_name, record, updated_at) VALUES (?1, ?2, ?3)")
            .bind("w1")
            .bind(b"not json".to_vec())
            .bind(Utc::now().naive_utc())
            .execute(&storage.pool)
            .await
            .unwrap();

        let err = storage.load_allocation("w1").await.unwrap_err();
        assert!(matches!(err, VaultError::CorruptState(_, _)));
    }

    #[tokio::test]
    async fn test_meta_roundtrip() {
        let storage = memory_storage().await;

        assert!(storage.load_meta("salt").await.unwrap().is_none());
        storage.store_meta("salt", "abc").await.unwrap();
        assert_eq!(storage.load_meta("salt").await.unwrap().as_deref(), Some("abc"));
        storage.store_meta("salt", "def").await.unwrap();
        assert_eq!(storage.load_meta("salt").await.unwrap().as_deref(), Some("def"));
    }

    #[tokio::test]
    async fn test_config_pool_settings_are_applied() {
        // an in-memory database must stay on one connection even when the
        // config asks for a larger pool; otherwise pooled connections would
        // each see their own empty schema and reads after the schema init
        // would fail with missing tables
        let config = StorageConfig {
            database_url: "sqlite::memory:".to_string(),
            max_connections: Some(8),
            connection_timeout_seconds: Some(5),
        };
        let storage = VaultStorage::new_with_config(&config).await.unwrap();

        storage.store_wallet("w1", b"0123456789abcdef").await.unwrap();
        assert!(storage.load_wallet("w1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_backed_storage_persists() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/vault.db?mode=rwc", dir.path().display());

        {
            let storage = VaultStorage::new_with_url(&url).await.unwrap();
            assert!(!storage.is_in_memory());
            storage
                .store_allocation(
                    "w1",
                    &AllocationRecord { child_index: 4, last_address: "addr4".into() },
                )
                .await
                .unwrap();
        }

        let reopened = VaultStorage::new_with_url(&url).await.unwrap();
        let record = reopened.load_allocation("w1").await.unwrap().unwrap();
        assert_eq!(record.child_index, 4);
        assert_eq!(record.last_address, "addr4");
    }
}
