// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage and conversation-store traits.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use tally_config::model::StorageConfig;
use tally_core::{
    AdapterType, ConversationId, ConversationStore, ConversationSummary, HealthStatus, Message,
    PluginAdapter, StorageAdapter, TallyError,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules. The
/// database is opened by [`StorageAdapter::initialize`] unless the adapter was
/// built around an existing handle with [`SqliteStorage::from_database`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create an adapter; the database is not opened until `initialize`.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already-open database.
    pub fn from_database(db: Database) -> Self {
        Self {
            config: StorageConfig::default(),
            db: OnceCell::new_with(Some(db)),
        }
    }

    /// The open database, or an error before `initialize`.
    pub fn database(&self) -> Result<&Database, TallyError> {
        self.db.get().ok_or_else(|| TallyError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        self.database()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), TallyError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| TallyError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), TallyError> {
        self.database()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStorage {
    async fn create_conversation(&self, title: Option<&str>) -> Result<ConversationId, TallyError> {
        queries::conversations::create_conversation(self.database()?, title).await
    }

    async fn conversation_exists(&self, id: &ConversationId) -> Result<bool, TallyError> {
        queries::conversations::conversation_exists(self.database()?, id).await
    }

    async fn append_messages(
        &self,
        id: &ConversationId,
        messages: &[Message],
    ) -> Result<(), TallyError> {
        queries::conversations::append_messages(self.database()?, id, messages).await
    }

    async fn load_messages(&self, id: &ConversationId) -> Result<Vec<Message>, TallyError> {
        queries::conversations::load_messages(self.database()?, id).await
    }

    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, TallyError> {
        queries::conversations::recent_messages(self.database()?, id, limit).await
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationSummary>, TallyError> {
        queries::conversations::get_conversation(self.database()?, id).await
    }

    async fn list_conversations(
        &self,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>, TallyError> {
        queries::conversations::list_conversations(self.database()?, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let storage = SqliteStorage::new(make_config("/tmp/never-opened.db"));
        assert!(storage.health_check().await.is_err());
        assert!(storage.create_conversation(None).await.is_err());
    }

    #[tokio::test]
    async fn conversation_lifecycle_through_trait() {
        let storage = SqliteStorage::from_database(Database::open_in_memory().await.unwrap());
        let store: &dyn ConversationStore = &storage;

        let id = store.create_conversation(None).await.unwrap();
        store
            .append_messages(&id, &[Message::user("hi"), Message::assistant("hello")])
            .await
            .unwrap();
        let history = store.load_messages(&id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(store.list_conversations(5).await.unwrap()[0].id, id);
        storage.shutdown().await.unwrap();
    }
}
