use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    backends::{MemoryRecordStore, SqliteRecordStore},
    store::RecordStore,
};

/// Configuration for the record store
///
/// # Examples
///
/// SQLite database in RON config:
/// ```ron
/// Gazette (
///     store: Sqlite(
///         path: "/var/lib/gazette/gazette.db",
///     ),
/// )
/// ```
///
/// Memory-backed store for development:
/// ```ron
/// Gazette (
///     store: Memory,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum StoreConfig {
    /// SQLite database file (production)
    Sqlite { path: PathBuf },
    /// Volatile in-process tables (testing/development)
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("/var/lib/gazette/gazette.db"),
        }
    }
}

impl StoreConfig {
    /// Open the configured backend as a trait object
    ///
    /// # Errors
    /// If the SQLite database cannot be opened or migrated
    pub async fn into_record_store(self) -> crate::Result<Arc<dyn RecordStore>> {
        match self {
            Self::Sqlite { path } => Ok(Arc::new(SqliteRecordStore::open(path).await?)),
            Self::Memory => Ok(Arc::new(MemoryRecordStore::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_from_ron() {
        let sqlite: StoreConfig = ron::from_str(r#"Sqlite(path: "/tmp/gazette.db")"#).unwrap();
        assert_eq!(
            sqlite,
            StoreConfig::Sqlite {
                path: PathBuf::from("/tmp/gazette.db")
            }
        );

        let memory: StoreConfig = ron::from_str("Memory").unwrap();
        assert_eq!(memory, StoreConfig::Memory);
    }

    #[tokio::test]
    async fn test_open_sqlite_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gazette.db");

        let store = StoreConfig::Sqlite { path: path.clone() }
            .into_record_store()
            .await
            .unwrap();
        assert!(store.list_topics().await.unwrap().is_empty());
        assert!(path.exists());
    }
}
