use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use crate::state::{InMemoryStore, ModelStore, SledStore};
use std::sync::Arc;

/// Create a model store based on configuration
pub fn create_store(config: &StorageConfig) -> Result<Arc<dyn ModelStore>> {
    match config.backend {
        StorageBackend::Sled => {
            tracing::info!(path = ?config.path, "Initializing Sled storage backend");
            Ok(Arc::new(SledStore::new(&config.path)?))
        }
        StorageBackend::Memory => Ok(create_in_memory_store()),
    }
}

/// Create an in-memory store (for testing and development)
pub fn create_in_memory_store() -> Arc<dyn ModelStore> {
    tracing::info!("Initializing in-memory storage backend");
    Arc::new(InMemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_sled_store() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Sled,
            path: temp_dir.path().join("db"),
            artifacts_dir: temp_dir.path().join("models"),
        };

        let store = create_store(&config).unwrap();
        assert!(store.list_models().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_in_memory_store() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            ..StorageConfig::default()
        };

        let store = create_store(&config).unwrap();
        assert!(store.list_assets().await.unwrap().is_empty());
    }
}
