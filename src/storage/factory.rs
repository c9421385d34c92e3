//! 存储工厂模块
//!
//! 根据配置创建相应的轮次存储实例。

use crate::config::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::storage::memory::MemoryTurnStore;
use crate::storage::repository::TurnStore;
use std::sync::Arc;

#[cfg(feature = "surrealdb")]
use crate::storage::surrealdb::{SurrealPool, SurrealTurnStore};

/// 存储工厂
pub struct StorageFactory;

impl StorageFactory {
    /// 根据配置创建存储实例
    pub async fn create(config: &StorageConfig) -> Result<Arc<dyn TurnStore>> {
        match config.backend.as_str() {
            "memory" => Ok(Arc::new(MemoryTurnStore::new())),
            "surrealdb" => Self::create_surrealdb(config).await,
            other => Err(AppError::Config(format!("Unknown storage backend: {}", other))),
        }
    }

    #[cfg(feature = "surrealdb")]
    async fn create_surrealdb(config: &StorageConfig) -> Result<Arc<dyn TurnStore>> {
        let pool = SurrealPool::new(config)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(Arc::new(SurrealTurnStore::new(&pool)))
    }

    #[cfg(not(feature = "surrealdb"))]
    async fn create_surrealdb(_config: &StorageConfig) -> Result<Arc<dyn TurnStore>> {
        Err(AppError::Config(
            "SurrealDB feature is not enabled. Enable 'surrealdb' feature to use SurrealDB.".into(),
        ))
    }
}
