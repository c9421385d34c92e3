//! 存储层模块
//!
//! 提供轮次持久化服务，默认使用内存存储，可选 SurrealDB。

pub mod factory;
pub mod memory;
pub mod repository;

#[cfg(feature = "surrealdb")]
pub mod surrealdb;

pub use factory::StorageFactory;
pub use memory::MemoryTurnStore;
pub use repository::TurnStore;
