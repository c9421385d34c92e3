//! 内存轮次存储
//!
//! 以 ID 为键的轮次 arena。每个父轮次有独立的链接锁，
//! 子轮次链接的全部修改都在该锁内完成，不同父轮次之间互不阻塞。

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::turn::{AttachMode, Turn};
use crate::storage::repository::TurnStore;

#[derive(Default)]
pub struct MemoryTurnStore {
    turns: DashMap<String, Turn>,
    /// 每个挂载过子轮次的父轮次一把锁；轮次不会被删除，锁表大小以轮次数为上界
    link_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn link_lock(&self, parent_id: &str) -> Arc<Mutex<()>> {
        self.link_locks
            .entry(parent_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn load(&self, id: &str) -> Result<Turn> {
        self.turns
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("Turn not found: {}", id)))
    }

    fn check_owner(parent: &Turn, owner: &str) -> Result<()> {
        if parent.owner != owner {
            return Err(AppError::PermissionDenied(format!(
                "Turn {} is not owned by {}",
                parent.id, owner
            )));
        }
        Ok(())
    }

    fn check_is_child(parent_id: &str, child: &Turn) -> Result<()> {
        if child.parent_id.as_deref() != Some(parent_id) {
            return Err(AppError::Validation(format!(
                "Turn {} is not a child of {}",
                child.id, parent_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TurnStore for MemoryTurnStore {
    async fn create(
        &self,
        parent_id: Option<&str>,
        owner: &str,
        human_text: Option<&str>,
    ) -> Result<Turn> {
        if let Some(parent_id) = parent_id {
            let parent = self.load(parent_id)?;
            Self::check_owner(&parent, owner)?;
        }

        let turn = Turn::new(parent_id, owner, human_text);
        self.turns.insert(turn.id.clone(), turn.clone());
        debug!(turn_id = %turn.id, parent_id = ?parent_id, "turn created");
        Ok(turn)
    }

    async fn get(&self, id: &str) -> Result<Turn> {
        self.load(id)
    }

    async fn set_bot_text(&self, id: &str, text: &str, model: Option<&str>) -> Result<Turn> {
        let mut entry = self
            .turns
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Turn not found: {}", id)))?;

        entry.bot_text = Some(text.to_string());
        entry.model = model.map(String::from);
        Ok(entry.value().clone())
    }

    async fn answer_if_pending(&self, id: &str, text: &str, model: Option<&str>) -> Result<Turn> {
        let mut entry = self
            .turns
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Turn not found: {}", id)))?;

        if entry.is_answered() {
            return Err(AppError::Conflict(format!(
                "Turn {} already has a bot reply",
                id
            )));
        }

        entry.bot_text = Some(text.to_string());
        entry.model = model.map(String::from);
        Ok(entry.value().clone())
    }

    async fn attach_primary_child(&self, parent_id: &str, child_id: &str) -> Result<()> {
        let lock = self.link_lock(parent_id);
        let _guard = lock.lock();

        self.load(parent_id)?;
        let child = self.load(child_id)?;
        Self::check_is_child(parent_id, &child)?;

        let mut parent = self
            .turns
            .get_mut(parent_id)
            .ok_or_else(|| AppError::NotFound(format!("Turn not found: {}", parent_id)))?;

        match parent.primary_child_id.as_deref() {
            Some(existing) if existing == child_id => Ok(()),
            Some(existing) => Err(AppError::Conflict(format!(
                "Turn {} already has primary child {}",
                parent_id, existing
            ))),
            None if parent.has_child(child_id) => {
                Err(AppError::Validation(format!(
                    "Turn {} is already a branch of {}",
                    child_id, parent_id
                )))
            }
            None => {
                parent.primary_child_id = Some(child_id.to_string());
                Ok(())
            }
        }
    }

    async fn attach_branch_child(&self, parent_id: &str, child_id: &str) -> Result<()> {
        let lock = self.link_lock(parent_id);
        let _guard = lock.lock();

        self.load(parent_id)?;
        let child = self.load(child_id)?;
        Self::check_is_child(parent_id, &child)?;

        let mut parent = self
            .turns
            .get_mut(parent_id)
            .ok_or_else(|| AppError::NotFound(format!("Turn not found: {}", parent_id)))?;

        if parent.primary_child_id.as_deref() == Some(child_id) {
            return Err(AppError::Validation(format!(
                "Turn {} is already the primary child of {}",
                child_id, parent_id
            )));
        }

        if !parent.has_child(child_id) {
            parent.branched_child_ids.push(child_id.to_string());
        }
        Ok(())
    }

    async fn list_roots_for_owner(&self, owner: &str) -> Result<Vec<Turn>> {
        Ok(self
            .turns
            .iter()
            .filter(|entry| entry.owner == owner && entry.is_root())
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Turn>> {
        Ok(self
            .turns
            .iter()
            .filter(|entry| entry.owner == owner)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn create_attached(
        &self,
        parent_id: &str,
        owner: &str,
        human_text: Option<&str>,
        mode: AttachMode,
    ) -> Result<Turn> {
        let lock = self.link_lock(parent_id);
        let _guard = lock.lock();

        let parent = self.load(parent_id)?;
        Self::check_owner(&parent, owner)?;

        if mode == AttachMode::Primary {
            if let Some(existing) = parent.primary_child_id.as_deref() {
                return Err(AppError::Conflict(format!(
                    "Turn {} already has primary child {}",
                    parent_id, existing
                )));
            }
        }

        let child = Turn::new(Some(parent_id), owner, human_text);
        self.turns.insert(child.id.clone(), child.clone());

        let mut parent = self
            .turns
            .get_mut(parent_id)
            .ok_or_else(|| AppError::Internal(format!("Turn vanished: {}", parent_id)))?;

        if parent.primary_child_id.is_none() {
            parent.primary_child_id = Some(child.id.clone());
        } else {
            parent.branched_child_ids.push(child.id.clone());
        }

        debug!(turn_id = %child.id, parent_id = %parent_id, ?mode, "turn created and attached");
        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_root_and_get() {
        let store = MemoryTurnStore::new();
        let root = store.create(None, "u1", Some("hello")).await.unwrap();

        let fetched = store.get(&root.id).await.unwrap();
        assert_eq!(fetched, root);
        assert!(fetched.is_root());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_create_with_missing_parent() {
        let store = MemoryTurnStore::new();
        let result = store.create(Some("missing"), "u1", Some("hi")).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_create_with_foreign_parent() {
        let store = MemoryTurnStore::new();
        let root = store.create(None, "u1", Some("hello")).await.unwrap();
        let result = store.create(Some(&root.id), "u2", Some("hi")).await;
        assert!(matches!(result, Err(AppError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryTurnStore::new();
        assert!(matches!(store.get("nope").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_bot_text_is_idempotent() {
        let store = MemoryTurnStore::new();
        let root = store.create(None, "u1", Some("hello")).await.unwrap();

        let first = store.set_bot_text(&root.id, "hi", Some("echo")).await.unwrap();
        let second = store.set_bot_text(&root.id, "hi", Some("echo")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.bot_text.as_deref(), Some("hi"));
        assert_eq!(second.model.as_deref(), Some("echo"));

        let missing = store.set_bot_text("nope", "hi", None).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_answer_if_pending_keeps_first_reply() {
        let store = MemoryTurnStore::new();
        let root = store.create(None, "u1", Some("hello")).await.unwrap();

        let answered = store
            .answer_if_pending(&root.id, "first", Some("echo"))
            .await
            .unwrap();
        assert_eq!(answered.bot_text.as_deref(), Some("first"));

        let second = store.answer_if_pending(&root.id, "second", Some("other")).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));

        let stored = store.get(&root.id).await.unwrap();
        assert_eq!(stored.bot_text.as_deref(), Some("first"));
        assert_eq!(stored.model.as_deref(), Some("echo"));

        let missing = store.answer_if_pending("nope", "hi", None).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_attach_primary_child_compare_and_set() {
        let store = MemoryTurnStore::new();
        let root = store.create(None, "u1", Some("hello")).await.unwrap();
        let a = store.create(Some(&root.id), "u1", Some("a")).await.unwrap();
        let b = store.create(Some(&root.id), "u1", Some("b")).await.unwrap();

        store.attach_primary_child(&root.id, &a.id).await.unwrap();
        // same child again is a no-op
        store.attach_primary_child(&root.id, &a.id).await.unwrap();

        let result = store.attach_primary_child(&root.id, &b.id).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let root = store.get(&root.id).await.unwrap();
        assert_eq!(root.primary_child_id.as_deref(), Some(a.id.as_str()));
    }

    #[tokio::test]
    async fn test_attach_rejects_non_child() {
        let store = MemoryTurnStore::new();
        let root = store.create(None, "u1", Some("hello")).await.unwrap();
        let other = store.create(None, "u1", Some("other")).await.unwrap();

        let result = store.attach_primary_child(&root.id, &other.id).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        let result = store.attach_branch_child(&root.id, &other.id).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_attach_branch_child_appends_in_order() {
        let store = MemoryTurnStore::new();
        let root = store.create(None, "u1", Some("hello")).await.unwrap();
        let a = store.create(Some(&root.id), "u1", Some("a")).await.unwrap();
        let b = store.create(Some(&root.id), "u1", Some("b")).await.unwrap();
        let c = store.create(Some(&root.id), "u1", Some("c")).await.unwrap();

        store.attach_primary_child(&root.id, &a.id).await.unwrap();
        store.attach_branch_child(&root.id, &b.id).await.unwrap();
        store.attach_branch_child(&root.id, &c.id).await.unwrap();
        store.attach_branch_child(&root.id, &b.id).await.unwrap();

        let result = store.attach_branch_child(&root.id, &a.id).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let root = store.get(&root.id).await.unwrap();
        assert_eq!(root.branched_child_ids, vec![b.id.clone(), c.id.clone()]);

        let missing = store.attach_branch_child("nope", &b.id).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_attached_primary_conflict_writes_nothing() {
        let store = MemoryTurnStore::new();
        let root = store.create(None, "u1", Some("hello")).await.unwrap();

        let a = store
            .create_attached(&root.id, "u1", Some("a"), AttachMode::Primary)
            .await
            .unwrap();
        let result = store
            .create_attached(&root.id, "u1", Some("dup"), AttachMode::Primary)
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(store.len(), 2);
        let root = store.get(&root.id).await.unwrap();
        assert_eq!(root.primary_child_id, Some(a.id));
    }

    #[tokio::test]
    async fn test_create_attached_primary_or_branch() {
        let store = MemoryTurnStore::new();
        let root = store.create(None, "u1", Some("hello")).await.unwrap();

        let first = store
            .create_attached(&root.id, "u1", Some("a"), AttachMode::PrimaryOrBranch)
            .await
            .unwrap();
        let second = store
            .create_attached(&root.id, "u1", Some("b"), AttachMode::PrimaryOrBranch)
            .await
            .unwrap();

        let root = store.get(&root.id).await.unwrap();
        assert_eq!(root.primary_child_id, Some(first.id));
        assert_eq!(root.branched_child_ids, vec![second.id]);
    }

    #[tokio::test]
    async fn test_list_roots_for_owner() {
        let store = MemoryTurnStore::new();
        let r1 = store.create(None, "u1", Some("one")).await.unwrap();
        store
            .create_attached(&r1.id, "u1", Some("child"), AttachMode::Primary)
            .await
            .unwrap();
        store.create(None, "u1", Some("two")).await.unwrap();
        store.create(None, "u2", Some("three")).await.unwrap();

        let roots = store.list_roots_for_owner("u1").await.unwrap();
        assert_eq!(roots.len(), 2);
        assert!(roots.iter().all(|t| t.is_root() && t.owner == "u1"));
        assert_eq!(store.list_for_owner("u1").await.unwrap().len(), 3);
    }
}
