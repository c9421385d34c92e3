//! 树索引模块
//!
//! 基于轮次存储的遍历：沿 `parent_id` 回溯到根，沿 `primary_child_id` 走到主线末端。
//! 单次遍历的代价与深度成正比，只有按所有者列出对话需要扫描该所有者的全部轮次。

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::turn::Turn;
use crate::storage::repository::TurnStore;

#[derive(Clone)]
pub struct TreeIndex {
    store: Arc<dyn TurnStore>,
}

impl TreeIndex {
    pub fn new(store: Arc<dyn TurnStore>) -> Self {
        Self { store }
    }

    /// 从根到指定轮次的路径，最后一个元素就是该轮次
    pub async fn path_to_root(&self, turn_id: &str) -> Result<Vec<Turn>> {
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.store.get(turn_id).await?;

        loop {
            if !visited.insert(current.id.clone()) {
                return Err(AppError::Internal(format!(
                    "Cycle detected in parent links at turn {}",
                    current.id
                )));
            }

            let parent_id = current.parent_id.clone();
            path.push(current);

            match parent_id {
                Some(parent_id) => current = self.store.get(&parent_id).await?,
                None => break,
            }
        }

        path.reverse();
        Ok(path)
    }

    /// 回溯到根轮次
    pub async fn find_root(&self, turn_id: &str) -> Result<Turn> {
        let mut visited = HashSet::new();
        let mut current = self.store.get(turn_id).await?;

        while let Some(parent_id) = current.parent_id.clone() {
            if !visited.insert(current.id.clone()) {
                return Err(AppError::Internal(format!(
                    "Cycle detected in parent links at turn {}",
                    current.id
                )));
            }
            current = self.store.get(&parent_id).await?;
        }

        Ok(current)
    }

    /// 从指定轮次沿主子轮次走到末端
    pub async fn primary_leaf(&self, root_id: &str) -> Result<Turn> {
        let mut visited = HashSet::new();
        let mut current = self.store.get(root_id).await?;

        while let Some(child_id) = current.primary_child_id.clone() {
            if !visited.insert(current.id.clone()) {
                return Err(AppError::Internal(format!(
                    "Cycle detected in primary links at turn {}",
                    current.id
                )));
            }
            current = self.store.get(&child_id).await?;
        }

        Ok(current)
    }

    /// 直接子轮次：主子轮次在前，分支按追加顺序
    pub async fn children(&self, turn_id: &str) -> Result<Vec<Turn>> {
        let turn = self.store.get(turn_id).await?;
        let mut children = Vec::with_capacity(turn.branched_child_ids.len() + 1);
        for child_id in turn.child_ids() {
            children.push(self.store.get(&child_id).await?);
        }
        Ok(children)
    }

    /// 所有者的根轮次以及所有分支起点
    ///
    /// 分支起点是出现在父轮次 `branched_child_ids` 中的轮次，每个都能单独作为一个对话视图。
    pub async fn branch_heads(&self, owner: &str) -> Result<Vec<Turn>> {
        let turns = self.store.list_for_owner(owner).await?;
        let branched: HashSet<&str> = turns
            .iter()
            .flat_map(|t| t.branched_child_ids.iter().map(String::as_str))
            .collect();

        Ok(turns
            .iter()
            .filter(|t| t.is_root() || branched.contains(t.id.as_str()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::turn::AttachMode;
    use crate::storage::memory::MemoryTurnStore;

    struct Fixture {
        index: TreeIndex,
        root: Turn,
        a: Turn,
        b: Turn,
        a2: Turn,
    }

    /// root ─┬─ a ── a2   (主线)
    ///       └─ b         (分支)
    async fn fixture() -> Fixture {
        let store: Arc<dyn TurnStore> = Arc::new(MemoryTurnStore::new());
        let root = store.create(None, "u1", Some("root")).await.unwrap();
        let a = store
            .create_attached(&root.id, "u1", Some("a"), AttachMode::Primary)
            .await
            .unwrap();
        let b = store
            .create_attached(&root.id, "u1", Some("b"), AttachMode::PrimaryOrBranch)
            .await
            .unwrap();
        let a2 = store
            .create_attached(&a.id, "u1", Some("a2"), AttachMode::Primary)
            .await
            .unwrap();

        Fixture {
            index: TreeIndex::new(store),
            root,
            a,
            b,
            a2,
        }
    }

    fn ids(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(|t| t.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_path_to_root() {
        let f = fixture().await;

        let path = f.index.path_to_root(&f.a2.id).await.unwrap();
        assert_eq!(ids(&path), vec![&f.root.id, &f.a.id, &f.a2.id]);
        assert!(path[0].is_root());

        let path = f.index.path_to_root(&f.b.id).await.unwrap();
        assert_eq!(ids(&path), vec![&f.root.id, &f.b.id]);

        let path = f.index.path_to_root(&f.root.id).await.unwrap();
        assert_eq!(path.len(), 1);
    }

    #[tokio::test]
    async fn test_path_to_root_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.index.path_to_root("missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_find_root() {
        let f = fixture().await;
        assert_eq!(f.index.find_root(&f.a2.id).await.unwrap().id, f.root.id);
        assert_eq!(f.index.find_root(&f.b.id).await.unwrap().id, f.root.id);
        assert_eq!(f.index.find_root(&f.root.id).await.unwrap().id, f.root.id);
    }

    #[tokio::test]
    async fn test_primary_leaf() {
        let f = fixture().await;
        assert_eq!(f.index.primary_leaf(&f.root.id).await.unwrap().id, f.a2.id);
        assert_eq!(f.index.primary_leaf(&f.b.id).await.unwrap().id, f.b.id);
    }

    #[tokio::test]
    async fn test_children_order() {
        let f = fixture().await;
        let children = f.index.children(&f.root.id).await.unwrap();
        assert_eq!(ids(&children), vec![&f.a.id, &f.b.id]);
    }

    #[tokio::test]
    async fn test_branch_heads() {
        let f = fixture().await;
        let heads = f.index.branch_heads("u1").await.unwrap();
        let mut head_ids = ids(&heads);
        head_ids.sort();
        let mut expected = vec![f.root.id.as_str(), f.b.id.as_str()];
        expected.sort();
        assert_eq!(head_ids, expected);

        assert!(f.index.branch_heads("u2").await.unwrap().is_empty());
    }
}
