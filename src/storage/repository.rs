use async_trait::async_trait;

use crate::error::Result;
use crate::models::turn::{AttachMode, Turn};

/// 轮次存储 trait
///
/// 持久化全部轮次记录并负责 ID 分配。父子链接的修改必须在存储边界内
/// 原子完成：同一父轮次的主子槽位最多只能被成功设置一次。
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// 创建轮次（不挂载到父轮次）
    ///
    /// 父轮次不存在返回 `NotFound`，所有者不一致返回 `PermissionDenied`。
    async fn create(
        &self,
        parent_id: Option<&str>,
        owner: &str,
        human_text: Option<&str>,
    ) -> Result<Turn>;

    /// 根据 ID 获取轮次
    async fn get(&self, id: &str) -> Result<Turn>;

    /// 写入机器人回复（幂等覆盖）
    async fn set_bot_text(&self, id: &str, text: &str, model: Option<&str>) -> Result<Turn>;

    /// 仅在轮次尚无回复时写入机器人回复
    ///
    /// 已有 `bot_text` 时返回 `Conflict`，已写入的回复不会被替换。
    async fn answer_if_pending(&self, id: &str, text: &str, model: Option<&str>) -> Result<Turn>;

    /// 设置主子轮次（比较并设置）
    ///
    /// 已指向其他子轮次时返回 `Conflict`；已指向同一子轮次时视为成功。
    async fn attach_primary_child(&self, parent_id: &str, child_id: &str) -> Result<()>;

    /// 追加分支子轮次，同一父轮次上的追加按顺序串行
    async fn attach_branch_child(&self, parent_id: &str, child_id: &str) -> Result<()>;

    /// 列出所有者的全部根轮次（无序）
    async fn list_roots_for_owner(&self, owner: &str) -> Result<Vec<Turn>>;

    /// 列出所有者的全部轮次（无序）
    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Turn>>;

    /// 原子地校验父轮次、创建子轮次并挂载
    ///
    /// `AttachMode::Primary` 在主槽位被占用时返回 `Conflict`，且不写入任何记录。
    async fn create_attached(
        &self,
        parent_id: &str,
        owner: &str,
        human_text: Option<&str>,
        mode: AttachMode,
    ) -> Result<Turn>;
}
