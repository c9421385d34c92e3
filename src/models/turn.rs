use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 轮次状态
///
/// `Created` → `Answered` 是单向的；`Answered` 之后轮次仍可继续挂载子轮次。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// 已创建，等待机器人回复
    Created,
    /// 已有机器人回复
    Answered,
}

/// 子轮次挂载方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    /// 必须成为父轮次的主子轮次，否则冲突
    Primary,
    /// 主槽位空闲时成为主子轮次，否则追加为分支
    PrimaryOrBranch,
}

/// 对话轮次实体
///
/// 对话树中的一个节点。父子关系只通过 ID 字段表达，
/// 所有轮次存放在以 ID 为键的存储中。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    /// 轮次唯一标识（UUID）
    pub id: String,

    /// 父轮次 ID，根轮次为空
    pub parent_id: Option<String>,

    /// 主线上的下一个轮次
    pub primary_child_id: Option<String>,

    /// 分支子轮次，按追加顺序排列
    #[serde(default)]
    pub branched_child_ids: Vec<String>,

    /// 用户输入
    pub human_text: Option<String>,

    /// 机器人回复
    pub bot_text: Option<String>,

    /// 生成回复的模型名称
    #[serde(default)]
    pub model: Option<String>,

    /// 对话所有者（继承自根轮次）
    pub owner: String,

    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// 创建新轮次
    pub fn new(parent_id: Option<&str>, owner: &str, human_text: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: parent_id.map(String::from),
            primary_child_id: None,
            branched_child_ids: Vec::new(),
            human_text: human_text.map(String::from),
            bot_text: None,
            model: None,
            owner: owner.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_answered(&self) -> bool {
        self.bot_text.is_some()
    }

    pub fn state(&self) -> TurnState {
        if self.is_answered() {
            TurnState::Answered
        } else {
            TurnState::Created
        }
    }

    /// 是否为该轮次的直接子轮次（主或分支）
    pub fn has_child(&self, child_id: &str) -> bool {
        self.primary_child_id.as_deref() == Some(child_id)
            || self.branched_child_ids.iter().any(|id| id == child_id)
    }

    /// 所有子轮次 ID：主子轮次在前，分支按追加顺序
    pub fn child_ids(&self) -> Vec<String> {
        self.primary_child_id
            .iter()
            .chain(self.branched_child_ids.iter())
            .cloned()
            .collect()
    }
}
