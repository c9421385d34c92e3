//! 对话 DTO
//!
//! 定义对话与轮次相关的请求和响应数据结构。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::conversation::{ConversationListItem, GenerationStatus, TurnOutcome};
use crate::models::turn::{Turn, TurnState};

/// 新建对话/回复/分支回复请求
#[derive(Debug, Deserialize, Validate)]
pub struct PostTextRequest {
    /// 人类输入
    #[validate(length(min = 1, message = "text cannot be empty"))]
    pub text: String,
    /// 是否等待机器人回复；缺省时使用配置
    #[serde(default)]
    pub wait: Option<bool>,
}

/// 重新生成请求
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegenerateRequest {
    pub wait: Option<bool>,
}

/// 轮次响应
#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResponse {
    pub id: String,
    pub parent_id: Option<String>,
    pub primary_child_id: Option<String>,
    pub branched_child_ids: Vec<String>,
    pub human_text: Option<String>,
    pub bot_text: Option<String>,
    pub model: Option<String>,
    pub owner: String,
    pub state: TurnState,
    pub created_at: DateTime<Utc>,
}

impl From<Turn> for TurnResponse {
    fn from(turn: Turn) -> Self {
        let state = turn.state();
        Self {
            id: turn.id,
            parent_id: turn.parent_id,
            primary_child_id: turn.primary_child_id,
            branched_child_ids: turn.branched_child_ids,
            human_text: turn.human_text,
            bot_text: turn.bot_text,
            model: turn.model,
            owner: turn.owner,
            state,
            created_at: turn.created_at,
        }
    }
}

/// 写操作结果响应
#[derive(Debug, Serialize, Deserialize)]
pub struct TurnOutcomeResponse {
    pub turn: TurnResponse,
    pub generation: GenerationStatus,
}

impl From<TurnOutcome> for TurnOutcomeResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            turn: outcome.turn.into(),
            generation: outcome.generation,
        }
    }
}

/// 对话路径响应，`turns` 从根开始到定位轮次结束
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub root_id: String,
    pub identifying_turn_id: String,
    pub turns: Vec<TurnResponse>,
}

/// 对话列表响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationListItem>,
    pub total: usize,
}

impl ConversationListResponse {
    /// 列表在视图层按创建时间倒序
    pub fn newest_first(mut conversations: Vec<ConversationListItem>) -> Self {
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = conversations.len();
        Self {
            conversations,
            total,
        }
    }
}

/// 子轮次响应
#[derive(Debug, Serialize, Deserialize)]
pub struct TurnListResponse {
    pub turns: Vec<TurnResponse>,
    pub total: usize,
}
