use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::turn::Turn;

/// 标题缺省值
pub const UNTITLED: &str = "Untitled";

/// 对话列表项
///
/// 对话不单独存储，由根轮次（或分支起点）派生。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationListItem {
    /// 根轮次 ID
    pub root_id: String,
    /// 用于定位对话视图的轮次
    pub identifying_turn_id: String,
    /// 显示标题
    pub title: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl ConversationListItem {
    pub fn new(head: &Turn, root_id: &str, identifying_turn_id: &str, title_max_chars: usize) -> Self {
        Self {
            root_id: root_id.to_string(),
            identifying_turn_id: identifying_turn_id.to_string(),
            title: derive_title(head.human_text.as_deref(), title_max_chars),
            created_at: head.created_at,
        }
    }
}

/// 回复生成状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum GenerationStatus {
    /// 已写入 bot_text
    Answered,
    /// 后台生成中
    Pending,
    /// 生成失败，轮次保留且 bot_text 为空
    Failed(String),
}

/// 创建/回复操作的结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnOutcome {
    pub turn: Turn,
    pub generation: GenerationStatus,
}

/// 由人类文本派生标题：取首行、去空白、按字符截断
pub fn derive_title(text: Option<&str>, max_chars: usize) -> String {
    let first_line = text
        .map(str::trim)
        .and_then(|t| t.lines().next())
        .map(str::trim)
        .unwrap_or_default();

    if first_line.is_empty() {
        return UNTITLED.to_string();
    }

    if first_line.chars().count() <= max_chars {
        return first_line.to_string();
    }

    let mut title: String = first_line.chars().take(max_chars).collect();
    title.push('…');
    title
}
