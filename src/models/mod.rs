//! 核心数据模型模块
//!
//! 定义对话树的核心数据结构：Turn 以及由其派生的对话视图。

pub mod conversation;
pub mod turn;

pub use conversation::{ConversationListItem, GenerationStatus, TurnOutcome, derive_title};
pub use turn::{AttachMode, Turn, TurnState};
