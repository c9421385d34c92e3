//! Conversation Routes
//!
//! 定义对话与轮次相关的 API 路由。

use crate::api::handlers::conversation_handler::*;
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::app_state::AppState;

/// 创建对话路由器
pub fn create_conversation_router() -> Router<AppState> {
    Router::new()
        .route("/conversations", post(create_conversation))
        .route("/conversations", get(list_conversations))
        .route("/conversations/branches", get(list_branch_conversations))
        .route("/conversations/:turn_id", get(get_conversation))
        .route("/turns/:turn_id", get(get_turn))
        .route("/turns/:turn_id/children", get(list_children))
        .route("/turns/:turn_id/replies", post(reply))
        .route("/turns/:turn_id/branches", post(branch_reply))
        .route("/turns/:turn_id/regenerate", post(regenerate))
}
