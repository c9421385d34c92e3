use crate::services::conversation::ConversationService;
use std::sync::Arc;

/// Application state containing all shared services
#[derive(Clone)]
pub struct AppState {
    /// Conversation service for tree operations
    pub conversation_service: Arc<dyn ConversationService>,
    /// Whether write requests wait for the bot reply when the body does not say
    pub wait_for_reply: bool,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("conversation_service", &"Arc<dyn ConversationService>")
            .field("wait_for_reply", &self.wait_for_reply)
            .finish()
    }
}

impl AppState {
    /// Create new application state
    pub fn new(
        conversation_service: Box<dyn ConversationService>,
        wait_for_reply: bool,
    ) -> Self {
        Self {
            conversation_service: Arc::from(conversation_service),
            wait_for_reply,
        }
    }

    /// 解析请求中的 wait 参数
    pub fn wait(&self, requested: Option<bool>) -> bool {
        requested.unwrap_or(self.wait_for_reply)
    }
}
