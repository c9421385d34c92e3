//! 服务模块

pub mod conversation;
pub mod responder;

pub use conversation::{
    ConversationOptions, ConversationService, ConversationServiceImpl, create_conversation_service,
};
pub use responder::{BotResponder, EchoResponder, GeminiResponder, create_bot_responder};
