//! Handlers 模块
//!
//! HTTP 请求处理程序。

pub mod conversation_handler;

pub use conversation_handler::*;
