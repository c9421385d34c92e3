//! Dialogue Tree - 分支对话树服务
//!
//! 以轮次为节点保存人机对话：每个轮次至多一个主子轮次，可有任意多个分支子轮次，
//! 任意轮次都能还原出从根到它的完整对话。

pub mod api;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod observability;
pub mod security;
pub mod services;
pub mod storage;
