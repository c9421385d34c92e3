use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// 请求超时（秒），必须大于回复生成超时
    pub request_timeout: u64,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// 存储后端: "memory" 或 "surrealdb"
    pub backend: String,
    /// SurrealDB 连接地址
    pub url: String,
    /// 命名空间
    pub namespace: String,
    /// 数据库名称
    pub database: String,
    /// 用户名
    pub username: String,
    /// 密码
    pub password: String,
}

/// Bot Responder 配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResponderConfig {
    /// 后端类型: "echo" 或 "gemini"
    pub backend: String,
    /// 模型名称
    pub model: String,
    /// API 地址
    pub base_url: String,
    /// API 密钥
    pub api_key: String,
    /// 单次生成超时（秒）
    pub timeout_secs: u64,
    /// 默认是否等待回复生成完成
    pub wait_for_reply: bool,
}

/// 对话配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConversationConfig {
    /// 标题最大字符数
    pub title_max_chars: usize,
    /// 用户输入最大字符数
    pub max_text_chars: usize,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录（按天滚动）
    pub log_dir: Option<PathBuf>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 存储配置
    pub storage: StorageConfig,
    /// 回复生成配置
    pub responder: ResponderConfig,
    /// 对话配置
    pub conversation: ConversationConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
                request_timeout: 60,
            },
            storage: StorageConfig {
                backend: "memory".into(),
                url: "mem://".into(),
                namespace: "dialogue".into(),
                database: "turns".into(),
                username: "root".into(),
                password: "root".into(),
            },
            responder: ResponderConfig {
                backend: "echo".into(),
                model: "gemini-2.5-flash-lite".into(),
                base_url: "https://generativelanguage.googleapis.com".into(),
                api_key: String::new(),
                timeout_secs: 30,
                wait_for_reply: true,
            },
            conversation: ConversationConfig {
                title_max_chars: 80,
                max_text_chars: 32_000,
            },
            logging: LoggingConfig {
                level: "debug".into(),
                structured: false,
                log_dir: None,
            },
            app_name: "dialogue-tree".into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = "production".into();
        config.logging.level = "info".into();
        config.logging.structured = true;
        config.logging.log_dir = Some(PathBuf::from("./logs"));
        config.responder.backend = "gemini".into();
        config
    }
}
