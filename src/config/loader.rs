use crate::config::config::AppConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// 环境变量前缀
const ENV_PREFIX: &str = "DIALOGUE_";

/// 选择默认值预设的环境变量
const ENVIRONMENT_VAR: &str = "DIALOGUE_ENVIRONMENT";

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 合并顺序：
    /// 1. `DIALOGUE_ENVIRONMENT` 选择的预设默认值（缺省为开发环境）
    /// 2. ./config.toml
    /// 3. 环境变量（`DIALOGUE_SERVER__PORT=9000`）
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::load_from(default_config_path())
    }

    /// 从指定路径加载配置
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    /// 按环境名选择默认值预设
    pub fn defaults_for(environment: &str) -> AppConfig {
        match environment {
            "production" => AppConfig::production(),
            _ => AppConfig::development(),
        }
    }

    fn figment(path: &Path) -> Figment {
        let environment = std::env::var(ENVIRONMENT_VAR).unwrap_or_default();
        Figment::from(Serialized::defaults(Self::defaults_for(&environment)))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.responder.timeout_secs == 0 || config.server.request_timeout == 0 {
            return Err(ConfigValidationError::InvalidTimeout);
        }

        // 等待回复的请求必须比生成超时活得更久，否则轮次已提交而客户端只收到 408
        if config.server.request_timeout <= config.responder.timeout_secs {
            return Err(ConfigValidationError::RequestTimeoutTooShort {
                request: config.server.request_timeout,
                responder: config.responder.timeout_secs,
            });
        }

        if config.conversation.title_max_chars == 0 || config.conversation.max_text_chars == 0 {
            return Err(ConfigValidationError::InvalidLimit);
        }

        match config.storage.backend.as_str() {
            "memory" => {}
            "surrealdb" if config.storage.url.is_empty() => {
                return Err(ConfigValidationError::MissingDatabaseUrl);
            }
            "surrealdb" => {}
            other => return Err(ConfigValidationError::UnknownBackend(other.to_string())),
        }

        match config.responder.backend.as_str() {
            "echo" => {}
            "gemini" if config.responder.api_key.is_empty() => {
                return Err(ConfigValidationError::MissingApiKey);
            }
            "gemini" => {}
            other => return Err(ConfigValidationError::UnknownBackend(other.to_string())),
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("服务端口无效，必须大于 0")]
    InvalidPort,

    #[error("回复生成超时无效，必须大于 0")]
    InvalidTimeout,

    #[error("请求超时 {request}s 必须大于回复生成超时 {responder}s")]
    RequestTimeoutTooShort { request: u64, responder: u64 },

    #[error("标题或输入长度上限无效，必须大于 0")]
    InvalidLimit,

    #[error("数据库连接 URL 未配置")]
    MissingDatabaseUrl,

    #[error("Gemini API 密钥未配置")]
    MissingApiKey,

    #[error("未知的后端类型: {0}")]
    UnknownBackend(String),
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_config_is_valid() {
        assert!(ConfigLoader::validate(&AppConfig::development()).is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = ConfigLoader::load_from("does-not-exist.toml").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.conversation.title_max_chars, 80);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut config = AppConfig::development();
        config.storage.backend = "postgres".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let mut config = AppConfig::development();
        config.responder.backend = "gemini".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::MissingApiKey)
        ));
    }

    #[test]
    fn test_request_timeout_must_exceed_responder_timeout() {
        let mut config = AppConfig::development();
        assert!(config.server.request_timeout > config.responder.timeout_secs);

        config.server.request_timeout = config.responder.timeout_secs;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::RequestTimeoutTooShort { .. })
        ));

        config.server.request_timeout = config.responder.timeout_secs + 1;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_defaults_follow_environment() {
        let production = ConfigLoader::defaults_for("production");
        assert_eq!(production.environment, "production");
        assert!(production.logging.structured);

        let development = ConfigLoader::defaults_for("anything-else");
        assert_eq!(development.environment, "development");
    }

    #[test]
    fn test_production_preset_needs_api_key() {
        let mut config = ConfigLoader::defaults_for("production");
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::MissingApiKey)
        ));
        config.responder.api_key = "key".into();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = AppConfig::development();
        config.responder.timeout_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::InvalidTimeout)
        ));
    }
}
