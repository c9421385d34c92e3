//! 回复生成服务
//!
//! 给定从根到当前轮次的完整路径，生成机器人回复文本。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::config::ResponderConfig;
use crate::error::GenerationError;
use crate::models::turn::Turn;

#[cfg(test)]
use mockall::automock;

/// Bot Responder trait
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BotResponder: Send + Sync {
    /// 以完整路径为上下文生成最后一个轮次的回复
    async fn generate(&self, context: &[Turn]) -> Result<String, GenerationError>;

    /// 模型名称，写入轮次的 `model` 字段
    fn model_name(&self) -> String;
}

/// 回显生成器
///
/// 不调用任何外部服务，用于开发和测试。
#[derive(Debug, Clone, Default)]
pub struct EchoResponder;

#[async_trait]
impl BotResponder for EchoResponder {
    async fn generate(&self, context: &[Turn]) -> Result<String, GenerationError> {
        let last = context
            .last()
            .ok_or_else(|| GenerationError::Failed("empty context".to_string()))?;
        let text = last.human_text.as_deref().unwrap_or_default();
        Ok(format!("I see that you said {}", text))
    }

    fn model_name(&self) -> String {
        "echo".to_string()
    }
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

/// Gemini generateContent 客户端
pub struct GeminiResponder {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
}

impl GeminiResponder {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// 路径转为交替的 user/model 消息
    fn build_request(context: &[Turn]) -> GeminiRequest<'_> {
        let mut contents = Vec::with_capacity(context.len() * 2);
        for turn in context {
            if let Some(text) = turn.human_text.as_deref() {
                contents.push(GeminiContent {
                    role: "user",
                    parts: vec![GeminiPart { text }],
                });
            }
            if let Some(text) = turn.bot_text.as_deref() {
                contents.push(GeminiContent {
                    role: "model",
                    parts: vec![GeminiPart { text }],
                });
            }
        }
        GeminiRequest { contents }
    }
}

#[async_trait]
impl BotResponder for GeminiResponder {
    async fn generate(&self, context: &[Turn]) -> Result<String, GenerationError> {
        let request = Self::build_request(context);
        if request.contents.is_empty() {
            return Err(GenerationError::Failed("empty context".to_string()));
        }

        debug!(model = %self.model, messages = request.contents.len(), "requesting generation");

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Failed(format!(
                "Gemini returned {}: {}",
                status, error_text
            )));
        }

        let body: GeminiResponse = response.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .next()
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

/// 根据配置创建回复生成器
pub fn create_bot_responder(
    config: &ResponderConfig,
) -> Result<Box<dyn BotResponder>, GenerationError> {
    match config.backend.as_str() {
        "gemini" => {
            let responder = GeminiResponder::new(
                &config.base_url,
                &config.model,
                &config.api_key,
                Duration::from_secs(config.timeout_secs),
            )?;
            Ok(Box::new(responder))
        }
        "echo" => Ok(Box::new(EchoResponder)),
        other => Err(GenerationError::Failed(format!(
            "Unknown responder backend: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn answered(parent: Option<&str>, human: &str, bot: &str) -> Turn {
        let mut turn = Turn::new(parent, "u1", Some(human));
        turn.bot_text = Some(bot.to_string());
        turn
    }

    #[tokio::test]
    async fn test_echo_responder() {
        let responder = EchoResponder;
        let turn = Turn::new(None, "u1", Some("hello"));
        let text = responder.generate(&[turn]).await.unwrap();
        assert_eq!(text, "I see that you said hello");
        assert_eq!(responder.model_name(), "echo");
    }

    #[tokio::test]
    async fn test_echo_responder_empty_context() {
        let result = EchoResponder.generate(&[]).await;
        assert!(matches!(result, Err(GenerationError::Failed(_))));
    }

    #[test]
    fn test_build_request_alternates_roles() {
        let root = answered(None, "q1", "a1");
        let next = Turn::new(Some(&root.id), "u1", Some("q2"));
        let context = [root, next];

        let request = GeminiResponder::build_request(&context);
        let roles: Vec<&str> = request.contents.iter().map(|c| c.role).collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
        assert_eq!(request.contents[2].parts[0].text, "q2");
    }

    #[tokio::test]
    async fn test_gemini_responder_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(query_param("key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [
                    {"content": {"role": "model", "parts": [{"text": "Semiconductors conduct sometimes."}]}}
                ]
            })))
            .mount(&server)
            .await;

        let responder =
            GeminiResponder::new(&server.uri(), "test-model", "secret", Duration::from_secs(5))
                .unwrap();
        let turn = Turn::new(None, "u1", Some("What is a semiconductor?"));
        let text = responder.generate(&[turn]).await.unwrap();
        assert_eq!(text, "Semiconductors conduct sometimes.");
    }

    #[tokio::test]
    async fn test_gemini_responder_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let responder =
            GeminiResponder::new(&server.uri(), "test-model", "secret", Duration::from_secs(5))
                .unwrap();
        let turn = Turn::new(None, "u1", Some("hi"));
        let result = responder.generate(&[turn]).await;
        assert!(matches!(result, Err(GenerationError::Failed(msg)) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn test_gemini_responder_empty_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let responder =
            GeminiResponder::new(&server.uri(), "test-model", "secret", Duration::from_secs(5))
                .unwrap();
        let turn = Turn::new(None, "u1", Some("hi"));
        let result = responder.generate(&[turn]).await;
        assert_eq!(result, Err(GenerationError::EmptyResponse));
    }

    #[test]
    fn test_factory_rejects_unknown_backend() {
        let mut config = crate::config::config::AppConfig::development().responder;
        config.backend = "gpt".into();
        assert!(matches!(
            create_bot_responder(&config),
            Err(GenerationError::Failed(msg)) if msg.contains("gpt")
        ));
    }

    #[test]
    fn test_factory_defaults_to_echo() {
        let config = crate::config::config::AppConfig::development().responder;
        let responder = create_bot_responder(&config).unwrap();
        assert_eq!(responder.model_name(), "echo");
    }
}
