//! 可观测性模块
//!
//! 提供对话指标、结构化日志和健康检查。

use axum::{Json, Router, response::IntoResponse, routing::get};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::config::LoggingConfig;
use crate::error::{AppError, Result};

// ===== Conversation Metrics =====

/// 对话指标
#[derive(Debug, Default)]
pub struct ConversationMetrics {
    turns_created: AtomicU64,
    conflicts: AtomicU64,
    replies_answered: AtomicU64,
    generation_failures: AtomicU64,
}

/// 指标快照
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub turns_created: u64,
    pub conflicts: u64,
    pub replies_answered: u64,
    pub generation_failures: u64,
}

impl ConversationMetrics {
    /// 记录新轮次
    pub fn record_turn(&self) {
        self.turns_created.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录主子轮次冲突
    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录成功写入的机器人回复
    pub fn record_answer(&self) {
        self.replies_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录生成失败
    pub fn record_generation_failure(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            turns_created: self.turns_created.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            replies_answered: self.replies_answered.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
        }
    }

    /// 生成 Prometheus 文本格式指标
    pub fn gather(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP dialogue_turns_created_total Turns written to the store
# TYPE dialogue_turns_created_total counter
dialogue_turns_created_total {}
# HELP dialogue_primary_conflicts_total Replies rejected because the primary slot was taken
# TYPE dialogue_primary_conflicts_total counter
dialogue_primary_conflicts_total {}
# HELP dialogue_replies_answered_total Bot replies attached to turns
# TYPE dialogue_replies_answered_total counter
dialogue_replies_answered_total {}
# HELP dialogue_generation_failures_total Bot reply generations that failed or timed out
# TYPE dialogue_generation_failures_total counter
dialogue_generation_failures_total {}
"#,
            s.turns_created, s.conflicts, s.replies_answered, s.generation_failures,
        )
    }
}

// ===== Health Check =====

/// 健康检查状态
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: f64,
}

/// 可观测性路由共享状态
#[derive(Debug)]
pub struct ObservabilityState {
    pub metrics: Arc<ConversationMetrics>,
    pub start_time: DateTime<Utc>,
    pub version: String,
    ready: AtomicBool,
}

impl ObservabilityState {
    pub fn new(version: String, metrics: Arc<ConversationMetrics>) -> Self {
        Self {
            metrics,
            start_time: Utc::now(),
            version,
            ready: AtomicBool::new(false),
        }
    }

    /// 依赖初始化完成后标记为就绪
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// 获取应用正常运行时间
    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_seconds() as f64
    }
}

// ===== Health Check Handlers =====

/// 完整健康状态
pub async fn health_check(
    state: axum::extract::State<Arc<ObservabilityState>>,
) -> impl IntoResponse {
    let ready = state.is_ready();
    let health_status = HealthStatus {
        status: if ready { "healthy" } else { "starting" }.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: state.version.clone(),
        uptime_seconds: state.uptime_seconds(),
    };

    let status_code = if ready {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_status))
}

/// 简单存活检查
pub async fn liveness() -> impl IntoResponse {
    "OK"
}

/// 就绪检查
pub async fn readiness(state: axum::extract::State<Arc<ObservabilityState>>) -> impl IntoResponse {
    if state.is_ready() {
        (axum::http::StatusCode::OK, "Ready")
    } else {
        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
    }
}

/// Prometheus 指标端点
pub async fn metrics(state: axum::extract::State<Arc<ObservabilityState>>) -> impl IntoResponse {
    (axum::http::StatusCode::OK, state.metrics.gather())
}

/// 版本信息端点
pub async fn version(state: axum::extract::State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "version": state.version,
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 创建可观测性路由
pub fn create_observability_router(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(metrics))
        .route("/version", get(version))
        .with_state(state)
}

// ===== Structured Logging =====

const LOG_FILE_PREFIX: &str = "dialogue-tree.log";

/// 初始化结构化日志
///
/// `RUST_LOG` 优先于 `logging.level`。配置了 `log_dir` 时额外按天滚动写入文件，
/// 返回的 guard 必须在进程退出前一直持有，否则缓冲日志会丢失。
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AppError::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let (file_writer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.structured {
        registry
            .with(fmt::layer().json().with_target(true))
            .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init()
    };

    result.map_err(|e| AppError::Internal(format!("Failed to set tracing subscriber: {}", e)))?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[test]
    fn test_metrics_gather() {
        let metrics = ConversationMetrics::default();
        metrics.record_turn();
        metrics.record_turn();
        metrics.record_conflict();
        metrics.record_generation_failure();

        let output = metrics.gather();
        assert!(output.contains("dialogue_turns_created_total 2"));
        assert!(output.contains("dialogue_primary_conflicts_total 1"));
        assert!(output.contains("dialogue_replies_answered_total 0"));
        assert!(output.contains("dialogue_generation_failures_total 1"));
    }

    #[test]
    fn test_snapshot() {
        let metrics = ConversationMetrics::default();
        metrics.record_answer();
        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                turns_created: 0,
                conflicts: 0,
                replies_answered: 1,
                generation_failures: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_readiness_follows_state() {
        let state = Arc::new(ObservabilityState::new(
            "0.1.0".to_string(),
            Arc::new(ConversationMetrics::default()),
        ));
        let router = create_observability_router(state.clone());

        let response = router
            .clone()
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.mark_ready();
        let response = router
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Arc::new(ConversationMetrics::default());
        metrics.record_turn();
        let state = Arc::new(ObservabilityState::new("0.1.0".to_string(), metrics));

        let response = create_observability_router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("dialogue_turns_created_total 1"));
    }
}
