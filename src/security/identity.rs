//! 调用方身份
//!
//! 身份由上游网关验证后通过请求头注入，这里只负责读取。

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

use crate::error::AppError;

/// 所有者 ID 请求头
pub const OWNER_ID_HEADER: &str = "X-Owner-Id";
/// 所有者邮箱请求头（可选）
pub const OWNER_EMAIL_HEADER: &str = "X-Owner-Email";

/// 已验证的调用方身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdentity {
    pub owner_id: String,
    pub email: Option<String>,
}

impl OwnerIdentity {
    /// 从请求头读取身份
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let owner_id = header_value(headers, OWNER_ID_HEADER).ok_or_else(|| {
            AppError::Authentication(format!("Missing {} header", OWNER_ID_HEADER))
        })?;

        Ok(Self {
            owner_id,
            email: header_value(headers, OWNER_EMAIL_HEADER),
        })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for OwnerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
