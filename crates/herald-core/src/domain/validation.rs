//! 入力の形チェック（HTTP 層 / CLI 用）
//!
//! パイプライン自体は検証済みの入力を前提にしていて、ここには依存しません。

use regex::Regex;
use std::sync::LazyLock;

/// E.164: `+` のあとに先頭 1-9、合計 2〜15 桁
static E164: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+[1-9]\d{1,14}$").expect("E.164 pattern is a valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("phone number must be in international format: {0:?}")]
    Destination(String),

    #[error("message is mandatory")]
    EmptyBody,
}

pub fn validate_destination(destination: &str) -> Result<(), ValidationError> {
    if E164.is_match(destination) {
        Ok(())
    } else {
        Err(ValidationError::Destination(destination.to_string()))
    }
}

pub fn validate_submission(destination: &str, body: &str) -> Result<(), ValidationError> {
    validate_destination(destination)?;
    if body.trim().is_empty() {
        return Err(ValidationError::EmptyBody);
    }
    Ok(())
}
