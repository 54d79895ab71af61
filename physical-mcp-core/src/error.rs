//! Error taxonomy shared across the perception pipeline.
//!
//! Camera, provider, and config errors each get their own small enum with
//! a plain `Display` impl rather than one deep hierarchy or a `thiserror`
//! derive — each kind is narrow enough that hand-written `Display` reads
//! clearer than a derive macro would.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CameraError {
    Connection(String),
    Timeout,
    InvalidFrame(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::Connection(msg) => write!(f, "camera connection error: {msg}"),
            CameraError::Timeout => write!(f, "camera timeout: no frame has ever been observed"),
            CameraError::InvalidFrame(msg) => write!(f, "invalid frame: {msg}"),
        }
    }
}

impl std::error::Error for CameraError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    Auth(String),
    RateLimit(String),
    Other(String),
}

impl ProviderError {
    /// Classify a raw provider error message by pattern-matching on
    /// rate/quota/auth/billing keywords.
    pub fn classify(msg: &str) -> ProviderError {
        let lower = msg.to_lowercase();
        let auth_markers = ["401", "403", "unauthorized", "forbidden"];
        let rate_markers = ["429", "rate", "quota", "resource_exhausted"];
        let billing_markers = ["400", "credit", "balance", "billing"];
        if auth_markers.iter().any(|m| lower.contains(m)) {
            ProviderError::Auth(msg.to_string())
        } else if rate_markers.iter().any(|m| lower.contains(m))
            || billing_markers.iter().any(|m| lower.contains(m))
        {
            ProviderError::RateLimit(msg.to_string())
        } else {
            ProviderError::Other(msg.to_string())
        }
    }

    /// Whether this error should trigger the perception loop's exponential
    /// backoff: only auth and rate-limit/billing failures count, not
    /// connection resets, malformed responses, or JSON-shape errors.
    pub fn triggers_backoff(&self) -> bool {
        !matches!(self, ProviderError::Other(_))
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "provider auth error: {msg}"),
            ProviderError::RateLimit(msg) => write!(f, "provider rate limit: {msg}"),
            ProviderError::Other(msg) => write!(f, "provider error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_errors() {
        assert!(matches!(
            ProviderError::classify("401 Unauthorized"),
            ProviderError::Auth(_)
        ));
    }

    #[test]
    fn classifies_rate_limit_errors() {
        assert!(matches!(
            ProviderError::classify("429 rate limit exceeded"),
            ProviderError::RateLimit(_)
        ));
    }

    #[test]
    fn classifies_billing_as_rate_limit_bucket() {
        assert!(matches!(
            ProviderError::classify("insufficient credit balance"),
            ProviderError::RateLimit(_)
        ));
    }

    #[test]
    fn classifies_unknown_as_other() {
        assert!(matches!(
            ProviderError::classify("connection reset by peer"),
            ProviderError::Other(_)
        ));
    }

    #[test]
    fn only_auth_and_rate_limit_trigger_backoff() {
        assert!(ProviderError::Auth("x".into()).triggers_backoff());
        assert!(ProviderError::RateLimit("x".into()).triggers_backoff());
        assert!(!ProviderError::Other("x".into()).triggers_backoff());
    }
}
