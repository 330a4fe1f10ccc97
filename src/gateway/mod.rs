//! Generation gateway: the text/vision capability consumed by the engine.
//!
//! The engine only ever sees the [`Gateway`] trait. [`PipeClient`] is the
//! production implementation that runs named pipes over HTTP; tests inject
//! fakes.

mod client;
mod types;

pub use client::PipeClient;
pub use types::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Sampling temperature for free-form generation.
pub const GENERATION_TEMPERATURE: f64 = 0.7;
/// Sampling temperature for validation and classification.
pub const VALIDATION_TEMPERATURE: f64 = 0.1;
/// Completion budget for questions and root cause statements.
pub const DEFAULT_MAX_TOKENS: u32 = 300;
/// Completion budget for validation responses.
pub const VALIDATION_MAX_TOKENS: u32 = 200;

/// Reference to an uploaded evidence artifact (URL or storage path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceRef(String);

impl EvidenceRef {
    /// Wrap a reference string
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The raw reference
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EvidenceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text and vision generation capability.
///
/// Implementations are stateless from the engine's point of view. Calls for a
/// single session are never issued concurrently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Free-form generation.
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> GatewayResult<String>;

    /// Low-temperature generation used for judging answers.
    async fn generate_validation(&self, prompt: &str) -> GatewayResult<String>;

    /// Whether [`Gateway::analyze_evidence`] is available.
    fn supports_evidence(&self) -> bool {
        false
    }

    /// Summarize an evidence artifact in the context of `prompt`.
    async fn analyze_evidence(
        &self,
        _evidence: &EvidenceRef,
        _prompt: &str,
    ) -> GatewayResult<String> {
        Err(GatewayError::Unsupported {
            capability: "analyze_evidence".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TextOnly;

    #[async_trait]
    impl Gateway for TextOnly {
        async fn generate(&self, prompt: &str, _: u32, _: f64) -> GatewayResult<String> {
            Ok(prompt.to_string())
        }

        async fn generate_validation(&self, prompt: &str) -> GatewayResult<String> {
            Ok(prompt.to_string())
        }
    }

    #[tokio::test]
    async fn test_default_evidence_capability_is_absent() {
        let gateway = TextOnly;
        assert!(!gateway.supports_evidence());

        let err = gateway
            .analyze_evidence(&EvidenceRef::new("photo.png"), "describe")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unsupported { .. }));
    }

    #[test]
    fn test_evidence_ref_serializes_as_string() {
        let reference = EvidenceRef::new("uploads/valve.jpg");
        assert_eq!(
            serde_json::to_value(&reference).unwrap(),
            serde_json::json!("uploads/valve.jpg")
        );
        assert_eq!(reference.to_string(), "uploads/valve.jpg");
    }
}
