//! Integration tests for the pipe client
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use five_whys_rca::config::{GatewayConfig, PipeConfig, RequestConfig};
use five_whys_rca::error::GatewayError;
use five_whys_rca::gateway::{EvidenceRef, Gateway, Message, PipeClient, PipeRequest};

fn create_test_client(base_url: &str, max_retries: u32, pipes: PipeConfig) -> PipeClient {
    let config = GatewayConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
    };

    let request_config = RequestConfig {
        timeout_ms: 5000,
        max_retries,
        retry_delay_ms: 10,
    };

    PipeClient::new(&config, request_config, pipes).expect("Failed to create client")
}

fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "completion": text,
        "threadId": "thread-123",
        "raw": {
            "model": "gpt-4o-mini",
            "usage": {"prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150}
        }
    }))
}

#[cfg(test)]
mod pipe_call_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_pipe_call() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(header("Authorization", "Bearer test-api-key"))
            .and(header("Content-Type", "application/json"))
            .respond_with(completion("Why did the job stop?"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, PipeConfig::default());
        let request = PipeRequest::new("rca-generator-v1", vec![Message::user("prompt")]);
        let response = client.call_pipe(request).await.unwrap();

        assert!(response.success);
        assert_eq!(response.completion, "Why did the job stop?");
        assert_eq!(response.thread_id.as_deref(), Some("thread-123"));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 3, PipeConfig::default());
        let request = PipeRequest::new("rca-generator-v1", vec![Message::user("prompt")]);
        let err = client.call_pipe(request).await.unwrap_err();

        assert!(matches!(err, GatewayError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_server_error_exhausts_retries() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2, PipeConfig::default());
        let request = PipeRequest::new("rca-generator-v1", vec![Message::user("prompt")]);
        let err = client.call_pipe(request).await.unwrap_err();

        assert!(matches!(err, GatewayError::Unavailable { retries: 2, .. }));
    }

    #[tokio::test]
    async fn test_pipe_reported_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "completion": ""
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, PipeConfig::default());
        let request = PipeRequest::new("rca-generator-v1", vec![Message::user("prompt")]);
        let err = client.call_pipe(request).await.unwrap_err();

        assert!(matches!(err, GatewayError::InvalidResponse { .. }));
    }
}

#[cfg(test)]
mod gateway_trait_tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_uses_generator_pipe() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(body_partial_json(json!({"name": "rca-generator-v1"})))
            .respond_with(completion("  Why 1: Why did the disk fill?  "))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, PipeConfig::default());
        let text = client.generate("prompt", 300, 0.7).await.unwrap();

        assert_eq!(text, "Why 1: Why did the disk fill?");
    }

    #[tokio::test]
    async fn test_generate_validation_uses_validator_pipe() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(body_partial_json(json!({"name": "rca-validator-v1"})))
            .respond_with(completion("SPECIFICITY: 4\nRELEVANCE: 5"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, PipeConfig::default());
        let text = client.generate_validation("prompt").await.unwrap();

        assert!(text.starts_with("SPECIFICITY: 4"));
    }

    #[tokio::test]
    async fn test_blank_completion_is_empty_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(completion("   "))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, PipeConfig::default());
        let err = client.generate("prompt", 300, 0.7).await.unwrap_err();

        assert!(matches!(err, GatewayError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn test_analyze_evidence_without_vision_pipe() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), 0, PipeConfig::default());

        let err = client
            .analyze_evidence(&EvidenceRef::new("uploads/graph.png"), "describe")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_analyze_evidence_passes_reference() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(body_partial_json(json!({
                "name": "rca-vision-v1",
                "variables": {"evidence_ref": "uploads/graph.png"}
            })))
            .respond_with(completion("Memory climbs steadily until the crash"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let pipes = PipeConfig {
            vision: Some("rca-vision-v1".to_string()),
            ..PipeConfig::default()
        };
        let client = create_test_client(&mock_server.uri(), 0, pipes);
        let summary = client
            .analyze_evidence(&EvidenceRef::new("uploads/graph.png"), "describe")
            .await
            .unwrap();

        assert_eq!(summary, "Memory climbs steadily until the crash");
    }
}

#[cfg(test)]
mod pipe_setup_tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_pipes_accepts_conflict() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .and(body_partial_json(json!({"name": "rca-generator-v1"})))
            .respond_with(ResponseTemplate::new(409).set_body_string("exists"))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .and(body_partial_json(json!({"name": "rca-validator-v1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "rca-validator-v1",
                "status": "public",
                "url": "https://langbase.com/pipes/rca-validator-v1"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, PipeConfig::default());
        client.ensure_pipes().await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_pipes_propagates_auth_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, PipeConfig::default());
        let err = client.ensure_pipes().await.unwrap_err();

        assert!(matches!(err, GatewayError::Api { status: 401, .. }));
    }
}
