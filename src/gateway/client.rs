use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{CreatePipeRequest, CreatePipeResponse, Message, PipeRequest, PipeResponse};
use super::{
    EvidenceRef, Gateway, DEFAULT_MAX_TOKENS, GENERATION_TEMPERATURE, VALIDATION_MAX_TOKENS,
    VALIDATION_TEMPERATURE,
};
use crate::config::{GatewayConfig, PipeConfig, RequestConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::prompts::{EVIDENCE_SYSTEM_PROMPT, GENERATOR_SYSTEM_PROMPT, VALIDATOR_SYSTEM_PROMPT};

/// HTTP client that runs named pipes on the generation gateway
#[derive(Clone)]
pub struct PipeClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
    pipes: PipeConfig,
}

impl PipeClient {
    /// Create a new pipe client
    pub fn new(
        config: &GatewayConfig,
        request_config: RequestConfig,
        pipes: PipeConfig,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(GatewayError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
            pipes,
        })
    }

    /// Run a pipe with the given request
    pub async fn call_pipe(&self, request: PipeRequest) -> GatewayResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);
        let pipe_name = request.name.clone();

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = self.request_config.retry_delay(retries);
                warn!(
                    pipe = %pipe_name,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying gateway request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    info!(
                        pipe = %pipe_name,
                        latency_ms = start.elapsed().as_millis(),
                        "Pipe call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        pipe = %pipe_name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Pipe call failed"
                    );
                    // Client errors will not improve on retry
                    if matches!(e, GatewayError::Api { status, .. } if (400..500).contains(&status))
                    {
                        return Err(e);
                    }
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        match last_error {
            Some(e) if retries == 1 => Err(e),
            other => Err(GatewayError::Unavailable {
                message: other
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string()),
                retries: retries.saturating_sub(1),
            }),
        }
    }

    async fn execute_request(
        &self,
        url: &str,
        request: &PipeRequest,
    ) -> GatewayResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            "Calling pipe"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let pipe_response: PipeResponse =
            response
                .json()
                .await
                .map_err(|e| GatewayError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        if !pipe_response.success {
            return Err(GatewayError::InvalidResponse {
                message: format!("Pipe {} reported failure", request.name),
            });
        }

        Ok(pipe_response)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout {
                timeout_ms: self.request_config.timeout_ms,
            }
        } else {
            GatewayError::Http(e)
        }
    }

    async fn run_prompt(
        &self,
        request: PipeRequest,
        operation: &str,
    ) -> GatewayResult<String> {
        let response = self.call_pipe(request).await?;
        let completion = response.completion.trim();
        if completion.is_empty() {
            return Err(GatewayError::EmptyResponse {
                operation: operation.to_string(),
            });
        }
        Ok(completion.to_string())
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a new pipe
    pub async fn create_pipe(
        &self,
        request: CreatePipeRequest,
    ) -> GatewayResult<CreatePipeResponse> {
        let url = format!("{}/v1/pipes", self.base_url);

        info!(pipe = %request.name, "Creating pipe");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse {
                message: format!("Failed to parse create pipe response: {}", e),
            })
    }

    /// Ensure the generator, validator and (if configured) vision pipes exist
    pub async fn ensure_pipes(&self) -> GatewayResult<()> {
        self.ensure_pipe(
            &self.pipes.generator,
            "5 Whys question, root cause and report generation",
            GENERATOR_SYSTEM_PROMPT,
            GENERATION_TEMPERATURE,
        )
        .await?;
        self.ensure_pipe(
            &self.pipes.validator,
            "5 Whys answer validation and cause classification",
            VALIDATOR_SYSTEM_PROMPT,
            VALIDATION_TEMPERATURE,
        )
        .await?;
        if let Some(vision) = &self.pipes.vision {
            self.ensure_pipe(
                vision,
                "5 Whys visual evidence analysis",
                EVIDENCE_SYSTEM_PROMPT,
                VALIDATION_TEMPERATURE,
            )
            .await?;
        }
        Ok(())
    }

    async fn ensure_pipe(
        &self,
        pipe_name: &str,
        description: &str,
        system_prompt: &str,
        temperature: f64,
    ) -> GatewayResult<()> {
        let request = CreatePipeRequest::new(pipe_name)
            .with_description(description)
            .with_model("openai:gpt-4o-mini")
            .with_upsert(true)
            .with_temperature(temperature)
            .with_max_tokens(2000)
            .with_messages(vec![Message::system(system_prompt)]);

        match self.create_pipe(request).await {
            Ok(_) => {
                info!(pipe = %pipe_name, "Pipe ready");
                Ok(())
            }
            Err(GatewayError::Api { status: 409, .. }) => {
                info!(pipe = %pipe_name, "Pipe already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Gateway for PipeClient {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> GatewayResult<String> {
        let request = PipeRequest::new(&self.pipes.generator, vec![Message::user(prompt)])
            .with_max_tokens(max_tokens)
            .with_temperature(temperature);
        self.run_prompt(request, "generate").await
    }

    async fn generate_validation(&self, prompt: &str) -> GatewayResult<String> {
        let request = PipeRequest::new(&self.pipes.validator, vec![Message::user(prompt)])
            .with_max_tokens(VALIDATION_MAX_TOKENS)
            .with_temperature(VALIDATION_TEMPERATURE);
        self.run_prompt(request, "validate").await
    }

    fn supports_evidence(&self) -> bool {
        self.pipes.vision.is_some()
    }

    async fn analyze_evidence(
        &self,
        evidence: &EvidenceRef,
        prompt: &str,
    ) -> GatewayResult<String> {
        let Some(vision) = &self.pipes.vision else {
            return Err(GatewayError::Unsupported {
                capability: "analyze_evidence".to_string(),
            });
        };

        let request = PipeRequest::new(vision, vec![Message::user(prompt)])
            .with_variable("evidence_ref", evidence.as_str())
            .with_max_tokens(DEFAULT_MAX_TOKENS)
            .with_temperature(VALIDATION_TEMPERATURE);
        self.run_prompt(request, "analyze_evidence").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            api_key: "test_key".to_string(),
            base_url: "https://api.langbase.com/".to_string(),
        }
    }

    #[test]
    fn test_client_creation_trims_base_url() {
        let client =
            PipeClient::new(&test_config(), RequestConfig::default(), PipeConfig::default())
                .unwrap();
        assert_eq!(client.base_url(), "https://api.langbase.com");
    }

    #[test]
    fn test_evidence_support_follows_vision_pipe() {
        let client =
            PipeClient::new(&test_config(), RequestConfig::default(), PipeConfig::default())
                .unwrap();
        assert!(!client.supports_evidence());

        let pipes = PipeConfig {
            vision: Some("rca-vision-v1".to_string()),
            ..PipeConfig::default()
        };
        let client = PipeClient::new(&test_config(), RequestConfig::default(), pipes).unwrap();
        assert!(client.supports_evidence());
    }
}
