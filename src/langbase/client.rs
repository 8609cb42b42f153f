use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{CreatePipeRequest, CreatePipeResponse, Message, PipeRequest, PipeResponse};
use crate::config::{LangbaseConfig, RequestConfig};
use crate::error::{LangbaseError, LangbaseResult};

/// Client for interacting with Langbase Pipes API
#[derive(Clone)]
pub struct LangbaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl LangbaseClient {
    /// Create a new Langbase client
    pub fn new(config: &LangbaseConfig, request_config: RequestConfig) -> LangbaseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LangbaseError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Call a Langbase pipe with the given request
    pub async fn call_pipe(&self, request: PipeRequest) -> LangbaseResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);
        let pipe_name = request.name.clone();

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    pipe = %pipe_name,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying Langbase request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    info!(
                        pipe = %pipe_name,
                        latency_ms = start.elapsed().as_millis(),
                        "Langbase pipe call succeeded"
                    );
                    return Ok(response);
                }
                // Client errors other than rate limiting will not improve on retry.
                Err(e @ LangbaseError::Api { status: 400..=428 | 430..=499, .. }) => {
                    error!(pipe = %pipe_name, error = %e, "Langbase rejected pipe request");
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        pipe = %pipe_name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Langbase pipe call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(LangbaseError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single pipe run (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &PipeRequest,
    ) -> LangbaseResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            "Calling Langbase pipe"
        );

        let pipe_response: PipeResponse = self.post_json(url, request, "run").await?;
        if !pipe_response.success {
            return Err(LangbaseError::InvalidResponse {
                message: "Pipe reported success=false".to_string(),
            });
        }
        Ok(pipe_response)
    }

    /// POST a JSON body and decode the JSON reply. Non-2xx statuses become
    /// [`LangbaseError::Api`] carrying the response body.
    async fn post_json<B, R>(&self, url: &str, body: &B, action: &str) -> LangbaseResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LangbaseError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LangbaseError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| LangbaseError::InvalidResponse {
                message: format!("Failed to parse {} response: {}", action, e),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create or update a pipe
    pub async fn create_pipe(
        &self,
        request: CreatePipeRequest,
    ) -> LangbaseResult<CreatePipeResponse> {
        let url = format!("{}/v1/pipes", self.base_url);
        info!(pipe = %request.name, upsert = ?request.upsert, "Creating Langbase pipe");

        let created: CreatePipeResponse = self.post_json(&url, &request, "create pipe").await?;
        info!(pipe = %created.name, url = %created.url, "Pipe created successfully");
        Ok(created)
    }

    /// Ensure a JSON-output pipe with the given system prompt exists
    pub async fn ensure_pipe(
        &self,
        pipe_name: &str,
        description: &str,
        system_prompt: &str,
    ) -> LangbaseResult<()> {
        let request = CreatePipeRequest::new(pipe_name)
            .with_description(description)
            .with_model("openai:gpt-4o-mini")
            .with_upsert(true)
            .with_json_output(true)
            .with_temperature(0.1)
            .with_max_tokens(800)
            .with_messages(vec![Message::system(system_prompt)]);

        match self.create_pipe(request).await {
            Ok(_) => {
                info!(pipe = %pipe_name, "Pipe ready");
                Ok(())
            }
            Err(LangbaseError::Api { status: 409, .. }) => {
                info!(pipe = %pipe_name, "Pipe already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = LangbaseConfig {
            api_key: "test_key".to_string(),
            base_url: "https://api.langbase.com".to_string(),
        };

        let client = LangbaseClient::new(&config, RequestConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let config = LangbaseConfig {
            api_key: "k".to_string(),
            base_url: "http://localhost:8080/".to_string(),
        };

        let client = LangbaseClient::new(&config, RequestConfig::default()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
