//! HTTP client for OpenAI-compatible chat-completion endpoints.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::Stream;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::diagnostics::{Diagnostics, StderrDiagnostics};
use crate::error::{Error, Result};
use crate::fragments::FragmentStream;
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::process_sse;
use crate::types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Message used when the configuration has no usable API key.
pub const INVALID_CONFIGURATION: &str =
    "Invalid configuration. Please set the OPENAI_API_KEY environment variable.";

/// A boxed stream of parsed chat-completion chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// Outcome of a non-streaming completion.
#[derive(Debug, Clone)]
pub enum Completion {
    /// The provider answered; the text may be empty.
    Text(String),
    /// The request failed; a diagnostic has already been reported.
    Failed(Error),
}

impl Completion {
    /// The response text, or `None` when there is nothing to show.
    pub fn text(&self) -> Option<&str> {
        match self {
            Completion::Text(text) if !text.is_empty() => Some(text.as_str()),
            _ => None,
        }
    }

    /// Returns true if the request failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Completion::Failed(_))
    }
}

/// Client for an OpenAI-compatible chat-completion endpoint.
#[derive(Clone)]
pub struct CompletionClient {
    client: ReqwestClient,
    endpoint: Url,
    authorization: HeaderValue,
    model: String,
    timeout: Duration,
    diagnostics: Arc<dyn Diagnostics>,
}

impl CompletionClient {
    /// Create a client that reports diagnostics on standard error.
    ///
    /// Fails with a configuration error, before any network resource is
    /// acquired, when `config` does not validate.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_diagnostics(config, Arc::new(StderrDiagnostics))
    }

    /// Create a client that reports diagnostics to `diagnostics`.
    pub fn with_diagnostics(config: &Config, diagnostics: Arc<dyn Diagnostics>) -> Result<Self> {
        let api_key = match config.api_key.as_deref() {
            Some(key) if config.validate() => key,
            _ => return Err(Error::configuration(INVALID_CONFIGURATION)),
        };

        let mut authorization = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| Error::configuration("API key contains characters not allowed in a header"))?;
        authorization.set_sensitive(true);

        let endpoint = chat_completions_url(&config.base_url)?;

        let client = ReqwestClient::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            endpoint,
            authorization,
            model: config.model.clone(),
            timeout: DEFAULT_TIMEOUT,
            diagnostics,
        })
    }

    /// Override the timeout applied to non-streaming requests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The model sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The resolved `chat/completions` endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(header::AUTHORIZATION, self.authorization.clone());
        headers
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail.as_ref().and_then(|d| d.error_type.clone());
        let error_message = detail
            .and_then(|d| d.message)
            .unwrap_or_else(|| error_body.clone());

        match status_code {
            400 => Error::bad_request(error_message),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message),
        }
    }

    /// Send a request and wait for the complete response.
    pub async fn send(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = self.send_inner(request).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        if result.is_err() {
            CLIENT_REQUEST_ERRORS.click();
        }
        result
    }

    async fn send_inner(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let mut request = request.clone();
        request.stream = false;
        debug!(model = %request.model, endpoint = %self.endpoint, stream = false, "sending chat completion request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.default_headers())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<ChatCompletionResponse>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    /// Send a request and return the response as a stream of chunks.
    ///
    /// Only a connect timeout applies; a response that stalls mid-stream
    /// stalls the consumer.
    pub async fn stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream> {
        CLIENT_REQUESTS.click();
        let result = self.stream_inner(request).await;
        if result.is_err() {
            CLIENT_REQUEST_ERRORS.click();
        }
        result
    }

    async fn stream_inner(&self, request: &ChatCompletionRequest) -> Result<ChunkStream> {
        let mut request = request.clone();
        request.stream = true;
        debug!(model = %request.model, endpoint = %self.endpoint, stream = true, "sending chat completion request");

        let mut headers = self.default_headers();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        Ok(Box::pin(process_sse(response.bytes_stream())))
    }

    /// Ask for a completion of `text` and wait for the whole answer.
    ///
    /// Failures are reported once through the diagnostics sink and come back
    /// as [`Completion::Failed`]; they are never retried.
    pub async fn get_completion(&self, text: &str) -> Completion {
        let request = ChatCompletionRequest::single_turn(&self.model, text);
        match self.send(&request).await {
            Ok(response) => Completion::Text(response.text().unwrap_or_default().to_string()),
            Err(err) => {
                debug!(error = %err, "completion request failed");
                self.diagnostics
                    .report(&format!("Error getting completion: {err}"));
                Completion::Failed(err)
            }
        }
    }

    /// Ask for a streamed completion of `text`.
    ///
    /// The request is sent when the returned stream is first polled.  One
    /// fragment is produced per content delta.
    pub fn get_completion_streamed(&self, text: &str) -> FragmentStream {
        let request = ChatCompletionRequest::single_turn(&self.model, text).with_stream(true);
        let client = self.clone();
        FragmentStream::from_chunks(
            async move { client.stream(&request).await },
            Arc::clone(&self.diagnostics),
        )
    }
}

impl fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Resolves `{base_url}/chat/completions`, tolerating a trailing slash.
fn chat_completions_url(base_url: &str) -> Result<Url> {
    let base = format!("{}/", base_url.trim_end_matches('/'));
    let base = Url::parse(&base)?;
    Ok(base.join("chat/completions")?)
}
