//! Synapse HTTP client implementation.

use reqwest::Client;
use std::time::Duration;

use synapse_core::CreditType;

use crate::error::ClientError;
use crate::types::{ApiErrorResponse, DeductResponse, HealthResponse, StatusResponse};

/// Synapse API client.
///
/// Authenticates with a service API key and talks to the status and
/// deduct endpoints.
#[derive(Debug, Clone)]
pub struct SynapseClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl SynapseClient {
    /// Create a new synapse client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the synapse service (e.g., `"http://synapse:8080"`)
    /// * `api_key` - Service API key for authentication
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or key is empty or the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new synapse client with custom options.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or key is empty or the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let api_key = api_key.into();
        if base_url.is_empty() {
            return Err(ClientError::Configuration("base_url is empty".into()));
        }
        if api_key.is_empty() {
            return Err(ClientError::Configuration("api_key is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            service_name: options.service_name,
        })
    }

    /// Check that the service is up.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Self::handle_response(response).await
    }

    /// Fetch a user's credit status. Replenishment is applied first.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UserNotFound`] for an unknown user, or another
    /// error if the request fails.
    pub async fn status(&self, user_id: &str) -> Result<StatusResponse, ClientError> {
        let url = format!("{}/v1/credits/{user_id}", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Spend one credit of `credit_type` for a user.
    ///
    /// Premium users come back with unlimited counters and nothing is spent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InsufficientCredit`] when the allowance is
    /// exhausted, [`ClientError::UserNotFound`] for an unknown user, or
    /// another error if the request fails.
    pub async fn deduct(
        &self,
        user_id: &str,
        credit_type: CreditType,
    ) -> Result<DeductResponse, ClientError> {
        let url = format!("{}/v1/credits/deduct/{user_id}/{credit_type}", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .send()
            .await?;

        let receipt: DeductResponse = Self::handle_response(response).await?;
        tracing::debug!(
            user_id = %receipt.user_id,
            credit_type = %credit_type,
            "Credit deducted"
        );
        Ok(receipt)
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await?;
            return Ok(serde_json::from_slice(&body)?);
        }

        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => match api_error.code.as_str() {
                "insufficient_credit" => Err(ClientError::InsufficientCredit {
                    message: api_error.detail,
                }),
                "not_found" => Err(ClientError::UserNotFound {
                    message: api_error.detail,
                }),
                code => Err(ClientError::Api {
                    code: code.to_string(),
                    message: api_error.detail,
                    status: status.as_u16(),
                }),
            },
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 10).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}
