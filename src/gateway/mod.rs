use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, instrument};

use crate::config::AppConfig;
use crate::errors::ServiceError;

pub mod signature;

/// Request to mint an order on the payment gateway, denominated in minor
/// currency units.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRemoteOrder {
    pub amount_minor: i64,
    pub currency: String,
    /// Merchant-side receipt reference (the local order number)
    pub receipt: String,
}

/// The remote order as minted by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteOrder {
    pub id: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,
    #[error("gateway transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("gateway rejected the request with status {status}")]
    Rejected { status: u16 },
    #[error("gateway returned an unreadable response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::UpstreamError(err.to_string())
    }
}

/// Boundary to the hosted payment provider. The production implementation
/// talks HTTPS; tests substitute their own.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn create_remote_order(
        &self,
        request: CreateRemoteOrder,
    ) -> Result<RemoteOrder, GatewayError>;
}

/// HTTP implementation of [`GatewayClient`] with basic auth and a
/// per-request timeout.
pub struct HttpGatewayClient {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpGatewayClient {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GatewayError::Transport)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, GatewayError> {
        Self::new(
            cfg.gateway_base_url.clone(),
            cfg.gateway_key_id.clone(),
            cfg.gateway_key_secret.clone(),
            Duration::from_secs(cfg.gateway_timeout_secs),
        )
    }
}

#[derive(Serialize)]
struct RemoteOrderRequestBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    #[instrument(skip(self), fields(receipt = %request.receipt))]
    async fn create_remote_order(
        &self,
        request: CreateRemoteOrder,
    ) -> Result<RemoteOrder, GatewayError> {
        let url = format!("{}/orders", self.base_url);
        let body = RemoteOrderRequestBody {
            amount: request.amount_minor,
            currency: &request.currency,
            receipt: &request.receipt,
        };

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    error!(error = %e, "Gateway order creation transport failure");
                    GatewayError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "Gateway rejected order creation");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
            });
        }

        response.json::<RemoteOrder>().await.map_err(GatewayError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_map_to_upstream() {
        let err: ServiceError = GatewayError::Timeout.into();
        assert_eq!(
            err.status_code(),
            axum::http::StatusCode::BAD_GATEWAY
        );

        let err: ServiceError = GatewayError::Rejected { status: 503 }.into();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = HttpGatewayClient::new(
            "https://api.gateway.example/v1/",
            "key",
            "secret",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.base_url, "https://api.gateway.example/v1");
    }
}
