//! HTTP client of a running bridge node
//!
//! Used by the CLI commands and by the relayer.

use std::time::Duration;

use eyre::{Result, WrapErr};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use bridge::error::is_retryable_code;
use bridge::msg::{
    DepositIdentifierResponse, DepositIndexStatusResponse, IsTxProcessedResponse,
    ProcessDepositResponse,
};

use crate::server::{ErrorBody, ProcessDepositRequest, API_PREFIX};

/// Failure reported by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeError {
    pub status: u16,
    pub code: u32,
    pub message: String,
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node error {} (HTTP {}): {}", self.code, self.status, self.message)
    }
}

impl std::error::Error for NodeError {}

impl NodeError {
    /// The deposit was already minted
    pub fn is_already_processed(&self) -> bool {
        self.status == StatusCode::CONFLICT.as_u16()
    }

    /// Whether resubmitting may succeed. Replies without a bridge error code
    /// (a proxy in front of the node, a crash) are retried on 5xx only.
    pub fn is_retryable(&self) -> bool {
        match self.code {
            0 => self.status >= 500,
            code => is_retryable_code(code),
        }
    }
}

pub struct NodeClient {
    base_url: String,
    http: Client,
}

impl NodeClient {
    pub fn new(node_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to build HTTP client")?;
        Ok(Self {
            base_url: node_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}/{}", self.base_url, API_PREFIX, path)
    }

    pub async fn process_deposit(
        &self,
        creator: &str,
        deposit_index: u64,
        eth_block_height: Option<u64>,
    ) -> Result<ProcessDepositResponse> {
        let body = ProcessDepositRequest {
            creator: creator.to_string(),
            deposit_index,
            eth_block_height,
        };
        self.post("process_deposit", &body).await
    }

    pub async fn is_tx_processed(&self, identifier: &str) -> Result<bool> {
        let res: IsTxProcessedResponse = self
            .get(&format!("is_tx_processed/{}", identifier))
            .await?;
        Ok(res.processed)
    }

    pub async fn deposit_identifier(
        &self,
        deposit_index: u64,
    ) -> Result<DepositIdentifierResponse> {
        self.get(&format!("deposit_identifier/{}", deposit_index))
            .await
    }

    pub async fn deposit_status(&self, deposit_index: u64) -> Result<DepositIndexStatusResponse> {
        self.get(&format!("deposit/{}", deposit_index)).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .wrap_err_with(|| format!("GET {} failed", url))?;
        decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .wrap_err_with(|| format!("POST {} failed", url))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .wrap_err("Failed to decode node response");
    }

    let text = response.text().await.unwrap_or_default();
    let err = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => NodeError {
            status: status.as_u16(),
            code: body.code,
            message: body.error,
        },
        Err(_) => NodeError {
            status: status.as_u16(),
            code: 0,
            message: text,
        },
    };
    Err(eyre::Report::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = NodeClient::new("http://127.0.0.1:9098/").unwrap();
        assert_eq!(
            client.url("is_tx_processed/0xab"),
            "http://127.0.0.1:9098/b52/bridge/v1/is_tx_processed/0xab"
        );
    }

    #[test]
    fn test_node_error_display_and_conflict() {
        let err = NodeError {
            status: 409,
            code: 1101,
            message: "Deposit already processed: 0xab".to_string(),
        };
        assert!(err.is_already_processed());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("1101"));
    }

    #[test]
    fn test_node_error_retryable_codes() {
        let err = |status: u16, code: u32| NodeError {
            status,
            code,
            message: String::new(),
        };
        assert!(err(503, 1107).is_retryable());
        assert!(err(404, 1108).is_retryable());
        assert!(err(502, 0).is_retryable());
        assert!(!err(400, 1102).is_retryable());
        assert!(!err(400, 1111).is_retryable());
        assert!(!err(502, 1109).is_retryable());
        assert!(!err(404, 0).is_retryable());
    }
}
