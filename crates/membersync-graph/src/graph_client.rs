//! Microsoft Graph API HTTP client with pagination.
//!
//! Every call is single-shot: non-success statuses are mapped into
//! [`GraphError`] (with any `Retry-After` hint) and retrying is left to the
//! caller's retry policy.

use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::parse_retry_after;
use crate::{GraphConfig, GraphError, GraphResult, TokenCache};

/// `OData` error response from Microsoft Graph.
#[derive(Debug, Deserialize)]
pub struct ODataError {
    pub error: ODataErrorBody,
}

/// `OData` error body.
#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    pub code: String,
    pub message: String,
}

/// Response wrapper for paginated Graph API responses.
#[derive(Debug, Deserialize)]
pub struct ODataResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Microsoft Graph API client.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http_client: reqwest::Client,
    token_cache: Arc<TokenCache>,
    base_url: String,
}

impl GraphClient {
    /// Creates a new Graph client.
    pub fn new(http_client: reqwest::Client, token_cache: Arc<TokenCache>, config: &GraphConfig) -> Self {
        Self {
            http_client,
            token_cache,
            base_url: config.api_root().to_string(),
        }
    }

    /// Returns the base URL for Graph API requests.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Performs a GET request and decodes the JSON body.
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> GraphResult<T> {
        let response = self.send(Method::GET, url, None::<&()>).await?;
        Ok(response.json().await?)
    }

    /// Performs a POST request and decodes the JSON body.
    #[instrument(skip(self, body))]
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, url: &str, body: &B) -> GraphResult<T> {
        let response = self.send(Method::POST, url, Some(body)).await?;
        Ok(response.json().await?)
    }

    /// Performs a POST request whose response has no body (204).
    #[instrument(skip(self, body))]
    pub async fn post_no_content<B: Serialize>(&self, url: &str, body: &B) -> GraphResult<()> {
        self.send(Method::POST, url, Some(body)).await?;
        Ok(())
    }

    /// Performs a DELETE request.
    #[instrument(skip(self))]
    pub async fn delete(&self, url: &str) -> GraphResult<()> {
        self.send(Method::DELETE, url, None::<&()>).await?;
        Ok(())
    }

    /// Fetches all pages of a paginated response, handing each page to `callback`.
    #[instrument(skip(self, callback))]
    pub async fn get_paginated<T, F>(&self, initial_url: &str, mut callback: F) -> GraphResult<()>
    where
        T: DeserializeOwned,
        F: FnMut(Vec<T>),
    {
        let mut url = initial_url.to_string();

        loop {
            debug!("Fetching page: {}", url);
            let response: ODataResponse<T> = self.get(&url).await?;

            callback(response.value);

            match response.next_link {
                Some(next) => url = next,
                None => return Ok(()),
            }
        }
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> GraphResult<reqwest::Response> {
        let token = self.token_cache.get_token().await?;

        let mut request = self
            .http_client
            .request(method, url)
            .bearer_auth(&token)
            .header(ACCEPT, "application/json");
        if let Some(b) = body {
            request = request.json(b);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!("Graph rejected the access token, dropping it");
            self.token_cache.invalidate().await;
        }

        let retry_after = retry_after_hint(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, retry_after, &body))
    }
}

fn retry_after_hint(headers: &HeaderMap) -> Option<std::time::Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

fn api_error(status: StatusCode, retry_after: Option<std::time::Duration>, body: &str) -> GraphError {
    let (code, message) = match serde_json::from_str::<ODataError>(body) {
        Ok(odata) => (odata.error.code, odata.error.message),
        Err(_) => (status.to_string(), body.to_string()),
    };
    GraphError::GraphApi {
        status: status.as_u16(),
        code,
        message,
        retry_after,
    }
}

/// Escapes a value for use inside a single-quoted `OData` string literal.
#[must_use]
pub fn odata_quote(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odata_error_parsing() {
        let json = r#"{
            "error": {
                "code": "Request_ResourceNotFound",
                "message": "Resource not found",
                "innerError": {"date": "2024-01-15"}
            }
        }"#;

        let error: ODataError = serde_json::from_str(json).unwrap();
        assert_eq!(error.error.code, "Request_ResourceNotFound");
        assert_eq!(error.error.message, "Resource not found");
    }

    #[test]
    fn test_odata_response_parsing() {
        let json = r#"{
            "value": [{"id": "1"}, {"id": "2"}],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/users?$skiptoken=xxx"
        }"#;

        #[derive(Debug, Deserialize)]
        struct Item {
            id: String,
        }

        let response: ODataResponse<Item> = serde_json::from_str(json).unwrap();
        assert_eq!(response.value.len(), 2);
        assert_eq!(response.value[1].id, "2");
        assert!(response.next_link.is_some());
    }

    #[test]
    fn test_api_error_falls_back_to_raw_body() {
        let err = api_error(StatusCode::BAD_GATEWAY, None, "upstream down");
        match err {
            GraphError::GraphApi { status, message, .. } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "12".parse().unwrap());
        assert_eq!(
            retry_after_hint(&headers),
            Some(std::time::Duration::from_secs(12))
        );
        assert_eq!(retry_after_hint(&HeaderMap::new()), None);
    }

    #[test]
    fn test_odata_quote() {
        assert_eq!(odata_quote("O'Brien"), "O''Brien");
        assert_eq!(odata_quote("plain"), "plain");
    }
}
