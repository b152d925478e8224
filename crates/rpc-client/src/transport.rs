//! JSON-RPC over HTTP.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use reqwest::{StatusCode, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use url::Url;

use crate::{context::CallContext, error::RpcError};

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T> {
    jsonrpc: &'static str,
    method: &'a str,
    params: T,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    #[serde(flatten)]
    result: JsonRpcResult<T>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonRpcResult<T> {
    // Tried first: an `Option` result would otherwise accept an error object as `None`.
    Error { error: JsonRpcError },
    Success { result: T },
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 over HTTP POST with an optional bearer credential.
#[derive(Debug, Clone)]
pub struct JsonRpcTransport {
    client: reqwest::Client,
    url: Url,
    bearer: Option<String>,
    not_found_is_unconfigured: bool,
    name: &'static str,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcTransport {
    /// `name` labels the latency metric and logs.
    pub fn new(client: reqwest::Client, url: Url, name: &'static str) -> Self {
        Self {
            client,
            url,
            bearer: None,
            not_found_is_unconfigured: false,
            name,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Sends `token` as a bearer credential on every call.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Reports HTTP 404 as [`RpcError::NotConfigured`] instead of a plain status error. For
    /// services that answer 404 when no policy covers the request.
    pub const fn with_not_found_as_unconfigured(mut self) -> Self {
        self.not_found_is_unconfigured = true;
        self
    }

    /// Endpoint URL.
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Label used in metrics and logs.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Performs `method` under `ctx`, mapping HTTP and JSON-RPC failures to [`RpcError`].
    pub async fn call<P, R>(&self, ctx: &CallContext, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let start = Instant::now();
        let result = ctx.run(method, self.send(method, params)).await;
        metrics::histogram!(
            "userop_rpc_latency_seconds",
            "client" => self.name,
            "method" => method.to_string()
        )
        .record(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            warn!(client = self.name, method, error = %e, "rpc call failed");
        }
        result
    }

    async fn send<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        debug!(client = self.name, method, id = request.id, "rpc request");

        let mut builder = self.client.post(self.url.clone()).json(&request);
        if let Some(token) = &self.bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(RpcError::Unauthorized(truncate(&body)));
            }
            StatusCode::NOT_FOUND if self.not_found_is_unconfigured => {
                return Err(RpcError::NotConfigured(truncate(&body)));
            }
            _ => {}
        }

        match serde_json::from_slice::<JsonRpcResponse<R>>(&body) {
            Ok(JsonRpcResponse { result: JsonRpcResult::Success { result } }) => Ok(result),
            Ok(JsonRpcResponse { result: JsonRpcResult::Error { error } }) => {
                Err(RpcError::Remote { code: error.code, message: error.message, data: error.data })
            }
            Err(_) if !status.is_success() => {
                Err(RpcError::HttpStatus { status: status.as_u16(), body: truncate(&body) })
            }
            Err(e) => Err(RpcError::Decode(e.to_string())),
        }
    }
}

fn truncate(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    text.chars().take(MAX_ERROR_BODY).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method},
    };

    async fn transport(server: &MockServer) -> JsonRpcTransport {
        JsonRpcTransport::new(reqwest::Client::new(), server.uri().parse().unwrap(), "test")
    }

    #[tokio::test]
    async fn decodes_success_and_sends_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({"jsonrpc": "2.0", "method": "eth_chainId"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": "0x14a34"})),
            )
            .mount(&server)
            .await;

        let client = transport(&server).await.with_bearer("secret");
        let chain: String =
            client.call(&CallContext::default(), "eth_chainId", json!([])).await.unwrap();
        assert_eq!(chain, "0x14a34");
    }

    #[tokio::test]
    async fn maps_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no policy"))
            .mount(&server)
            .await;
        let err = transport(&server)
            .await
            .call::<_, String>(&CallContext::default(), "eth_sendUserOperation", json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::HttpStatus { status: 404, .. }));
        assert!(!err.is_not_configured());
        let err = transport(&server)
            .await
            .with_not_found_as_unconfigured()
            .call::<_, String>(&CallContext::default(), "pm_getPaymasterStubData", json!([]))
            .await
            .unwrap_err();
        assert!(err.is_not_configured());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let err = transport(&server)
            .await
            .call::<_, String>(&CallContext::default(), "pm_getPaymasterStubData", json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Unauthorized(_)));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;
        let err = transport(&server)
            .await
            .call::<_, String>(&CallContext::default(), "eth_chainId", json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::HttpStatus { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn surfaces_remote_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32500, "message": "AA21 didn't pay prefund"}
            })))
            .mount(&server)
            .await;
        let err = transport(&server)
            .await
            .call::<_, String>(&CallContext::default(), "eth_sendUserOperation", json!([]))
            .await
            .unwrap_err();
        assert_eq!(err.remote_message(), Some("AA21 didn't pay prefund"));
        assert!(!err.is_retryable());
    }
}
