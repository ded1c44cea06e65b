//! Request/response exchanges with the backend.
//!
//! [`RequestGateway`] attaches the session credential and normalises failures into
//! [`GatewayError`]. The wire itself sits behind [`HttpTransport`].

use crate::{error::GatewayError, session::SessionHandle};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};
use url::Url;

/// Header carrying the session token
pub const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute path, e.g. `/api/login`
    pub path: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GatewayError>;
}

/// [`HttpTransport`] over `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base: Url,
}

impl ReqwestTransport {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GatewayError> {
        let mut builder = self.client.request(request.method, self.url(&request.path));
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| GatewayError::Transport(error.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

/// Options of one gateway call
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub method: Method,
    pub body: Option<serde_json::Value>,
    pub requires_auth: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            requires_auth: true,
        }
    }
}

impl CallOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post() -> Self {
        Self {
            method: Method::POST,
            ..Self::default()
        }
    }

    pub fn with_body<T: Serialize>(mut self, body: &T) -> Result<Self, GatewayError> {
        let value =
            serde_json::to_value(body).map_err(|error| GatewayError::Encode(error.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn unauthenticated(mut self) -> Self {
        self.requires_auth = false;
        self
    }
}

/// Outbound calls to the backend
#[derive(Clone)]
pub struct RequestGateway {
    transport: Arc<dyn HttpTransport>,
    session: SessionHandle,
}

impl RequestGateway {
    pub fn new(transport: Arc<dyn HttpTransport>, session: SessionHandle) -> Self {
        Self { transport, session }
    }

    /// Perform a call and decode its JSON response.
    ///
    /// When `requires_auth` is set but no session exists the credential header is
    /// simply omitted and the backend decides. An empty success body decodes as `{}`.
    pub async fn call<R: DeserializeOwned>(
        &self,
        path: &str,
        options: CallOptions,
    ) -> Result<R, GatewayError> {
        let mut headers = vec![("Content-Type", "application/json".to_string())];
        if options.requires_auth {
            match self.session.token() {
                Some(token) => headers.push((AUTH_HEADER, token)),
                None => debug!(path, "No session token for authenticated call"),
            }
        }

        let request = HttpRequest {
            method: options.method,
            path: path.to_string(),
            headers,
            body: options.body.map(|body| body.to_string()),
        };
        debug!(method = %request.method, path, "Gateway call");

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            let error = GatewayError::from_response(response.status, &response.body);
            warn!(path, status = response.status, %error, "Gateway call rejected");
            return Err(error);
        }

        let body = if response.body.trim().is_empty() {
            "{}"
        } else {
            response.body.as_str()
        };
        serde_json::from_str(body).map_err(|error| GatewayError::Decode(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySessionStore, Session, SessionManager};
    use parking_lot::Mutex;
    use serde::Deserialize;

    /// Transport replying with a fixed response and recording requests
    struct FixedTransport {
        response: Result<HttpResponse, GatewayError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl FixedTransport {
        fn new(status: u16, body: &str) -> Self {
            Self {
                response: Ok(HttpResponse {
                    status,
                    body: body.to_string(),
                }),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for FixedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GatewayError> {
            self.requests.lock().push(request);
            self.response.clone()
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Configured {
        configured: bool,
    }

    fn gateway(transport: Arc<FixedTransport>, logged_in: bool) -> RequestGateway {
        let manager = SessionManager::new(Box::new(MemorySessionStore::new()));
        if logged_in {
            manager
                .establish(Session {
                    token: "tok".to_string(),
                    username: "quan".to_string(),
                })
                .unwrap();
        }
        RequestGateway::new(transport, manager.handle())
    }

    #[tokio::test]
    async fn test_authenticated_call_attaches_token() {
        let transport = Arc::new(FixedTransport::new(200, r#"{"configured":true}"#));
        let gateway = gateway(Arc::clone(&transport), true);

        let status: Configured = gateway
            .call("/api/account-status", CallOptions::get())
            .await
            .unwrap();
        assert_eq!(status, Configured { configured: true });

        let requests = transport.requests.lock();
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].path, "/api/account-status");
        assert_eq!(requests[0].header(AUTH_HEADER), Some("tok"));
        assert_eq!(requests[0].header("content-type"), Some("application/json"));
        assert_eq!(requests[0].body, None);
    }

    #[tokio::test]
    async fn test_unauthenticated_call_omits_token_and_serialises_body() {
        let transport = Arc::new(FixedTransport::new(200, r#"{"configured":false}"#));
        let gateway = gateway(Arc::clone(&transport), true);

        let options = CallOptions::post()
            .with_body(&serde_json::json!({"username": "quan"}))
            .unwrap()
            .unauthenticated();
        let _: Configured = gateway.call("/api/login", options).await.unwrap();

        let requests = transport.requests.lock();
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].header(AUTH_HEADER), None);
        assert_eq!(requests[0].body.as_deref(), Some(r#"{"username":"quan"}"#));
    }

    #[tokio::test]
    async fn test_missing_session_omits_header() {
        let transport = Arc::new(FixedTransport::new(401, "Token invalid"));
        let gateway = gateway(Arc::clone(&transport), false);

        let error = gateway
            .call::<Configured>("/api/bots", CallOptions::get())
            .await
            .unwrap_err();

        assert!(error.is_session_expired());
        assert_eq!(transport.requests.lock()[0].header(AUTH_HEADER), None);
    }

    #[tokio::test]
    async fn test_failures_are_normalised() {
        struct TestCase {
            transport: FixedTransport,
            expected: GatewayError,
        }

        let tests = vec![
            TestCase {
                // TC0: body text becomes the message
                transport: FixedTransport::new(400, "User already exists"),
                expected: GatewayError::Status {
                    status: 400,
                    message: "User already exists".to_string(),
                },
            },
            TestCase {
                // TC1: empty body falls back to status
                transport: FixedTransport::new(500, ""),
                expected: GatewayError::Status {
                    status: 500,
                    message: "HTTP 500".to_string(),
                },
            },
            TestCase {
                // TC2: transport failure passes through
                transport: FixedTransport {
                    response: Err(GatewayError::Transport("connection refused".to_string())),
                    requests: Mutex::new(Vec::new()),
                },
                expected: GatewayError::Transport("connection refused".to_string()),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let gateway = gateway(Arc::new(test.transport), true);
            let actual = gateway
                .call::<Configured>("/api/account-status", CallOptions::get())
                .await
                .unwrap_err();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_error() {
        let transport = Arc::new(FixedTransport::new(200, "<html>"));
        let gateway = gateway(transport, true);

        let error = gateway
            .call::<Configured>("/api/account-status", CallOptions::get())
            .await
            .unwrap_err();
        assert!(matches!(error, GatewayError::Decode(_)));
    }

    #[tokio::test]
    async fn test_empty_success_body_decodes_as_empty_object() {
        #[derive(Debug, Deserialize, Default, PartialEq)]
        struct Empty {}

        let transport = Arc::new(FixedTransport::new(200, ""));
        let gateway = gateway(transport, true);

        let decoded: Empty = gateway
            .call("/api/stop-all-bots", CallOptions::post())
            .await
            .unwrap();
        assert_eq!(decoded, Empty {});
    }
}
