// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport for the InfluxDB v2 write endpoint.
//!
//! One call to [`Transport::send`] is one `POST /api/v2/write`. The result is classified into
//! a [`SendResponse`] (204 No Content), a [`ServerError`] (any other status, carrying either the
//! server's `error` field or the raw body), or a transport failure (connect, read, timeout).
//! Nothing is retried here.
//!
//! A body is structured only when it is a JSON object with a string `error` field. Any other
//! body, including JSON objects such as `{"message": "..."}`, is kept raw with its newlines
//! collapsed, so the log line shows what the server actually sent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::config::Precision;
use crate::constants::{
    DEFAULT_AUTH_TOKEN, DEFAULT_BUCKET, DEFAULT_HTTP_TIMEOUT, DEFAULT_SERVER_URL,
    MAX_RESPONSE_BODY_BYTES, REQUEST_ID_HEADER, USER_AGENT, WRITE_PATH,
};
use crate::errors::{CreationError, ResponseBody, SendError, ServerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub server_url: String,
    pub auth_token: String,
    /// Sent as the `bucket` query parameter unless empty.
    pub bucket: String,
    pub precision: Option<Precision>,
    pub http_timeout: Duration,
    pub https_proxy: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            auth_token: DEFAULT_AUTH_TOKEN.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            precision: Some(Precision::Nanoseconds),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            https_proxy: None,
        }
    }
}

/// Successful write: the server answered 204 No Content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResponse {
    pub status_code: u16,
    pub request_id: Option<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `body` as a single bulk write, giving up after `timeout`.
    async fn send(&self, body: Vec<u8>, timeout: Duration) -> Result<SendResponse, SendError>;
}

#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    url: Url,
    authorization: HeaderValue,
}

impl Client {
    pub fn new(options: &ClientOptions) -> Result<Self, CreationError> {
        let url = make_write_url(options)?;

        let mut authorization = HeaderValue::from_str(&format!("Token {}", options.auth_token))
            .map_err(|e| CreationError::InvalidToken(e.to_string()))?;
        authorization.set_sensitive(true);

        let mut builder = reqwest::Client::builder()
            .timeout(options.http_timeout)
            .user_agent(USER_AGENT);

        if let Some(proxy) = &options.https_proxy {
            let proxy =
                reqwest::Proxy::https(proxy).map_err(|e| CreationError::InvalidProxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| CreationError::HttpClient(e.to_string()))?;

        debug!("Created write client for {url}");

        Ok(Self {
            http,
            url,
            authorization,
        })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn execute(&self, body: Vec<u8>) -> Result<SendResponse, SendError> {
        let response = self
            .http
            .post(self.url.clone())
            .header(AUTHORIZATION, self.authorization.clone())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = read_capped_body(response, MAX_RESPONSE_BODY_BYTES).await?;

        if status == StatusCode::NO_CONTENT {
            return Ok(SendResponse {
                status_code: status.as_u16(),
                request_id,
            });
        }

        Err(ServerError {
            status_code: status.as_u16(),
            request_id,
            body: parse_response_body(&body),
        }
        .into())
    }
}

#[async_trait]
impl Transport for Client {
    async fn send(&self, body: Vec<u8>, timeout: Duration) -> Result<SendResponse, SendError> {
        match tokio::time::timeout(timeout, self.execute(body)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout(timeout)),
        }
    }
}

/// `<server_url>/api/v2/write`, with `bucket` and `precision` appended only when set.
pub fn make_write_url(options: &ClientOptions) -> Result<Url, CreationError> {
    let base = options.server_url.trim_end_matches('/');

    let mut url =
        Url::parse(&format!("{base}{WRITE_PATH}")).map_err(|e| CreationError::InvalidUrl {
            url: options.server_url.clone(),
            reason: e.to_string(),
        })?;

    if !options.bucket.is_empty() || options.precision.is_some() {
        let mut query = url.query_pairs_mut();
        if !options.bucket.is_empty() {
            query.append_pair("bucket", &options.bucket);
        }
        if let Some(precision) = options.precision {
            query.append_pair("precision", precision.as_str());
        }
    }

    Ok(url)
}

/// Keeps the first `limit` bytes of the body and discards the rest.
async fn read_capped_body(mut response: Response, limit: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();

    while let Some(chunk) = response.chunk().await? {
        let remaining = limit.saturating_sub(body.len());
        if remaining > 0 {
            body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        }
    }

    Ok(body)
}

#[derive(Deserialize)]
struct ResponseError {
    error: String,
}

fn parse_response_body(body: &[u8]) -> ResponseBody {
    match serde_json::from_slice::<ResponseError>(body) {
        Ok(response) => ResponseBody::Error(collapse_newlines(&response.error)),
        Err(_) => ResponseBody::Raw(collapse_newlines(&String::from_utf8_lossy(body))),
    }
}

fn collapse_newlines(text: &str) -> String {
    text.replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn options(server_url: &str) -> ClientOptions {
        ClientOptions {
            server_url: server_url.to_string(),
            auth_token: "secret-token".to_string(),
            bucket: String::new(),
            precision: None,
            http_timeout: Duration::from_secs(5),
            https_proxy: None,
        }
    }

    #[test]
    fn test_make_write_url() {
        let cases = [
            (options("http://localhost:8086"), "http://localhost:8086/api/v2/write"),
            (options("http://localhost:8086/"), "http://localhost:8086/api/v2/write"),
            (
                options("http://influx.internal/proxy"),
                "http://influx.internal/proxy/api/v2/write",
            ),
            (
                ClientOptions {
                    bucket: "test".to_string(),
                    ..options("http://localhost:8086")
                },
                "http://localhost:8086/api/v2/write?bucket=test",
            ),
            (
                ClientOptions {
                    precision: Some(Precision::Seconds),
                    ..options("http://localhost:8086")
                },
                "http://localhost:8086/api/v2/write?precision=s",
            ),
            (
                ClientOptions {
                    bucket: "my bucket&co".to_string(),
                    precision: Some(Precision::Milliseconds),
                    ..options("http://localhost:8086")
                },
                "http://localhost:8086/api/v2/write?bucket=my+bucket%26co&precision=ms",
            ),
        ];

        for (options, expected) in cases {
            let url = make_write_url(&options).expect("failed to build url");
            assert_eq!(url.as_str(), expected);
        }
    }

    #[test]
    fn test_make_write_url_rejects_relative_url() {
        let result = make_write_url(&options(""));
        assert!(matches!(result, Err(CreationError::InvalidUrl { .. })));
    }

    #[test]
    fn test_new_rejects_invalid_token() {
        let result = Client::new(&ClientOptions {
            auth_token: "bad\ntoken".to_string(),
            ..options("http://localhost:8086")
        });
        assert!(matches!(result, Err(CreationError::InvalidToken(_))));
    }

    #[test]
    fn test_parse_response_body() {
        assert_eq!(
            parse_response_body(br#"{"error":"test"}"#),
            ResponseBody::Error("test".to_string())
        );
        assert_eq!(
            parse_response_body(br#"{"error":"line 1\nline 2","code":"invalid"}"#),
            ResponseBody::Error("line 1 line 2".to_string())
        );
        assert_eq!(
            parse_response_body(b"test"),
            ResponseBody::Raw("test".to_string())
        );
        assert_eq!(
            parse_response_body(b"bad\ngateway\n"),
            ResponseBody::Raw("bad gateway ".to_string())
        );
        assert_eq!(
            parse_response_body(br#"{"message":"no error field"}"#),
            ResponseBody::Raw(r#"{"message":"no error field"}"#.to_string())
        );
        assert_eq!(parse_response_body(b""), ResponseBody::Raw(String::new()));
    }

    #[tokio::test]
    async fn test_send_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/write")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("bucket".into(), "metrics".into()),
                Matcher::UrlEncoded("precision".into(), "ns".into()),
            ]))
            .match_header("Authorization", "Token secret-token")
            .match_header("User-Agent", USER_AGENT)
            .match_body("cpu value=1\ncpu value=2\n")
            .with_status(204)
            .with_header("X-Request-Id", "req-1")
            .create_async()
            .await;

        let client = Client::new(&ClientOptions {
            bucket: "metrics".to_string(),
            precision: Some(Precision::Nanoseconds),
            ..options(&server.url())
        })
        .expect("failed to create client");

        let response = client
            .send(b"cpu value=1\ncpu value=2\n".to_vec(), Duration::from_secs(5))
            .await
            .expect("send failed");

        assert_eq!(
            response,
            SendResponse {
                status_code: 204,
                request_id: Some("req-1".to_string()),
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_server_errors() {
        let cases = [
            (
                500,
                r#"{"error":"test"}"#.to_string(),
                ResponseBody::Error("test".to_string()),
            ),
            (500, "test".to_string(), ResponseBody::Raw("test".to_string())),
            (
                400,
                "unable to parse\n'cpu value='".to_string(),
                ResponseBody::Raw("unable to parse 'cpu value='".to_string()),
            ),
            // a 200 is still not the 204 the write API answers with
            (200, String::new(), ResponseBody::Raw(String::new())),
        ];

        for (status, body, expected) in cases {
            let mut server = Server::new_async().await;
            let _mock = server
                .mock("POST", "/api/v2/write")
                .with_status(status)
                .with_header("X-Request-Id", "req-2")
                .with_body(body)
                .create_async()
                .await;

            let client = Client::new(&options(&server.url())).expect("failed to create client");
            let err = client
                .send(b"test".to_vec(), Duration::from_secs(5))
                .await
                .expect_err("send should fail");

            match err {
                SendError::Server(server_error) => assert_eq!(
                    server_error,
                    ServerError {
                        status_code: status as u16,
                        request_id: Some("req-2".to_string()),
                        body: expected,
                    }
                ),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_send_caps_response_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v2/write")
            .with_status(503)
            .with_body("x".repeat(64 * 1024))
            .create_async()
            .await;

        let client = Client::new(&options(&server.url())).expect("failed to create client");
        let err = client
            .send(b"test".to_vec(), Duration::from_secs(5))
            .await
            .expect_err("send should fail");

        let SendError::Server(server_error) = err else {
            panic!("expected a server error");
        };
        assert_eq!(server_error.request_id, None);
        assert_eq!(
            server_error.body,
            ResponseBody::Raw("x".repeat(MAX_RESPONSE_BODY_BYTES))
        );
    }

    #[tokio::test]
    async fn test_send_truncated_json_is_raw() {
        let body = format!(r#"{{"error":"{}"}}"#, "e".repeat(2 * MAX_RESPONSE_BODY_BYTES));
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v2/write")
            .with_status(413)
            .with_body(body.clone())
            .create_async()
            .await;

        let client = Client::new(&options(&server.url())).expect("failed to create client");
        let err = client
            .send(b"test".to_vec(), Duration::from_secs(5))
            .await
            .expect_err("send should fail");

        let SendError::Server(server_error) = err else {
            panic!("expected a server error");
        };
        assert_eq!(server_error.status_code, 413);
        assert_eq!(
            server_error.body,
            ResponseBody::Raw(body[..MAX_RESPONSE_BODY_BYTES].to_string())
        );
    }

    #[tokio::test]
    async fn test_send_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind");
        let addr = listener.local_addr().expect("no local addr");

        // accept and never answer
        let _server = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let client =
            Client::new(&options(&format!("http://{addr}"))).expect("failed to create client");
        let err = client
            .send(b"test".to_vec(), Duration::from_millis(100))
            .await
            .expect_err("send should time out");

        assert!(matches!(err, SendError::Timeout(d) if d == Duration::from_millis(100)));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_send_connection_refused_is_transport_error() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("failed to bind");
            listener.local_addr().expect("no local addr")
        };

        let client =
            Client::new(&options(&format!("http://{addr}"))).expect("failed to create client");
        let err = client
            .send(b"test".to_vec(), Duration::from_secs(5))
            .await
            .expect_err("send should fail");

        assert!(matches!(err, SendError::Transport(_)));
        assert!(!err.is_server());
    }
}
