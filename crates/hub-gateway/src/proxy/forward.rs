//! Live-mode forwarding to the processing backend.
//!
//! One outbound call per inbound request, same method and path. The response
//! is rebuilt from the backend's declared content type: JSON bodies are
//! decoded and re-encoded (malformed JSON is rejected), everything else is
//! passed through byte for byte.

use std::fmt;
use std::time::Instant;

use axum::body::Body;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::Instrument;

use super::correlation::CORRELATION_HEADER;
use crate::error::GatewayError;

/// Content type assumed when the backend does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Headers that should NOT be forwarded (hop-by-hop headers).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

/// Methods the backend routes accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl ForwardMethod {
    pub fn as_method(self) -> Method {
        match self {
            ForwardMethod::Get => Method::GET,
            ForwardMethod::Post => Method::POST,
            ForwardMethod::Patch => Method::PATCH,
            ForwardMethod::Delete => Method::DELETE,
        }
    }
}

impl fmt::Display for ForwardMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_method().as_str())
    }
}

impl TryFrom<&Method> for ForwardMethod {
    type Error = GatewayError;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        match *method {
            Method::GET => Ok(ForwardMethod::Get),
            Method::POST => Ok(ForwardMethod::Post),
            Method::PATCH => Ok(ForwardMethod::Patch),
            Method::DELETE => Ok(ForwardMethod::Delete),
            _ => Err(GatewayError::UnsupportedMethod(method.to_string())),
        }
    }
}

/// An outbound call to the backend.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: ForwardMethod,
    /// Backend-relative route with a leading slash, query string included.
    pub path: String,
    pub body: Option<Bytes>,
    /// Caller headers, merged over the default `Content-Type`.
    pub headers: HeaderMap,
}

/// Reconstructed response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardBody {
    /// Decoded JSON, re-encoded when the response is written.
    Json(serde_json::Value),
    /// Opaque payload (CSV, text, binary), written unchanged.
    Raw(Bytes),
}

/// The backend's answer, rebuilt for the caller.
#[derive(Debug, Clone)]
pub struct ForwardResponse {
    pub status: StatusCode,
    /// The backend's header value as sent, or the JSON default when absent.
    pub content_type: HeaderValue,
    pub body: ForwardBody,
    /// Only ever set for raw bodies, and only when the backend sent one.
    pub content_disposition: Option<HeaderValue>,
}

/// Copy inbound headers that may travel to the backend: hop-by-hop headers
/// and `content-length` are dropped (reqwest sets the length from the body).
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let name_str = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&name_str) || name_str == "content-length" {
            continue;
        }
        if name_str == CORRELATION_HEADER {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}

/// Forward `request` to `base_url` and rebuild the backend's response.
///
/// Transport failures (including timeouts) surface as
/// [`GatewayError::BackendUnreachable`]; a JSON-declared body that does not
/// decode surfaces as [`GatewayError::InvalidBackendResponse`]. Nothing is
/// retried.
pub async fn forward(
    client: &reqwest::Client,
    base_url: &str,
    request: ForwardRequest,
    correlation_id: &str,
) -> Result<ForwardResponse, GatewayError> {
    let url = format!("{base_url}{}", request.path);
    let span = hub_tracing::backend_forward_span!(correlation_id, request.method, url);
    let start = Instant::now();

    async {
        // Default content type first so caller headers can replace it.
        let mut outbound = HeaderMap::new();
        outbound.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        outbound.extend(request.headers);
        if let Ok(value) = HeaderValue::from_str(correlation_id) {
            outbound.insert(CORRELATION_HEADER, value);
        }

        let mut req_builder = client
            .request(request.method.as_method(), &url)
            .headers(outbound);
        if let Some(body) = request.body {
            req_builder = req_builder.body(body);
        }

        let upstream = match req_builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let latency = start.elapsed().as_millis() as u64;
                tracing::Span::current().record("latency_ms", latency);
                if e.is_timeout() {
                    tracing::error!(error = %e, "Backend timeout");
                } else {
                    tracing::error!(error = %e, "Backend connection error");
                }
                return Err(GatewayError::BackendUnreachable(e));
            }
        };

        let status = upstream.status();
        let headers = upstream.headers().clone();
        let bytes = upstream
            .bytes()
            .await
            .map_err(GatewayError::BackendUnreachable)?;

        let latency = start.elapsed().as_millis() as u64;
        let current = tracing::Span::current();
        current.record("latency_ms", latency);
        current.record("status", status.as_u16());

        let response = reconstruct_response(status, &headers, bytes)?;
        current.record(
            "content_type",
            &*String::from_utf8_lossy(response.content_type.as_bytes()),
        );

        tracing::info!(
            status = status.as_u16(),
            latency_ms = latency,
            json = matches!(response.body, ForwardBody::Json(_)),
            "Forward complete"
        );

        Ok(response)
    }
    .instrument(span)
    .await
}

/// Rebuild a backend response from its status, headers and full body.
pub fn reconstruct_response(
    status: StatusCode,
    headers: &HeaderMap,
    bytes: Bytes,
) -> Result<ForwardResponse, GatewayError> {
    // Header values may carry any visible byte; match and copy them as bytes.
    let content_type = headers
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    if is_json_content_type(&content_type) {
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(GatewayError::InvalidBackendResponse)?;
        return Ok(ForwardResponse {
            status,
            content_type,
            body: ForwardBody::Json(value),
            content_disposition: None,
        });
    }

    Ok(ForwardResponse {
        status,
        content_type,
        body: ForwardBody::Raw(bytes),
        content_disposition: headers.get(CONTENT_DISPOSITION).cloned(),
    })
}

fn is_json_content_type(content_type: &HeaderValue) -> bool {
    let needle = DEFAULT_CONTENT_TYPE.as_bytes();
    content_type
        .as_bytes()
        .to_ascii_lowercase()
        .windows(needle.len())
        .any(|window| window == needle)
}

impl IntoResponse for ForwardResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            ForwardBody::Json(value) => match serde_json::to_vec(&value) {
                Ok(encoded) => Body::from(encoded),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to re-encode backend JSON");
                    return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
                }
            },
            ForwardBody::Raw(bytes) => Body::from(bytes),
        };

        let mut response_builder = Response::builder()
            .status(self.status)
            .header(CONTENT_TYPE, self.content_type);
        if let Some(disposition) = self.content_disposition {
            response_builder = response_builder.header(CONTENT_DISPOSITION, disposition);
        }

        response_builder.body(body).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to build response");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn request(method: ForwardMethod, path: &str) -> ForwardRequest {
        ForwardRequest {
            method,
            path: path.to_string(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    async fn response_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(ForwardMethod::try_from(&Method::GET).unwrap(), ForwardMethod::Get);
        assert_eq!(ForwardMethod::try_from(&Method::PATCH).unwrap(), ForwardMethod::Patch);
        assert_eq!(ForwardMethod::Delete.to_string(), "DELETE");

        let err = ForwardMethod::try_from(&Method::PUT).unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedMethod(ref m) if m == "PUT"));
    }

    #[test]
    fn test_forwardable_headers_drop_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("gateway:3080"));
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("content-length", HeaderValue::from_static("12"));
        headers.insert("accept", HeaderValue::from_static("text/csv"));
        headers.insert("x-client", HeaderValue::from_static("ui"));

        let forwarded = forwardable_headers(&headers);
        assert_eq!(forwarded.len(), 2);
        assert_eq!(forwarded.get("accept").unwrap(), "text/csv");
        assert_eq!(forwarded.get("x-client").unwrap(), "ui");
    }

    #[test]
    fn test_missing_content_type_is_treated_as_json() {
        let response =
            reconstruct_response(StatusCode::OK, &HeaderMap::new(), Bytes::from(r#"{"a":1}"#))
                .unwrap();
        assert_eq!(response.content_type, "application/json");
        assert_eq!(response.body, ForwardBody::Json(json!({ "a": 1 })));
    }

    #[test]
    fn test_json_charset_parameter_still_json() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        let response =
            reconstruct_response(StatusCode::CREATED, &headers, Bytes::from("[1,2]")).unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.content_type, "Application/JSON; charset=utf-8");
        assert_eq!(response.body, ForwardBody::Json(json!([1, 2])));
    }

    #[test]
    fn test_json_branch_ignores_content_disposition() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"result.json\""),
        );
        let response = reconstruct_response(StatusCode::OK, &headers, Bytes::from("{}")).unwrap();
        assert!(response.content_disposition.is_none());
    }

    #[test]
    fn test_non_ascii_disposition_is_kept_byte_for_byte() {
        let disposition =
            HeaderValue::from_bytes(b"attachment; filename=\"wyniki_\xf3.csv\"").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/csv"));
        headers.insert(CONTENT_DISPOSITION, disposition.clone());

        let response =
            reconstruct_response(StatusCode::OK, &headers, Bytes::from("a,b\n")).unwrap();
        assert_eq!(response.content_disposition.as_ref(), Some(&disposition));

        let http_response = response.into_response();
        assert_eq!(
            http_response
                .headers()
                .get(CONTENT_DISPOSITION)
                .unwrap()
                .as_bytes(),
            disposition.as_bytes()
        );
    }

    #[test]
    fn test_non_ascii_content_type_is_not_defaulted_to_json() {
        let content_type = HeaderValue::from_bytes(b"text/plain; name=\"\xe9\"").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, content_type.clone());

        let response =
            reconstruct_response(StatusCode::OK, &headers, Bytes::from("hello")).unwrap();
        assert_eq!(response.content_type, content_type);
        assert_eq!(response.body, ForwardBody::Raw(Bytes::from("hello")));

        let http_response = response.into_response();
        assert_eq!(
            http_response.headers().get(CONTENT_TYPE).unwrap().as_bytes(),
            content_type.as_bytes()
        );
    }

    #[test]
    fn test_non_ascii_json_content_type_still_decodes() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_bytes(b"application/json; profile=\"\xe9\"").unwrap(),
        );
        let response =
            reconstruct_response(StatusCode::OK, &headers, Bytes::from(r#"{"ok":true}"#))
                .unwrap();
        assert_eq!(response.body, ForwardBody::Json(json!({ "ok": true })));
    }

    #[tokio::test]
    async fn test_json_response_is_reencoded_with_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/cluster/jobs"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{ "jobs" : [] }"#, "application/json"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let response = forward(
            &client,
            &mock_server.uri(),
            request(ForwardMethod::Get, "/api/cluster/jobs"),
            "corr-1",
        )
        .await
        .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type, "application/json");
        assert_eq!(response.body, ForwardBody::Json(json!({ "jobs": [] })));

        let http_response = response.into_response();
        assert_eq!(http_response.status(), StatusCode::OK);
        assert_eq!(
            http_response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = response_bytes(http_response).await;
        let decoded: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded, json!({ "jobs": [] }));
    }

    #[tokio::test]
    async fn test_backend_error_status_is_preserved() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/cluster/job/abc"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "detail": { "code": "JOB_NOT_FOUND", "message": "Job abc not found or expired." }
            })))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let response = forward(
            &client,
            &mock_server.uri(),
            request(ForwardMethod::Get, "/api/cluster/job/abc"),
            "corr-2",
        )
        .await
        .unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let ForwardBody::Json(value) = response.body else {
            panic!("expected JSON body");
        };
        assert_eq!(value["detail"]["code"], "JOB_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_post_body_and_default_content_type_are_forwarded() {
        let mock_server = MockServer::start().await;
        let payload = r#"{"texts":["a","b"],"model_id":"m1"}"#;

        Mock::given(method("POST"))
            .and(path("/api/classify/predict"))
            .and(header("content-type", "application/json"))
            .and(header(CORRELATION_HEADER, "corr-3"))
            .and(body_string(payload))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "documents": [] })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let mut req = request(ForwardMethod::Post, "/api/classify/predict");
        req.body = Some(Bytes::from(payload));

        let response = forward(&client, &mock_server.uri(), req, "corr-3")
            .await
            .unwrap();
        assert_eq!(response.body, ForwardBody::Json(json!({ "documents": [] })));
    }

    #[tokio::test]
    async fn test_caller_content_type_overrides_default() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/api/taxonomy/t1/category/c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "c1" })))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let mut req = request(ForwardMethod::Patch, "/api/taxonomy/t1/category/c1");
        req.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/merge-patch+json"));
        req.headers
            .insert("authorization", HeaderValue::from_static("Bearer token"));
        req.body = Some(Bytes::from(r#"{"name":"renamed"}"#));

        forward(&client, &mock_server.uri(), req, "corr-4")
            .await
            .unwrap();

        let received = mock_server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        let content_types: Vec<_> = received[0].headers.get_all(CONTENT_TYPE).iter().collect();
        assert_eq!(content_types, vec!["application/merge-patch+json"]);
        assert_eq!(
            received[0].headers.get("authorization").unwrap(),
            "Bearer token"
        );
    }

    #[tokio::test]
    async fn test_query_string_is_forwarded() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/models"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let response = forward(
            &client,
            &mock_server.uri(),
            request(ForwardMethod::Get, "/api/models?limit=5"),
            "corr-5",
        )
        .await
        .unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_csv_is_passed_through_with_disposition() {
        let mock_server = MockServer::start().await;
        let csv = "id,tekst,kategoria\n1,\"za\u{17c}\u{f3}\u{142}\u{107}\",A\n";

        Mock::given(method("POST"))
            .and(path("/api/cluster/export"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(csv.as_bytes().to_vec(), "text/csv; charset=utf-8")
                    .insert_header(
                        "content-disposition",
                        "attachment; filename=\"topics.csv\"",
                    ),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let mut req = request(ForwardMethod::Post, "/api/cluster/export");
        req.body = Some(Bytes::from(r#"{"format":"csv"}"#));

        let response = forward(&client, &mock_server.uri(), req, "corr-6")
            .await
            .unwrap();

        assert_eq!(response.content_type, "text/csv; charset=utf-8");
        assert_eq!(
            response.content_disposition.as_ref().unwrap(),
            "attachment; filename=\"topics.csv\""
        );
        assert_eq!(response.body, ForwardBody::Raw(Bytes::from(csv)));

        let http_response = response.into_response();
        assert_eq!(
            http_response.headers().get(CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"topics.csv\""
        );
        assert_eq!(response_bytes(http_response).await, Bytes::from(csv));
    }

    #[tokio::test]
    async fn test_binary_without_disposition_omits_header() {
        let mock_server = MockServer::start().await;
        let payload: Vec<u8> = vec![0x00, 0xff, 0x10, 0x80, 0x7f];

        Mock::given(method("GET"))
            .and(path("/api/models/m1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(payload.clone(), "application/octet-stream"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let response = forward(
            &client,
            &mock_server.uri(),
            request(ForwardMethod::Get, "/api/models/m1"),
            "corr-7",
        )
        .await
        .unwrap();

        assert!(response.content_disposition.is_none());
        let http_response = response.into_response();
        assert!(http_response.headers().get(CONTENT_DISPOSITION).is_none());
        assert_eq!(response_bytes(http_response).await, Bytes::from(payload));
    }

    #[tokio::test]
    async fn test_malformed_json_is_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/taxonomy"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html>oops</html>", "application/json"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let err = forward(
            &client,
            &mock_server.uri(),
            request(ForwardMethod::Get, "/api/taxonomy"),
            "corr-8",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GatewayError::InvalidBackendResponse(_)));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_connection_failure_is_backend_unreachable() {
        let client = reqwest::Client::new();
        let err = forward(
            &client,
            "http://127.0.0.1:1",
            request(ForwardMethod::Get, "/api/cluster/jobs"),
            "corr-9",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GatewayError::BackendUnreachable(_)));
        assert_eq!(err.code(), "BACKEND_UNREACHABLE");
    }

    #[tokio::test]
    async fn test_timeout_is_backend_unreachable_with_504() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(10))
            .build()
            .unwrap();
        let err = forward(
            &client,
            &mock_server.uri(),
            request(ForwardMethod::Get, "/slow"),
            "corr-10",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GatewayError::BackendUnreachable(_)));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.code(), "BACKEND_TIMEOUT");
    }
}
