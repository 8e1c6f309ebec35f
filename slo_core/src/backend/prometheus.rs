use super::{QueryBackend, Sample};
use crate::error::{Result, SloError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
}

impl PrometheusConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: None,
            password: None,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }
}

/// Client for the Prometheus HTTP API instant-query endpoint.
pub struct PrometheusBackend {
    client: reqwest::Client,
    query_url: String,
    config: PrometheusConfig,
}

impl PrometheusBackend {
    pub fn new(config: PrometheusConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(SloError::InvalidConfig("Prometheus URL is required".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            query_url: format!("{}/api/v1/query", config.url.trim_end_matches('/')),
            config,
        })
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }
}

#[async_trait]
impl QueryBackend for PrometheusBackend {
    async fn query(&self, expr: &str) -> Result<Vec<Sample>> {
        debug!(query = %expr, "Executing query");

        let time = format!("{:.3}", chrono::Utc::now().timestamp_millis() as f64 / 1000.0);
        let mut request = self
            .client
            .get(&self.query_url)
            .query(&[("query", expr), ("time", time.as_str())]);

        if let Some(user) = self.config.user.as_deref().filter(|u| !u.is_empty()) {
            request = request.basic_auth(user, self.config.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        // error responses still carry a JSON envelope
        let envelope: ApiResponse = serde_json::from_str(&body).map_err(|e| {
            SloError::MalformedResponse(format!("HTTP {}: {}", status, e))
        })?;

        let (samples, warnings) = decode_response(envelope)?;

        if !warnings.is_empty() {
            warn!(query = %expr, ?warnings, "Prometheus returned warnings");
        }

        debug!(query = %expr, samples = samples.len(), "Query result: {:?}", samples);

        Ok(samples)
    }

    fn name(&self) -> &str {
        "prometheus"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorElement {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

fn decode_response(response: ApiResponse) -> Result<(Vec<Sample>, Vec<String>)> {
    if response.status != "success" {
        return Err(SloError::QueryFailed(format!(
            "{}: {}",
            response.error_type.as_deref().unwrap_or("unknown"),
            response.error.as_deref().unwrap_or("no error message"),
        )));
    }

    let data = response
        .data
        .ok_or_else(|| SloError::MalformedResponse("missing data".to_string()))?;

    if data.result_type != "vector" {
        return Err(SloError::UnexpectedResultType(data.result_type));
    }

    let elements: Vec<VectorElement> = serde_json::from_value(data.result)?;

    let samples = elements
        .into_iter()
        .map(|element| {
            let (timestamp, raw) = element.value;
            let value = raw.parse::<f64>().map_err(|e| {
                SloError::MalformedResponse(format!("sample value '{}': {}", raw, e))
            })?;

            Ok(Sample {
                labels: element.metric,
                timestamp,
                value,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((samples, response.warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn decode(body: &str) -> Result<(Vec<Sample>, Vec<String>)> {
        decode_response(serde_json::from_str(body).unwrap())
    }

    #[test]
    fn test_decode_vector() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {"job": "api"}, "value": [1700000000.5, "0.9991"]},
                    {"metric": {}, "value": [1700000000.5, "NaN"]}
                ]
            }
        }"#;

        let (samples, warnings) = decode(body).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, 0.9991);
        assert_eq!(samples[0].labels.get("job").map(String::as_str), Some("api"));
        assert!(samples[1].value.is_nan());
    }

    #[test]
    fn test_decode_empty_vector_with_warnings() {
        let body = r#"{
            "status": "success",
            "data": {"resultType": "vector", "result": []},
            "warnings": ["partial response"]
        }"#;

        let (samples, warnings) = decode(body).unwrap();
        assert!(samples.is_empty());
        assert_eq!(warnings, vec!["partial response".to_string()]);
    }

    #[test]
    fn test_decode_error_status() {
        let body = r#"{"status": "error", "errorType": "bad_data", "error": "parse error at char 5"}"#;

        let err = decode(body).unwrap_err();
        assert!(matches!(err, SloError::QueryFailed(_)));
        assert!(err.to_string().contains("bad_data: parse error at char 5"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_decode_rejects_matrix() {
        let body = r#"{"status": "success", "data": {"resultType": "matrix", "result": []}}"#;
        assert!(matches!(decode(body), Err(SloError::UnexpectedResultType(t)) if t == "matrix"));
    }

    #[test]
    fn test_decode_rejects_non_numeric_value() {
        let body = r#"{
            "status": "success",
            "data": {"resultType": "vector", "result": [{"metric": {}, "value": [1.0, "abc"]}]}
        }"#;
        assert!(matches!(decode(body), Err(SloError::MalformedResponse(_))));
    }

    /// Answers a single request with a canned response and returns the raw
    /// request head once the exchange is done.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];

            loop {
                let n = stream.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;

            String::from_utf8_lossy(&request).into_owned()
        });

        (url, handle)
    }

    fn local_backend(config: PrometheusConfig) -> PrometheusBackend {
        let mut backend = PrometheusBackend::new(config).unwrap();
        backend.client = reqwest::Client::builder().no_proxy().build().unwrap();
        backend
    }

    const VECTOR_BODY: &str =
        r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1.0,"42"]}]}}"#;

    #[tokio::test]
    async fn test_query_sends_query_and_time_without_auth() {
        let (url, server) = serve_once("200 OK", VECTOR_BODY).await;
        let backend = local_backend(PrometheusConfig::new(url).basic_auth("", "ignored"));

        let samples = backend.query("up").await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 42.0);
        assert!(request.starts_with("GET /api/v1/query?query=up&time="), "{}", request);
        assert!(!request.to_lowercase().contains("authorization:"), "{}", request);
    }

    #[tokio::test]
    async fn test_query_sends_basic_auth() {
        let (url, server) = serve_once("200 OK", VECTOR_BODY).await;
        let backend = local_backend(PrometheusConfig::new(url).basic_auth("alice", "s3cret"));

        backend.query("up").await.unwrap();
        let request = server.await.unwrap().to_lowercase();

        assert!(request.contains("authorization: basic ywxpy2u6cznjcmv0"), "{}", request);
    }

    #[tokio::test]
    async fn test_query_non_json_error_body() {
        let (url, server) = serve_once("503 Service Unavailable", "upstream unavailable").await;
        let backend = local_backend(PrometheusConfig::new(url));

        let err = backend.query("up").await.unwrap_err();
        server.await.unwrap();

        assert!(matches!(&err, SloError::MalformedResponse(msg) if msg.contains("503")), "{}", err);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_query_error_envelope_on_bad_request() {
        let (url, server) = serve_once(
            "400 Bad Request",
            r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#,
        )
        .await;
        let backend = local_backend(PrometheusConfig::new(url));

        let err = backend.query("sum(").await.unwrap_err();
        server.await.unwrap();

        assert!(matches!(&err, SloError::QueryFailed(msg) if msg == "bad_data: parse error"), "{}", err);
    }

    #[test]
    fn test_backend_requires_url() {
        assert!(PrometheusBackend::new(PrometheusConfig::new("")).is_err());

        let backend = PrometheusBackend::new(PrometheusConfig::new("http://prometheus:9090/")).unwrap();
        assert_eq!(backend.query_url(), "http://prometheus:9090/api/v1/query");
        assert_eq!(backend.name(), "prometheus");
    }
}
