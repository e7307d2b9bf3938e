use std::time::Instant;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use tokio::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::scanner::{ProbeResult, ProbeStatus};

/// Build the shared probe client. Certificate validation is off because
/// candidates are routinely fronted by self-signed or mismatched certs.
pub fn build_client(config: &Config) -> Result<Client> {
    let mut headers = HeaderMap::new();
    for (key, value) in &config.probe.headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .with_context(|| format!("invalid header name '{}'", key))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("invalid value for header '{}'", key))?;
        headers.insert(name, value);
    }

    Client::builder()
        .timeout(Duration::from_millis(config.limits.timeout_ms))
        .danger_accept_invalid_certs(true)
        .default_headers(headers)
        .build()
        .context("failed to build HTTP client")
}

/// Issue the single probe POST and map the outcome to a ProbeResult.
/// Network failure is a normal result here, never an error.
pub async fn probe_endpoint(
    client: &Client,
    url: &str,
    payload: &serde_json::Value,
    max_latency_ms: u64,
) -> ProbeResult {
    let start = Instant::now();
    let response = client.post(url).json(payload).send().await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    // A latency past the ceiling means the clock or the path is lying;
    // record the probe without it.
    let latency_ms = if elapsed_ms <= max_latency_ms as f64 {
        Some(elapsed_ms)
    } else {
        debug!("unrealistic latency {:.0}ms for {}", elapsed_ms, url);
        None
    };

    let response = match response {
        Ok(r) => r,
        Err(e) if e.is_timeout() => {
            debug!("timeout probing {}", url);
            return ProbeResult { status: ProbeStatus::Timeout, latency_ms: None, body: None };
        }
        Err(e) => {
            debug!("request to {} failed: {}", url, e);
            return ProbeResult { status: ProbeStatus::ConnectFailed, latency_ms: None, body: None };
        }
    };

    let status = response.status();
    match status {
        StatusCode::OK => match response.text().await {
            Ok(body) => ProbeResult {
                status: ProbeStatus::Success,
                latency_ms,
                body: Some(body),
            },
            Err(e) => {
                debug!("failed to read body from {}: {}", url, e);
                ProbeResult { status: ProbeStatus::ConnectFailed, latency_ms: None, body: None }
            }
        },
        StatusCode::UNAUTHORIZED => ProbeResult {
            status: ProbeStatus::Unauthorized,
            latency_ms,
            body: None,
        },
        StatusCode::TOO_MANY_REQUESTS => ProbeResult {
            status: ProbeStatus::RateLimited,
            latency_ms,
            body: None,
        },
        s if s.is_server_error() => ProbeResult {
            status: ProbeStatus::ServerError(s.as_u16()),
            latency_ms,
            body: None,
        },
        s => {
            debug!("unhandled HTTP status {} from {}", s, url);
            ProbeResult {
                status: ProbeStatus::UnexpectedStatus(s.as_u16()),
                latency_ms,
                body: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn one_shot_server(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    fn test_client() -> Client {
        build_client(&Config::test_config()).unwrap()
    }

    #[tokio::test]
    async fn test_probe_maps_200_to_success_with_body() {
        let url = one_shot_server("200 OK", r#"{"data": "hello ok"}"#).await;

        let result = probe_endpoint(
            &test_client(),
            &url,
            &serde_json::json!({"text": "hi"}),
            60_000,
        )
        .await;

        assert_eq!(result.status, ProbeStatus::Success);
        assert!(result.latency_ms.is_some());
        assert!(result.body.unwrap().contains("data"));
    }

    #[tokio::test]
    async fn test_probe_maps_429_to_rate_limited() {
        let url = one_shot_server("429 Too Many Requests", "").await;

        let result = probe_endpoint(&test_client(), &url, &serde_json::json!({}), 60_000).await;
        assert_eq!(result.status, ProbeStatus::RateLimited);
        assert_eq!(result.status.http_status(), Some(429));
    }

    #[tokio::test]
    async fn test_probe_maps_refused_connection_to_connect_failed() {
        // Grab a free port and close the listener so the connect is refused.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}", addr);
        let result = probe_endpoint(&test_client(), &url, &serde_json::json!({}), 60_000).await;

        assert_eq!(result.status, ProbeStatus::ConnectFailed);
        assert!(result.latency_ms.is_none());
        assert!(result.body.is_none());
    }
}
