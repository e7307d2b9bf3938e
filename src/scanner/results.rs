use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One probe target as read from the input file.
///
/// Identity is the literal input string: two lines that normalize to the
/// same `host:port` but were written differently stay distinct records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub host: String,
    pub port: u16,
    /// The input line exactly as given.
    pub raw: String,
}

impl Candidate {
    pub fn url(&self, api_path: &str) -> String {
        format!("https://{}:{}{}", self.host, self.port, api_path)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Outcome of the single HTTPS probe request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    /// HTTP 200 with a body to classify.
    Success,
    /// HTTP 401.
    Unauthorized,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx.
    ServerError(u16),
    /// Any other HTTP status.
    UnexpectedStatus(u16),
    /// The request did not complete in time.
    Timeout,
    /// TCP/TLS/transport failure before any HTTP response.
    ConnectFailed,
}

impl ProbeStatus {
    /// The peer answered with some HTTP response, whatever the status code.
    pub fn is_reachable(&self) -> bool {
        !matches!(self, ProbeStatus::Timeout | ProbeStatus::ConnectFailed)
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProbeStatus::Success => Some(200),
            ProbeStatus::Unauthorized => Some(401),
            ProbeStatus::RateLimited => Some(429),
            ProbeStatus::ServerError(code) | ProbeStatus::UnexpectedStatus(code) => Some(*code),
            ProbeStatus::Timeout | ProbeStatus::ConnectFailed => None,
        }
    }
}

/// Raw result of probing one candidate, before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    /// Wall-clock request time. Absent when the request never completed or
    /// the measured value exceeded the configured ceiling.
    pub latency_ms: Option<f64>,
    /// Response body, present only for `Success`.
    pub body: Option<String>,
}

/// Response-quality verdict for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    /// Well-formed response containing the expected text.
    Ok,
    /// Response text failed the mojibake/garble checks.
    Garbled,
    /// Reachable, but the body was not the expected payload.
    UnknownFormat,
    /// No HTTP response at all.
    Unreachable,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Ok => "ok",
            Verdict::Garbled => "garbled",
            Verdict::UnknownFormat => "unknown-format",
            Verdict::Unreachable => "unreachable",
        };
        write!(f, "{}", s)
    }
}

/// Final per-candidate record emitted to the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    /// The input line exactly as given.
    pub candidate: String,
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    pub http_status: Option<u16>,
    /// Domain names harvested from the peer certificate (CN + SAN).
    pub domains: BTreeSet<String>,
    pub verdict: Verdict,
    /// Body carried Cloudflare challenge markers.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cloudflare_blocked: bool,
}

impl ClassifiedRecord {
    pub fn category(&self) -> Category {
        match (self.verdict, self.http_status) {
            (Verdict::Unreachable, _) => Category::TimeoutOrUnreachable,
            (Verdict::Ok, _) => Category::Available,
            (Verdict::Garbled, _) => Category::InvalidContent,
            (Verdict::UnknownFormat, Some(401)) => Category::Unauthorized,
            (Verdict::UnknownFormat, Some(429)) => Category::RateLimited,
            (Verdict::UnknownFormat, Some(code)) if (500..600).contains(&code) => {
                Category::ServiceUnavailable
            }
            (Verdict::UnknownFormat, _) if self.cloudflare_blocked => {
                Category::CloudflareBlocked
            }
            (Verdict::UnknownFormat, _) => Category::Failed,
        }
    }
}

/// Output bucket a record lands in, mirroring the report layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Available,
    RateLimited,
    CloudflareBlocked,
    InvalidContent,
    ServiceUnavailable,
    Unauthorized,
    TimeoutOrUnreachable,
    Failed,
}

/// One endpoint entry inside a latency-sorted category bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointEntry {
    pub endpoint: String,
    pub latency_ms: Option<f64>,
}

/// Records grouped the way the report file presents them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorizedResults {
    pub available_endpoints: Vec<EndpointEntry>,
    pub rate_limited: Vec<EndpointEntry>,
    pub cloudflare_blocked: Vec<EndpointEntry>,
    pub invalid_content: Vec<EndpointEntry>,
    pub service_unavailable: Vec<EndpointEntry>,
    pub unauthorized: Vec<EndpointEntry>,
    pub timeout_or_unreachable: Vec<String>,
    pub failed: Vec<String>,
}

impl CategorizedResults {
    pub fn from_records(records: &[ClassifiedRecord]) -> Self {
        let mut categories = Self::default();

        for record in records {
            let entry = EndpointEntry {
                endpoint: record.candidate.clone(),
                latency_ms: record.latency_ms,
            };
            match record.category() {
                Category::Available => categories.available_endpoints.push(entry),
                Category::RateLimited => categories.rate_limited.push(entry),
                Category::CloudflareBlocked => categories.cloudflare_blocked.push(entry),
                Category::InvalidContent => categories.invalid_content.push(entry),
                Category::ServiceUnavailable => categories.service_unavailable.push(entry),
                Category::Unauthorized => categories.unauthorized.push(entry),
                Category::TimeoutOrUnreachable => {
                    categories.timeout_or_unreachable.push(record.candidate.clone())
                }
                Category::Failed => categories.failed.push(record.candidate.clone()),
            }
        }

        // Ascending latency, missing latency last.
        for bucket in [
            &mut categories.available_endpoints,
            &mut categories.rate_limited,
            &mut categories.cloudflare_blocked,
            &mut categories.invalid_content,
            &mut categories.service_unavailable,
            &mut categories.unauthorized,
        ] {
            bucket.sort_by(|a, b| {
                let ka = a.latency_ms.unwrap_or(f64::INFINITY);
                let kb = b.latency_ms.unwrap_or(f64::INFINITY);
                ka.total_cmp(&kb).then_with(|| a.endpoint.cmp(&b.endpoint))
            });
        }
        categories.timeout_or_unreachable.sort();
        categories.failed.sort();

        categories
    }

    pub fn counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("Available Endpoints", self.available_endpoints.len()),
            ("Rate Limited", self.rate_limited.len()),
            ("Cloudflare Blocked", self.cloudflare_blocked.len()),
            ("Invalid Content", self.invalid_content.len()),
            ("Service Unavailable", self.service_unavailable.len()),
            ("Unauthorized", self.unauthorized.len()),
            ("Timeout or Unreachable", self.timeout_or_unreachable.len()),
            ("Failed", self.failed.len()),
        ]
    }
}

/// Everything produced by one scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_candidates: usize,
    pub records: Vec<ClassifiedRecord>,
    pub categories: CategorizedResults,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(candidate: &str, verdict: Verdict, status: Option<u16>) -> ClassifiedRecord {
        ClassifiedRecord {
            candidate: candidate.to_string(),
            reachable: status.is_some(),
            latency_ms: status.map(|_| 50.0),
            http_status: status,
            domains: BTreeSet::new(),
            verdict,
            cloudflare_blocked: false,
        }
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            record("a:1", Verdict::Ok, Some(200)).category(),
            Category::Available
        );
        assert_eq!(
            record("a:1", Verdict::Garbled, Some(200)).category(),
            Category::InvalidContent
        );
        assert_eq!(
            record("a:1", Verdict::UnknownFormat, Some(429)).category(),
            Category::RateLimited
        );
        assert_eq!(
            record("a:1", Verdict::UnknownFormat, Some(503)).category(),
            Category::ServiceUnavailable
        );
        assert_eq!(
            record("a:1", Verdict::UnknownFormat, Some(401)).category(),
            Category::Unauthorized
        );
        assert_eq!(
            record("a:1", Verdict::Unreachable, None).category(),
            Category::TimeoutOrUnreachable
        );
        assert_eq!(
            record("a:1", Verdict::UnknownFormat, Some(200)).category(),
            Category::Failed
        );
    }

    #[test]
    fn test_cloudflare_category() {
        let mut r = record("a:1", Verdict::UnknownFormat, Some(200));
        r.cloudflare_blocked = true;
        assert_eq!(r.category(), Category::CloudflareBlocked);
    }

    #[test]
    fn test_latency_sort_puts_missing_last() {
        let mut fast = record("fast:1", Verdict::Ok, Some(200));
        fast.latency_ms = Some(10.0);
        let mut slow = record("slow:1", Verdict::Ok, Some(200));
        slow.latency_ms = Some(900.0);
        let mut odd = record("odd:1", Verdict::Ok, Some(200));
        odd.latency_ms = None;

        let categories = CategorizedResults::from_records(&[slow, odd, fast]);
        let order: Vec<_> = categories
            .available_endpoints
            .iter()
            .map(|e| e.endpoint.as_str())
            .collect();
        assert_eq!(order, vec!["fast:1", "slow:1", "odd:1"]);
    }

    #[test]
    fn test_verdict_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Verdict::UnknownFormat).unwrap(),
            "\"unknown-format\""
        );
        assert_eq!(
            serde_json::to_string(&Verdict::Unreachable).unwrap(),
            "\"unreachable\""
        );
    }

    #[test]
    fn test_one_record_one_bucket() {
        let records = vec![
            record("a:1", Verdict::Ok, Some(200)),
            record("b:2", Verdict::Unreachable, None),
            record("c:3", Verdict::UnknownFormat, Some(429)),
        ];
        let categories = CategorizedResults::from_records(&records);
        let total: usize = categories.counts().iter().map(|(_, n)| n).sum();
        assert_eq!(total, records.len());
    }
}
