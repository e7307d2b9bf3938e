mod classify;
mod probe;
mod results;
mod tls;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::Config;
pub use classify::{Classification, ResponseClassifier, RuleClassifier};
pub use results::{
    Candidate, CategorizedResults, Category, ClassifiedRecord, EndpointEntry, ProbeResult,
    ProbeStatus, ScanReport, Verdict,
};

/// Per-run state shared by all probe tasks.
struct ProbeContext {
    client: Client,
    classifier: Box<dyn ResponseClassifier>,
    api_path: String,
    payload: serde_json::Value,
    timeout_ms: u64,
    max_latency_ms: u64,
    scan_certificates: bool,
}

pub struct Scanner {
    context: Arc<ProbeContext>,
    concurrency: usize,
    show_progress: bool,
}

impl Scanner {
    pub fn new(config: &Config, scan_certificates: bool, show_progress: bool) -> Result<Self> {
        let client = probe::build_client(config)?;
        let classifier: Box<dyn ResponseClassifier> =
            Box::new(RuleClassifier::new(&config.rules)?);

        Ok(Self {
            context: Arc::new(ProbeContext {
                client,
                classifier,
                api_path: config.probe.api_path.clone(),
                payload: config.probe.payload.clone(),
                timeout_ms: config.limits.timeout_ms,
                max_latency_ms: config.limits.max_latency_ms,
                scan_certificates,
            }),
            concurrency: config.limits.concurrency,
            show_progress,
        })
    }

    /// Probe every candidate through the bounded worker pool and fold the
    /// results into a report. One candidate in, one record out.
    pub async fn scan(&self, candidates: Vec<Candidate>) -> Result<ScanReport> {
        let total_candidates = candidates.len();
        let started_at = chrono::Utc::now();

        let pb = if self.show_progress {
            let pb = ProgressBar::new(total_candidates as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "[{elapsed_precise}] {bar:40.green/black} {pos}/{len} candidates ({eta})",
                    )?
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = Vec::with_capacity(total_candidates);

        for candidate in candidates {
            let sem = semaphore.clone();
            let context = self.context.clone();
            let pb = pb.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.unwrap();
                let record = probe_candidate(&context, candidate).await;
                pb.inc(1);
                record
            }));
        }

        let records = join_all(tasks)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        pb.finish_and_clear();
        let finished_at = chrono::Utc::now();

        let categories = CategorizedResults::from_records(&records);

        Ok(ScanReport {
            started_at,
            finished_at,
            total_candidates,
            records,
            categories,
        })
    }
}

/// Run the full per-candidate pipeline: certificate scan, HTTP probe,
/// classification. Infallible: every outcome becomes a record.
async fn probe_candidate(context: &ProbeContext, candidate: Candidate) -> ClassifiedRecord {
    let domains = if context.scan_certificates {
        tls::scan_domains(&candidate.host, candidate.port, context.timeout_ms).await
    } else {
        BTreeSet::new()
    };

    let url = candidate.url(&context.api_path);
    debug!("probing {}", url);
    let probe = probe::probe_endpoint(
        &context.client,
        &url,
        &context.payload,
        context.max_latency_ms,
    )
    .await;

    let (verdict, cloudflare_blocked) = match &probe.status {
        ProbeStatus::Success => {
            let classification = context
                .classifier
                .classify(probe.body.as_deref().unwrap_or(""));
            (classification.verdict, classification.cloudflare_blocked)
        }
        ProbeStatus::Timeout | ProbeStatus::ConnectFailed => (Verdict::Unreachable, false),
        _ => (Verdict::UnknownFormat, false),
    };

    // An unreachable candidate reports no domains, even if the cert scan
    // managed a handshake the HTTP probe later lost.
    let domains = if verdict == Verdict::Unreachable {
        BTreeSet::new()
    } else {
        domains
    };

    ClassifiedRecord {
        candidate: candidate.raw,
        reachable: probe.status.is_reachable(),
        latency_ms: probe.latency_ms,
        http_status: probe.status.http_status(),
        domains,
        verdict,
        cloudflare_blocked,
    }
}
