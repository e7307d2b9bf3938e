use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{info, warn};

use crate::scanner::Candidate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CandidateParseError {
    #[error("empty line")]
    Empty,
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    #[error("invalid host '{0}'")]
    InvalidHost(String),
}

/// Parse one input line into a Candidate.
///
/// Accepted shapes: `host:port`, bare `host` (gets `default_port`),
/// `[v6addr]:port`, and any of those with an `http(s)://` prefix or a
/// trailing path, which are stripped.
pub fn parse_candidate(line: &str, default_port: u16) -> Result<Candidate, CandidateParseError> {
    let raw = line.trim();
    if raw.is_empty() {
        return Err(CandidateParseError::Empty);
    }

    let rest = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))
        .unwrap_or(raw);
    let rest = rest.split('/').next().unwrap_or_default();

    let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| CandidateParseError::InvalidHost(rest.to_string()))?;
        match after.strip_prefix(':') {
            Some(port) => (host, parse_port(port)?),
            None if after.is_empty() => (host, default_port),
            None => return Err(CandidateParseError::InvalidHost(rest.to_string())),
        }
    } else if rest.matches(':').count() > 1 {
        // Unbracketed IPv6 address, no port.
        (rest, default_port)
    } else if let Some((host, port)) = rest.rsplit_once(':') {
        (host, parse_port(port)?)
    } else {
        (rest, default_port)
    };

    if host.is_empty() || !is_plausible_host(host) {
        return Err(CandidateParseError::InvalidHost(host.to_string()));
    }

    Ok(Candidate {
        host: host.to_string(),
        port,
        raw: raw.to_string(),
    })
}

fn parse_port(port: &str) -> Result<u16, CandidateParseError> {
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(CandidateParseError::InvalidPort(port.to_string())),
    }
}

fn is_plausible_host(host: &str) -> bool {
    host.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
}

/// Load and deduplicate candidates from the input file.
///
/// Malformed lines are logged and skipped; a file yielding no candidates
/// at all is a fatal error.
pub fn load_candidates(path: &Path, default_port: u16) -> Result<Vec<Candidate>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for (line_number, line) in content.lines().enumerate() {
        match parse_candidate(line, default_port) {
            Ok(candidate) => {
                if seen.insert(candidate.raw.clone()) {
                    candidates.push(candidate);
                }
            }
            Err(CandidateParseError::Empty) => {}
            Err(e) => {
                warn!(
                    "skipping line {} of {}: {} ({})",
                    line_number + 1,
                    path.display(),
                    line.trim(),
                    e
                );
            }
        }
    }

    if candidates.is_empty() {
        anyhow::bail!("no valid candidates found in {}", path.display());
    }

    info!("loaded {} unique candidates from {}", candidates.len(), path.display());
    Ok(candidates)
}
