use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_rustls::TlsConnector;
use tracing::debug;
use x509_parser::prelude::*;

/// Connect, complete a TLS handshake and return the peer's end-entity
/// certificate in DER form. Verification is disabled: self-signed and
/// mismatched certificates are exactly what we want to look at.
pub async fn fetch_peer_certificate(host: &str, port: u16, timeout_ms: u64) -> Option<Vec<u8>> {
    let addr = format!("{}:{}", host, port);
    let dur = Duration::from_millis(timeout_ms);

    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let stream = match timeout(dur, TcpStream::connect(&addr)).await {
        Ok(Ok(s)) => s,
        _ => {
            debug!("tcp connect to {} failed or timed out", addr);
            return None;
        }
    };

    // SNI needs a hostname; for bare IPs any placeholder will do since we
    // don't verify the certificate anyway.
    let server_name = ServerName::try_from(host.to_string())
        .or_else(|_| ServerName::try_from("localhost".to_string()))
        .ok()?;

    let tls_stream = match timeout(dur, connector.connect(server_name, stream)).await {
        Ok(Ok(s)) => s,
        _ => {
            debug!("tls handshake with {} failed or timed out", addr);
            return None;
        }
    };

    let (_, session) = tls_stream.get_ref();
    session
        .peer_certificates()
        .and_then(|certs| certs.first())
        .map(|cert| cert.as_ref().to_vec())
}

/// Extract subject CN and SAN DNS names from a DER certificate.
///
/// Unparseable certificates and certificates without usable names both
/// yield an empty set; neither is an error.
pub fn extract_domains(der: &[u8]) -> BTreeSet<String> {
    let mut domains = BTreeSet::new();

    let parsed = match parse_x509_certificate(der) {
        Ok((_, cert)) => cert,
        Err(e) => {
            debug!("failed to parse certificate: {}", e);
            return domains;
        }
    };

    for cn in parsed.subject().iter_common_name() {
        if let Ok(value) = cn.as_str() {
            if let Some(domain) = normalize_domain(value) {
                domains.insert(domain);
            }
        }
    }

    if let Ok(Some(san)) = parsed.subject_alternative_name() {
        for name in san.value.general_names.iter() {
            if let GeneralName::DNSName(dns) = name {
                if let Some(domain) = normalize_domain(dns) {
                    domains.insert(domain);
                }
            }
        }
    }

    domains
}

/// Harvest domain names from the certificate presented at `host:port`.
pub async fn scan_domains(host: &str, port: u16, timeout_ms: u64) -> BTreeSet<String> {
    match fetch_peer_certificate(host, port, timeout_ms).await {
        Some(der) => extract_domains(&der),
        None => BTreeSet::new(),
    }
}

/// Lowercase, strip a leading wildcard label and keep only plausible
/// DNS names. Returns None for IPs, bare hostnames and junk.
pub fn normalize_domain(input: &str) -> Option<String> {
    static DOMAIN_RE: OnceLock<Regex> = OnceLock::new();
    let re = DOMAIN_RE.get_or_init(|| {
        Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$").unwrap()
    });

    let mut domain = input.trim().to_lowercase();
    if let Some(stripped) = domain.strip_prefix("*.") {
        domain = stripped.to_string();
    }

    if re.is_match(&domain) {
        Some(domain)
    } else {
        None
    }
}

#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
