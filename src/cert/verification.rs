// src/cert/verification.rs
use chrono::{DateTime, TimeZone, Utc};
use openssl::hash::{hash, MessageDigest};
use openssl::x509::X509;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::ProvisioningError;

#[derive(Debug, Clone, PartialEq)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub serial: String,
    pub fingerprint: String,
}

impl CertificateInfo {
    pub fn expires_within(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.not_after - now <= window
    }
}

fn invalid(message: impl Into<String>) -> ProvisioningError {
    ProvisioningError::Crypto(message.into())
}

fn timestamp(seconds: i64, field: &str) -> Result<DateTime<Utc>, ProvisioningError> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| invalid(format!("invalid {} timestamp", field)))
}

/// Parses a PEM (or raw DER) certificate and summarises it.
pub fn analyze_certificate(cert_pem: &[u8]) -> Result<CertificateInfo, ProvisioningError> {
    let cert_der = if cert_pem.starts_with(b"-----BEGIN CERTIFICATE-----") {
        X509::from_pem(cert_pem)
            .and_then(|cert| cert.to_der())
            .map_err(|e| invalid(format!("certificate is not valid PEM: {}", e)))?
    } else {
        cert_pem.to_vec()
    };

    let (_remainder, cert) = X509Certificate::from_der(&cert_der)
        .map_err(|e| invalid(format!("certificate is not valid DER: {}", e)))?;

    let not_before = timestamp(cert.validity().not_before.timestamp(), "not_before")?;
    let not_after = timestamp(cert.validity().not_after.timestamp(), "not_after")?;
    let fingerprint = hash(MessageDigest::sha256(), &cert_der)
        .map_err(|e| invalid(format!("failed to fingerprint certificate: {}", e)))?;

    Ok(CertificateInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_before,
        not_after,
        serial: hex::encode(cert.raw_serial()),
        fingerprint: hex::encode(fingerprint),
    })
}
