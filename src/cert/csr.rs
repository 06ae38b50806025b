// src/cert/csr.rs
//
// Boundary model for certificates.k8s.io/v1 CertificateSigningRequest objects.
// Raw API payloads are decoded exactly once into `CsrSnapshot`; the provisioner
// only ever matches on `CsrStatus`.

use base64::{engine::general_purpose, Engine as _};
use k8s_openapi::api::certificates::v1::{CertificateSigningRequest, CertificateSigningRequestSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use serde::Deserialize;

use super::types::CertificateUsage;
use crate::error::ApiError;

pub const DEFAULT_SIGNER_NAME: &str = "kubernetes.io/kube-apiserver-client";

/// What the provisioner submits to the cluster's certificate API.
#[derive(Debug, Clone, PartialEq)]
pub struct SigningRequest {
    pub name: String,
    pub signer_name: String,
    /// PEM-encoded PKCS#10 request.
    pub request: Vec<u8>,
    pub usages: Vec<CertificateUsage>,
    pub expiration_seconds: Option<i32>,
}

impl SigningRequest {
    pub fn to_manifest(&self) -> CertificateSigningRequest {
        CertificateSigningRequest {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                ..Default::default()
            },
            spec: CertificateSigningRequestSpec {
                request: ByteString(self.request.clone()),
                signer_name: self.signer_name.clone(),
                usages: Some(self.usages.iter().map(|u| u.as_str().to_string()).collect()),
                expiration_seconds: self.expiration_seconds,
                ..Default::default()
            },
            status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrStatus {
    /// No decision recorded yet.
    Pending,
    /// Approved, but the signer has not filled in the certificate yet.
    Issuing,
    Approved { certificate: Vec<u8> },
    Denied { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsrSnapshot {
    pub name: String,
    pub request: Vec<u8>,
    pub status: CsrStatus,
}

#[derive(Debug, Deserialize)]
pub struct CsrObject {
    pub metadata: CsrMetadata,
    pub spec: CsrSpec,
    #[serde(default)]
    pub status: Option<CsrObjectStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CsrMetadata {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CsrSpec {
    pub request: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CsrObjectStatus {
    #[serde(default)]
    pub conditions: Option<Vec<CsrCondition>>,
    #[serde(default)]
    pub certificate: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CsrCondition {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl CsrCondition {
    fn is_true(&self) -> bool {
        self.status.as_deref().map_or(true, |s| s == "True")
    }

    fn describe(&self) -> String {
        match (&self.reason, &self.message) {
            (Some(reason), Some(message)) => format!("{}: {}", reason, message),
            (Some(reason), None) => reason.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => "no reason given".to_string(),
        }
    }
}

impl CsrSnapshot {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ApiError> {
        let object: CsrObject =
            serde_json::from_slice(bytes).map_err(|e| ApiError::Malformed(e.to_string()))?;
        Self::decode(object)
    }

    pub fn decode(object: CsrObject) -> Result<Self, ApiError> {
        let request = general_purpose::STANDARD
            .decode(object.spec.request.trim())
            .map_err(|e| {
                ApiError::Malformed(format!(
                    "request of {} is not base64: {}",
                    object.metadata.name, e
                ))
            })?;
        let status = decode_status(&object.metadata.name, object.status.unwrap_or_default())?;

        Ok(CsrSnapshot {
            name: object.metadata.name,
            request,
            status,
        })
    }
}

fn decode_status(name: &str, status: CsrObjectStatus) -> Result<CsrStatus, ApiError> {
    let conditions = status.conditions.unwrap_or_default();
    let active = || conditions.iter().filter(|c| c.is_true());

    // A denial or signer failure wins over any approval recorded earlier.
    if let Some(condition) = active().find(|c| c.type_ == "Denied") {
        return Ok(CsrStatus::Denied {
            reason: condition.describe(),
        });
    }
    if let Some(condition) = active().find(|c| c.type_ == "Failed") {
        return Ok(CsrStatus::Denied {
            reason: format!("signer failed: {}", condition.describe()),
        });
    }
    if !active().any(|c| c.type_ == "Approved") {
        return Ok(CsrStatus::Pending);
    }

    match status.certificate.as_deref().map(str::trim) {
        None | Some("") => Ok(CsrStatus::Issuing),
        Some(encoded) => {
            let certificate = general_purpose::STANDARD.decode(encoded).map_err(|e| {
                ApiError::Malformed(format!("certificate of {} is not base64: {}", name, e))
            })?;
            Ok(CsrStatus::Approved { certificate })
        }
    }
}
