// types.rs
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Address and trust anchor of the target cluster's control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCoordinates {
    pub name: String,
    pub endpoint: String,
    /// Raw CA certificate bytes (usually PEM).
    pub ca_certificate: Vec<u8>,
}

impl ClusterCoordinates {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, ca_certificate: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            ca_certificate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthKind {
    Token,
    ClientCertificate,
}

// Token identities never carry files, certificate identities never carry a token.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Token(String),
    ClientCertificate { cert_path: PathBuf, key_path: PathBuf },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Token(_) => f.write_str("Token(<redacted>)"),
            Credential::ClientCertificate {
                cert_path,
                key_path,
            } => f
                .debug_struct("ClientCertificate")
                .field("cert_path", cert_path)
                .field("key_path", key_path)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub credential: Credential,
}

impl Identity {
    pub fn token(name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credential: Credential::Token(token.into()),
        }
    }

    pub fn client_certificate(
        name: impl Into<String>,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            credential: Credential::ClientCertificate {
                cert_path: cert_path.into(),
                key_path: key_path.into(),
            },
        }
    }

    pub fn auth_kind(&self) -> AuthKind {
        match self.credential {
            Credential::Token(_) => AuthKind::Token,
            Credential::ClientCertificate { .. } => AuthKind::ClientCertificate,
        }
    }
}

/// Lifecycle of a single certificate provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProvisioningState {
    NotRequested,
    Submitted,
    AwaitingApproval,
    Approved,
    Persisted,
    Denied,
    Failed,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisioningState::NotRequested => "not-requested",
            ProvisioningState::Submitted => "submitted",
            ProvisioningState::AwaitingApproval => "awaiting-approval",
            ProvisioningState::Approved => "approved",
            ProvisioningState::Persisted => "persisted",
            ProvisioningState::Denied => "denied",
            ProvisioningState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_kind_follows_credential() {
        assert_eq!(Identity::token("admin", "t0k").auth_kind(), AuthKind::Token);
        assert_eq!(
            Identity::client_certificate("devs", "devs.cert", "devs.key").auth_kind(),
            AuthKind::ClientCertificate
        );
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let identity = Identity::token("admin", "super-secret");
        let rendered = format!("{:?}", identity);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("admin"));
    }

    #[test]
    fn states_render_in_kebab_case() {
        assert_eq!(ProvisioningState::AwaitingApproval.to_string(), "awaiting-approval");
        assert_eq!(ProvisioningState::NotRequested.to_string(), "not-requested");
    }
}
