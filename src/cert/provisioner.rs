// src/cert/provisioner.rs
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::csr::{CsrSnapshot, CsrStatus, SigningRequest, DEFAULT_SIGNER_NAME};
use super::store::CertificateStore;
use super::types::CertificateUsage;
use super::verification::analyze_certificate;
use crate::cluster::{Approver, CertificateApi};
use crate::error::{ApiError, ProvisioningError};
use crate::types::ProvisioningState;
use crate::utils::backoff::PollConfig;

/// Drives one identity's signing request from submission to a certificate on disk.
///
/// The signing request object is named after the identity, so an interrupted
/// run can be resumed by calling [`CertificateProvisioner::provision`] again.
pub struct CertificateProvisioner<'a> {
    certificates: &'a dyn CertificateApi,
    approver: &'a dyn Approver,
    store: &'a dyn CertificateStore,
    poll: PollConfig,
    signer_name: String,
    expiration_seconds: Option<i32>,
    state: ProvisioningState,
}

impl<'a> CertificateProvisioner<'a> {
    pub fn new(
        certificates: &'a dyn CertificateApi,
        approver: &'a dyn Approver,
        store: &'a dyn CertificateStore,
    ) -> Self {
        Self {
            certificates,
            approver,
            store,
            poll: PollConfig::default(),
            signer_name: DEFAULT_SIGNER_NAME.to_string(),
            expiration_seconds: None,
            state: ProvisioningState::NotRequested,
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_signer(mut self, signer_name: impl Into<String>) -> Self {
        self.signer_name = signer_name.into();
        self
    }

    pub fn with_expiration(mut self, expiration_seconds: Option<i32>) -> Self {
        self.expiration_seconds = expiration_seconds;
        self
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    /// Returns `cert_path` once it holds a certificate signed for `identity`.
    ///
    /// An existing file at `cert_path` short-circuits the whole exchange.
    pub async fn provision(
        &mut self,
        identity: &str,
        request: &[u8],
        usages: &[CertificateUsage],
        cert_path: &Path,
    ) -> Result<PathBuf, ProvisioningError> {
        if identity.trim().is_empty() {
            return Err(ProvisioningError::invalid_input("identity name is empty"));
        }
        if request.is_empty() {
            return Err(ProvisioningError::invalid_input(format!(
                "certificate signing request for '{}' is empty",
                identity
            )));
        }

        if self.store.exists(cert_path) {
            info!(
                identity,
                path = %cert_path.display(),
                "certificate already present, skipping signing request"
            );
            self.transition(identity, ProvisioningState::Persisted);
            return Ok(cert_path.to_path_buf());
        }

        match self.drive(identity, request, usages, cert_path).await {
            Ok(()) => Ok(cert_path.to_path_buf()),
            Err(e) => {
                let state = match e {
                    ProvisioningError::Approval { .. } => ProvisioningState::Denied,
                    _ => ProvisioningState::Failed,
                };
                self.transition(identity, state);
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        identity: &str,
        request: &[u8],
        usages: &[CertificateUsage],
        cert_path: &Path,
    ) -> Result<(), ProvisioningError> {
        let snapshot = self.submit(identity, request, usages).await?;
        let name = snapshot.name;

        let certificate = match snapshot.status {
            CsrStatus::Denied { reason } => return Err(denied(identity, &name, reason)),
            CsrStatus::Approved { certificate } => {
                info!(identity, csr = %name, "signing request already approved");
                self.transition(identity, ProvisioningState::Approved);
                certificate
            }
            CsrStatus::Issuing => {
                info!(identity, csr = %name, "signing request already approved, waiting for signer");
                self.transition(identity, ProvisioningState::Approved);
                self.await_certificate(identity, &name).await?
            }
            CsrStatus::Pending => {
                // Polling starts only after the approval call has returned.
                self.approver
                    .approve(&name)
                    .await
                    .map_err(|e| ProvisioningError::api(identity, "approve certificate signing request", e))?;
                self.transition(identity, ProvisioningState::AwaitingApproval);
                self.await_certificate(identity, &name).await?
            }
        };

        if self.state != ProvisioningState::Approved {
            self.transition(identity, ProvisioningState::Approved);
        }
        self.persist(identity, cert_path, &certificate)
    }

    /// Get-or-create on the identity-named request object.
    async fn submit(
        &mut self,
        identity: &str,
        request: &[u8],
        usages: &[CertificateUsage],
    ) -> Result<CsrSnapshot, ProvisioningError> {
        let existing = self
            .certificates
            .get(identity)
            .await
            .map_err(|e| ProvisioningError::api(identity, "look up certificate signing request", e))?;

        if let Some(existing) = existing {
            if existing.request != request {
                return Err(ProvisioningError::api(
                    identity,
                    "submit certificate signing request",
                    ApiError::Conflict(format!(
                        "certificatesigningrequest '{}' exists with a different request",
                        existing.name
                    )),
                ));
            }
            info!(identity, csr = %existing.name, "resuming existing signing request");
            self.transition(identity, ProvisioningState::Submitted);
            return Ok(existing);
        }

        let signing_request = SigningRequest {
            name: identity.to_string(),
            signer_name: self.signer_name.clone(),
            request: request.to_vec(),
            usages: usages.to_vec(),
            expiration_seconds: self.expiration_seconds,
        };
        let created = self
            .certificates
            .create(&signing_request)
            .await
            .map_err(|e| ProvisioningError::api(identity, "submit certificate signing request", e))?;

        info!(identity, csr = %created.name, signer = %self.signer_name, "submitted signing request");
        self.transition(identity, ProvisioningState::Submitted);
        Ok(created)
    }

    async fn await_certificate(
        &mut self,
        identity: &str,
        name: &str,
    ) -> Result<Vec<u8>, ProvisioningError> {
        let started = Instant::now();
        let deadline = started.checked_add(self.poll.timeout).ok_or_else(|| {
            ProvisioningError::invalid_input(format!(
                "poll timeout {:?} is too large",
                self.poll.timeout
            ))
        })?;
        let mut delays = self.poll.backoff();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let snapshot = self
                .certificates
                .get(name)
                .await
                .map_err(|e| ProvisioningError::api(identity, "read certificate signing request", e))?
                .ok_or_else(|| {
                    ProvisioningError::api(
                        identity,
                        "read certificate signing request",
                        ApiError::NotFound(format!("certificatesigningrequest '{}' disappeared", name)),
                    )
                })?;

            match snapshot.status {
                CsrStatus::Approved { certificate } => {
                    debug!(identity, csr = name, attempt, "certificate issued");
                    return Ok(certificate);
                }
                CsrStatus::Denied { reason } => return Err(denied(identity, name, reason)),
                CsrStatus::Issuing => {
                    debug!(identity, csr = name, attempt, "approved, certificate not issued yet");
                    if self.state != ProvisioningState::Approved {
                        self.transition(identity, ProvisioningState::Approved);
                    }
                }
                CsrStatus::Pending => {
                    debug!(identity, csr = name, attempt, "signing request still pending");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ProvisioningError::Timeout {
                    identity: identity.to_string(),
                    csr: name.to_string(),
                    waited: started.elapsed(),
                });
            }
            let delay = delays
                .next()
                .unwrap_or(self.poll.max_interval)
                .min(deadline - now);
            tokio::time::sleep(delay).await;
        }
    }

    fn persist(
        &mut self,
        identity: &str,
        cert_path: &Path,
        certificate: &[u8],
    ) -> Result<(), ProvisioningError> {
        self.store.write(cert_path, certificate)?;

        let stored = self
            .store
            .read(cert_path)
            .map_err(|e| ProvisioningError::Consistency {
                identity: identity.to_string(),
                path: cert_path.to_path_buf(),
                message: format!("certificate unreadable after write: {}", e),
            })?;
        if stored != certificate {
            return Err(ProvisioningError::Consistency {
                identity: identity.to_string(),
                path: cert_path.to_path_buf(),
                message: "stored certificate differs from the issued one".to_string(),
            });
        }

        self.transition(identity, ProvisioningState::Persisted);
        info!(identity, path = %cert_path.display(), "certificate written");

        match analyze_certificate(&stored) {
            Ok(cert) => {
                info!(
                    identity,
                    subject = %cert.subject,
                    not_after = %cert.not_after,
                    fingerprint = %cert.fingerprint,
                    "issued certificate"
                );
                if cert.expires_within(Utc::now(), chrono::Duration::hours(24)) {
                    warn!(identity, not_after = %cert.not_after, "certificate expires within a day");
                }
            }
            Err(e) => warn!(identity, error = %e, "could not inspect issued certificate"),
        }

        Ok(())
    }

    fn transition(&mut self, identity: &str, next: ProvisioningState) {
        info!(identity, from = %self.state, to = %next, "provisioning state changed");
        self.state = next;
    }
}

fn denied(identity: &str, name: &str, reason: String) -> ProvisioningError {
    ProvisioningError::Approval {
        identity: identity.to_string(),
        csr: name.to_string(),
        reason,
    }
}
