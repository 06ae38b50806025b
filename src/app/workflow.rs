// src/app/workflow.rs
use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::cert::{
    ensure_csr, CertificateProvisioner, CertificateStore, CertificateUsage, CsrSubject,
};
use crate::cluster::ClusterConnector;
use crate::error::ProvisioningError;
use crate::kubeconfig::{build_cert_document, build_token_document, ConnectionDocument};
use crate::rbac::{AccessPolicyBinder, AccessRule, GrantSummary};
use crate::types::{ClusterCoordinates, Credential, Identity};
use crate::utils::backoff::PollConfig;

/// The certificate-based identity being provisioned and its local files.
#[derive(Debug, Clone, PartialEq)]
pub struct DeveloperSettings {
    pub name: String,
    pub csr_path: PathBuf,
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
    pub subject: CsrSubject,
    /// Generate the key and CSR when the CSR file is missing.
    pub generate_key: bool,
}

/// Everything a provisioning run needs, already read from config, files and environment.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSettings {
    pub cluster: ClusterCoordinates,
    /// Token identity used for every cluster call.
    pub admin: Identity,
    pub developer: DeveloperSettings,
    pub namespace: String,
    pub role_name: Option<String>,
    pub rules: Vec<AccessRule>,
    pub signer_name: String,
    pub usages: Vec<CertificateUsage>,
    pub expiration_seconds: Option<i32>,
    pub poll: PollConfig,
}

#[derive(Debug)]
pub struct WorkflowOutputs {
    pub admin: ConnectionDocument,
    pub developer: ConnectionDocument,
    pub certificate_path: PathBuf,
    /// False when a cached certificate was reused.
    pub certificate_issued: bool,
    pub namespace_created: bool,
    pub grant: GrantSummary,
}

/// Renders the admin connection document. The admin must authenticate with a token.
pub fn admin_document(settings: &WorkflowSettings) -> Result<ConnectionDocument, ProvisioningError> {
    match &settings.admin.credential {
        Credential::Token(token) => build_token_document(&settings.cluster, &settings.admin.name, token),
        Credential::ClientCertificate { .. } => Err(ProvisioningError::invalid_input(format!(
            "admin identity '{}' must use a bearer token",
            settings.admin.name
        ))),
    }
}

pub struct ProvisioningWorkflow<'a> {
    connector: &'a dyn ClusterConnector,
    store: &'a dyn CertificateStore,
}

impl<'a> ProvisioningWorkflow<'a> {
    pub fn new(connector: &'a dyn ClusterConnector, store: &'a dyn CertificateStore) -> Self {
        Self { connector, store }
    }

    pub async fn run(&self, settings: &WorkflowSettings) -> Result<WorkflowOutputs, ProvisioningError> {
        let developer = &settings.developer;

        let admin = admin_document(settings)?;
        info!(cluster = %settings.cluster.name, context = %admin.context_name, "built admin connection document");
        let session = self.connector.connect(&admin)?;

        let certificate_issued = if self.store.exists(&developer.cert_path) {
            info!(
                identity = %developer.name,
                path = %developer.cert_path.display(),
                "reusing cached certificate"
            );
            false
        } else {
            let request = self.signing_request(developer)?;
            let mut provisioner = CertificateProvisioner::new(
                session.certificates.as_ref(),
                session.approver.as_ref(),
                self.store,
            )
            .with_poll(settings.poll.clone())
            .with_signer(settings.signer_name.as_str())
            .with_expiration(settings.expiration_seconds);
            provisioner
                .provision(&developer.name, &request, &settings.usages, &developer.cert_path)
                .await?;
            info!(identity = %developer.name, state = %provisioner.state(), "certificate provisioned");
            true
        };

        let (cert_path, key_path) = self.credential_files(developer)?;
        let developer_document =
            build_cert_document(&settings.cluster, &developer.name, &cert_path, &key_path)?;
        info!(context = %developer_document.context_name, "built developer connection document");

        let namespace_created = session
            .authorization
            .ensure_namespace(&settings.namespace)
            .await
            .map_err(|e| ProvisioningError::api(&developer.name, "ensure namespace", e))?;
        if namespace_created {
            info!(namespace = %settings.namespace, "created namespace");
        }

        let grant = AccessPolicyBinder::new(session.authorization.as_ref())
            .with_role_name(settings.role_name.clone())
            .ensure_user_bound(&developer.name, &settings.namespace, &settings.rules)
            .await?;

        Ok(WorkflowOutputs {
            admin,
            developer: developer_document,
            certificate_path: cert_path,
            certificate_issued,
            namespace_created,
            grant,
        })
    }

    fn signing_request(&self, developer: &DeveloperSettings) -> Result<Vec<u8>, ProvisioningError> {
        if developer.generate_key {
            ensure_csr(&developer.subject, &developer.key_path, &developer.csr_path)?;
        } else if !developer.csr_path.is_file() {
            return Err(ProvisioningError::invalid_input(format!(
                "CSR file {} does not exist and key generation is disabled",
                developer.csr_path.display()
            )));
        }
        fs::read(&developer.csr_path).map_err(|e| ProvisioningError::io(&developer.csr_path, e))
    }

    /// Absolute certificate and key paths, so the document works from any directory.
    fn credential_files(
        &self,
        developer: &DeveloperSettings,
    ) -> Result<(PathBuf, PathBuf), ProvisioningError> {
        if !self.store.exists(&developer.cert_path) {
            return Err(ProvisioningError::invalid_input(format!(
                "certificate {} for '{}' is missing",
                developer.cert_path.display(),
                developer.name
            )));
        }
        if !developer.key_path.is_file() {
            return Err(ProvisioningError::invalid_input(format!(
                "private key {} for '{}' is missing",
                developer.key_path.display(),
                developer.name
            )));
        }
        let cert_path = fs::canonicalize(&developer.cert_path)
            .map_err(|e| ProvisioningError::io(&developer.cert_path, e))?;
        let key_path = fs::canonicalize(&developer.key_path)
            .map_err(|e| ProvisioningError::io(&developer.key_path, e))?;
        Ok((cert_path, key_path))
    }
}
