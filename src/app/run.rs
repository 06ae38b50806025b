// src/app/run.rs
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::workflow::{admin_document, ProvisioningWorkflow, WorkflowOutputs};
use crate::cert::FileCertificateStore;
use crate::cluster::KubectlConnector;
use crate::config::ProvisioningConfig;
use crate::error::ProvisioningError;
use crate::kubeconfig::ConnectionDocument;
use crate::rbac::GrantSummary;

/// What a provisioning run produced, without any credential material.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub cluster: String,
    pub admin_kubeconfig: PathBuf,
    pub developer_kubeconfig: PathBuf,
    pub developer_context: String,
    pub certificate: PathBuf,
    pub certificate_issued: bool,
    pub namespace_created: bool,
    #[serde(flatten)]
    pub grant: GrantSummary,
}

pub async fn provision(config_path: &str) -> Result<RunSummary, ProvisioningError> {
    let config = ProvisioningConfig::load_from_file(config_path).map_err(|e| match e {
        ProvisioningError::NotFound { path } => ProvisioningError::invalid_input(format!(
            "config file {} not found, create one with `init`",
            path.display()
        )),
        e => e,
    })?;
    let settings = config.resolve()?;

    let connector = KubectlConnector::new(config.kubectl.as_str(), config.signing.approval);
    let store = FileCertificateStore::new();
    let outputs = ProvisioningWorkflow::new(&connector, &store)
        .run(&settings)
        .await?;

    let summary = write_documents(&outputs, &config.output_dir())?;
    info!(
        admin = %summary.admin_kubeconfig.display(),
        developer = %summary.developer_kubeconfig.display(),
        "wrote connection documents"
    );
    Ok(summary)
}

pub fn init(config_path: &str, force: bool) -> Result<(), ProvisioningError> {
    if Path::new(config_path).exists() && !force {
        return Err(ProvisioningError::invalid_input(format!(
            "{} already exists, pass --force to overwrite it",
            config_path
        )));
    }
    ProvisioningConfig::default().save_to_file(config_path)?;
    info!(path = config_path, "wrote default configuration");
    Ok(())
}

/// Renders the admin document without contacting the cluster.
pub fn render_admin(config_path: &str) -> Result<String, ProvisioningError> {
    let settings = ProvisioningConfig::load_from_file(config_path)?.resolve()?;
    let document = admin_document(&settings)?;
    Ok(document.text().to_string())
}

pub fn write_documents(
    outputs: &WorkflowOutputs,
    output_dir: &Path,
) -> Result<RunSummary, ProvisioningError> {
    let admin_kubeconfig = document_path(output_dir, &outputs.admin);
    let developer_kubeconfig = document_path(output_dir, &outputs.developer);

    outputs.admin.write_to(&admin_kubeconfig)?;
    outputs.developer.write_to(&developer_kubeconfig)?;
    if !outputs.certificate_issued {
        warn!(
            path = %outputs.certificate_path.display(),
            "developer document uses a previously issued certificate"
        );
    }

    Ok(RunSummary {
        cluster: outputs.admin.cluster_name.clone(),
        admin_kubeconfig,
        developer_kubeconfig,
        developer_context: outputs.developer.context_name.clone(),
        certificate: outputs.certificate_path.clone(),
        certificate_issued: outputs.certificate_issued,
        namespace_created: outputs.namespace_created,
        grant: outputs.grant.clone(),
    })
}

fn document_path(output_dir: &Path, document: &ConnectionDocument) -> PathBuf {
    output_dir.join(format!("{}.kubeconfig", document.context_name))
}
