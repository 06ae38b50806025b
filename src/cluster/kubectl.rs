// src/cluster/kubectl.rs
use std::env;
use std::io::Write as _;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::api::{Approver, AuthorizationApi, CertificateApi, ClusterConnector, ClusterSession};
use crate::cert::{CsrSnapshot, SigningRequest};
use crate::error::{ApiError, ProvisioningError};
use crate::kubeconfig::ConnectionDocument;

/// Who records the approval decision for a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Run `kubectl certificate approve` with the admin credential.
    #[default]
    Kubectl,
    /// Leave the decision to an operator; the poll budget covers the wait.
    Manual,
}

/// Admin kubeconfig materialised for the lifetime of a client.
///
/// The file is created 0600 from the start and removed when dropped.
fn admin_kubeconfig(document: &ConnectionDocument) -> Result<NamedTempFile, ProvisioningError> {
    let mut file = tempfile::Builder::new()
        .prefix("kubeconfig_")
        .suffix(".yaml")
        .tempfile()
        .map_err(|e| ProvisioningError::io(env::temp_dir(), e))?;
    let written = file
        .as_file_mut()
        .write_all(document.text().as_bytes())
        .and_then(|_| file.as_file().sync_all());
    written.map_err(|e| ProvisioningError::io(file.path(), e))?;
    Ok(file)
}

/// Maps kubectl's stderr onto the backend error kinds.
pub fn classify_failure(stderr: &str) -> ApiError {
    let message = stderr.trim().to_string();
    if message.contains("(AlreadyExists)") || message.contains("already exists") {
        ApiError::Conflict(message)
    } else if message.contains("(NotFound)") || message.contains("not found") {
        ApiError::NotFound(message)
    } else if message.contains("Unable to connect")
        || message.contains("connection refused")
        || message.contains("i/o timeout")
        || message.contains("no such host")
    {
        ApiError::Transport(message)
    } else {
        ApiError::Rejected(message)
    }
}

pub struct KubectlClient {
    program: String,
    prefix: Vec<String>,
    kubeconfig: NamedTempFile,
}

impl KubectlClient {
    pub fn new(binary: &str, admin: &ConnectionDocument) -> Result<Self, ProvisioningError> {
        Self::with_command(binary, Vec::new(), admin)
    }

    /// Runs `program prefix... --kubeconfig <admin> <args>` for every call.
    pub fn with_command(
        program: &str,
        prefix: Vec<String>,
        admin: &ConnectionDocument,
    ) -> Result<Self, ProvisioningError> {
        Ok(Self {
            program: program.to_string(),
            prefix,
            kubeconfig: admin_kubeconfig(admin)?,
        })
    }

    async fn run(&self, args: &[&str], stdin: Option<Vec<u8>>) -> Result<Vec<u8>, ApiError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix)
            .arg("--kubeconfig")
            .arg(self.kubeconfig.path())
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program, ?args, "running kubectl");

        let mut child = cmd
            .spawn()
            .map_err(|e| ApiError::Transport(format!("failed to run {}: {}", self.program, e)))?;

        if let Some(input) = stdin {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| ApiError::Transport("kubectl stdin unavailable".to_string()))?;
            pipe.write_all(&input)
                .await
                .map_err(|e| ApiError::Transport(format!("failed to write to kubectl: {}", e)))?;
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ApiError::Transport(format!("kubectl did not finish: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(status = ?output.status.code(), stderr = %stderr.trim(), "kubectl failed");
            return Err(classify_failure(&stderr));
        }

        Ok(output.stdout)
    }

    async fn create_from_json<T: Serialize + Sync>(&self, object: &T) -> Result<Vec<u8>, ApiError> {
        let manifest = serde_json::to_vec(object).map_err(|e| ApiError::Malformed(e.to_string()))?;
        self.run(&["create", "-f", "-", "-o", "json"], Some(manifest))
            .await
    }

    async fn exists(&self, kind: &str, namespace: Option<&str>, name: &str) -> Result<bool, ApiError> {
        let mut args = vec!["get", kind, name, "-o", "name"];
        if let Some(namespace) = namespace {
            args.extend(["-n", namespace]);
        }
        match self.run(&args, None).await {
            Ok(_) => Ok(true),
            Err(ApiError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CertificateApi for KubectlClient {
    async fn create(&self, request: &SigningRequest) -> Result<CsrSnapshot, ApiError> {
        let stdout = self.create_from_json(&request.to_manifest()).await?;
        CsrSnapshot::from_json(&stdout)
    }

    async fn get(&self, name: &str) -> Result<Option<CsrSnapshot>, ApiError> {
        match self.run(&["get", "csr", name, "-o", "json"], None).await {
            Ok(stdout) => CsrSnapshot::from_json(&stdout).map(Some),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Approver for KubectlClient {
    async fn approve(&self, name: &str) -> Result<(), ApiError> {
        self.run(&["certificate", "approve", name], None).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthorizationApi for KubectlClient {
    async fn ensure_namespace(&self, name: &str) -> Result<bool, ApiError> {
        if self.exists("namespace", None, name).await? {
            return Ok(false);
        }
        match self.run(&["create", "namespace", name], None).await {
            Ok(_) => Ok(true),
            // Lost a race with another writer; the namespace is there either way.
            Err(ApiError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn role_exists(&self, namespace: &str, name: &str) -> Result<bool, ApiError> {
        self.exists("role", Some(namespace), name).await
    }

    async fn role_binding_exists(&self, namespace: &str, name: &str) -> Result<bool, ApiError> {
        self.exists("rolebinding", Some(namespace), name).await
    }

    async fn create_role(&self, role: &Role) -> Result<(), ApiError> {
        self.create_from_json(role).await.map(|_| ())
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<(), ApiError> {
        self.create_from_json(binding).await.map(|_| ())
    }
}

/// Approval left to a human or external automation.
#[derive(Debug, Default, Clone)]
pub struct ManualApprover;

#[async_trait]
impl Approver for ManualApprover {
    async fn approve(&self, name: &str) -> Result<(), ApiError> {
        warn!(
            csr = name,
            "waiting for an operator to run: kubectl certificate approve {}", name
        );
        Ok(())
    }
}

pub struct KubectlConnector {
    binary: String,
    approval: ApprovalMode,
}

impl KubectlConnector {
    pub fn new(binary: impl Into<String>, approval: ApprovalMode) -> Self {
        Self {
            binary: binary.into(),
            approval,
        }
    }
}

impl ClusterConnector for KubectlConnector {
    fn connect(&self, admin: &ConnectionDocument) -> Result<ClusterSession, ProvisioningError> {
        let client = Arc::new(KubectlClient::new(&self.binary, admin)?);
        let approver: Arc<dyn Approver> = match self.approval {
            ApprovalMode::Kubectl => client.clone(),
            ApprovalMode::Manual => Arc::new(ManualApprover),
        };
        Ok(ClusterSession {
            certificates: client.clone(),
            approver,
            authorization: client,
        })
    }
}
