// src/cluster/api.rs
//
// Everything that talks to the cluster goes through these traits.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};

use crate::cert::{CsrSnapshot, SigningRequest};
use crate::error::{ApiError, ProvisioningError};
use crate::kubeconfig::ConnectionDocument;

/// The cluster's certificates.k8s.io API.
#[async_trait]
pub trait CertificateApi: Send + Sync {
    /// Create a signing request object and return it as stored by the server.
    async fn create(&self, request: &SigningRequest) -> Result<CsrSnapshot, ApiError>;

    /// Fetch a signing request by name; `None` when it does not exist.
    async fn get(&self, name: &str) -> Result<Option<CsrSnapshot>, ApiError>;
}

/// Capability to record an approval decision for a named signing request.
///
/// Returning `Ok` means the approval was issued and acknowledged.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, name: &str) -> Result<(), ApiError>;
}

/// Namespace and rbac.authorization.k8s.io operations.
#[async_trait]
pub trait AuthorizationApi: Send + Sync {
    /// Create the namespace if missing. Returns true when it was created.
    async fn ensure_namespace(&self, name: &str) -> Result<bool, ApiError>;

    async fn role_exists(&self, namespace: &str, name: &str) -> Result<bool, ApiError>;

    async fn role_binding_exists(&self, namespace: &str, name: &str) -> Result<bool, ApiError>;

    async fn create_role(&self, role: &Role) -> Result<(), ApiError>;

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<(), ApiError>;
}

/// Handles to one authenticated cluster connection.
#[derive(Clone)]
pub struct ClusterSession {
    pub certificates: Arc<dyn CertificateApi>,
    pub approver: Arc<dyn Approver>,
    pub authorization: Arc<dyn AuthorizationApi>,
}

/// Opens a [`ClusterSession`] authenticated with an admin connection document.
pub trait ClusterConnector: Send + Sync {
    fn connect(&self, admin: &ConnectionDocument) -> Result<ClusterSession, ProvisioningError>;
}
