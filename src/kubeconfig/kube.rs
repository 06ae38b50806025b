use std::fmt;
use std::fs;
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};

use super::document::{
    ClusterConfig, ContextConfig, KubeConfig, NamedCluster, NamedContext, NamedUser, UserConfig,
};
use crate::error::ProvisioningError;
use crate::types::{AuthKind, ClusterCoordinates, Credential, Identity};
use crate::utils::files::write_owner_only;

/// A rendered kubeconfig for one identity against one cluster.
#[derive(Clone)]
pub struct ConnectionDocument {
    pub cluster_name: String,
    pub identity_name: String,
    pub context_name: String,
    pub auth_kind: AuthKind,
    text: String,
}

impl fmt::Debug for ConnectionDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDocument")
            .field("cluster_name", &self.cluster_name)
            .field("identity_name", &self.identity_name)
            .field("context_name", &self.context_name)
            .field("auth_kind", &self.auth_kind)
            .finish_non_exhaustive()
    }
}

impl ConnectionDocument {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parse(&self) -> Result<KubeConfig, ProvisioningError> {
        KubeConfig::from_yaml(&self.text)
            .map_err(|e| ProvisioningError::Serialization(e.to_string()))
    }

    /// Writes the document with owner-only permissions; it may hold a bearer token.
    pub fn write_to(&self, path: &Path) -> Result<(), ProvisioningError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ProvisioningError::io(parent, e))?;
        }
        write_owner_only(path, self.text.as_bytes()).map_err(|e| ProvisioningError::io(path, e))
    }

    /// Re-reads the rendered text and checks the current context resolves to this identity.
    fn verify(&self) -> Result<(), ProvisioningError> {
        let parsed = self.parse()?;
        match parsed.current_user() {
            Some(user) if user.name == self.context_name => Ok(()),
            _ => Err(ProvisioningError::Serialization(format!(
                "rendered document for '{}' does not resolve its own user",
                self.context_name
            ))),
        }
    }
}

pub fn context_name(cluster: &ClusterCoordinates, identity_name: &str) -> String {
    format!("{}-{}", cluster.name, identity_name)
}

pub fn build_token_document(
    cluster: &ClusterCoordinates,
    identity_name: &str,
    token: &str,
) -> Result<ConnectionDocument, ProvisioningError> {
    build_document(cluster, &Identity::token(identity_name, token))
}

pub fn build_cert_document(
    cluster: &ClusterCoordinates,
    identity_name: &str,
    cert_path: &Path,
    key_path: &Path,
) -> Result<ConnectionDocument, ProvisioningError> {
    build_document(
        cluster,
        &Identity::client_certificate(identity_name, cert_path, key_path),
    )
}

pub fn build_document(
    cluster: &ClusterCoordinates,
    identity: &Identity,
) -> Result<ConnectionDocument, ProvisioningError> {
    if cluster.endpoint.trim().is_empty() {
        return Err(ProvisioningError::invalid_input(format!(
            "cluster '{}' has no API endpoint",
            cluster.name
        )));
    }
    if cluster.ca_certificate.is_empty() {
        return Err(ProvisioningError::invalid_input(format!(
            "cluster '{}' has no CA certificate",
            cluster.name
        )));
    }
    if identity.name.trim().is_empty() {
        return Err(ProvisioningError::invalid_input("identity name is empty"));
    }

    let name = context_name(cluster, &identity.name);
    let user = match &identity.credential {
        Credential::Token(token) => UserConfig {
            token: Some(token.clone()),
            ..Default::default()
        },
        Credential::ClientCertificate {
            cert_path,
            key_path,
        } => UserConfig {
            client_certificate: Some(cert_path.to_string_lossy().into_owned()),
            client_key: Some(key_path.to_string_lossy().into_owned()),
            ..Default::default()
        },
    };

    let config = KubeConfig {
        api_version: "v1".to_string(),
        kind: "Config".to_string(),
        clusters: vec![NamedCluster {
            name: cluster.name.clone(),
            cluster: ClusterConfig {
                server: cluster.endpoint.clone(),
                certificate_authority_data: general_purpose::STANDARD
                    .encode(&cluster.ca_certificate),
            },
        }],
        contexts: vec![NamedContext {
            name: name.clone(),
            context: ContextConfig {
                cluster: cluster.name.clone(),
                user: name.clone(),
            },
        }],
        current_context: name.clone(),
        users: vec![NamedUser {
            name: name.clone(),
            user,
        }],
    };

    let text = config
        .to_yaml()
        .map_err(|e| ProvisioningError::Serialization(e.to_string()))?;

    let document = ConnectionDocument {
        cluster_name: cluster.name.clone(),
        identity_name: identity.name.clone(),
        context_name: name,
        auth_kind: identity.auth_kind(),
        text,
    };
    document.verify()?;
    Ok(document)
}
