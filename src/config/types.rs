// config/types.rs
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

use crate::app::{DeveloperSettings, WorkflowSettings};
use crate::cert::{default_usages, CertificateUsage, CsrSubject, DEFAULT_SIGNER_NAME};
use crate::cluster::ApprovalMode;
use crate::error::ProvisioningError;
use crate::rbac::{default_rules, AccessRule};
use crate::types::{ClusterCoordinates, Identity};
use crate::utils::backoff::PollConfig;

pub const DEFAULT_CONFIG_FILE: &str = "provision.json";
pub const DEFAULT_TOKEN_ENV: &str = "DIGITALOCEAN_TOKEN";

// The API server refuses shorter certificate lifetimes.
const MIN_EXPIRATION_SECONDS: i32 = 600;
const MAX_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    pub name: String,
    pub endpoint: String,
    /// PEM file holding the cluster CA.
    pub ca_certificate_path: Option<String>,
    /// Base64 CA bundle, as found in `certificate-authority-data`.
    pub ca_certificate_data: Option<String>,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            name: "do-k8s".to_string(),
            endpoint: "https://127.0.0.1:6443".to_string(),
            ca_certificate_path: Some("certs/ca.crt".to_string()),
            ca_certificate_data: None,
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSection {
    pub name: String,
    /// Inline bearer token; prefer `token_env`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub token_env: String,
}

impl Default for AdminSection {
    fn default() -> Self {
        Self {
            name: "admin".to_string(),
            token: None,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
        }
    }
}

impl fmt::Debug for AdminSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSection")
            .field("name", &self.name)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_env", &self.token_env)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeveloperSection {
    pub name: String,
    pub csr_path: String,
    pub key_path: String,
    pub cert_path: String,
    pub organization: Option<String>,
    pub generate_key: bool,
}

impl Default for DeveloperSection {
    fn default() -> Self {
        Self {
            name: "devs".to_string(),
            csr_path: "certs/devs.csr".to_string(),
            key_path: "certs/devs.key".to_string(),
            cert_path: "certs/devs.cert".to_string(),
            organization: Some("devs".to_string()),
            generate_key: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Name shared by the role and its binding; defaults to the developer name.
    pub role_name: Option<String>,
    /// Replaces the built-in rule set when present.
    pub rules: Option<Vec<AccessRule>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSection {
    pub signer_name: String,
    pub usages: Vec<CertificateUsage>,
    pub expiration_seconds: Option<i32>,
    pub approval: ApprovalMode,
    pub timeout_secs: u64,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
}

impl Default for SigningSection {
    fn default() -> Self {
        let poll = PollConfig::default();
        Self {
            signer_name: DEFAULT_SIGNER_NAME.to_string(),
            usages: default_usages(),
            expiration_seconds: None,
            approval: ApprovalMode::default(),
            timeout_secs: poll.timeout.as_secs(),
            initial_interval_ms: poll.initial_interval.as_millis() as u64,
            max_interval_ms: poll.max_interval.as_millis() as u64,
            multiplier: poll.multiplier,
        }
    }
}

impl SigningSection {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            multiplier: self.multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub cluster: ClusterSection,
    pub admin: AdminSection,
    pub developer: DeveloperSection,
    pub namespace: String,
    pub policy: PolicySection,
    pub signing: SigningSection,
    /// Where connection documents are written.
    pub output_dir: String,
    pub kubectl: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterSection::default(),
            admin: AdminSection::default(),
            developer: DeveloperSection::default(),
            namespace: "apps".to_string(),
            policy: PolicySection::default(),
            signing: SigningSection::default(),
            output_dir: "kubeconfigs".to_string(),
            kubectl: "kubectl".to_string(),
        }
    }
}

impl ProvisioningConfig {
    pub fn load_from_file(path: &str) -> Result<Self, ProvisioningError> {
        let config_str = fs::read_to_string(path).map_err(|e| ProvisioningError::io(path, e))?;
        serde_json::from_str(&config_str)
            .map_err(|e| ProvisioningError::Serialization(format!("{}: {}", path, e)))
    }

    pub fn save_to_file(&self, path: &str) -> Result<(), ProvisioningError> {
        let config_str = serde_json::to_string_pretty(self)
            .map_err(|e| ProvisioningError::Serialization(e.to_string()))?;
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ProvisioningError::io(parent, e))?;
            }
        }
        fs::write(path, config_str).map_err(|e| ProvisioningError::io(path, e))
    }

    pub fn validate(&self) -> Result<(), ProvisioningError> {
        require("cluster.name", &self.cluster.name)?;
        require("admin.name", &self.admin.name)?;
        require("developer.name", &self.developer.name)?;
        require("namespace", &self.namespace)?;
        require("kubectl", &self.kubectl)?;
        require("output_dir", &self.output_dir)?;
        require("developer.csr_path", &self.developer.csr_path)?;
        require("developer.key_path", &self.developer.key_path)?;
        require("developer.cert_path", &self.developer.cert_path)?;

        let endpoint = Url::parse(&self.cluster.endpoint).map_err(|e| {
            ProvisioningError::invalid_input(format!(
                "cluster.endpoint '{}' is not a URL: {}",
                self.cluster.endpoint, e
            ))
        })?;
        if !matches!(endpoint.scheme(), "https" | "http") || endpoint.host_str().is_none() {
            return Err(ProvisioningError::invalid_input(format!(
                "cluster.endpoint '{}' must be an http(s) URL with a host",
                self.cluster.endpoint
            )));
        }

        match (&self.cluster.ca_certificate_path, &self.cluster.ca_certificate_data) {
            (Some(_), Some(_)) => {
                return Err(ProvisioningError::invalid_input(
                    "set only one of cluster.ca_certificate_path and cluster.ca_certificate_data",
                ))
            }
            (None, None) => {
                return Err(ProvisioningError::invalid_input(
                    "one of cluster.ca_certificate_path or cluster.ca_certificate_data is required",
                ))
            }
            _ => {}
        }

        if self.admin.token.is_none() {
            require("admin.token_env", &self.admin.token_env)?;
        }

        require("signing.signer_name", &self.signing.signer_name)?;
        if self.signing.usages.is_empty() {
            return Err(ProvisioningError::invalid_input("signing.usages is empty"));
        }
        if let Some(seconds) = self.signing.expiration_seconds {
            if seconds < MIN_EXPIRATION_SECONDS {
                return Err(ProvisioningError::invalid_input(format!(
                    "signing.expiration_seconds must be at least {}",
                    MIN_EXPIRATION_SECONDS
                )));
            }
        }
        if self.signing.timeout_secs == 0
            || self.signing.initial_interval_ms == 0
            || self.signing.max_interval_ms == 0
        {
            return Err(ProvisioningError::invalid_input(
                "signing timeout and poll intervals must be positive",
            ));
        }
        if self.signing.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ProvisioningError::invalid_input(format!(
                "signing.timeout_secs must be at most {}",
                MAX_TIMEOUT_SECS
            )));
        }
        if self.signing.multiplier.is_nan() || self.signing.multiplier < 1.0 {
            return Err(ProvisioningError::invalid_input(
                "signing.multiplier must be at least 1",
            ));
        }

        if let Some(rules) = &self.policy.rules {
            if rules.is_empty() {
                return Err(ProvisioningError::invalid_input("policy.rules is empty"));
            }
            for rule in rules {
                rule.validate()?;
            }
        }

        Ok(())
    }

    /// Validates and reads the CA file and admin token from the process environment.
    pub fn resolve(&self) -> Result<WorkflowSettings, ProvisioningError> {
        self.resolve_with(|name| env::var(name).ok())
    }

    /// Like [`Self::resolve`] with an explicit environment lookup.
    pub fn resolve_with(
        &self,
        lookup_env: impl Fn(&str) -> Option<String>,
    ) -> Result<WorkflowSettings, ProvisioningError> {
        self.validate()?;

        Ok(WorkflowSettings {
            cluster: ClusterCoordinates::new(
                self.cluster.name.clone(),
                self.cluster.endpoint.clone(),
                self.ca_certificate()?,
            ),
            admin: Identity::token(self.admin.name.clone(), self.admin_token(lookup_env)?),
            developer: DeveloperSettings {
                name: self.developer.name.clone(),
                csr_path: expand(&self.developer.csr_path),
                key_path: expand(&self.developer.key_path),
                cert_path: expand(&self.developer.cert_path),
                subject: CsrSubject {
                    common_name: self.developer.name.clone(),
                    organization: self.developer.organization.clone(),
                },
                generate_key: self.developer.generate_key,
            },
            namespace: self.namespace.clone(),
            role_name: self.policy.role_name.clone(),
            rules: self.policy.rules.clone().unwrap_or_else(default_rules),
            signer_name: self.signing.signer_name.clone(),
            usages: self.signing.usages.clone(),
            expiration_seconds: self.signing.expiration_seconds,
            poll: self.signing.poll_config(),
        })
    }

    pub fn output_dir(&self) -> PathBuf {
        expand(&self.output_dir)
    }

    fn ca_certificate(&self) -> Result<Vec<u8>, ProvisioningError> {
        if let Some(data) = &self.cluster.ca_certificate_data {
            return general_purpose::STANDARD.decode(data.trim()).map_err(|e| {
                ProvisioningError::invalid_input(format!(
                    "cluster.ca_certificate_data is not base64: {}",
                    e
                ))
            });
        }
        let path = self
            .cluster
            .ca_certificate_path
            .as_deref()
            .map(expand)
            .ok_or_else(|| ProvisioningError::invalid_input("no cluster CA configured"))?;
        fs::read(&path).map_err(|e| ProvisioningError::io(path, e))
    }

    fn admin_token(
        &self,
        lookup_env: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ProvisioningError> {
        let token = match &self.admin.token {
            Some(token) => Some(token.clone()),
            None => lookup_env(&self.admin.token_env),
        };
        token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ProvisioningError::invalid_input(format!(
                    "no admin token: set {} or admin.token",
                    self.admin.token_env
                ))
            })
    }
}

fn require(field: &str, value: &str) -> Result<(), ProvisioningError> {
    if value.trim().is_empty() {
        return Err(ProvisioningError::invalid_input(format!("{} is empty", field)));
    }
    Ok(())
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_with_ca_data() -> ProvisioningConfig {
        let mut config = ProvisioningConfig::default();
        config.cluster.ca_certificate_path = None;
        config.cluster.ca_certificate_data = Some(general_purpose::STANDARD.encode(b"ca-pem"));
        config
    }

    #[test]
    fn defaults_are_valid() {
        ProvisioningConfig::default().validate().unwrap();
        let config = ProvisioningConfig::default();
        assert_eq!(config.admin.name, "admin");
        assert_eq!(config.developer.name, "devs");
        assert_eq!(config.namespace, "apps");
        assert_eq!(config.signing.timeout_secs, 120);
        assert_eq!(config.signing.signer_name, DEFAULT_SIGNER_NAME);
    }

    #[test]
    fn saves_and_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/provision.json");
        let path = path.to_str().unwrap();
        let mut config = ProvisioningConfig::default();
        config.namespace = "team".into();
        config.signing.approval = ApprovalMode::Manual;

        config.save_to_file(path).unwrap();
        assert_eq!(ProvisioningConfig::load_from_file(path).unwrap(), config);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("provision.json");
        fs::write(
            &path,
            r#"{"cluster": {"name": "prod", "endpoint": "https://k8s.example.com"}, "signing": {"approval": "manual"}}"#,
        )
        .unwrap();

        let config = ProvisioningConfig::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.cluster.name, "prod");
        assert_eq!(config.cluster.ca_certificate_path.as_deref(), Some("certs/ca.crt"));
        assert_eq!(config.signing.approval, ApprovalMode::Manual);
        assert_eq!(config.developer, DeveloperSection::default());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = ProvisioningConfig::load_from_file("/nonexistent/provision.json").unwrap_err();
        assert!(matches!(err, ProvisioningError::NotFound { .. }));
    }

    #[test]
    fn rejects_bad_endpoints() {
        for endpoint in ["", "not a url", "ftp://k8s.example.com"] {
            let mut config = ProvisioningConfig::default();
            config.cluster.endpoint = endpoint.to_string();
            assert!(
                matches!(config.validate(), Err(ProvisioningError::InvalidInput(_))),
                "{endpoint}"
            );
        }
    }

    #[test]
    fn rejects_ambiguous_or_missing_ca() {
        let mut config = config_with_ca_data();
        config.cluster.ca_certificate_path = Some("ca.crt".into());
        assert!(config.validate().is_err());

        config.cluster.ca_certificate_path = None;
        config.cluster.ca_certificate_data = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_signing_settings() {
        let mut config = ProvisioningConfig::default();
        config.signing.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ProvisioningConfig::default();
        config.signing.timeout_secs = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ProvisioningError::InvalidInput(_))
        ));

        let mut config = ProvisioningConfig::default();
        config.signing.timeout_secs = MAX_TIMEOUT_SECS;
        assert!(config.validate().is_ok());

        let mut config = ProvisioningConfig::default();
        config.signing.expiration_seconds = Some(60);
        assert!(config.validate().is_err());

        let mut config = ProvisioningConfig::default();
        config.signing.usages.clear();
        assert!(config.validate().is_err());

        let mut config = ProvisioningConfig::default();
        config.policy.rules = Some(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolves_token_from_environment() {
        let config = config_with_ca_data();
        let settings = config
            .resolve_with(|name| (name == DEFAULT_TOKEN_ENV).then(|| "env-token".to_string()))
            .unwrap();

        assert_eq!(settings.admin, Identity::token("admin", "env-token"));
        assert_eq!(settings.cluster.ca_certificate, b"ca-pem");
        assert_eq!(settings.developer.subject.common_name, "devs");
        assert_eq!(settings.rules, default_rules());
        assert_eq!(settings.poll, PollConfig::default());
    }

    #[test]
    fn inline_token_wins_over_environment() {
        let mut config = config_with_ca_data();
        config.admin.token = Some("inline".into());
        let settings = config
            .resolve_with(|_| Some("env-token".to_string()))
            .unwrap();
        assert_eq!(settings.admin, Identity::token("admin", "inline"));
    }

    #[test]
    fn missing_token_names_the_variable() {
        let err = config_with_ca_data().resolve_with(|_| None).unwrap_err();
        match err {
            ProvisioningError::InvalidInput(message) => assert!(message.contains(DEFAULT_TOKEN_ENV)),
            other => panic!("expected invalid input, got {other:?}"),
        }
    }

    #[test]
    fn reads_ca_from_file() {
        let dir = TempDir::new().unwrap();
        let ca = dir.path().join("ca.crt");
        fs::write(&ca, b"file-ca").unwrap();
        let mut config = ProvisioningConfig::default();
        config.cluster.ca_certificate_path = Some(ca.display().to_string());
        config.policy.rules = Some(vec![AccessRule::new(&[""], &["pods"], &["get"])]);

        let settings = config.resolve_with(|_| Some("t".into())).unwrap();
        assert_eq!(settings.cluster.ca_certificate, b"file-ca");
        assert_eq!(settings.rules.len(), 1);
    }

    #[test]
    fn debug_output_hides_inline_token() {
        let mut config = ProvisioningConfig::default();
        config.admin.token = Some("s3cret".into());
        assert!(!format!("{:?}", config).contains("s3cret"));
    }
}
