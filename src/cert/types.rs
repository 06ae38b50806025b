// cert/types.rs
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateUsage {
    #[serde(rename = "digital signature")]
    DigitalSignature,
    #[serde(rename = "key encipherment")]
    KeyEncipherment,
    #[serde(rename = "server auth")]
    ServerAuth,
    #[serde(rename = "client auth")]
    ClientAuth,
}

impl CertificateUsage {
    /// Usage set requested for a mutual-TLS client identity.
    pub const DEFAULT_SET: [CertificateUsage; 4] = [
        CertificateUsage::DigitalSignature,
        CertificateUsage::KeyEncipherment,
        CertificateUsage::ServerAuth,
        CertificateUsage::ClientAuth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateUsage::DigitalSignature => "digital signature",
            CertificateUsage::KeyEncipherment => "key encipherment",
            CertificateUsage::ServerAuth => "server auth",
            CertificateUsage::ClientAuth => "client auth",
        }
    }
}

impl fmt::Display for CertificateUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn default_usages() -> Vec<CertificateUsage> {
    CertificateUsage::DEFAULT_SET.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usages_serialize_as_kubernetes_strings() {
        let json = serde_json::to_string(&default_usages()).unwrap();
        assert_eq!(
            json,
            r#"["digital signature","key encipherment","server auth","client auth"]"#
        );
    }

    #[test]
    fn usages_parse_from_config() {
        let parsed: Vec<CertificateUsage> =
            serde_json::from_str(r#"["client auth","digital signature"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![CertificateUsage::ClientAuth, CertificateUsage::DigitalSignature]
        );
    }
}
