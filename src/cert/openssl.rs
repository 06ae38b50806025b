// src/cert/openssl.rs
use std::{fs, path::Path};

use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509NameBuilder, X509ReqBuilder};
use tracing::{debug, info};

use crate::error::ProvisioningError;
use crate::utils::files::write_owner_only;

pub const DEFAULT_KEY_SIZE: u32 = 2048;

/// Distinguished name placed in a generated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrSubject {
    pub common_name: String,
    pub organization: Option<String>,
}

fn crypto(context: &str, e: ErrorStack) -> ProvisioningError {
    ProvisioningError::Crypto(format!("{}: {}", context, e))
}

pub fn generate_private_key(path: &Path, key_size: u32) -> Result<(), ProvisioningError> {
    debug!(path = %path.display(), key_size, "generating private key");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ProvisioningError::io(parent, e))?;
    }

    let rsa = Rsa::generate(key_size).map_err(|e| crypto("failed to generate RSA key", e))?;
    let key = PKey::from_rsa(rsa).map_err(|e| crypto("failed to wrap RSA key", e))?;
    let pem = key
        .private_key_to_pem_pkcs8()
        .map_err(|e| crypto("failed to encode private key", e))?;

    write_owner_only(path, &pem).map_err(|e| ProvisioningError::io(path, e))?;

    debug!(path = %path.display(), "generated private key");
    Ok(())
}

fn load_private_key(path: &Path) -> Result<PKey<Private>, ProvisioningError> {
    let pem = fs::read(path).map_err(|e| ProvisioningError::io(path, e))?;
    PKey::private_key_from_pem(&pem).map_err(|e| {
        crypto(
            &format!("failed to parse private key {}", path.display()),
            e,
        )
    })
}

pub fn generate_csr(
    subject: &CsrSubject,
    key_path: &Path,
    csr_path: &Path,
) -> Result<(), ProvisioningError> {
    debug!(path = %csr_path.display(), cn = %subject.common_name, "generating CSR");

    if subject.common_name.trim().is_empty() {
        return Err(ProvisioningError::invalid_input(
            "CSR common name must not be empty",
        ));
    }
    let key = load_private_key(key_path)?;

    let mut name = X509NameBuilder::new().map_err(|e| crypto("failed to build subject", e))?;
    name.append_entry_by_text("CN", &subject.common_name)
        .map_err(|e| crypto("invalid common name", e))?;
    if let Some(organization) = subject.organization.as_deref().filter(|o| !o.is_empty()) {
        name.append_entry_by_text("O", organization)
            .map_err(|e| crypto("invalid organization", e))?;
    }
    let name = name.build();

    let mut builder = X509ReqBuilder::new().map_err(|e| crypto("failed to start CSR", e))?;
    builder
        .set_subject_name(&name)
        .map_err(|e| crypto("failed to set CSR subject", e))?;
    builder
        .set_pubkey(&key)
        .map_err(|e| crypto("failed to set CSR public key", e))?;
    builder
        .sign(&key, MessageDigest::sha256())
        .map_err(|e| crypto("failed to sign CSR", e))?;
    let pem = builder
        .build()
        .to_pem()
        .map_err(|e| crypto("failed to encode CSR", e))?;

    if let Some(parent) = csr_path.parent() {
        fs::create_dir_all(parent).map_err(|e| ProvisioningError::io(parent, e))?;
    }
    fs::write(csr_path, pem).map_err(|e| ProvisioningError::io(csr_path, e))?;

    debug!(path = %csr_path.display(), "generated CSR");
    Ok(())
}

/// Makes sure a CSR exists at `csr_path`, generating the key first when it is missing too.
pub fn ensure_csr(
    subject: &CsrSubject,
    key_path: &Path,
    csr_path: &Path,
) -> Result<(), ProvisioningError> {
    if csr_path.is_file() {
        return Ok(());
    }
    if !key_path.is_file() {
        info!(path = %key_path.display(), "no private key found, generating one");
        generate_private_key(key_path, DEFAULT_KEY_SIZE)?;
    }
    info!(path = %csr_path.display(), cn = %subject.common_name, "no CSR found, generating one");
    generate_csr(subject, key_path, csr_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::x509::X509Req;
    use tempfile::TempDir;

    fn subject() -> CsrSubject {
        CsrSubject {
            common_name: "devs".into(),
            organization: Some("developers".into()),
        }
    }

    #[test]
    fn generated_csr_carries_subject_and_matches_key() {
        let dir = TempDir::new().unwrap();
        let key_path = dir.path().join("certs/devs.key");
        let csr_path = dir.path().join("certs/devs.csr");

        ensure_csr(&subject(), &key_path, &csr_path).unwrap();

        let req = X509Req::from_pem(&fs::read(&csr_path).unwrap()).unwrap();
        let cn = req
            .subject_name()
            .entries_by_nid(openssl::nid::Nid::COMMONNAME)
            .next()
            .unwrap()
            .data()
            .as_utf8()
            .unwrap()
            .to_string();
        assert_eq!(cn, "devs");

        let key = load_private_key(&key_path).unwrap();
        assert!(req.verify(&key).unwrap());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&key_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn existing_csr_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let key_path = dir.path().join("devs.key");
        let csr_path = dir.path().join("devs.csr");
        fs::write(&csr_path, b"caller supplied").unwrap();

        ensure_csr(&subject(), &key_path, &csr_path).unwrap();

        assert_eq!(fs::read(&csr_path).unwrap(), b"caller supplied");
        assert!(!key_path.exists());
    }

    #[test]
    fn existing_key_is_reused() {
        let dir = TempDir::new().unwrap();
        let key_path = dir.path().join("devs.key");
        let csr_path = dir.path().join("devs.csr");
        generate_private_key(&key_path, DEFAULT_KEY_SIZE).unwrap();
        let before = fs::read(&key_path).unwrap();

        ensure_csr(&subject(), &key_path, &csr_path).unwrap();

        assert_eq!(fs::read(&key_path).unwrap(), before);
        assert!(csr_path.is_file());
    }

    #[test]
    fn unreadable_key_is_a_crypto_error() {
        let dir = TempDir::new().unwrap();
        let key_path = dir.path().join("devs.key");
        fs::write(&key_path, b"not a key").unwrap();

        let err = generate_csr(&subject(), &key_path, &dir.path().join("devs.csr")).unwrap_err();
        assert!(matches!(err, ProvisioningError::Crypto(_)));
    }
}
