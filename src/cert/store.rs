// src/cert/store.rs
use std::fs;
use std::path::Path;

use uuid::Uuid;

use crate::error::ProvisioningError;

/// Local persistence for signed certificates, keyed by path.
pub trait CertificateStore: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn read(&self, path: &Path) -> Result<Vec<u8>, ProvisioningError>;
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), ProvisioningError>;
}

#[derive(Debug, Default, Clone)]
pub struct FileCertificateStore;

impl FileCertificateStore {
    pub fn new() -> Self {
        Self
    }
}

impl CertificateStore for FileCertificateStore {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, ProvisioningError> {
        fs::read(path).map_err(|e| ProvisioningError::io(path, e))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), ProvisioningError> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| ProvisioningError::io(parent, e))?;

        // Stage next to the target so the rename stays on one filesystem.
        let staged = parent.join(format!(".cert_{}", Uuid::new_v4()));
        if let Err(e) = fs::write(&staged, bytes) {
            let _ = fs::remove_file(&staged);
            return Err(ProvisioningError::io(&staged, e));
        }
        if let Err(e) = fs::rename(&staged, path) {
            let _ = fs::remove_file(&staged);
            return Err(ProvisioningError::io(path, e));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn written_bytes_read_back_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("certs").join("devs.cert");
        let store = FileCertificateStore::new();
        // Not valid UTF-8 on purpose: the store must not transcode.
        let bytes: Vec<u8> = b"-----BEGIN CERTIFICATE-----\n\xff\x00\xfe\n-----END CERTIFICATE-----\n".to_vec();

        assert!(!store.exists(&path));
        store.write(&path, &bytes).unwrap();
        assert!(store.exists(&path));
        assert_eq!(store.read(&path).unwrap(), bytes);
    }

    #[test]
    fn overwrite_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("devs.cert");
        let store = FileCertificateStore::new();

        store.write(&path, b"first").unwrap();
        store.write(&path, b"second").unwrap();
        assert_eq!(store.read(&path).unwrap(), b"second");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".cert_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn reading_missing_certificate_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = FileCertificateStore::new()
            .read(&dir.path().join("absent.cert"))
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::NotFound { .. }));
    }

    #[test]
    fn directories_do_not_count_as_certificates() {
        let dir = TempDir::new().unwrap();
        assert!(!FileCertificateStore::new().exists(dir.path()));
    }

    #[test]
    fn write_into_a_file_parent_fails_with_io_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let err = FileCertificateStore::new()
            .write(&blocker.join("devs.cert"), b"cert")
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::Io { .. }));
    }
}
