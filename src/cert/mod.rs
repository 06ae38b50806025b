// src/cert/mod.rs
pub mod csr;
pub mod openssl;
mod provisioner;
mod store;
mod types;
pub mod verification;

pub use csr::{CsrSnapshot, SigningRequest, DEFAULT_SIGNER_NAME};
pub use openssl::{ensure_csr, CsrSubject};
pub use provisioner::CertificateProvisioner;
pub use store::{CertificateStore, FileCertificateStore};
pub use types::{default_usages, CertificateUsage};
