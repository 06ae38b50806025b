mod document;
mod kube;

pub use kube::{build_cert_document, build_token_document, ConnectionDocument};
