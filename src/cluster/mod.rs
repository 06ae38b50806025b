pub mod api;
mod kubectl;

pub use api::{Approver, AuthorizationApi, CertificateApi, ClusterConnector};
pub use kubectl::{ApprovalMode, KubectlConnector};
