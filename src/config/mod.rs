mod types;

pub use types::{ProvisioningConfig, DEFAULT_CONFIG_FILE};
