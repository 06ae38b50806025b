pub mod backoff;
pub mod files;
pub mod logging;
