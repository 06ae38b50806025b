mod binder;
mod rules;

pub use binder::{AccessPolicyBinder, GrantSummary};
pub use rules::{default_rules, AccessRule};
