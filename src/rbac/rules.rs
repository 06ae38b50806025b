// src/rbac/rules.rs
use k8s_openapi::api::rbac::v1::PolicyRule;
use serde::{Deserialize, Serialize};

use crate::error::ProvisioningError;

const WORKLOAD_VERBS: [&str; 7] = ["get", "list", "watch", "create", "patch", "update", "delete"];

/// One allowed (api groups, resources, verbs) triple of a namespaced role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    /// `""` is the core group.
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub verbs: Vec<String>,
}

impl AccessRule {
    pub fn new(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> Self {
        Self {
            api_groups: to_strings(api_groups),
            resources: to_strings(resources),
            verbs: to_strings(verbs),
        }
    }

    pub fn validate(&self) -> Result<(), ProvisioningError> {
        if self.api_groups.is_empty() {
            return Err(ProvisioningError::invalid_input(
                "access rule needs at least one api group (use \"\" for the core group)",
            ));
        }
        if self.resources.iter().all(|r| r.trim().is_empty()) {
            return Err(ProvisioningError::invalid_input(
                "access rule needs at least one resource",
            ));
        }
        if self.verbs.iter().all(|v| v.trim().is_empty()) {
            return Err(ProvisioningError::invalid_input(
                "access rule needs at least one verb",
            ));
        }
        Ok(())
    }

    pub fn to_policy_rule(&self) -> PolicyRule {
        PolicyRule {
            api_groups: Some(self.api_groups.clone()),
            resources: Some(self.resources.clone()),
            verbs: self.verbs.clone(),
            ..Default::default()
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Working set for a developer confined to one namespace.
pub fn default_rules() -> Vec<AccessRule> {
    vec![
        // Core resources
        AccessRule::new(
            &[""],
            &[
                "configmaps",
                "pods",
                "secrets",
                "endpoints",
                "services",
                "persistentvolumeclaims",
            ],
            &WORKLOAD_VERBS,
        ),
        // Authorization objects
        AccessRule::new(
            &["rbac.authorization.k8s.io"],
            &["roles", "rolebindings", "clusterroles", "clusterrolebindings"],
            &WORKLOAD_VERBS,
        ),
        // Workload controllers
        AccessRule::new(
            &["extensions", "apps"],
            &["replicasets", "deployments"],
            &WORKLOAD_VERBS,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_cover_core_rbac_and_workloads() {
        let rules = default_rules();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].api_groups, vec![""]);
        assert!(rules[0].resources.contains(&"persistentvolumeclaims".to_string()));
        assert_eq!(rules[1].api_groups, vec!["rbac.authorization.k8s.io"]);
        assert_eq!(rules[2].api_groups, vec!["extensions", "apps"]);
        for rule in &rules {
            assert_eq!(rule.verbs, WORKLOAD_VERBS);
            rule.validate().unwrap();
        }
    }

    #[test]
    fn converts_to_policy_rule() {
        let rule = AccessRule::new(&["apps"], &["deployments"], &["get"]);
        let policy = rule.to_policy_rule();
        assert_eq!(policy.api_groups, Some(vec!["apps".to_string()]));
        assert_eq!(policy.resources, Some(vec!["deployments".to_string()]));
        assert_eq!(policy.verbs, vec!["get".to_string()]);
        assert!(policy.resource_names.is_none());
    }

    #[test]
    fn rejects_rules_without_verbs_or_resources() {
        assert!(AccessRule::new(&[""], &["pods"], &[]).validate().is_err());
        assert!(AccessRule::new(&[""], &[], &["get"]).validate().is_err());
        assert!(AccessRule::new(&[], &["pods"], &["get"]).validate().is_err());
    }

    #[test]
    fn reads_rules_from_json() {
        let rule: AccessRule = serde_json::from_str(
            r#"{"api_groups": [""], "resources": ["pods"], "verbs": ["get", "list"]}"#,
        )
        .unwrap();
        assert_eq!(rule, AccessRule::new(&[""], &["pods"], &["get", "list"]));
    }
}
