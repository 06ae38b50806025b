// src/rbac/binder.rs
use k8s_openapi::api::rbac::v1::{Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use tracing::info;

use super::rules::AccessRule;
use crate::cluster::AuthorizationApi;
use crate::error::ProvisioningError;

pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// A namespaced role and the binding granting it to one user.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleGrant {
    pub role: Role,
    pub binding: RoleBinding,
}

/// Identifiers of a grant, safe to print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantSummary {
    pub namespace: String,
    pub role: String,
    pub role_binding: String,
    pub role_created: bool,
    pub role_binding_created: bool,
}

pub fn build_role(name: &str, namespace: &str, rules: &[AccessRule]) -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        rules: Some(rules.iter().map(AccessRule::to_policy_rule).collect()),
    }
}

pub fn build_role_binding(name: &str, namespace: &str, user: &str, role_name: &str) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: role_name.to_string(),
        },
        subjects: Some(vec![Subject {
            api_group: Some(RBAC_API_GROUP.to_string()),
            kind: "User".to_string(),
            name: user.to_string(),
            ..Default::default()
        }]),
    }
}

/// Grants a user a fixed rule set inside one namespace.
///
/// Role and binding share a name, which defaults to the user name.
pub struct AccessPolicyBinder<'a> {
    api: &'a dyn AuthorizationApi,
    role_name: Option<String>,
}

impl<'a> AccessPolicyBinder<'a> {
    pub fn new(api: &'a dyn AuthorizationApi) -> Self {
        Self {
            api,
            role_name: None,
        }
    }

    pub fn with_role_name(mut self, role_name: Option<String>) -> Self {
        self.role_name = role_name.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn grant_for(
        &self,
        user: &str,
        namespace: &str,
        rules: &[AccessRule],
    ) -> Result<RoleGrant, ProvisioningError> {
        if user.trim().is_empty() {
            return Err(ProvisioningError::invalid_input("user name is empty"));
        }
        if namespace.trim().is_empty() {
            return Err(ProvisioningError::invalid_input("namespace is empty"));
        }
        if rules.is_empty() {
            return Err(ProvisioningError::invalid_input(format!(
                "no access rules given for user '{}'",
                user
            )));
        }
        for rule in rules {
            rule.validate()?;
        }

        let name = self.role_name.as_deref().unwrap_or(user);
        Ok(RoleGrant {
            role: build_role(name, namespace, rules),
            binding: build_role_binding(name, namespace, user, name),
        })
    }

    /// Creates the role, then the binding. An existing object is a `Conflict`.
    pub async fn bind_user_to_namespace(
        &self,
        user: &str,
        namespace: &str,
        rules: &[AccessRule],
    ) -> Result<RoleGrant, ProvisioningError> {
        let grant = self.grant_for(user, namespace, rules)?;

        self.api
            .create_role(&grant.role)
            .await
            .map_err(|e| ProvisioningError::api(user, "create role", e))?;
        info!(user, namespace, role = %object_name(&grant.role.metadata), "created role");

        self.api
            .create_role_binding(&grant.binding)
            .await
            .map_err(|e| ProvisioningError::api(user, "create role binding", e))?;
        info!(user, namespace, binding = %object_name(&grant.binding.metadata), "created role binding");

        Ok(grant)
    }

    /// Like [`Self::bind_user_to_namespace`] but leaves existing objects in place.
    pub async fn ensure_user_bound(
        &self,
        user: &str,
        namespace: &str,
        rules: &[AccessRule],
    ) -> Result<GrantSummary, ProvisioningError> {
        let grant = self.grant_for(user, namespace, rules)?;
        let role_name = object_name(&grant.role.metadata);
        let binding_name = object_name(&grant.binding.metadata);

        let role_exists = self
            .api
            .role_exists(namespace, &role_name)
            .await
            .map_err(|e| ProvisioningError::api(user, "look up role", e))?;
        let binding_exists = self
            .api
            .role_binding_exists(namespace, &binding_name)
            .await
            .map_err(|e| ProvisioningError::api(user, "look up role binding", e))?;

        if !role_exists && !binding_exists {
            self.bind_user_to_namespace(user, namespace, rules).await?;
        } else {
            if role_exists {
                info!(user, namespace, role = %role_name, "role already exists");
            } else {
                self.api
                    .create_role(&grant.role)
                    .await
                    .map_err(|e| ProvisioningError::api(user, "create role", e))?;
                info!(user, namespace, role = %role_name, "created role");
            }

            if binding_exists {
                info!(user, namespace, binding = %binding_name, "role binding already exists");
            } else {
                self.api
                    .create_role_binding(&grant.binding)
                    .await
                    .map_err(|e| ProvisioningError::api(user, "create role binding", e))?;
                info!(user, namespace, binding = %binding_name, "created role binding");
            }
        }

        Ok(GrantSummary {
            namespace: namespace.to_string(),
            role: role_name,
            role_binding: binding_name,
            role_created: !role_exists,
            role_binding_created: !binding_exists,
        })
    }
}

fn object_name(metadata: &ObjectMeta) -> String {
    metadata.name.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::rbac::rules::default_rules;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeAuthorization {
        objects: Mutex<HashSet<(String, String, String)>>,
        roles: Mutex<Vec<Role>>,
        bindings: Mutex<Vec<RoleBinding>>,
        creates: AtomicUsize,
    }

    impl FakeAuthorization {
        fn insert(&self, kind: &str, metadata: &ObjectMeta) -> Result<(), ApiError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let key = (
                kind.to_string(),
                metadata.namespace.clone().unwrap_or_default(),
                object_name(metadata),
            );
            if !self.objects.lock().unwrap().insert(key) {
                return Err(ApiError::Conflict(format!(
                    "{} \"{}\" already exists",
                    kind,
                    object_name(metadata)
                )));
            }
            Ok(())
        }

        fn contains(&self, kind: &str, namespace: &str, name: &str) -> bool {
            self.objects.lock().unwrap().contains(&(
                kind.to_string(),
                namespace.to_string(),
                name.to_string(),
            ))
        }
    }

    #[async_trait]
    impl AuthorizationApi for FakeAuthorization {
        async fn ensure_namespace(&self, _name: &str) -> Result<bool, ApiError> {
            Ok(false)
        }

        async fn role_exists(&self, namespace: &str, name: &str) -> Result<bool, ApiError> {
            Ok(self.contains("role", namespace, name))
        }

        async fn role_binding_exists(&self, namespace: &str, name: &str) -> Result<bool, ApiError> {
            Ok(self.contains("rolebinding", namespace, name))
        }

        async fn create_role(&self, role: &Role) -> Result<(), ApiError> {
            self.insert("role", &role.metadata)?;
            self.roles.lock().unwrap().push(role.clone());
            Ok(())
        }

        async fn create_role_binding(&self, binding: &RoleBinding) -> Result<(), ApiError> {
            self.insert("rolebinding", &binding.metadata)?;
            self.bindings.lock().unwrap().push(binding.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn binds_devs_into_apps() {
        let api = FakeAuthorization::default();
        let rules = default_rules();

        let grant = AccessPolicyBinder::new(&api)
            .bind_user_to_namespace("devs", "apps", &rules)
            .await
            .unwrap();

        assert_eq!(grant.role.metadata.namespace.as_deref(), Some("apps"));
        assert_eq!(grant.role.metadata.name.as_deref(), Some("devs"));
        let expected: Vec<_> = rules.iter().map(AccessRule::to_policy_rule).collect();
        assert_eq!(grant.role.rules.as_ref(), Some(&expected));

        let subjects = grant.binding.subjects.as_ref().unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].kind, "User");
        assert_eq!(subjects[0].name, "devs");
        assert_eq!(grant.binding.metadata.namespace.as_deref(), Some("apps"));
        assert_eq!(grant.binding.role_ref.kind, "Role");
        assert_eq!(grant.binding.role_ref.api_group, RBAC_API_GROUP);
        assert_eq!(Some(grant.binding.role_ref.name.as_str()), grant.role.metadata.name.as_deref());

        assert_eq!(api.roles.lock().unwrap().as_slice(), &[grant.role.clone()]);
        assert_eq!(api.bindings.lock().unwrap().as_slice(), &[grant.binding.clone()]);
    }

    #[tokio::test]
    async fn second_strict_bind_is_a_conflict() {
        let api = FakeAuthorization::default();
        let binder = AccessPolicyBinder::new(&api);
        binder
            .bind_user_to_namespace("devs", "apps", &default_rules())
            .await
            .unwrap();

        let err = binder
            .bind_user_to_namespace("devs", "apps", &default_rules())
            .await
            .unwrap_err();
        match err {
            ProvisioningError::Conflict {
                identity, operation, ..
            } => {
                assert_eq!(identity, "devs");
                assert_eq!(operation, "create role");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ensure_creates_only_what_is_missing() {
        let api = FakeAuthorization::default();
        let binder = AccessPolicyBinder::new(&api).with_role_name(Some("developers".into()));
        let grant = binder.grant_for("devs", "apps", &default_rules()).unwrap();
        api.create_role(&grant.role).await.unwrap();

        let summary = binder
            .ensure_user_bound("devs", "apps", &default_rules())
            .await
            .unwrap();
        assert_eq!(summary.role, "developers");
        assert_eq!(summary.role_binding, "developers");
        assert!(!summary.role_created);
        assert!(summary.role_binding_created);

        let again = binder
            .ensure_user_bound("devs", "apps", &default_rules())
            .await
            .unwrap();
        assert!(!again.role_created);
        assert!(!again.role_binding_created);
        assert_eq!(api.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ensure_on_a_fresh_namespace_creates_both() {
        let api = FakeAuthorization::default();
        let summary = AccessPolicyBinder::new(&api)
            .ensure_user_bound("devs", "apps", &default_rules())
            .await
            .unwrap();

        assert!(summary.role_created);
        assert!(summary.role_binding_created);
        assert!(api.contains("role", "apps", "devs"));
        assert!(api.contains("rolebinding", "apps", "devs"));
        assert_eq!(api.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn custom_rules_are_used_verbatim() {
        let api = FakeAuthorization::default();
        let rules = vec![AccessRule::new(&[""], &["pods"], &["get", "list"])];
        let grant = AccessPolicyBinder::new(&api)
            .bind_user_to_namespace("alice", "team", &rules)
            .await
            .unwrap();
        let role_rules = grant.role.rules.unwrap();
        assert_eq!(role_rules.len(), 1);
        assert_eq!(role_rules[0].resources, Some(vec!["pods".to_string()]));
    }

    #[test]
    fn rejects_empty_inputs() {
        let api = FakeAuthorization::default();
        let binder = AccessPolicyBinder::new(&api);
        assert!(binder.grant_for("", "apps", &default_rules()).is_err());
        assert!(binder.grant_for("devs", "", &default_rules()).is_err());
        assert!(binder.grant_for("devs", "apps", &[]).is_err());
    }
}
