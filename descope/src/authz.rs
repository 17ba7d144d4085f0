//! Role and permission checks over verified claims
//!
//! Project-level grants live in the top-level `roles` and `permissions`
//! claims. Tenant-level grants live under `tenants.<tenant id>`. None of these
//! checks touch the network; they assume the claims came from a verified
//! token.

use serde_json::{Map, Value};

use crate::claims::Claims;

const PERMISSIONS: &str = "permissions";
const ROLES: &str = "roles";

fn granted<'a>(scope: &'a Map<String, Value>, claim: &str) -> impl Iterator<Item = &'a str> {
    scope
        .get(claim)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

fn has_all(scope: &Map<String, Value>, claim: &str, required: &[&str]) -> bool {
    required
        .iter()
        .all(|r| granted(scope, claim).any(|g| g == *r))
}

fn matching(scope: &Map<String, Value>, claim: &str, candidates: &[&str]) -> Vec<String> {
    candidates
        .iter()
        .filter(|c| granted(scope, claim).any(|g| g == **c))
        .map(|c| (*c).to_owned())
        .collect()
}

impl Claims {
    fn tenant(&self, tenant: &str) -> Option<&Map<String, Value>> {
        self.tenants()?.get(tenant)?.as_object()
    }

    /// Whether every listed permission is granted at the project level
    pub fn validate_permissions(&self, permissions: &[&str]) -> bool {
        has_all(self.as_map(), PERMISSIONS, permissions)
    }

    /// Whether every listed role is granted at the project level
    pub fn validate_roles(&self, roles: &[&str]) -> bool {
        has_all(self.as_map(), ROLES, roles)
    }

    /// Whether every listed permission is granted within `tenant`
    ///
    /// Always `false` if the token does not belong to the tenant.
    pub fn validate_tenant_permissions(&self, tenant: &str, permissions: &[&str]) -> bool {
        self.tenant(tenant)
            .map_or(false, |t| has_all(t, PERMISSIONS, permissions))
    }

    /// Whether every listed role is granted within `tenant`
    ///
    /// Always `false` if the token does not belong to the tenant.
    pub fn validate_tenant_roles(&self, tenant: &str, roles: &[&str]) -> bool {
        self.tenant(tenant).map_or(false, |t| has_all(t, ROLES, roles))
    }

    /// The listed roles that are granted at the project level
    pub fn matched_roles(&self, roles: &[&str]) -> Vec<String> {
        matching(self.as_map(), ROLES, roles)
    }

    /// The listed permissions that are granted at the project level
    pub fn matched_permissions(&self, permissions: &[&str]) -> Vec<String> {
        matching(self.as_map(), PERMISSIONS, permissions)
    }

    /// The listed roles that are granted within `tenant`
    pub fn matched_tenant_roles(&self, tenant: &str, roles: &[&str]) -> Vec<String> {
        self.tenant(tenant)
            .map(|t| matching(t, ROLES, roles))
            .unwrap_or_default()
    }

    /// The listed permissions that are granted within `tenant`
    pub fn matched_tenant_permissions(&self, tenant: &str, permissions: &[&str]) -> Vec<String> {
        self.tenant(tenant)
            .map(|t| matching(t, PERMISSIONS, permissions))
            .unwrap_or_default()
    }

    /// The tenants the token grants access to
    pub fn tenant_ids(&self) -> Vec<&str> {
        self.tenants()
            .map(|t| t.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}
