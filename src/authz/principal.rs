use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use super::{GrantLevel, GrantRequirement};
use crate::errors::AppResult;

/// Principal represents the authenticated user with their effective grants
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: i64,
    pub roles: HashSet<String>,
    /// Effective grants: grant key -> levels held, merged from roles and direct grants
    pub grants: BTreeMap<String, BTreeSet<GrantLevel>>,
}

impl Principal {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            roles: HashSet::new(),
            grants: BTreeMap::new(),
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = String>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn with_grant(mut self, key: impl Into<String>, level: GrantLevel) -> Self {
        self.grants.entry(key.into()).or_default().insert(level);
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn holds(&self, requirement: &GrantRequirement) -> bool {
        self.grants
            .get(&requirement.grant_key)
            .map(|levels| levels.contains(&requirement.level))
            .unwrap_or(false)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_role(super::roles::SUPER_ADMIN)
    }

    /// Loads roles plus direct and role-derived grants for a user.
    pub async fn load(pool: &SqlitePool, user_id: i64) -> AppResult<Self> {
        let role_rows = sqlx::query(
            r#"
            SELECT r.name
            FROM roles r
            INNER JOIN user_roles ur ON r.id = ur.role_id
            WHERE ur.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let grant_rows = sqlx::query(
            r#"
            SELECT grant_key, level FROM user_grants WHERE user_id = ?
            UNION
            SELECT rg.grant_key, rg.level
            FROM role_grants rg
            INNER JOIN user_roles ur ON rg.role_id = ur.role_id
            WHERE ur.user_id = ?
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let mut principal =
            Principal::new(user_id).with_roles(role_rows.iter().map(|r| r.get::<String, _>("name")));

        for row in grant_rows {
            let key: String = row.get("grant_key");
            let level: String = row.get("level");
            match level.parse::<GrantLevel>() {
                Ok(level) => {
                    principal.grants.entry(key).or_default().insert(level);
                }
                Err(_) => tracing::warn!(user_id, grant_key = %key, level = %level, "ignoring unknown grant level"),
            }
        }

        Ok(principal)
    }

    pub fn effective(&self) -> EffectiveGrants {
        let mut roles: Vec<String> = self.roles.iter().cloned().collect();
        roles.sort();
        EffectiveGrants {
            user_id: self.user_id,
            roles,
            grants: self.grants.clone(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EffectiveGrants {
    pub user_id: i64,
    pub roles: Vec<String>,
    #[schema(value_type = Object)]
    pub grants: BTreeMap<String, BTreeSet<GrantLevel>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_checks_key_and_level() {
        let principal = Principal::new(1)
            .with_grant("credit", GrantLevel::View)
            .with_grant("credit", GrantLevel::Add);

        assert!(principal.holds(&GrantRequirement::new("credit", GrantLevel::View)));
        assert!(principal.holds(&GrantRequirement::new("credit", GrantLevel::Add)));
        assert!(!principal.holds(&GrantRequirement::new("credit", GrantLevel::Delete)));
        assert!(!principal.holds(&GrantRequirement::new("expense", GrantLevel::View)));
    }
}
