use async_trait::async_trait;

use super::principal::Principal;
use super::GrantRequirement;

/// Policy evaluator trait for pluggable authorization logic
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Check if the principal satisfies a route's grant requirement
    async fn can(&self, principal: &Principal, requirement: &GrantRequirement) -> bool;
}

/// Default policy evaluator
///
/// Evaluation order:
/// 1. super_admin role -> allow
/// 2. effective grants (direct + role) contain (key, level) -> allow
/// 3. deny
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyEvaluator for DefaultPolicyEvaluator {
    async fn can(&self, principal: &Principal, requirement: &GrantRequirement) -> bool {
        if principal.is_super_admin() {
            tracing::debug!(
                user_id = principal.user_id,
                grant = %requirement,
                "super_admin bypass"
            );
            return true;
        }

        if principal.holds(requirement) {
            tracing::debug!(
                user_id = principal.user_id,
                grant = %requirement,
                "grant match"
            );
            return true;
        }

        tracing::debug!(
            user_id = principal.user_id,
            grant = %requirement,
            "grant denied"
        );
        false
    }
}
