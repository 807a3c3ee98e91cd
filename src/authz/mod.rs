//! Authorization module - grant model, policy evaluation and route middleware
//!
//! Every admin route declares at most one `GrantRequirement`. The middleware
//! in [`middleware`] authenticates the caller, loads their [`Principal`] and
//! evaluates the requirement before the handler (and therefore any service
//! or transaction work) runs.

mod evaluator;
pub mod middleware;
mod principal;

pub use evaluator::{DefaultPolicyEvaluator, PolicyEvaluator};
pub use principal::{EffectiveGrants, Principal};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Well-known role names
pub mod roles {
    pub const SUPER_ADMIN: &str = "super_admin";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum GrantLevel {
    View,
    Add,
    Edit,
    Delete,
}

impl GrantLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantLevel::View => "VIEW",
            GrantLevel::Add => "ADD",
            GrantLevel::Edit => "EDIT",
            GrantLevel::Delete => "DELETE",
        }
    }
}

impl fmt::Display for GrantLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VIEW" => Ok(GrantLevel::View),
            "ADD" => Ok(GrantLevel::Add),
            "EDIT" => Ok(GrantLevel::Edit),
            "DELETE" => Ok(GrantLevel::Delete),
            other => Err(format!("unknown grant level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantRequirement {
    pub grant_key: String,
    pub level: GrantLevel,
}

impl GrantRequirement {
    pub fn new(grant_key: impl Into<String>, level: GrantLevel) -> Self {
        Self {
            grant_key: grant_key.into(),
            level,
        }
    }
}

impl fmt::Display for GrantRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.grant_key, self.level)
    }
}
